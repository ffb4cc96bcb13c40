//! # VerticleRuntime: deploy, undeploy, reload.
//!
//! The runtime turns deploy requests into live deployments: it resolves the
//! module's dependency graph, selects a language factory, registers the
//! deployment in the tree and launches `instances` execution units. Undeploy
//! walks the tree children-first; reload is undeploy-then-redeploy with the
//! recorded module, config and instance count.
//!
//! ## Scheduling model
//! The deploy/undeploy core blocks (file I/O, repository downloads, latch
//! waits) and therefore **must run on a worker thread**; every core method
//! asserts the worker-context guard and the async public API wraps the core
//! in a [`BlockingAction`]. Requires a multi-threaded tokio runtime.
//!
//! ## Completion semantics
//! Instance launches happen in index order but complete in any order. The
//! done notification fires exactly once, after the last instance reports:
//! success only if **every** instance started. The first failure rolls the
//! partially created deployment back before the failure is reported.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info};

use crate::actions::{require_worker_context, ActionFuture, BlockingAction, CountingCompletionHandler};
use crate::config::PlatformConfig;
use crate::error::{DeployError, TimerError};
use crate::events::{Bus, Event, EventKind};
use crate::module::{ModuleDependencies, ModuleRepository, ModuleResolver};
use crate::redeploy::{Redeployer, Reloader};
use crate::time::{Timeout, Timer};

use super::context::{ContextKind, ExecutionContext};
use super::deployment::{Deployment, VerticleHolder};
use super::tree::DeploymentTree;
use super::verticle::{FactoryRegistry, InstanceScope, VerticleContext};

/// Request to deploy a module by name.
#[derive(Clone, Debug)]
pub struct ModuleDeployment {
    /// Module to deploy (resolved, installing if missing).
    pub module: String,
    /// Deployment config handed to every instance.
    pub config: serde_json::Value,
    /// Number of execution units to launch.
    pub instances: usize,
    /// Explicit deployment name; generated when absent.
    pub name: Option<String>,
    /// Name of the deploying (parent) deployment, if any.
    pub parent: Option<String>,
    /// Invoking module's directory, honored when the module preserves cwd.
    pub cwd: Option<PathBuf>,
}

impl ModuleDeployment {
    /// Single-instance request with an empty config.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            config: serde_json::Value::Null,
            instances: 1,
            name: None,
            parent: None,
            cwd: None,
        }
    }
}

/// Request to deploy an ad-hoc verticle with a preset classpath.
#[derive(Clone, Debug)]
pub struct VerticleDeployment {
    /// Entry point; its extension selects the factory.
    pub main: String,
    /// Run instances on worker contexts sharing one scope.
    pub worker: bool,
    /// Deployment config handed to every instance.
    pub config: serde_json::Value,
    /// Preset classpath entries.
    pub classpath: Vec<PathBuf>,
    /// Number of execution units to launch.
    pub instances: usize,
    /// Optional comma-separated module names appended to the classpath.
    pub includes: Option<String>,
    /// Explicit deployment name; generated when absent.
    pub name: Option<String>,
    /// Name of the deploying (parent) deployment, if any.
    pub parent: Option<String>,
    /// Working directory for the instances.
    pub cwd: Option<PathBuf>,
}

impl VerticleDeployment {
    /// Single-instance request with an empty config and classpath.
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            worker: false,
            config: serde_json::Value::Null,
            classpath: Vec::new(),
            instances: 1,
            includes: None,
            name: None,
            parent: None,
            cwd: None,
        }
    }
}

/// Fully resolved launch plan shared by both deploy paths.
struct DeploySpec {
    name: Option<String>,
    module: Option<String>,
    main: String,
    worker: bool,
    auto_redeploy: bool,
    config: serde_json::Value,
    classpath: Vec<PathBuf>,
    instances: usize,
    mod_dir: Option<PathBuf>,
    parent: Option<String>,
}

/// Deploys modules and verticles, owns the deployment tree.
pub struct VerticleRuntime {
    handle: Handle,
    langs: HashMap<String, String>,
    factories: FactoryRegistry,
    resolver: ModuleResolver,
    tree: DeploymentTree,
    redeployer: RwLock<Option<Arc<dyn Redeployer>>>,
    timer: Arc<dyn Timer>,
    bus: Bus,
    self_ref: Weak<VerticleRuntime>,
}

impl VerticleRuntime {
    /// Creates a runtime on the current tokio runtime.
    ///
    /// `repositories` is the install fallback chain, in try order; configure
    /// it here, it is not mutable afterwards.
    pub fn new(
        cfg: &PlatformConfig,
        factories: FactoryRegistry,
        repositories: Vec<Arc<dyn ModuleRepository>>,
        timer: Arc<dyn Timer>,
        bus: Bus,
    ) -> Result<Arc<Self>, DeployError> {
        let mut resolver = ModuleResolver::new(cfg.mod_root.clone(), cfg.repo_timeout, bus.clone())?;
        for repository in repositories {
            resolver.add_repository(repository);
        }
        Ok(Arc::new_cyclic(|weak| Self {
            handle: Handle::current(),
            langs: cfg.langs.clone(),
            factories,
            resolver,
            tree: DeploymentTree::new(),
            redeployer: RwLock::new(None),
            timer,
            bus,
            self_ref: weak.clone(),
        }))
    }

    /// Attaches the redeploy engine; deployments opting in are registered
    /// with it from then on.
    pub fn attach_redeployer(&self, redeployer: Arc<dyn Redeployer>) {
        *self.redeployer.write().expect("redeployer poisoned") = Some(redeployer);
    }

    /// The attached redeploy engine, if any.
    pub fn redeployer(&self) -> Option<Arc<dyn Redeployer>> {
        self.redeployer.read().expect("redeployer poisoned").clone()
    }

    /// The module resolver (module root, repositories, classpaths).
    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// The deployment tree; lookups are safe from any thread.
    pub fn deployments(&self) -> &DeploymentTree {
        &self.tree
    }

    /// Lock-free lookup of a live deployment.
    pub fn deployment(&self, name: &str) -> Option<Arc<Deployment>> {
        self.tree.get(name)
    }

    /// Deployment name -> live instance count.
    pub fn instance_counts(&self) -> HashMap<String, usize> {
        self.tree
            .names()
            .into_iter()
            .filter_map(|name| {
                self.tree
                    .get(&name)
                    .map(|dep| (name, dep.instance_count()))
            })
            .collect()
    }

    /// The platform event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The platform timer.
    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    /// Deploys a module: resolve (installing if missing), launch instances.
    ///
    /// Resolves to the deployment name once every instance has started; any
    /// instance failure rolls the deployment back and errors.
    pub async fn deploy_module(&self, request: ModuleDeployment) -> Result<String, DeployError> {
        let rt = self.strong()?;
        BlockingAction::run_async(&self.handle, Self::panicked(), move || {
            rt.do_deploy_module(false, request)
        })
        .await
    }

    /// Deploys an ad-hoc verticle against a preset classpath, optionally
    /// extended by resolving `includes`.
    pub async fn deploy_verticle(&self, request: VerticleDeployment) -> Result<String, DeployError> {
        let rt = self.strong()?;
        BlockingAction::run_async(&self.handle, Self::panicked(), move || {
            rt.do_deploy_verticle(request)
        })
        .await
    }

    /// Undeploys a deployment and, children-first, its whole subtree.
    pub async fn undeploy(&self, name: &str) -> Result<(), DeployError> {
        let rt = self.strong()?;
        let name = name.to_string();
        BlockingAction::run_async(&self.handle, Self::panicked(), move || {
            rt.do_undeploy(&name)
        })
        .await
    }

    /// Undeploys everything, handling nested deployments exactly once.
    pub async fn undeploy_all(&self) -> Result<(), DeployError> {
        let rt = self.strong()?;
        BlockingAction::run_async(&self.handle, Self::panicked(), move || rt.do_undeploy_all())
            .await
    }

    /// Shuts the platform down: closes the redeploy engine and stops the
    /// timer, draining its pending timeouts into the returned future.
    pub fn stop(&self) -> ActionFuture<Vec<Timeout>, TimerError> {
        if let Some(redeployer) = self.redeployer.write().expect("redeployer poisoned").take() {
            redeployer.close();
        }
        self.timer.stop()
    }

    fn strong(&self) -> Result<Arc<Self>, DeployError> {
        self.self_ref.upgrade().ok_or(DeployError::Internal {
            reason: "runtime already dropped".into(),
        })
    }

    fn panicked() -> DeployError {
        DeployError::Internal {
            reason: "deployment action panicked".into(),
        }
    }

    // ---------------------------
    // Blocking core (worker only)
    // ---------------------------

    fn do_deploy_module(
        &self,
        redeploy: bool,
        request: ModuleDeployment,
    ) -> Result<String, DeployError> {
        require_worker_context()?;
        if request.instances == 0 {
            return Err(DeployError::Validation {
                reason: "instance count must be at least 1".into(),
            });
        }

        let deps = self.resolver.install(&request.module);
        if deps.failed() {
            self.bus.publish(
                Event::new(EventKind::DeployFailed).with_module(&request.module),
            );
            return Err(deps.into_error().expect("failed resolution has an error"));
        }

        let config = self.resolver.module_config(&request.module)?;
        let main = config.main.clone().ok_or(DeployError::MissingMain {
            module: request.module.clone(),
        })?;

        let mod_dir = self.resolver.module_dir(&request.module);
        let effective_dir = if config.preserve_cwd && request.cwd.is_some() {
            request.cwd.clone()
        } else {
            Some(mod_dir)
        };

        if redeploy {
            info!(module = %request.module, deployment = ?request.name, "redeploying module");
        }

        self.do_deploy(DeploySpec {
            name: request.name,
            module: Some(request.module),
            main,
            worker: config.worker,
            auto_redeploy: config.auto_redeploy,
            config: request.config,
            classpath: deps.urls,
            instances: request.instances,
            mod_dir: effective_dir,
            parent: request.parent,
        })
    }

    fn do_deploy_verticle(&self, request: VerticleDeployment) -> Result<String, DeployError> {
        require_worker_context()?;
        if request.instances == 0 {
            return Err(DeployError::Validation {
                reason: "instance count must be at least 1".into(),
            });
        }

        let mut classpath = request.classpath;
        if let Some(includes) = request.includes.as_deref() {
            let mut deps = ModuleDependencies::with_classpath(request.main.as_str(), classpath);
            for include in crate::module::parse_include_list(includes) {
                self.resolver.resolve_into(&mut deps, &include);
                if deps.failed() {
                    return Err(deps.into_error().expect("failed resolution has an error"));
                }
            }
            classpath = deps.urls;
        }

        self.do_deploy(DeploySpec {
            name: request.name,
            module: None,
            main: request.main,
            worker: request.worker,
            auto_redeploy: false,
            config: request.config,
            classpath,
            instances: request.instances,
            mod_dir: request.cwd,
            parent: request.parent,
        })
    }

    fn do_deploy(&self, spec: DeploySpec) -> Result<String, DeployError> {
        require_worker_context()?;
        let runtime = self.strong()?;

        // Factory selection happens before the tree is touched: a
        // configuration failure must leave no partial insertion behind.
        let factory = self.factories.select(&spec.main, &self.langs)?;

        let config = Arc::new(spec.config);
        let deployment = Arc::new(Deployment::new(
            spec.name,
            spec.module.clone(),
            spec.instances,
            config.clone(),
            spec.classpath.clone(),
            spec.mod_dir.clone(),
            spec.parent.clone(),
            spec.auto_redeploy,
        ));
        let name = deployment.name().to_string();
        self.tree.insert(spec.parent.as_deref(), deployment.clone())?;

        debug!(
            deployment = %name,
            main = %spec.main,
            instances = spec.instances,
            "deploying"
        );

        let done: ActionFuture<bool, DeployError> = ActionFuture::new();
        let agg = {
            let latch = done.clone();
            CountingCompletionHandler::new(move |success| {
                latch.complete(Ok(success));
            })
        };

        let kind = if spec.worker {
            ContextKind::Worker
        } else {
            ContextKind::EventLoop
        };
        // Worker instances share one scope so singleton state is shared;
        // non-workers each get their own.
        let shared_scope = spec
            .worker
            .then(|| Arc::new(InstanceScope::new(spec.classpath.clone())));

        for index in 0..spec.instances {
            agg.inc_required();
            let scope = shared_scope
                .clone()
                .unwrap_or_else(|| Arc::new(InstanceScope::new(spec.classpath.clone())));
            let context = ExecutionContext::new(kind, self.handle.clone());
            let cx = VerticleContext {
                deployment: name.clone(),
                instance: index,
                config: config.clone(),
                scope: scope.clone(),
                logger: format!("modvisor.deployments.{name}-{index}"),
                bus: self.bus.clone(),
                timer: self.timer.clone(),
                runtime: Arc::downgrade(&runtime),
            };
            let main = spec.main.clone();
            let factory = factory.clone();
            let deployment = deployment.clone();
            let agg = agg.clone();
            let rt = runtime.clone();
            let holder_context = context.clone();
            context.run(async move {
                let verticle = match factory.create(&main, scope).await {
                    Ok(verticle) => verticle,
                    Err(e) => {
                        error!(deployment = %cx.deployment, main = %main, error = %e, "failed to create verticle");
                        rt.bus.publish(
                            Event::new(EventKind::InstanceFailed)
                                .with_deployment(&cx.deployment)
                                .with_instance(index)
                                .with_error(e.to_string()),
                        );
                        rt.rollback_failed_instance(cx.deployment.clone(), agg);
                        return;
                    }
                };

                // Register before start, so the rollback path stops this
                // instance along with the rest.
                let holder = Arc::new(VerticleHolder {
                    index,
                    context: holder_context,
                    verticle: AsyncMutex::new(Some(verticle)),
                    logger_name: cx.logger.clone(),
                    config: cx.config.clone(),
                });
                deployment.add_holder(holder.clone());

                let started = {
                    let mut guard = holder.verticle.lock().await;
                    match guard.as_mut() {
                        Some(verticle) => verticle.start(&cx).await,
                        // Already stopped by a concurrent rollback.
                        None => Ok(()),
                    }
                };
                match started {
                    Ok(()) => {
                        rt.bus.publish(
                            Event::new(EventKind::InstanceStarted)
                                .with_deployment(&cx.deployment)
                                .with_instance(index),
                        );
                        agg.complete(true);
                    }
                    Err(e) => {
                        error!(deployment = %cx.deployment, main = %main, error = %e, "verticle failed to start");
                        rt.bus.publish(
                            Event::new(EventKind::InstanceFailed)
                                .with_deployment(&cx.deployment)
                                .with_instance(index)
                                .with_error(e.to_string()),
                        );
                        rt.rollback_failed_instance(cx.deployment.clone(), agg);
                    }
                }
            });
        }
        agg.seal();

        let success = done.wait().unwrap_or(false);
        if success {
            info!(deployment = %name, "deployed");
            let mut event = Event::new(EventKind::Deployed).with_deployment(&name);
            if let Some(module) = deployment.module() {
                event = event.with_module(module);
            }
            self.bus.publish(event);
            if spec.auto_redeploy && deployment.module().is_some() {
                if let Some(redeployer) = self.redeployer() {
                    redeployer.module_deployed(&deployment);
                }
            }
            Ok(name)
        } else {
            self.bus
                .publish(Event::new(EventKind::DeployFailed).with_deployment(&name));
            // Instances that registered after the rollback pass are cleared here.
            let _ = self.do_undeploy(&name);
            Err(DeployError::InstanceFailed {
                main: spec.main,
                reason: "one or more instances failed to start".into(),
            })
        }
    }

    /// Error-path undeploy: rolls the deployment back on a worker thread,
    /// then reports this instance as failed.
    fn rollback_failed_instance(&self, deployment: String, agg: CountingCompletionHandler) {
        let Ok(rt) = self.strong() else {
            agg.complete(false);
            return;
        };
        let _ = BlockingAction::run::<(), (), _>(&self.handle, (), move || {
            if let Err(e) = rt.do_undeploy(&deployment) {
                debug!(deployment = %deployment, error = %e, "rollback found deployment already gone");
            }
            agg.complete(false);
            Ok(())
        });
    }

    fn do_undeploy(&self, name: &str) -> Result<(), DeployError> {
        require_worker_context()?;
        let deployment = self
            .tree
            .take(name)
            .ok_or_else(|| DeployError::DeploymentNotFound {
                name: name.to_string(),
            })?;
        info!(deployment = name, "undeploying");

        // Depth-first: every child subtree completes before this node's
        // instances stop and before its slot in the parent is cleared.
        for child in deployment.child_names() {
            if let Err(e) = self.do_undeploy(&child) {
                debug!(child = %child, error = %e, "child already undeployed");
            }
        }

        let done: ActionFuture<bool, DeployError> = ActionFuture::new();
        let agg = {
            let latch = done.clone();
            CountingCompletionHandler::new(move |success| {
                latch.complete(Ok(success));
            })
        };
        for holder in deployment.holders() {
            agg.inc_required();
            let agg = agg.clone();
            let bus = self.bus.clone();
            let dep_name = name.to_string();
            let context = holder.context.clone();
            context.run(async move {
                let stopped = {
                    let mut guard = holder.verticle.lock().await;
                    match guard.take() {
                        Some(mut verticle) => verticle.stop().await,
                        None => Ok(()),
                    }
                };
                if let Err(e) = &stopped {
                    error!(deployment = %dep_name, instance = holder.index, error = %e, "verticle failed to stop");
                    bus.publish(
                        Event::new(EventKind::InstanceFailed)
                            .with_deployment(&dep_name)
                            .with_instance(holder.index)
                            .with_error(e.to_string()),
                    );
                }
                // Close hooks run before the instance logger is retired.
                holder.context.run_close_hooks();
                debug!(logger = %holder.logger_name, "instance logger retired");
                agg.complete(stopped.is_ok());
            });
        }
        agg.seal();
        let _ = done.wait();

        if let Some(parent) = deployment.parent() {
            self.tree.detach(parent, name);
        }
        if deployment.auto_redeploy() && deployment.module().is_some() {
            if let Some(redeployer) = self.redeployer() {
                redeployer.module_undeployed(&deployment);
            }
        }
        let mut event = Event::new(EventKind::Undeployed).with_deployment(name);
        if let Some(module) = deployment.module() {
            event = event.with_module(module);
        }
        self.bus.publish(event);
        Ok(())
    }

    fn do_undeploy_all(&self) -> Result<(), DeployError> {
        require_worker_context()?;
        // Undeploy is recursive, so always restart from a fresh snapshot to
        // avoid touching a child twice.
        while let Some(name) = self.tree.names().into_iter().next() {
            let _ = self.do_undeploy(&name);
        }
        Ok(())
    }

    fn reload_one(&self, previous: &Arc<Deployment>) {
        let Some(module) = previous.module() else {
            debug!(deployment = %previous.name(), "not a module deployment, skipping reload");
            return;
        };

        if self.tree.get(previous.name()).is_some() {
            if let Err(e) = self.do_undeploy(previous.name()) {
                error!(deployment = %previous.name(), error = %e, "undeploy before reload failed");
            }
        }
        // The entry may be absent if the previous deployment failed, e.g. a
        // code error in a user verticle; redeploy regardless.

        let request = ModuleDeployment {
            module: module.to_string(),
            config: previous.config().as_ref().clone(),
            instances: previous.instances(),
            name: Some(previous.name().to_string()),
            parent: None,
            cwd: None,
        };
        match self.do_deploy_module(true, request) {
            Ok(name) => info!(deployment = %name, "redeployed"),
            Err(e) => error!(deployment = %previous.name(), error = %e, "redeploy failed"),
        }
    }
}

impl Reloader for VerticleRuntime {
    /// Undeploys then redeploys every affected deployment, on a worker
    /// thread. Fire-and-forget: failures are logged and published.
    fn reload_modules(&self, deployments: Vec<Arc<Deployment>>) {
        let Ok(rt) = self.strong() else {
            return;
        };
        for dep in &deployments {
            let mut event = Event::new(EventKind::RedeployRequested).with_deployment(dep.name());
            if let Some(module) = dep.module() {
                event = event.with_module(module);
            }
            self.bus.publish(event);
        }
        let _ = BlockingAction::run::<(), (), _>(&self.handle, (), move || {
            for dep in deployments {
                rt.reload_one(&dep);
            }
            Ok(())
        });
    }
}

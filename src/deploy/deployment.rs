//! # Per-deployment record.
//!
//! A [`Deployment`] is a live, named instantiation of a module (or an ad-hoc
//! verticle main) with `instances` execution units. Deployments form a tree:
//! a verticle that deploys something becomes its parent, and undeploy walks
//! children first.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::context::ExecutionContext;
use super::verticle::Verticle;

/// One verticle instance of a deployment.
pub struct VerticleHolder {
    /// Instance index within the deployment.
    pub index: usize,
    /// Context the instance's lifecycle hooks run on.
    pub context: ExecutionContext,
    /// The instance itself; taken out exactly once when it is stopped.
    pub verticle: AsyncMutex<Option<Box<dyn Verticle>>>,
    /// Per-instance logger name; retired when the instance stops.
    pub logger_name: String,
    /// Config snapshot the instance started with.
    pub config: Arc<serde_json::Value>,
}

/// A live, named deployment.
pub struct Deployment {
    name: String,
    module: Option<String>,
    instances: usize,
    config: Arc<serde_json::Value>,
    classpath: Vec<PathBuf>,
    mod_dir: Option<PathBuf>,
    parent: Option<String>,
    auto_redeploy: bool,
    verticles: Mutex<Vec<Arc<VerticleHolder>>>,
    children: Mutex<Vec<String>>,
}

impl Deployment {
    /// Creates a deployment record; `name` defaults to a fresh
    /// `deployment-<uuid>`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: Option<String>,
        module: Option<String>,
        instances: usize,
        config: Arc<serde_json::Value>,
        classpath: Vec<PathBuf>,
        mod_dir: Option<PathBuf>,
        parent: Option<String>,
        auto_redeploy: bool,
    ) -> Self {
        Self {
            name: name.unwrap_or_else(Self::generated_name),
            module,
            instances,
            config,
            classpath,
            mod_dir,
            parent,
            auto_redeploy,
            verticles: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Fresh unique deployment name.
    pub fn generated_name() -> String {
        format!("deployment-{}", Uuid::new_v4())
    }

    /// Unique deployment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module this deployment runs, if any (ad-hoc verticles have none).
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Requested instance count.
    pub fn instances(&self) -> usize {
        self.instances
    }

    /// Config snapshot shared by all instances.
    pub fn config(&self) -> &Arc<serde_json::Value> {
        &self.config
    }

    /// Resolved classpath, in precedence order.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Effective module directory, if deployed from a module.
    pub fn mod_dir(&self) -> Option<&Path> {
        self.mod_dir.as_deref()
    }

    /// Name of the parent deployment, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// True if the redeployer watches this deployment's module directory.
    pub fn auto_redeploy(&self) -> bool {
        self.auto_redeploy
    }

    /// Registers a started instance.
    pub(crate) fn add_holder(&self, holder: Arc<VerticleHolder>) {
        self.verticles.lock().expect("verticles poisoned").push(holder);
    }

    /// Snapshot of the registered instances.
    pub(crate) fn holders(&self) -> Vec<Arc<VerticleHolder>> {
        self.verticles.lock().expect("verticles poisoned").clone()
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.verticles.lock().expect("verticles poisoned").len()
    }

    /// Snapshot of the child deployment names.
    pub fn child_names(&self) -> Vec<String> {
        self.children.lock().expect("children poisoned").clone()
    }

    /// True if `name` is already registered as a child.
    pub(crate) fn has_child(&self, name: &str) -> bool {
        self.children
            .lock()
            .expect("children poisoned")
            .iter()
            .any(|c| c == name)
    }

    /// Appends a child name.
    pub(crate) fn add_child(&self, name: &str) {
        self.children
            .lock()
            .expect("children poisoned")
            .push(name.to_string());
    }

    /// Removes a child name, if present.
    pub(crate) fn remove_child(&self, name: &str) {
        self.children
            .lock()
            .expect("children poisoned")
            .retain(|c| c != name);
    }
}

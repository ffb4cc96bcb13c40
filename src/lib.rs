//! # modvisor
//!
//! **Modvisor** is the deployment/runtime machinery of a modular server
//! platform: it resolves modules and their transitive includes into
//! classpaths, launches supervised verticle instances out of them, watches
//! module directories for changes, and drives every time-based event through
//! a hashed-wheel timer.
//!
//! ## Features
//!
//! | Area            | Description                                                        | Key types / traits                          |
//! |-----------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Timer**       | Approximate O(1) hashed-wheel timer, thread or event-loop hosted.  | [`Timer`], [`WheelTimer`], [`LoopTimer`]    |
//! | **Modules**     | Manifests, include graphs, repositories, classpath resolution.     | [`ModuleConfig`], [`ModuleResolver`]        |
//! | **Deployment**  | Parent/child deployment tree, instance lifecycle, rollback.        | [`VerticleRuntime`], [`DeploymentTree`]     |
//! | **Redeploy**    | Quiesced-change detection, polling or native watching.             | [`Redeployer`], [`PollingRedeployer`]       |
//! | **Primitives**  | Latched futures, counting completion, blocking actions.            | [`ActionFuture`], [`BlockingAction`]        |
//! | **Events**      | Broadcast lifecycle events for observers.                          | [`Bus`], [`Event`], [`EventKind`]           |
//! | **Errors**      | Typed errors per subsystem with stable labels.                     | [`TimerError`], [`DeployError`]             |
//!
//! ```no_run
//! use std::sync::Arc;
//! use modvisor::{
//!     Bus, FactoryRegistry, ModuleDeployment, PlatformConfig, PollingRedeployer,
//!     Reloader, VerticleRuntime, WheelTimer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = PlatformConfig::default();
//!     cfg.langs.insert("default".into(), "native".into());
//!
//!     let bus = Bus::new(cfg.bus_capacity);
//!     let timer = WheelTimer::with_defaults();
//!     let factories = FactoryRegistry::new(); // register factories here
//!
//!     let runtime = VerticleRuntime::new(&cfg, factories, Vec::new(), timer, bus.clone())?;
//!     let reloader_strong: Arc<dyn Reloader> = runtime.clone();
//!     let reloader: std::sync::Weak<dyn Reloader> = Arc::downgrade(&reloader_strong);
//!     let redeployer =
//!         PollingRedeployer::new(runtime.timer().as_ref(), cfg.check_period, reloader, bus)?;
//!     runtime.attach_redeployer(redeployer);
//!
//!     let name = runtime.deploy_module(ModuleDeployment::new("my-mod")).await?;
//!     println!("deployed as {name}");
//!
//!     runtime.undeploy(&name).await?;
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! Two thread families do all the work: event-loop style async tasks (timer
//! dispatch in mode B, non-worker verticles) and worker threads (deploy,
//! undeploy, install, worker verticles). All timer-wheel mutations happen on
//! exactly one owner thread per timer; deployment mutations are serialized
//! through the blocking pool and guarded by a worker-context check. A
//! multi-threaded tokio runtime is required.

mod actions;
mod config;
mod deploy;
mod error;
mod events;
mod module;
mod redeploy;
mod time;

// ---- Public re-exports ----

pub use actions::{
    is_worker_context, require_worker_context, ActionFuture, ActionOutcome, BlockingAction,
    CountingCompletionHandler,
};
pub use config::{PlatformConfig, DEFAULT_MOD_ROOT, MOD_ROOT_ENV};
pub use deploy::{
    ContextKind, Deployment, DeploymentTree, ExecutionContext, FactoryRegistry, InstanceScope,
    ModuleDeployment, Verticle, VerticleContext, VerticleDeployment, VerticleError,
    VerticleFactory, VerticleHolder, VerticleRuntime,
};
pub use error::{DeployError, RepoError, TimerError};
pub use events::{Bus, Event, EventKind};
pub use module::{
    Module, ModuleConfig, ModuleDependencies, ModuleRepository, ModuleResolver, ModuleVisitor,
    ModuleWalker, VisitResult,
};
pub use redeploy::{PollingRedeployer, Redeployer, Reloader, WatchRedeployer};
pub use time::{
    Clock, LoopTimer, ManualClock, SystemClock, Timeout, TimeoutState, Timer, TimerTask,
    TimerTaskRef, TimerWorker, WheelTimer,
};

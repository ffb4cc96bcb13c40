//! Automatic redeploy: watching module directories and reloading the
//! deployments bound to them.
//!
//! Two interchangeable engines sit behind the [`Redeployer`] contract:
//!
//! - [`PollingRedeployer`] — a periodic timer tick walks each registered
//!   file tree comparing timestamps; robust everywhere.
//! - [`WatchRedeployer`] — the OS file-change facility marks modules dirty;
//!   a grace tick emits once a tree has been silent for one check period.
//!
//! Both collapse write bursts: no reload is emitted while changes keep
//! arriving, and all deployments of a changed module are reloaded as one
//! set so the [`Reloader`] can batch undeploy/redeploy.

mod poller;
mod registry;
mod watcher;

pub use poller::PollingRedeployer;
pub use watcher::WatchRedeployer;

pub(crate) use registry::WatchRegistry;

use std::sync::Arc;

use crate::deploy::Deployment;

/// Contract both redeploy engines implement.
///
/// Registration is keyed by module: deployments of the same module share one
/// watched directory, and the module is unwatched once its last deployment
/// goes away.
pub trait Redeployer: Send + Sync {
    /// Starts watching the deployment's module directory.
    ///
    /// Ignored for deployments without a module directory.
    fn module_deployed(&self, deployment: &Arc<Deployment>);

    /// Drops the deployment from its module's registration; the module is
    /// unwatched once no deployments remain.
    fn module_undeployed(&self, deployment: &Arc<Deployment>);

    /// Shuts the engine down. Idempotent; timer or watcher events arriving
    /// after close are silently dropped.
    fn close(&self);
}

/// Callback both engines deliver quiesced changes to.
///
/// Implemented by the verticle runtime: undeploy every affected deployment,
/// then redeploy it with its recorded module, config and instance count.
pub trait Reloader: Send + Sync {
    /// Reloads the given deployments (all bound to one changed module).
    fn reload_modules(&self, deployments: Vec<Arc<Deployment>>);
}

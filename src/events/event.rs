//! # Lifecycle events emitted by the runtime, resolver and redeploy engines.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Module events**: install/uninstall and filesystem change detection
//! - **Deployment events**: deploy/undeploy flow and per-instance launches
//! - **Redeploy events**: quiesced-change reloads
//!
//! The [`Event`] struct carries metadata such as the deployment name, module
//! name, instance index and error text.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered even when delivered out-of-order
//! through async channels.
//!
//! ## Event flow examples
//!
//! ### Module deployment flow
//! ```text
//! VerticleRuntime::deploy_module()
//!   → ModuleInstalled (per module pulled from a repository)
//!   → InstanceStarted (per instance)
//!   → Deployed            (all instances up)
//!   | DeployFailed        (any instance failed; rollback undeploy ran)
//! ```
//!
//! ### Redeploy flow
//! ```text
//! [file change burst] → [quiet for one check period]
//!   → ModuleChanged
//!   → RedeployRequested
//!   → Undeployed → Deployed (per bound deployment)
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Module events ===
    /// A module was installed from a repository into the module root.
    ModuleInstalled,
    /// A module directory was removed from the module root.
    ModuleUninstalled,
    /// A watched module's file tree changed and then went quiet.
    ModuleChanged,

    // === Deployment events ===
    /// All instances of a deployment started successfully.
    Deployed,
    /// Deployment failed; any partially created instances were rolled back.
    DeployFailed,
    /// A deployment (and, before it, all of its children) was undeployed.
    Undeployed,
    /// A single verticle instance started.
    InstanceStarted,
    /// A single verticle instance failed to start or stop.
    InstanceFailed,

    // === Redeploy events ===
    /// A set of deployments bound to a changed module is being reloaded.
    RedeployRequested,
    /// A redeploy engine was closed; further watcher/timer fires no-op.
    RedeployerClosed,
}

/// Runtime event with optional metadata.
///
/// ## Fields
/// - `seq`: Unique sequence number for ordering (monotonically increasing)
/// - `at`: Wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: Event classification
/// - `deployment`, `module`, `instance`, `error`: Optional metadata
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Deployment name, if applicable.
    pub deployment: Option<String>,
    /// Module name, if applicable.
    pub module: Option<String>,
    /// Instance index within a deployment (starting from 0).
    pub instance: Option<usize>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            deployment: None,
            module: None,
            instance: None,
            error: None,
        }
    }

    /// Attaches a deployment name.
    pub fn with_deployment(mut self, name: impl Into<String>) -> Self {
        self.deployment = Some(name.into());
        self
    }

    /// Attaches a module name.
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    /// Attaches an instance index.
    pub fn with_instance(mut self, index: usize) -> Self {
        self.instance = Some(index);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::Deployed);
        let b = Event::new(EventKind::Undeployed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::new(EventKind::DeployFailed)
            .with_deployment("dep-1")
            .with_module("my-mod")
            .with_instance(2)
            .with_error("boom");
        assert_eq!(ev.deployment.as_deref(), Some("dep-1"));
        assert_eq!(ev.module.as_deref(), Some("my-mod"));
        assert_eq!(ev.instance, Some(2));
        assert_eq!(ev.error.as_deref(), Some("boom"));
    }
}

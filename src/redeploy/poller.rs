//! # Polling redeploy engine.
//!
//! A periodic tick on the platform timer walks each registered module tree
//! comparing every entry's `max(modified, created)` timestamp against the
//! previous scan. A tree that changed in one scan and then stayed quiet for
//! the next is considered quiesced, and its deployments are reloaded.
//!
//! This is the engine of choice where the OS file-change facility is flaky;
//! it trades a little latency (up to two check periods) for portability.
//!
//! ## Rules
//! - A write burst never triggers a reload mid-burst: the changed flag is
//!   re-armed every scan that still sees changes.
//! - Scan windows overlap slightly (the timestamp floor is taken before the
//!   walk); an event counted twice is harmless, a gap would not be.
//! - Close is idempotent; a tick that fires after close cancels the
//!   engine's own periodic timeout and does nothing else.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::deploy::Deployment;
use crate::error::TimerError;
use crate::events::{Bus, Event, EventKind};
use crate::time::{Timeout, Timer};

use super::{Redeployer, Reloader, WatchRegistry};

/// File-tree scanning redeploy engine.
pub struct PollingRedeployer {
    registry: WatchRegistry,
    /// Module -> "changed during the previous scan".
    changed: DashMap<String, bool>,
    /// Timestamp floor for the next scan.
    last_scan: Mutex<SystemTime>,
    closed: AtomicBool,
    tick: Mutex<Option<Timeout>>,
    reloader: Weak<dyn Reloader>,
    bus: Bus,
}

impl PollingRedeployer {
    /// Creates the engine and arms its periodic scan on `timer`.
    pub fn new(
        timer: &dyn Timer,
        check_period: Duration,
        reloader: Weak<dyn Reloader>,
        bus: Bus,
    ) -> Result<Arc<Self>, TimerError> {
        let engine = Arc::new(Self {
            registry: WatchRegistry::new(),
            changed: DashMap::new(),
            last_scan: Mutex::new(SystemTime::now()),
            closed: AtomicBool::new(false),
            tick: Mutex::new(None),
            reloader,
            bus,
        });

        let weak = Arc::downgrade(&engine);
        let timeout = timer.new_timeout(
            Arc::new(move |timeout: &Timeout| {
                if let Some(engine) = weak.upgrade() {
                    engine.on_tick(timeout);
                }
            }),
            check_period,
            true,
        )?;
        *engine.tick.lock().expect("tick poisoned") = Some(timeout);
        Ok(engine)
    }

    fn on_tick(&self, timeout: &Timeout) {
        // Shutdown is asynchronous; a late fire cancels the timer itself.
        if self.closed.load(Ordering::Acquire) {
            timeout.cancel();
            return;
        }
        self.scan();
    }

    /// Walks every registered tree once, emitting quiesced modules.
    fn scan(&self) {
        let scan_started = SystemTime::now();
        let since = *self.last_scan.lock().expect("last_scan poisoned");

        for (module, dir) in self.registry.modules() {
            let changed_now = tree_changed_since(&dir, since);
            let changed_before = self.changed.insert(module.clone(), changed_now).unwrap_or(false);
            if changed_before && !changed_now {
                self.emit(&module);
            }
        }

        *self.last_scan.lock().expect("last_scan poisoned") = scan_started;
    }

    fn emit(&self, module: &str) {
        let deployments = self.registry.deployments_of(module);
        if deployments.is_empty() {
            return;
        }
        info!(module, count = deployments.len(), "module quiesced after change, reloading");
        self.bus
            .publish(Event::new(EventKind::ModuleChanged).with_module(module));
        if let Some(reloader) = self.reloader.upgrade() {
            reloader.reload_modules(deployments);
        }
    }
}

impl Redeployer for PollingRedeployer {
    fn module_deployed(&self, deployment: &Arc<Deployment>) {
        if let Some(dir) = self.registry.add(deployment) {
            debug!(module = ?deployment.module(), dir = %dir.display(), "watching module directory");
        }
    }

    fn module_undeployed(&self, deployment: &Arc<Deployment>) {
        if self.registry.remove(deployment).is_some() {
            if let Some(module) = deployment.module() {
                self.changed.remove(module);
                debug!(module, "module directory unwatched");
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timeout) = self.tick.lock().expect("tick poisoned").take() {
            timeout.cancel();
        }
        self.bus.publish(Event::new(EventKind::RedeployerClosed));
    }
}

/// True if any entry under `dir` has `max(modified, created) > since`.
///
/// A subdirectory deleted between scans simply stops contributing
/// timestamps; the deletion itself bumps the parent directory's mtime and is
/// picked up that way.
fn tree_changed_since(dir: &Path, since: SystemTime) -> bool {
    let Ok(meta) = fs::symlink_metadata(dir) else {
        return false;
    };
    if entry_changed(&meta, since) {
        return true;
    }
    if !meta.is_dir() {
        return false;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "cannot list watched directory");
        return false;
    };
    for entry in entries.flatten() {
        if tree_changed_since(&entry.path(), since) {
            return true;
        }
    }
    false
}

fn entry_changed(meta: &fs::Metadata, since: SystemTime) -> bool {
    let modified = meta.modified().ok();
    let created = meta.created().ok();
    match (modified, created) {
        (Some(m), Some(c)) => m.max(c) > since,
        (Some(m), None) => m > since,
        (None, Some(c)) => c > since,
        (None, None) => false,
    }
}

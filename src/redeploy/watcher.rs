//! # Native watcher redeploy engine.
//!
//! Each registered module directory is subscribed recursively with the OS
//! file-change facility. Create/modify/delete events at any depth mark the
//! owning module dirty and stamp the time of the last event; a grace tick on
//! the platform timer emits the module's deployments once its tree has been
//! silent for one check period.
//!
//! ## Rules
//! - Bursts collapse: every event pushes the quiescence window out, so a
//!   module under active write never reloads mid-burst.
//! - Watcher callbacks run on the watcher's own thread; shared state is
//!   limited to the dirty map and the closed flag.
//! - Close is idempotent: it cancels the grace tick and drops the watcher;
//!   events already in flight see the closed flag and no-op.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::deploy::Deployment;
use crate::error::DeployError;
use crate::events::{Bus, Event, EventKind};
use crate::time::{Timeout, Timer};

use super::{Redeployer, Reloader, WatchRegistry};

/// Dirty-state of one watched module.
struct ChangeState {
    dirty: bool,
    last_event: Instant,
}

/// OS-notification redeploy engine.
pub struct WatchRedeployer {
    registry: Arc<WatchRegistry>,
    state: Arc<DashMap<String, ChangeState>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    check_period: Duration,
    closed: Arc<AtomicBool>,
    tick: Mutex<Option<Timeout>>,
    reloader: Weak<dyn Reloader>,
    bus: Bus,
}

impl WatchRedeployer {
    /// Creates the engine: an OS watcher plus a grace tick on `timer`.
    pub fn new(
        timer: &dyn Timer,
        check_period: Duration,
        reloader: Weak<dyn Reloader>,
        bus: Bus,
    ) -> Result<Arc<Self>, DeployError> {
        let registry = Arc::new(WatchRegistry::new());
        let state: Arc<DashMap<String, ChangeState>> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let watcher = {
            let registry = Arc::clone(&registry);
            let state = Arc::clone(&state);
            let closed = Arc::clone(&closed);
            recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
                if closed.load(Ordering::Acquire) {
                    return;
                }
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "file watcher error");
                        return;
                    }
                };
                if matches!(event.kind, notify::EventKind::Access(_)) {
                    return;
                }
                for path in &event.paths {
                    if let Some(module) = registry.module_owning(path) {
                        state.insert(
                            module,
                            ChangeState {
                                dirty: true,
                                last_event: Instant::now(),
                            },
                        );
                    }
                }
            })
            .map_err(|e| DeployError::Internal {
                reason: format!("cannot create file watcher: {e}"),
            })?
        };

        let engine = Arc::new(Self {
            registry,
            state,
            watcher: Mutex::new(Some(watcher)),
            check_period,
            closed,
            tick: Mutex::new(None),
            reloader,
            bus,
        });

        let weak = Arc::downgrade(&engine);
        let timeout = timer
            .new_timeout(
                Arc::new(move |timeout: &Timeout| {
                    if let Some(engine) = weak.upgrade() {
                        engine.on_grace_tick(timeout);
                    }
                }),
                check_period,
                true,
            )
            .map_err(|e| DeployError::Internal {
                reason: format!("cannot arm grace timer: {e}"),
            })?;
        *engine.tick.lock().expect("tick poisoned") = Some(timeout);
        Ok(engine)
    }

    /// Emits every module that went dirty and then stayed silent for one
    /// check period.
    fn on_grace_tick(&self, timeout: &Timeout) {
        if self.closed.load(Ordering::Acquire) {
            timeout.cancel();
            return;
        }
        let mut quiesced = Vec::new();
        for mut entry in self.state.iter_mut() {
            if entry.dirty && entry.last_event.elapsed() >= self.check_period {
                entry.dirty = false;
                quiesced.push(entry.key().clone());
            }
        }
        for module in quiesced {
            self.emit(&module);
        }
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

    fn watch_dir(&self, dir: &Path) {
        let mut guard = self.watcher.lock().expect("watcher poisoned");
        if let Some(watcher) = guard.as_mut() {
            if let Err(e) = watcher.watch(dir, RecursiveMode::Recursive) {
                warn!(dir = %dir.display(), error = %e, "cannot watch module directory");
            }
        }
    }

    fn unwatch_dir(&self, dir: &Path) {
        let mut guard = self.watcher.lock().expect("watcher poisoned");
        if let Some(watcher) = guard.as_mut() {
            let _ = watcher.unwatch(dir);
        }
    }
}

impl Redeployer for WatchRedeployer {
    fn module_deployed(&self, deployment: &Arc<Deployment>) {
        if let Some(dir) = self.registry.add(deployment) {
            debug!(module = ?deployment.module(), dir = %dir.display(), "watching module directory");
            self.watch_dir(&dir);
        }
    }

    fn module_undeployed(&self, deployment: &Arc<Deployment>) {
        if let Some(dir) = self.registry.remove(deployment) {
            self.unwatch_dir(&dir);
            if let Some(module) = deployment.module() {
                self.state.remove(module);
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
        // Dropping the watcher tears down its OS subscriptions and thread.
        let _ = self.watcher.lock().expect("watcher poisoned").take();
        self.bus.publish(Event::new(EventKind::RedeployerClosed));
    }
}

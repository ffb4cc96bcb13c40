//! # Shared registration bookkeeping for the redeploy engines.
//!
//! Maps a module name to its watched directory and the set of deployments
//! bound to it. Registrations arrive from worker threads while the engines
//! read from timer or watcher threads, so the map is concurrent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::deploy::Deployment;

struct Registration {
    dir: PathBuf,
    deployments: HashMap<String, Arc<Deployment>>,
}

/// Module name -> watched directory + bound deployments.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    modules: DashMap<String, Registration>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a deployment under its module.
    ///
    /// Returns the directory to start watching if this is the module's first
    /// registration. Deployments without a module directory are ignored.
    pub fn add(&self, deployment: &Arc<Deployment>) -> Option<PathBuf> {
        let module = deployment.module()?.to_string();
        let dir = deployment.mod_dir()?.to_path_buf();

        let mut first = None;
        self.modules
            .entry(module)
            .and_modify(|reg| {
                reg.deployments
                    .insert(deployment.name().to_string(), Arc::clone(deployment));
            })
            .or_insert_with(|| {
                first = Some(dir.clone());
                Registration {
                    dir,
                    deployments: HashMap::from([(
                        deployment.name().to_string(),
                        Arc::clone(deployment),
                    )]),
                }
            });
        first
    }

    /// Unregisters a deployment.
    ///
    /// Returns the directory to stop watching if this was the module's last
    /// deployment.
    pub fn remove(&self, deployment: &Arc<Deployment>) -> Option<PathBuf> {
        let module = deployment.module()?;
        let mut emptied = None;
        if let Some(mut reg) = self.modules.get_mut(module) {
            reg.deployments.remove(deployment.name());
            if reg.deployments.is_empty() {
                emptied = Some(reg.dir.clone());
            }
        }
        if emptied.is_some() {
            self.modules.remove(module);
        }
        emptied
    }

    /// Deployments currently bound to `module`, deduplicated by name.
    pub fn deployments_of(&self, module: &str) -> Vec<Arc<Deployment>> {
        self.modules
            .get(module)
            .map(|reg| reg.deployments.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every registered module and its directory.
    pub fn modules(&self) -> Vec<(String, PathBuf)> {
        self.modules
            .iter()
            .map(|e| (e.key().clone(), e.value().dir.clone()))
            .collect()
    }

    /// Module owning `path`, if any registered directory contains it.
    pub fn module_owning(&self, path: &std::path::Path) -> Option<String> {
        self.modules
            .iter()
            .find(|e| path.starts_with(&e.value().dir))
            .map(|e| e.key().clone())
    }
}

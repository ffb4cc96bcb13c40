//! # Typed view over a module manifest (`mod.json`).
//!
//! Every installed module carries a JSON manifest at
//! `<mod_root>/<name>/mod.json`. Recognized fields:
//!
//! | Field | Type | Effect |
//! |---|---|---|
//! | `main` | string | Entry point; its extension selects the language factory. Absent for library modules. |
//! | `worker` | bool | Instances share one scope and run on worker threads. |
//! | `preserve-cwd` | bool | Effective working directory is the invoking module's, not its own. |
//! | `auto-redeploy` | bool | The redeployer watches this module's directory. |
//! | `includes` | string | Comma-separated module names added to the classpath transitively. |
//!
//! Unknown fields are ignored; all booleans default to false.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::DeployError;

/// Manifest file name inside a module directory.
pub const MOD_JSON: &str = "mod.json";

/// Typed view over a module's `mod.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleConfig {
    /// Entry point name; a module without one is a library, not runnable.
    #[serde(default)]
    pub main: Option<String>,

    /// Worker modules share one instance scope and run on worker threads.
    #[serde(default)]
    pub worker: bool,

    /// Keep the invoking module's working directory instead of this one's.
    #[serde(default, rename = "preserve-cwd")]
    pub preserve_cwd: bool,

    /// Watch this module's directory and redeploy on quiesced change.
    #[serde(default, rename = "auto-redeploy")]
    pub auto_redeploy: bool,

    /// Raw comma-separated include list; use [`ModuleConfig::includes`].
    #[serde(default, rename = "includes")]
    includes_raw: Option<String>,
}

impl ModuleConfig {
    /// Loads and parses `<mod_dir>/mod.json`.
    pub fn load(mod_dir: &Path) -> Result<Self, DeployError> {
        let path = mod_dir.join(MOD_JSON);
        let raw = fs::read_to_string(&path).map_err(|e| DeployError::BadConfig {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| DeployError::BadConfig {
            path,
            reason: e.to_string(),
        })
    }

    /// True if the manifest names an entry point.
    pub fn is_runnable(&self) -> bool {
        self.main.is_some()
    }

    /// The include list, split on commas with empty entries dropped.
    pub fn includes(&self) -> Vec<String> {
        parse_include_list(self.includes_raw.as_deref().unwrap_or(""))
    }
}

/// Directory of module `name` under `mod_root`.
pub(crate) fn mod_dir(mod_root: &Path, name: &str) -> PathBuf {
    mod_root.join(name)
}

/// True if the module directory holds a readable manifest.
pub(crate) fn module_exists(mod_root: &Path, name: &str) -> bool {
    mod_dir(mod_root, name).join(MOD_JSON).is_file()
}

/// Splits a comma-separated module list, trimming and dropping empties.
pub(crate) fn parse_include_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

//! # Global platform configuration.
//!
//! [`PlatformConfig`] defines the runtime's behavior: where modules live on
//! disk, the timer wheel geometry, the redeploy check period, repository
//! install timeouts, the language factory map, and the event bus capacity.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use modvisor::PlatformConfig;
//!
//! let mut cfg = PlatformConfig::default();
//! cfg.check_period = Duration::from_millis(500);
//! cfg.langs.insert("js".into(), "javascript".into());
//!
//! assert_eq!(cfg.tick_duration, Duration::from_millis(100));
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the module root directory.
pub const MOD_ROOT_ENV: &str = "MODVISOR_MODS";

/// Default module root directory, relative to the working directory.
pub const DEFAULT_MOD_ROOT: &str = "mods";

/// Global configuration for the platform runtime.
///
/// Controls the module root, timer geometry, redeploy polling, repository
/// timeouts, language factory selection, and event bus capacity.
#[derive(Clone, Debug)]
pub struct PlatformConfig {
    /// Root directory holding one subdirectory per installed module.
    pub mod_root: PathBuf,
    /// Duration of one timer tick.
    pub tick_duration: Duration,
    /// Number of slots in the timer wheel.
    pub ticks_per_wheel: usize,
    /// Quiescence window of the redeployer; a module must be silent for one
    /// full period before its deployments are reloaded.
    pub check_period: Duration,
    /// How long to wait for a single repository to install a module.
    pub repo_timeout: Duration,
    /// Language factory map: `main` extension -> factory name. The key
    /// `default` is consulted when the extension is unmapped.
    pub langs: HashMap<String, String>,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
}

impl Default for PlatformConfig {
    /// Provides a default configuration:
    /// - `mod_root` = `$MODVISOR_MODS`, falling back to `mods`
    /// - `tick_duration = 100ms`, `ticks_per_wheel = 1024`
    /// - `check_period = 2s`
    /// - `repo_timeout = 30s`
    /// - `langs = {}` (factories are registered programmatically)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            mod_root: mod_root_from_env(),
            tick_duration: Duration::from_millis(100),
            ticks_per_wheel: 1024,
            check_period: Duration::from_secs(2),
            repo_timeout: Duration::from_secs(30),
            langs: HashMap::new(),
            bus_capacity: 1024,
        }
    }
}

impl PlatformConfig {
    /// Merges language mappings from a properties-format file into
    /// [`PlatformConfig::langs`].
    ///
    /// One `extension=factory` pair per line; blank lines and `#`/`!`
    /// comments are skipped. Later entries win over earlier ones.
    pub fn load_langs(&mut self, path: &std::path::Path) -> std::io::Result<()> {
        let raw = std::fs::read_to_string(path)?;
        for (key, value) in parse_properties(&raw) {
            self.langs.insert(key, value);
        }
        Ok(())
    }
}

/// Parses `key=value` property lines, skipping blanks and comments.
fn parse_properties(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Resolves the module root from [`MOD_ROOT_ENV`], ignoring blank values.
fn mod_root_from_env() -> PathBuf {
    match std::env::var(MOD_ROOT_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_MOD_ROOT),
    }
}

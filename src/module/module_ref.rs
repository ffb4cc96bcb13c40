//! # Convenience view over one installed module.
//!
//! [`Module`] binds a module name to a resolver and gives easy access to the
//! data deployments need: the directory, the manifest, the transitive
//! classpath and the files of a subdirectory. The manifest and dependency
//! resolution are loaded lazily and cached for the lifetime of the value.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::DeployError;

use super::config::ModuleConfig;
use super::resolver::{ModuleDependencies, ModuleResolver};

/// Lazy, cached view over one installed module.
pub struct Module<'r> {
    resolver: &'r ModuleResolver,
    name: String,
    dir: PathBuf,
    config: OnceLock<Result<ModuleConfig, DeployError>>,
    dependencies: OnceLock<ModuleDependencies>,
}

impl<'r> Module<'r> {
    /// Creates a view over `name` under the resolver's module root.
    ///
    /// Nothing is read from disk until an accessor needs it.
    pub fn new(resolver: &'r ModuleResolver, name: impl Into<String>) -> Self {
        let name = name.into();
        let dir = resolver.module_dir(&name);
        Self {
            resolver,
            name,
            dir,
            config: OnceLock::new(),
            dependencies: OnceLock::new(),
        }
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module directory under the module root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True if the module is installed (manifest readable).
    pub fn exists(&self) -> bool {
        self.resolver.module_exists(&self.name)
    }

    /// The parsed manifest, loaded on first access.
    pub fn config(&self) -> Result<&ModuleConfig, DeployError> {
        self.config
            .get_or_init(|| ModuleConfig::load(&self.dir))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Installs the module (and its includes) if needed and resolves its
    /// classpath. Cached after the first call.
    pub fn dependencies(&self) -> &ModuleDependencies {
        self.dependencies
            .get_or_init(|| self.resolver.install(&self.name))
    }

    /// The transitive classpath, resolving on first access.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.dependencies().urls
    }

    /// Every module this one pulls in (itself included), in resolve order.
    pub fn required_modules(&self) -> &[String] {
        &self.dependencies().included_modules
    }

    /// Direct file children of `<dir>/<subdir>`, sorted by name.
    pub fn files(&self, subdir: &str) -> Vec<PathBuf> {
        let dir = self.dir.join(subdir);
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        files
    }
}

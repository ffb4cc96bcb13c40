//! # Transitive module resolution.
//!
//! [`ModuleResolver`] turns a module name into a classpath: it walks the
//! include graph depth-first, installing missing modules from the configured
//! repositories, collecting every module directory and `lib/` artifact in
//! classpath order, and accounting jar basename collisions.
//!
//! ## Ordering
//! A module's own directory and jars precede anything contributed by its
//! includes: the outer module wins on the classpath. Each include is
//! resolved at most once, so cycles in the include graph are harmless.
//!
//! ## Failure model
//! Resolution never panics its way out: failures accumulate in
//! [`ModuleDependencies::warnings`] and flip the success flag. An include
//! that cannot be installed from any repository fails the whole resolution.
//!
//! ## Threading
//! Resolution blocks on file I/O and repository downloads; the runtime runs
//! it inside a blocking action on a worker thread. The repository list is
//! not thread-safe: configure it at start-up, before resolving.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::actions::ActionOutcome;
use crate::error::{DeployError, RepoError};
use crate::events::{Bus, Event, EventKind};

use super::config::{mod_dir, module_exists, ModuleConfig};
use super::repository::ModuleRepository;
use super::walker::{ModuleVisitor, ModuleWalker, VisitResult};

/// Subdirectory of a module holding its classpath artifacts.
const LIB_DIR: &str = "lib";

/// Accumulator for one resolution run.
///
/// Handed to the caller when resolution completes and never mutated
/// afterwards.
#[derive(Debug, Clone)]
pub struct ModuleDependencies {
    /// The module the analysis started from.
    pub root_module: String,
    /// The classpath: module directories and jars, in precedence order.
    pub urls: Vec<PathBuf>,
    /// Jar basename -> every module that contributed a jar of that name.
    pub included_jars: HashMap<String, Vec<String>>,
    /// Every module pulled in, in visit order.
    pub included_modules: Vec<String>,
    /// Warnings accumulated during resolution (collisions, failures).
    pub warnings: Vec<String>,
    success: bool,
}

impl ModuleDependencies {
    /// Creates an empty accumulator rooted at `root_module`.
    pub fn new(root_module: impl Into<String>) -> Self {
        Self {
            root_module: root_module.into(),
            urls: Vec::new(),
            included_jars: HashMap::new(),
            included_modules: Vec::new(),
            warnings: Vec::new(),
            success: true,
        }
    }

    /// Creates an accumulator pre-seeded with a caller-supplied classpath.
    pub fn with_classpath(root_module: impl Into<String>, urls: Vec<PathBuf>) -> Self {
        let mut deps = Self::new(root_module);
        deps.urls = urls;
        deps
    }

    /// True if resolution completed without fatal failures.
    pub fn success(&self) -> bool {
        self.success
    }

    /// True if resolution failed.
    pub fn failed(&self) -> bool {
        !self.success
    }

    /// Records a fatal failure.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(module = %self.root_module, "{message}");
        self.warnings.push(message);
        self.success = false;
    }

    /// Converts a failed resolution into the matching error.
    pub fn into_error(self) -> Option<DeployError> {
        if self.success {
            None
        } else {
            Some(DeployError::ResolutionFailed {
                module: self.root_module,
                warnings: self.warnings,
            })
        }
    }
}

/// Installs modules and resolves their transitive classpath.
pub struct ModuleResolver {
    mod_root: PathBuf,
    repositories: Vec<Arc<dyn ModuleRepository>>,
    repo_timeout: Duration,
    bus: Bus,
}

impl ModuleResolver {
    /// Creates a resolver rooted at `mod_root`, creating the directory if it
    /// does not exist yet.
    pub fn new(mod_root: PathBuf, repo_timeout: Duration, bus: Bus) -> Result<Self, DeployError> {
        if !mod_root.exists() {
            info!(dir = %mod_root.display(), "module root does not exist, creating it");
            fs::create_dir_all(&mod_root).map_err(|e| DeployError::BadConfig {
                path: mod_root.clone(),
                reason: format!("cannot create module root: {e}"),
            })?;
        } else if !mod_root.is_dir() {
            return Err(DeployError::BadConfig {
                path: mod_root.clone(),
                reason: "module root exists but is not a directory".into(),
            });
        }
        Ok(Self {
            mod_root,
            repositories: Vec::new(),
            repo_timeout,
            bus,
        })
    }

    /// Appends a repository to the fallback chain. Start-up only.
    pub fn add_repository(&mut self, repository: Arc<dyn ModuleRepository>) {
        self.repositories.push(repository);
    }

    /// The configured repository chain, in try order.
    pub fn repositories(&self) -> &[Arc<dyn ModuleRepository>] {
        &self.repositories
    }

    /// The module root directory.
    pub fn mod_root(&self) -> &Path {
        &self.mod_root
    }

    /// True if `name` is installed (its manifest is readable).
    pub fn module_exists(&self, name: &str) -> bool {
        module_exists(&self.mod_root, name)
    }

    /// Loads the manifest of an installed module.
    pub fn module_config(&self, name: &str) -> Result<ModuleConfig, DeployError> {
        ModuleConfig::load(&mod_dir(&self.mod_root, name))
    }

    /// Directory of module `name` under the module root.
    pub fn module_dir(&self, name: &str) -> PathBuf {
        mod_dir(&self.mod_root, name)
    }

    /// Installs one module from the repository chain (no dependency walk).
    ///
    /// Each repository is given [`ModuleResolver::repo_timeout`]; the first
    /// success wins and failures fall through to the next entry.
    pub fn install_one(&self, name: &str) -> Result<(), DeployError> {
        if self.repositories.is_empty() {
            warn!(module = name, "no module repositories configured");
            return Err(DeployError::InstallFailed { module: name.into() });
        }

        for repo in &self.repositories {
            let outcome: ActionOutcome<(), RepoError> =
                repo.install(name, &self.mod_root).get(self.repo_timeout);
            match outcome {
                ActionOutcome::Ok(()) => {
                    if self.module_exists(name) {
                        info!(module = name, repo = %repo.describe(), "module installed");
                        self.bus
                            .publish(Event::new(EventKind::ModuleInstalled).with_module(name));
                        return Ok(());
                    }
                    warn!(
                        module = name,
                        repo = %repo.describe(),
                        "repository reported success but the module has no manifest"
                    );
                }
                ActionOutcome::Err(e) => {
                    warn!(module = name, repo = %repo.describe(), error = %e, "install failed");
                }
                ActionOutcome::TimedOut => {
                    error!(
                        module = name,
                        repo = %repo.describe(),
                        "timeout while waiting to download module"
                    );
                }
                ActionOutcome::Pending => unreachable!("get() never returns Pending"),
            }
        }
        Err(DeployError::InstallFailed { module: name.into() })
    }

    /// Deletes an installed module's directory.
    pub fn uninstall(&self, name: &str) -> Result<(), DeployError> {
        let dir = mod_dir(&self.mod_root, name);
        if !dir.exists() {
            error!(module = name, "cannot find module directory to delete");
            return Err(DeployError::ModuleNotInstalled { module: name.into() });
        }
        fs::remove_dir_all(&dir).map_err(|e| DeployError::BadConfig {
            path: dir,
            reason: format!("failed to delete module directory: {e}"),
        })?;
        info!(module = name, "module uninstalled");
        self.bus
            .publish(Event::new(EventKind::ModuleUninstalled).with_module(name));
        Ok(())
    }

    /// Ensures `name` is installed, then resolves its dependency graph.
    pub fn install(&self, name: &str) -> ModuleDependencies {
        if !self.module_exists(name) {
            if let Err(e) = self.install_one(name) {
                let mut deps = ModuleDependencies::new(name);
                deps.fail(format!("install failed: {e}"));
                return deps;
            }
        }
        self.resolve(name)
    }

    /// Resolves the transitive include graph of an installed module.
    ///
    /// Resolution is idempotent: repeated calls against an unchanged tree
    /// yield the same classpath ordering and included-module set.
    pub fn resolve(&self, name: &str) -> ModuleDependencies {
        let mut deps = ModuleDependencies::new(name);
        self.resolve_into(&mut deps, name);
        deps
    }

    /// Resolves `name` into an existing accumulator.
    ///
    /// Used when a verticle deployment lists `includes` to append to a
    /// preset classpath.
    pub fn resolve_into(&self, deps: &mut ModuleDependencies, name: &str) {
        let mut visitor = ResolveVisitor {
            resolver: self,
            deps,
        };
        let mut walker = ModuleWalker::new(&self.mod_root);
        if let Err(e) = walker.walk(name, &mut visitor) {
            deps.fail(format!("resolution aborted: {e}"));
        }
    }
}

/// Walker visitor that accumulates classpath entries and jar collisions.
struct ResolveVisitor<'r> {
    resolver: &'r ModuleResolver,
    deps: &'r mut ModuleDependencies,
}

impl ResolveVisitor<'_> {
    fn collect_jars(&mut self, name: &str, dir: &Path) {
        let lib = dir.join(LIB_DIR);
        if !lib.is_dir() {
            return;
        }
        let entries = match fs::read_dir(&lib) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(module = name, error = %e, "cannot list lib directory");
                return;
            }
        };
        // Only direct file children of lib/ contribute to the classpath.
        let mut jars: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        jars.sort();

        for jar in jars {
            let basename = jar
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(owners) = self.deps.included_jars.get_mut(&basename) {
                let warning = format!(
                    "jar file {basename} is contained in module {} and also in module {name}, \
                     both included (perhaps indirectly) by module {}",
                    owners.join(", "),
                    self.deps.root_module
                );
                warn!("{warning}");
                self.deps.warnings.push(warning);
                owners.push(name.to_string());
            } else {
                self.deps
                    .included_jars
                    .insert(basename, vec![name.to_string()]);
            }
            self.deps.urls.push(jar);
        }
    }
}

impl ModuleVisitor for ResolveVisitor<'_> {
    fn visit(&mut self, name: &str, _config: &ModuleConfig) -> VisitResult {
        if self.deps.failed() {
            return VisitResult::Terminate;
        }
        let dir = self.resolver.module_dir(name);
        self.deps.urls.push(dir.clone());
        self.collect_jars(name, &dir);
        self.deps.included_modules.push(name.to_string());
        VisitResult::Continue
    }

    fn missing(&mut self, name: &str) -> bool {
        match self.resolver.install_one(name) {
            Ok(()) => true,
            Err(e) => {
                self.deps.fail(format!("install failed: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn bus() -> Bus {
        Bus::new(64)
    }

    fn resolver(root: &TempDir) -> ModuleResolver {
        ModuleResolver::new(root.path().join("mods"), Duration::from_secs(1), bus())
            .expect("resolver")
    }

    fn install(resolver: &ModuleResolver, name: &str, includes: &str, jars: &[&str]) {
        let dir = resolver.module_dir(name);
        fs::create_dir_all(&dir).expect("mkdir");
        let manifest = if includes.is_empty() {
            r#"{"main": "app.js"}"#.to_string()
        } else {
            format!(r#"{{"main": "app.js", "includes": "{includes}"}}"#)
        };
        fs::write(dir.join("mod.json"), manifest).expect("manifest");
        if !jars.is_empty() {
            let lib = dir.join(LIB_DIR);
            fs::create_dir_all(&lib).expect("lib");
            for jar in jars {
                fs::write(lib.join(jar), b"jar bytes").expect("jar");
            }
        }
    }

    #[test]
    fn classpath_orders_parent_before_includes() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "testmod8-1", "testmod8-2", &[]);
        install(&r, "testmod8-2", "testmod8-3", &[]);
        install(&r, "testmod8-3", "", &[]);

        let deps = r.resolve("testmod8-1");
        assert!(deps.success());
        assert_eq!(
            deps.urls,
            vec![
                r.module_dir("testmod8-1"),
                r.module_dir("testmod8-2"),
                r.module_dir("testmod8-3"),
            ]
        );
        assert_eq!(
            deps.included_modules,
            vec!["testmod8-1", "testmod8-2", "testmod8-3"]
        );
    }

    #[test]
    fn jars_follow_their_module_directory() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "top", "dep", &["top.jar"]);
        install(&r, "dep", "", &["dep.jar"]);

        let deps = r.resolve("top");
        assert!(deps.success());
        assert_eq!(
            deps.urls,
            vec![
                r.module_dir("top"),
                r.module_dir("top").join("lib/top.jar"),
                r.module_dir("dep"),
                r.module_dir("dep").join("lib/dep.jar"),
            ]
        );
        assert_eq!(deps.included_jars["top.jar"], vec!["top"]);
        assert_eq!(deps.included_jars["dep.jar"], vec!["dep"]);
        assert!(deps.warnings.is_empty());
    }

    #[test]
    fn jar_basename_collision_warns_and_records_both_owners() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "top", "dep", &["shared.jar"]);
        install(&r, "dep", "", &["shared.jar"]);

        let deps = r.resolve("top");
        assert!(deps.success(), "collision is a warning, not a failure");
        assert_eq!(deps.included_jars["shared.jar"], vec!["top", "dep"]);
        assert_eq!(deps.warnings.len(), 1);
        assert!(deps.warnings[0].contains("shared.jar"));
        // Both jar paths stay on the classpath; the outer module wins.
        let jar_entries: Vec<_> = deps
            .urls
            .iter()
            .filter(|p| p.ends_with("shared.jar"))
            .collect();
        assert_eq!(jar_entries.len(), 2);
    }

    #[test]
    fn resolution_is_idempotent() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "a", "b,c", &["a.jar"]);
        install(&r, "b", "c", &[]);
        install(&r, "c", "", &["c.jar"]);

        let first = r.resolve("a");
        let second = r.resolve("a");
        assert!(first.success() && second.success());
        assert_eq!(first.urls, second.urls);
        assert_eq!(first.included_modules, second.included_modules);
    }

    #[test]
    fn diamond_includes_resolve_each_module_once() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "top", "left,right", &[]);
        install(&r, "left", "base", &[]);
        install(&r, "right", "base", &[]);
        install(&r, "base", "", &[]);

        let deps = r.resolve("top");
        assert_eq!(deps.included_modules, vec!["top", "left", "base", "right"]);
    }

    #[test]
    fn missing_include_without_repositories_fails_resolution() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "top", "ghost", &[]);

        let deps = r.resolve("top");
        assert!(deps.failed());
        assert!(deps.warnings.iter().any(|w| w.contains("install failed")));
        let err = deps.into_error().expect("error");
        assert_eq!(err.as_label(), "deploy_resolution_failed");
    }

    #[test]
    fn uninstall_removes_the_module_directory() {
        let root = TempDir::new().expect("tempdir");
        let r = resolver(&root);
        install(&r, "gone", "", &[]);
        assert!(r.module_exists("gone"));

        r.uninstall("gone").expect("uninstall");
        assert!(!r.module_exists("gone"));
        assert!(matches!(
            r.uninstall("gone"),
            Err(DeployError::ModuleNotInstalled { .. })
        ));
    }
}

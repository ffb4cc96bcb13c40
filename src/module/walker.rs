//! # Depth-first walker over a module's include graph.
//!
//! [`ModuleWalker`] visits a module and then, recursively, every module its
//! manifest includes. Control flow is explicit: the visitor returns a
//! [`VisitResult`] per module, and missing modules go through a separate
//! [`ModuleVisitor::missing`] callback that decides between retrying (after
//! installing) and skipping.
//!
//! ## Rules
//! - Each module is visited **at most once** per walk; the membership check
//!   makes cycles in the include graph harmless.
//! - Visit order is pre-order: a module is visited before its includes, and
//!   includes are walked in manifest order.
//! - `missing` returning true means "I installed it, load the manifest
//!   again"; returning false skips the module (and its subtree).

use std::collections::HashSet;
use std::path::Path;

use crate::error::DeployError;

use super::config::{mod_dir, ModuleConfig};

/// Visitor decision after seeing one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Descend into the module's includes.
    Continue,
    /// Skip this module's includes but keep walking its siblings.
    SkipSubtree,
    /// Skip this module's includes and its remaining siblings.
    SkipSiblings,
    /// Abort the whole walk.
    Terminate,
}

/// User code invoked while walking the include graph.
pub trait ModuleVisitor {
    /// Invoked for each module found, with its parsed manifest.
    fn visit(&mut self, name: &str, config: &ModuleConfig) -> VisitResult;

    /// Invoked when a module's manifest cannot be loaded.
    ///
    /// Return true to retry the load (after installing the module), false to
    /// treat the module as skipped.
    fn missing(&mut self, name: &str) -> bool {
        let _ = name;
        false
    }
}

/// Depth-first include-graph walker.
pub struct ModuleWalker<'a> {
    mod_root: &'a Path,
    visited: HashSet<String>,
}

impl<'a> ModuleWalker<'a> {
    /// Creates a walker over modules under `mod_root`.
    pub fn new(mod_root: &'a Path) -> Self {
        Self {
            mod_root,
            visited: HashSet::new(),
        }
    }

    /// Walks the include graph seeded with `start`.
    ///
    /// Returns an error only if a manifest stays unreadable after the visitor
    /// asked for a retry; visitor-driven termination is not an error.
    pub fn walk(&mut self, start: &str, visitor: &mut dyn ModuleVisitor) -> Result<(), DeployError> {
        self.walk_module(start, visitor).map(|_| ())
    }

    fn walk_module(
        &mut self,
        name: &str,
        visitor: &mut dyn ModuleVisitor,
    ) -> Result<VisitResult, DeployError> {
        if !self.visited.insert(name.to_string()) {
            // Already handled on another path through the graph.
            return Ok(VisitResult::Continue);
        }

        let dir = mod_dir(self.mod_root, name);
        let config = match ModuleConfig::load(&dir) {
            Ok(config) => config,
            Err(_) if visitor.missing(name) => ModuleConfig::load(&dir)?,
            Err(_) => return Ok(VisitResult::Continue),
        };

        match visitor.visit(name, &config) {
            VisitResult::Terminate => return Ok(VisitResult::Terminate),
            VisitResult::SkipSubtree => return Ok(VisitResult::Continue),
            VisitResult::SkipSiblings => return Ok(VisitResult::SkipSiblings),
            VisitResult::Continue => {}
        }

        for include in config.includes() {
            match self.walk_module(&include, visitor)? {
                VisitResult::Terminate => return Ok(VisitResult::Terminate),
                VisitResult::SkipSiblings => break,
                _ => {}
            }
        }
        Ok(VisitResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install(root: &Path, name: &str, includes: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        let manifest = if includes.is_empty() {
            r#"{"main": "app.js"}"#.to_string()
        } else {
            format!(r#"{{"main": "app.js", "includes": "{includes}"}}"#)
        };
        fs::write(dir.join("mod.json"), manifest).expect("manifest");
    }

    struct Recorder {
        order: Vec<String>,
        on_visit: fn(&str) -> VisitResult,
        missing: Vec<String>,
    }

    impl Recorder {
        fn new(on_visit: fn(&str) -> VisitResult) -> Self {
            Self {
                order: Vec::new(),
                on_visit,
                missing: Vec::new(),
            }
        }
    }

    impl ModuleVisitor for Recorder {
        fn visit(&mut self, name: &str, _config: &ModuleConfig) -> VisitResult {
            self.order.push(name.to_string());
            (self.on_visit)(name)
        }

        fn missing(&mut self, name: &str) -> bool {
            self.missing.push(name.to_string());
            false
        }
    }

    #[test]
    fn walks_depth_first_in_manifest_order() {
        let root = TempDir::new().expect("tempdir");
        install(root.path(), "testmod8-1", "testmod8-2");
        install(root.path(), "testmod8-2", "testmod8-3");
        install(root.path(), "testmod8-3", "");

        let mut rec = Recorder::new(|_| VisitResult::Continue);
        ModuleWalker::new(root.path())
            .walk("testmod8-1", &mut rec)
            .expect("walk");
        assert_eq!(rec.order, vec!["testmod8-1", "testmod8-2", "testmod8-3"]);
    }

    #[test]
    fn cycles_visit_each_module_once() {
        let root = TempDir::new().expect("tempdir");
        install(root.path(), "a", "b");
        install(root.path(), "b", "a");

        let mut rec = Recorder::new(|_| VisitResult::Continue);
        ModuleWalker::new(root.path()).walk("a", &mut rec).expect("walk");
        assert_eq!(rec.order, vec!["a", "b"]);
    }

    #[test]
    fn skip_subtree_keeps_siblings() {
        let root = TempDir::new().expect("tempdir");
        install(root.path(), "top", "left,right");
        install(root.path(), "left", "leftchild");
        install(root.path(), "leftchild", "");
        install(root.path(), "right", "");

        let mut rec = Recorder::new(|name| {
            if name == "left" {
                VisitResult::SkipSubtree
            } else {
                VisitResult::Continue
            }
        });
        ModuleWalker::new(root.path()).walk("top", &mut rec).expect("walk");
        assert_eq!(rec.order, vec!["top", "left", "right"]);
    }

    #[test]
    fn skip_siblings_cuts_the_rest_of_the_level() {
        let root = TempDir::new().expect("tempdir");
        install(root.path(), "top", "left,right");
        install(root.path(), "left", "");
        install(root.path(), "right", "");

        let mut rec = Recorder::new(|name| {
            if name == "left" {
                VisitResult::SkipSiblings
            } else {
                VisitResult::Continue
            }
        });
        ModuleWalker::new(root.path()).walk("top", &mut rec).expect("walk");
        assert_eq!(rec.order, vec!["top", "left"]);
    }

    #[test]
    fn terminate_aborts_the_walk() {
        let root = TempDir::new().expect("tempdir");
        install(root.path(), "top", "a,b");
        install(root.path(), "a", "");
        install(root.path(), "b", "");

        let mut rec = Recorder::new(|name| {
            if name == "a" {
                VisitResult::Terminate
            } else {
                VisitResult::Continue
            }
        });
        ModuleWalker::new(root.path()).walk("top", &mut rec).expect("walk");
        assert_eq!(rec.order, vec!["top", "a"]);
    }

    #[test]
    fn missing_modules_are_reported_and_skipped() {
        let root = TempDir::new().expect("tempdir");
        install(root.path(), "top", "ghost,real");
        install(root.path(), "real", "");

        let mut rec = Recorder::new(|_| VisitResult::Continue);
        ModuleWalker::new(root.path()).walk("top", &mut rec).expect("walk");
        assert_eq!(rec.order, vec!["top", "real"]);
        assert_eq!(rec.missing, vec!["ghost"]);
    }
}

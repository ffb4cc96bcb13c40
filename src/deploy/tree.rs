//! # In-memory tree of live deployments.
//!
//! [`DeploymentTree`] maps each unique deployment name to its record and
//! maintains the parent → children links. Lookups are lock-free from any
//! thread; mutations are serialized through the worker pool by the runtime.
//!
//! ## Invariant
//! Every name appears in the tree exactly once, and
//! `parent.child_names() ∋ name` iff `deployment.parent() == Some(parent)`.

use std::fmt::{self, Write};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, warn};

use crate::error::DeployError;

use super::deployment::Deployment;

/// Concurrent name → deployment map with parent/child bookkeeping.
#[derive(Default)]
pub struct DeploymentTree {
    deployments: DashMap<String, Arc<Deployment>>,
}

impl DeploymentTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a deployment under its name and links it to `parent`.
    ///
    /// A duplicate child link is only warned about; a missing parent rolls
    /// the insertion back and errors.
    pub fn insert(
        &self,
        parent: Option<&str>,
        deployment: Arc<Deployment>,
    ) -> Result<(), DeployError> {
        let name = deployment.name().to_string();
        self.deployments.insert(name.clone(), deployment);

        if let Some(parent_name) = parent {
            match self.deployments.get(parent_name) {
                Some(parent_dep) => {
                    if parent_dep.has_child(&name) {
                        warn!(
                            child = %name,
                            parent = parent_name,
                            "parent deployment already has a child with this name"
                        );
                    }
                    parent_dep.add_child(&name);
                }
                None => {
                    error!(child = %name, parent = parent_name, "parent deployment not found");
                    self.deployments.remove(&name);
                    return Err(DeployError::DeploymentNotFound {
                        name: parent_name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Removes the entry and detaches it from its parent's child list.
    pub fn remove(&self, name: &str) -> Option<Arc<Deployment>> {
        let deployment = self.take(name)?;
        if let Some(parent) = deployment.parent() {
            self.detach(parent, name);
        }
        Some(deployment)
    }

    /// Removes the entry but leaves the parent link for the caller to clear
    /// once the deployment's children have fully completed.
    pub(crate) fn take(&self, name: &str) -> Option<Arc<Deployment>> {
        self.deployments.remove(name).map(|(_, dep)| dep)
    }

    /// Clears `name` from `parent`'s child list, if the parent still exists.
    pub(crate) fn detach(&self, parent: &str, name: &str) {
        if let Some(parent_dep) = self.deployments.get(parent) {
            parent_dep.remove_child(name);
        }
    }

    /// Lock-free lookup by name.
    pub fn get(&self, name: &str) -> Option<Arc<Deployment>> {
        self.deployments.get(name).map(|e| Arc::clone(e.value()))
    }

    /// True when no deployments are registered.
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    /// Number of registered deployments.
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    /// Snapshot of the current deployment names.
    pub fn names(&self) -> Vec<String> {
        self.deployments.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of every deployment bound to `module`.
    pub fn bound_to_module(&self, module: &str) -> Vec<Arc<Deployment>> {
        self.deployments
            .iter()
            .filter(|e| e.value().module() == Some(module))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Writes the hierarchy, roots first, one indented line per deployment.
    pub fn print(&self, out: &mut dyn Write) -> fmt::Result {
        let mut roots: Vec<Arc<Deployment>> = self
            .deployments
            .iter()
            .filter(|e| e.value().parent().is_none())
            .map(|e| Arc::clone(e.value()))
            .collect();
        roots.sort_by(|a, b| a.name().cmp(b.name()));
        for root in roots {
            self.print_node(&root, 0, out)?;
        }
        Ok(())
    }

    fn print_node(&self, dep: &Arc<Deployment>, depth: usize, out: &mut dyn Write) -> fmt::Result {
        writeln!(
            out,
            "{}- {} (module: {}; verticles: {})",
            "--".repeat(depth),
            dep.name(),
            dep.module().unwrap_or("<none>"),
            dep.instance_count(),
        )?;
        for child in dep.child_names() {
            if let Some(child_dep) = self.get(&child) {
                self.print_node(&child_dep, depth + 1, out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn dep(name: &str, parent: Option<&str>) -> Arc<Deployment> {
        Arc::new(Deployment::new(
            Some(name.to_string()),
            Some("my-mod".into()),
            1,
            Arc::new(Value::Null),
            Vec::new(),
            None,
            parent.map(str::to_string),
            false,
        ))
    }

    #[test]
    fn insert_links_children_to_parents() {
        let tree = DeploymentTree::new();
        tree.insert(None, dep("root", None)).expect("root");
        tree.insert(Some("root"), dep("child", Some("root"))).expect("child");

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("root").expect("root").child_names(), vec!["child"]);
    }

    #[test]
    fn missing_parent_rolls_back_the_insert() {
        let tree = DeploymentTree::new();
        let err = tree
            .insert(Some("ghost"), dep("orphan", Some("ghost")))
            .expect_err("must fail");
        assert_eq!(err.as_label(), "deploy_not_found");
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_detaches_from_parent() {
        let tree = DeploymentTree::new();
        tree.insert(None, dep("root", None)).expect("root");
        tree.insert(Some("root"), dep("child", Some("root"))).expect("child");

        let removed = tree.remove("child").expect("removed");
        assert_eq!(removed.name(), "child");
        assert!(tree.get("root").expect("root").child_names().is_empty());
        assert!(tree.remove("child").is_none());
    }

    #[test]
    fn bound_to_module_filters_by_module_name() {
        let tree = DeploymentTree::new();
        tree.insert(None, dep("a", None)).expect("a");
        tree.insert(None, dep("b", None)).expect("b");
        let other = Arc::new(Deployment::new(
            Some("c".into()),
            Some("other-mod".into()),
            1,
            Arc::new(Value::Null),
            Vec::new(),
            None,
            None,
            false,
        ));
        tree.insert(None, other).expect("c");

        let mut bound: Vec<String> = tree
            .bound_to_module("my-mod")
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        bound.sort();
        assert_eq!(bound, vec!["a", "b"]);
    }

    #[test]
    fn print_is_roots_first_and_indented() {
        let tree = DeploymentTree::new();
        tree.insert(None, dep("root", None)).expect("root");
        tree.insert(Some("root"), dep("kid", Some("root"))).expect("kid");
        tree.insert(Some("kid"), dep("grandkid", Some("kid"))).expect("grandkid");

        let mut out = String::new();
        tree.print(&mut out).expect("print");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "- root (module: my-mod; verticles: 0)");
        assert_eq!(lines[1], "--- kid (module: my-mod; verticles: 0)");
        assert_eq!(lines[2], "----- grandkid (module: my-mod; verticles: 0)");
    }
}

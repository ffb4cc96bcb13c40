//! # Module repository contract.
//!
//! A repository fetches a module archive and unpacks it under the module
//! root. The resolver holds an ordered list of repositories; a missing
//! module is tried against each in turn, stopping at the first success.
//!
//! ## Contract
//! - On success, `<mod_root>/<name>/mod.json` must exist.
//! - The caller imposes the timeout (default 30 s) by bounding its wait on
//!   the returned [`ActionFuture`]; a timed-out install is treated like any
//!   other transient failure and the next repository is tried.
//! - The repository list itself is not thread-safe; mutate it only at
//!   start-up, before resolution begins.

use std::path::Path;

use crate::actions::ActionFuture;
use crate::error::RepoError;

/// Source of installable modules.
pub trait ModuleRepository: Send + Sync {
    /// Starts fetching `module` and unpacking it into `<mod_root>/<module>`.
    ///
    /// The returned future completes once the module is fully unpacked (or
    /// the attempt failed). Implementations must not leave a partially
    /// unpacked module behind on failure.
    fn install(&self, module: &str, mod_root: &Path) -> ActionFuture<(), RepoError>;

    /// Human-readable identity for logs ("https://repo.example/mods", ...).
    fn describe(&self) -> String;
}

//! Modules on disk: manifests, include graphs, repositories.
//!
//! A module is a directory under the module root containing a `mod.json`
//! manifest, an optional `lib/` directory of artifacts, and optional
//! `includes` naming other modules whose classpath it pulls in transitively.
//!
//! ## Contents
//! - [`config`] — typed view over `mod.json`
//! - [`walker`] — explicit depth-first include-graph walker
//! - [`resolver`] — install + transitive classpath resolution with jar
//!   collision accounting
//! - [`repository`] — contract for fetching a missing module
//! - [`module_ref`] — lazy per-module view (manifest, classpath, files)

mod config;
mod module_ref;
mod repository;
mod resolver;
mod walker;

pub use config::ModuleConfig;
pub(crate) use config::parse_include_list;
pub use module_ref::Module;
pub use repository::ModuleRepository;
pub use resolver::{ModuleDependencies, ModuleResolver};
pub use walker::{ModuleVisitor, ModuleWalker, VisitResult};

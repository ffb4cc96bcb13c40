//! Install and resolution scenarios against on-disk module trees and a
//! directory-backed repository.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::{write_module, DirRepository, HangingRepository};
use modvisor::{Bus, ModuleConfig, ModuleResolver, ModuleVisitor, ModuleWalker, VisitResult};

fn resolver_with_repos(
    mod_root: &TempDir,
    repos: Vec<Arc<dyn modvisor::ModuleRepository>>,
    timeout: Duration,
) -> ModuleResolver {
    common::init_tracing();
    let mut resolver = ModuleResolver::new(
        mod_root.path().join("mods"),
        timeout,
        Bus::new(64),
    )
    .expect("resolver");
    for repo in repos {
        resolver.add_repository(repo);
    }
    resolver
}

#[test]
fn simple_install_creates_the_module_directory() {
    let remote = TempDir::new().expect("remote");
    write_module(remote.path(), "testmod1-1", r#"{"main": "app.test"}"#, &[]);

    let root = TempDir::new().expect("root");
    let resolver = resolver_with_repos(
        &root,
        vec![Arc::new(DirRepository::new(remote.path()))],
        Duration::from_secs(1),
    );

    assert!(!resolver.module_exists("testmod1-1"));
    resolver.install_one("testmod1-1").expect("install");
    assert!(resolver.module_exists("testmod1-1"));
    assert!(resolver.module_dir("testmod1-1").join("mod.json").is_file());
}

#[test]
fn transitive_install_pulls_the_whole_include_chain() {
    let remote = TempDir::new().expect("remote");
    write_module(
        remote.path(),
        "testmod8-1",
        r#"{"main": "app.test", "includes": "testmod8-2"}"#,
        &[],
    );
    write_module(
        remote.path(),
        "testmod8-2",
        r#"{"main": "app.test", "includes": "testmod8-3"}"#,
        &[],
    );
    write_module(remote.path(), "testmod8-3", r#"{"main": "app.test"}"#, &[]);

    let root = TempDir::new().expect("root");
    let resolver = resolver_with_repos(
        &root,
        vec![Arc::new(DirRepository::new(remote.path()))],
        Duration::from_secs(1),
    );

    let deps = resolver.install("testmod8-1");
    assert!(deps.success(), "warnings: {:?}", deps.warnings);

    for module in ["testmod8-1", "testmod8-2", "testmod8-3"] {
        assert!(resolver.module_exists(module), "{module} missing");
    }
    assert_eq!(
        deps.urls,
        vec![
            resolver.module_dir("testmod8-1"),
            resolver.module_dir("testmod8-2"),
            resolver.module_dir("testmod8-3"),
        ]
    );
}

#[test]
fn walker_visits_the_chain_depth_first() {
    let root = TempDir::new().expect("root");
    let mods = root.path().join("mods");
    write_module(&mods, "testmod8-1", r#"{"includes": "testmod8-2"}"#, &[]);
    write_module(&mods, "testmod8-2", r#"{"includes": "testmod8-3"}"#, &[]);
    write_module(&mods, "testmod8-3", "{}", &[]);

    struct Order(Vec<String>);
    impl ModuleVisitor for Order {
        fn visit(&mut self, name: &str, _config: &ModuleConfig) -> VisitResult {
            self.0.push(name.to_string());
            VisitResult::Continue
        }
    }

    let mut visitor = Order(Vec::new());
    ModuleWalker::new(&mods)
        .walk("testmod8-1", &mut visitor)
        .expect("walk");
    assert_eq!(visitor.0, vec!["testmod8-1", "testmod8-2", "testmod8-3"]);
}

#[test]
fn hanging_repository_falls_through_to_the_next_one() {
    let remote = TempDir::new().expect("remote");
    write_module(remote.path(), "slowmod", r#"{"main": "app.test"}"#, &[]);

    let root = TempDir::new().expect("root");
    let resolver = resolver_with_repos(
        &root,
        vec![
            Arc::new(HangingRepository),
            Arc::new(DirRepository::new(remote.path())),
        ],
        Duration::from_millis(100),
    );

    resolver.install_one("slowmod").expect("fallback install");
    assert!(resolver.module_exists("slowmod"));
}

#[test]
fn exhausted_repositories_fail_the_install() {
    let root = TempDir::new().expect("root");
    let resolver = resolver_with_repos(
        &root,
        vec![Arc::new(HangingRepository)],
        Duration::from_millis(50),
    );

    let err = resolver.install_one("ghost").expect_err("must fail");
    assert_eq!(err.as_label(), "deploy_install_failed");

    let deps = resolver.install("ghost");
    assert!(deps.failed());
}

#[test]
fn include_of_an_absent_module_is_installed_on_demand() {
    let remote = TempDir::new().expect("remote");
    write_module(remote.path(), "dep-only", r#"{"main": "app.test"}"#, &[]);

    let root = TempDir::new().expect("root");
    let resolver = resolver_with_repos(
        &root,
        vec![Arc::new(DirRepository::new(remote.path()))],
        Duration::from_secs(1),
    );
    // The top module is already installed; its include is not.
    write_module(
        resolver.mod_root(),
        "top",
        r#"{"main": "app.test", "includes": "dep-only"}"#,
        &[],
    );

    let deps = resolver.resolve("top");
    assert!(deps.success(), "warnings: {:?}", deps.warnings);
    assert!(resolver.module_exists("dep-only"));
    assert_eq!(deps.included_modules, vec!["top", "dep-only"]);
}

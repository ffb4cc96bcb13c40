//! Whole-platform scenarios: repository install feeding a deploy, child
//! deployments created from inside a running verticle, and shutdown
//! draining the timer.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use common::{write_module, DirRepository};
use modvisor::{
    Bus, FactoryRegistry, InstanceScope, ModuleDeployment, PlatformConfig, Timeout, Timer,
    Verticle, VerticleContext, VerticleError, VerticleFactory, VerticleRuntime, WheelTimer,
};

/// Factory whose verticles deploy a child module when their main asks for it.
struct SpawningFactory {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl VerticleFactory for SpawningFactory {
    async fn create(
        &self,
        main: &str,
        _scope: Arc<InstanceScope>,
    ) -> Result<Box<dyn Verticle>, VerticleError> {
        Ok(Box::new(SpawningVerticle {
            log: Arc::clone(&self.log),
            spawn_child: main == "parent.test",
            deployment: String::new(),
        }))
    }
}

struct SpawningVerticle {
    log: Arc<Mutex<Vec<String>>>,
    spawn_child: bool,
    deployment: String,
}

#[async_trait]
impl Verticle for SpawningVerticle {
    async fn start(&mut self, cx: &VerticleContext) -> Result<(), VerticleError> {
        self.deployment = cx.deployment.clone();
        self.log
            .lock()
            .expect("log")
            .push(format!("start:{}", cx.deployment));

        if self.spawn_child {
            let runtime = cx.runtime.upgrade().ok_or("runtime gone")?;
            let mut request = ModuleDeployment::new("child-mod");
            request.name = Some("child-dep".into());
            request.parent = Some(cx.deployment.clone());
            runtime.deploy_module(request).await?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), VerticleError> {
        self.log
            .lock()
            .expect("log")
            .push(format!("stop:{}", self.deployment));
        Ok(())
    }
}

struct Fixture {
    _mod_root: TempDir,
    _remote: TempDir,
    runtime: Arc<VerticleRuntime>,
    log: Arc<Mutex<Vec<String>>>,
}

fn fixture() -> Fixture {
    common::init_tracing();
    let mod_root = TempDir::new().expect("mod root");
    let remote = TempDir::new().expect("remote");
    write_module(remote.path(), "parent-mod", r#"{"main": "parent.test"}"#, &[]);
    write_module(remote.path(), "child-mod", r#"{"main": "plain.test"}"#, &[]);

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut factories = FactoryRegistry::new();
    factories.register(
        "spawning",
        Arc::new(SpawningFactory {
            log: Arc::clone(&log),
        }),
    );

    let mut cfg = PlatformConfig::default();
    cfg.mod_root = mod_root.path().join("mods");
    cfg.repo_timeout = Duration::from_secs(2);
    cfg.langs.insert("default".into(), "spawning".into());

    let bus = Bus::new(cfg.bus_capacity);
    let timer = WheelTimer::new(
        Duration::from_millis(20),
        256,
        Arc::new(modvisor::SystemClock),
    );
    let runtime = VerticleRuntime::new(
        &cfg,
        factories,
        vec![Arc::new(DirRepository::new(remote.path()))],
        timer,
        bus,
    )
    .expect("runtime");

    Fixture {
        _mod_root: mod_root,
        _remote: remote,
        runtime,
        log,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn verticle_deploys_a_child_through_its_context() {
    let fx = fixture();

    let mut request = ModuleDeployment::new("parent-mod");
    request.name = Some("parent-dep".into());
    fx.runtime.deploy_module(request).await.expect("deploy");

    // Both modules were pulled from the repository on demand.
    assert!(fx.runtime.resolver().module_exists("parent-mod"));
    assert!(fx.runtime.resolver().module_exists("child-mod"));

    let parent = fx.runtime.deployment("parent-dep").expect("parent");
    assert_eq!(parent.child_names(), vec!["child-dep"]);
    let child = fx.runtime.deployment("child-dep").expect("child");
    assert_eq!(child.parent(), Some("parent-dep"));

    let mut printed = String::new();
    fx.runtime.deployments().print(&mut printed).expect("print");
    assert!(printed.contains("- parent-dep (module: parent-mod; verticles: 1)"));
    assert!(printed.contains("--- child-dep (module: child-mod; verticles: 1)"));

    fx.runtime.undeploy("parent-dep").await.expect("undeploy");
    assert!(fx.runtime.deployments().is_empty());

    let log = fx.log.lock().expect("log").clone();
    let stops: Vec<&String> = log.iter().filter(|e| e.starts_with("stop:")).collect();
    assert_eq!(stops, vec!["stop:child-dep", "stop:parent-dep"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_pending_timer_tasks() {
    let fx = fixture();

    let timer = fx.runtime.timer().clone();
    timer
        .new_timeout(
            Arc::new(|_: &Timeout| {}),
            Duration::from_secs(3_600),
            false,
        )
        .expect("schedule");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let unprocessed = fx.runtime.stop().await.expect("stop");
    assert_eq!(unprocessed.len(), 1, "pending timeout must be drained");

    // The platform timer is gone; new work is refused.
    assert!(timer
        .new_timeout(Arc::new(|_: &Timeout| {}), Duration::from_millis(1), false)
        .is_err());
}

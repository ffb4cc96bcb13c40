//! Shared fixtures: an on-disk module repository, a recording verticle
//! factory, and helpers to lay out module trees.
#![allow(dead_code)] // not every test binary uses every fixture

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;

use modvisor::{
    ActionFuture, InstanceScope, ModuleRepository, RepoError, Verticle, VerticleContext,
    VerticleError, VerticleFactory,
};

static TRACING: Once = Once::new();

/// Installs the test tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`; without it only warnings and errors are shown, so
/// passing runs stay quiet while failures carry the runtime's own logs.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Repository backed by a local directory of ready-made modules.
///
/// `install` copies `<source>/<name>` into the module root, mimicking a
/// download-and-unpack.
pub struct DirRepository {
    source: PathBuf,
}

impl DirRepository {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ModuleRepository for DirRepository {
    fn install(&self, module: &str, mod_root: &Path) -> ActionFuture<(), RepoError> {
        let from = self.source.join(module);
        if !from.is_dir() {
            return ActionFuture::ready(Err(RepoError::NotFound));
        }
        let result = copy_tree(&from, &mod_root.join(module)).map_err(|e| RepoError::Malformed {
            reason: e.to_string(),
        });
        ActionFuture::ready(result)
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.source.display())
    }
}

/// Repository whose installs never complete; exercises the timeout path.
pub struct HangingRepository;

impl ModuleRepository for HangingRepository {
    fn install(&self, _module: &str, _mod_root: &Path) -> ActionFuture<(), RepoError> {
        ActionFuture::new()
    }

    fn describe(&self) -> String {
        "hanging".to_string()
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Writes a module directory with a manifest and optional lib jars.
pub fn write_module(root: &Path, name: &str, manifest: &str, jars: &[&str]) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("create module dir");
    fs::write(dir.join("mod.json"), manifest).expect("write manifest");
    if !jars.is_empty() {
        let lib = dir.join("lib");
        fs::create_dir_all(&lib).expect("create lib dir");
        for jar in jars {
            fs::write(lib.join(jar), b"jar bytes").expect("write jar");
        }
    }
}

/// Lifecycle journal shared between the factory and assertions.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().expect("journal").clone()
}

pub fn count_entries(journal: &Journal, needle: &str) -> usize {
    entries(journal).iter().filter(|e| e.as_str() == needle).count()
}

/// Factory producing verticles that journal their lifecycle.
///
/// Journal entries: `start:<deployment>:<instance>` and `stop:<deployment>`.
/// Mains listed in `fail_mains` fail their `start`.
pub struct RecordingFactory {
    journal: Journal,
    fail_mains: HashSet<String>,
    scopes: Arc<Mutex<Vec<usize>>>,
}

impl RecordingFactory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_mains: HashSet::new(),
            scopes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_on(mut self, main: &str) -> Self {
        self.fail_mains.insert(main.to_string());
        self
    }

    /// Scope identities observed by created instances, in creation order.
    pub fn scope_ids(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.scopes)
    }
}

#[async_trait]
impl VerticleFactory for RecordingFactory {
    async fn create(
        &self,
        main: &str,
        scope: Arc<InstanceScope>,
    ) -> Result<Box<dyn Verticle>, VerticleError> {
        self.scopes
            .lock()
            .expect("scopes")
            .push(Arc::as_ptr(&scope) as usize);
        Ok(Box::new(RecordingVerticle {
            journal: Arc::clone(&self.journal),
            fail: self.fail_mains.contains(main),
            deployment: String::new(),
        }))
    }
}

struct RecordingVerticle {
    journal: Journal,
    fail: bool,
    deployment: String,
}

#[async_trait]
impl Verticle for RecordingVerticle {
    async fn start(&mut self, cx: &VerticleContext) -> Result<(), VerticleError> {
        if self.fail {
            return Err("configured to fail".into());
        }
        self.deployment = cx.deployment.clone();
        self.journal
            .lock()
            .expect("journal")
            .push(format!("start:{}:{}", cx.deployment, cx.instance));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), VerticleError> {
        self.journal
            .lock()
            .expect("journal")
            .push(format!("stop:{}", self.deployment));
        Ok(())
    }
}

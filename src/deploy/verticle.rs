//! # Verticle and factory contracts.
//!
//! A **verticle** is one instance of deployable user code with `start`/`stop`
//! lifecycle hooks. Verticles are produced by a [`VerticleFactory`] selected
//! through the language map: the extension of the module's `main` picks the
//! factory, with a `default` fallback for unmapped extensions.
//!
//! ## Instance scopes
//! Each instance runs against an [`InstanceScope`] seeded with the resolved
//! classpath. Worker deployments share **one** scope across all instances so
//! cached/singleton state is shared; non-worker deployments get a fresh scope
//! per instance.
//!
//! ## No globals
//! A verticle receives everything it needs through its [`VerticleContext`]:
//! its config snapshot, its scope, the event bus, the platform timer and a
//! weak handle back to the runtime for deploying children. There are no
//! process-wide singletons to locate.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::DeployError;
use crate::events::Bus;
use crate::time::Timer;

use super::runtime::VerticleRuntime;

/// Error type verticles and factories report through.
pub type VerticleError = Box<dyn std::error::Error + Send + Sync>;

/// One instance of deployable user code.
#[async_trait]
pub trait Verticle: Send {
    /// Starts the instance. Failure rolls back the whole deployment.
    async fn start(&mut self, cx: &VerticleContext) -> Result<(), VerticleError>;

    /// Stops the instance during undeploy.
    async fn stop(&mut self) -> Result<(), VerticleError> {
        Ok(())
    }
}

/// Produces verticle instances for one language/runtime flavor.
#[async_trait]
pub trait VerticleFactory: Send + Sync {
    /// Instantiates the verticle named `main` against `scope`.
    async fn create(
        &self,
        main: &str,
        scope: Arc<InstanceScope>,
    ) -> Result<Box<dyn Verticle>, VerticleError>;
}

/// Everything an instance needs, passed explicitly at start.
#[derive(Clone)]
pub struct VerticleContext {
    /// Name of the deployment this instance belongs to.
    pub deployment: String,
    /// Instance index within the deployment (0-based).
    pub instance: usize,
    /// Snapshot of the deployment config.
    pub config: Arc<serde_json::Value>,
    /// Scope the instance resolves its imports/state against.
    pub scope: Arc<InstanceScope>,
    /// Per-instance logger name (tracing target).
    pub logger: String,
    /// Platform event bus.
    pub bus: Bus,
    /// Platform timer for `set_timer`/`set_periodic`-style use.
    pub timer: Arc<dyn Timer>,
    /// Runtime handle for deploying child deployments.
    pub runtime: Weak<VerticleRuntime>,
}

/// State container shared by the instances of one scope.
///
/// Stands in for a per-instance loader: the classpath lists what the
/// instance's imports resolve against, and the typed state map is where
/// worker instances share singletons.
pub struct InstanceScope {
    classpath: Vec<PathBuf>,
    state: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl InstanceScope {
    /// Creates a scope over the resolved classpath.
    pub fn new(classpath: Vec<PathBuf>) -> Self {
        Self {
            classpath,
            state: DashMap::new(),
        }
    }

    /// The classpath the scope was seeded with, in precedence order.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Stores a shared value under `key`.
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) {
        self.state.insert(key.into(), value);
    }

    /// Fetches a shared value of type `T`, if present.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.state
            .get(key)
            .and_then(|v| Arc::clone(v.value()).downcast::<T>().ok())
    }
}

/// Registry of verticle factories keyed by factory name.
///
/// Selection is two-level, like the language map it mirrors: the `main`
/// extension maps to a factory name (`langs`), and the name maps to a
/// registered factory.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn VerticleFactory>>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn VerticleFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Selects the factory for `main` via the language map.
    ///
    /// The extension of `main` is looked up in `langs`; an unmapped (or
    /// absent) extension falls back to the `default` key.
    pub fn select(
        &self,
        main: &str,
        langs: &HashMap<String, String>,
    ) -> Result<Arc<dyn VerticleFactory>, DeployError> {
        let extension = main.rsplit_once('.').map(|(_, ext)| ext);
        let factory_name = extension
            .and_then(|ext| langs.get(ext))
            .or_else(|| langs.get("default"))
            .ok_or_else(|| DeployError::FactoryNotFound {
                extension: extension.unwrap_or("default").to_string(),
            })?;
        self.factories
            .get(factory_name)
            .cloned()
            .ok_or_else(|| DeployError::FactoryNotFound {
                extension: factory_name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NopFactory;

    #[async_trait]
    impl VerticleFactory for NopFactory {
        async fn create(
            &self,
            _main: &str,
            _scope: Arc<InstanceScope>,
        ) -> Result<Box<dyn Verticle>, VerticleError> {
            Err("not under test".into())
        }
    }

    fn langs() -> HashMap<String, String> {
        HashMap::from([
            ("js".to_string(), "javascript".to_string()),
            ("default".to_string(), "native".to_string()),
        ])
    }

    #[test]
    fn selects_by_extension_with_default_fallback() {
        let mut registry = FactoryRegistry::new();
        registry.register("javascript", Arc::new(NopFactory));
        registry.register("native", Arc::new(NopFactory));

        assert!(registry.select("app.js", &langs()).is_ok());
        // Unknown extension and extensionless mains use the default factory.
        assert!(registry.select("app.xyz", &langs()).is_ok());
        assert!(registry.select("app", &langs()).is_ok());
    }

    #[test]
    fn unmapped_extension_without_default_fails() {
        let registry = FactoryRegistry::new();
        let empty = HashMap::new();
        let err = match registry.select("app.js", &empty) {
            Err(e) => e,
            Ok(_) => panic!("no mapping"),
        };
        assert_eq!(err.as_label(), "deploy_factory_not_found");
    }

    #[test]
    fn mapped_but_unregistered_factory_fails() {
        let registry = FactoryRegistry::new();
        let err = match registry.select("app.js", &langs()) {
            Err(e) => e,
            Ok(_) => panic!("unregistered"),
        };
        assert_eq!(err.as_label(), "deploy_factory_not_found");
    }

    #[test]
    fn scope_state_is_typed_and_shared() {
        let scope = InstanceScope::new(vec![PathBuf::from("/mods/a")]);
        scope.put("pool", Arc::new(42usize));
        assert_eq!(scope.get::<usize>("pool").as_deref(), Some(&42));
        assert!(scope.get::<String>("pool").is_none());
        assert!(scope.get::<usize>("absent").is_none());
        assert_eq!(scope.classpath(), &[PathBuf::from("/mods/a")]);
    }
}

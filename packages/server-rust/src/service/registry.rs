use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::ReentrantMutex;

use super::config::Config;
use super::Service;

// ---------------------------------------------------------------------------
// ConfigRegistry
// ---------------------------------------------------------------------------

/// Process-wide map from service type to its [`Config`].
///
/// Lookups are lock-free through the `DashMap`. First-time construction runs
/// under `init`, so two threads touching a type for the first time still get
/// the same config, configured exactly once. The lock is reentrant because a
/// `configure` body may touch other service types.
pub struct ConfigRegistry {
    /// Type-based lookup: `TypeId` -> `Arc<Config<S>>` behind `dyn Any`.
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    init: ReentrantMutex<()>,
}

impl ConfigRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_type: DashMap::new(),
            init: ReentrantMutex::new(()),
        }
    }

    /// Returns the config of `S`, if it has been built.
    pub fn get<S: Service>(&self) -> Option<Arc<Config<S>>> {
        self.by_type
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.value().clone().downcast::<Config<S>>().ok())
    }

    /// Returns the config of `S`, building and configuring it on first use.
    ///
    /// A failing [`Service::configure`] does not panic: the error is kept on
    /// the config and returned by every commit attempt.
    pub fn get_or_init<S: Service>(&self) -> Arc<Config<S>> {
        if let Some(config) = self.get::<S>() {
            return config;
        }

        let _guard = self.init.lock();
        if let Some(config) = self.get::<S>() {
            return config;
        }

        let config = Arc::new(Config::<S>::new());
        if let Err(err) = S::configure(&config) {
            tracing::warn!(service = S::name(), error = %err, "service configuration failed");
            config.record_setup_error(err);
        }
        self.by_type.insert(TypeId::of::<S>(), config.clone());
        config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The global registry.
pub fn global() -> &'static ConfigRegistry {
    static REGISTRY: OnceLock<ConfigRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ConfigRegistry::new)
}

/// Shorthand for `global().get_or_init::<S>()`.
pub fn config<S: Service>() -> Arc<Config<S>> {
    global().get_or_init::<S>()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use conduct_core::Arguments;

    use super::*;
    use crate::error::ConfigError;

    struct Plain;

    impl Service for Plain {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    static CONFIGURED: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl Service for Counted {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn configure(config: &Config<Self>) -> Result<(), ConfigError> {
            CONFIGURED.fetch_add(1, Ordering::SeqCst);
            crate::middleware::pipeline::configure(config)
        }
    }

    struct Broken;

    impl Service for Broken {
        fn build(_arguments: &Arguments) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn configure(config: &Config<Self>) -> Result<(), ConfigError> {
            config.concerns(|stack| stack.delete("missing").map(drop))
        }
    }

    #[test]
    fn same_config_is_returned_for_a_type() {
        let registry = ConfigRegistry::new();
        assert!(registry.get::<Plain>().is_none());

        let first = registry.get_or_init::<Plain>();
        let second = registry.get_or_init::<Plain>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_first_use_configures_once() {
        let registry = Arc::new(ConfigRegistry::new());
        let before = CONFIGURED.load(Ordering::SeqCst);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_init::<Counted>())
            })
            .collect();
        let configs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(configs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(CONFIGURED.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn configure_error_is_reported_by_commit() {
        let registry = ConfigRegistry::new();
        let config = registry.get_or_init::<Broken>();

        let first = config.commit().unwrap_err();
        let second = config.commit().unwrap_err();

        assert!(matches!(first, ConfigError::Stack(_)));
        assert_eq!(first, second);
        assert!(!config.is_committed());
    }
}

//! Provider type registry.
//!
//! Maps a provider type name to a loader. The loader runs at most once, on
//! first use of the type, and yields the constructor used for every instance
//! of that type.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{Span, debug};

use super::config::ProviderConfig;
use super::provider::{BaseProvider, NotificationProvider, panic_message};
use super::providers;
use super::result::{NotificationError, NotificationResult};
use crate::{Error, Result};

/// Builds a channel from a validated config. The span is the instance's logger.
pub type ProviderConstructor = Arc<
    dyn Fn(&ProviderConfig, &Span) -> NotificationResult<Arc<dyn NotificationProvider>>
        + Send
        + Sync,
>;

/// Produces the constructor for a provider type.
pub type ProviderLoader = Box<dyn Fn() -> ProviderConstructor + Send + Sync>;

struct RegistryEntry {
    loader: ProviderLoader,
    constructor: OnceLock<ProviderConstructor>,
}

impl RegistryEntry {
    fn new(loader: ProviderLoader) -> Self {
        Self {
            loader,
            constructor: OnceLock::new(),
        }
    }
}

/// Registry of provider types.
///
/// Shared between services through an `Arc`; registration is rare and lookups
/// are frequent.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.available_types())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in provider types.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut entries = registry.entries.write();
            for (provider_type, loader) in providers::builtin_loaders() {
                entries.insert(
                    provider_type.to_string(),
                    Arc::new(RegistryEntry::new(loader)),
                );
            }
        }
        registry
    }

    /// Register a provider type. Existing types are never replaced.
    pub fn register<F>(&self, provider_type: impl Into<String>, loader: F) -> Result<()>
    where
        F: Fn() -> ProviderConstructor + Send + Sync + 'static,
    {
        let provider_type = provider_type.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&provider_type) {
            return Err(Error::DuplicateProviderType(provider_type));
        }

        debug!(provider_type = %provider_type, "Registered provider type");
        entries.insert(provider_type, Arc::new(RegistryEntry::new(Box::new(loader))));
        Ok(())
    }

    /// Register a provider type with an already-built constructor.
    pub fn register_constructor<F>(&self, provider_type: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn(&ProviderConfig, &Span) -> NotificationResult<Arc<dyn NotificationProvider>>
            + Send
            + Sync
            + 'static,
    {
        let constructor: ProviderConstructor = Arc::new(constructor);
        self.register(provider_type, move || constructor.clone())
    }

    pub fn contains(&self, provider_type: &str) -> bool {
        self.entries.read().contains_key(provider_type)
    }

    /// Registered type names, sorted.
    pub fn available_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Whether the loader of `provider_type` has already run.
    pub fn is_loaded(&self, provider_type: &str) -> bool {
        self.entries
            .read()
            .get(provider_type)
            .is_some_and(|entry| entry.constructor.get().is_some())
    }

    /// Get the constructor for `provider_type`, running its loader on first use.
    pub fn get_constructor(&self, provider_type: &str) -> Result<ProviderConstructor> {
        let entry = self.entries.read().get(provider_type).cloned();
        let Some(entry) = entry else {
            return Err(Error::unknown_provider_type(
                provider_type,
                self.available_types(),
            ));
        };

        let constructor = entry.constructor.get_or_init(|| {
            debug!(provider_type = %provider_type, "Loading provider type");
            (entry.loader)()
        });
        Ok(constructor.clone())
    }

    /// Instantiate a provider and wrap it in the delivery pipeline.
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        span: Span,
    ) -> NotificationResult<BaseProvider> {
        let provider_type = config.provider_type();
        let context = |message: String| {
            NotificationError::configuration(format!(
                "failed to create provider '{}' of type '{}': {}",
                config.id, provider_type, message
            ))
            .with_provider(config.id.clone())
        };

        let constructor = self
            .get_constructor(provider_type)
            .map_err(|e| context(e.to_string()))?;

        let channel = match std::panic::catch_unwind(AssertUnwindSafe(|| constructor(config, &span)))
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => return Err(context(e.message.clone()).with_cause(&e)),
            Err(panic) => {
                return Err(context("constructor panicked".to_string())
                    .with_cause(panic_message(panic.as_ref())));
            }
        };

        Ok(BaseProvider::new(config.clone(), channel, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::ErrorCode;
    use crate::notification::config::{CustomSettings, ProviderSettings};
    use crate::notification::provider::tests::TestChannel;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn custom_config(id: &str, provider_type: &str) -> ProviderConfig {
        ProviderConfig::new(
            id,
            ProviderSettings::Custom(CustomSettings {
                provider_type: provider_type.to_string(),
                options: Default::default(),
            }),
        )
    }

    fn test_constructor() -> ProviderConstructor {
        Arc::new(|_config: &ProviderConfig, _span: &Span| {
            Ok(Arc::new(TestChannel::succeeding()) as Arc<dyn NotificationProvider>)
        })
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(
            registry.available_types(),
            vec!["discord", "email", "msteams", "pagerduty", "slack", "webhook"]
        );
        assert!(registry.contains("slack"));
        assert!(!registry.is_loaded("slack"));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry.register("slack", test_constructor).unwrap_err();
        assert!(matches!(err, Error::DuplicateProviderType(t) if t == "slack"));

        registry.register("sms", test_constructor).unwrap();
        assert!(registry.register("sms", test_constructor).is_err());
    }

    #[test]
    fn test_unknown_type_lists_available() {
        let registry = ProviderRegistry::new();
        registry.register("sms", test_constructor).unwrap();

        let err = registry.get_constructor("pager").err().unwrap();
        match &err {
            Error::UnknownProviderType {
                provider_type,
                available,
            } => {
                assert_eq!(provider_type, "pager");
                assert_eq!(available, &vec!["sms".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("sms"));
    }

    #[test]
    fn test_loader_runs_once() {
        let loads = Arc::new(AtomicU32::new(0));
        let registry = ProviderRegistry::new();
        let counter = loads.clone();
        registry
            .register("sms", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                test_constructor()
            })
            .unwrap();

        assert!(!registry.is_loaded("sms"));
        registry.get_constructor("sms").unwrap();
        registry.get_constructor("sms").unwrap();
        registry
            .create_provider(&custom_config("a", "sms"), Span::none())
            .unwrap();

        assert!(registry.is_loaded("sms"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_create_provider_wraps_failures() {
        let registry = ProviderRegistry::new();
        registry
            .register_constructor("broken", |_config, _span| {
                Err(NotificationError::configuration("missing api token"))
            })
            .unwrap();
        registry
            .register_constructor("explosive", |_config, _span| panic!("boom"))
            .unwrap();

        let err = registry
            .create_provider(&custom_config("b", "broken"), Span::none())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigurationError);
        assert_eq!(err.provider_id.as_deref(), Some("b"));
        assert!(err.message.contains("'broken'"));
        assert!(err.message.contains("missing api token"));

        let err = registry
            .create_provider(&custom_config("e", "explosive"), Span::none())
            .unwrap_err();
        assert_eq!(err.cause.as_deref(), Some("boom"));

        let err = registry
            .create_provider(&custom_config("u", "unknown"), Span::none())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigurationError);
        assert!(err.message.contains("unknown"));
    }

    #[test]
    fn test_create_provider_wraps_in_pipeline() {
        let registry = ProviderRegistry::new();
        registry.register("sms", test_constructor).unwrap();

        let mut config = custom_config("pager-sms", "sms");
        config.enabled = false;
        let provider = registry.create_provider(&config, Span::none()).unwrap();

        assert_eq!(provider.id(), "pager-sms");
        assert_eq!(provider.provider_type(), "sms");
        assert!(!provider.is_enabled());
    }
}

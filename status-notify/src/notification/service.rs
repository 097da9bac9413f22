//! Notification service implementation.
//!
//! The NotificationService is responsible for:
//! - Registering configured providers against a [`ProviderRegistry`]
//! - Loading provider instances eagerly or on first use
//! - Fanning each event out to enabled providers in bounded chunks
//! - Isolating provider failures and panics from each other
//! - Exposing per-provider statistics and runtime enable/disable

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn};

use super::config::ProviderConfig;
use super::context::{NotificationContext, NotificationMetadata};
use super::events::{EventKind, NotificationEvent};
use super::provider::{BaseProvider, panic_message};
use super::registry::ProviderRegistry;
use super::result::{DeliveryOutcome, NotificationError, NotificationResult};
use super::stats::NotificationStats;
use crate::{Error, Result};

/// Default number of providers notified concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// When provider instances are created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStrategy {
    /// On first use.
    #[default]
    Lazy,
    /// During [`NotificationService::initialize`].
    Eager,
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationServiceConfig {
    /// Validated provider configurations, in dispatch order.
    pub providers: Vec<ProviderConfig>,
    pub loading_strategy: LoadingStrategy,
    /// Maximum providers notified at once. Values below 1 are treated as 1.
    pub max_concurrency: usize,
    /// Keep dispatching later chunks after a chunk with a failure.
    pub continue_on_error: bool,
    /// Metadata merged under every call's overrides.
    pub default_context: NotificationMetadata,
    /// Shared deadline for each chunk. `None` leaves timing to the providers.
    pub chunk_timeout_ms: Option<u64>,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            loading_strategy: LoadingStrategy::Lazy,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            continue_on_error: true,
            default_context: NotificationMetadata::default(),
            chunk_timeout_ms: None,
        }
    }
}

/// Per-provider results of one `notify` call, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResults {
    results: Vec<(String, NotificationResult<DeliveryOutcome>)>,
}

impl DispatchResults {
    /// Result for one provider. `None` if it was not dispatched to.
    pub fn get(&self, provider_id: &str) -> Option<&NotificationResult<DeliveryOutcome>> {
        self.results
            .iter()
            .find(|(id, _)| id == provider_id)
            .map(|(_, result)| result)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NotificationResult<DeliveryOutcome>)> {
        self.results.iter().map(|(id, result)| (id.as_str(), result))
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|(id, _)| id.as_str())
    }

    /// Whether any provider returned an error.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|(_, result)| result.is_err())
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|(_, result)| result.is_err()).count()
    }

    fn push(&mut self, provider_id: String, result: NotificationResult<DeliveryOutcome>) {
        self.results.push((provider_id, result));
    }
}

impl IntoIterator for DispatchResults {
    type Item = (String, NotificationResult<DeliveryOutcome>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Outcome of one event within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub event: EventKind,
    /// No provider returned an error.
    pub success: bool,
    pub results: DispatchResults,
}

/// Aggregate of a `notify_batch` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub events: Vec<EventReport>,
}

/// Public view of a configured provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub provider_type: String,
    pub enabled: bool,
    /// Whether an instance has been created.
    pub loaded: bool,
}

/// A configured provider and its lazily created instance.
struct ProviderSlot {
    config: ProviderConfig,
    enabled: AtomicBool,
    instance: OnceCell<NotificationResult<Arc<BaseProvider>>>,
}

impl ProviderSlot {
    fn new(config: ProviderConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            instance: OnceCell::new(),
            config,
        }
    }

    fn id(&self) -> &str {
        &self.config.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn loaded(&self) -> Option<&Arc<BaseProvider>> {
        self.instance.get().and_then(|result| result.as_ref().ok())
    }
}

/// Providers of an initialized service.
struct ServiceState {
    slots: Vec<Arc<ProviderSlot>>,
    index: HashMap<String, usize>,
}

impl ServiceState {
    fn slot(&self, id: &str) -> Result<&Arc<ProviderSlot>> {
        self.index
            .get(id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| Error::ProviderNotFound(id.to_string()))
    }
}

/// The notification service.
pub struct NotificationService {
    config: NotificationServiceConfig,
    registry: Arc<ProviderRegistry>,
    state: RwLock<Option<Arc<ServiceState>>>,
}

impl NotificationService {
    /// Create a service. Nothing is registered until [`initialize`](Self::initialize).
    pub fn new(config: NotificationServiceConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config,
            registry,
            state: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &NotificationServiceConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Register every configured provider.
    ///
    /// Duplicate ids and unknown types are rejected before anything is loaded.
    /// With [`LoadingStrategy::Eager`] all providers are instantiated now; load
    /// failures are logged and reported when the provider is next used.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }

        let mut index = HashMap::with_capacity(self.config.providers.len());
        for (i, config) in self.config.providers.iter().enumerate() {
            if index.insert(config.id.clone(), i).is_some() {
                error!(provider_id = %config.id, "Duplicate provider id");
                return Err(Error::DuplicateProviderId(config.id.clone()));
            }
        }

        for config in &self.config.providers {
            if !self.registry.contains(config.provider_type()) {
                return Err(Error::unknown_provider_type(
                    config.provider_type(),
                    self.registry.available_types(),
                ));
            }
        }

        let state = Arc::new(ServiceState {
            slots: self
                .config
                .providers
                .iter()
                .cloned()
                .map(|config| Arc::new(ProviderSlot::new(config)))
                .collect(),
            index,
        });

        if self.config.loading_strategy == LoadingStrategy::Eager {
            for slot in &state.slots {
                // Failures are cached in the slot and surface on use.
                let _ = self.load(slot).await;
            }
        }

        let mut guard = self.state.write();
        if guard.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        *guard = Some(state);
        drop(guard);

        info!(
            providers = self.config.providers.len(),
            strategy = ?self.config.loading_strategy,
            max_concurrency = self.max_concurrency(),
            "Notification service initialized"
        );
        Ok(())
    }

    /// Dispatch one event to every enabled provider.
    ///
    /// Providers are notified in configuration order, `max_concurrency` at a
    /// time; a chunk starts only after the previous one has finished.
    pub async fn notify(
        &self,
        event: NotificationEvent,
        metadata: Option<NotificationMetadata>,
    ) -> Result<DispatchResults> {
        let state = self.state()?;

        let metadata = match &metadata {
            Some(overrides) => self.config.default_context.merged_with(overrides),
            None => self.config.default_context.clone(),
        };
        let context = NotificationContext::new(event, metadata);
        let kind = context.event.kind();

        let selected: Vec<Arc<ProviderSlot>> = state
            .slots
            .iter()
            .filter(|slot| slot.is_enabled())
            .cloned()
            .collect();

        debug!(event = %kind, providers = selected.len(), "Dispatching notification");

        let mut results = DispatchResults::default();
        for (chunk_index, chunk) in selected.chunks(self.max_concurrency()).enumerate() {
            let deadline = self
                .config
                .chunk_timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms));

            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|slot| self.dispatch_one(slot, &context, deadline)),
            )
            .await;

            let mut chunk_failed = false;
            for (slot, outcome) in chunk.iter().zip(outcomes) {
                chunk_failed |= outcome.is_err();
                results.push(slot.id().to_string(), outcome);
            }

            if chunk_failed && !self.config.continue_on_error {
                let remaining = selected.len() - results.len();
                if remaining > 0 {
                    warn!(
                        event = %kind,
                        chunk = chunk_index,
                        skipped = remaining,
                        "Chunk failed, not notifying remaining providers"
                    );
                }
                break;
            }
        }

        if results.has_failures() {
            warn!(
                event = %kind,
                failed = results.failure_count(),
                total = results.len(),
                "Notification dispatched with failures"
            );
        } else {
            debug!(event = %kind, total = results.len(), "Notification dispatched");
        }

        Ok(results)
    }

    /// Dispatch events one after another.
    pub async fn notify_batch(
        &self,
        events: Vec<NotificationEvent>,
        metadata: Option<NotificationMetadata>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for event in events {
            let kind = event.kind();
            let results = self.notify(event, metadata.clone()).await?;
            let success = !results.has_failures();

            report.total += 1;
            if success {
                report.successful += 1;
            } else {
                report.failed += 1;
            }
            report.events.push(EventReport {
                event: kind,
                success,
                results,
            });
        }

        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            "Batch dispatched"
        );
        Ok(report)
    }

    /// Statistics of every loaded provider.
    pub fn get_stats(&self) -> BTreeMap<String, NotificationStats> {
        let Ok(state) = self.state() else {
            return BTreeMap::new();
        };
        state
            .slots
            .iter()
            .filter_map(|slot| {
                slot.loaded()
                    .map(|provider| (slot.id().to_string(), provider.stats()))
            })
            .collect()
    }

    /// Statistics of one provider; `None` until it has been loaded.
    pub fn get_provider_stats(&self, provider_id: &str) -> Result<Option<NotificationStats>> {
        let state = self.state()?;
        let slot = state.slot(provider_id)?;
        Ok(slot.loaded().map(|provider| provider.stats()))
    }

    pub fn reset_stats(&self) {
        if let Ok(state) = self.state() {
            for provider in state.slots.iter().filter_map(|slot| slot.loaded()) {
                provider.reset_stats();
            }
            info!("Notification statistics reset");
        }
    }

    pub fn reset_provider_stats(&self, provider_id: &str) -> Result<()> {
        let state = self.state()?;
        if let Some(provider) = state.slot(provider_id)?.loaded() {
            provider.reset_stats();
        }
        Ok(())
    }

    pub fn enable_provider(&self, provider_id: &str) -> Result<()> {
        self.set_provider_enabled(provider_id, true)
    }

    pub fn disable_provider(&self, provider_id: &str) -> Result<()> {
        self.set_provider_enabled(provider_id, false)
    }

    /// Describe every configured provider, in configuration order.
    pub fn list_providers(&self) -> Vec<ProviderInfo> {
        match self.state() {
            Ok(state) => state
                .slots
                .iter()
                .map(|slot| ProviderInfo {
                    id: slot.id().to_string(),
                    provider_type: slot.config.provider_type().to_string(),
                    enabled: slot.is_enabled(),
                    loaded: slot.loaded().is_some(),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Probe one provider's readiness, loading it if needed.
    pub async fn validate_provider(&self, provider_id: &str) -> Result<NotificationResult<()>> {
        let state = self.state()?;
        let slot = state.slot(provider_id)?.clone();
        Ok(self.validate_slot(&slot).await)
    }

    /// Probe every configured provider, enabled or not.
    pub async fn validate_all(&self) -> Result<Vec<(String, NotificationResult<()>)>> {
        let state = self.state()?;
        let outcomes = join_all(state.slots.iter().map(|slot| async move {
            (slot.id().to_string(), self.validate_slot(slot).await)
        }))
        .await;
        Ok(outcomes)
    }

    /// Drop all provider instances and statistics.
    ///
    /// The service returns to the uninitialized state and may be initialized again.
    pub fn shutdown(&self) {
        if let Some(state) = self.state.write().take() {
            let loaded = state.slots.iter().filter(|s| s.loaded().is_some()).count();
            info!(loaded, "Notification service shut down");
        }
    }

    fn state(&self) -> Result<Arc<ServiceState>> {
        self.state.read().clone().ok_or(Error::NotInitialized)
    }

    fn max_concurrency(&self) -> usize {
        self.config.max_concurrency.max(1)
    }

    fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> Result<()> {
        let state = self.state()?;
        let slot = state.slot(provider_id)?;
        slot.enabled.store(enabled, Ordering::Release);
        if let Some(provider) = slot.loaded() {
            provider.set_enabled(enabled);
        }
        info!(provider_id, enabled, "Provider toggled");
        Ok(())
    }

    /// Get the slot's instance, creating it on first use.
    async fn load(&self, slot: &ProviderSlot) -> NotificationResult<Arc<BaseProvider>> {
        slot.instance
            .get_or_init(|| async { self.instantiate(slot) })
            .await
            .clone()
    }

    fn instantiate(&self, slot: &ProviderSlot) -> NotificationResult<Arc<BaseProvider>> {
        let config = &slot.config;
        let span = info_span!(
            "provider",
            provider_id = %config.id,
            provider_type = %config.provider_type()
        );

        match self.registry.create_provider(config, span) {
            Ok(provider) => {
                provider.set_enabled(slot.is_enabled());
                info!(
                    provider_id = %config.id,
                    provider_type = %config.provider_type(),
                    "Provider loaded"
                );
                Ok(Arc::new(provider))
            }
            Err(e) => {
                error!(
                    provider_id = %config.id,
                    provider_type = %config.provider_type(),
                    error = %e,
                    "Failed to load provider"
                );
                Err(e)
            }
        }
    }

    async fn dispatch_one(
        &self,
        slot: &ProviderSlot,
        context: &NotificationContext,
        deadline: Option<Instant>,
    ) -> NotificationResult<DeliveryOutcome> {
        let delivery = AssertUnwindSafe(async {
            let provider = self.load(slot).await?;
            provider.send(context).await
        })
        .catch_unwind();

        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, delivery).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(provider_id = %slot.id(), "Provider missed the chunk deadline");
                    return Err(NotificationError::timeout(format!(
                        "provider did not finish within the chunk deadline of {} ms",
                        self.config.chunk_timeout_ms.unwrap_or_default()
                    ))
                    .with_provider(slot.id()));
                }
            },
            None => delivery.await,
        };

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(provider_id = %slot.id(), panic = %message, "Provider panicked");
                Err(NotificationError::internal("provider panicked")
                    .with_cause(message)
                    .with_provider(slot.id()))
            }
        }
    }

    async fn validate_slot(&self, slot: &ProviderSlot) -> NotificationResult<()> {
        let provider = self.load(slot).await?;
        provider.validate().await
    }
}

//! Process-wide cache of resolved service clients
//!
//! Each service identifier owns one slot guarded by an async mutex, so
//! concurrent first use of a service builds its client once while later
//! callers wait and observe the stored entry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::config::{ConfigProvider, Environment};
use crate::core::{BuildOutcome, ClientBuilder, OperationClient};
use crate::error::{Result, ServiceError};
use crate::registry::{ServiceDescriptor, ServiceRegistry};

/// Cached resolution state of one service
#[derive(Clone)]
pub enum CacheEntry {
    /// Callable client; replaced only by `clear` or `reinit`
    Live(Arc<dyn OperationClient>),

    /// The build failed; holds the raw descriptor
    Fallback(ServiceDescriptor),

    /// Environment values were unavailable, nothing was built
    Stub,
}

impl CacheEntry {
    pub fn is_live(&self) -> bool {
        matches!(self, CacheEntry::Live(_))
    }

    pub fn client(&self) -> Option<&Arc<dyn OperationClient>> {
        match self {
            CacheEntry::Live(client) => Some(client),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CacheEntry::Live(_) => "live",
            CacheEntry::Fallback(_) => "fallback",
            CacheEntry::Stub => "stub",
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEntry::Live(client) => f.debug_tuple("Live").field(&client.operations()).finish(),
            CacheEntry::Fallback(descriptor) => f.debug_tuple("Fallback").field(descriptor).finish(),
            CacheEntry::Stub => f.write_str("Stub"),
        }
    }
}

/// What a resolve does with a previously failed build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Keep the fallback for the life of the process
    #[default]
    Sticky,

    /// Build again on the next resolve
    RetryOnMiss,
}

impl FromStr for FallbackPolicy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sticky" => Ok(FallbackPolicy::Sticky),
            "retry" | "retry_on_miss" => Ok(FallbackPolicy::RetryOnMiss),
            other => Err(ServiceError::configuration(format!(
                "Unknown fallback policy '{}'",
                other
            ))),
        }
    }
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

/// Resolve-or-build cache keyed by service identifier
pub struct ServiceClientCache {
    builder: ClientBuilder,
    config: Arc<dyn ConfigProvider>,
    policy: FallbackPolicy,
    slots: DashMap<String, Slot>,
}

impl ServiceClientCache {
    /// `config` is read for the environment before every build
    pub fn new(builder: ClientBuilder, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            builder,
            config,
            policy: FallbackPolicy::default(),
            slots: DashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    /// Resolve a service, building its client when the slot calls for it.
    ///
    /// Unregistered identifiers fail with `UnknownService` whatever the
    /// cache holds.
    #[tracing::instrument(skip(self, registry))]
    pub async fn resolve(&self, service_id: &str, registry: &ServiceRegistry) -> Result<CacheEntry> {
        let descriptor = registry.descriptor(service_id)?;

        let slot = self.slot(service_id);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if !self.needs_build(entry) {
                return Ok(entry.clone());
            }
            debug!("Rebuilding '{}' client from {} entry", service_id, entry.kind());
        }

        let entry = self.build_entry(service_id, descriptor, registry).await;
        *guard = Some(entry.clone());
        Ok(entry)
    }

    /// Current entry without building; `None` while a build holds the slot
    pub fn get(&self, service_id: &str) -> Option<CacheEntry> {
        let slot = self.slots.get(service_id).map(|slot| Arc::clone(slot.value()))?;
        let guard = slot.try_lock().ok()?;
        guard.as_ref().cloned()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Clear, then resolve every registered service concurrently
    pub async fn reinit(&self, registry: &ServiceRegistry) -> Result<BTreeMap<String, CacheEntry>> {
        self.clear();

        let resolutions = registry.service_ids().map(move |service_id| async move {
            let entry = self.resolve(service_id, registry).await?;
            Ok::<_, ServiceError>((service_id.to_string(), entry))
        });

        join_all(resolutions).await.into_iter().collect()
    }

    /// Number of identifiers with a slot
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, service_id: &str) -> Slot {
        Arc::clone(self.slots.entry(service_id.to_string()).or_default().value())
    }

    fn needs_build(&self, entry: &CacheEntry) -> bool {
        match entry {
            CacheEntry::Live(_) => false,
            CacheEntry::Fallback(_) => self.policy == FallbackPolicy::RetryOnMiss,
            CacheEntry::Stub => true,
        }
    }

    async fn build_entry(
        &self,
        service_id: &str,
        descriptor: &ServiceDescriptor,
        registry: &ServiceRegistry,
    ) -> CacheEntry {
        let env = match Environment::from_provider(self.config.as_ref()) {
            Ok(env) => env,
            Err(err) => {
                warn!("Environment unavailable, stubbing '{}' client: {}", service_id, err);
                return CacheEntry::Stub;
            }
        };

        match self.builder.build(service_id, registry, &env).await {
            BuildOutcome::Built(client) => CacheEntry::Live(client),
            BuildOutcome::Failed(_) => CacheEntry::Fallback(descriptor.clone()),
        }
    }
}

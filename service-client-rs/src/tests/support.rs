//! Fakes shared by the scenario tests

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::cache::{FallbackPolicy, ServiceClientCache};
use crate::config::ConfigProvider;
use crate::core::{
    ClientBuilder, ClientFactory, ClientTarget, OperationClient, OperationRequest, OperationResponse,
};
use crate::credentials::{CredentialStore, MockCredentialStore};
use crate::error::{mapping::status_text, Result, ServiceError};
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::resilience::RetryConfig;

/// Config provider that can change while shared
#[derive(Debug, Default)]
pub struct SharedConfig {
    values: RwLock<HashMap<String, String>>,
}

impl SharedConfig {
    /// A `dev` deployment under `x.com`
    pub fn deployed() -> Self {
        let config = Self::default();
        config.set("env", "dev");
        config.set("root_domain", "x.com");
        config.set("prod_env_token", "prod");
        config
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values.write().unwrap().insert(key.to_string(), value.into());
    }
}

impl ConfigProvider for SharedConfig {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// Operation client answering every call with one canned response
pub struct RecordingClient {
    operations: BTreeSet<String>,
    response: OperationResponse,
    requests: Mutex<Vec<(String, OperationRequest)>>,
}

impl RecordingClient {
    pub fn new(operations: &[&str], status: u16, data: Value) -> Self {
        Self {
            operations: operations.iter().map(|op| op.to_string()).collect(),
            response: OperationResponse {
                status,
                status_text: status_text(status),
                data,
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, OperationRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> OperationRequest {
        self.requests().pop().expect("no request recorded").1
    }
}

#[async_trait]
impl OperationClient for RecordingClient {
    fn operations(&self) -> BTreeSet<String> {
        self.operations.clone()
    }

    async fn invoke(&self, operation_id: &str, request: OperationRequest) -> Result<OperationResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((operation_id.to_string(), request));
        Ok(self.response.clone())
    }
}

/// Factory counting its builds; serves one client or always fails
pub struct StubFactory {
    client: Option<Arc<RecordingClient>>,
    calls: AtomicUsize,
    targets: Mutex<Vec<ClientTarget>>,
}

impl StubFactory {
    pub fn serving(client: Arc<RecordingClient>) -> Arc<Self> {
        Arc::new(Self {
            client: Some(client),
            calls: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            client: None,
            calls: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<ClientTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientFactory for StubFactory {
    async fn create(&self, target: &ClientTarget) -> Result<Arc<dyn OperationClient>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.clone());

        // Long enough for concurrent resolvers to pile up on the slot
        tokio::time::sleep(Duration::from_millis(20)).await;

        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Err(ServiceError::parsing("OpenAPI document has no 'paths' object")),
        }
    }
}

pub fn registry() -> ServiceRegistry {
    ServiceRegistry::new([
        ("merchant", ServiceDescriptor::new("api", "v0", "doc/openapi")),
        ("user", ServiceDescriptor::new("api", "v1", "doc/openapi").with_env_alias("test", "dev")),
    ])
    .unwrap()
}

/// Key store that knows every stack
pub fn key_store() -> Arc<dyn CredentialStore> {
    let mut store = MockCredentialStore::new();
    store
        .expect_find_api_key()
        .returning(|query| Ok(Some(format!("key-for-{}", query.stack_name))));
    Arc::new(store)
}

pub fn cache(factory: Arc<StubFactory>, config: Arc<SharedConfig>, policy: FallbackPolicy) -> ServiceClientCache {
    let builder = ClientBuilder::new(key_store(), factory, RetryConfig::none());
    ServiceClientCache::new(builder, config).with_policy(policy)
}

/// Cache over a `dev` deployment with an explicit key store and retry policy
pub fn cache_with_store(
    store: Arc<dyn CredentialStore>,
    factory: Arc<StubFactory>,
    retry: RetryConfig,
) -> ServiceClientCache {
    let builder = ClientBuilder::new(store, factory, retry);
    ServiceClientCache::new(builder, Arc::new(SharedConfig::deployed()))
}

/// Retry policy with short intervals
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(50),
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: Some(Duration::from_secs(5)),
    }
}

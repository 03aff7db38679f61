//! API key lookup for deployed services
//!
//! Each deployed service stack provisions an API Gateway key named after its
//! stack. Lookups are a single round trip; retrying is left to the caller.
//! SDK clients are loaded once per region and shared by clones of the store.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_apigateway::config::retry::RetryConfig as SdkRetryConfig;
use aws_sdk_apigateway::config::Region;
use aws_sdk_apigateway::error::DisplayErrorContext;
use aws_sdk_apigateway::Client as ApiGatewayClient;
use dashmap::DashMap;
use log::debug;

use crate::config::Environment;
use crate::error::{Result, ServiceError};
use crate::registry::ServiceRegistry;

/// Key-store query for one stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQuery {
    pub stack_name: String,
    pub region: Option<String>,
}

impl KeyQuery {
    /// Query for the stack a registered service is deployed as
    pub fn for_service(registry: &ServiceRegistry, service_id: &str, env: &Environment) -> Result<Self> {
        Ok(Self {
            stack_name: registry.stack_name(service_id, env)?,
            region: env.region.clone(),
        })
    }
}

/// Remote store of API keys, queried by stack name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Value of the first key matching the query, if any
    async fn find_api_key(&self, query: &KeyQuery) -> Result<Option<String>>;
}

/// Resolve the API key of a registered service
pub async fn fetch_api_key(
    store: &dyn CredentialStore,
    registry: &ServiceRegistry,
    service_id: &str,
    env: &Environment,
) -> Result<String> {
    let query = KeyQuery::for_service(registry, service_id, env)?;
    lookup_api_key(store, &query).await
}

/// One key-store round trip; `CredentialNotFound` when nothing matches
pub async fn lookup_api_key(store: &dyn CredentialStore, query: &KeyQuery) -> Result<String> {
    debug!("Getting API Key for '{}'...", query.stack_name);

    match store.find_api_key(query).await? {
        Some(api_key) => {
            debug!("Got API Key for '{}'.", query.stack_name);
            Ok(api_key)
        }
        None => Err(ServiceError::credential_not_found(query.stack_name.as_str())),
    }
}

/// API Gateway backed key store
#[derive(Debug, Clone, Default)]
pub struct ApiGatewayKeyStore {
    /// Custom endpoint (e.g., LocalStack)
    endpoint_url: Option<String>,

    /// SDK clients keyed by region; the empty key is the default chain
    clients: Arc<DashMap<String, ApiGatewayClient>>,
}

impl ApiGatewayKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Client for the requested region, built on first use
    async fn client(&self, region: Option<&str>) -> ApiGatewayClient {
        let key = region.unwrap_or_default().to_string();
        if let Some(client) = self.clients.get(&key) {
            return client.value().clone();
        }

        let client = self.build_client(region).await;
        self.clients.entry(key).or_insert(client).value().clone()
    }

    /// Falls back to the SDK's default region chain when `region` is `None`
    async fn build_client(&self, region: Option<&str>) -> ApiGatewayClient {
        debug!("Loading API Gateway client for region {:?}", region);
        let region_provider =
            RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
                .or_default_provider();

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        // Retries belong to the client build step, not to the key lookup.
        let mut config = aws_sdk_apigateway::config::Builder::from(&sdk_config)
            .retry_config(SdkRetryConfig::standard().with_max_attempts(1));
        if let Some(url) = &self.endpoint_url {
            config = config.endpoint_url(url);
        }
        ApiGatewayClient::from_conf(config.build())
    }
}

#[async_trait]
impl CredentialStore for ApiGatewayKeyStore {
    async fn find_api_key(&self, query: &KeyQuery) -> Result<Option<String>> {
        let client = self.client(query.region.as_deref()).await;

        let output = client
            .get_api_keys()
            .name_query(&query.stack_name)
            .include_values(true)
            .send()
            .await
            .map_err(|e| {
                ServiceError::key_store(format!(
                    "GetApiKeys failed for '{}': {}",
                    query.stack_name,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(output
            .items()
            .first()
            .and_then(|key| key.value())
            .map(str::to_string))
    }
}

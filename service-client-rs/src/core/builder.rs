//! Client builder implementation
//!
//! Resolves the deployment target of a service (base URL, document URL, API
//! key) and constructs its client under the retry policy. Failures are
//! contained: `build` reports them as `BuildOutcome::Failed` instead of
//! returning an error.

use std::fmt;
use std::sync::Arc;

use log::{debug, error};

use crate::config::Environment;
use crate::core::{ClientFactory, ClientTarget, OperationClient};
use crate::credentials::{lookup_api_key, CredentialStore, KeyQuery};
use crate::error::{Result, ServiceError};
use crate::registry::ServiceRegistry;
use crate::resilience::{RetryConfig, RetryExecutor};

/// Result of a single build attempt
pub enum BuildOutcome {
    Built(Arc<dyn OperationClient>),
    Failed(ServiceError),
}

impl fmt::Debug for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Built(client) => f
                .debug_tuple("Built")
                .field(&client.operations())
                .finish(),
            BuildOutcome::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Builds live clients for registered services
#[derive(Clone)]
pub struct ClientBuilder {
    /// API key source
    credentials: Arc<dyn CredentialStore>,

    /// Client construction (document fetch)
    factory: Arc<dyn ClientFactory>,

    /// Backoff around key lookup and client construction
    retry: RetryExecutor,
}

impl ClientBuilder {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        factory: Arc<dyn ClientFactory>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            credentials,
            factory,
            retry: RetryExecutor::new(retry_config),
        }
    }

    /// Build a client for `service_id`; never returns an error
    pub async fn build(
        &self,
        service_id: &str,
        registry: &ServiceRegistry,
        env: &Environment,
    ) -> BuildOutcome {
        match self.try_build(service_id, registry, env).await {
            Ok(client) => BuildOutcome::Built(client),
            Err(err) => {
                error!("Failed to build '{}' client: {}", service_id, err);
                BuildOutcome::Failed(err)
            }
        }
    }

    async fn try_build(
        &self,
        service_id: &str,
        registry: &ServiceRegistry,
        env: &Environment,
    ) -> Result<Arc<dyn OperationClient>> {
        let document_url = registry.openapi_url(service_id, env)?;
        let base_url = registry.base_url(service_id, env)?;
        let query = KeyQuery::for_service(registry, service_id, env)?;
        debug!("Getting '{}' client at {}...", service_id, document_url);

        // Key lookup and document fetch share one backoff budget.
        let credentials = Arc::clone(&self.credentials);
        let factory = Arc::clone(&self.factory);
        let service = service_id.to_string();
        let client = self
            .retry
            .execute(move || {
                let credentials = Arc::clone(&credentials);
                let factory = Arc::clone(&factory);
                let query = query.clone();
                let mut target = ClientTarget {
                    service_id: service.clone(),
                    base_url: base_url.clone(),
                    document_url: document_url.clone(),
                    api_key: String::new(),
                };
                async move {
                    target.api_key = lookup_api_key(credentials.as_ref(), &query).await?;
                    factory.create(&target).await
                }
            })
            .await?;

        debug!("Got '{}' client.", service_id);
        Ok(client)
    }
}

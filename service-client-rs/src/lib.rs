//! # Service Client
//!
//! Lets one Lambda-hosted API call its sibling APIs (and itself) through
//! OpenAPI-driven clients without knowing deployment URLs, API keys or retry
//! policy.
//!
//! This crate provides:
//!
//! - A validated service registry and the URL / stack-name derivation rules
//! - API key lookup against API Gateway
//! - Client construction from a service's OpenAPI document, under retry
//! - A process-wide client cache with one build per service
//! - A uniform invocation contract with normalized errors
//!
//! ## Architecture
//!
//! - `ServiceRegistry`: service identifier to deployment descriptor
//! - `CredentialStore`: remote API key lookup
//! - `ClientBuilder`: resolves a target and builds an `OperationClient`
//! - `ServiceClientCache`: resolve-or-build with a per-service slot
//! - `EndpointInvoker`: merges call arguments, invokes, normalizes errors
//! - `ServiceError`: crate-wide error type

use std::sync::Arc;

pub mod core;
pub use crate::core::{
    BuildOutcome, ClientBuilder, ClientFactory, ClientTarget, OperationClient, OperationRequest,
    OperationResponse, RequestBody,
};

pub mod cache;
pub use cache::{CacheEntry, FallbackPolicy, ServiceClientCache};

pub mod invoker;
pub use invoker::{
    CallDefaults, EndpointInvoker, Invocation, InvokerOptions, ServiceRequest, ServiceResponse,
};

pub mod endpoint;
pub use endpoint::{openapi_endpoint, EndpointAuth, EndpointOptions};

pub mod registry;
pub use registry::{ServiceDescriptor, ServiceRegistry};

pub mod credentials;
pub use credentials::{fetch_api_key, ApiGatewayKeyStore, CredentialStore, KeyQuery};

pub mod openapi;
pub use openapi::{OpenApiClient, OpenApiClientFactory};

pub mod multipart;

pub mod error;
pub use error::{ErrorContext, ErrorResponse, Result, ServiceError};

pub mod resilience;
pub use resilience::{RetryConfig, RetryExecutor};

pub mod config;
pub use config::{ConfigProvider, EnvConfigProvider, Environment, MemoryConfigProvider};

// Utility module for common functionality
mod util;

#[cfg(test)]
mod tests;

/// Wire the default stack from process environment variables:
/// API Gateway keys, OpenAPI clients and retry/invoker settings.
pub fn from_env(registry: ServiceRegistry) -> Result<EndpointInvoker> {
    let config: Arc<dyn ConfigProvider> = Arc::new(EnvConfigProvider::new());
    from_provider(registry, config)
}

/// Wire the default stack from an arbitrary config provider
pub fn from_provider(registry: ServiceRegistry, config: Arc<dyn ConfigProvider>) -> Result<EndpointInvoker> {
    let options = InvokerOptions::from_provider(config.as_ref())?;
    let retry = RetryConfig::from_provider(config.as_ref())?;

    let builder = ClientBuilder::new(
        Arc::new(ApiGatewayKeyStore::new()),
        Arc::new(OpenApiClientFactory::new()),
        retry,
    );
    let cache = ServiceClientCache::new(builder, config).with_policy(options.fallback_policy);

    Ok(EndpointInvoker::new(Arc::new(cache), Arc::new(registry), options))
}

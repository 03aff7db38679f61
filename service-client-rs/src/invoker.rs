//! Uniform call contract over resolved service clients
//!
//! `EndpointInvoker` resolves a service through the cache, merges the caller's
//! arguments over handler defaults, invokes the operation and converts error
//! statuses into `ServiceError::Upstream`.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{CacheEntry, FallbackPolicy, ServiceClientCache};
use crate::config::{task_file_root, ConfigProvider, ConfigProviderExt};
use crate::core::{OperationRequest, RequestBody};
use crate::error::mapping::classify_http_error;
use crate::error::{ErrorResponse, Result, ServiceError};
use crate::multipart::take_file_reference;
use crate::registry::ServiceRegistry;
use crate::util::{deep_merge, measure_time_async, truncate_string};

/// Upstream bodies are truncated to this many characters in logs
const LOG_BODY_LIMIT: usize = 512;

/// Invoker behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokerOptions {
    /// Answer `null` instead of `ServiceUnavailable` while the environment is unavailable
    pub allow_unconfigured: bool,

    /// Passed to the cache when wiring from configuration
    pub fallback_policy: FallbackPolicy,
}

impl InvokerOptions {
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let fallback_policy = match provider.get_non_empty("service_client_fallback_policy") {
            Some(raw) => raw.parse()?,
            None => FallbackPolicy::default(),
        };

        let allow_unconfigured = match provider.get_non_empty("service_client_allow_unconfigured") {
            Some(_) => provider.get_bool("service_client_allow_unconfigured")?,
            None => false,
        };

        Ok(Self {
            allow_unconfigured,
            fallback_policy,
        })
    }
}

/// Handler-level defaults the caller's arguments are merged over
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallDefaults {
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub config: Option<Value>,
}

/// One operation call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub service_id: String,
    pub operation_id: String,
    pub params: Option<Value>,
    pub data: Option<Value>,
    pub config: Option<Value>,
    pub defaults: CallDefaults,
}

impl Invocation {
    pub fn new(service_id: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            operation_id: operation_id.into(),
            params: None,
            data: None,
            config: None,
            defaults: CallDefaults::default(),
        }
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn defaults(mut self, defaults: CallDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

/// Wire shape of an internal service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_token: String,
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl From<ServiceRequest> for Invocation {
    fn from(request: ServiceRequest) -> Self {
        Self {
            service_id: request.service_token,
            operation_id: request.operation_id,
            params: request.params,
            data: request.data,
            config: request.config,
            defaults: CallDefaults::default(),
        }
    }
}

/// Wire shape of a successful call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub data: Value,
}

/// Invokes operations on registered services
#[derive(Clone)]
pub struct EndpointInvoker {
    cache: Arc<ServiceClientCache>,
    registry: Arc<ServiceRegistry>,
    options: InvokerOptions,
}

impl EndpointInvoker {
    pub fn new(cache: Arc<ServiceClientCache>, registry: Arc<ServiceRegistry>, options: InvokerOptions) -> Self {
        Self {
            cache,
            registry,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<ServiceClientCache> {
        &self.cache
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn options(&self) -> InvokerOptions {
        self.options
    }

    /// Rebuild the cache for every registered service
    pub async fn init(&self) -> Result<()> {
        let entries = self.cache.reinit(&self.registry).await?;
        let live = entries.values().filter(|entry| entry.is_live()).count();
        debug!("Initialized {}/{} service clients", live, entries.len());
        Ok(())
    }

    /// Invoke an operation and return the response body
    #[tracing::instrument(
        skip(self, invocation),
        fields(service = %invocation.service_id, operation = %invocation.operation_id)
    )]
    pub async fn invoke(&self, invocation: Invocation) -> Result<Value> {
        let Invocation {
            service_id,
            operation_id,
            params,
            data,
            config,
            defaults,
        } = invocation;

        // Only a missing environment is tolerated; a failed build never is
        let client = match self.cache.resolve(&service_id, &self.registry).await? {
            CacheEntry::Live(client) => client,
            CacheEntry::Stub if self.options.allow_unconfigured => {
                warn!(
                    "'{}' is not configured, answering {} with an empty payload",
                    service_id, operation_id
                );
                return Ok(Value::Null);
            }
            entry => {
                debug!("'{}' resolved to {:?}", service_id, entry);
                return Err(ServiceError::service_unavailable(service_id, operation_id));
            }
        };

        if !client.has_operation(&operation_id) {
            return Err(ServiceError::unknown_operation(service_id, operation_id));
        }

        let mut data = deep_merge(defaults.data.as_ref(), data);
        let file = take_file_reference(&mut data, &task_file_root(self.cache.config().as_ref()))?;

        let body = match file {
            Some(file) => Some(RequestBody::Multipart { fields: data, file }),
            None => data.map(RequestBody::Json),
        };
        let request = OperationRequest {
            params: deep_merge(defaults.params.as_ref(), params),
            body,
            config: deep_merge(defaults.config.as_ref(), config),
        };

        debug!("Invoking '{}' {}...", service_id, operation_id);
        let (result, elapsed) = measure_time_async(|| client.invoke(&operation_id, request)).await;
        let response = result?;

        if response.is_error() {
            warn!(
                "'{}' {} failed with {} {} ({}) after {:?}: {}",
                service_id,
                operation_id,
                response.status,
                response.status_text,
                classify_http_error(response.status),
                elapsed,
                truncate_string(&response.data.to_string(), LOG_BODY_LIMIT)
            );
            return Err(ServiceError::upstream(
                response.status,
                response.status_text,
                response.data,
            ));
        }

        debug!("'{}' {} answered {} in {:?}", service_id, operation_id, response.status, elapsed);
        Ok(response.data)
    }

    /// Serve one `ServiceRequest`
    pub async fn handle(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let data = self.invoke(request.into()).await?;
        Ok(ServiceResponse { data })
    }

    /// Serve a raw JSON event, answering with the normalized error shape on failure
    pub async fn handle_event(&self, event: Value) -> std::result::Result<ServiceResponse, ErrorResponse> {
        let request: ServiceRequest = serde_json::from_value(event)
            .map_err(|e| ServiceError::validation(format!("Invalid service request: {}", e)))?;
        Ok(self.handle(request).await?)
    }
}

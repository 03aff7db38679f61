//! Error handling for service resolution and invocation
//!
//! This module provides the crate-wide error type that:
//! - Names every failure the resolver layer can surface (unknown service,
//!   unknown operation, missing credential, unavailable service, upstream error)
//! - Carries transport failures from the HTTP client and the key store
//! - Adds rich context to errors for better debugging
//! - Converts any error into the structured `{ status, statusText, data }` shape

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub mod mapping;

/// Result type for service client operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Main error type for service client operations
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed service registry
    #[error("Invalid config: {0}")]
    ConfigValidation(String),

    /// Service identifier not present in the registry
    #[error("Unknown serviceToken '{0}'.")]
    UnknownService(String),

    /// Operation not exposed by the resolved client
    #[error("Unknown operation '{operation}' on service '{service}'.")]
    UnknownOperation { service: String, operation: String },

    /// No API key matched the stack name
    #[error("Unable to find API Key '{0}'.")]
    CredentialNotFound(String),

    /// The service never resolved to a live client
    #[error("Unable to resolve '{service}' service for operation '{operation}'.")]
    ServiceUnavailable { service: String, operation: String },

    /// Downstream responded with a status of 400 or above
    #[error("Upstream error: {status} {status_text}")]
    Upstream {
        status: u16,
        status_text: String,
        body: Value,
    },

    /// Key store lookup failed before producing an answer
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// Network or connection errors
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Request validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Response or document parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Missing or invalid runtime configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local file access errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Unexpected or internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    /// Create a registry validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        ServiceError::ConfigValidation(message.into())
    }

    /// Create an unknown service error
    pub fn unknown_service(service: impl Into<String>) -> Self {
        ServiceError::UnknownService(service.into())
    }

    /// Create an unknown operation error
    pub fn unknown_operation(service: impl Into<String>, operation: impl Into<String>) -> Self {
        ServiceError::UnknownOperation {
            service: service.into(),
            operation: operation.into(),
        }
    }

    /// Create a credential not found error
    pub fn credential_not_found(stack_name: impl Into<String>) -> Self {
        ServiceError::CredentialNotFound(stack_name.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(service: impl Into<String>, operation: impl Into<String>) -> Self {
        ServiceError::ServiceUnavailable {
            service: service.into(),
            operation: operation.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream(status: u16, status_text: impl Into<String>, body: Value) -> Self {
        ServiceError::Upstream {
            status,
            status_text: status_text.into(),
            body,
        }
    }

    /// Create a key store error
    pub fn key_store(message: impl Into<String>) -> Self {
        ServiceError::KeyStore(message.into())
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// Create a parsing error
    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        ServiceError::Io(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let mut context = ErrorContext::new();
        context.add(key, value);
        self.with_context(context)
    }

    /// Strip any context wrappers
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Get the service name if available
    pub fn service_name(&self) -> Option<&str> {
        match self {
            ServiceError::UnknownService(service) => Some(service),
            ServiceError::UnknownOperation { service, .. } => Some(service),
            ServiceError::ServiceUnavailable { service, .. } => Some(service),
            ServiceError::WithContext { context, inner } => {
                inner.service_name().or(Some(context.service.as_str()))
            }
            _ => None,
        }
    }

    /// HTTP status carried by the error itself (upstream or attached context)
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::Upstream { status, .. } => Some(*status),
            ServiceError::WithContext { inner, context } => {
                inner.status_code().or(context.status_code)
            }
            _ => None,
        }
    }

    /// HTTP-style status a caller should answer with for this error
    pub fn http_status(&self) -> u16 {
        match self.root() {
            ServiceError::Upstream { status, .. } => *status,
            ServiceError::Validation(_) => 400,
            ServiceError::ServiceUnavailable { .. } => 503,
            ServiceError::Timeout(_) => 504,
            ServiceError::Network(_) => 502,
            _ => 500,
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_) => true,
            ServiceError::Timeout(_) => true,
            ServiceError::KeyStore(_) => true,
            ServiceError::Upstream { status, .. } => mapping::is_retryable_status(*status),
            ServiceError::WithContext { inner, .. } => inner.is_retryable(),
            _ => false,
        }
    }

    /// Check if this is a permanent error (not retryable)
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Structured response shape for this error
    pub fn to_response(&self) -> ErrorResponse {
        match self.root() {
            ServiceError::Upstream {
                status,
                status_text,
                body,
            } => ErrorResponse {
                status: *status,
                status_text: status_text.clone(),
                body: body.clone(),
            },
            _ => {
                let status = self.http_status();
                ErrorResponse {
                    status,
                    status_text: mapping::status_text(status),
                    body: json!({ "message": self.to_string() }),
                }
            }
        }
    }
}

/// Normalized error payload handed back to handler wrappers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: u16,
    pub status_text: String,
    #[serde(rename = "data")]
    pub body: Value,
}

impl From<ServiceError> for ErrorResponse {
    fn from(err: ServiceError) -> Self {
        err.to_response()
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Service that generated the error
    pub service: String,

    /// Time the error was recorded
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// URL or operation that was called
    pub endpoint: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "unknown".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific service
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    /// Add an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Add an endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

/// Convert reqwest errors to ServiceError
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let mut context = ErrorContext::for_service("http_client");
        if let Some(url) = err.url() {
            context = context.endpoint(url.as_str());
        }

        let service_error = if err.is_timeout() {
            ServiceError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ServiceError::network(format!("Connection error: {}", err))
        } else if err.is_request() {
            ServiceError::network(format!("Request failed: {}", err))
        } else if err.is_redirect() {
            ServiceError::network(format!("Too many redirects: {}", err))
        } else if err.is_decode() {
            ServiceError::parsing(format!("Response decode error: {}", err))
        } else if err.is_builder() {
            ServiceError::configuration(format!("Invalid request: {}", err))
        } else {
            ServiceError::internal(format!("HTTP client error: {}", err))
        };

        match err.status() {
            Some(status) => service_error.with_context(context.status_code(status.as_u16())),
            None => service_error.with_context(context),
        }
    }
}

/// Convert serde_json errors to ServiceError
impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
            .with_context(ErrorContext::for_service("json"))
    }
}

/// Convert URL parse errors to ServiceError
impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        ServiceError::configuration(format!("Invalid URL: {}", err))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::io(err.to_string())
    }
}

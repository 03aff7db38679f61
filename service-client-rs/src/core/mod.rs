//! Core abstractions for resolved service clients
//!
//! This module provides the capability interfaces the cache and invoker are
//! written against:
//!
//! - `OperationClient`: a client bound to one base URL, document and API key,
//!   exposing named operations
//! - `ClientFactory`: constructs an `OperationClient` from a resolved target
//! - `ClientBuilder`: resolves a target for a service identifier and runs the
//!   factory under retry

pub mod builder;
pub use builder::{BuildOutcome, ClientBuilder};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::multipart::FileUpload;

/// A callable client exposing the operations of one OpenAPI document
#[async_trait]
pub trait OperationClient: Send + Sync {
    /// Operation identifiers this client can invoke
    fn operations(&self) -> BTreeSet<String>;

    /// Whether `operation_id` is callable on this client
    fn has_operation(&self, operation_id: &str) -> bool {
        self.operations().contains(operation_id)
    }

    /// Invoke an operation.
    ///
    /// HTTP error statuses are returned as a response, not an `Err`; transport
    /// failures are errors.
    async fn invoke(&self, operation_id: &str, request: OperationRequest) -> Result<OperationResponse>;
}

/// Arguments for a single operation call
#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    /// Path and query parameters
    pub params: Option<Value>,

    /// Request payload
    pub body: Option<RequestBody>,

    /// Per-call transport options (`headers`, `timeout` in milliseconds)
    pub config: Option<Value>,
}

/// Request payload
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    /// Sent as `multipart/form-data`; `fields` become text parts
    Multipart {
        fields: Option<Value>,
        file: FileUpload,
    },
}

/// Response of an operation call, before error normalization
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub status: u16,
    pub status_text: String,
    pub data: Value,
}

impl OperationResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Everything needed to construct one service client
#[derive(Clone, PartialEq, Eq)]
pub struct ClientTarget {
    pub service_id: String,
    pub base_url: String,
    pub document_url: String,
    pub api_key: String,
}

impl fmt::Debug for ClientTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTarget")
            .field("service_id", &self.service_id)
            .field("base_url", &self.base_url)
            .field("document_url", &self.document_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Constructs clients; construction may fetch the OpenAPI document remotely
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self, target: &ClientTarget) -> Result<Arc<dyn OperationClient>>;
}

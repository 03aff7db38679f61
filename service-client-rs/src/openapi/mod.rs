//! OpenAPI-driven HTTP client
//!
//! `OpenApiClientFactory` fetches a service's OpenAPI document and derives an
//! `OpenApiClient` whose operations are the document's `operationId`s. Every
//! request carries the fixed base URL and the service's API key header.

pub mod document;

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use url::Url;

use crate::core::{
    ClientFactory, ClientTarget, OperationClient, OperationRequest, OperationResponse, RequestBody,
};
use crate::error::mapping::{parse_body, parse_error_response, status_text};
use crate::error::{Result, ServiceError};
use crate::multipart::build_form;
use document::{parse_operations, server_url, OperationSpec};

/// Header carrying the service's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Default user agent string
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches OpenAPI documents and builds clients from them
#[derive(Debug, Clone)]
pub struct OpenApiClientFactory {
    /// Request timeout
    timeout: Duration,

    /// User agent
    user_agent: String,
}

impl Default for OpenApiClientFactory {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl OpenApiClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build an HTTP client sending `headers` on every request
    pub fn build_http_client(&self, headers: &[(&str, &str)]) -> Result<Client> {
        let mut default_headers = HeaderMap::new();
        for (key, value) in headers {
            let header_name = HeaderName::from_str(key)
                .map_err(|e| ServiceError::configuration(format!("Invalid header name: {}", e)))?;

            let mut header_value = HeaderValue::from_str(value)
                .map_err(|e| ServiceError::configuration(format!("Invalid header value: {}", e)))?;
            header_value.set_sensitive(true);

            default_headers.insert(header_name, header_value);
        }

        Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .default_headers(default_headers)
            .build()
            .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
    }

    /// Fetch the document at `document_url` and build a client.
    ///
    /// Without `base_url`, the document's first server entry is used.
    pub async fn load(
        &self,
        http: Client,
        document_url: &str,
        base_url: Option<&str>,
    ) -> Result<OpenApiClient> {
        debug!("Fetching OpenAPI document {}", document_url);
        let response = http.get(document_url).send().await?;
        if !response.status().is_success() {
            return Err(parse_error_response(response).await);
        }

        let document: Value = response.json().await?;
        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => server_url(&document, document_url)?,
        };

        OpenApiClient::from_document(http, base_url, &document)
    }
}

#[async_trait]
impl ClientFactory for OpenApiClientFactory {
    async fn create(&self, target: &ClientTarget) -> Result<Arc<dyn OperationClient>> {
        let http = self.build_http_client(&[(API_KEY_HEADER, target.api_key.as_str())])?;
        let client = self
            .load(http, &target.document_url, Some(target.base_url.as_str()))
            .await?;
        Ok(Arc::new(client))
    }
}

/// Client for the operations of one OpenAPI document
#[derive(Debug, Clone)]
pub struct OpenApiClient {
    http: Client,
    base_url: String,
    operations: BTreeMap<String, OperationSpec>,
}

impl OpenApiClient {
    pub fn from_document(http: Client, base_url: impl Into<String>, document: &Value) -> Result<Self> {
        Ok(Self {
            http,
            base_url: base_url.into(),
            operations: parse_operations(document)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Expand the operation's path template and append leftover params as query
    fn operation_url(&self, spec: &OperationSpec, params: Option<&Value>) -> Result<Url> {
        let empty = Map::new();
        let params = match params {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => &empty,
            Some(other) => {
                return Err(ServiceError::validation(format!(
                    "params must be an object, got {}",
                    other
                )))
            }
        };

        let mut url = Url::parse(&self.base_url)?;
        let mut used = BTreeSet::new();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ServiceError::configuration(format!("Base URL cannot have a path: {}", self.base_url)))?;
            segments.pop_if_empty();

            for segment in spec.path.split('/').filter(|s| !s.is_empty()) {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => {
                        let value = params.get(name).ok_or_else(|| {
                            ServiceError::validation(format!("Missing path parameter '{}'", name))
                        })?;
                        segments.push(&param_to_string(value));
                        used.insert(name);
                    }
                    None => {
                        segments.push(segment);
                    }
                }
            }
        }

        let query: Vec<(&String, &Value)> = params
            .iter()
            .filter(|(name, value)| !used.contains(name.as_str()) && !value.is_null())
            .collect();
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            pairs.append_pair(name, &param_to_string(item));
                        }
                    }
                    other => {
                        pairs.append_pair(name, &param_to_string(other));
                    }
                }
            }
        }

        Ok(url)
    }
}

fn param_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply per-call `headers` and `timeout` (milliseconds) options
fn apply_config(mut builder: RequestBuilder, config: Option<&Value>, multipart: bool) -> Result<RequestBuilder> {
    let Some(config) = config else {
        return Ok(builder);
    };

    if let Some(headers) = config.get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            // The multipart encoder sets its own boundary-bearing content type.
            if multipart && name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), param_to_string(value));
        }
    }

    if let Some(timeout) = config.get("timeout") {
        let millis = timeout
            .as_u64()
            .ok_or_else(|| ServiceError::validation("config.timeout must be milliseconds"))?;
        builder = builder.timeout(Duration::from_millis(millis));
    }

    Ok(builder)
}

#[async_trait]
impl OperationClient for OpenApiClient {
    fn operations(&self) -> BTreeSet<String> {
        self.operations.keys().cloned().collect()
    }

    fn has_operation(&self, operation_id: &str) -> bool {
        self.operations.contains_key(operation_id)
    }

    async fn invoke(&self, operation_id: &str, request: OperationRequest) -> Result<OperationResponse> {
        let spec = self
            .operations
            .get(operation_id)
            .ok_or_else(|| ServiceError::unknown_operation(self.base_url.as_str(), operation_id))?;

        let url = self.operation_url(spec, request.params.as_ref())?;
        let multipart = matches!(request.body, Some(RequestBody::Multipart { .. }));

        let mut builder = self.http.request(spec.method.clone(), url);
        builder = apply_config(builder, request.config.as_ref(), multipart)?;
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Multipart { fields, file }) => builder.multipart(build_form(fields, file).await?),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(OperationResponse {
            status,
            status_text: status_text(status),
            data: parse_body(&body),
        })
    }
}

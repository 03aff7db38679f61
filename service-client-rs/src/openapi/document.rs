//! OpenAPI document parsing
//!
//! Only what invocation needs is extracted: each operation's HTTP method and
//! path template, plus the document's first server URL.

use std::collections::BTreeMap;

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::{Result, ServiceError};

const METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// Method and path template of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub method: Method,
    pub path: String,
}

/// Map every `operationId` in the document to its method and path
pub fn parse_operations(document: &Value) -> Result<BTreeMap<String, OperationSpec>> {
    let paths = document
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| ServiceError::parsing("OpenAPI document has no 'paths' object"))?;

    let mut operations = BTreeMap::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in METHODS {
            let Some(operation_id) = item
                .get(method)
                .and_then(|op| op.get("operationId"))
                .and_then(Value::as_str)
            else {
                continue;
            };

            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| ServiceError::parsing(format!("Invalid method {}: {}", method, e)))?;
            operations.insert(
                operation_id.to_string(),
                OperationSpec {
                    method,
                    path: path.clone(),
                },
            );
        }
    }

    Ok(operations)
}

/// First `servers` entry, resolved against the document's own URL
pub fn server_url(document: &Value, document_url: &str) -> Result<String> {
    let server = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::configuration("OpenAPI document declares no servers"))?;

    let resolved = Url::parse(document_url)?.join(server)?;
    Ok(resolved.as_str().trim_end_matches('/').to_string())
}

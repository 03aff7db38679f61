//! One-shot calls against an arbitrary OpenAPI document
//!
//! Unlike the invoker, nothing is cached: the document is fetched on every
//! call and the base URL comes from its first `servers` entry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::{OperationClient, OperationRequest, RequestBody};
use crate::error::{Result, ServiceError};
use crate::openapi::OpenApiClientFactory;

/// Header carrying the key for `apiKey` auth
pub const API_KEY_AUTH_HEADER: &str = "apiKey";

/// Authentication applied to a one-shot call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointAuth {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

/// Options of a one-shot call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointOptions {
    /// URL of the OpenAPI document
    pub definition: Option<String>,
    pub operation_id: Option<String>,
    /// Keys of `data` sent as parameters; the rest is the body
    #[serde(default)]
    pub query_params: Vec<String>,
    pub auth: Option<EndpointAuth>,
    pub config: Option<Value>,
}

/// Fetch `options.definition`, invoke `options.operation_id` and return the
/// response body.
pub async fn openapi_endpoint(data: Value, options: EndpointOptions) -> Result<Value> {
    openapi_endpoint_with(&OpenApiClientFactory::new(), data, options).await
}

/// `openapi_endpoint` with an explicit factory
pub async fn openapi_endpoint_with(
    factory: &OpenApiClientFactory,
    data: Value,
    options: EndpointOptions,
) -> Result<Value> {
    let definition = options
        .definition
        .ok_or_else(|| ServiceError::validation("Missing OpenAPI definition"))?;
    let operation_id = options
        .operation_id
        .ok_or_else(|| ServiceError::validation("Missing OpenAPI operationId"))?;

    let mut config = options.config.unwrap_or_else(|| json!({}));
    if let Some(auth) = options.auth {
        apply_auth(&mut config, auth)?;
    }

    let http = factory.build_http_client(&[])?;
    let client = factory.load(http, &definition, None).await?;
    if !client.has_operation(&operation_id) {
        return Err(ServiceError::unknown_operation(definition, operation_id));
    }

    let (params, body) = split_data(data, &options.query_params);
    let response = client
        .invoke(
            &operation_id,
            OperationRequest {
                params,
                body: body.map(RequestBody::Json),
                config: Some(config),
            },
        )
        .await?;

    if response.is_error() {
        log::error!(
            "{} {} failed with {}: {}",
            definition,
            operation_id,
            response.status,
            response.data
        );
        return Err(ServiceError::upstream(
            response.status,
            response.status_text,
            response.data,
        ));
    }

    Ok(response.data)
}

fn apply_auth(config: &mut Value, auth: EndpointAuth) -> Result<()> {
    match auth.kind.as_str() {
        "apiKey" => {
            let api_key = auth
                .config
                .get("apiKey")
                .and_then(Value::as_str)
                .ok_or_else(|| ServiceError::validation("apiKey auth requires config.apiKey"))?;

            let config = config
                .as_object_mut()
                .ok_or_else(|| ServiceError::validation("config must be an object"))?;
            let headers = config
                .entry("headers")
                .or_insert_with(|| Value::Object(Map::new()));
            match headers.as_object_mut() {
                Some(headers) => {
                    headers.insert(API_KEY_AUTH_HEADER.to_string(), Value::String(api_key.to_string()));
                    Ok(())
                }
                None => Err(ServiceError::validation("config.headers must be an object")),
            }
        }
        other => Err(ServiceError::validation(format!(
            "Unsupported OpenAPI auth type '{}'",
            other
        ))),
    }
}

/// Split `data` into (params, body) by the listed keys
fn split_data(data: Value, query_params: &[String]) -> (Option<Value>, Option<Value>) {
    match data {
        Value::Object(fields) => {
            let (params, body): (Map<String, Value>, Map<String, Value>) = fields
                .into_iter()
                .partition(|(key, _)| query_params.iter().any(|param| param == key));
            (Some(Value::Object(params)), Some(Value::Object(body)))
        }
        Value::Null => (None, None),
        other => (None, Some(other)),
    }
}

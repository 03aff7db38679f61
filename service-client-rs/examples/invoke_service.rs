//! Service Invocation Example
//!
//! This example resolves a registered service and invokes one of its
//! operations, printing the response body or the normalized error.
//!
//! To run this example:
//! ```
//! ENV=dev ROOT_DOMAIN=example.com PROD_ENV_TOKEN=prod \
//! SERVICE_REGISTRY='{"merchant":{"apiSubdomain":"api","apiVersion":"v0","openapiPath":"doc/openapi"}}' \
//! cargo run --example invoke_service -- merchant privateGetMerchant '{"merchantId":"m1"}'
//! ```

use service_client::{
    config::EnvConfigProvider, error::Result, ErrorResponse, Invocation, ServiceRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = std::env::args().skip(1);
    let (Some(service_id), Some(operation_id)) = (args.next(), args.next()) else {
        eprintln!("Usage: invoke_service <serviceToken> <operationId> [params-json]");
        std::process::exit(1);
    };
    let params = args.next().map(|raw| serde_json::from_str(&raw)).transpose()?;

    let registry = ServiceRegistry::from_provider(&EnvConfigProvider::new())?;
    let invoker = service_client::from_env(registry)?;

    let mut invocation = Invocation::new(service_id, operation_id);
    invocation.params = params;

    match invoker.invoke(invocation).await {
        Ok(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        Err(err) => {
            let response = ErrorResponse::from(err);
            eprintln!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

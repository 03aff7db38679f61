//! Service registry and deployment name derivation
//!
//! The registry maps service identifiers to static descriptors. Stack names,
//! base URLs and OpenAPI document URLs are pure functions of
//! (identifier, descriptor, environment).

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ConfigProvider, Environment};
use crate::error::{Result, ServiceError};

static SERVICE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid service id pattern"));

/// Static per-service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceDescriptor {
    pub api_subdomain: String,
    pub api_version: String,
    pub openapi_path: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env_map: HashMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(
        api_subdomain: impl Into<String>,
        api_version: impl Into<String>,
        openapi_path: impl Into<String>,
    ) -> Self {
        Self {
            api_subdomain: api_subdomain.into(),
            api_version: api_version.into(),
            openapi_path: openapi_path.into(),
            env_map: HashMap::new(),
        }
    }

    /// Remap an environment name for this service only
    pub fn with_env_alias(mut self, env: impl Into<String>, alias: impl Into<String>) -> Self {
        self.env_map.insert(env.into(), alias.into());
        self
    }

    /// Environment name this service is deployed under
    pub fn effective_env<'a>(&'a self, env: &'a Environment) -> &'a str {
        self.env_map
            .get(&env.current)
            .map(String::as_str)
            .unwrap_or(env.current.as_str())
    }
}

/// Validated mapping from service identifier to descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting identifiers outside `[A-Za-z0-9_-]+`
    pub fn new<I, K>(services: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, ServiceDescriptor)>,
        K: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (id, descriptor) in services {
            let id = id.into();
            validate_service_id(&id)?;
            map.insert(id, descriptor);
        }
        Ok(Self { services: map })
    }

    /// Validate an untyped registry against the closed descriptor shape
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(ServiceError::config_validation(
                "registry must be an object keyed by service identifier",
            ));
        };

        let mut services = Vec::with_capacity(entries.len());
        for (id, raw) in entries {
            validate_service_id(&id)?;
            let descriptor: ServiceDescriptor = serde_json::from_value(raw).map_err(|e| {
                ServiceError::config_validation(format!("service '{}': {}", id, e))
            })?;
            services.push((id, descriptor));
        }
        Self::new(services)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ServiceError::config_validation(format!("registry is not JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Load the registry from the `service_registry` key (JSON)
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        Self::from_json_str(&provider.get_string("service_registry")?)
    }

    /// Look up a descriptor, failing for unregistered identifiers
    pub fn descriptor(&self, service_id: &str) -> Result<&ServiceDescriptor> {
        self.services
            .get(service_id)
            .ok_or_else(|| ServiceError::unknown_service(service_id))
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Deployment stack name, used to look up the service's API key
    pub fn stack_name(&self, service_id: &str, env: &Environment) -> Result<String> {
        let descriptor = self.descriptor(service_id)?;
        Ok(format!(
            "{}-{}-{}-{}",
            descriptor.api_subdomain,
            service_id,
            descriptor.api_version,
            descriptor.effective_env(env)
        ))
    }

    /// Base URL all of the service's operations are relative to
    pub fn base_url(&self, service_id: &str, env: &Environment) -> Result<String> {
        let descriptor = self.descriptor(service_id)?;

        // The env domain already encodes the environment, so no suffix.
        if let Some(env_domain) = &env.env_domain {
            return Ok(format!(
                "https://{}.{}/{}-{}",
                descriptor.api_subdomain, env_domain, service_id, descriptor.api_version
            ));
        }

        let root_domain = env.root_domain.as_deref().ok_or_else(|| {
            ServiceError::configuration("Neither ROOT_DOMAIN nor ENV_DOMAIN is set")
        })?;
        let effective_env = descriptor.effective_env(env);
        let suffix = if env.prod_env_token.as_deref() == Some(effective_env) {
            String::new()
        } else {
            format!("-{}", effective_env)
        };

        Ok(format!(
            "https://{}.{}/{}-{}{}",
            descriptor.api_subdomain, root_domain, service_id, descriptor.api_version, suffix
        ))
    }

    /// URL of the service's OpenAPI document
    pub fn openapi_url(&self, service_id: &str, env: &Environment) -> Result<String> {
        let descriptor = self.descriptor(service_id)?;
        Ok(format!(
            "{}/{}",
            self.base_url(service_id, env)?,
            descriptor.openapi_path
        ))
    }
}

fn validate_service_id(id: &str) -> Result<()> {
    if SERVICE_ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(ServiceError::config_validation(format!(
            "invalid service identifier '{}'",
            id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::from_value(json!({
            "merchant": { "apiSubdomain": "api", "apiVersion": "v0", "openapiPath": "doc/openapi" },
            "user": { "apiSubdomain": "api2", "apiVersion": "v1", "openapiPath": "doc/openapi2" },
            "ledger": {
                "apiSubdomain": "api",
                "apiVersion": "v2",
                "openapiPath": "openapi.json",
                "envMap": { "dev": "test" }
            }
        }))
        .unwrap()
    }

    fn dev() -> Environment {
        Environment::new("dev", "x.com").with_prod_env_token("prod")
    }

    fn prod() -> Environment {
        Environment::new("prod", "x.com").with_prod_env_token("prod")
    }

    #[test]
    fn test_base_url_dev_and_prod() {
        let registry = registry();

        assert_eq!(
            registry.base_url("merchant", &dev()).unwrap(),
            "https://api.x.com/merchant-v0-dev"
        );
        assert_eq!(
            registry.base_url("merchant", &prod()).unwrap(),
            "https://api.x.com/merchant-v0"
        );
        assert_eq!(
            registry.base_url("user", &prod()).unwrap(),
            "https://api2.x.com/user-v1"
        );
    }

    #[test]
    fn test_env_domain_topology_omits_suffix() {
        let env = dev().with_env_domain("dev.x.com");
        assert_eq!(
            registry().base_url("merchant", &env).unwrap(),
            "https://api.dev.x.com/merchant-v0"
        );
    }

    #[test]
    fn test_env_map_applies_to_urls_and_stack_names() {
        let registry = registry();

        assert_eq!(
            registry.base_url("ledger", &dev()).unwrap(),
            "https://api.x.com/ledger-v2-test"
        );
        assert_eq!(registry.stack_name("ledger", &dev()).unwrap(), "api-ledger-v2-test");
    }

    #[test]
    fn test_env_map_can_target_prod() {
        let registry = ServiceRegistry::new([(
            "merchant",
            ServiceDescriptor::new("api", "v0", "doc/openapi").with_env_alias("staging", "prod"),
        )])
        .unwrap();
        let env = Environment::new("staging", "x.com").with_prod_env_token("prod");

        assert_eq!(registry.base_url("merchant", &env).unwrap(), "https://api.x.com/merchant-v0");
        assert_eq!(registry.stack_name("merchant", &env).unwrap(), "api-merchant-v0-prod");
    }

    #[test]
    fn test_openapi_url() {
        let registry = registry();

        assert_eq!(
            registry.openapi_url("merchant", &dev()).unwrap(),
            "https://api.x.com/merchant-v0-dev/doc/openapi"
        );
        assert_eq!(
            registry.openapi_url("user", &prod()).unwrap(),
            "https://api2.x.com/user-v1/doc/openapi2"
        );
    }

    #[test]
    fn test_stack_name() {
        let registry = registry();

        assert_eq!(registry.stack_name("merchant", &dev()).unwrap(), "api-merchant-v0-dev");
        assert_eq!(registry.stack_name("user", &prod()).unwrap(), "api2-user-v1-prod");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let registry = registry();
        let env = dev();

        assert_eq!(
            registry.base_url("merchant", &env).unwrap(),
            registry.base_url("merchant", &env.clone()).unwrap()
        );
        assert_eq!(
            registry.stack_name("user", &env).unwrap(),
            registry.stack_name("user", &env).unwrap()
        );
    }

    #[test]
    fn test_unknown_service() {
        let registry = registry();

        for result in [
            registry.stack_name("nope", &dev()),
            registry.base_url("nope", &dev()),
            registry.openapi_url("nope", &dev()),
        ] {
            assert!(matches!(result, Err(ServiceError::UnknownService(ref id)) if id == "nope"));
        }
    }

    #[test]
    fn test_rejects_invalid_shapes() {
        assert!(matches!(
            ServiceRegistry::from_value(json!(0)),
            Err(ServiceError::ConfigValidation(_))
        ));
        assert!(ServiceRegistry::from_value(json!({
            "merchant": { "apiSubdomain": "api", "apiVersion": "v0", "openapiPath": "doc", "extra": 1 }
        }))
        .is_err());
        assert!(ServiceRegistry::from_value(json!({
            "bad id": { "apiSubdomain": "api", "apiVersion": "v0", "openapiPath": "doc" }
        }))
        .is_err());
        assert!(ServiceRegistry::from_value(json!({
            "merchant": { "apiSubdomain": "api", "apiVersion": 0, "openapiPath": "doc" }
        }))
        .is_err());
        assert!(ServiceRegistry::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_empty_registry_is_valid() {
        let registry = ServiceRegistry::from_value(json!({})).unwrap();
        assert!(registry.is_empty());
    }
}

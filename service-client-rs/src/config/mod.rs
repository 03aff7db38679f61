//! Configuration management for the service client layer
//!
//! This module provides utilities for loading configuration from environment
//! variables or in-memory maps, and the `Environment` context that URL and
//! stack-name derivation reads on every build.

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::path::PathBuf;

use crate::error::{Result, ServiceError};

/// Directory multipart file references are resolved against when unset
pub const DEFAULT_TASK_FILE_ROOT: &str = "/tmp";

/// Multipart file root (`TASK_FILE_ROOT`), defaulting to `/tmp`
pub fn task_file_root<P: ConfigProvider + ?Sized>(provider: &P) -> PathBuf {
    PathBuf::from(provider.get_string_or("task_file_root", DEFAULT_TASK_FILE_ROOT))
}

/// Base trait for configuration providers
pub trait ConfigProvider: Debug + Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a string value, treating empty strings as unset
    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get_string(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value.trim().parse::<i64>().map_err(|e| {
            ServiceError::configuration(format!("Invalid integer for key {}: {}", key, e))
        })
    }

    /// Get a float configuration value
    fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_string(key)?;
        value.trim().parse::<f64>().map_err(|e| {
            ServiceError::configuration(format!("Invalid float for key {}: {}", key, e))
        })
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ServiceError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_non_empty(key).unwrap_or_else(|| default.to_string())
    }

    /// Get an integer configuration value with a default
    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a float configuration value with a default
    fn get_float_or(&self, key: &str, default: f64) -> f64 {
        self.get_float(key).unwrap_or(default)
    }

    /// Get a boolean configuration value with a default
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        // Uppercase and replace non-alphanumeric with underscores
        env_key.push_str(
            &key.to_uppercase()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        );

        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => ServiceError::configuration(format!(
                "Environment variable not set: {}",
                env_key
            )),
            env::VarError::NotUnicode(_) => ServiceError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    /// Configuration values
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }

    /// Remove a configuration value
    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ServiceError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// Deployment context read at resolution time.
///
/// Never cached by the resolver layer: the cache loads a fresh value from its
/// provider before every build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Current environment name (`ENV`)
    pub current: String,

    /// Root domain shared by all environments (`ROOT_DOMAIN`)
    pub root_domain: Option<String>,

    /// Domain that already encodes the environment (`ENV_DOMAIN`)
    pub env_domain: Option<String>,

    /// Environment name that maps to unsuffixed URLs (`PROD_ENV_TOKEN`)
    pub prod_env_token: Option<String>,

    /// AWS region for key-store lookups (`AWS_DEFAULT_REGION`)
    pub region: Option<String>,
}

impl Environment {
    /// Create an environment using the root-domain topology
    pub fn new(current: impl Into<String>, root_domain: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            root_domain: Some(root_domain.into()),
            env_domain: None,
            prod_env_token: None,
            region: None,
        }
    }

    pub fn with_env_domain(mut self, env_domain: impl Into<String>) -> Self {
        self.env_domain = Some(env_domain.into());
        self
    }

    pub fn with_prod_env_token(mut self, token: impl Into<String>) -> Self {
        self.prod_env_token = Some(token.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Load the environment from a config provider.
    ///
    /// Fails when `ENV` is unset, or when neither `ROOT_DOMAIN` nor
    /// `ENV_DOMAIN` is available.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let current = provider
            .get_non_empty("env")
            .ok_or_else(|| ServiceError::configuration("Environment name (ENV) is not set"))?;
        let root_domain = provider.get_non_empty("root_domain");
        let env_domain = provider.get_non_empty("env_domain");

        if root_domain.is_none() && env_domain.is_none() {
            return Err(ServiceError::configuration(
                "Neither ROOT_DOMAIN nor ENV_DOMAIN is set",
            ));
        }

        Ok(Self {
            current,
            root_domain,
            env_domain,
            prod_env_token: provider.get_non_empty("prod_env_token"),
            region: provider.get_non_empty("aws_default_region"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(pairs: &[(&str, &str)]) -> MemoryConfigProvider {
        let mut provider = MemoryConfigProvider::new();
        for (k, v) in pairs {
            provider.set(*k, *v);
        }
        provider
    }

    #[test]
    fn test_memory_config_provider() {
        let provider = provider(&[("key1", "value1"), ("key2", "123"), ("flag", "yes")]);

        assert_eq!(provider.get_string("key1").unwrap(), "value1");
        assert_eq!(provider.get_int("key2").unwrap(), 123);
        assert!(provider.get_bool("flag").unwrap());
        assert!(provider.get_string("key3").is_err());
        assert_eq!(provider.get_int_or("key1", 7), 7);
    }

    #[test]
    fn test_env_config_provider_key_format() {
        let provider = EnvConfigProvider::new();
        assert_eq!(provider.format_key("root_domain"), "ROOT_DOMAIN");

        let provider = EnvConfigProvider::new().with_prefix("TEST");
        assert_eq!(provider.format_key("retry-max-retries"), "TEST_RETRY_MAX_RETRIES");
    }

    #[test]
    fn test_environment_from_provider() {
        let provider = provider(&[
            ("env", "dev"),
            ("root_domain", "x.com"),
            ("prod_env_token", "prod"),
            ("aws_default_region", "us-east-1"),
        ]);

        let env = Environment::from_provider(&provider).unwrap();
        assert_eq!(
            env,
            Environment::new("dev", "x.com")
                .with_prod_env_token("prod")
                .with_region("us-east-1")
        );
    }

    #[test]
    fn test_environment_requires_name_and_domain() {
        let missing_env = provider(&[("root_domain", "x.com")]);
        assert!(Environment::from_provider(&missing_env).is_err());

        let blank_env = provider(&[("env", " "), ("root_domain", "x.com")]);
        assert!(Environment::from_provider(&blank_env).is_err());

        let missing_domain = provider(&[("env", "dev")]);
        assert!(Environment::from_provider(&missing_domain).is_err());

        let env_domain_only = provider(&[("env", "dev"), ("env_domain", "dev.x.com")]);
        let env = Environment::from_provider(&env_domain_only).unwrap();
        assert_eq!(env.env_domain.as_deref(), Some("dev.x.com"));
        assert_eq!(env.root_domain, None);
    }

    #[test]
    fn test_task_file_root_defaults_to_tmp() {
        assert_eq!(task_file_root(&provider(&[])), PathBuf::from("/tmp"));
        assert_eq!(
            task_file_root(&provider(&[("task_file_root", "/var/task/files")])),
            PathBuf::from("/var/task/files")
        );
    }
}

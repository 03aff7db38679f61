//! Retry with exponential backoff for recoverable errors
//!
//! This module provides a retry mechanism with configurable exponential backoff
//! for handling transient failures when building service clients.

use std::fmt;
use std::future::Future;
use std::marker::{Send, Sync};
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};

use crate::config::{ConfigProvider, ConfigProviderExt};
use crate::error::{Result, ServiceError};
use crate::util::parse_duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries)
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_interval: Duration,

    /// Maximum backoff duration
    pub max_interval: Duration,

    /// Multiplier for backoff between retries
    pub multiplier: f64,

    /// Jitter applied to each backoff interval
    pub randomization_factor: f64,

    /// Maximum total time to spend retrying
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            randomization_factor: 0.2,
            max_elapsed_time: Some(Duration::from_secs(30)),
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RetryConfig {{ max_retries: {}, initial_interval: {:?}, max_interval: {:?}, multiplier: {}, randomization_factor: {}, max_elapsed_time: {:?} }}",
            self.max_retries,
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            self.randomization_factor,
            self.max_elapsed_time
        )
    }
}

impl RetryConfig {
    /// No retries at all, used where a single attempt is wanted
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Load retry settings from a config provider, keeping defaults for unset keys
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();

        let duration = |key: &str, default: Duration| -> Result<Duration> {
            match provider.get_non_empty(key) {
                Some(raw) => parse_duration(&raw).ok_or_else(|| {
                    ServiceError::configuration(format!("Invalid duration for key {}: {}", key, raw))
                }),
                None => Ok(default),
            }
        };

        let max_retries = provider.get_int_or("retry_max_retries", defaults.max_retries as i64);
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            ServiceError::configuration(format!("Invalid retry_max_retries: {}", max_retries))
        })?;

        let max_elapsed_time = match provider.get_non_empty("retry_max_elapsed_time") {
            Some(raw) if raw.eq_ignore_ascii_case("none") => None,
            Some(_) => Some(duration("retry_max_elapsed_time", Duration::ZERO)?),
            None => defaults.max_elapsed_time,
        };

        let config = Self {
            max_retries,
            initial_interval: duration("retry_initial_interval", defaults.initial_interval)?,
            max_interval: duration("retry_max_interval", defaults.max_interval)?,
            multiplier: provider.get_float_or("retry_multiplier", defaults.multiplier),
            randomization_factor: provider
                .get_float_or("retry_randomization_factor", defaults.randomization_factor),
            max_elapsed_time,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the backoff cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.multiplier < 1.0 {
            return Err(ServiceError::configuration("Retry multiplier must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(ServiceError::configuration(
                "Retry randomization factor must be between 0.0 and 1.0",
            ));
        }
        if self.initial_interval > self.max_interval {
            return Err(ServiceError::configuration(
                "Retry initial interval exceeds max interval",
            ));
        }
        Ok(())
    }
}

/// Executor for retry operations with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    /// Retry configuration
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with the specified configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute a fallible operation with retries according to the configuration
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            multiplier: self.config.multiplier,
            randomization_factor: self.config.randomization_factor,
            max_elapsed_time: self.config.max_elapsed_time,
            ..ExponentialBackoff::default()
        };
        backoff.reset();

        let mut attempts = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err) && attempts < self.config.max_retries => {
                    match backoff.next_backoff() {
                        Some(backoff_duration) => {
                            log::warn!(
                                "Operation failed with retryable error, retrying in {:?} (attempt {}/{}): {}",
                                backoff_duration,
                                attempts + 1,
                                self.config.max_retries,
                                err
                            );

                            tokio::time::sleep(backoff_duration).await;
                            attempts += 1;
                        }
                        // Max elapsed time exceeded
                        None => return Err(err.with_context_value("attempts", attempts + 1)),
                    }
                }
                Err(err) if attempts > 0 => {
                    return Err(err.with_context_value("attempts", attempts + 1));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Determine if an error should be retried
    fn should_retry(&self, error: &ServiceError) -> bool {
        error.is_retryable()
    }
}

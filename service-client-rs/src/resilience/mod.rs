//! Resilience patterns for client construction
//!
//! Client construction fetches a remote OpenAPI document through API Gateway,
//! which fails transiently. This module provides retry with exponential backoff
//! and jitter around that step.

mod retry;

pub use retry::{RetryConfig, RetryExecutor};

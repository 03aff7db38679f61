//! Scenario tests for the service client layer
//!
//! Unit tests live next to their modules; these exercise the cache, the
//! invoker and the HTTP stack together.

mod support;

pub mod cache_tests;

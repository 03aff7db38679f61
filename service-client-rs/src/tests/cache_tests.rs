//! Tests for the client cache
//!
//! These tests verify build-once semantics, fallback policies, stub entries
//! and cache lifecycle operations.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::future::join_all;
    use serde_json::json;

    use crate::cache::{CacheEntry, FallbackPolicy};
    use crate::credentials::MockCredentialStore;
    use crate::error::ServiceError;
    use crate::tests::support::{
        cache, cache_with_store, fast_retry, registry, RecordingClient, SharedConfig, StubFactory,
    };

    fn live_factory() -> Arc<StubFactory> {
        StubFactory::serving(Arc::new(RecordingClient::new(
            &["privateGetMerchant"],
            200,
            json!({}),
        )))
    }

    #[tokio::test]
    async fn test_concurrent_first_use_builds_once() {
        let factory = live_factory();
        let cache = cache(factory.clone(), Arc::new(SharedConfig::deployed()), FallbackPolicy::Sticky);
        let registry = registry();

        let entries = join_all((0..10).map(|_| cache.resolve("merchant", &registry))).await;

        assert!(entries.into_iter().all(|entry| entry.unwrap().is_live()));
        assert_eq!(factory.calls(), 1);

        for _ in 0..5 {
            assert!(cache.resolve("merchant", &registry).await.unwrap().is_live());
        }
        assert_eq!(factory.calls(), 1);
    }

    #[tokio::test]
    async fn test_build_target_follows_environment() {
        let factory = live_factory();
        let cache = cache(factory.clone(), Arc::new(SharedConfig::deployed()), FallbackPolicy::Sticky);

        cache.resolve("merchant", &registry()).await.unwrap();

        let target = &factory.targets()[0];
        assert_eq!(target.base_url, "https://api.x.com/merchant-v0-dev");
        assert_eq!(target.document_url, "https://api.x.com/merchant-v0-dev/doc/openapi");
        assert_eq!(target.api_key, "key-for-api-merchant-v0-dev");
    }

    #[tokio::test]
    async fn test_sticky_fallback_never_rebuilds() {
        let factory = StubFactory::failing();
        let cache = cache(factory.clone(), Arc::new(SharedConfig::deployed()), FallbackPolicy::Sticky);
        let registry = registry();

        for _ in 0..3 {
            let entry = cache.resolve("merchant", &registry).await.unwrap();
            assert!(matches!(entry, CacheEntry::Fallback(ref d) if d.api_version == "v0"));
        }
        assert_eq!(factory.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_on_miss_rebuilds_fallback() {
        let factory = StubFactory::failing();
        let cache = cache(
            factory.clone(),
            Arc::new(SharedConfig::deployed()),
            FallbackPolicy::RetryOnMiss,
        );
        let registry = registry();

        cache.resolve("merchant", &registry).await.unwrap();
        cache.resolve("merchant", &registry).await.unwrap();
        assert_eq!(factory.calls(), 2);
    }

    #[tokio::test]
    async fn test_stub_until_environment_is_available() {
        let factory = live_factory();
        let config = Arc::new(SharedConfig::default());
        let cache = cache(factory.clone(), config.clone(), FallbackPolicy::Sticky);
        let registry = registry();

        let entry = cache.resolve("merchant", &registry).await.unwrap();
        assert!(matches!(entry, CacheEntry::Stub));
        assert_eq!(factory.calls(), 0);

        config.set("env", "dev");
        config.set("env_domain", "dev.x.com");

        assert!(cache.resolve("merchant", &registry).await.unwrap().is_live());
        assert_eq!(factory.calls(), 1);
        assert_eq!(factory.targets()[0].base_url, "https://api.dev.x.com/merchant-v0");
    }

    #[tokio::test]
    async fn test_unknown_service_ignores_cache() {
        let factory = live_factory();
        let cache = cache(factory.clone(), Arc::new(SharedConfig::deployed()), FallbackPolicy::Sticky);
        let registry = registry();

        cache.resolve("merchant", &registry).await.unwrap();

        let err = cache.resolve("payments", &registry).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnknownService(ref id) if id == "payments"));
        assert_eq!(factory.calls(), 1);
        assert!(cache.get("payments").is_none());
    }

    #[tokio::test]
    async fn test_clear_drops_live_entries() {
        let factory = live_factory();
        let cache = cache(factory.clone(), Arc::new(SharedConfig::deployed()), FallbackPolicy::Sticky);
        let registry = registry();

        cache.resolve("merchant", &registry).await.unwrap();
        assert!(cache.get("merchant").unwrap().is_live());

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("merchant").is_none());

        cache.resolve("merchant", &registry).await.unwrap();
        assert_eq!(factory.calls(), 2);
    }

    #[tokio::test]
    async fn test_reinit_resolves_every_service() {
        let factory = live_factory();
        let config = SharedConfig::deployed();
        config.set("env", "test");
        let cache = cache(factory.clone(), Arc::new(config), FallbackPolicy::Sticky);
        let registry = registry();

        let entries = cache.reinit(&registry).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries.values().all(CacheEntry::is_live));
        assert_eq!(cache.len(), 2);
        assert_eq!(factory.calls(), 2);

        let mut stacks: Vec<String> = factory
            .targets()
            .into_iter()
            .map(|target| target.base_url)
            .collect();
        stacks.sort();
        assert_eq!(
            stacks,
            vec![
                "https://api.x.com/merchant-v0-test".to_string(),
                "https://api.x.com/user-v1-dev".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_key_store_failure_is_retried() {
        let key_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&key_calls);
        let mut store = MockCredentialStore::new();
        store.expect_find_api_key().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ServiceError::key_store("Throttling: Rate exceeded"))
            } else {
                Ok(Some("k".to_string()))
            }
        });

        let factory = live_factory();
        let cache = cache_with_store(Arc::new(store), factory.clone(), fast_retry(3));

        let entry = cache.resolve("merchant", &registry()).await.unwrap();

        assert!(entry.is_live());
        assert_eq!(key_calls.load(Ordering::SeqCst), 2);
        assert_eq!(factory.calls(), 1);
        assert_eq!(factory.targets()[0].api_key, "k");
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_retry() {
        let key_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&key_calls);
        let mut store = MockCredentialStore::new();
        store.expect_find_api_key().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });

        let factory = live_factory();
        let cache = cache_with_store(Arc::new(store), factory.clone(), fast_retry(3));

        let entry = cache.resolve("merchant", &registry()).await.unwrap();

        assert!(matches!(entry, CacheEntry::Fallback(_)));
        assert_eq!(key_calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.calls(), 0);
    }
}

use crate::types::FetchedPage;
use async_trait::async_trait;
use moka::Expiry;
use std::time::{Duration, Instant};

/// Keyed page cache. The key format is `"<scope>:md5(url)"`; the on-disk
/// backing store is an externalized concern (see `MokaPageCache` for the
/// in-memory reference implementation this crate ships).
#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<FetchedPage>;
    async fn set(&self, key: &str, page: FetchedPage, ttl: Duration);
}

/// Build the `"<scope>:md5(url)"` cache key used by every reader.
pub fn cache_key(scope: &str, url: &str) -> String {
    format!("{}:{:x}", scope, md5_like(url))
}

/// A small non-cryptographic hash stands in for `md5(url)` in the key
/// format — the cache only needs a stable, collision-unlikely digest, not
/// an actual MD5 implementation.
fn md5_like(s: &str) -> u128 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut h1 = DefaultHasher::new();
    s.hash(&mut h1);
    let lo = h1.finish();
    let mut h2 = DefaultHasher::new();
    (s, "salt").hash(&mut h2);
    let hi = h2.finish();
    ((hi as u128) << 64) | (lo as u128)
}

/// Per-entry expiry policy: each entry carries its own TTL (set by the
/// caller at `set` time), rather than one cache-wide policy. Required
/// because readers hand in different TTLs per scope (html vs. browser vs.
/// pdf) through the same cache instance.
struct PerEntryTtl;

impl Expiry<String, (FetchedPage, Duration)> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &(FetchedPage, Duration),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.1)
    }
}

/// Process-wide, TTL-bound, concurrency-safe reference implementation of
/// `PageCache`, built on `moka::future::Cache` the same way the teacher's
/// `AppState` wires its `search_cache`/`scrape_cache` fields.
#[derive(Clone)]
pub struct MokaPageCache {
    inner: moka::future::Cache<String, (FetchedPage, Duration)>,
}

impl MokaPageCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: moka::future::Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Default for MokaPageCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl PageCache for MokaPageCache {
    async fn get(&self, key: &str) -> Option<FetchedPage> {
        self.inner.get(key).await.map(|(page, _)| page)
    }

    async fn set(&self, key: &str, page: FetchedPage, ttl: Duration) {
        self.inner.insert(key.to_string(), (page, ttl)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_roundtrips_a_page() {
        let cache = MokaPageCache::default();
        let key = cache_key("html", "http://example.com");
        let page = FetchedPage {
            url: "http://example.com".to_string(),
            final_url: None,
            status_code: Some(200),
            retrieved_at: chrono::Utc::now(),
            title: Some("Example".to_string()),
            text_plain: Some("hello world".to_string()),
            text_markdown: None,
            error: None,
            metadata: Default::default(),
        };
        cache.set(&key, page.clone(), Duration::from_secs(60)).await;
        let fetched = cache.get(&key).await.expect("cache hit");
        assert_eq!(fetched.url, page.url);
    }

    #[tokio::test]
    async fn entry_expires_after_its_own_ttl() {
        let cache = MokaPageCache::default();
        let key = cache_key("html", "http://example.com");
        let page = FetchedPage {
            url: "http://example.com".to_string(),
            final_url: None,
            status_code: Some(200),
            retrieved_at: chrono::Utc::now(),
            title: None,
            text_plain: Some("hello world".to_string()),
            text_markdown: None,
            error: None,
            metadata: Default::default(),
        };
        cache.set(&key, page, Duration::from_millis(20)).await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[test]
    fn cache_key_is_stable() {
        let a = cache_key("html", "http://example.com");
        let b = cache_key("html", "http://example.com");
        assert_eq!(a, b);
        assert_ne!(a, cache_key("pdf", "http://example.com"));
    }
}

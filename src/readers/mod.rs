//! Page fetching and content extraction.
//!
//! Every reader implements [`Reader`] and shares the same caching contract:
//! callers look the page up in a [`crate::cache::PageCache`] under
//! `cache_key(scope, url)` before fetching, and write a successful fetch
//! back under the same key. Per-reader concurrency is bounded by a
//! `tokio::sync::Semaphore` sized from `Config::concurrency`, mirroring the
//! teacher's per-tool semaphores in `AppState`.

pub mod browser;
pub mod html;
pub mod pdf;

use crate::cache::{cache_key, PageCache};
use crate::types::FetchedPage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use browser::BrowserReader;
pub use html::HtmlReader;
pub use pdf::PdfReader;

/// A single fetch-and-extract backend. `scope` names the cache partition
/// (`"html"`, `"pdf"`, `"browser"`) so the same URL fetched by different
/// readers never collides in the shared cache.
#[async_trait]
pub trait Reader: Send + Sync {
    fn scope(&self) -> &'static str;

    async fn fetch_one(&self, url: &str) -> FetchedPage;

    /// Fetch many URLs concurrently, respecting the reader's own
    /// concurrency limit. Cache lookups/writes happen per URL inside
    /// `fetch_one`'s implementation, not here.
    async fn read_many(&self, urls: &[String]) -> Vec<FetchedPage> {
        use futures::stream::{self, StreamExt};
        stream::iter(urls.iter().cloned())
            .map(|url| async move { self.fetch_one(&url).await })
            .buffer_unordered(8)
            .collect()
            .await
    }
}

/// Shared cache-or-fetch helper every concrete reader calls from
/// `fetch_one`: a cache hit on a non-errored page short-circuits the
/// network call entirely.
pub(crate) async fn cached_or_fetch<F, Fut>(
    cache: &Arc<dyn PageCache>,
    scope: &str,
    url: &str,
    ttl: Duration,
    fetch: F,
) -> FetchedPage
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = FetchedPage>,
{
    let key = cache_key(scope, url);
    if let Some(cached) = cache.get(&key).await {
        if cached.error.is_none() {
            return cached;
        }
    }

    let page = fetch().await;
    if page.error.is_none() {
        cache.set(&key, page.clone(), ttl).await;
    }
    page
}

/// Build the reader named by `Config::reader_type`, wiring in the shared
/// cache and antibot stack. The crawler and pipeline both resolve their
/// primary reader through this factory rather than constructing readers
/// directly.
pub fn build_reader(
    kind: crate::config::ReaderKind,
    client: reqwest::Client,
    cache: Arc<dyn PageCache>,
    timeout: Duration,
) -> Arc<dyn Reader> {
    match kind {
        crate::config::ReaderKind::Html => Arc::new(HtmlReader::new(client, cache, timeout)),
        crate::config::ReaderKind::Browser => Arc::new(BrowserReader::new(cache, timeout)),
    }
}

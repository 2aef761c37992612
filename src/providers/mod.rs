pub mod composite;
pub mod meta_search;
pub mod web_search;

use crate::error::ProviderError;
use crate::types::SearchResult;
use async_trait::async_trait;

/// A single search backend. Implementations must not raise on a single
/// sub-query failure — log and return partial results instead; a full
/// `ProviderError` return is reserved for cases where the whole call
/// should be treated as a soft failure by the composite engine.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Human-readable name used to tag `SearchResult::source_engine` and in
    /// logs.
    fn name(&self) -> &'static str;

    /// Search across one or more sub-queries. Per-sub-query calls run
    /// concurrently; results are deduplicated by URL, preserving provider
    /// rank order.
    async fn search(&self, sub_queries: &[String]) -> Result<Vec<SearchResult>, ProviderError>;
}

/// Exponential backoff with jitter, bounded by `max_retries`, shared by
/// every provider's per-sub-query fetch.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    use backoff::backoff::Backoff;

    let mut backoff = backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(std::time::Duration::from_millis(200))
        .with_max_interval(std::time::Duration::from_secs(4))
        .with_max_elapsed_time(Some(std::time::Duration::from_secs(20)))
        .build();

    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(ProviderError::Blocked { reason }) => {
                // Blocked is not retried — retrying against the same
                // fingerprint just burns the budget for no gain.
                return Err(ProviderError::Blocked { reason });
            }
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(e);
                }
                match backoff.next_backoff() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(e),
                }
            }
        }
    }
}

pub fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = std::collections::HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

/// Heuristic block detection shared by every HTML-scraping provider: a
/// handful of status codes are unambiguous, everything else comes from
/// sniffing the body for CAPTCHA/rate-limit language.
pub(crate) fn detect_block_reason(status: reqwest::StatusCode, body: &str) -> Option<String> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Some("http_429".to_string());
    }
    if status == reqwest::StatusCode::FORBIDDEN {
        return Some("http_403".to_string());
    }
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return Some("http_503".to_string());
    }

    let lower = body.to_lowercase();
    let needles = [
        ("unusual traffic", "unusual_traffic"),
        ("captcha", "captcha"),
        ("recaptcha", "captcha"),
        ("verify you are human", "captcha"),
        ("enable javascript", "js_required"),
        ("access denied", "access_denied"),
    ];
    for (needle, label) in needles {
        if lower.contains(needle) {
            return Some(label.to_string());
        }
    }
    if body.len() < 3500 && (lower.contains("captcha") || lower.contains("blocked")) {
        return Some("block_page".to_string());
    }
    None
}

/// Fetch a SERP URL using a browser-impersonating client (randomized UA
/// plus stealth header set). Returns the block reason (if any) alongside
/// the body so the caller can decide whether to treat an HTTP success with
/// block-page content as `ProviderError::Blocked`.
pub(crate) async fn fetch_serp_html(
    client: &reqwest::Client,
    url: reqwest::Url,
) -> Result<(reqwest::StatusCode, String), ProviderError> {
    let user_agent = crate::antibot::get_random_user_agent();
    let mut req = client.get(url).header("User-Agent", user_agent);
    for (k, v) in crate::antibot::get_stealth_headers() {
        req = req.header(k, v);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| ProviderError::Transient(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| ProviderError::Transient(e.to_string()))?;

    if let Some(reason) = detect_block_reason(status, &body) {
        return Err(ProviderError::Blocked { reason });
    }
    if !status.is_success() {
        return Err(ProviderError::Transient(format!("http {}", status)));
    }

    Ok((status, body))
}

//! A public web search engine provider, scraped directly (no official API).
//! Grounded on the teacher's DuckDuckGo engine: parse the static HTML
//! result list, normalize the redirect links, and let the shared
//! block-detection/backoff machinery in `providers::mod` handle the rest.

use crate::error::ProviderError;
use crate::providers::{dedup_by_url, fetch_serp_html, retry_with_backoff, SearchProvider};
use crate::types::SearchResult;
use async_trait::async_trait;
use futures::future::join_all;
use scraper::{Html, Selector};

pub struct WebSearchProvider {
    client: reqwest::Client,
    max_retries: u32,
}

impl WebSearchProvider {
    pub fn new(client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    fn normalize_href(href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }

        let candidate = if let Some(rest) = href.strip_prefix("//") {
            format!("https://{}", rest)
        } else if let Some(rest) = href.strip_prefix('/') {
            format!("https://duckduckgo.com/{}", rest)
        } else {
            href.to_string()
        };

        if let Ok(url) = url::Url::parse(&candidate) {
            if matches!(url.host_str(), Some("duckduckgo.com")) && url.path().starts_with("/l/") {
                for (k, v) in url.query_pairs() {
                    if k == "uddg" && !v.trim().is_empty() {
                        return Some(v.to_string());
                    }
                }
            }
        }

        if candidate.starts_with("http://") || candidate.starts_with("https://") {
            return Some(candidate);
        }
        None
    }

    fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
        let doc = Html::parse_document(html);
        let sel_item = Selector::parse("div.results_links").expect("static selector");
        let sel_link = Selector::parse("a.result__a").expect("static selector");
        let sel_snip =
            Selector::parse("a.result__snippet, div.result__snippet").expect("static selector");

        let mut out = Vec::new();
        for (rank, item) in doc.select(&sel_item).enumerate() {
            if out.len() >= max_results {
                break;
            }
            let Some(link) = item.select(&sel_link).next() else {
                continue;
            };
            let href_raw = link.value().attr("href").unwrap_or("");
            let Some(url) = Self::normalize_href(href_raw) else {
                continue;
            };
            let title = link.text().collect::<Vec<_>>().join(" ");
            let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

            let snippet = item
                .select(&sel_snip)
                .next()
                .map(|n| n.text().collect::<Vec<_>>().join(" "))
                .unwrap_or_default();
            let snippet = snippet.split_whitespace().collect::<Vec<_>>().join(" ");

            out.push(SearchResult {
                title,
                url,
                snippet,
                source_engine: "web_search".to_string(),
                rank: Some(rank),
            });
        }
        out
    }

    async fn search_one(&self, query: &str) -> Vec<SearchResult> {
        let result = retry_with_backoff(self.max_retries, || async {
            let mut url = reqwest::Url::parse("https://duckduckgo.com/html/")
                .map_err(|e| ProviderError::Fatal(e.to_string()))?;
            url.query_pairs_mut().append_pair("q", query);
            let (_status, body) = fetch_serp_html(&self.client, url).await?;
            Ok(Self::parse_results(&body, 10))
        })
        .await;

        match result {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("web_search provider failed for '{}': {}", query, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SearchProvider for WebSearchProvider {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn search(&self, sub_queries: &[String]) -> Result<Vec<SearchResult>, ProviderError> {
        let futs = sub_queries.iter().map(|q| self.search_one(q));
        let batches = join_all(futs).await;
        Ok(dedup_by_url(batches.into_iter().flatten().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_href_unwraps_redirect_link() {
        let href = "/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        let normalized = WebSearchProvider::normalize_href(href);
        assert_eq!(normalized.as_deref(), Some("https://example.com/page"));
    }

    #[test]
    fn normalize_href_rejects_javascript_links() {
        assert_eq!(WebSearchProvider::normalize_href("javascript:void(0)"), None);
    }

    #[test]
    fn parse_results_extracts_title_and_url() {
        let html = r#"
            <div class="results_links">
                <a class="result__a" href="https://example.com/a">Example A</a>
                <a class="result__snippet">First result snippet</a>
            </div>
        "#;
        let results = WebSearchProvider::parse_results(html, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a");
        assert_eq!(results[0].title, "Example A");
    }
}

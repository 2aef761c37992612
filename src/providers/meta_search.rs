//! A locally hosted meta-search engine provider (e.g. a SearXNG instance),
//! talked to over its HTML result endpoint the same way the web-search
//! provider talks to a public search engine — same block-detection and
//! retry plumbing, different selectors and base URL.

use crate::error::ProviderError;
use crate::providers::{dedup_by_url, fetch_serp_html, retry_with_backoff, SearchProvider};
use crate::types::SearchResult;
use async_trait::async_trait;
use futures::future::join_all;
use scraper::{Html, Selector};

pub struct MetaSearchProvider {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl MetaSearchProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            max_retries,
        }
    }

    fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
        let doc = Html::parse_document(html);
        let sel_item = Selector::parse("article.result, div.result").expect("static selector");
        let sel_link = Selector::parse("a").expect("static selector");
        let sel_snip = Selector::parse("p.content, p.result-content").expect("static selector");

        let mut out = Vec::new();
        for (rank, item) in doc.select(&sel_item).enumerate() {
            if out.len() >= max_results {
                break;
            }
            let Some(link) = item.select(&sel_link).next() else {
                continue;
            };
            let href = link.value().attr("href").unwrap_or("").trim();
            if !href.starts_with("http://") && !href.starts_with("https://") {
                continue;
            }
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
                url: href.to_string(),
                snippet,
                source_engine: "meta_search".to_string(),
                rank: Some(rank),
            });
        }
        out
    }

    async fn search_one(&self, query: &str) -> Vec<SearchResult> {
        let result = retry_with_backoff(self.max_retries, || async {
            let mut url = reqwest::Url::parse(&self.base_url)
                .map_err(|e| ProviderError::Fatal(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("q", query)
                .append_pair("format", "html");
            let (_status, body) = fetch_serp_html(&self.client, url).await?;
            Ok(Self::parse_results(&body, 10))
        })
        .await;

        match result {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("meta_search provider failed for '{}': {}", query, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SearchProvider for MetaSearchProvider {
    fn name(&self) -> &'static str {
        "meta_search"
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
    fn parse_results_extracts_article_result() {
        let html = r#"
            <article class="result">
                <a href="https://example.com/a">Example A</a>
                <p class="content">Snippet text about A</p>
            </article>
        "#;
        let results = MetaSearchProvider::parse_results(html, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/a");
        assert_eq!(results[0].source_engine, "meta_search");
    }

    #[test]
    fn parse_results_skips_non_http_links() {
        let html = r#"
            <div class="result">
                <a href="/about">About</a>
            </div>
        "#;
        let results = MetaSearchProvider::parse_results(html, 10);
        assert!(results.is_empty());
    }
}

//! The single-round research pipeline: plan, search, fetch, extract,
//! refine. Grounded on `core/pipeline.py`'s `AsyncPipeline.run`.

use crate::config::{Config, Mode, ReaderKind};
use crate::crawler::NeuralCrawler;
use crate::planner::Planner;
use crate::providers::composite::CompositeEngine;
use crate::providers::meta_search::MetaSearchProvider;
use crate::providers::web_search::WebSearchProvider;
use crate::providers::SearchProvider;
use crate::readers::browser::BrowserReader;
use crate::readers::pdf::{looks_like_pdf_url, PdfReader};
use crate::readers::{build_reader, Reader};
use crate::refiners::{build_refiner, Refiner};
use crate::security::SecurityGuard;
use crate::types::{FetchedPage, PipelineOutput, Query, SearchResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// The per-round handoff between `ResearchLoop` rounds: domains the
/// previous round found blocked, so the planner can steer away from them
/// and the security guard can reject them outright.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub blocked_domains: Vec<String>,
}

pub struct Pipeline {
    config: Config,
    cache: Arc<dyn crate::cache::PageCache>,
    search_engine: CompositeEngine,
    reader: Arc<dyn Reader>,
    pdf_reader: PdfReader,
    crawler: Option<NeuralCrawler>,
    refiner: Box<dyn Refiner>,
    security: SecurityGuard,
    planner: Planner,
    stealth_reader: OnceCell<Arc<BrowserReader>>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        client: reqwest::Client,
        cache: Arc<dyn crate::cache::PageCache>,
        llm: crate::config::LlmFileConfig,
    ) -> Self {
        let mut providers: Vec<Box<dyn SearchProvider>> = Vec::new();
        if let Ok(base_url) = std::env::var("ANSWER_SCOUT_SEARXNG_URL") {
            if !base_url.trim().is_empty() {
                providers.push(Box::new(MetaSearchProvider::new(
                    client.clone(),
                    base_url,
                    config.max_retries,
                )));
            }
        }
        providers.push(Box::new(WebSearchProvider::new(
            client.clone(),
            config.max_retries,
        )));
        let search_engine =
            CompositeEngine::new(providers).expect("at least one provider is always registered");

        let reader = build_reader(config.reader_type, client.clone(), cache.clone(), config.reader_timeout);
        let pdf_reader = PdfReader::new(client.clone(), cache.clone(), config.reader_timeout);
        let crawler = if config.use_neural_crawler && config.reader_type == ReaderKind::Browser {
            Some(NeuralCrawler::new(Arc::new(BrowserReader::new(
                cache.clone(),
                config.reader_timeout,
            ))))
        } else {
            None
        };
        let refiner = build_refiner(
            config.reranker_type,
            config.chunk_size,
            config.min_relevance,
            config.max_evidence,
        );
        let security = SecurityGuard::new(config.security.clone());
        let planner = Planner::new(client.clone(), llm);

        Self {
            config,
            cache,
            search_engine,
            reader,
            pdf_reader,
            crawler,
            refiner,
            security,
            planner,
            stealth_reader: OnceCell::new(),
        }
    }

    pub async fn run(&self, query: &Query, context: &PipelineContext) -> PipelineOutput {
        let start = Instant::now();
        let mut output = PipelineOutput::new(query.text.clone());

        let sub_queries = self.planner.plan(query, &context.blocked_domains).await;
        output.sub_queries = sub_queries.iter().map(|s| s.text.clone()).collect();

        let query_texts: Vec<String> = sub_queries.iter().map(|s| s.text.clone()).collect();
        let results = self.search_engine.search(&query_texts).await;
        output.results = results.clone();

        let (urls, pdf_urls) = self.partition_urls(&results, context).await;

        let mut pages = if self.config.mode == Mode::Turbo {
            info!("turbo mode: building virtual pages from search snippets");
            urls.iter()
                .filter_map(|u| results.iter().find(|r| &r.url == u))
                .map(virtual_page)
                .collect::<Vec<_>>()
        } else if let (Some(crawler), false) = (&self.crawler, urls.is_empty()) {
            crawler
                .crawl(&urls, &query.text, self.config.reader_max_pages, self.config.crawler_max_depth)
                .await
        } else {
            self.reader.read_many(&urls).await
        };

        if self.config.enable_stealth_escalation && self.config.reader_type != ReaderKind::Browser {
            self.recover_with_stealth(&mut pages).await;
        }

        if !pdf_urls.is_empty() {
            let pdf_pages = self.pdf_reader.read_many(&pdf_urls).await;
            pages.extend(pdf_pages);
        }

        for page in &mut pages {
            if let Some(text) = &page.text_plain {
                page.text_plain = Some(self.security.sanitize_text(text));
            }
        }

        let (final_pages, newly_blocked) =
            reconcile_pages(pages, &results, self.config.enable_snippet_fallback);
        for domain in newly_blocked {
            output.add_blocked_domain(domain);
        }

        output.evidence = self.refiner.refine(&final_pages, &query.text).await;
        output.pages = final_pages;

        output.elapsed_ms = start.elapsed().as_millis() as u64;
        output
            .trace
            .insert("elapsed_ms".to_string(), output.elapsed_ms.to_string());
        output
    }

    /// Split search results into readable-page URLs and PDF URLs, dropping
    /// anything the security guard rejects and stopping once the combined
    /// html+pdf total reaches `reader_max_pages` — a hard stop, not a
    /// per-bucket one, so `reader_max_pages = 0` always yields zero URLs of
    /// either kind regardless of `mode`.
    async fn partition_urls(
        &self,
        results: &[SearchResult],
        context: &PipelineContext,
    ) -> (Vec<String>, Vec<String>) {
        let mut urls = Vec::new();
        let mut pdf_urls = Vec::new();
        let cap = self.config.reader_max_pages;

        for r in results {
            if urls.len() + pdf_urls.len() >= cap {
                break;
            }
            if context
                .blocked_domains
                .iter()
                .any(|d| r.url.contains(d.as_str()))
            {
                continue;
            }
            if !self.security.is_allowed_url(&r.url).await {
                continue;
            }
            if looks_like_pdf_url(&r.url) {
                pdf_urls.push(r.url.clone());
            } else {
                urls.push(r.url.clone());
            }
        }

        (urls, pdf_urls)
    }

    /// Re-fetch pages that look blocked through a lazily-initialized,
    /// process-wide browser reader. A recovered page only replaces the
    /// original when it actually carries more content.
    async fn recover_with_stealth(&self, pages: &mut [FetchedPage]) {
        let candidates: Vec<usize> = pages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.looks_blocked())
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return;
        }

        let stealth = self
            .stealth_reader
            .get_or_init(|| async {
                Arc::new(BrowserReader::new(
                    self.cache.clone(),
                    self.config.reader_timeout,
                ))
            })
            .await
            .clone();

        for idx in candidates {
            let url = pages[idx].url.clone();
            info!("escalating to stealth browser reader: {}", url);
            let recovered = stealth.fetch_one(&url).await;
            let recovered_len = recovered
                .text_plain
                .as_ref()
                .map(|t| t.trim().len())
                .unwrap_or(0);
            if recovered.error.is_none() && recovered_len > 100 {
                pages[idx] = recovered;
            }
        }
    }
}

/// Decide which fetched pages survive: drop anything still unusable after
/// extraction unless `enable_snippet_fallback` lets its search snippet
/// stand in for the missing body. Returns the surviving pages plus the
/// domains of every page that needed salvaging or was dropped outright, so
/// the caller can track them as blocked without re-deriving the check.
///
/// Extracted as a pure, network-free function so the snippet-fallback
/// behavior (spec scenario: a page that 403s still contributes its search
/// snippet as evidence) can be exercised directly in tests.
fn reconcile_pages(
    pages: Vec<FetchedPage>,
    results: &[SearchResult],
    enable_snippet_fallback: bool,
) -> (Vec<FetchedPage>, Vec<String>) {
    let snippets: HashMap<&str, &SearchResult> =
        results.iter().map(|r| (r.url.as_str(), r)).collect();

    let mut final_pages = Vec::with_capacity(pages.len());
    let mut newly_blocked = Vec::new();

    for mut page in pages {
        let still_failed = page.error.is_some()
            || page.status_code.map(|c| c >= 400).unwrap_or(false)
            || page
                .text_plain
                .as_ref()
                .map(|t| t.trim().len() < 50)
                .unwrap_or(true);

        if !still_failed {
            final_pages.push(page);
            continue;
        }

        if let Some(domain) = page.domain() {
            newly_blocked.push(domain);
        }

        if enable_snippet_fallback {
            if let Some(snippet) = snippets.get(page.url.as_str()).map(|r| r.snippet.as_str()) {
                if snippet.trim().len() > 20 {
                    page.text_plain = Some(snippet.to_string());
                    page.error = None;
                    page.status_code = Some(200);
                    final_pages.push(page);
                    continue;
                }
            }
        }

        warn!("dropping unrecoverable page: {}", page.url);
    }

    (final_pages, newly_blocked)
}

fn virtual_page(r: &SearchResult) -> FetchedPage {
    let text = format!(
        "Source: {}\nTitle: {}\n\nSummary (from Search Engine):\n{}",
        r.url, r.title, r.snippet
    );
    FetchedPage {
        url: r.url.clone(),
        final_url: None,
        status_code: Some(200),
        retrieved_at: chrono::Utc::now(),
        title: Some(r.title.clone()),
        text_plain: Some(text.clone()),
        text_markdown: Some(text),
        error: None,
        metadata: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_page_embeds_snippet_as_body() {
        let r = SearchResult {
            title: "Rust".to_string(),
            url: "http://a.com".to_string(),
            snippet: "a systems language".to_string(),
            source_engine: "stub".to_string(),
            rank: Some(0),
        };
        let page = virtual_page(&r);
        assert!(page.text_plain.unwrap().contains("a systems language"));
        assert_eq!(page.status_code, Some(200));
    }

    #[tokio::test]
    async fn partition_urls_skips_context_blocked_domains() {
        let config = Config::for_mode(Mode::Fast);
        let client = reqwest::Client::new();
        let cache: Arc<dyn crate::cache::PageCache> = Arc::new(crate::cache::MokaPageCache::default());
        let pipeline = Pipeline::new(config, client, cache, crate::config::LlmFileConfig::default());

        let results = vec![SearchResult {
            title: "t".to_string(),
            url: "https://blocked.example.com/page".to_string(),
            snippet: "s".to_string(),
            source_engine: "stub".to_string(),
            rank: Some(0),
        }];
        let context = PipelineContext {
            blocked_domains: vec!["blocked.example.com".to_string()],
        };
        let (urls, pdf_urls) = pipeline.partition_urls(&results, &context).await;
        assert!(urls.is_empty());
        assert!(pdf_urls.is_empty());
    }

    #[tokio::test]
    async fn partition_urls_stops_at_the_combined_html_and_pdf_cap() {
        let mut config = Config::for_mode(Mode::Fast);
        config.reader_max_pages = 2;
        let client = reqwest::Client::new();
        let cache: Arc<dyn crate::cache::PageCache> = Arc::new(crate::cache::MokaPageCache::default());
        let pipeline = Pipeline::new(config, client, cache, crate::config::LlmFileConfig::default());

        let results = vec![
            SearchResult {
                title: "a".to_string(),
                url: "https://a.com/page".to_string(),
                snippet: "s".to_string(),
                source_engine: "stub".to_string(),
                rank: Some(0),
            },
            SearchResult {
                title: "b".to_string(),
                url: "https://b.com/doc.pdf".to_string(),
                snippet: "s".to_string(),
                source_engine: "stub".to_string(),
                rank: Some(1),
            },
            SearchResult {
                title: "c".to_string(),
                url: "https://c.com/page".to_string(),
                snippet: "s".to_string(),
                source_engine: "stub".to_string(),
                rank: Some(2),
            },
        ];
        let (urls, pdf_urls) = pipeline.partition_urls(&results, &PipelineContext::default()).await;
        assert_eq!(urls.len() + pdf_urls.len(), 2);
        assert!(!urls.iter().any(|u| u.contains("c.com")));
    }

    #[tokio::test]
    async fn partition_urls_admits_nothing_when_reader_max_pages_is_zero() {
        // Independent of mode: a Balanced config with reader_max_pages
        // overridden to zero must select zero URLs of either kind.
        let mut config = Config::for_mode(Mode::Balanced);
        config.reader_max_pages = 0;
        let client = reqwest::Client::new();
        let cache: Arc<dyn crate::cache::PageCache> = Arc::new(crate::cache::MokaPageCache::default());
        let pipeline = Pipeline::new(config, client, cache, crate::config::LlmFileConfig::default());

        let results = vec![SearchResult {
            title: "a".to_string(),
            url: "https://a.com/page".to_string(),
            snippet: "s".to_string(),
            source_engine: "stub".to_string(),
            rank: Some(0),
        }];
        let (urls, pdf_urls) = pipeline.partition_urls(&results, &PipelineContext::default()).await;
        assert!(urls.is_empty());
        assert!(pdf_urls.is_empty());
    }

    fn result(url: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: "t".to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            source_engine: "stub".to_string(),
            rank: Some(0),
        }
    }

    #[test]
    fn reconcile_pages_keeps_healthy_pages_untouched() {
        let mut page = FetchedPage::failed("http://a.com", "unused");
        page.error = None;
        page.status_code = Some(200);
        page.text_plain = Some("a".repeat(100));
        let results = vec![result("http://a.com", "short snippet")];

        let (final_pages, blocked) = reconcile_pages(vec![page], &results, true);
        assert_eq!(final_pages.len(), 1);
        assert_eq!(final_pages[0].text_plain.as_deref(), Some("a".repeat(100)).as_deref());
        assert!(blocked.is_empty());
    }

    #[test]
    fn reconcile_pages_falls_back_to_snippet_when_extraction_failed() {
        let failed = FetchedPage::failed("http://blocked.com/page", "http 403");
        let results = vec![result(
            "http://blocked.com/page",
            "a long enough snippet to survive the fallback",
        )];

        let (final_pages, blocked) = reconcile_pages(vec![failed], &results, true);
        assert_eq!(final_pages.len(), 1);
        assert_eq!(
            final_pages[0].text_plain.as_deref(),
            Some("a long enough snippet to survive the fallback")
        );
        assert!(final_pages[0].error.is_none());
        assert_eq!(final_pages[0].status_code, Some(200));
        assert_eq!(blocked, vec!["blocked.com".to_string()]);
    }

    #[test]
    fn reconcile_pages_drops_page_when_snippet_fallback_disabled() {
        let failed = FetchedPage::failed("http://blocked.com/page", "http 403");
        let results = vec![result(
            "http://blocked.com/page",
            "a long enough snippet to survive the fallback",
        )];

        let (final_pages, blocked) = reconcile_pages(vec![failed], &results, false);
        assert!(final_pages.is_empty());
        assert_eq!(blocked, vec!["blocked.com".to_string()]);
    }

    #[test]
    fn reconcile_pages_drops_page_when_snippet_too_short() {
        let failed = FetchedPage::failed("http://blocked.com/page", "http 403");
        let results = vec![result("http://blocked.com/page", "too short")];

        let (final_pages, _blocked) = reconcile_pages(vec![failed], &results, true);
        assert!(final_pages.is_empty());
    }
}

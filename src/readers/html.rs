//! Browser-impersonating HTTP fetch plus heuristic main-content extraction.
//!
//! Grounded on the teacher's `scraping::rust_scraper` pipeline, trimmed down
//! to the parts that survive without the `readability`/`select` crates: a
//! regex-based noise strip followed by a best-main-container heuristic
//! (`article`, `main`, `[role=main]`, content-ish class names), falling back
//! to the whole `<body>`.

use super::{cached_or_fetch, Reader};
use crate::cache::PageCache;
use crate::types::FetchedPage;
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;

const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    "[itemprop=articleBody]",
    ".entry-content",
    ".post-content",
    ".article-content",
    "#content",
    "#main",
];

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "canvas", "iframe", "form", "nav", "header", "footer",
    "aside",
];

pub struct HtmlReader {
    client: reqwest::Client,
    cache: Arc<dyn PageCache>,
    timeout: Duration,
}

impl HtmlReader {
    pub fn new(client: reqwest::Client, cache: Arc<dyn PageCache>, timeout: Duration) -> Self {
        Self {
            client,
            cache,
            timeout,
        }
    }

    async fn do_fetch(&self, url: &str) -> FetchedPage {
        let user_agent = crate::antibot::get_random_user_agent();
        let mut req = self.client.get(url).header("User-Agent", user_agent);
        for (k, v) in crate::antibot::get_stealth_headers() {
            req = req.header(k, v);
        }

        let resp = match req.timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => return FetchedPage::failed(url, e.to_string()),
        };

        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return FetchedPage::failed(url, e.to_string()),
        };

        let text_plain = extract_main_content(&body);
        let text_markdown = html2md::parse_html(&body);
        let title = Html::parse_document(&body)
            .select(&Selector::parse("title").expect("static selector"))
            .next()
            .map(|n| n.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let mut page = FetchedPage {
            url: url.to_string(),
            final_url: Some(final_url),
            status_code: Some(status.as_u16()),
            retrieved_at: chrono::Utc::now(),
            title,
            text_plain: Some(text_plain),
            text_markdown: Some(text_markdown),
            error: None,
            metadata: Default::default(),
        };

        if !status.is_success() {
            page.error = Some(format!("http {}", status));
        } else if !page.is_successful() {
            page.error = Some("extraction produced no usable text".to_string());
        }
        page
    }
}

#[async_trait]
impl Reader for HtmlReader {
    fn scope(&self) -> &'static str {
        "html"
    }

    async fn fetch_one(&self, url: &str) -> FetchedPage {
        cached_or_fetch(&self.cache, self.scope(), url, Duration::from_secs(3600), || {
            self.do_fetch(url)
        })
        .await
    }
}

/// Strip script/style/nav/footer noise, try each main-content selector in
/// order, keep the longest result, and fall back to the whole body.
pub(crate) fn extract_main_content(html: &str) -> String {
    let cleaned = strip_noise_blocks(html);
    let document = Html::parse_document(&cleaned);

    let mut best = String::new();
    for sel_str in MAIN_CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        for el in document.select(&selector) {
            let text = block_text(&el);
            if text.len() > best.len() {
                best = text;
            }
        }
    }

    if best.trim().len() < 50 {
        if let Ok(body_sel) = Selector::parse("body") {
            if let Some(body) = document.select(&body_sel).next() {
                best = block_text(&body);
            }
        }
    }

    collapse_blank_lines(&best)
}

fn strip_noise_blocks(html: &str) -> String {
    let tags = NOISE_TAGS.join("|");
    let re = Regex::new(&format!(r"(?is)<({tags})[^>]*?>.*?</({tags})>")).expect("static regex");
    re.replace_all(html, " ").to_string()
}

/// Join block-level descendant text with blank-line separators, the same
/// shape the teacher's `extract_text_recursive` produces.
fn block_text(el: &ElementRef) -> String {
    const BLOCK_TAGS: &[&str] = &[
        "p", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "td",
    ];
    let mut parts = Vec::new();
    collect_block_text(el, BLOCK_TAGS, &mut parts);
    parts.join("\n\n")
}

fn collect_block_text(el: &ElementRef, block_tags: &[&str], out: &mut Vec<String>) {
    let is_block = block_tags.contains(&el.value().name());
    if is_block {
        let text = el.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            out.push(text);
            return;
        }
    }
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            collect_block_text(&child_el, block_tags, out);
        }
    }
}

fn collapse_blank_lines(text: &str) -> String {
    let re = Regex::new(r"\n{3,}").expect("static regex");
    re.replace_all(text.trim(), "\n\n").to_string()
}

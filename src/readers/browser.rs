//! Headless-browser fetch via `chromiumoxide`, grounded on the teacher's
//! `scraping::browser_manager` (executable discovery, headless config) and
//! `scraping::rust_scraper::cdp` (event-handler plumbing). Simplified:
//! stealth scroll/mouse simulation is dropped, but resource-type blocking
//! and link-with-context extraction (needed by the crawler) are kept.

use super::{cached_or_fetch, Reader};
use crate::cache::PageCache;
use crate::types::FetchedPage;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// A link discovered while a browser-rendered page is on screen, with a
/// window of surrounding text the crawler uses for relevance scoring.
#[derive(Debug, Clone)]
pub struct DiscoveredLink {
    pub url: String,
    pub text: String,
    pub context: String,
}

const BLOCKED_RESOURCE_TYPES: &[ResourceType] = &[
    ResourceType::Image,
    ResourceType::Media,
    ResourceType::Font,
    ResourceType::Stylesheet,
];

/// Resolution order mirrors the teacher's `find_chrome_executable`:
/// `CHROME_EXECUTABLE` env var, then well-known Linux install paths
/// (the deployment target for this service).
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::config::chrome_executable_override() {
        return Some(p);
    }
    let candidates = [
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/local/bin/chromium",
    ];
    candidates
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

fn build_headless_config(exe: &str) -> anyhow::Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1280,
            height: 900,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 900)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--no-first-run")
        .arg("--mute-audio")
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {}", e))
}

struct Session {
    browser: Browser,
    // The most recently rendered page, kept open between `render` and a
    // follow-up `extract_links` call so link extraction reads the same DOM
    // that produced the page text.
    current_page: Option<Page>,
}

pub struct BrowserReader {
    cache: Arc<dyn PageCache>,
    timeout: Duration,
    // Lazily launched, shared across fetches; a fresh `Page` (not a fresh
    // process) stands in for "fresh context" per the teacher's lightweight
    // `fetch_html_native` primitive.
    session: Mutex<Option<Session>>,
}

impl BrowserReader {
    pub fn new(cache: Arc<dyn PageCache>, timeout: Duration) -> Self {
        Self {
            cache,
            timeout,
            session: Mutex::new(None),
        }
    }

    async fn ensure_session<'a>(
        &self,
        guard: &'a mut tokio::sync::MutexGuard<'_, Option<Session>>,
    ) -> Result<(), crate::error::ReaderError> {
        if guard.is_some() {
            return Ok(());
        }
        let exe = find_chrome_executable().ok_or(crate::error::ReaderError::NoBrowser)?;
        let config = build_headless_config(&exe)
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("chromiumoxide handler error: {}", e);
                }
            }
        });
        **guard = Some(Session {
            browser,
            current_page: None,
        });
        Ok(())
    }

    async fn render(&self, url: &str) -> Result<(u16, String, String), crate::error::ReaderError> {
        let mut guard = self.session.lock().await;
        self.ensure_session(&mut guard).await?;
        let session = guard.as_mut().expect("session just ensured");
        if let Some(stale) = session.current_page.take() {
            stale.close().await.ok();
        }

        let user_agent = crate::antibot::get_random_user_agent();
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;
        page.set_user_agent(user_agent)
            .await
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;

        page.execute(FetchEnableParams::default())
            .await
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;
        let page_for_interception = page.clone();
        tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let blocked = event
                    .resource_type
                    .as_ref()
                    .is_some_and(|rt| BLOCKED_RESOURCE_TYPES.contains(rt));
                let result = if blocked {
                    page_for_interception
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                } else {
                    page_for_interception
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                };
                if let Err(e) = result {
                    warn!("fetch interception response failed: {}", e);
                }
            }
        });

        let nav = tokio::time::timeout(self.timeout, page.goto(url))
            .await
            .map_err(|_| crate::error::ReaderError::Timeout(self.timeout))?
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?;
        let _ = nav;

        tokio::time::timeout(self.timeout, page.wait_for_navigation())
            .await
            .ok();

        let inner_text: String = page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|e| crate::error::ReaderError::Http(e.to_string()))?
            .into_value()
            .unwrap_or_default();

        let title: String = page
            .evaluate("document.title || ''")
            .await
            .and_then(|v| v.into_value().map_err(Into::into))
            .unwrap_or_default();

        session.current_page = Some(page);
        Ok((200, inner_text, title))
    }

    async fn do_fetch(&self, url: &str) -> FetchedPage {
        match self.render(url).await {
            Ok((status, text, title)) => {
                if text.trim().len() < 50 {
                    return FetchedPage::failed(url, "browser extraction produced no usable text");
                }
                FetchedPage {
                    url: url.to_string(),
                    final_url: Some(url.to_string()),
                    status_code: Some(status),
                    retrieved_at: chrono::Utc::now(),
                    title: (!title.is_empty()).then_some(title),
                    text_plain: Some(text.clone()),
                    text_markdown: Some(text),
                    error: None,
                    metadata: Default::default(),
                }
            }
            Err(e) => FetchedPage::failed(url, e.to_string()),
        }
    }

    /// Render `url`, returning the fetched page alongside every discovered
    /// link with up to 200 characters of surrounding text as context.
    /// Invisible (`display:none`/`visibility:hidden`) and non-HTTP links
    /// are filtered out in-page before the result crosses the CDP boundary.
    pub async fn fetch_with_links(
        &self,
        url: &str,
    ) -> Result<(FetchedPage, Vec<DiscoveredLink>), crate::error::ReaderError> {
        let (status, text, title) = self.render(url).await?;
        let page = if text.trim().len() >= 50 {
            FetchedPage {
                url: url.to_string(),
                final_url: Some(url.to_string()),
                status_code: Some(status),
                retrieved_at: chrono::Utc::now(),
                title: (!title.is_empty()).then_some(title),
                text_plain: Some(text.clone()),
                text_markdown: Some(text),
                error: None,
                metadata: Default::default(),
            }
        } else {
            FetchedPage::failed(url, "browser extraction produced no usable text")
        };

        let links = self.extract_links().await.unwrap_or_default();
        Ok((page, links))
    }

    /// Pull links from the page `render` just navigated to; relies on
    /// `current_page` still being open (it is, until the next `render`
    /// call closes it).
    async fn extract_links(&self) -> Option<Vec<DiscoveredLink>> {
        let guard = self.session.lock().await;
        let session = guard.as_ref()?;
        let page = session.current_page.as_ref()?;

        let script = r#"
            Array.from(document.querySelectorAll('a[href]')).filter(a => {
                const style = window.getComputedStyle(a);
                return style.display !== 'none' && style.visibility !== 'hidden';
            }).map(a => {
                const text = (a.innerText || '').trim();
                const parentText = (a.parentElement ? a.parentElement.innerText : '') || '';
                const context = parentText.trim().slice(0, 200);
                return { url: a.href, text, context };
            }).filter(l => l.url.startsWith('http'))
        "#;
        let raw: serde_json::Value = page.evaluate(script).await.ok()?.into_value().ok()?;
        let arr = raw.as_array()?;
        Some(
            arr.iter()
                .filter_map(|v| {
                    Some(DiscoveredLink {
                        url: v.get("url")?.as_str()?.to_string(),
                        text: v.get("text")?.as_str().unwrap_or_default().to_string(),
                        context: v.get("context")?.as_str().unwrap_or_default().to_string(),
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl Reader for BrowserReader {
    fn scope(&self) -> &'static str {
        "browser"
    }

    async fn fetch_one(&self, url: &str) -> FetchedPage {
        cached_or_fetch(&self.cache, self.scope(), url, Duration::from_secs(1800), || {
            self.do_fetch(url)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_resource_types_cover_heavy_assets() {
        assert!(BLOCKED_RESOURCE_TYPES.contains(&ResourceType::Image));
        assert!(BLOCKED_RESOURCE_TYPES.contains(&ResourceType::Stylesheet));
    }
}

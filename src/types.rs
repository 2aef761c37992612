use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// Query / SubQuery
// ─────────────────────────────────────────────────────────────────────────────

/// A user-submitted research query. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A planner-generated variant of the original query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub text: String,
}

impl SubQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The identity fallback: treat the original query as its own sub-query.
    pub fn identity(query: &Query) -> Self {
        Self::new(query.text.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SearchResult
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source_engine: String,
    #[serde(default)]
    pub rank: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// FetchedPage
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    pub retrieved_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text_plain: Option<String>,
    #[serde(default)]
    pub text_markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl FetchedPage {
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            final_url: None,
            status_code: None,
            retrieved_at: chrono::Utc::now(),
            title: None,
            text_plain: None,
            text_markdown: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// A page is successful iff it carries no error, its body clears the
    /// minimum length bar, and any known status code is not an error status.
    pub fn is_successful(&self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if let Some(code) = self.status_code {
            if code >= 400 {
                return false;
            }
        }
        self.text_plain
            .as_ref()
            .map(|t| t.trim().len() >= 50)
            .unwrap_or(false)
    }

    /// Worth escalating to the browser reader — present but suspiciously
    /// short, or carrying an outright error.
    pub fn looks_blocked(&self) -> bool {
        if self.error.is_some() {
            return true;
        }
        let text = self.text_plain.as_deref().unwrap_or("");
        if text.trim().len() < 300 {
            return true;
        }
        let lower = text.to_lowercase();
        lower.contains("enable javascript") || lower.contains("cloudflare")
    }

    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EvidenceChunk
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub url: String,
    pub chunk_id: String,
    pub content: String,
    pub relevance_score: f32,
    #[serde(default)]
    pub title: Option<String>,
    /// Set by the flash refiner when the cross-encoder-style score exceeds
    /// 0.85 — a high-confidence signal that this chunk alone answers the
    /// query, surfaced to the synthesizer for citation priority.
    #[serde(default)]
    pub is_answer: bool,
}

/// Stable chunk id: `hash(url, ordinal)`, formatted as hex so it reads well
/// in traces and citations.
pub fn make_chunk_id(url: &str, ordinal: usize) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    ordinal.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

// ─────────────────────────────────────────────────────────────────────────────
// PipelineOutput
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineOutput {
    pub query: String,
    #[serde(default)]
    pub sub_queries: Vec<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub pages: Vec<FetchedPage>,
    #[serde(default)]
    pub evidence: Vec<EvidenceChunk>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    #[serde(default)]
    pub trace: HashMap<String, String>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl PipelineOutput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Union a blocked domain into the tracked set, keeping it duplicate-free.
    pub fn add_blocked_domain(&mut self, domain: impl Into<String>) {
        let domain = domain.into();
        if !self.blocked_domains.iter().any(|d| d == &domain) {
            self.blocked_domains.push(domain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_page_requires_min_length() {
        let mut page = FetchedPage::failed("http://a.com", "x");
        page.error = None;
        page.text_plain = Some("too short".to_string());
        assert!(!page.is_successful());

        page.text_plain = Some("x".repeat(60));
        assert!(page.is_successful());
    }

    #[test]
    fn chunk_id_is_stable() {
        let a = make_chunk_id("http://example.com", 3);
        let b = make_chunk_id("http://example.com", 3);
        let c = make_chunk_id("http://example.com", 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn blocked_domains_are_deduplicated() {
        let mut out = PipelineOutput::new("q");
        out.add_blocked_domain("reddit.com");
        out.add_blocked_domain("reddit.com");
        assert_eq!(out.blocked_domains, vec!["reddit.com".to_string()]);
    }
}

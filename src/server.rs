//! Tavily-compatible HTTP façade, grounded on `server/app.py` and
//! `server/schemas.py`. Pure translation layer: maps the wire request onto
//! a `Config`, runs either a single `Pipeline` round or the full
//! `ResearchLoop`, and maps the result back onto the Tavily response shape.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::PageCache;
use crate::config::{Config, LlmFileConfig, Mode, ReaderKind, RerankerKind, SecurityConfig};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::research_loop::ResearchLoop;
use crate::types::{PipelineOutput, Query};

const RAW_CONTENT_TRUNCATE_CHARS: usize = 500;
const FALLBACK_SCORE: f32 = 0.5;

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub cache: Arc<dyn PageCache>,
    pub llm: LlmFileConfig,
}

#[derive(Debug, Deserialize)]
pub struct TavilyRequest {
    pub query: String,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(default = "default_topic")]
    #[allow(dead_code)]
    pub topic: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    #[allow(dead_code)]
    pub include_images: bool,
    #[serde(default)]
    pub include_answer: bool,
    #[serde(default)]
    pub include_raw_content: bool,
    #[serde(default)]
    pub include_domains: Vec<String>,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
    #[serde(default)]
    pub use_neural_crawler: bool,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub reranker: Option<String>,
    #[serde(default)]
    pub reader: Option<String>,
    #[serde(default)]
    pub max_evidence: Option<usize>,
}

fn default_search_depth() -> String {
    "basic".to_string()
}
fn default_topic() -> String {
    "general".to_string()
}
fn default_max_results() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct TavilyImage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct TavilySearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct TavilyResponse {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub images: Vec<TavilyImage>,
    pub results: Vec<TavilySearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_questions: Option<Vec<String>>,
    pub response_time: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(search_handler))
        .route("/v1/search", post(search_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": "answer-scout"}))
}

/// Resolve the mode from the request: an explicit `mode` extension field
/// wins, else `search_depth=advanced` maps to `deep`, else `balanced`.
fn resolve_mode(request: &TavilyRequest) -> Mode {
    if let Some(m) = &request.mode {
        if let Some(mode) = Mode::parse(m) {
            return mode;
        }
    }
    if request.search_depth.eq_ignore_ascii_case("advanced") {
        Mode::Deep
    } else {
        Mode::Balanced
    }
}

fn build_config(request: &TavilyRequest) -> Config {
    let mode = resolve_mode(request);
    let mut config = Config::for_mode(mode);

    config.security = SecurityConfig {
        allowed_domains: request.include_domains.clone(),
        blocked_domains: request.exclude_domains.clone(),
        ..config.security
    };

    // Mirrors `max_evidence = request.max_evidence or request.max_results`.
    config = config.with_max_evidence(request.max_evidence.unwrap_or(request.max_results));

    if let Some(r) = &request.reranker {
        let kind = match r.as_str() {
            "flash" => Some(RerankerKind::Flash),
            "fast" => Some(RerankerKind::Keyword),
            "hybrid" => Some(RerankerKind::Hybrid),
            _ => None,
        };
        if let Some(kind) = kind {
            config = config.with_reranker(kind);
        }
    }

    if let Some(r) = &request.reader {
        let kind = match r.as_str() {
            "browser" => Some(ReaderKind::Browser),
            "trafilatura" => Some(ReaderKind::Html),
            _ => None,
        };
        if let Some(kind) = kind {
            config = config.with_reader(kind);
        }
    }

    if request.use_neural_crawler {
        config = config.with_neural_crawler(true);
    }

    // "basic" with no extensions requested runs a single round; the full
    // adaptive loop only pays for itself when the caller asked for depth.
    if request.search_depth.eq_ignore_ascii_case("basic") && request.mode.is_none() {
        config.max_depth = 1;
    }

    config
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<TavilyRequest>,
) -> Json<TavilyResponse> {
    let start = Instant::now();
    let config = build_config(&request);
    let query = Query::new(request.query.clone());
    let include_answer = request.include_answer;
    let max_results = request.max_results;
    let include_raw = request.include_raw_content;

    let output = if config.max_depth <= 1 {
        let pipeline = Pipeline::new(config, state.client.clone(), state.cache.clone(), state.llm.clone());
        pipeline.run(&query, &PipelineContext::default()).await
    } else {
        let research_loop =
            ResearchLoop::from_config(&config, state.client.clone(), state.cache.clone(), state.llm.clone());
        research_loop.run(&query).await
    };

    let results = to_tavily_results(&output, max_results, include_raw);
    let answer = if include_answer { output.answer.clone() } else { None };

    Json(TavilyResponse {
        query: request.query,
        answer,
        images: Vec::new(),
        results,
        follow_up_questions: None,
        response_time: start.elapsed().as_secs_f64(),
    })
}

/// `output.evidence` (preferred) else page text truncated to 500 chars
/// with a flat fallback score, per the wire contract.
fn to_tavily_results(
    output: &PipelineOutput,
    max_results: usize,
    include_raw: bool,
) -> Vec<TavilySearchResult> {
    if !output.evidence.is_empty() {
        return output
            .evidence
            .iter()
            .take(max_results)
            .map(|c| TavilySearchResult {
                title: c.title.clone().unwrap_or_default(),
                url: c.url.clone(),
                content: c.content.clone(),
                raw_content: include_raw.then(|| c.content.clone()),
                score: c.relevance_score,
            })
            .collect();
    }

    output
        .pages
        .iter()
        .take(max_results)
        .map(|p| {
            let text = p.text_plain.clone().unwrap_or_default();
            let truncated: String = text.chars().take(RAW_CONTENT_TRUNCATE_CHARS).collect();
            TavilySearchResult {
                title: p.title.clone().unwrap_or_default(),
                url: p.url.clone(),
                content: truncated,
                raw_content: include_raw.then(|| text.clone()),
                score: FALLBACK_SCORE,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> TavilyRequest {
        TavilyRequest {
            query: "rust async runtimes".to_string(),
            search_depth: default_search_depth(),
            topic: default_topic(),
            max_results: default_max_results(),
            include_images: false,
            include_answer: false,
            include_raw_content: false,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            use_neural_crawler: false,
            mode: None,
            reranker: None,
            reader: None,
            max_evidence: None,
        }
    }

    #[test]
    fn basic_depth_with_no_extensions_runs_a_single_round() {
        let config = build_config(&base_request());
        assert_eq!(config.max_depth, 1);
    }

    #[test]
    fn advanced_depth_maps_to_deep_mode() {
        let mut request = base_request();
        request.search_depth = "advanced".to_string();
        let config = build_config(&request);
        assert_eq!(config.mode, Mode::Deep);
        assert!(config.max_depth > 1);
    }

    #[test]
    fn explicit_mode_overrides_search_depth() {
        let mut request = base_request();
        request.search_depth = "advanced".to_string();
        request.mode = Some("turbo".to_string());
        let config = build_config(&request);
        assert_eq!(config.mode, Mode::Turbo);
    }

    #[test]
    fn exclude_domains_populate_security_blocklist() {
        let mut request = base_request();
        request.exclude_domains = vec!["reddit.com".to_string()];
        let config = build_config(&request);
        assert_eq!(config.security.blocked_domains, vec!["reddit.com".to_string()]);
    }

    #[test]
    fn to_tavily_results_falls_back_to_pages_when_no_evidence() {
        let mut output = PipelineOutput::new("q");
        output.pages.push(crate::types::FetchedPage {
            url: "http://a.com".to_string(),
            final_url: None,
            status_code: Some(200),
            retrieved_at: chrono::Utc::now(),
            title: Some("A".to_string()),
            text_plain: Some("x".repeat(600)),
            text_markdown: None,
            error: None,
            metadata: Default::default(),
        });
        let results = to_tavily_results(&output, 5, false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content.len(), RAW_CONTENT_TRUNCATE_CHARS);
        assert_eq!(results[0].score, FALLBACK_SCORE);
    }
}

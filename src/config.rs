use std::path::Path;

// ─────────────────────────────────────────────────────────────────────────────
// Mode — an immutable preset, not a mutable setter
// ─────────────────────────────────────────────────────────────────────────────

/// Research mode. Chosen once at construction; `Config::for_mode` is a pure
/// function from this closed enumeration onto a concrete configuration
/// record. There is deliberately no `set_mode` — changing mode mid-run would
/// leave stale concurrency/timeout settings behind, so callers build a new
/// `Config` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Turbo,
    Fast,
    #[default]
    Balanced,
    Deep,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "turbo" => Some(Mode::Turbo),
            "fast" => Some(Mode::Fast),
            "balanced" => Some(Mode::Balanced),
            "deep" => Some(Mode::Deep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankerKind {
    Keyword,
    Hybrid,
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    Html,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProfile {
    Public,
    Enterprise,
}

/// Allow/block/PII-masking policy applied before a URL is fetched or a page
/// is handed to a refiner.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub blocked_keywords: Vec<String>,
    pub pii_masking: bool,
    pub network_profile: NetworkProfile,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            blocked_keywords: Vec::new(),
            pii_masking: true,
            network_profile: NetworkProfile::Public,
        }
    }
}

/// A single research run's configuration. Immutable once constructed;
/// `Mode` fully determines every policy field via `Config::for_mode`.
/// Individual fields may still be overridden afterward via the `with_*`
/// builder methods (consuming self, as in the teacher's `AppState`), which
/// produce a new `Config` rather than mutating one in place.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub concurrency: usize,
    pub max_retries: u32,
    pub reader_timeout: std::time::Duration,
    pub reader_max_pages: usize,
    pub reader_type: ReaderKind,
    pub reranker_type: RerankerKind,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_evidence: usize,
    pub max_context_tokens: usize,
    pub min_relevance: f32,
    pub enable_snippet_fallback: bool,
    pub enable_stealth_escalation: bool,
    pub use_neural_crawler: bool,
    pub crawler_max_depth: usize,
    pub crawler_max_pages: usize,
    pub max_depth: u8,
    pub security: SecurityConfig,
}

impl Config {
    /// Build the concrete configuration record for a preset mode. This is
    /// the only supported way to derive per-mode policy; it never mutates
    /// an existing `Config`.
    pub fn for_mode(mode: Mode) -> Self {
        let security = SecurityConfig::default();
        match mode {
            Mode::Turbo => Self {
                mode,
                concurrency: 4,
                max_retries: 1,
                reader_timeout: std::time::Duration::from_secs(5),
                reader_max_pages: 5,
                reader_type: ReaderKind::Html,
                reranker_type: RerankerKind::Keyword,
                chunk_size: 800,
                chunk_overlap: 100,
                max_evidence: 5,
                max_context_tokens: 2_000,
                min_relevance: 0.0,
                enable_snippet_fallback: true,
                enable_stealth_escalation: false,
                use_neural_crawler: false,
                crawler_max_depth: 0,
                crawler_max_pages: 0,
                max_depth: 1,
                security,
            },
            Mode::Fast => Self {
                mode,
                concurrency: 6,
                max_retries: 2,
                reader_timeout: std::time::Duration::from_secs(8),
                reader_max_pages: 6,
                reader_type: ReaderKind::Html,
                reranker_type: RerankerKind::Keyword,
                chunk_size: 800,
                chunk_overlap: 100,
                max_evidence: 8,
                max_context_tokens: 4_000,
                min_relevance: 0.1,
                enable_snippet_fallback: true,
                enable_stealth_escalation: false,
                use_neural_crawler: false,
                crawler_max_depth: 0,
                crawler_max_pages: 0,
                max_depth: 1,
                security,
            },
            Mode::Balanced => Self {
                mode,
                concurrency: 8,
                max_retries: 2,
                reader_timeout: std::time::Duration::from_secs(12),
                reader_max_pages: 10,
                reader_type: ReaderKind::Html,
                reranker_type: RerankerKind::Hybrid,
                chunk_size: 1_000,
                chunk_overlap: 150,
                max_evidence: 12,
                max_context_tokens: 8_000,
                min_relevance: 0.15,
                enable_snippet_fallback: true,
                enable_stealth_escalation: true,
                use_neural_crawler: false,
                crawler_max_depth: 2,
                crawler_max_pages: 8,
                max_depth: 2,
                security,
            },
            Mode::Deep => Self {
                mode,
                concurrency: 10,
                max_retries: 3,
                reader_timeout: std::time::Duration::from_secs(20),
                reader_max_pages: 16,
                reader_type: ReaderKind::Browser,
                reranker_type: RerankerKind::Hybrid,
                chunk_size: 1_200,
                chunk_overlap: 200,
                max_evidence: 15,
                max_context_tokens: 16_000,
                min_relevance: 0.15,
                enable_snippet_fallback: true,
                enable_stealth_escalation: true,
                use_neural_crawler: true,
                crawler_max_depth: 3,
                crawler_max_pages: 15,
                max_depth: 2,
                security,
            },
        }
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn with_max_evidence(mut self, n: usize) -> Self {
        self.max_evidence = n;
        self
    }

    pub fn with_reranker(mut self, kind: RerankerKind) -> Self {
        self.reranker_type = kind;
        self
    }

    pub fn with_reader(mut self, kind: ReaderKind) -> Self {
        self.reader_type = kind;
        self
    }

    pub fn with_neural_crawler(mut self, enabled: bool) -> Self {
        self.use_neural_crawler = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM sub-config — mirrors the teacher's deep_research.llm_* env-var chain
// ─────────────────────────────────────────────────────────────────────────────

/// Planner/synthesizer LLM endpoint config (mirrors the `llm` key in
/// `answer-scout.json`).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct LlmFileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl LlmFileConfig {
    /// Mirrors the teacher's `if config.llm_base_url:` gate: the planner and
    /// synthesizer only activate when a base URL was explicitly configured
    /// (file or env var), not merely because `resolve_base_url` has a public
    /// fallback to fall back to.
    pub fn is_configured(&self) -> bool {
        self.base_url
            .as_ref()
            .is_some_and(|u| !u.trim().is_empty())
            || std::env::var("OPENAI_BASE_URL")
                .ok()
                .is_some_and(|v| !v.trim().is_empty())
    }

    /// API key: JSON field → `OPENAI_API_KEY` env var → `None`. An explicit
    /// empty string in the config file means "no key required" (Ollama /
    /// LM Studio) and is returned as-is.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.trim().to_string());
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Base URL: JSON field → `OPENAI_BASE_URL` env var → the public OpenAI
    /// endpoint.
    pub fn resolve_base_url(&self) -> String {
        if let Some(u) = &self.base_url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }

    /// Model: JSON field → `ANSWER_SCOUT_LLM_MODEL` env var → `gpt-4o-mini`.
    pub fn resolve_model(&self) -> String {
        if let Some(m) = &self.model {
            if !m.trim().is_empty() {
                return m.clone();
            }
        }
        std::env::var("ANSWER_SCOUT_LLM_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }

    /// Max output tokens: JSON field → `ANSWER_SCOUT_LLM_MAX_TOKENS` env var → 1024.
    pub fn resolve_max_tokens(&self) -> u32 {
        if let Some(n) = self.max_tokens {
            return n;
        }
        std::env::var("ANSWER_SCOUT_LLM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024)
    }
}

/// Top-level config file loaded from `answer-scout.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct FileConfig {
    #[serde(default)]
    pub llm: LlmFileConfig,
}

/// Load `answer-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `./answer-scout.json` (process cwd)
/// 2. `../answer-scout.json` (one level up)
/// 3. `ANSWER_SCOUT_CONFIG` env var path
///
/// Missing file → `FileConfig::default()` (silent, all env-var fallbacks
/// apply). Parse error → log a warning, return `FileConfig::default()`.
pub fn load_file_config() -> FileConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("answer-scout.json"),
            std::path::PathBuf::from("../answer-scout.json"),
        ];
        if let Ok(env_path) = std::env::var("ANSWER_SCOUT_CONFIG") {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<FileConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("answer-scout.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "answer-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return FileConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    FileConfig::default()
}

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Optional override for the Chromium-family browser executable. Default
/// behavior is auto-discovery (see `readers::browser::find_chrome_executable`).
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turbo_mode_is_a_single_round_with_virtual_pages() {
        // `reader_max_pages` stays at a normal, nonzero cap — turbo mode
        // skips fetching via `mode == Turbo`, not by zeroing the page cap;
        // the two are independent knobs (mirrors the original's `set_mode`,
        // whose turbo branch never touches `reader_max_pages`).
        let cfg = Config::for_mode(Mode::Turbo);
        assert_eq!(cfg.mode, Mode::Turbo);
        assert!(cfg.reader_max_pages > 0);
        assert_eq!(cfg.max_depth, 1);
    }

    #[test]
    fn deep_mode_enables_crawler_and_browser() {
        let cfg = Config::for_mode(Mode::Deep);
        assert!(cfg.use_neural_crawler);
        assert_eq!(cfg.reader_type, ReaderKind::Browser);
    }

    #[test]
    fn mode_parse_roundtrips_known_values() {
        assert_eq!(Mode::parse("deep"), Some(Mode::Deep));
        assert_eq!(Mode::parse("DEEP"), Some(Mode::Deep));
        assert_eq!(Mode::parse("unknown"), None);
    }

    #[test]
    fn llm_config_is_unconfigured_by_default() {
        let llm = LlmFileConfig::default();
        assert!(!llm.is_configured());
    }

    #[test]
    fn llm_config_is_configured_with_explicit_base_url() {
        let llm = LlmFileConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            ..Default::default()
        };
        assert!(llm.is_configured());
    }
}

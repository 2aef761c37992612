use thiserror::Error;

/// Fatal configuration problems — these surface at construction time, never
/// mid-run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("composite engine constructed with no providers")]
    NoProviders,

    #[error("unknown mode '{0}' (expected turbo, fast, balanced, or deep)")]
    UnknownMode(String),
}

/// Errors a single search provider call can report. `Blocked` and `Transient`
/// are soft failures the composite engine and pipeline tolerate; only
/// `Fatal` construction-time errors (see `ConfigError`) ever stop a run.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("blocked: {reason}")]
    Blocked { reason: String },

    #[error("transient: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

/// Errors surfaced while fetching or extracting a single page. Callers
/// (the pipeline) record these on `FetchedPage::error` rather than
/// propagating them.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("no browser executable found (set CHROME_EXECUTABLE or install Chrome/Chromium)")]
    NoBrowser,

    #[error("fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("http error: {0}")]
    Http(String),

    #[error("extraction produced no usable text")]
    EmptyExtraction,

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
}

//! Refiners turn fetched pages into ranked, citable evidence chunks.
//! Grounded on `refiners/keyword.py`, `refiners/hybrid.py`, `refiners/flash.py`.

pub mod chunking;
pub mod flash;
pub mod hybrid;
pub mod keyword;

use crate::types::{EvidenceChunk, FetchedPage};
use async_trait::async_trait;

/// English stop words plus a few research-specific filler terms, shared by
/// every refiner that tokenizes on keywords.
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "current", "latest", "recent",
];

#[async_trait]
pub trait Refiner: Send + Sync {
    /// Reduce `pages` to a ranked, deduplicated set of evidence chunks for
    /// `query`, sorted descending by `relevance_score` and truncated to the
    /// refiner's configured `max_evidence`.
    async fn refine(&self, pages: &[FetchedPage], query: &str) -> Vec<EvidenceChunk>;
}

pub fn build_refiner(
    kind: crate::config::RerankerKind,
    chunk_size: usize,
    min_relevance: f32,
    max_evidence: usize,
) -> Box<dyn Refiner> {
    match kind {
        crate::config::RerankerKind::Keyword => {
            Box::new(keyword::KeywordRefiner::new(chunk_size, min_relevance, max_evidence))
        }
        crate::config::RerankerKind::Hybrid => {
            Box::new(hybrid::HybridRefiner::new(chunk_size, min_relevance, max_evidence))
        }
        crate::config::RerankerKind::Flash => {
            Box::new(flash::FlashRefiner::new(chunk_size, max_evidence))
        }
    }
}

/// Tokenize lowercase, dropping stop words and single-character tokens.
/// Falls back to the unfiltered term list if every term was a stop word.
pub(crate) fn meaningful_terms(query: &str) -> Vec<String> {
    let all: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect();
    let filtered: Vec<String> = all
        .iter()
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .cloned()
        .collect();
    if filtered.is_empty() {
        all
    } else {
        filtered
    }
}

//! BM25-scored keyword refiner, grounded on `refiners/keyword.py`. The
//! original scores chunks by query-term coverage alone; this implementation
//! follows SPEC_FULL.md's BM25 (k1=1.5, b=0.75) upgrade while keeping the
//! same chunk-then-filter-then-sort shape.

use super::chunking::{chunk_pages, RawChunk};
use super::{meaningful_terms, Refiner};
use crate::types::{EvidenceChunk, FetchedPage};
use async_trait::async_trait;
use std::collections::HashMap;

const K1: f32 = 1.5;
const B: f32 = 0.75;

pub struct KeywordRefiner {
    chunk_size: usize,
    min_relevance: f32,
    max_evidence: usize,
}

impl KeywordRefiner {
    pub fn new(chunk_size: usize, min_relevance: f32, max_evidence: usize) -> Self {
        Self {
            chunk_size,
            min_relevance,
            max_evidence,
        }
    }

    /// Chunk `pages` and score every chunk against `query`, without applying
    /// `min_relevance` or `max_evidence` — used by the hybrid and flash
    /// refiners, which need the full, unfiltered chunk set.
    pub fn chunk_and_score(&self, pages: &[FetchedPage], query: &str) -> Vec<EvidenceChunk> {
        let chunks = chunk_pages(pages, self.chunk_size);
        score_chunks(chunks, query)
    }
}

#[async_trait]
impl Refiner for KeywordRefiner {
    async fn refine(&self, pages: &[FetchedPage], query: &str) -> Vec<EvidenceChunk> {
        let mut evidence = self.chunk_and_score(pages, query);
        evidence.retain(|c| c.relevance_score >= self.min_relevance);
        evidence.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        evidence.truncate(self.max_evidence);
        evidence
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| t.len() > 1 && !super::STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Corpus-local BM25 over `chunks`, normalized by the corpus max into
/// [0,1] so the score is comparable across refiners.
fn score_chunks(chunks: Vec<RawChunk>, query: &str) -> Vec<EvidenceChunk> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let query_terms = meaningful_terms(query);
    let docs: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.content)).collect();
    let n = docs.len() as f32;
    let avg_len: f32 = docs.iter().map(|d| d.len() as f32).sum::<f32>() / n;

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for term in &query_terms {
        let df = docs.iter().filter(|d| d.iter().any(|t| t == term)).count();
        doc_freq.insert(term.as_str(), df);
    }

    let raw_scores: Vec<f32> = docs
        .iter()
        .map(|doc| {
            let len = doc.len() as f32;
            query_terms
                .iter()
                .map(|term| {
                    let df = *doc_freq.get(term.as_str()).unwrap_or(&0) as f32;
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let tf = doc.iter().filter(|t| *t == term).count() as f32;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * len / avg_len.max(1.0)))
                })
                .sum::<f32>()
        })
        .collect();

    let max_score = raw_scores.iter().cloned().fold(0.0f32, f32::max);

    chunks
        .into_iter()
        .zip(raw_scores)
        .map(|(chunk, raw)| {
            let normalized = if max_score > 0.0 { raw / max_score } else { 0.0 };
            chunk.into_evidence(normalized)
        })
        .collect()
}

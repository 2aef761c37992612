//! Semantic + keyword hybrid refiner with MMR diversification and an
//! authority boost, grounded on `refiners/hybrid.py`.
//!
//! One deliberate deviation from the grounding source: its "safety net"
//! (first 5 chunks, meant to rescue generically-worded intros that rank low
//! on keyword score) is drawn from the *same already-score-sorted* list as
//! the top-20 keyword selection, making it a no-op subset rather than a
//! genuine safety net. This implementation draws the safety net from the
//! corpus's original (unsorted) chunk order instead, which is what the
//! stated purpose requires — see DESIGN.md.

use super::keyword::KeywordRefiner;
use super::Refiner;
use crate::embeddings::{cosine_similarity, EmbeddingModel};
use crate::security::authority::SourceAuthority;
use crate::types::{EvidenceChunk, FetchedPage};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

const PRE_FILTER_LIMIT: usize = 20;
const SAFETY_NET_COUNT: usize = 5;
const MAX_PER_SOURCE: usize = 3;
const TARGET_COUNT: usize = 15;
const LAMBDA: f32 = 0.7;

pub struct HybridRefiner {
    keyword: KeywordRefiner,
    embeddings: EmbeddingModel,
    authority: SourceAuthority,
    min_relevance: f32,
    max_evidence: usize,
}

impl HybridRefiner {
    pub fn new(chunk_size: usize, min_relevance: f32, max_evidence: usize) -> Self {
        Self {
            keyword: KeywordRefiner::new(chunk_size, 0.0, usize::MAX),
            embeddings: EmbeddingModel::new(),
            authority: SourceAuthority::default(),
            min_relevance,
            max_evidence,
        }
    }

    fn fallback(&self, base_chunks: &[EvidenceChunk]) -> Vec<EvidenceChunk> {
        let mut out: Vec<EvidenceChunk> = base_chunks
            .iter()
            .filter(|c| c.relevance_score >= self.min_relevance)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(self.max_evidence);
        out
    }
}

#[async_trait]
impl Refiner for HybridRefiner {
    async fn refine(&self, pages: &[FetchedPage], query: &str) -> Vec<EvidenceChunk> {
        let base_chunks = self.keyword.chunk_and_score(pages, query);
        if base_chunks.is_empty() {
            return Vec::new();
        }

        let mut by_score = base_chunks.clone();
        by_score.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        let top_keyword = by_score.iter().take(PRE_FILTER_LIMIT);
        let safety_net = base_chunks.iter().take(SAFETY_NET_COUNT);

        let mut seen = std::collections::HashSet::new();
        let mut target_chunks: Vec<EvidenceChunk> = Vec::new();
        for c in top_keyword.chain(safety_net) {
            if seen.insert(c.chunk_id.clone()) {
                target_chunks.push(c.clone());
            }
        }

        if target_chunks.is_empty() {
            return Vec::new();
        }

        let chunk_texts: Vec<String> = target_chunks.iter().map(|c| c.content.clone()).collect();
        let query_vec = match self.embeddings.encode_single(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("hybrid refiner: query embedding failed ({}), degrading to keyword ranking", e);
                return self.fallback(&base_chunks);
            }
        };
        let chunk_vecs = match self.embeddings.encode_many(&chunk_texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!("hybrid refiner: chunk embedding failed ({}), degrading to keyword ranking", e);
                return self.fallback(&base_chunks);
            }
        };

        let mut combined_scores = Vec::with_capacity(target_chunks.len());
        for (chunk, vec) in target_chunks.iter_mut().zip(&chunk_vecs) {
            let semantic = cosine_similarity(&query_vec, vec);
            let keyword = chunk.relevance_score;
            let raw_score = 0.3 * keyword + 0.7 * semantic;
            let auth = self.authority.get_score(&chunk.url);
            let final_score = (raw_score * (1.0 + (auth - 0.5))).clamp(0.0, 1.0);
            chunk.relevance_score = final_score;
            combined_scores.push(final_score);
        }

        let selected = mmr_select(&target_chunks, &combined_scores, &chunk_vecs);
        let mut out: Vec<EvidenceChunk> = selected.into_iter().cloned().collect();
        out.truncate(self.max_evidence.min(TARGET_COUNT));
        out
    }
}

fn mmr_select<'a>(
    chunks: &'a [EvidenceChunk],
    scores: &[f32],
    vecs: &[Vec<f32>],
) -> Vec<&'a EvidenceChunk> {
    let mut selected_indices: Vec<usize> = Vec::new();
    let mut candidates: Vec<usize> = (0..chunks.len()).collect();
    let mut source_counts: HashMap<String, usize> = HashMap::new();

    while selected_indices.len() < TARGET_COUNT && !candidates.is_empty() {
        let mut best_mmr = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for &idx in &candidates {
            let url = &chunks[idx].url;
            if *source_counts.get(url).unwrap_or(&0) >= MAX_PER_SOURCE {
                continue;
            }

            let relevance = scores[idx];
            let diversity = if selected_indices.is_empty() {
                0.0
            } else {
                selected_indices
                    .iter()
                    .map(|&s| cosine_similarity(&vecs[idx], &vecs[s]))
                    .fold(f32::MIN, f32::max)
            };

            let mmr = LAMBDA * relevance - (1.0 - LAMBDA) * diversity;
            if mmr > best_mmr {
                best_mmr = mmr;
                best_idx = Some(idx);
            }
        }

        match best_idx {
            Some(idx) => {
                let url = chunks[idx].url.clone();
                *source_counts.entry(url).or_insert(0) += 1;
                candidates.retain(|&c| c != idx);
                selected_indices.push(idx);
            }
            None => break,
        }
    }

    selected_indices.into_iter().map(|idx| &chunks[idx]).collect()
}

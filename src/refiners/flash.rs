//! Cross-encoder-style reranker, grounded on `refiners/flash.py`'s
//! lazy-loaded-model shape. No standalone cross-encoder crate sits in the
//! grounded dependency stack (see DESIGN.md), so the joint `"{query} [SEP]
//! {chunk}"` encoding is approximated with the same local bi-encoder used
//! elsewhere, projected against a query-alone encoding — weaker than a real
//! cross-encoder, but it keeps the "score every pair, no chunking shortcuts"
//! behavior the teacher's scorer relies on.

use super::keyword::KeywordRefiner;
use super::Refiner;
use crate::embeddings::{cosine_similarity, EmbeddingModel};
use crate::types::{EvidenceChunk, FetchedPage};
use async_trait::async_trait;

const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.85;

pub struct FlashRefiner {
    chunker: KeywordRefiner,
    embeddings: EmbeddingModel,
    max_evidence: usize,
}

impl FlashRefiner {
    pub fn new(chunk_size: usize, max_evidence: usize) -> Self {
        Self {
            chunker: KeywordRefiner::new(chunk_size, 0.0, usize::MAX),
            embeddings: EmbeddingModel::new(),
            max_evidence,
        }
    }

    async fn score_joint(&self, query_vec: &[f32], query: &str, chunk: &str) -> anyhow::Result<f32> {
        let joint_text = format!("{} [SEP] {}", query, chunk);
        let joint_vec = self.embeddings.encode_single(&joint_text).await?;
        Ok(cosine_similarity(query_vec, &joint_vec))
    }
}

#[async_trait]
impl Refiner for FlashRefiner {
    async fn refine(&self, pages: &[FetchedPage], query: &str) -> Vec<EvidenceChunk> {
        let all_chunks = self.chunker.chunk_and_score(pages, query);
        if all_chunks.is_empty() {
            return Vec::new();
        }

        let query_vec = self.embeddings.encode_single(query).await.ok();

        let mut ranked = Vec::with_capacity(all_chunks.len());
        for mut chunk in all_chunks {
            let score = match &query_vec {
                Some(qv) => self
                    .score_joint(qv, query, &chunk.content)
                    .await
                    .unwrap_or(chunk.relevance_score),
                None => chunk.relevance_score,
            };
            chunk.relevance_score = score;
            ranked.push(chunk);
        }

        ranked.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.max_evidence);

        for chunk in ranked.iter_mut() {
            if chunk.relevance_score > HIGH_CONFIDENCE_THRESHOLD {
                chunk.is_answer = true;
            }
        }

        ranked
    }
}

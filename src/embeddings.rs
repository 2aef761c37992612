//! Lazily-loaded local embedding model shared by the neural crawler and the
//! hybrid/flash refiners, grounded on the teacher's `MemoryManager` (model
//! load + dimension probe via `spawn_blocking`) and `nlp::semantic_shave`
//! (cosine similarity).

use model2vec_rs::model::StaticModel;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const DEFAULT_MODEL_ID: &str = "minishlab/potion-base-8M";
pub const ENV_MODEL_ID: &str = "MODEL2VEC_MODEL";

/// A bi-encoder, loaded once on first use and shared thereafter. Every
/// caller treats a load failure as "model unavailable" and falls back to
/// [`token_overlap_score`] rather than propagating the error up to the
/// pipeline.
pub struct EmbeddingModel {
    model_id: String,
    inner: OnceCell<Arc<StaticModel>>,
}

impl EmbeddingModel {
    pub fn new() -> Self {
        let model_id =
            std::env::var(ENV_MODEL_ID).unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self {
            model_id,
            inner: OnceCell::new(),
        }
    }

    async fn get(&self) -> anyhow::Result<Arc<StaticModel>> {
        self.inner
            .get_or_try_init(|| async {
                let model_id = self.model_id.clone();
                tokio::task::spawn_blocking(move || {
                    StaticModel::from_pretrained(&model_id, None, None, None)
                        .map(Arc::new)
                        .map_err(|e| anyhow::anyhow!("failed to load model2vec model: {}", e))
                })
                .await
                .map_err(|e| anyhow::anyhow!("model2vec load task panicked: {}", e))?
            })
            .await
            .map(Clone::clone)
    }

    pub async fn encode_single(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let model = self.get().await?;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.encode_single(&text))
            .await
            .map_err(|e| anyhow::anyhow!("embedding task panicked: {}", e))
    }

    pub async fn encode_many(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let model = self.get().await?;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts.iter().map(|t| model.encode_single(t)).collect()
        })
        .await
        .map_err(|e| anyhow::anyhow!("embedding task panicked: {}", e))
    }
}

impl Default for EmbeddingModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity between two vectors; zero for mismatched or
/// zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Keyword-overlap fallback used whenever the embedding model fails to
/// load: fraction of query terms present in `text`.
pub fn token_overlap_score(query: &str, text: &str) -> f32 {
    let query_terms: std::collections::HashSet<&str> =
        query.to_lowercase().split_whitespace().collect::<Vec<_>>().into_iter().collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let matches = query_terms
        .iter()
        .filter(|t| text_lower.contains(**t))
        .count();
    matches as f32 / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn token_overlap_score_counts_shared_terms() {
        let score = token_overlap_score("rust async runtime", "an async runtime for rust");
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn token_overlap_score_is_zero_for_disjoint_text() {
        let score = token_overlap_score("rust async runtime", "baking bread recipes");
        assert_eq!(score, 0.0);
    }
}

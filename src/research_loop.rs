//! The adaptive multi-round research loop: run the pipeline, check whether
//! the accumulated evidence is sufficient, and either stop or replan
//! around newly-discovered blocked domains. Grounded on `core/loop.py`.

use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineContext};
use crate::synthesizer::Synthesizer;
use crate::types::{EvidenceChunk, PipelineOutput, Query};
use std::collections::HashSet;
use tracing::info;

const SUFFICIENCY_RELEVANCE_THRESHOLD: f32 = 0.4;
const SUFFICIENCY_COUNT: usize = 3;

pub struct ResearchLoop {
    pipeline: Pipeline,
    synthesizer: Synthesizer,
    max_depth: u8,
}

impl ResearchLoop {
    pub fn new(pipeline: Pipeline, synthesizer: Synthesizer, max_depth: u8) -> Self {
        Self {
            pipeline,
            synthesizer,
            max_depth,
        }
    }

    pub fn from_config(
        config: &Config,
        client: reqwest::Client,
        cache: std::sync::Arc<dyn crate::cache::PageCache>,
        llm: crate::config::LlmFileConfig,
    ) -> Self {
        let max_depth = config.max_depth;
        let pipeline = Pipeline::new(config.clone(), client.clone(), cache, llm.clone());
        let synthesizer = Synthesizer::new(client, llm, config.max_context_tokens, config.max_evidence);
        Self::new(pipeline, synthesizer, max_depth)
    }

    pub async fn run(&self, query: &Query) -> PipelineOutput {
        let mut accumulated_blocked: Vec<String> = Vec::new();
        let mut seen_blocked: HashSet<String> = HashSet::new();
        let mut accumulated_evidence: Vec<EvidenceChunk> = Vec::new();
        let mut final_output = PipelineOutput::new(query.text.clone());

        for depth in 1..=self.max_depth {
            let context = PipelineContext {
                blocked_domains: accumulated_blocked.clone(),
            };
            let round = self.pipeline.run(query, &context).await;

            final_output
                .trace
                .insert(format!("round_{depth}"), round.trace.get("elapsed_ms").cloned().unwrap_or_default());
            final_output.sub_queries = round.sub_queries.clone();
            final_output.results.extend(round.results.clone());
            final_output.pages.extend(round.pages.clone());
            accumulated_evidence.extend(round.evidence.clone());

            for domain in &round.blocked_domains {
                if seen_blocked.insert(domain.clone()) {
                    accumulated_blocked.push(domain.clone());
                }
            }

            let sufficient = is_sufficient(&accumulated_evidence);

            info!(
                "research loop round {}: {} evidence chunks accumulated, sufficient={}",
                depth,
                accumulated_evidence.len(),
                sufficient
            );

            if sufficient {
                break;
            }
        }

        final_output.evidence = accumulated_evidence;
        final_output.blocked_domains = accumulated_blocked;

        final_output.answer = Some(if final_output.evidence.is_empty() {
            "No sufficient evidence found to answer the query.".to_string()
        } else {
            self.synthesizer
                .synthesize(&query.text, &final_output.evidence)
                .await
        });

        final_output
    }
}

/// The sufficiency test that ends a research loop early: at least
/// [`SUFFICIENCY_COUNT`] chunks scoring above the relevance threshold.
fn is_sufficient(evidence: &[EvidenceChunk]) -> bool {
    evidence
        .iter()
        .filter(|c| c.relevance_score > SUFFICIENCY_RELEVANCE_THRESHOLD)
        .count()
        >= SUFFICIENCY_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(score: f32) -> EvidenceChunk {
        EvidenceChunk {
            url: "http://a.com".to_string(),
            chunk_id: "id".to_string(),
            content: "content".to_string(),
            relevance_score: score,
            title: None,
            is_answer: false,
        }
    }

    #[test]
    fn insufficient_below_three_strong_chunks() {
        let evidence = vec![chunk(0.9), chunk(0.5)];
        assert!(!is_sufficient(&evidence));
    }

    #[test]
    fn sufficient_once_three_chunks_clear_the_threshold() {
        let evidence = vec![chunk(0.9), chunk(0.5), chunk(0.41), chunk(0.1)];
        assert!(is_sufficient(&evidence));
    }

    #[test]
    fn chunks_at_exactly_the_threshold_do_not_count() {
        let evidence = vec![chunk(0.4), chunk(0.4), chunk(0.4)];
        assert!(!is_sufficient(&evidence));
    }

    #[tokio::test]
    async fn from_config_wires_max_depth_from_config() {
        let config = Config::for_mode(crate::config::Mode::Turbo);
        let expected_depth = config.max_depth;
        let client = reqwest::Client::new();
        let cache: std::sync::Arc<dyn crate::cache::PageCache> =
            std::sync::Arc::new(crate::cache::MokaPageCache::default());
        let research_loop = ResearchLoop::from_config(
            &config,
            client,
            cache,
            crate::config::LlmFileConfig::default(),
        );
        assert_eq!(research_loop.max_depth, expected_depth);
    }
}

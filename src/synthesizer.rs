//! LLM answer synthesis over evidence chunks, grounded on
//! `core/synthesizer.py`: pack numbered, citable sources into a character
//! budget, then ask for an evidence-only, `[n]`-cited answer.

use crate::config::LlmFileConfig;
use crate::types::EvidenceChunk;
use serde_json::json;

const PROMPT_OVERHEAD_CHARS: usize = 500;
const CHARS_PER_TOKEN: usize = 3;

pub struct Synthesizer {
    client: reqwest::Client,
    llm: LlmFileConfig,
    max_context_tokens: usize,
    max_evidence: usize,
}

impl Synthesizer {
    pub fn new(
        client: reqwest::Client,
        llm: LlmFileConfig,
        max_context_tokens: usize,
        max_evidence: usize,
    ) -> Self {
        Self {
            client,
            llm,
            max_context_tokens,
            max_evidence,
        }
    }

    pub async fn synthesize(&self, query: &str, evidence: &[EvidenceChunk]) -> String {
        if !self.llm.is_configured() {
            return "LLM not configured. Unable to synthesize answer.".to_string();
        }
        if evidence.is_empty() {
            return "No evidence found to answer the query.".to_string();
        }

        let context_text = self.build_context(evidence);

        let system_prompt = "You are a helpful research assistant. Your task is to answer \
            the user's query using ONLY the provided context. Cite your sources using \
            [1], [2] notation corresponding to the source numbers provided. If the \
            context is insufficient, state that clearly.";
        let user_prompt = format!("Query: {query}\n\nContext:\n{context_text}\n\nAnswer:");

        match self.call_llm(system_prompt, &user_prompt).await {
            Ok(answer) => answer,
            Err(e) => format!("Error synthesizing answer: {}", e),
        }
    }

    /// Pack `Source [n] (url):\ncontent\n\n` blocks until the character
    /// budget or `max_evidence` runs out, truncating (never dropping) the
    /// first chunk if even it alone would overflow the budget.
    fn build_context(&self, evidence: &[EvidenceChunk]) -> String {
        let available_chars = (self.max_context_tokens * CHARS_PER_TOKEN)
            .saturating_sub(PROMPT_OVERHEAD_CHARS);

        let mut context = String::new();
        let mut used_chars = 0usize;
        let mut used_count = 0usize;

        for (i, chunk) in evidence.iter().enumerate() {
            let formatted = format!("Source [{}] ({}):\n{}\n\n", i + 1, chunk.url, chunk.content);
            if used_chars + formatted.len() > available_chars {
                if used_count == 0 {
                    let safe_len = available_chars.saturating_sub(100);
                    if safe_len > 100 {
                        let truncated: String = chunk.content.chars().take(safe_len).collect();
                        context.push_str(&format!(
                            "Source [{}] ({}):\n{}...(truncated)\n\n",
                            i + 1,
                            chunk.url,
                            truncated
                        ));
                        used_count += 1;
                    }
                }
                break;
            }

            context.push_str(&formatted);
            used_chars += formatted.len();
            used_count += 1;

            if used_count >= self.max_evidence {
                break;
            }
        }

        context
    }

    async fn call_llm(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        let base_url = self.llm.resolve_base_url();
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&json!({
            "model": self.llm.resolve_model(),
            "temperature": 0.3,
            "max_tokens": self.llm.resolve_max_tokens(),
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        }));
        if let Some(key) = self.llm.resolve_api_key() {
            if !key.is_empty() {
                req = req.bearer_auth(key);
            }
        }

        let resp = req.send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let content = body["choices"][0]["message"]["content"].as_str();
        Ok(content
            .filter(|c| !c.is_empty())
            .unwrap_or("Error: Empty response from LLM.")
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(url: &str, content: &str) -> EvidenceChunk {
        EvidenceChunk {
            url: url.to_string(),
            chunk_id: "id".to_string(),
            content: content.to_string(),
            relevance_score: 0.9,
            title: None,
            is_answer: false,
        }
    }

    fn synth(max_context_tokens: usize, max_evidence: usize) -> Synthesizer {
        Synthesizer::new(
            reqwest::Client::new(),
            LlmFileConfig::default(),
            max_context_tokens,
            max_evidence,
        )
    }

    #[tokio::test]
    async fn synthesize_reports_unconfigured_llm() {
        let s = synth(4000, 10);
        let out = s.synthesize("q", &[chunk("http://a.com", "text")]).await;
        assert_eq!(out, "LLM not configured. Unable to synthesize answer.");
    }

    #[tokio::test]
    async fn synthesize_reports_no_evidence() {
        let s = synth(4000, 10);
        let out = s.synthesize("q", &[]).await;
        assert_eq!(out, "No evidence found to answer the query.");
    }

    #[test]
    fn build_context_numbers_sources_in_order() {
        let s = synth(4000, 10);
        let context = s.build_context(&[chunk("http://a.com", "alpha"), chunk("http://b.com", "beta")]);
        assert!(context.contains("Source [1] (http://a.com):\nalpha"));
        assert!(context.contains("Source [2] (http://b.com):\nbeta"));
    }

    #[test]
    fn build_context_stops_at_max_evidence() {
        let s = synth(4000, 1);
        let context = s.build_context(&[chunk("http://a.com", "alpha"), chunk("http://b.com", "beta")]);
        assert!(context.contains("alpha"));
        assert!(!context.contains("beta"));
    }

    #[test]
    fn build_context_truncates_oversize_first_chunk_instead_of_dropping() {
        let s = synth(10, 10);
        let big = "x".repeat(500);
        let context = s.build_context(&[chunk("http://a.com", &big)]);
        assert!(context.contains("(truncated)"));
    }
}

//! LLM-driven query decomposition, grounded on `core/planner.py`: ask a
//! chat-completion endpoint for a handful of distinct sub-queries, with a
//! passthrough fallback when no endpoint is configured or the call fails.

use crate::config::LlmFileConfig;
use crate::types::{Query, SubQuery};
use serde_json::json;

const MAX_SUB_QUERIES: usize = 3;

pub struct Planner {
    client: reqwest::Client,
    llm: LlmFileConfig,
}

impl Planner {
    pub fn new(client: reqwest::Client, llm: LlmFileConfig) -> Self {
        Self { client, llm }
    }

    /// Decompose `query` into at most [`MAX_SUB_QUERIES`] sub-queries.
    /// `blocked_domains` (when non-empty) steers the prompt toward "proxy
    /// queries" that target sources other than the blocked ones.
    pub async fn plan(&self, query: &Query, blocked_domains: &[String]) -> Vec<SubQuery> {
        if !self.llm.is_configured() {
            return vec![SubQuery::identity(query)];
        }

        match self.generate_queries(&query.text, blocked_domains).await {
            Ok(texts) if !texts.is_empty() => texts.into_iter().map(SubQuery::new).collect(),
            Ok(_) => vec![SubQuery::identity(query)],
            Err(e) => {
                tracing::warn!("planner LLM call failed: {}", e);
                vec![SubQuery::identity(query)]
            }
        }
    }

    async fn generate_queries(
        &self,
        query: &str,
        blocked_domains: &[String],
    ) -> anyhow::Result<Vec<String>> {
        let mut system_prompt = String::from(
            "You are an expert search query planner. Your goal is to decompose \
             the user's complex question into 3 DISTINCT sub-queries that cover \
             different aspects of the topic.\n",
        );

        if blocked_domains.is_empty() {
            system_prompt.push_str(
                "Avoid synonyms. Each query must target a unique angle to maximize \
                 information coverage.",
            );
        } else {
            let blocked = blocked_domains.join(", ");
            system_prompt.push_str(&format!(
                "\nCRITICAL CONTEXT: the following domains are BLOCKED and cannot be \
                 accessed: {blocked}.\nYou MUST generate \"proxy queries\" targeting \
                 unblocked sources — aggregators, discussion summaries elsewhere, or \
                 alternative sites that reference the blocked content."
            ));
        }
        system_prompt.push_str(
            "\nReturn ONLY a JSON list of strings. Example: [\"query A\", \"query B\"]",
        );

        let user_content = format!("Question: {query}\nGenerate queries:");

        let base_url = self.llm.resolve_base_url();
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&json!({
            "model": self.llm.resolve_model(),
            "temperature": 0.3,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_content},
            ],
        }));
        if let Some(key) = self.llm.resolve_api_key() {
            if !key.is_empty() {
                req = req.bearer_auth(key);
            }
        }

        let resp = req.send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        Ok(parse_sub_queries(content, query))
    }
}

/// JSON array first, then line-split with bullet/quote trimming, then the
/// original query as a last resort.
fn parse_sub_queries(content: &str, original_query: &str) -> Vec<String> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(content)
    {
        let queries: Vec<String> = items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        if !queries.is_empty() {
            return queries.into_iter().take(MAX_SUB_QUERIES).collect();
        }
    }

    let lines: Vec<String> = content
        .lines()
        .map(|l| l.trim().trim_start_matches(['-', '*']).trim().trim_matches('"').to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if !lines.is_empty() {
        return lines.into_iter().take(MAX_SUB_QUERIES).collect();
    }

    vec![original_query.to_string()]
}

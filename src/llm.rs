//! LLM Client
//!
//! Minimal OpenAI-compatible chat-completions client. Ollama exposes the same
//! API under `/v1`, which is the default endpoint.

use crate::config::LlmConfig;
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use tracing::debug;

/// Text-in, text-out model capability used by the model-backed collaborators.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn call_llm(&self, system: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let mut request = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChatError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Llm(format!(
                "LLM API returned {}: {}",
                status,
                text.trim()
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ChatError::Llm("No content in LLM response".to_string()))?;

        debug!("LLM returned {} chars", content.len());
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.call_llm(system, prompt).await
    }
}

/// Strip Markdown fences and a leading `SQL:` label from a model answer.
/// Returns `None` when nothing usable remains or the model declined with `ERROR:`.
pub fn clean_sql_response(raw: &str) -> Option<String> {
    let mut text = raw.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after
            .strip_prefix("sql")
            .or_else(|| after.strip_prefix("SQL"))
            .unwrap_or(after);
        text = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }

    let mut text = text.trim();
    if text.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("sql:")) {
        text = text[4..].trim();
    }

    if text.is_empty() || text.to_uppercase().starts_with("ERROR:") {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_fences() {
        let raw = "Here you go:\n```sql\nSELECT * FROM products;\n```\nThanks";
        assert_eq!(clean_sql_response(raw).as_deref(), Some("SELECT * FROM products;"));
        assert_eq!(
            clean_sql_response("```\nSELECT 1\n```").as_deref(),
            Some("SELECT 1")
        );
    }

    #[test]
    fn test_clean_strips_label() {
        assert_eq!(
            clean_sql_response("SQL: SELECT name FROM products").as_deref(),
            Some("SELECT name FROM products")
        );
    }

    #[test]
    fn test_clean_declines() {
        assert_eq!(clean_sql_response("ERROR: cannot answer from this schema"), None);
        assert_eq!(clean_sql_response("   "), None);
        assert_eq!(clean_sql_response("``````"), None);
    }
}

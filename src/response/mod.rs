//! Response Synthesis
//!
//! Turns a result set into a conversational answer. Failures here never end a
//! turn: the orchestrator falls back to [`fallback_response`].

pub mod summary;

pub use summary::{display_message, fallback_response, render_table, summarize, MAX_ROWS_DISPLAY};

use crate::db::ResultSet;
use crate::error::{ChatError, Result};
use crate::llm::LanguageModel;
use crate::prompts::{response_prompt, RESPONSE_SYSTEM};
use crate::session::Message;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ResponseSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        query: &str,
        result: &ResultSet,
        sql: Option<&str>,
        history: &[Message],
    ) -> Result<String>;
}

pub struct LlmResponseSynthesizer {
    model: Arc<dyn LanguageModel>,
}

impl LlmResponseSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ResponseSynthesizer for LlmResponseSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        result: &ResultSet,
        sql: Option<&str>,
        history: &[Message],
    ) -> Result<String> {
        let prompt = response_prompt(query, result, sql, history);
        let answer = self.model.complete(RESPONSE_SYSTEM, &prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ChatError::Llm("Empty response from model".to_string()));
        }
        Ok(answer.to_string())
    }
}

/// Deterministic synthesizer built from [`summarize`]; needs no model.
pub struct SummarySynthesizer;

#[async_trait]
impl ResponseSynthesizer for SummarySynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        result: &ResultSet,
        _sql: Option<&str>,
        _history: &[Message],
    ) -> Result<String> {
        Ok(summarize(query, result))
    }
}

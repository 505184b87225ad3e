//! Configuration
//!
//! Environment-driven settings for the database connection, the LLM endpoint
//! and the workflow retry/timeout budget.

use crate::error::{ChatError, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RESULT_ROWS: usize = 1000;
pub const DEFAULT_MAX_RESULT_COLUMNS: usize = 50;

/// Budget and limits for one orchestrator run.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Total repair iterations allowed per turn, shared by validation and execution repair.
    pub max_retries: u32,
    /// Applied to every collaborator call (classification, generation, execution, synthesis).
    pub call_timeout: Duration,
    pub max_result_rows: usize,
    pub max_result_columns: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
            max_result_columns: DEFAULT_MAX_RESULT_COLUMNS,
        }
    }
}

impl WorkflowConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// OpenAI-compatible chat completion endpoint (Ollama exposes one under `/v1`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub db_schema: String,
    pub llm: LlmConfig,
    pub workflow: WorkflowConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_schema: "public".to_string(),
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm = LlmConfig {
            base_url: non_empty("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            model: non_empty("LLM_MODEL").unwrap_or(defaults.llm.model),
            api_key: non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")),
            temperature: defaults.llm.temperature,
            max_tokens: defaults.llm.max_tokens,
        };

        let workflow = WorkflowConfig {
            max_retries: parse_var(&non_empty, "DBCHAT_MAX_RETRIES")?
                .unwrap_or(defaults.workflow.max_retries),
            call_timeout: parse_var::<u64, _>(&non_empty, "DBCHAT_CALL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.workflow.call_timeout),
            max_result_rows: parse_var(&non_empty, "DBCHAT_MAX_RESULT_ROWS")?
                .unwrap_or(defaults.workflow.max_result_rows),
            max_result_columns: parse_var(&non_empty, "DBCHAT_MAX_RESULT_COLUMNS")?
                .unwrap_or(defaults.workflow.max_result_columns),
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            db_schema: non_empty("DBCHAT_SCHEMA").unwrap_or(defaults.db_schema),
            llm,
            workflow,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ChatError::Config("DATABASE_URL is not set".to_string()))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ChatError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(None),
    }
}

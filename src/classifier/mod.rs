//! Query Classification
//!
//! Decides whether an utterance needs SQL at all. Model-backed classification
//! is optional; the keyword heuristic is always available as a fallback.

pub mod heuristic;
pub mod llm;
pub mod replies;

pub use heuristic::{heuristic_kind, is_greeting, KeywordClassifier};
pub use llm::LlmClassifier;
pub use replies::canned_reply;

use crate::error::Result;
use crate::schema::SchemaDescriptor;
use crate::session::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    #[default]
    Unclassified,
    Greeting,
    GeneralQuestion,
    SqlQuery,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryKind::Unclassified => "unclassified",
            QueryKind::Greeting => "greeting",
            QueryKind::GeneralQuestion => "general question",
            QueryKind::SqlQuery => "SQL query",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub needs_sql: bool,
    pub reasoning: String,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        query: &str,
        schema: Option<&SchemaDescriptor>,
        history: &[Message],
    ) -> Result<Classification>;
}

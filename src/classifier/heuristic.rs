//! Keyword heuristic used when no model-backed classifier is configured or it fails.

use crate::classifier::{Classification, Classifier, QueryKind};
use crate::error::Result;
use crate::schema::SchemaDescriptor;
use crate::session::Message;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GREETING_RE: Regex = Regex::new(
        r"(?i)\b(hi|hello|hey|greetings|good morning|good afternoon|good evening|how are you|what'?s up|nice to meet you)\b"
    )
    .unwrap();
    static ref SQL_KEYWORD_RE: Regex = Regex::new(
        r"(?i)\b(show|list|find|get|count|how many|what are|which|select|display)\b"
    )
    .unwrap();
}

/// Deterministic and total: every input maps to exactly one kind.
pub fn heuristic_kind(query: &str) -> QueryKind {
    if GREETING_RE.is_match(query) {
        QueryKind::Greeting
    } else if SQL_KEYWORD_RE.is_match(query) {
        QueryKind::SqlQuery
    } else {
        QueryKind::GeneralQuestion
    }
}

pub fn is_greeting(query: &str) -> bool {
    GREETING_RE.is_match(query)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(
        &self,
        query: &str,
        _schema: Option<&SchemaDescriptor>,
        _history: &[Message],
    ) -> Result<Classification> {
        let kind = heuristic_kind(query);
        Ok(Classification {
            needs_sql: kind == QueryKind::SqlQuery,
            reasoning: format!("Keyword heuristic classified query as {}", kind),
        })
    }
}

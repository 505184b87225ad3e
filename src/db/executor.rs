//! Query execution contract.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw executor output. `columns == None` means the statement produced no
/// result set at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: Some(columns),
            rows,
        }
    }
}

/// A well-formed result after output guardrails have been applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Row count before truncation.
    pub total_rows: usize,
    pub truncated: bool,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs one statement atomically: either a complete result or an error.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryOutput>;
}

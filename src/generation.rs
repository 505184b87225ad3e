//! SQL Generation
//!
//! The orchestrator treats generation as an opaque, fallible text function.
//! `Ok(None)` means the generator could not produce anything usable.

use crate::error::{ErrorDetail, Result};
use crate::llm::{clean_sql_response, LanguageModel};
use crate::prompts::{generation_prompt, SQL_SYSTEM};
use crate::schema::SchemaDescriptor;
use crate::session::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// The failing statement and the error it produced, handed back for repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairContext {
    pub failed_sql: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    pub schema: &'a SchemaDescriptor,
    pub history: &'a [Message],
    pub repair: Option<&'a RepairContext>,
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Option<String>>;
}

pub struct LlmSqlGenerator {
    model: Arc<dyn LanguageModel>,
}

impl LlmSqlGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl SqlGenerator for LlmSqlGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Option<String>> {
        let prompt = generation_prompt(
            request.query,
            request.schema,
            request.history,
            request.repair,
        );
        let raw = self.model.complete(SQL_SYSTEM, &prompt).await?;

        match clean_sql_response(&raw) {
            Some(sql) => {
                info!(
                    "Generated SQL{}: {}",
                    if request.repair.is_some() { " (repair)" } else { "" },
                    sql
                );
                Ok(Some(sql))
            }
            None => {
                warn!("Model declined to generate SQL: {}", raw.trim());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{Column, Table};
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![
            Table::new("products").column(Column::new("id", "integer", false))
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_cleans_model_output() {
        let model = Arc::new(ScriptedModel {
            reply: "```sql\nSELECT * FROM products;\n```".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let generator = LlmSqlGenerator::new(model);
        let schema = schema();
        let sql = generator
            .generate(GenerationRequest {
                query: "show products",
                schema: &schema,
                history: &[],
                repair: None,
            })
            .await
            .unwrap();
        assert_eq!(sql.as_deref(), Some("SELECT * FROM products;"));
    }

    #[tokio::test]
    async fn test_declined_generation_is_none() {
        let model = Arc::new(ScriptedModel {
            reply: "ERROR: no such data".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let generator = LlmSqlGenerator::new(model.clone());
        let schema = schema();
        let repair = RepairContext {
            failed_sql: "SELECT x FROM products".to_string(),
            error: ErrorDetail::new(ErrorKind::ExecutionFailure, "column x does not exist"),
        };
        let sql = generator
            .generate(GenerationRequest {
                query: "show products",
                schema: &schema,
                history: &[],
                repair: Some(&repair),
            })
            .await
            .unwrap();
        assert!(sql.is_none());
        assert!(model.prompts.lock().unwrap()[0].contains("column x does not exist"));
    }
}

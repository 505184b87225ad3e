//! Model-backed YES/NO classifier.

use crate::classifier::{Classification, Classifier};
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::prompts::{classification_prompt, CLASSIFIER_SYSTEM};
use crate::schema::SchemaDescriptor;
use crate::session::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct LlmClassifier {
    model: Arc<dyn LanguageModel>,
}

impl LlmClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        query: &str,
        schema: Option<&SchemaDescriptor>,
        _history: &[Message],
    ) -> Result<Classification> {
        let prompt = classification_prompt(query, schema);
        let answer = self.model.complete(CLASSIFIER_SYSTEM, &prompt).await?;
        let needs_sql = answer.to_uppercase().contains("YES");
        info!("Query classification: needs_sql={}", needs_sql);

        Ok(Classification {
            needs_sql,
            reasoning: if needs_sql {
                "Query requires database access".to_string()
            } else {
                "Query does not require database access".to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_yes_no_answers() {
        let yes = LlmClassifier::new(Arc::new(Fixed(" yes.")));
        assert!(yes.classify("show products", None, &[]).await.unwrap().needs_sql);

        let no = LlmClassifier::new(Arc::new(Fixed("NO")));
        assert!(!no.classify("hello", None, &[]).await.unwrap().needs_sql);
    }
}

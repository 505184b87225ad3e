//! Workflow Orchestrator
//!
//! Bounded-retry state machine: Classify, RetrieveSchema, GenerateSql, then
//! a Validate/Execute loop with a Repair stage fed by either failure, and
//! finally Respond. One shared retry budget covers both repair paths, and
//! every candidate (repaired or not) passes Validate before Execute.

use crate::classifier::{canned_reply, heuristic_kind, is_greeting, Classifier, QueryKind};
use crate::config::WorkflowConfig;
use crate::db::Executor;
use crate::error::{ChatError, ErrorDetail, ErrorKind, Result};
use crate::generation::{GenerationRequest, RepairContext, SqlGenerator};
use crate::guardrails::{OutputGuardrails, SafetyValidator};
use crate::response::{fallback_response, ResponseSynthesizer};
use crate::schema::{SchemaDescriptor, SchemaProvider};
use crate::session::Message;
use crate::workflow::cancel::CancellationToken;
use crate::workflow::state::WorkflowState;
use crate::workflow::steps::StageName;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const SCHEMA_UNAVAILABLE_REPLY: &str =
    "Failed to retrieve database schema. Please check your connection.";
pub const GENERATION_FAILED_REPLY: &str =
    "I couldn't generate a SQL query for your question. Please try rephrasing it.";
pub const CANCELLED_REPLY: &str = "The request was cancelled before it completed.";

/// Per-invocation overrides of the orchestrator's configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub max_retries: Option<u32>,
    pub call_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Classify,
    RetrieveSchema,
    GenerateSql,
    Validate,
    Execute,
    Repair,
    Respond,
    Done,
}

impl Stage {
    fn name(&self) -> Option<StageName> {
        match self {
            Stage::Classify => Some(StageName::Classify),
            Stage::RetrieveSchema => Some(StageName::RetrieveSchema),
            Stage::GenerateSql => Some(StageName::GenerateSql),
            Stage::Validate => Some(StageName::ValidateSql),
            Stage::Execute => Some(StageName::ExecuteSql),
            Stage::Repair => Some(StageName::RepairSql),
            Stage::Respond => Some(StageName::Respond),
            Stage::Done => None,
        }
    }
}

struct RunContext<'a> {
    history: &'a [Message],
    call_timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl RunContext<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Wrap a collaborator call in the caller-supplied timeout. A timeout is
/// reported as an ordinary error for the stage.
async fn with_timeout<T, F>(limit: Duration, what: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout(format!(
            "{} did not finish within {:?}",
            what, limit
        ))),
    }
}

fn exhausted_reply(error: &ErrorDetail, retry_count: u32) -> String {
    match error.kind {
        ErrorKind::ValidationFailure => format!(
            "SQL validation failed after {} repair attempt(s): {}",
            retry_count, error.message
        ),
        _ => format!(
            "Query execution failed after {} repair attempt(s). Error: {}",
            retry_count, error.message
        ),
    }
}

fn preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 80 {
        format!("{}...", flat.chars().take(80).collect::<String>())
    } else {
        flat
    }
}

pub struct WorkflowOrchestrator {
    classifier: Option<Arc<dyn Classifier>>,
    schema_provider: Arc<dyn SchemaProvider>,
    generator: Arc<dyn SqlGenerator>,
    executor: Arc<dyn Executor>,
    synthesizer: Option<Arc<dyn ResponseSynthesizer>>,
    validator: SafetyValidator,
    output_guardrails: OutputGuardrails,
    config: WorkflowConfig,
}

impl WorkflowOrchestrator {
    pub fn new(
        schema_provider: Arc<dyn SchemaProvider>,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let config = WorkflowConfig::default();
        Self {
            classifier: None,
            schema_provider,
            generator,
            executor,
            synthesizer: None,
            validator: SafetyValidator::new(),
            output_guardrails: OutputGuardrails::from_config(&config),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ResponseSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.output_guardrails = OutputGuardrails::from_config(&config);
        self.config = config;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run one turn with the configured budget. Always returns a terminal state.
    pub async fn run(
        &self,
        user_query: &str,
        schema_override: Option<Arc<SchemaDescriptor>>,
        history: &[Message],
    ) -> WorkflowState {
        self.run_with_options(user_query, schema_override, history, RunOptions::default())
            .await
    }

    pub async fn run_with_options(
        &self,
        user_query: &str,
        schema_override: Option<Arc<SchemaDescriptor>>,
        history: &[Message],
        options: RunOptions,
    ) -> WorkflowState {
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let ctx = RunContext {
            history,
            call_timeout: options.call_timeout.unwrap_or(self.config.call_timeout),
            cancel: options.cancel,
        };

        let mut state = WorkflowState::new(user_query, max_retries);
        info!(
            run_id = %state.run_id(),
            "Starting workflow (max_retries={}): {}",
            max_retries,
            user_query
        );

        // An empty override carries no structure; fall back to the provider.
        if let Some(schema) = schema_override.filter(|s| !s.is_empty()) {
            state.set_schema(schema);
        }

        let mut stage = Stage::Classify;
        while let Some(name) = stage.name() {
            if ctx.is_cancelled() {
                self.cancel_run(&mut state, name);
                break;
            }
            stage = match stage {
                Stage::Classify => self.classify(&mut state, &ctx).await,
                Stage::RetrieveSchema => self.retrieve_schema(&mut state, &ctx).await,
                Stage::GenerateSql => self.generate(&mut state, &ctx).await,
                Stage::Validate => self.validate(&mut state),
                Stage::Execute => self.execute(&mut state, &ctx).await,
                Stage::Repair => self.repair(&mut state, &ctx).await,
                Stage::Respond => self.respond(&mut state, &ctx).await,
                Stage::Done => Stage::Done,
            };
        }

        info!(
            run_id = %state.run_id(),
            "Workflow finished: {} step(s), {} repair(s), error={}",
            state.steps().len(),
            state.retry_count(),
            state
                .terminal_error()
                .map(|e| e.kind.as_str())
                .unwrap_or("none")
        );
        state
    }

    fn cancel_run(&self, state: &mut WorkflowState, stage: StageName) {
        let detail = ErrorDetail::new(
            ErrorKind::Cancelled,
            format!("Cancelled before stage '{}'", stage.label()),
        );
        state.log().failed(stage, detail.to_string());
        state.fail(detail, CANCELLED_REPLY);
    }

    fn terminate(
        &self,
        state: &mut WorkflowState,
        stage: StageName,
        error: ErrorDetail,
        reply: impl Into<String>,
    ) -> Stage {
        state.log().failed(stage, error.to_string());
        state.fail(error, reply);
        Stage::Done
    }

    async fn classify(&self, state: &mut WorkflowState, ctx: &RunContext<'_>) -> Stage {
        state.log().started(StageName::Classify, "Checking query type");
        let query = state.user_query().to_string();

        let kind = match &self.classifier {
            Some(classifier) => {
                // Classify runs before RetrieveSchema, so only an in-memory snapshot is used here.
                let schema = state
                    .schema()
                    .cloned()
                    .or_else(|| self.schema_provider.cached());
                let outcome = with_timeout(
                    ctx.call_timeout,
                    "classification",
                    classifier.classify(&query, schema.as_deref(), ctx.history),
                )
                .await;
                match outcome {
                    Ok(classification) => {
                        let kind = if classification.needs_sql {
                            QueryKind::SqlQuery
                        } else if is_greeting(&query) {
                            QueryKind::Greeting
                        } else {
                            QueryKind::GeneralQuestion
                        };
                        state.log().completed(
                            StageName::Classify,
                            format!("Classified as {}: {}", kind, classification.reasoning),
                        );
                        kind
                    }
                    Err(e) => {
                        let error = ErrorDetail::from_error(ErrorKind::ClassificationFailure, &e);
                        warn!("Classifier failed, using keyword heuristic: {}", e);
                        state.log().failed(StageName::Classify, error.to_string());
                        let kind = heuristic_kind(&query);
                        state.log().completed(
                            StageName::Classify,
                            format!("Classified as {} by keyword heuristic", kind),
                        );
                        kind
                    }
                }
            }
            None => {
                let kind = heuristic_kind(&query);
                state.log().completed(
                    StageName::Classify,
                    format!("Classified as {} by keyword heuristic", kind),
                );
                kind
            }
        };

        state.query_kind = kind;
        match canned_reply(kind, &query) {
            Some(reply) => {
                state.finish(reply);
                Stage::Done
            }
            None => Stage::RetrieveSchema,
        }
    }

    async fn retrieve_schema(&self, state: &mut WorkflowState, ctx: &RunContext<'_>) -> Stage {
        state.log().started(StageName::RetrieveSchema, "Loading schema context");

        if let Some(schema) = state.schema() {
            let detail = format!("Using supplied schema with {} table(s)", schema.table_count());
            state.log().completed(StageName::RetrieveSchema, detail);
            return Stage::GenerateSql;
        }

        let fetched = with_timeout(
            ctx.call_timeout,
            "schema retrieval",
            self.schema_provider.fetch(),
        )
        .await;
        match fetched {
            Ok(Some(schema)) if !schema.is_empty() => {
                let detail = format!("Loaded schema with {} table(s)", schema.table_count());
                state.set_schema(schema);
                state.log().completed(StageName::RetrieveSchema, detail);
                Stage::GenerateSql
            }
            Ok(_) => self.terminate(
                state,
                StageName::RetrieveSchema,
                ErrorDetail::new(
                    ErrorKind::SchemaUnavailable,
                    "Schema provider returned no tables",
                ),
                SCHEMA_UNAVAILABLE_REPLY,
            ),
            Err(e) => self.terminate(
                state,
                StageName::RetrieveSchema,
                ErrorDetail::from_error(ErrorKind::SchemaUnavailable, &e),
                SCHEMA_UNAVAILABLE_REPLY,
            ),
        }
    }

    async fn generate(&self, state: &mut WorkflowState, ctx: &RunContext<'_>) -> Stage {
        state.log().started(StageName::GenerateSql, "Generating SQL from question");

        let Some(schema) = state.schema().cloned() else {
            return self.terminate(
                state,
                StageName::GenerateSql,
                ErrorDetail::new(
                    ErrorKind::SchemaUnavailable,
                    "No schema available for generation",
                ),
                SCHEMA_UNAVAILABLE_REPLY,
            );
        };
        let query = state.user_query().to_string();
        let request = GenerationRequest {
            query: &query,
            schema: &schema,
            history: ctx.history,
            repair: None,
        };

        let outcome = with_timeout(
            ctx.call_timeout,
            "SQL generation",
            self.generator.generate(request),
        )
        .await;
        match outcome {
            Ok(Some(sql)) if !sql.trim().is_empty() => {
                let sql = sql.trim().to_string();
                state
                    .log()
                    .completed(StageName::GenerateSql, format!("Generated SQL: {}", preview(&sql)));
                state.replace_sql(sql);
                Stage::Validate
            }
            Ok(_) => self.terminate(
                state,
                StageName::GenerateSql,
                ErrorDetail::new(ErrorKind::GenerationFailure, "SQL generator returned no query"),
                GENERATION_FAILED_REPLY,
            ),
            Err(e) => self.terminate(
                state,
                StageName::GenerateSql,
                ErrorDetail::from_error(ErrorKind::GenerationFailure, &e),
                GENERATION_FAILED_REPLY,
            ),
        }
    }

    fn validate(&self, state: &mut WorkflowState) -> Stage {
        state.log().started(StageName::ValidateSql, "Checking SQL safety");
        let verdict = self.validator.validate(state.candidate_sql().unwrap_or_default());

        match verdict {
            Ok(()) => {
                state.set_validation_error(None);
                state
                    .log()
                    .completed(StageName::ValidateSql, "SQL passed safety validation");
                Stage::Execute
            }
            Err(violation) => {
                let error: ErrorDetail = violation.into();
                state.log().failed(StageName::ValidateSql, error.to_string());
                state.set_validation_error(Some(error.clone()));
                if state.can_retry() {
                    Stage::Repair
                } else {
                    let reply = exhausted_reply(&error, state.retry_count());
                    state.fail(error, reply);
                    Stage::Done
                }
            }
        }
    }

    async fn execute(&self, state: &mut WorkflowState, ctx: &RunContext<'_>) -> Stage {
        state.log().started(StageName::ExecuteSql, "Executing SQL");
        let sql = state.candidate_sql().unwrap_or_default().to_string();

        let outcome = with_timeout(ctx.call_timeout, "query execution", self.executor.execute(&sql))
            .await
            .map_err(|e| ErrorDetail::from_error(ErrorKind::ExecutionFailure, &e))
            .and_then(|output| self.output_guardrails.apply(output));

        match outcome {
            Ok(result) => {
                let detail = if result.truncated {
                    format!(
                        "Query returned {} row(s), truncated to {}",
                        result.total_rows,
                        result.row_count()
                    )
                } else {
                    format!("Query returned {} row(s)", result.total_rows)
                };
                state.log().completed(StageName::ExecuteSql, detail);
                state.set_execution_error(None);
                state.result_set = Some(result);
                Stage::Respond
            }
            Err(error) => {
                state.log().failed(StageName::ExecuteSql, error.to_string());
                state.set_execution_error(Some(error.clone()));
                if state.can_retry() {
                    Stage::Repair
                } else {
                    let reply = exhausted_reply(&error, state.retry_count());
                    state.fail(error, reply);
                    Stage::Done
                }
            }
        }
    }

    async fn repair(&self, state: &mut WorkflowState, ctx: &RunContext<'_>) -> Stage {
        let (Some(error), Some(failed_sql)) = (
            state.pending_error().cloned(),
            state.candidate_sql().map(str::to_string),
        ) else {
            return self.terminate(
                state,
                StageName::RepairSql,
                ErrorDetail::new(ErrorKind::GenerationFailure, "Nothing to repair"),
                GENERATION_FAILED_REPLY,
            );
        };
        let Some(attempt) = state.begin_retry() else {
            let reply = exhausted_reply(&error, state.retry_count());
            return self.terminate(state, StageName::RepairSql, error, reply);
        };
        let max_retries = state.max_retries();
        state.log().started(
            StageName::RepairSql,
            format!("Repair attempt {}/{} for {}", attempt, max_retries, error.kind),
        );

        let Some(schema) = state.schema().cloned() else {
            return self.terminate(
                state,
                StageName::RepairSql,
                ErrorDetail::new(ErrorKind::SchemaUnavailable, "No schema available for repair"),
                SCHEMA_UNAVAILABLE_REPLY,
            );
        };
        let query = state.user_query().to_string();
        let repair = RepairContext {
            failed_sql: failed_sql.clone(),
            error: error.clone(),
        };
        let request = GenerationRequest {
            query: &query,
            schema: &schema,
            history: ctx.history,
            repair: Some(&repair),
        };

        let outcome =
            with_timeout(ctx.call_timeout, "SQL repair", self.generator.generate(request)).await;
        // Any of these means the repair made no progress; the turn ends with
        // the kind that triggered it.
        let fixed = match outcome {
            Ok(Some(sql)) if sql.trim() == failed_sql.trim() => {
                Err("Repair returned the same SQL".to_string())
            }
            Ok(Some(sql)) if !sql.trim().is_empty() => Ok(sql.trim().to_string()),
            Ok(_) => Err("Repair produced no SQL".to_string()),
            Err(e) => {
                warn!("Repair call failed: {}", e);
                Err(format!("Repair call failed: {}", e))
            }
        };
        let fixed = match fixed {
            Ok(sql) => sql,
            Err(reason) => {
                state.log().failed(StageName::RepairSql, reason);
                let reply = exhausted_reply(&error, state.retry_count());
                state.fail(error, reply);
                return Stage::Done;
            }
        };

        state
            .log()
            .completed(StageName::RepairSql, format!("Repaired SQL: {}", preview(&fixed)));
        state.replace_sql(fixed);
        Stage::Validate
    }

    async fn respond(&self, state: &mut WorkflowState, ctx: &RunContext<'_>) -> Stage {
        state.log().started(StageName::Respond, "Summarising results");

        let Some(result) = state.result_set.clone() else {
            // Execute only advances here with a result; keep the turn well-formed anyway.
            let error = ErrorDetail::new(ErrorKind::ExecutionFailure, "No result set to summarise");
            let reply = exhausted_reply(&error, state.retry_count());
            return self.terminate(state, StageName::Respond, error, reply);
        };

        let Some(synthesizer) = &self.synthesizer else {
            state
                .log()
                .completed(StageName::Respond, "Used templated response");
            state.finish(fallback_response(&result));
            return Stage::Done;
        };

        let query = state.user_query().to_string();
        let sql = state.candidate_sql().map(str::to_string);
        let outcome = with_timeout(
            ctx.call_timeout,
            "response synthesis",
            synthesizer.synthesize(&query, &result, sql.as_deref(), ctx.history),
        )
        .await;

        match outcome {
            Ok(text) if !text.trim().is_empty() => {
                state.log().completed(StageName::Respond, "Response generated");
                state.finish(text.trim());
            }
            Ok(_) => {
                let error = ErrorDetail::new(ErrorKind::ResponseSynthesisFailure, "Empty response");
                state.log().failed(StageName::Respond, error.to_string());
                state
                    .log()
                    .completed(StageName::Respond, "Used templated response");
                state.finish(fallback_response(&result));
            }
            Err(e) => {
                let error = ErrorDetail::from_error(ErrorKind::ResponseSynthesisFailure, &e);
                state.log().failed(StageName::Respond, error.to_string());
                state
                    .log()
                    .completed(StageName::Respond, "Used templated response");
                state.finish(fallback_response(&result));
            }
        }
        Stage::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_reply_wording() {
        let v = ErrorDetail::new(ErrorKind::ValidationFailure, "Only SELECT queries are allowed");
        assert_eq!(
            exhausted_reply(&v, 2),
            "SQL validation failed after 2 repair attempt(s): Only SELECT queries are allowed"
        );
        let e = ErrorDetail::new(ErrorKind::ExecutionFailure, "relation does not exist");
        assert_eq!(
            exhausted_reply(&e, 1),
            "Query execution failed after 1 repair attempt(s). Error: relation does not exist"
        );
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("SELECT *\n  FROM products"), "SELECT * FROM products");
        let long = format!("SELECT {} FROM t", "a, ".repeat(40));
        assert!(preview(&long).ends_with("..."));
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ChatError>(1)
        };
        let err = with_timeout(Duration::from_millis(10), "slow call", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
    }
}

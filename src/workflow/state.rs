//! Workflow State
//!
//! Owned by exactly one orchestrator run. Fields carrying invariants (the
//! question, the schema snapshot, the retry counter, the step log and the
//! final response) are only mutated through the methods below.

use crate::classifier::QueryKind;
use crate::db::ResultSet;
use crate::error::ErrorDetail;
use crate::schema::SchemaDescriptor;
use crate::workflow::steps::{StepLog, StepRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkflowState {
    run_id: Uuid,
    user_query: String,
    /// Outcome of the Classify stage
    pub query_kind: QueryKind,
    schema: Option<Arc<SchemaDescriptor>>,
    candidate_sql: Option<String>,
    validation_error: Option<ErrorDetail>,
    execution_error: Option<ErrorDetail>,
    /// Guarded result of the last successful execution
    pub result_set: Option<ResultSet>,
    retry_count: u32,
    max_retries: u32,
    steps: StepLog,
    final_response: Option<String>,
    terminal_error: Option<ErrorDetail>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    pub fn new(user_query: impl Into<String>, max_retries: u32) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            user_query: user_query.into(),
            query_kind: QueryKind::Unclassified,
            schema: None,
            candidate_sql: None,
            validation_error: None,
            execution_error: None,
            result_set: None,
            retry_count: 0,
            max_retries,
            steps: StepLog::new(run_id),
            final_response: None,
            terminal_error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn schema(&self) -> Option<&Arc<SchemaDescriptor>> {
        self.schema.as_ref()
    }

    /// Set the schema snapshot. Later calls are ignored; returns whether it was set.
    pub fn set_schema(&mut self, schema: Arc<SchemaDescriptor>) -> bool {
        if self.schema.is_some() {
            return false;
        }
        self.schema = Some(schema);
        true
    }

    pub fn candidate_sql(&self) -> Option<&str> {
        self.candidate_sql.as_deref()
    }

    /// Replace the candidate statement. Errors recorded against the old one are cleared.
    pub fn replace_sql(&mut self, sql: impl Into<String>) {
        self.candidate_sql = Some(sql.into());
        self.validation_error = None;
        self.execution_error = None;
        self.result_set = None;
    }

    pub fn validation_error(&self) -> Option<&ErrorDetail> {
        self.validation_error.as_ref()
    }

    pub fn execution_error(&self) -> Option<&ErrorDetail> {
        self.execution_error.as_ref()
    }

    pub(crate) fn set_validation_error(&mut self, error: Option<ErrorDetail>) {
        self.validation_error = error;
    }

    pub(crate) fn set_execution_error(&mut self, error: Option<ErrorDetail>) {
        self.execution_error = error;
    }

    /// The error a repair should address. Validation takes priority.
    pub fn pending_error(&self) -> Option<&ErrorDetail> {
        self.validation_error.as_ref().or(self.execution_error.as_ref())
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Consume one unit of the shared retry budget. Returns the new count,
    /// or `None` when the budget is exhausted.
    pub(crate) fn begin_retry(&mut self) -> Option<u32> {
        if !self.can_retry() {
            return None;
        }
        self.retry_count += 1;
        Some(self.retry_count)
    }

    pub fn steps(&self) -> &[StepRecord] {
        self.steps.records()
    }

    pub fn step_log(&self) -> &StepLog {
        &self.steps
    }

    pub(crate) fn log(&mut self) -> &mut StepLog {
        &mut self.steps
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn terminal_error(&self) -> Option<&ErrorDetail> {
        self.terminal_error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.final_response.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Successful end of the turn. A second call does not overwrite the first response.
    pub(crate) fn finish(&mut self, response: impl Into<String>) {
        if self.final_response.is_none() {
            self.final_response = Some(response.into());
            self.finished_at = Some(Utc::now());
        }
    }

    /// Failed end of the turn with a user-visible message.
    pub(crate) fn fail(&mut self, error: ErrorDetail, response: impl Into<String>) {
        if self.final_response.is_none() {
            self.terminal_error = Some(error);
            self.finish(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::Table;

    #[test]
    fn test_retry_budget_is_bounded() {
        let mut state = WorkflowState::new("q", 2);
        assert_eq!(state.begin_retry(), Some(1));
        assert_eq!(state.begin_retry(), Some(2));
        assert_eq!(state.begin_retry(), None);
        assert_eq!(state.retry_count(), 2);
    }

    #[test]
    fn test_zero_budget() {
        let mut state = WorkflowState::new("q", 0);
        assert!(!state.can_retry());
        assert_eq!(state.begin_retry(), None);
    }

    #[test]
    fn test_schema_set_once() {
        let mut state = WorkflowState::new("q", 3);
        let a = Arc::new(SchemaDescriptor::new(vec![Table::new("a")]).unwrap());
        let b = Arc::new(SchemaDescriptor::new(vec![Table::new("b")]).unwrap());
        assert!(state.set_schema(a));
        assert!(!state.set_schema(b));
        assert!(state.schema().unwrap().table("a").is_some());
    }

    #[test]
    fn test_replace_sql_clears_stale_errors() {
        let mut state = WorkflowState::new("q", 3);
        state.replace_sql("SELECT 1");
        state.set_execution_error(Some(ErrorDetail::new(ErrorKind::ExecutionFailure, "boom")));
        assert!(state.pending_error().is_some());
        state.replace_sql("SELECT 2");
        assert!(state.pending_error().is_none());
        assert_eq!(state.candidate_sql(), Some("SELECT 2"));
    }

    #[test]
    fn test_final_response_is_write_once() {
        let mut state = WorkflowState::new("q", 3);
        state.finish("first");
        state.fail(ErrorDetail::new(ErrorKind::GenerationFailure, "x"), "second");
        assert_eq!(state.final_response(), Some("first"));
        assert!(state.terminal_error().is_none());
        assert!(state.is_terminal());
    }
}

//! Chat Session
//!
//! Conversation history plus an archive of immutable per-turn transcripts.
//! Each question runs one orchestrator turn; only the transcript outlives it.

use crate::classifier::QueryKind;
use crate::db::ResultSet;
use crate::error::ErrorDetail;
use crate::schema::SchemaDescriptor;
use crate::workflow::{RunOptions, StepRecord, WorkflowOrchestrator, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Archived record of one finished turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub run_id: Uuid,
    pub user_query: String,
    pub query_kind: QueryKind,
    pub sql: Option<String>,
    pub final_response: String,
    pub terminal_error: Option<ErrorDetail>,
    pub retry_count: u32,
    pub steps: Vec<StepRecord>,
    pub row_count: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&WorkflowState> for Transcript {
    fn from(state: &WorkflowState) -> Self {
        Self {
            run_id: state.run_id(),
            user_query: state.user_query().to_string(),
            query_kind: state.query_kind,
            sql: state.candidate_sql().map(str::to_string),
            final_response: state.final_response().unwrap_or_default().to_string(),
            terminal_error: state.terminal_error().cloned(),
            retry_count: state.retry_count(),
            steps: state.steps().to_vec(),
            row_count: state.result_set.as_ref().map(|r| r.total_rows),
            started_at: state.started_at(),
            finished_at: state.finished_at(),
        }
    }
}

/// Reply to one question, as returned to the caller.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub sql: Option<String>,
    pub result: Option<ResultSet>,
    pub transcript: Arc<Transcript>,
}

pub struct ChatSession {
    orchestrator: Arc<WorkflowOrchestrator>,
    schema: Option<Arc<SchemaDescriptor>>,
    history: Vec<Message>,
    transcripts: Vec<Arc<Transcript>>,
    history_window: usize,
}

impl ChatSession {
    pub fn new(orchestrator: Arc<WorkflowOrchestrator>) -> Self {
        Self {
            orchestrator,
            schema: None,
            history: Vec::new(),
            transcripts: Vec::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Pin a schema for every turn instead of asking the provider.
    pub fn with_schema(mut self, schema: Arc<SchemaDescriptor>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn transcripts(&self) -> &[Arc<Transcript>] {
        &self.transcripts
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.transcripts.clear();
    }

    pub async fn ask(&mut self, question: &str) -> TurnOutcome {
        self.ask_with_options(question, RunOptions::default()).await
    }

    pub async fn ask_with_options(&mut self, question: &str, options: RunOptions) -> TurnOutcome {
        let start = self.history.len().saturating_sub(self.history_window);
        let state = self
            .orchestrator
            .run_with_options(question, self.schema.clone(), &self.history[start..], options)
            .await;

        let transcript = Arc::new(Transcript::from(&state));
        let response = transcript.final_response.clone();

        self.history.push(Message::user(question));
        self.history.push(Message::assistant(response.clone()));
        self.transcripts.push(Arc::clone(&transcript));

        TurnOutcome {
            response,
            sql: state.candidate_sql().map(str::to_string),
            result: state.result_set,
            transcript,
        }
    }
}

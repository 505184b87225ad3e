pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod guardrails;
pub mod llm;
pub mod observability;
pub mod prompts;
pub mod response;
pub mod schema;
pub mod session;
pub mod workflow;

pub use error::{ChatError, ErrorDetail, ErrorKind, Result};
pub use workflow::{RunOptions, WorkflowOrchestrator, WorkflowState};

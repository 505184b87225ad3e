//! Query Workflow
//!
//! Per-turn state, the step trace and the orchestrator that drives them.

pub mod cancel;
pub mod orchestrator;
pub mod state;
pub mod steps;

pub use cancel::CancellationToken;
pub use orchestrator::{
    RunOptions, WorkflowOrchestrator, CANCELLED_REPLY, GENERATION_FAILED_REPLY,
    SCHEMA_UNAVAILABLE_REPLY,
};
pub use state::WorkflowState;
pub use steps::{StageName, StepLog, StepRecord, StepStatus};

//! Step Trace
//!
//! Append-only audit log of stage transitions for one turn. Sequence numbers
//! come from a counter owned by the log, so they depend only on append order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// Workflow stage, as shown in the step trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Classify,
    RetrieveSchema,
    GenerateSql,
    ValidateSql,
    ExecuteSql,
    RepairSql,
    Respond,
}

impl StageName {
    /// Short label suitable for display.
    pub fn label(&self) -> &'static str {
        match self {
            StageName::Classify => "Classify",
            StageName::RetrieveSchema => "Retrieve Schema",
            StageName::GenerateSql => "Generate SQL",
            StageName::ValidateSql => "Validate SQL",
            StageName::ExecuteSql => "Execute SQL",
            StageName::RepairSql => "Repair SQL",
            StageName::Respond => "Respond",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Started => "started",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the step trace. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position in the trace
    pub sequence_number: u32,
    /// Stage that produced the record
    pub stage: StageName,
    /// Outcome tag
    pub status: StepStatus,
    /// Free-text detail for display
    pub detail: String,
    /// Wall-clock time of the append
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>2}. [{}] {}: {}",
            self.sequence_number, self.status, self.stage, self.detail
        )
    }
}

#[derive(Debug, Clone)]
pub struct StepLog {
    run_id: Uuid,
    records: Vec<StepRecord>,
    next_sequence: u32,
}

impl StepLog {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            records: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Append a record and return its sequence number.
    pub fn record(
        &mut self,
        stage: StageName,
        status: StepStatus,
        detail: impl Into<String>,
    ) -> u32 {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        let detail = detail.into();

        match status {
            StepStatus::Failed => warn!(
                run_id = %self.run_id,
                seq = sequence_number,
                stage = stage.label(),
                status = status.as_str(),
                "{}",
                detail
            ),
            _ => info!(
                run_id = %self.run_id,
                seq = sequence_number,
                stage = stage.label(),
                status = status.as_str(),
                "{}",
                detail
            ),
        }

        self.records.push(StepRecord {
            sequence_number,
            stage,
            status,
            detail,
            recorded_at: Utc::now(),
        });
        sequence_number
    }

    pub fn started(&mut self, stage: StageName, detail: impl Into<String>) -> u32 {
        self.record(stage, StepStatus::Started, detail)
    }

    pub fn completed(&mut self, stage: StageName, detail: impl Into<String>) -> u32 {
        self.record(stage, StepStatus::Completed, detail)
    }

    pub fn failed(&mut self, stage: StageName, detail: impl Into<String>) -> u32 {
        self.record(stage, StepStatus::Failed, detail)
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records for `stage` with the given status.
    pub fn count(&self, stage: StageName, status: StepStatus) -> usize {
        self.records
            .iter()
            .filter(|r| r.stage == stage && r.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_numbers_follow_append_order() {
        let mut log = StepLog::new(Uuid::new_v4());
        assert_eq!(log.started(StageName::Classify, "checking"), 1);
        assert_eq!(log.completed(StageName::Classify, "sql"), 2);
        assert_eq!(log.failed(StageName::ValidateSql, "bad"), 3);

        let seqs: Vec<u32> = log.records().iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(log.count(StageName::ValidateSql, StepStatus::Failed), 1);
    }

    #[test]
    fn test_record_display() {
        let mut log = StepLog::new(Uuid::new_v4());
        log.failed(StageName::ExecuteSql, "relation \"x\" does not exist");
        assert_eq!(
            log.records()[0].to_string(),
            " 1. [failed] Execute SQL: relation \"x\" does not exist"
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&StepStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}

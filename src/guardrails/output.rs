//! Output Guardrails
//!
//! Shape and size limits applied to executor output before it enters
//! workflow state.

use crate::config::WorkflowConfig;
use crate::db::{QueryOutput, ResultSet};
use crate::error::{ErrorDetail, ErrorKind};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

lazy_static! {
    static ref UNSAFE_COLUMN_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_]").unwrap();
}

#[derive(Debug, Clone)]
pub struct OutputGuardrails {
    pub max_rows: usize,
    pub max_columns: usize,
}

impl Default for OutputGuardrails {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

impl OutputGuardrails {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            max_rows: config.max_result_rows,
            max_columns: config.max_result_columns,
        }
    }

    /// Turn raw output into a `ResultSet`, or an `ExecutionFailure` when the
    /// output is missing, malformed or too wide.
    pub fn apply(&self, output: QueryOutput) -> Result<ResultSet, ErrorDetail> {
        let columns = output.columns.ok_or_else(|| {
            ErrorDetail::new(ErrorKind::ExecutionFailure, "Query did not return a result set")
        })?;

        if columns.len() > self.max_columns {
            return Err(ErrorDetail::new(
                ErrorKind::ExecutionFailure,
                format!(
                    "Result has {} columns, exceeding the maximum of {}",
                    columns.len(),
                    self.max_columns
                ),
            ));
        }

        if let Some((i, row)) = output
            .rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(ErrorDetail::new(
                ErrorKind::ExecutionFailure,
                format!(
                    "Malformed result: row {} has {} value(s) for {} column(s)",
                    i + 1,
                    row.len(),
                    columns.len()
                ),
            ));
        }

        let total_rows = output.rows.len();
        let mut rows = output.rows;
        let truncated = total_rows > self.max_rows;
        if truncated {
            info!("Limiting results from {} to {} rows", total_rows, self.max_rows);
            rows.truncate(self.max_rows);
        }

        let columns = columns.iter().map(|c| sanitize_column(c)).collect();
        debug!("Results accepted: {} row(s), truncated={}", rows.len(), truncated);

        Ok(ResultSet {
            columns,
            rows,
            total_rows,
            truncated,
        })
    }
}

pub fn sanitize_column(name: &str) -> String {
    UNSAFE_COLUMN_CHARS.replace_all(name, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncates_rows_and_keeps_total() {
        let guard = OutputGuardrails {
            max_rows: 2,
            max_columns: 5,
        };
        let output = QueryOutput::new(
            vec!["id".into()],
            vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]],
        );
        let result = guard.apply(output).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.total_rows, 3);
        assert!(result.truncated);
    }

    #[test]
    fn test_too_many_columns_is_execution_failure() {
        let guard = OutputGuardrails {
            max_rows: 10,
            max_columns: 1,
        };
        let err = guard
            .apply(QueryOutput::new(vec!["a".into(), "b".into()], vec![]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExecutionFailure);
    }

    #[test]
    fn test_missing_columns_rejected() {
        let err = OutputGuardrails::default()
            .apply(QueryOutput::default())
            .unwrap_err();
        assert_eq!(err.message, "Query did not return a result set");
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let output = QueryOutput::new(vec!["a".into(), "b".into()], vec![vec![json!(1)]]);
        assert!(OutputGuardrails::default().apply(output).is_err());
    }

    #[test]
    fn test_column_names_sanitized() {
        let output = QueryOutput::new(vec!["count(*)".into(), "unit price".into()], vec![]);
        let result = OutputGuardrails::default().apply(output).unwrap();
        assert_eq!(result.columns, vec!["count___", "unit_price"]);
        assert!(!result.truncated);
    }
}

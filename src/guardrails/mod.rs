//! Guardrails
//!
//! Input-side SQL safety checks and output-side result limits.

pub mod input;
pub mod output;

pub use input::{SafetyValidator, SqlViolation, ViolationRule, FORBIDDEN_KEYWORDS};
pub use output::OutputGuardrails;

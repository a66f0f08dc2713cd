//! Core domain model types for deckflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage and gate status enums
//! - Execution records for the run trace
//! - Evaluator output and threshold check types

mod evaluation;
mod record;
mod status;

pub use evaluation::{Evaluation, ScoreThreshold, ThresholdCheckResult, ThresholdPolicy};
pub use record::ExecutionRecord;
pub use status::{ExportStatus, GateOutcome, StageStatus};

//! Execution records forming the run trace.

use super::StageStatus;
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};

/// A single entry in the ordered execution log.
///
/// Records are only ever appended, so the trace fully reconstructs the
/// run including retry loops. A quality gate downgrades the records of
/// an attempt it discards from [`StageStatus::Success`] to
/// [`StageStatus::Retried`]; nothing is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The stage name.
    pub stage: String,

    /// Start timestamp (ISO 8601).
    pub started_at: String,

    /// End timestamp (ISO 8601).
    pub ended_at: String,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,

    /// The invocation status.
    pub status: StageStatus,

    /// Attempt number (1-indexed; always 1 for non-gated stages).
    pub attempt: u32,

    /// Error detail for failed invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the quality gate was met. Only set on gate commit records;
    /// `Some(false)` flags a best-effort acceptance after exhaustion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gate_met: Option<bool>,
}

impl ExecutionRecord {
    /// Creates a success record.
    #[must_use]
    pub fn success(
        stage: impl Into<String>,
        started_at: impl Into<String>,
        duration_ms: f64,
        attempt: u32,
    ) -> Self {
        Self {
            stage: stage.into(),
            started_at: started_at.into(),
            ended_at: iso_timestamp(),
            duration_ms,
            status: StageStatus::Success,
            attempt,
            error: None,
            quality_gate_met: None,
        }
    }

    /// Creates a failed record with error detail.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        started_at: impl Into<String>,
        duration_ms: f64,
        attempt: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            started_at: started_at.into(),
            ended_at: iso_timestamp(),
            duration_ms,
            status: StageStatus::Failed,
            attempt,
            error: Some(error.into()),
            quality_gate_met: None,
        }
    }

    /// Creates a retried record: the invocation completed but its result
    /// was superseded by a later attempt.
    #[must_use]
    pub fn retried(
        stage: impl Into<String>,
        started_at: impl Into<String>,
        duration_ms: f64,
        attempt: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            started_at: started_at.into(),
            ended_at: iso_timestamp(),
            duration_ms,
            status: StageStatus::Retried,
            attempt,
            error: Some(reason.into()),
            quality_gate_met: None,
        }
    }

    /// Sets the quality-gate flag on a commit record.
    #[must_use]
    pub fn with_gate_met(mut self, met: bool) -> Self {
        self.quality_gate_met = Some(met);
        self
    }
}

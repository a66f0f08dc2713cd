//! Status enums for stage invocations, quality gates, and export.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The recorded status of a single stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The invocation completed and its result was kept.
    Success,
    /// The invocation failed.
    Failed,
    /// The invocation completed but the quality gate requested another
    /// attempt; its result was superseded.
    Retried,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Retried => write!(f, "retried"),
        }
    }
}

/// Terminal outcome of a quality-gate retry loop.
///
/// Both outcomes are non-fatal: `Exhausted` commits the last generated
/// output flagged as not having met the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// The threshold check passed and the artifact was committed.
    Accepted,
    /// Attempts ran out; the last artifact was committed best-effort.
    Exhausted,
}

impl GateOutcome {
    /// Returns true if the committed artifact met the quality gate.
    #[must_use]
    pub fn gate_met(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Status returned by the export consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// The artifact was exported in full.
    Success,
    /// The artifact was exported with degradations; still usable output.
    PartialSuccess,
    /// Export failed.
    Error,
}

impl ExportStatus {
    /// Returns true if the export produced usable output.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Error => write!(f, "error"),
        }
    }
}

//! Error types for the deckflow pipeline core.
//!
//! The taxonomy separates errors by how they are handled:
//! transient transport errors are retried close to the call site,
//! malformed-output errors consume a quality-gate attempt, and
//! everything else escalates as a stage failure.

use thiserror::Error;

/// An error raised by a single stage invocation.
///
/// `StageError` is the boundary type between a stage and the executor.
/// Whether it is fatal depends on the caller: a bare stage failure aborts
/// the run, while a gated generator or evaluator failure is fed back into
/// the retry loop.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// A transient transport failure (timeout, rate limit, unreachable
    /// service). Retried within the stage's transport retry budget.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The external call exceeded its timeout. Treated like a transport
    /// error for retry purposes.
    #[error("Call timed out after {timeout_ms}ms")]
    Timeout {
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The stage produced output that cannot be parsed into the expected
    /// structure.
    #[error("Malformed output: {message}")]
    MalformedOutput {
        /// Description of the parse failure.
        message: String,
    },

    /// The stage produced structurally valid output that is missing
    /// required fields.
    #[error("Invalid output: {message}")]
    InvalidOutput {
        /// Description of what is missing.
        message: String,
    },
}

impl StageError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a malformed-output error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }

    /// Creates an invalid-output error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            message: message.into(),
        }
    }

    /// Returns true if the error is transient and eligible for a
    /// transport retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Returns true if the error is a malformed or invalid output.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedOutput { .. } | Self::InvalidOutput { .. }
        )
    }
}

/// A read of a `SessionState` key that was never committed.
#[derive(Debug, Clone, Error)]
#[error("Missing artifact '{key}' in session state")]
pub struct MissingArtifactError {
    /// The artifact key that was requested.
    pub key: String,
}

impl MissingArtifactError {
    /// Creates a new missing-artifact error.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// The main error type for deckflow operations.
#[derive(Debug, Error)]
pub enum DeckflowError {
    /// A stage read an artifact that no predecessor committed.
    #[error("{0}")]
    MissingArtifact(#[from] MissingArtifactError),

    /// A bare stage failed, or a gated stage exhausted its transport
    /// retry budget. Fatal for the run.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// The stage that failed.
        stage: String,
        /// The underlying stage error.
        source: StageError,
    },

    /// A quality gate exhausted its attempts without ever producing an
    /// artifact to commit.
    #[error("Quality gate '{gate}' exhausted with no output to commit")]
    GateWithoutOutput {
        /// The gate that exhausted.
        gate: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error (trace persistence, intermediate artifact files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeckflowError {
    /// Creates a stage-failed error.
    pub fn stage_failed(stage: impl Into<String>, source: StageError) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source,
        }
    }

    /// Returns the name of the stage that caused this error, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            Self::GateWithoutOutput { gate } => Some(gate),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DeckflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

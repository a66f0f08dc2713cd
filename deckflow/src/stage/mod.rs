//! Stage trait, descriptors, and the execution envelope.
//!
//! A stage is one unit of pipeline work: it reads declared predecessor
//! artifacts and produces one artifact (or fails). The executor wraps
//! every invocation in a uniform envelope of timing, transport retries,
//! and trace recording.

mod executor;
mod transport;

pub use executor::StageExecutor;
pub use transport::{with_transport_retry, BackoffStrategy, JitterStrategy, TransportRetryPolicy};

use crate::errors::StageError;
use crate::gate::RetryFeedback;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Describes a stage's contract: its name, the artifact keys it reads,
/// the key it writes, and its quality-gate attempt budget.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Unique stage name.
    pub name: String,
    /// Session-state keys this stage reads.
    pub inputs: Vec<String>,
    /// Session-state key this stage's output is committed under.
    pub output_key: String,
    /// Maximum generation attempts. 1 for non-gated stages.
    pub max_attempts: u32,
}

impl StageDescriptor {
    /// Creates a descriptor for a non-gated stage.
    #[must_use]
    pub fn new(name: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output_key: output_key.into(),
            max_attempts: 1,
        }
    }

    /// Declares the input keys the stage reads.
    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the quality-gate attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Resolved input for one stage invocation.
///
/// Carries the declared predecessor artifacts, the attempt index, and
/// (for gated generators past the first attempt) the assembled feedback
/// from the prior iteration.
#[derive(Debug, Clone, Default)]
pub struct StageInput {
    /// Declared input artifacts, keyed by artifact name.
    pub artifacts: BTreeMap<String, serde_json::Value>,
    /// Attempt number (1-indexed).
    pub attempt: u32,
    /// Feedback from the prior quality-gate iteration, if any.
    pub feedback: Option<RetryFeedback>,
}

impl StageInput {
    /// Creates an input for a first attempt with the given artifacts.
    #[must_use]
    pub fn new(artifacts: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            artifacts,
            attempt: 1,
            feedback: None,
        }
    }

    /// Reads a declared input artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidOutput`] if the key was not resolved
    /// into this input, which indicates an undeclared dependency.
    pub fn artifact(&self, key: &str) -> Result<&serde_json::Value, StageError> {
        self.artifacts
            .get(key)
            .ok_or_else(|| StageError::invalid(format!("input artifact '{key}' not declared")))
    }
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage against its resolved input.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] classified by how the caller should
    /// handle it: transient transport errors are retried by the
    /// executor, malformed output consumes a quality-gate attempt.
    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError>;
}

/// A function-based stage, mainly for composition and tests.
pub struct FnStage<F>
where
    F: Fn(&StageInput) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageInput) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageInput) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageInput) -> Result<serde_json::Value, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError> {
        (self.func)(&input)
    }
}

//! Uniform execution envelope for single stage invocations.

use super::{with_transport_retry, Stage, StageDescriptor, StageInput, TransportRetryPolicy};
use crate::core::ExecutionRecord;
use crate::errors::{DeckflowError, MissingArtifactError, StageError};
use crate::gate::RetryFeedback;
use crate::observability::ObservabilityRecorder;
use crate::state::SessionState;
use crate::utils::iso_timestamp;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Runs single stages with timing, transport retries, and trace
/// recording.
///
/// Every invocation appends exactly one [`ExecutionRecord`] to the
/// recorder, on success and failure alike. Bare stages commit their
/// output to session state and escalate failures as pipeline-fatal;
/// quality-gate attempts return typed outcomes to the loop controller
/// and leave the commit decision to it.
pub struct StageExecutor {
    state: Arc<SessionState>,
    recorder: Arc<ObservabilityRecorder>,
    transport: TransportRetryPolicy,
}

impl StageExecutor {
    /// Creates an executor over the given state and recorder.
    #[must_use]
    pub fn new(state: Arc<SessionState>, recorder: Arc<ObservabilityRecorder>) -> Self {
        Self {
            state,
            recorder,
            transport: TransportRetryPolicy::default(),
        }
    }

    /// Sets the transport retry policy.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportRetryPolicy) -> Self {
        self.transport = transport;
        self
    }

    /// Returns the session state.
    #[must_use]
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Returns the observability recorder.
    #[must_use]
    pub fn recorder(&self) -> &Arc<ObservabilityRecorder> {
        &self.recorder
    }

    /// Resolves a descriptor's declared inputs from session state.
    ///
    /// # Errors
    ///
    /// Returns [`MissingArtifactError`] if a declared input was never
    /// committed by a predecessor.
    pub fn resolve_inputs(
        &self,
        descriptor: &StageDescriptor,
    ) -> Result<BTreeMap<String, serde_json::Value>, MissingArtifactError> {
        let mut artifacts = BTreeMap::new();
        for key in &descriptor.inputs {
            artifacts.insert(key.clone(), self.state.get(key)?);
        }
        Ok(artifacts)
    }

    /// Runs a bare (non-gated) stage.
    ///
    /// On success the output is committed under the descriptor's output
    /// key. Any failure is pipeline-fatal.
    ///
    /// # Errors
    ///
    /// Returns [`DeckflowError::StageFailed`] naming the stage, or
    /// [`DeckflowError::MissingArtifact`] for an unmet input.
    pub async fn run_bare(
        &self,
        descriptor: &StageDescriptor,
        stage: &dyn Stage,
    ) -> Result<serde_json::Value, DeckflowError> {
        let artifacts = self.resolve_inputs(descriptor)?;
        let input = StageInput::new(artifacts);

        let value = self
            .invoke_recorded(&descriptor.name, stage, input, 1)
            .await
            .map_err(|e| DeckflowError::stage_failed(&descriptor.name, e))?;

        self.state.set(&descriptor.output_key, value.clone());
        Ok(value)
    }

    /// Runs one quality-gate attempt of a generator or evaluator stage.
    ///
    /// Does not commit the output; the retry loop decides acceptance.
    /// Extra artifacts (e.g. the generated artifact handed to an
    /// evaluator) are merged over the declared inputs.
    ///
    /// # Errors
    ///
    /// Returns the stage's error after the transport retry budget is
    /// spent. A missing declared input surfaces as an invalid-output
    /// error so the loop accounts for it as a consumed attempt.
    pub async fn run_attempt(
        &self,
        descriptor: &StageDescriptor,
        stage: &dyn Stage,
        attempt: u32,
        feedback: Option<RetryFeedback>,
        extra: BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, StageError> {
        let mut artifacts = self
            .resolve_inputs(descriptor)
            .map_err(|e| StageError::invalid(e.to_string()))?;
        artifacts.extend(extra);

        let input = StageInput {
            artifacts,
            attempt,
            feedback,
        };

        self.invoke_recorded(&descriptor.name, stage, input, attempt)
            .await
    }

    /// Invokes the stage and appends exactly one record, on both the
    /// success and the failure path.
    async fn invoke_recorded(
        &self,
        name: &str,
        stage: &dyn Stage,
        input: StageInput,
        attempt: u32,
    ) -> Result<serde_json::Value, StageError> {
        let started_at = iso_timestamp();
        let start = Instant::now();
        tracing::info!(stage = %name, attempt, "Stage started");

        let result =
            with_transport_retry(&self.transport, name, || stage.execute(input.clone())).await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => {
                tracing::info!(stage = %name, attempt, duration_ms, "Stage completed");
                self.recorder
                    .append(ExecutionRecord::success(name, started_at, duration_ms, attempt));
            }
            Err(e) => {
                tracing::warn!(stage = %name, attempt, duration_ms, error = %e, "Stage failed");
                self.recorder.append(ExecutionRecord::failed(
                    name,
                    started_at,
                    duration_ms,
                    attempt,
                    e.to_string(),
                ));
            }
        }

        result
    }
}

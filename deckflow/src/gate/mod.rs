//! Quality-gate retry loop: the evaluate-then-retry state machine.
//!
//! A gate pairs a generator stage with an evaluator stage and a local
//! threshold policy. Each iteration generates, evaluates, and checks the
//! threshold; a failed check feeds accumulated feedback into the next
//! generation attempt, bounded by the generator's attempt budget.

mod feedback;

pub use feedback::RetryFeedback;

use crate::core::{
    Evaluation, ExecutionRecord, GateOutcome, ThresholdCheckResult, ThresholdPolicy,
};
use crate::errors::DeckflowError;
use crate::stage::{Stage, StageDescriptor, StageExecutor};
use crate::utils::iso_timestamp;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The state the retry loop is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Invoking the generator stage.
    Generating,
    /// Invoking the evaluator stage on the generator's output.
    Evaluating,
    /// Applying the local threshold function.
    CheckingThreshold,
    /// Terminal: the threshold passed and the artifact was committed.
    Accepted,
    /// Terminal: attempts ran out; the last artifact was committed
    /// best-effort and flagged.
    Exhausted,
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::CheckingThreshold => write!(f, "checking_threshold"),
            Self::Accepted => write!(f, "accepted"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Terminal result of a gate run.
#[derive(Debug, Clone)]
pub struct GateResult {
    /// Whether the artifact was accepted or committed best-effort.
    pub outcome: GateOutcome,
    /// The committed artifact.
    pub artifact: serde_json::Value,
    /// Generation attempts performed.
    pub attempts: u32,
    /// The final threshold check, if one was produced.
    pub last_check: Option<ThresholdCheckResult>,
}

/// A quality-gated generator/evaluator pair with a bounded retry loop.
pub struct QualityGate {
    name: String,
    generator: StageDescriptor,
    generator_stage: Arc<dyn Stage>,
    evaluator: StageDescriptor,
    evaluator_stage: Arc<dyn Stage>,
    threshold: Arc<dyn ThresholdPolicy>,
    stagnation_limit: usize,
}

impl fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityGate")
            .field("name", &self.name)
            .field("generator", &self.generator.name)
            .field("evaluator", &self.evaluator.name)
            .field("max_attempts", &self.generator.max_attempts)
            .finish()
    }
}

impl QualityGate {
    /// Creates a gate. The generator descriptor's `max_attempts` bounds
    /// the loop.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        generator: StageDescriptor,
        generator_stage: Arc<dyn Stage>,
        evaluator: StageDescriptor,
        evaluator_stage: Arc<dyn Stage>,
        threshold: Arc<dyn ThresholdPolicy>,
    ) -> Self {
        Self {
            name: name.into(),
            generator,
            generator_stage,
            evaluator,
            evaluator_stage,
            threshold,
            stagnation_limit: 2,
        }
    }

    /// Sets the number of consecutive identical generator outputs that
    /// short-circuits the loop to exhaustion.
    ///
    /// The first output counts toward the run, so a limit of 2 gives up
    /// after one repeat and a limit of 1 forbids any content retry. A
    /// limit of 0 disables the check.
    #[must_use]
    pub fn with_stagnation_limit(mut self, limit: usize) -> Self {
        self.stagnation_limit = limit;
        self
    }

    /// Returns the gate name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the generator descriptor.
    #[must_use]
    pub fn generator(&self) -> &StageDescriptor {
        &self.generator
    }

    /// Returns the evaluator descriptor.
    #[must_use]
    pub fn evaluator(&self) -> &StageDescriptor {
        &self.evaluator
    }

    /// Runs the loop to a terminal state.
    ///
    /// Performs at most `max_attempts` generation attempts. Both
    /// terminal outcomes are non-fatal: exhaustion commits the last
    /// generated artifact flagged as not having met the gate.
    ///
    /// # Errors
    ///
    /// Returns [`DeckflowError::StageFailed`] when the generator's or
    /// evaluator's transport retry budget is exhausted, and
    /// [`DeckflowError::GateWithoutOutput`] if attempts run out without
    /// any artifact to commit.
    pub async fn run(&self, executor: &StageExecutor) -> Result<GateResult, DeckflowError> {
        let max_attempts = self.generator.max_attempts.max(1);
        let check_stage = format!("{}.check", self.name);

        let mut attempt: u32 = 1;
        let mut feedback: Option<RetryFeedback> = None;
        let mut last_artifact: Option<serde_json::Value> = None;
        let mut last_hash: Option<String> = None;
        let mut stagnation_hits: usize = 0;

        loop {
            self.trace_phase(GatePhase::Generating, attempt);
            let generated = executor
                .run_attempt(&self.generator, self.generator_stage.as_ref(), attempt, feedback.take(), BTreeMap::new())
                .await;

            let artifact = match generated {
                Ok(value) => value,
                Err(e) if e.is_transient() => {
                    // Transport budget spent, not a content problem.
                    return Err(DeckflowError::stage_failed(&self.generator.name, e));
                }
                Err(e) => {
                    let reasons = vec![format!("generator output unusable: {e}")];
                    if attempt < max_attempts {
                        self.append_check(
                            executor,
                            &check_stage,
                            CheckDisposition::Retry { reasons: &reasons },
                            attempt,
                        );
                        feedback = Some(RetryFeedback {
                            attempt: attempt + 1,
                            reasons,
                            evaluation: None,
                            previous_output: last_artifact.clone(),
                        });
                        attempt += 1;
                        continue;
                    }
                    return self.finish_exhausted(
                        executor,
                        &check_stage,
                        last_artifact,
                        None,
                        None,
                        attempt,
                    );
                }
            };

            // Stagnation detection: an unchanged generator will not pass a
            // threshold it already failed.
            if let Some(hash) = hash_artifact(&artifact) {
                if last_hash.as_deref() == Some(hash.as_str()) {
                    stagnation_hits += 1;
                } else {
                    stagnation_hits = 0;
                    last_hash = Some(hash);
                }
            }
            last_artifact = Some(artifact.clone());

            self.trace_phase(GatePhase::Evaluating, attempt);
            let mut extra = BTreeMap::new();
            extra.insert(self.generator.output_key.clone(), artifact.clone());
            let evaluated = executor
                .run_attempt(&self.evaluator, self.evaluator_stage.as_ref(), attempt, None, extra)
                .await;

            self.trace_phase(GatePhase::CheckingThreshold, attempt);
            let (eval_value, check) = match evaluated {
                Ok(value) => match Evaluation::from_value(&value) {
                    Ok(evaluation) => {
                        let check = self.threshold.check(&evaluation, attempt);
                        (Some((value, evaluation)), check)
                    }
                    Err(e) => (
                        None,
                        ThresholdCheckResult {
                            passed: false,
                            score: 0.0,
                            feedback: vec![format!("evaluator output malformed: {e}")],
                            iteration: attempt,
                        },
                    ),
                },
                Err(e) if e.is_transient() => {
                    return Err(DeckflowError::stage_failed(&self.evaluator.name, e));
                }
                Err(e) => (
                    None,
                    ThresholdCheckResult {
                        passed: false,
                        score: 0.0,
                        feedback: vec![format!("evaluator output unusable: {e}")],
                        iteration: attempt,
                    },
                ),
            };

            if check.passed {
                self.trace_phase(GatePhase::Accepted, attempt);
                self.append_check(executor, &check_stage, CheckDisposition::Accept, attempt);
                self.commit(executor, &artifact, eval_value.as_ref().map(|(v, _)| v));
                return Ok(GateResult {
                    outcome: GateOutcome::Accepted,
                    artifact,
                    attempts: attempt,
                    last_check: Some(check),
                });
            }

            let stagnated =
                self.stagnation_limit > 0 && stagnation_hits + 1 >= self.stagnation_limit;
            if attempt < max_attempts && !stagnated {
                // This iteration's output is discarded; its invocation
                // records are downgraded to retried.
                executor.recorder().mark_superseded(&self.generator.name, attempt);
                executor.recorder().mark_superseded(&self.evaluator.name, attempt);
                self.append_check(
                    executor,
                    &check_stage,
                    CheckDisposition::Retry {
                        reasons: &check.feedback,
                    },
                    attempt,
                );
                feedback = Some(RetryFeedback {
                    attempt: attempt + 1,
                    reasons: check.feedback.clone(),
                    evaluation: eval_value.as_ref().map(|(_, e)| e.clone()),
                    previous_output: Some(artifact.clone()),
                });
                attempt += 1;
                continue;
            }

            if stagnated {
                tracing::warn!(
                    gate = %self.name,
                    attempt,
                    "Generator output stagnated; giving up early"
                );
            }
            return self.finish_exhausted(
                executor,
                &check_stage,
                last_artifact,
                eval_value.map(|(v, _)| v),
                Some(check),
                attempt,
            );
        }
    }

    /// Commits the flagged last artifact, or fails if there is none.
    fn finish_exhausted(
        &self,
        executor: &StageExecutor,
        check_stage: &str,
        last_artifact: Option<serde_json::Value>,
        eval_value: Option<serde_json::Value>,
        last_check: Option<ThresholdCheckResult>,
        attempts: u32,
    ) -> Result<GateResult, DeckflowError> {
        self.trace_phase(GatePhase::Exhausted, attempts);
        let Some(artifact) = last_artifact else {
            return Err(DeckflowError::GateWithoutOutput {
                gate: self.name.clone(),
            });
        };

        self.append_check(executor, check_stage, CheckDisposition::ExhaustedCommit, attempts);
        self.commit(executor, &artifact, eval_value.as_ref());
        tracing::warn!(
            gate = %self.name,
            attempts,
            "Quality gate not met; committing last output best-effort"
        );

        Ok(GateResult {
            outcome: GateOutcome::Exhausted,
            artifact,
            attempts,
            last_check,
        })
    }

    fn commit(
        &self,
        executor: &StageExecutor,
        artifact: &serde_json::Value,
        eval_value: Option<&serde_json::Value>,
    ) {
        executor
            .state()
            .set(&self.generator.output_key, artifact.clone());
        if let Some(value) = eval_value {
            executor.state().set(&self.evaluator.output_key, value.clone());
        }
    }

    fn append_check(
        &self,
        executor: &StageExecutor,
        check_stage: &str,
        disposition: CheckDisposition<'_>,
        attempt: u32,
    ) {
        let started_at = iso_timestamp();
        let record = match disposition {
            CheckDisposition::Accept => {
                ExecutionRecord::success(check_stage, started_at, 0.0, attempt).with_gate_met(true)
            }
            CheckDisposition::ExhaustedCommit => {
                ExecutionRecord::success(check_stage, started_at, 0.0, attempt).with_gate_met(false)
            }
            CheckDisposition::Retry { reasons } => {
                ExecutionRecord::retried(check_stage, started_at, 0.0, attempt, reasons.join("; "))
            }
        };
        executor.recorder().append(record);
    }

    fn trace_phase(&self, phase: GatePhase, attempt: u32) {
        tracing::debug!(gate = %self.name, phase = %phase, attempt, "Gate transition");
    }
}

enum CheckDisposition<'a> {
    Accept,
    ExhaustedCommit,
    Retry { reasons: &'a [String] },
}

/// Stable hash of a generated artifact for stagnation detection.
#[must_use]
pub fn hash_artifact(value: &serde_json::Value) -> Option<String> {
    let serialized = serde_json::to_string(value).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

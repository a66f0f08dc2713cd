//! Evaluator output and threshold check types.

use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured output of an evaluator stage.
///
/// Mirrors the critic review shape: an overall acceptability verdict, a
/// 0-100 quality score, named check scores in 0.0-1.0, and free-form
/// feedback that the next generation attempt can act on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the evaluator judged the artifact acceptable.
    #[serde(default)]
    pub is_acceptable: bool,

    /// Overall quality score from 0 to 100.
    #[serde(default)]
    pub overall_quality_score: f64,

    /// Named per-check scores (e.g. `hallucination`, `safety`), 0.0-1.0.
    #[serde(default)]
    pub checks: BTreeMap<String, f64>,

    /// What the artifact does well.
    #[serde(default)]
    pub strengths: Vec<String>,

    /// Identified weaknesses.
    #[serde(default)]
    pub weaknesses: Vec<String>,

    /// Actionable recommendations for the next attempt.
    #[serde(default)]
    pub recommendations: Vec<String>,

    /// Free-form evaluation notes.
    #[serde(default)]
    pub evaluation_notes: String,
}

impl Evaluation {
    /// Parses an evaluation from a raw artifact value.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MalformedOutput`] if the value does not
    /// deserialize into the expected structure.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, StageError> {
        if !value.is_object() {
            return Err(StageError::malformed("evaluator output is not an object"));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| StageError::malformed(format!("evaluator output: {e}")))
    }

    /// Collects the failure reasons an unacceptable evaluation reported.
    #[must_use]
    pub fn failure_reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self.weaknesses.clone();
        if reasons.is_empty() && !self.evaluation_notes.is_empty() {
            reasons.push(self.evaluation_notes.clone());
        }
        if reasons.is_empty() {
            reasons.push("Quality check failed".to_string());
        }
        reasons
    }
}

/// Result of applying a threshold policy to an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdCheckResult {
    /// Whether the evaluation passed the threshold.
    pub passed: bool,

    /// The score the decision was based on.
    pub score: f64,

    /// Reasons the check failed, consumed by the next generator attempt.
    #[serde(default)]
    pub feedback: Vec<String>,

    /// The loop iteration at which this result was produced (1-indexed).
    pub iteration: u32,
}

/// A deterministic, local accept/reject decision over an evaluation.
///
/// Implementations must be pure: no external calls, no randomness. The
/// same evaluation always yields the same decision.
pub trait ThresholdPolicy: Send + Sync {
    /// Applies the policy to an evaluation.
    fn check(&self, evaluation: &Evaluation, iteration: u32) -> ThresholdCheckResult;
}

/// Threshold policy over the overall score and named checks.
///
/// All comparisons are inclusive: a score exactly at a cutoff passes.
#[derive(Debug, Clone)]
pub struct ScoreThreshold {
    /// Minimum overall quality score (0-100).
    pub min_score: f64,
    /// Require `is_acceptable` to be set by the evaluator.
    pub require_acceptable: bool,
    /// Minimum values for named checks (0.0-1.0); a missing check counts
    /// as 0.0.
    pub min_checks: BTreeMap<String, f64>,
}

impl ScoreThreshold {
    /// Creates a policy with a minimum overall score.
    #[must_use]
    pub fn new(min_score: f64) -> Self {
        Self {
            min_score,
            require_acceptable: false,
            min_checks: BTreeMap::new(),
        }
    }

    /// Requires the evaluator's acceptability verdict in addition to the
    /// score cutoffs.
    #[must_use]
    pub fn require_acceptable(mut self) -> Self {
        self.require_acceptable = true;
        self
    }

    /// Adds a minimum value for a named check.
    #[must_use]
    pub fn with_min_check(mut self, name: impl Into<String>, min: f64) -> Self {
        self.min_checks.insert(name.into(), min);
        self
    }
}

impl ThresholdPolicy for ScoreThreshold {
    fn check(&self, evaluation: &Evaluation, iteration: u32) -> ThresholdCheckResult {
        let mut feedback = Vec::new();

        if evaluation.overall_quality_score < self.min_score {
            feedback.push(format!(
                "Overall quality score {:.1} below cutoff {:.1}",
                evaluation.overall_quality_score, self.min_score
            ));
        }

        if self.require_acceptable && !evaluation.is_acceptable {
            feedback.push("Evaluator marked the artifact as not acceptable".to_string());
        }

        for (name, min) in &self.min_checks {
            let actual = evaluation.checks.get(name).copied().unwrap_or(0.0);
            if actual < *min {
                feedback.push(format!("Check '{name}' scored {actual:.2}, below {min:.2}"));
            }
        }

        let passed = feedback.is_empty();
        if !passed {
            feedback.extend(evaluation.failure_reasons());
        }

        ThresholdCheckResult {
            passed,
            score: evaluation.overall_quality_score,
            feedback,
            iteration,
        }
    }
}

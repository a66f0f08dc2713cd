//! Run configuration for the presentation pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default minimum overall quality score for gated artifacts (0-100).
pub const DEFAULT_MIN_QUALITY_SCORE: f64 = 70.0;

/// Default minimum hallucination-check score for outlines (0.0-1.0,
/// higher means fewer hallucinations).
pub const OUTLINE_HALLUCINATION_THRESHOLD: f64 = 0.8;

/// Default minimum safety-check score for outlines (0.0-1.0).
pub const OUTLINE_SAFETY_THRESHOLD: f64 = 0.9;

/// Configuration for the presentation to generate.
///
/// Optional fields are omitted from prompts when empty; the generator is
/// asked to infer scenario and audience from the report when they are not
/// provided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Type of presentation (pitching, academic, teaching, ...).
    #[serde(default)]
    pub scenario: String,

    /// Presentation duration (e.g. "10 minutes").
    #[serde(default)]
    pub duration: String,

    /// Target audience (C-level, colleagues, students, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,

    /// Free-form custom instructions.
    #[serde(default)]
    pub custom_instruction: String,

    /// Raw text content of the source report.
    #[serde(default)]
    pub report_content: String,

    /// URL the report was loaded from, if any. Kept for the trace; the
    /// core never fetches it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,

    /// Write committed artifacts as JSON files for debugging.
    #[serde(default)]
    pub save_intermediate: bool,

    /// Directory for intermediate artifacts and the trace file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Quality-gate settings.
    #[serde(default)]
    pub gates: GateConfig,
}

impl RunConfig {
    /// Creates a config for a report given as raw text.
    #[must_use]
    pub fn new(report_content: impl Into<String>) -> Self {
        Self {
            report_content: report_content.into(),
            ..Self::default()
        }
    }

    /// Sets the scenario.
    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    /// Sets the target audience.
    #[must_use]
    pub fn with_target_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = Some(audience.into());
        self
    }

    /// Sets the custom instruction.
    #[must_use]
    pub fn with_custom_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.custom_instruction = instruction.into();
        self
    }

    /// Sets the output directory and enables intermediate saving.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self.save_intermediate = true;
        self
    }

    /// Sets the gate configuration.
    #[must_use]
    pub fn with_gates(mut self, gates: GateConfig) -> Self {
        self.gates = gates;
        self
    }

    /// Returns true if a scenario was provided rather than inferred.
    #[must_use]
    pub fn scenario_provided(&self) -> bool {
        !self.scenario.trim().is_empty()
    }
}

/// Quality-gate attempt budgets and score cutoffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Maximum generation attempts for the outline gate.
    pub outline_max_attempts: u32,

    /// Maximum generation attempts for the slide layout gate.
    pub layout_max_attempts: u32,

    /// Minimum overall quality score for both gates (0-100, inclusive).
    pub min_quality_score: f64,

    /// Minimum outline hallucination-check score (0.0-1.0, inclusive).
    pub hallucination_threshold: f64,

    /// Minimum outline safety-check score (0.0-1.0, inclusive).
    pub safety_threshold: f64,

    /// Consecutive identical generator outputs before giving up early.
    /// The first output counts, so 2 means one repeat; 0 disables.
    pub stagnation_limit: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            outline_max_attempts: 2,
            layout_max_attempts: 2,
            min_quality_score: DEFAULT_MIN_QUALITY_SCORE,
            hallucination_threshold: OUTLINE_HALLUCINATION_THRESHOLD,
            safety_threshold: OUTLINE_SAFETY_THRESHOLD,
            stagnation_limit: 2,
        }
    }
}

impl GateConfig {
    /// Sets the outline gate attempt budget.
    #[must_use]
    pub fn with_outline_max_attempts(mut self, attempts: u32) -> Self {
        self.outline_max_attempts = attempts;
        self
    }

    /// Sets the layout gate attempt budget.
    #[must_use]
    pub fn with_layout_max_attempts(mut self, attempts: u32) -> Self {
        self.layout_max_attempts = attempts;
        self
    }

    /// Sets the minimum overall quality score.
    #[must_use]
    pub fn with_min_quality_score(mut self, score: f64) -> Self {
        self.min_quality_score = score;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let gates = GateConfig::default();
        assert_eq!(gates.outline_max_attempts, 2);
        assert_eq!(gates.layout_max_attempts, 2);
        assert!((gates.min_quality_score - 70.0).abs() < f64::EPSILON);
        assert!((gates.hallucination_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(gates.stagnation_limit, 2);
    }

    #[test]
    fn test_builder() {
        let config = RunConfig::new("report text")
            .with_scenario("pitching")
            .with_duration("10 minutes")
            .with_target_audience("C-level")
            .with_gates(GateConfig::default().with_outline_max_attempts(3));

        assert!(config.scenario_provided());
        assert_eq!(config.gates.outline_max_attempts, 3);
        assert_eq!(config.target_audience.as_deref(), Some("C-level"));
    }

    #[test]
    fn test_scenario_not_provided_when_blank() {
        let config = RunConfig::new("report").with_scenario("   ");
        assert!(!config.scenario_provided());
    }
}

//! Feedback assembled by the retry loop for the next generation attempt.

use crate::core::Evaluation;

/// Everything attempt n+1 gets to see about attempt n.
///
/// The loop controller assembles this, not the generator: it includes the
/// prior evaluator output, the specific threshold failure reasons, and
/// the superseded artifact so regeneration is informed rather than blind.
#[derive(Debug, Clone, Default)]
pub struct RetryFeedback {
    /// The attempt this feedback feeds into (2-indexed onward).
    pub attempt: u32,
    /// The threshold failure reasons from the prior iteration.
    pub reasons: Vec<String>,
    /// The prior evaluator output, if it was well-formed.
    pub evaluation: Option<Evaluation>,
    /// The artifact the prior attempt generated.
    pub previous_output: Option<serde_json::Value>,
}

impl RetryFeedback {
    /// Renders the feedback as bracket-tagged prompt sections.
    #[must_use]
    pub fn render(&self) -> String {
        let mut sections = Vec::new();

        if let Some(previous) = &self.previous_output {
            let serialized = serde_json::to_string(previous).unwrap_or_default();
            sections.push(format!(
                "[PREVIOUS_OUTPUT]\nThe following output was previously generated but needs improvement:\n{serialized}\n[END_PREVIOUS_OUTPUT]"
            ));
        }

        let mut review_parts = Vec::new();
        if let Some(evaluation) = &self.evaluation {
            if !evaluation.weaknesses.is_empty() {
                review_parts.push(format!(
                    "**Weaknesses identified:**\n{}",
                    bullet_list(&evaluation.weaknesses)
                ));
            }
            if !evaluation.recommendations.is_empty() {
                review_parts.push(format!(
                    "**Recommendations:**\n{}",
                    bullet_list(&evaluation.recommendations)
                ));
            }
            if !evaluation.evaluation_notes.is_empty() {
                review_parts.push(format!(
                    "**Evaluation Notes:**\n{}",
                    evaluation.evaluation_notes
                ));
            }
        }
        if review_parts.is_empty() && !self.reasons.is_empty() {
            review_parts.push(format!("**Failure reasons:**\n{}", bullet_list(&self.reasons)));
        }

        if !review_parts.is_empty() {
            sections.push(format!(
                "[PREVIOUS_CRITIC_REVIEW]\nThe previous output was evaluated and found to need improvement. Please address the following feedback:\n\n{}\n[END_PREVIOUS_CRITIC_REVIEW]",
                review_parts.join("\n\n")
            ));
        }

        sections.join("\n\n")
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

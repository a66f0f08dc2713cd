//! Outline generation and its critic.

use crate::config::RunConfig;
use crate::errors::StageError;
use crate::service::{extract_json, ContentService, GenerationRequest};
use crate::stage::{Stage, StageInput};
use crate::stages::prompt::{artifact_block, config_sections, feedback_suffix};
use crate::stages::{OUTLINE_KEY, REPORT_KNOWLEDGE_KEY};
use async_trait::async_trait;
use std::sync::Arc;

/// Generates the slide-by-slide presentation outline from report
/// knowledge. On retry attempts the prompt carries the superseded
/// outline and the critic's review.
#[derive(Debug)]
pub struct OutlineGeneratorStage {
    service: Arc<dyn ContentService>,
    config: RunConfig,
}

impl OutlineGeneratorStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ContentService>, config: RunConfig) -> Self {
        Self { service, config }
    }
}

#[async_trait]
impl Stage for OutlineGeneratorStage {
    fn name(&self) -> &str {
        "outline_generator"
    }

    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError> {
        let knowledge = input.artifact(REPORT_KNOWLEDGE_KEY)?;
        let prompt = format!(
            "{knowledge}\n\n{sections}\n\nGenerate a presentation outline: a logical flow of \
             slides with titles, key points, estimated timing, and content notes. \
             Respond with a single JSON object containing a `slides` array.{feedback}",
            knowledge = artifact_block("REPORT_KNOWLEDGE", knowledge),
            sections = config_sections(&self.config),
            feedback = feedback_suffix(&input),
        );

        let raw = self
            .service
            .generate(GenerationRequest::new(self.name(), prompt))
            .await?;
        let outline = extract_json(&raw)?;
        if outline.get("slides").and_then(serde_json::Value::as_array).is_none() {
            return Err(StageError::invalid("outline is missing a `slides` array"));
        }
        Ok(outline)
    }
}

/// Reviews a candidate outline against the report knowledge.
///
/// Produces the critic review shape the quality gate understands:
/// `is_acceptable`, `overall_quality_score`, hallucination and safety
/// check scores, weaknesses, and recommendations.
#[derive(Debug)]
pub struct OutlineCriticStage {
    service: Arc<dyn ContentService>,
}

impl OutlineCriticStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ContentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Stage for OutlineCriticStage {
    fn name(&self) -> &str {
        "outline_critic"
    }

    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError> {
        let knowledge = input.artifact(REPORT_KNOWLEDGE_KEY)?;
        let outline = input.artifact(OUTLINE_KEY)?;
        let prompt = format!(
            "{knowledge}\n\n{outline}\n\nReview this presentation outline against the report \
             knowledge. Check factual grounding (hallucination), content safety, narrative \
             flow, and timing. Respond with a single JSON object: is_acceptable, \
             overall_quality_score (0-100), checks with `hallucination` and `safety` scores \
             (0.0-1.0), strengths, weaknesses, recommendations, evaluation_notes.",
            knowledge = artifact_block("REPORT_KNOWLEDGE", knowledge),
            outline = artifact_block("PRESENTATION_OUTLINE", outline),
        );

        let raw = self
            .service
            .generate(GenerationRequest::new(self.name(), prompt))
            .await?;
        extract_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::RetryFeedback;
    use crate::testing::ScriptedService;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn knowledge_input() -> StageInput {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            REPORT_KNOWLEDGE_KEY.to_string(),
            json!({"summary": "Q3 grew"}),
        );
        StageInput::new(artifacts)
    }

    #[tokio::test]
    async fn test_generator_requires_slides_array() {
        let service = Arc::new(
            ScriptedService::new().with_json("outline_generator", &json!({"title": "Deck"})),
        );
        let stage = OutlineGeneratorStage::new(service, RunConfig::new("report"));

        let err = stage.execute(knowledge_input()).await.unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("slides"));
    }

    #[tokio::test]
    async fn test_generator_includes_feedback_on_retry() {
        let outline = json!({"slides": [{"slide_number": 1, "title": "Intro"}]});
        let service = Arc::new(
            ScriptedService::new().with_json("outline_generator", &outline),
        );
        let stage = OutlineGeneratorStage::new(service.clone(), RunConfig::new("report"));

        let mut input = knowledge_input();
        input.attempt = 2;
        input.feedback = Some(RetryFeedback {
            attempt: 2,
            reasons: vec!["overall quality score 55 below cutoff 70".to_string()],
            evaluation: None,
            previous_output: Some(json!({"slides": []})),
        });

        let out = stage.execute(input).await.unwrap();
        assert_eq!(out, outline);

        let prompt = &service.requests()[0].prompt;
        assert!(prompt.contains("[REPORT_KNOWLEDGE]"));
        assert!(prompt.contains("[PREVIOUS_OUTPUT]"));
        assert!(prompt.contains("[PREVIOUS_CRITIC_REVIEW]"));
    }

    #[tokio::test]
    async fn test_critic_sees_candidate_outline() {
        let review = json!({
            "is_acceptable": true,
            "overall_quality_score": 85.0,
            "checks": {"hallucination": 0.95, "safety": 1.0},
        });
        let service = Arc::new(ScriptedService::new().with_json("outline_critic", &review));
        let stage = OutlineCriticStage::new(service.clone());

        let mut input = knowledge_input();
        input
            .artifacts
            .insert(OUTLINE_KEY.to_string(), json!({"slides": [{"title": "Intro"}]}));

        let out = stage.execute(input).await.unwrap();
        assert_eq!(out["overall_quality_score"], 85.0);

        let prompt = &service.requests()[0].prompt;
        assert!(prompt.contains("[PRESENTATION_OUTLINE]"));
        assert!(prompt.contains("Intro"));
    }

    #[tokio::test]
    async fn test_critic_without_candidate_is_invalid() {
        let service = Arc::new(ScriptedService::new());
        let stage = OutlineCriticStage::new(service);

        let err = stage.execute(knowledge_input()).await.unwrap_err();
        assert!(err.to_string().contains(OUTLINE_KEY));
    }
}

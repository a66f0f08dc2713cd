//! Slide deck and speaker script generation, plus the layout critic.

use crate::config::RunConfig;
use crate::errors::StageError;
use crate::service::{extract_json, ContentService, GenerationRequest};
use crate::stage::{Stage, StageInput};
use crate::stages::prompt::{artifact_block, config_sections, feedback_suffix};
use crate::stages::{OUTLINE_KEY, REPORT_KNOWLEDGE_KEY, SLIDE_AND_SCRIPT_KEY};
use async_trait::async_trait;
use std::sync::Arc;

/// Expands the accepted outline into a full slide deck with speaker
/// script. Each slide carries visual-element hints (charts needed,
/// image keywords) that the asset stages consume downstream.
#[derive(Debug)]
pub struct SlideScriptGeneratorStage {
    service: Arc<dyn ContentService>,
    config: RunConfig,
}

impl SlideScriptGeneratorStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ContentService>, config: RunConfig) -> Self {
        Self { service, config }
    }
}

#[async_trait]
impl Stage for SlideScriptGeneratorStage {
    fn name(&self) -> &str {
        "slide_and_script_generator"
    }

    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError> {
        let knowledge = input.artifact(REPORT_KNOWLEDGE_KEY)?;
        let outline = input.artifact(OUTLINE_KEY)?;
        let prompt = format!(
            "{knowledge}\n\n{outline}\n\n{sections}\n\nExpand this outline into a complete \
             slide deck with a speaker script. For each slide provide title, content, \
             speaker_notes, and visual_elements (charts_needed, chart_spec, image_keywords). \
             Respond with a single JSON object containing a `slides` array.{feedback}",
            knowledge = artifact_block("REPORT_KNOWLEDGE", knowledge),
            outline = artifact_block("PRESENTATION_OUTLINE", outline),
            sections = config_sections(&self.config),
            feedback = feedback_suffix(&input),
        );

        let raw = self
            .service
            .generate(GenerationRequest::new(self.name(), prompt))
            .await?;
        let deck = extract_json(&raw)?;
        if deck.get("slides").and_then(serde_json::Value::as_array).is_none() {
            return Err(StageError::invalid("slide deck is missing a `slides` array"));
        }
        Ok(deck)
    }
}

/// Reviews a candidate slide deck for layout quality: slide density,
/// visual balance, script alignment.
#[derive(Debug)]
pub struct LayoutCriticStage {
    service: Arc<dyn ContentService>,
}

impl LayoutCriticStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ContentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Stage for LayoutCriticStage {
    fn name(&self) -> &str {
        "layout_critic"
    }

    async fn execute(&self, input: StageInput) -> Result<serde_json::Value, StageError> {
        let outline = input.artifact(OUTLINE_KEY)?;
        let deck = input.artifact(SLIDE_AND_SCRIPT_KEY)?;
        let prompt = format!(
            "{outline}\n\n{deck}\n\nReview this slide deck's layout against the outline. \
             Check slide density, visual balance, layout variety, and script alignment. \
             Respond with a single JSON object: is_acceptable, overall_quality_score \
             (0-100), strengths, weaknesses, recommendations, evaluation_notes.",
            outline = artifact_block("PRESENTATION_OUTLINE", outline),
            deck = artifact_block("SLIDE_DECK", deck),
        );

        let raw = self
            .service
            .generate(GenerationRequest::new(self.name(), prompt))
            .await?;
        extract_json(&raw)
    }
}

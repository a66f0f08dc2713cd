//! Asset stages: chart generation and image prefetch.
//!
//! These run as the parallel fork after the slide deck is accepted.
//! Chart generation only calls the service when a slide actually asks
//! for a chart; image prefetch is purely local keyword extraction.

use crate::errors::StageError;
use crate::service::{extract_json, ContentService, GenerationRequest};
use crate::stage::{Stage, StageInput};
use crate::stages::prompt::artifact_block;
use crate::stages::SLIDE_AND_SCRIPT_KEY;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Returns the slide numbers that declare `charts_needed` with a
/// concrete `chart_spec`.
fn slides_needing_charts(deck: &Value) -> Vec<u64> {
    deck.get("slides")
        .and_then(Value::as_array)
        .map(|slides| {
            slides
                .iter()
                .filter(|slide| {
                    let visual = &slide["visual_elements"];
                    visual["charts_needed"].as_bool().unwrap_or(false)
                        && !visual["chart_spec"].is_null()
                })
                .filter_map(|slide| slide["slide_number"].as_u64())
                .collect()
        })
        .unwrap_or_default()
}

/// Generates chart data for slides that request one.
///
/// When no slide needs a chart the stage resolves locally with a
/// `skipped` status and no service call is made.
#[derive(Debug)]
pub struct ChartGeneratorStage {
    service: Arc<dyn ContentService>,
}

impl ChartGeneratorStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ContentService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Stage for ChartGeneratorStage {
    fn name(&self) -> &str {
        "chart_generator"
    }

    async fn execute(&self, input: StageInput) -> Result<Value, StageError> {
        let deck = input.artifact(SLIDE_AND_SCRIPT_KEY)?;
        let slide_numbers = slides_needing_charts(deck);
        if slide_numbers.is_empty() {
            return Ok(json!({
                "status": "skipped",
                "reason": "no slides declare charts_needed",
                "slides_with_charts": [],
            }));
        }

        let prompt = format!(
            "{deck}\n\nGenerate chart data for the slides whose visual_elements declare \
             charts_needed, following each slide's chart_spec. Respond with a single JSON \
             object mapping slide_number to chart_data (labels, series, chart_type).",
            deck = artifact_block("SLIDE_DECK", deck),
        );
        let raw = self
            .service
            .generate(GenerationRequest::new(self.name(), prompt))
            .await?;
        let charts = extract_json(&raw)?;
        if !charts.is_object() {
            return Err(StageError::invalid("chart data must be a JSON object"));
        }

        Ok(json!({
            "status": "success",
            "slides_with_charts": slide_numbers,
            "charts": charts,
        }))
    }
}

/// Collects image search keywords per slide from the deck's
/// visual-element hints. Local work only; the actual fetch lives
/// outside the orchestration core.
#[derive(Debug, Default)]
pub struct ImagePrefetchStage;

impl ImagePrefetchStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for ImagePrefetchStage {
    fn name(&self) -> &str {
        "image_prefetch"
    }

    async fn execute(&self, input: StageInput) -> Result<Value, StageError> {
        let deck = input.artifact(SLIDE_AND_SCRIPT_KEY)?;
        let slides = deck
            .get("slides")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::invalid("slide deck is missing a `slides` array"))?;

        let mut entries = Vec::new();
        let mut keyword_count = 0usize;
        for slide in slides {
            let Some(number) = slide["slide_number"].as_u64() else {
                continue;
            };
            let keywords: Vec<&str> = slide["visual_elements"]["image_keywords"]
                .as_array()
                .map(|kws| kws.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if keywords.is_empty() {
                continue;
            }
            keyword_count += keywords.len();
            entries.push(json!({
                "slide_number": number,
                "keywords": keywords,
            }));
        }

        Ok(json!({
            "slides": entries,
            "keyword_count": keyword_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedService;
    use std::collections::BTreeMap;

    fn deck_input(deck: Value) -> StageInput {
        let mut artifacts = BTreeMap::new();
        artifacts.insert(SLIDE_AND_SCRIPT_KEY.to_string(), deck);
        StageInput::new(artifacts)
    }

    #[tokio::test]
    async fn test_chart_generator_skips_without_chart_slides() {
        let service = Arc::new(ScriptedService::new());
        let stage = ChartGeneratorStage::new(service.clone());

        let deck = json!({
            "slides": [{"slide_number": 1, "visual_elements": {"charts_needed": false}}],
        });
        let out = stage.execute(deck_input(deck)).await.unwrap();
        assert_eq!(out["status"], "skipped");
        assert!(service.requests().is_empty());
    }

    #[tokio::test]
    async fn test_chart_spec_required_for_chart_slide() {
        let service = Arc::new(ScriptedService::new());
        let stage = ChartGeneratorStage::new(service);

        // charts_needed without a spec does not count.
        let deck = json!({
            "slides": [{"slide_number": 2, "visual_elements": {"charts_needed": true}}],
        });
        let out = stage.execute(deck_input(deck)).await.unwrap();
        assert_eq!(out["status"], "skipped");
    }

    #[tokio::test]
    async fn test_chart_generator_calls_service_for_chart_slides() {
        let charts = json!({"2": {"chart_type": "bar", "labels": ["Q1", "Q2"]}});
        let service = Arc::new(ScriptedService::new().with_json("chart_generator", &charts));
        let stage = ChartGeneratorStage::new(service.clone());

        let deck = json!({
            "slides": [
                {"slide_number": 1, "visual_elements": {"charts_needed": false}},
                {"slide_number": 2, "visual_elements": {
                    "charts_needed": true,
                    "chart_spec": "quarterly revenue bar chart",
                }},
            ],
        });
        let out = stage.execute(deck_input(deck)).await.unwrap();
        assert_eq!(out["status"], "success");
        assert_eq!(out["slides_with_charts"], json!([2]));
        assert_eq!(out["charts"]["2"]["chart_type"], "bar");
        assert_eq!(service.request_count("chart_generator"), 1);
    }

    #[tokio::test]
    async fn test_image_prefetch_collects_keywords() {
        let stage = ImagePrefetchStage::new();
        let deck = json!({
            "slides": [
                {"slide_number": 1, "visual_elements": {"image_keywords": ["teamwork", "office"]}},
                {"slide_number": 2, "visual_elements": {}},
                {"slide_number": 3, "visual_elements": {"image_keywords": ["growth"]}},
            ],
        });

        let out = stage.execute(deck_input(deck)).await.unwrap();
        assert_eq!(out["keyword_count"], 3);
        assert_eq!(out["slides"][0]["slide_number"], 1);
        assert_eq!(out["slides"][1]["keywords"], json!(["growth"]));
    }

    #[tokio::test]
    async fn test_image_prefetch_rejects_deck_without_slides() {
        let stage = ImagePrefetchStage::new();
        let err = stage.execute(deck_input(json!({}))).await.unwrap_err();
        assert!(err.is_malformed());
    }
}

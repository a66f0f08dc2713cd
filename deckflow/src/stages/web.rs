//! Final web deck assembly.

use crate::errors::StageError;
use crate::stage::{Stage, StageInput};
use crate::stages::{CHART_STATUS_KEY, IMAGE_MANIFEST_KEY, SLIDE_AND_SCRIPT_KEY};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Merges the slide deck with generated charts and the image manifest
/// into the final renderable deck. Pure local assembly; no service
/// call.
#[derive(Debug, Default)]
pub struct WebSlidesStage;

impl WebSlidesStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for WebSlidesStage {
    fn name(&self) -> &str {
        "web_slides"
    }

    async fn execute(&self, input: StageInput) -> Result<Value, StageError> {
        let deck = input.artifact(SLIDE_AND_SCRIPT_KEY)?;
        let chart_status = input.artifact(CHART_STATUS_KEY)?;
        let manifest = input.artifact(IMAGE_MANIFEST_KEY)?;

        let slides = deck
            .get("slides")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::invalid("slide deck is missing a `slides` array"))?;

        let charts = chart_status.get("charts").cloned().unwrap_or(Value::Null);
        let mut merged = Vec::with_capacity(slides.len());
        for slide in slides {
            let mut slide = slide.clone();
            if let Some(number) = slide["slide_number"].as_u64() {
                let chart_data = charts.get(number.to_string());
                if let (Some(data), Some(obj)) = (chart_data, slide.as_object_mut()) {
                    obj.insert("chart_data".to_string(), data.clone());
                }
                if let Some(entry) = manifest_entry(manifest, number) {
                    if let Some(obj) = slide.as_object_mut() {
                        obj.insert("image_keywords".to_string(), entry);
                    }
                }
            }
            merged.push(slide);
        }

        let title = deck
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled Presentation");

        Ok(json!({
            "status": "success",
            "title": title,
            "slide_count": merged.len(),
            "slides": merged,
        }))
    }
}

fn manifest_entry(manifest: &Value, slide_number: u64) -> Option<Value> {
    manifest
        .get("slides")?
        .as_array()?
        .iter()
        .find(|entry| entry["slide_number"].as_u64() == Some(slide_number))
        .map(|entry| entry["keywords"].clone())
}

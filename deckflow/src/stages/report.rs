//! Report understanding: raw report text into structured knowledge.

use crate::config::RunConfig;
use crate::errors::StageError;
use crate::service::{extract_json, ContentService, GenerationRequest};
use crate::stage::{Stage, StageInput};
use crate::stages::prompt::{config_sections, tagged};
use async_trait::async_trait;
use std::sync::Arc;

/// Extracts structured knowledge from the configured report text:
/// sections, key takeaways, figures, and an audience profile. First
/// stage of the pipeline; reads the report from config rather than
/// session state.
#[derive(Debug)]
pub struct ReportUnderstandingStage {
    service: Arc<dyn ContentService>,
    config: RunConfig,
}

impl ReportUnderstandingStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ContentService>, config: RunConfig) -> Self {
        Self { service, config }
    }

    fn build_prompt(&self) -> String {
        format!(
            "{report}\n\n{sections}\n\nExtract structured knowledge from this report. \
             Analyze the content, identify key sections, figures, and takeaways. \
             Infer scenario and target_audience if not provided. \
             Respond with a single JSON object.",
            report = tagged("REPORT_CONTENT", &self.config.report_content),
            sections = config_sections(&self.config),
        )
    }
}

#[async_trait]
impl Stage for ReportUnderstandingStage {
    fn name(&self) -> &str {
        "report_understanding"
    }

    async fn execute(&self, _input: StageInput) -> Result<serde_json::Value, StageError> {
        let raw = self
            .service
            .generate(GenerationRequest::new(self.name(), self.build_prompt()))
            .await?;
        let knowledge = extract_json(&raw)?;
        if !knowledge.is_object() {
            return Err(StageError::invalid("report knowledge must be a JSON object"));
        }
        Ok(knowledge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedService;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> RunConfig {
        RunConfig::new("Q3 revenue grew 12% on cloud demand.")
            .with_scenario("pitching")
            .with_duration("10 minutes")
    }

    #[tokio::test]
    async fn test_parses_knowledge_from_response() {
        let knowledge = json!({
            "summary": "Cloud growth drove Q3",
            "sections": [{"id": "s1", "label": "Revenue"}],
        });
        let service = Arc::new(
            ScriptedService::new().with_json("report_understanding", &knowledge),
        );
        let stage = ReportUnderstandingStage::new(service.clone(), config());

        let out = stage.execute(StageInput::default()).await.unwrap();
        assert_eq!(out, knowledge);

        let requests = service.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("[REPORT_CONTENT]"));
        assert!(requests[0].prompt.contains("Q3 revenue grew 12%"));
        assert!(requests[0].prompt.contains("[SCENARIO]\npitching"));
    }

    #[tokio::test]
    async fn test_non_object_response_is_invalid() {
        let service = Arc::new(
            ScriptedService::new().with_response("report_understanding", "[1, 2, 3]"),
        );
        let stage = ReportUnderstandingStage::new(service, config());

        let err = stage.execute(StageInput::default()).await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_prose_response_is_malformed() {
        let service = Arc::new(
            ScriptedService::new().with_response("report_understanding", "I cannot do that."),
        );
        let stage = ReportUnderstandingStage::new(service, config());

        let err = stage.execute(StageInput::default()).await.unwrap_err();
        assert!(err.is_malformed());
    }
}

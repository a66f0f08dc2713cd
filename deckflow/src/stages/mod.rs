//! Concrete deck-generation stages.
//!
//! Each stage is a thin adapter over [`ContentService`]: it reads its
//! declared session-state artifacts, assembles a bracket-tagged prompt,
//! and parses the response into the artifact it commits. Stages that
//! need no generative call (image prefetch, web slides assembly) do
//! their work locally.
//!
//! [`ContentService`]: crate::service::ContentService

mod assets;
mod outline;
mod prompt;
mod report;
mod slides;
mod web;

pub use assets::{ChartGeneratorStage, ImagePrefetchStage};
pub use outline::{OutlineCriticStage, OutlineGeneratorStage};
pub use report::ReportUnderstandingStage;
pub use slides::{LayoutCriticStage, SlideScriptGeneratorStage};
pub use web::WebSlidesStage;

use crate::stage::StageDescriptor;

/// Session-state key for structured report knowledge.
pub const REPORT_KNOWLEDGE_KEY: &str = "report_knowledge";
/// Session-state key for the presentation outline.
pub const OUTLINE_KEY: &str = "presentation_outline";
/// Session-state key for the outline critic's review.
pub const OUTLINE_REVIEW_KEY: &str = "outline_review";
/// Session-state key for the slide deck with speaker script.
pub const SLIDE_AND_SCRIPT_KEY: &str = "slide_and_script";
/// Session-state key for the layout critic's review.
pub const LAYOUT_REVIEW_KEY: &str = "layout_review";
/// Session-state key for the chart generation result.
pub const CHART_STATUS_KEY: &str = "chart_generation_status";
/// Session-state key for the prefetched image manifest.
pub const IMAGE_MANIFEST_KEY: &str = "image_manifest";
/// Session-state key for the assembled web slide deck.
pub const WEB_SLIDES_KEY: &str = "web_slides_result";
/// Session-state key for the export outcome.
pub const EXPORT_RESULT_KEY: &str = "export_result";

/// Descriptor for the report understanding stage.
#[must_use]
pub fn report_understanding_descriptor() -> StageDescriptor {
    StageDescriptor::new("report_understanding", REPORT_KNOWLEDGE_KEY)
}

/// Descriptor for the outline generator (gated).
#[must_use]
pub fn outline_generator_descriptor(max_attempts: u32) -> StageDescriptor {
    StageDescriptor::new("outline_generator", OUTLINE_KEY)
        .with_inputs([REPORT_KNOWLEDGE_KEY])
        .with_max_attempts(max_attempts)
}

/// Descriptor for the outline critic.
#[must_use]
pub fn outline_critic_descriptor() -> StageDescriptor {
    StageDescriptor::new("outline_critic", OUTLINE_REVIEW_KEY).with_inputs([REPORT_KNOWLEDGE_KEY])
}

/// Descriptor for the slide and script generator (gated).
#[must_use]
pub fn slide_script_descriptor(max_attempts: u32) -> StageDescriptor {
    StageDescriptor::new("slide_and_script_generator", SLIDE_AND_SCRIPT_KEY)
        .with_inputs([REPORT_KNOWLEDGE_KEY, OUTLINE_KEY])
        .with_max_attempts(max_attempts)
}

/// Descriptor for the layout critic.
#[must_use]
pub fn layout_critic_descriptor() -> StageDescriptor {
    StageDescriptor::new("layout_critic", LAYOUT_REVIEW_KEY).with_inputs([OUTLINE_KEY])
}

/// Descriptor for the chart generator.
#[must_use]
pub fn chart_generator_descriptor() -> StageDescriptor {
    StageDescriptor::new("chart_generator", CHART_STATUS_KEY).with_inputs([SLIDE_AND_SCRIPT_KEY])
}

/// Descriptor for the image prefetch stage.
#[must_use]
pub fn image_prefetch_descriptor() -> StageDescriptor {
    StageDescriptor::new("image_prefetch", IMAGE_MANIFEST_KEY).with_inputs([SLIDE_AND_SCRIPT_KEY])
}

/// Descriptor for the web slides assembly stage.
#[must_use]
pub fn web_slides_descriptor() -> StageDescriptor {
    StageDescriptor::new("web_slides", WEB_SLIDES_KEY).with_inputs([
        SLIDE_AND_SCRIPT_KEY,
        CHART_STATUS_KEY,
        IMAGE_MANIFEST_KEY,
    ])
}

/// Descriptor for the export stage.
#[must_use]
pub fn export_descriptor() -> StageDescriptor {
    StageDescriptor::new("export", EXPORT_RESULT_KEY).with_inputs([WEB_SLIDES_KEY])
}

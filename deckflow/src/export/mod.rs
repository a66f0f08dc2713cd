//! Export contract: turning the assembled deck into a deliverable.

use crate::core::ExportStatus;
use crate::errors::StageError;
use crate::stage::{Stage, StageInput};
use crate::stages::WEB_SLIDES_KEY;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::path::PathBuf;

/// The result of an export attempt.
///
/// `partial_success` still carries a usable locator; only `error`
/// means there is nothing to hand the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    /// How the export went.
    pub status: ExportStatus,
    /// URL or filesystem path of the deliverable, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    /// Human-readable detail (warnings for partial success, cause for
    /// errors).
    #[serde(default)]
    pub detail: String,
}

impl ExportOutcome {
    /// A fully successful export.
    #[must_use]
    pub fn success(locator: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::Success,
            locator: Some(locator.into()),
            detail: String::new(),
        }
    }

    /// A usable export with degradations worth reporting.
    #[must_use]
    pub fn partial(locator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::PartialSuccess,
            locator: Some(locator.into()),
            detail: detail.into(),
        }
    }

    /// A failed export.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::Error,
            locator: None,
            detail: detail.into(),
        }
    }
}

/// Trait for deck export backends.
#[async_trait]
pub trait Exporter: Send + Sync + Debug {
    /// Exports the assembled deck, returning where it landed.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when the export cannot produce any
    /// deliverable at all; degraded-but-usable results come back as
    /// [`ExportStatus::PartialSuccess`].
    async fn export(&self, deck: &Value) -> Result<ExportOutcome, StageError>;
}

/// Writes the deck as pretty-printed JSON to a file.
#[derive(Debug)]
pub struct FileExporter {
    path: PathBuf,
}

impl FileExporter {
    /// Creates an exporter targeting the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Exporter for FileExporter {
    async fn export(&self, deck: &Value) -> Result<ExportOutcome, StageError> {
        let serialized = serde_json::to_string_pretty(deck)
            .map_err(|e| StageError::invalid(format!("deck not serializable: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StageError::transport(format!("create export dir: {e}")))?;
        }
        std::fs::write(&self.path, serialized)
            .map_err(|e| StageError::transport(format!("write export file: {e}")))?;
        Ok(ExportOutcome::success(self.path.display().to_string()))
    }
}

/// Adapts an [`Exporter`] into a pipeline stage. The export outcome is
/// committed as the final artifact, so a partial success is visible in
/// the run result rather than swallowed.
#[derive(Debug)]
pub struct ExportStage<E: Exporter> {
    exporter: E,
}

impl<E: Exporter> ExportStage<E> {
    /// Creates the stage.
    #[must_use]
    pub fn new(exporter: E) -> Self {
        Self { exporter }
    }
}

#[async_trait]
impl<E: Exporter> Stage for ExportStage<E> {
    fn name(&self) -> &str {
        "export"
    }

    async fn execute(&self, input: StageInput) -> Result<Value, StageError> {
        let deck = input.artifact(WEB_SLIDES_KEY)?;
        let outcome = self.exporter.export(deck).await?;
        serde_json::to_value(&outcome)
            .map_err(|e| StageError::invalid(format!("export outcome not serializable: {e}")))
    }
}

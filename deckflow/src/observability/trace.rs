//! Trace persistence and tracing-subscriber setup.

use super::ObservabilityRecorder;
use crate::errors::DeckflowError;
use serde::Serialize;
use std::path::Path;

/// Serialized run trace: the ordered records plus computed metrics.
///
/// Written to a durable sink at run end and consumed by external
/// dashboards; the core does not interpret it further.
#[derive(Debug, Serialize)]
struct TraceDocument {
    pipeline: String,
    started_at: String,
    finished_at: Option<String>,
    records: Vec<crate::core::ExecutionRecord>,
    metrics: super::PipelineMetrics,
}

/// Persists a recorder's full trace to a JSON file.
#[derive(Debug, Clone, Default)]
pub struct TraceWriter;

impl TraceWriter {
    /// Creates a trace writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Writes the trace document to `path`, creating parent directories
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns [`DeckflowError::Io`] on filesystem failures or
    /// [`DeckflowError::Serialization`] if the trace cannot be encoded.
    pub fn persist(
        &self,
        recorder: &ObservabilityRecorder,
        path: &Path,
    ) -> Result<(), DeckflowError> {
        let document = TraceDocument {
            pipeline: recorder.pipeline().to_string(),
            started_at: recorder.started_at().to_string(),
            finished_at: recorder.finished_at(),
            records: recorder.records(),
            metrics: recorder.metrics(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), records = document.records.len(), "Trace persisted");
        Ok(())
    }
}

/// Initializes the global tracing subscriber from `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

//! Structured execution recording, run metrics, and trace persistence.

mod recorder;
mod trace;

pub use recorder::{ObservabilityRecorder, PipelineMetrics};
pub use trace::{init_tracing, TraceWriter};

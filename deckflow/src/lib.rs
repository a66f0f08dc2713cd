//! # Deckflow
//!
//! An orchestration core for turning source documents into presentation
//! decks through a fixed multi-stage pipeline.
//!
//! Deckflow coordinates generative stages without knowing anything
//! about the model behind them:
//!
//! - **Stage-based execution**: Each stage reads declared artifacts
//!   from session state and commits one output
//! - **Quality gates**: Generator/critic pairs with bounded retry
//!   loops and assembled feedback between attempts
//! - **Fork/join**: Independent asset stages run concurrently
//! - **Observability**: An append-only execution trace with derived
//!   run metrics, persisted at run end
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deckflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = RunConfig::new(report_text)
//!     .with_scenario("pitching")
//!     .with_duration("10 minutes")
//!     .with_output_dir("output");
//!
//! let pipeline = PipelineOrchestrator::standard_deck(service, config);
//! let run = pipeline.run().await?;
//! println!("deck at {:?}", run.artifact("export_result"));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod export;
pub mod gate;
pub mod observability;
pub mod pipeline;
pub mod service;
pub mod stage;
pub mod stages;
pub mod state;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{GateConfig, RunConfig};
    pub use crate::core::{
        Evaluation, ExecutionRecord, ExportStatus, GateOutcome, ScoreThreshold, StageStatus,
        ThresholdCheckResult, ThresholdPolicy,
    };
    pub use crate::errors::{DeckflowError, MissingArtifactError, StageError};
    pub use crate::export::{ExportOutcome, ExportStage, Exporter, FileExporter};
    pub use crate::gate::{GatePhase, GateResult, QualityGate, RetryFeedback};
    pub use crate::observability::{
        init_tracing, ObservabilityRecorder, PipelineMetrics, TraceWriter,
    };
    pub use crate::pipeline::{PipelineFailure, PipelineOrchestrator, PipelineRun};
    pub use crate::service::{extract_json, ContentService, GenerationRequest};
    pub use crate::stage::{
        BackoffStrategy, FnStage, JitterStrategy, Stage, StageDescriptor, StageExecutor,
        StageInput, TransportRetryPolicy,
    };
    pub use crate::state::SessionState;
}

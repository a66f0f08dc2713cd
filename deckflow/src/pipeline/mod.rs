//! Pipeline orchestration: fixed stage sequence, fork/join, run result.

#[cfg(test)]
mod integration_tests;

use crate::config::RunConfig;
use crate::core::{ExecutionRecord, GateOutcome, ScoreThreshold};
use crate::errors::DeckflowError;
use crate::export::{ExportStage, FileExporter};
use crate::gate::QualityGate;
use crate::observability::{ObservabilityRecorder, PipelineMetrics, TraceWriter};
use crate::service::ContentService;
use crate::stage::{Stage, StageDescriptor, StageExecutor, TransportRetryPolicy};
use crate::stages::{
    chart_generator_descriptor, export_descriptor, image_prefetch_descriptor,
    layout_critic_descriptor, outline_critic_descriptor, outline_generator_descriptor,
    report_understanding_descriptor, slide_script_descriptor, web_slides_descriptor,
    ChartGeneratorStage, ImagePrefetchStage, LayoutCriticStage, OutlineCriticStage,
    OutlineGeneratorStage, ReportUnderstandingStage, SlideScriptGeneratorStage, WebSlidesStage,
};
use crate::state::SessionState;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// One element of the pipeline sequence.
enum Element {
    /// A single stage whose failure is fatal for the run.
    Bare {
        descriptor: StageDescriptor,
        stage: Arc<dyn Stage>,
    },
    /// A quality-gated generator/evaluator pair.
    Gated(QualityGate),
    /// Independent stages run concurrently; the join fails if any
    /// branch fails.
    ForkJoin {
        branches: Vec<(StageDescriptor, Arc<dyn Stage>)>,
    },
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare { descriptor, .. } => {
                f.debug_struct("Bare").field("stage", &descriptor.name).finish()
            }
            Self::Gated(gate) => f.debug_tuple("Gated").field(&gate.name()).finish(),
            Self::ForkJoin { branches } => {
                let names: Vec<&str> = branches.iter().map(|(d, _)| d.name.as_str()).collect();
                f.debug_struct("ForkJoin").field("branches", &names).finish()
            }
        }
    }
}

/// The result of a completed pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    /// Run identity.
    pub run_id: Uuid,
    /// Every artifact committed to session state, by key.
    pub artifacts: BTreeMap<String, serde_json::Value>,
    /// Terminal outcome of each quality gate, by gate name.
    pub gates: BTreeMap<String, GateOutcome>,
    /// The ordered execution trace.
    pub records: Vec<ExecutionRecord>,
    /// Metrics computed over the trace.
    pub metrics: PipelineMetrics,
}

impl PipelineRun {
    /// Returns a committed artifact, if present.
    #[must_use]
    pub fn artifact(&self, key: &str) -> Option<&serde_json::Value> {
        self.artifacts.get(key)
    }

    /// Returns true if every quality gate accepted its artifact.
    #[must_use]
    pub fn all_gates_met(&self) -> bool {
        self.gates.values().all(|outcome| outcome.gate_met())
    }
}

/// A failed pipeline run, carrying the partial trace alongside the
/// cause.
#[derive(Debug)]
pub struct PipelineFailure {
    /// Pipeline name.
    pub pipeline: String,
    /// Run identity.
    pub run_id: Uuid,
    /// The stage that caused the abort, when attributable.
    pub stage: Option<String>,
    /// The underlying error.
    pub error: DeckflowError,
    /// The trace up to the abort.
    pub records: Vec<ExecutionRecord>,
    /// Metrics over the partial trace.
    pub metrics: PipelineMetrics,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(
                f,
                "Pipeline '{}' failed at stage '{}': {}",
                self.pipeline, stage, self.error
            ),
            None => write!(f, "Pipeline '{}' failed: {}", self.pipeline, self.error),
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs a fixed sequence of bare stages, quality gates, and fork/join
/// groups over a fresh session per run.
pub struct PipelineOrchestrator {
    name: String,
    elements: Vec<Element>,
    config: RunConfig,
    transport: TransportRetryPolicy,
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("name", &self.name)
            .field("elements", &self.elements)
            .finish()
    }
}

impl PipelineOrchestrator {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
            config: RunConfig::default(),
            transport: TransportRetryPolicy::default(),
        }
    }

    /// Builds the standard deck pipeline: report understanding, gated
    /// outline, gated slide deck, parallel chart and image work, web
    /// slides assembly, export.
    #[must_use]
    pub fn standard_deck(service: Arc<dyn ContentService>, config: RunConfig) -> Self {
        let gates = &config.gates;
        let outline_threshold = ScoreThreshold::new(gates.min_quality_score)
            .require_acceptable()
            .with_min_check("hallucination", gates.hallucination_threshold)
            .with_min_check("safety", gates.safety_threshold);
        let layout_threshold = ScoreThreshold::new(gates.min_quality_score).require_acceptable();

        let export_path = config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("output"))
            .join("deck.json");

        Self::new("deck_generation")
            .with_config(config.clone())
            .add_stage(
                report_understanding_descriptor(),
                Arc::new(ReportUnderstandingStage::new(service.clone(), config.clone())),
            )
            .add_gate(
                QualityGate::new(
                    "outline",
                    outline_generator_descriptor(gates.outline_max_attempts),
                    Arc::new(OutlineGeneratorStage::new(service.clone(), config.clone())),
                    outline_critic_descriptor(),
                    Arc::new(OutlineCriticStage::new(service.clone())),
                    Arc::new(outline_threshold),
                )
                .with_stagnation_limit(gates.stagnation_limit),
            )
            .add_gate(
                QualityGate::new(
                    "layout",
                    slide_script_descriptor(gates.layout_max_attempts),
                    Arc::new(SlideScriptGeneratorStage::new(service.clone(), config.clone())),
                    layout_critic_descriptor(),
                    Arc::new(LayoutCriticStage::new(service.clone())),
                    Arc::new(layout_threshold),
                )
                .with_stagnation_limit(gates.stagnation_limit),
            )
            .add_fork(vec![
                (
                    chart_generator_descriptor(),
                    Arc::new(ChartGeneratorStage::new(service)) as Arc<dyn Stage>,
                ),
                (
                    image_prefetch_descriptor(),
                    Arc::new(ImagePrefetchStage::new()) as Arc<dyn Stage>,
                ),
            ])
            .add_stage(web_slides_descriptor(), Arc::new(WebSlidesStage::new()))
            .add_stage(
                export_descriptor(),
                Arc::new(ExportStage::new(FileExporter::new(export_path))),
            )
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport retry policy used by every stage.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportRetryPolicy) -> Self {
        self.transport = transport;
        self
    }

    /// Appends a bare stage.
    #[must_use]
    pub fn add_stage(mut self, descriptor: StageDescriptor, stage: Arc<dyn Stage>) -> Self {
        self.elements.push(Element::Bare { descriptor, stage });
        self
    }

    /// Appends a quality gate.
    #[must_use]
    pub fn add_gate(mut self, gate: QualityGate) -> Self {
        self.elements.push(Element::Gated(gate));
        self
    }

    /// Appends a fork/join group of independent stages.
    #[must_use]
    pub fn add_fork(mut self, branches: Vec<(StageDescriptor, Arc<dyn Stage>)>) -> Self {
        self.elements.push(Element::ForkJoin { branches });
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the pipeline to completion over a fresh session.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] carrying the partial trace when a
    /// bare stage fails, a declared input is missing, or a gated
    /// stage's transport budget is exhausted. Gate exhaustion by
    /// quality is not a failure; it surfaces in
    /// [`PipelineRun::gates`].
    pub async fn run(&self) -> Result<PipelineRun, PipelineFailure> {
        let run_id = Uuid::new_v4();
        let state = Arc::new(SessionState::new());
        let recorder = Arc::new(ObservabilityRecorder::new(self.name.clone()));
        let executor = StageExecutor::new(Arc::clone(&state), Arc::clone(&recorder))
            .with_transport(self.transport.clone());

        tracing::info!(pipeline = %self.name, %run_id, "Pipeline started");

        let mut gates = BTreeMap::new();
        for element in &self.elements {
            if let Err(error) = self.run_element(element, &executor, &mut gates).await {
                recorder.finish();
                self.persist_trace(&recorder);
                let stage = error.stage().map(str::to_string);
                tracing::error!(
                    pipeline = %self.name,
                    stage = stage.as_deref().unwrap_or("<none>"),
                    error = %error,
                    "Pipeline aborted"
                );
                return Err(PipelineFailure {
                    pipeline: self.name.clone(),
                    run_id,
                    stage,
                    error,
                    records: recorder.records(),
                    metrics: recorder.metrics(),
                });
            }
        }

        recorder.finish();
        self.persist_trace(&recorder);
        let metrics = recorder.metrics();
        tracing::info!(
            pipeline = %self.name,
            %run_id,
            total_stages = metrics.total_stages_executed,
            retried = metrics.retried,
            "Pipeline completed"
        );

        Ok(PipelineRun {
            run_id,
            artifacts: state.snapshot(),
            gates,
            records: recorder.records(),
            metrics,
        })
    }

    async fn run_element(
        &self,
        element: &Element,
        executor: &StageExecutor,
        gates: &mut BTreeMap<String, GateOutcome>,
    ) -> Result<(), DeckflowError> {
        match element {
            Element::Bare { descriptor, stage } => {
                executor.run_bare(descriptor, stage.as_ref()).await?;
                self.save_intermediate(executor, &[&descriptor.output_key]);
            }
            Element::Gated(gate) => {
                let result = gate.run(executor).await?;
                gates.insert(gate.name().to_string(), result.outcome);
                self.save_intermediate(
                    executor,
                    &[&gate.generator().output_key, &gate.evaluator().output_key],
                );
            }
            Element::ForkJoin { branches } => {
                let joined = futures::future::join_all(
                    branches
                        .iter()
                        .map(|(descriptor, stage)| executor.run_bare(descriptor, stage.as_ref())),
                )
                .await;
                for outcome in joined {
                    outcome?;
                }
                let keys: Vec<&String> =
                    branches.iter().map(|(d, _)| &d.output_key).collect();
                self.save_intermediate(executor, &keys);
            }
        }
        Ok(())
    }

    /// Best-effort write of freshly committed artifacts as JSON files.
    fn save_intermediate<K: AsRef<str>>(&self, executor: &StageExecutor, keys: &[K]) {
        if !self.config.save_intermediate {
            return;
        }
        let Some(dir) = &self.config.output_dir else {
            return;
        };
        for key in keys {
            let key = key.as_ref();
            if let Some(value) = executor.state().get_opt(key) {
                if let Err(e) = write_artifact(dir, key, &value) {
                    tracing::warn!(artifact = %key, error = %e, "Intermediate save failed");
                }
            }
        }
    }

    /// Best-effort trace persistence at run end.
    fn persist_trace(&self, recorder: &ObservabilityRecorder) {
        let Some(dir) = &self.config.output_dir else {
            return;
        };
        let path = dir.join("trace.json");
        if let Err(e) = TraceWriter::new().persist(recorder, &path) {
            tracing::warn!(path = %path.display(), error = %e, "Trace persistence failed");
        }
    }
}

fn write_artifact(dir: &Path, key: &str, value: &serde_json::Value) -> Result<(), DeckflowError> {
    std::fs::create_dir_all(dir)?;
    let serialized = serde_json::to_string_pretty(value)?;
    std::fs::write(dir.join(format!("{key}.json")), serialized)?;
    Ok(())
}

//! Append-only execution recorder and derived run metrics.

use crate::core::{ExecutionRecord, StageStatus};
use crate::utils::iso_timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Aggregate metrics for a pipeline run.
///
/// Derived from the execution records on demand, never independently
/// mutated. `total_stages_executed = successful + failed + retried`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Total recorded stage invocations.
    pub total_stages_executed: usize,
    /// Invocations with status `success`.
    pub successful: usize,
    /// Invocations with status `failed`.
    pub failed: usize,
    /// Invocations with status `retried`.
    pub retried: usize,
    /// Summed duration per stage name, in milliseconds.
    pub per_stage_duration_ms: BTreeMap<String, f64>,
    /// Wall-clock duration of the whole run, in milliseconds.
    pub overall_duration_ms: f64,
    /// `successful / total`, or 0.0 for an empty run.
    pub success_rate: f64,
}

/// Appends structured execution records and computes run metrics.
///
/// Explicitly constructed per pipeline run and passed to the
/// orchestrator; created at run start, flushed at run end. Records are
/// never lost: failures and loop-exhaustion events land in the log like
/// everything else. The only permitted mutation is
/// [`mark_superseded`](Self::mark_superseded), which downgrades a
/// successful invocation once a quality gate discards its output.
#[derive(Debug)]
pub struct ObservabilityRecorder {
    pipeline: String,
    started_at: String,
    started: Instant,
    records: RwLock<Vec<ExecutionRecord>>,
    finished_at: RwLock<Option<String>>,
    overall_duration_ms: RwLock<Option<f64>>,
}

impl ObservabilityRecorder {
    /// Creates a recorder for a named pipeline run.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        let pipeline = pipeline.into();
        tracing::debug!(pipeline = %pipeline, "Recorder created");
        Self {
            pipeline,
            started_at: iso_timestamp(),
            started: Instant::now(),
            records: RwLock::new(Vec::new()),
            finished_at: RwLock::new(None),
            overall_duration_ms: RwLock::new(None),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the run start timestamp (ISO 8601).
    #[must_use]
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    /// Appends a record to the ordered execution log.
    pub fn append(&self, record: ExecutionRecord) {
        self.records.write().push(record);
    }

    /// Reclassifies a successful invocation as superseded by a later attempt.
    ///
    /// Flips the status of the matching `Success` record for `stage` at
    /// `attempt` to [`StageStatus::Retried`]. No-op when no such record
    /// exists, so callers can invoke it unconditionally on a retry
    /// transition even when the invocation in question failed outright.
    pub fn mark_superseded(&self, stage: &str, attempt: u32) {
        let mut records = self.records.write();
        if let Some(record) = records
            .iter_mut()
            .rev()
            .find(|r| r.stage == stage && r.attempt == attempt && r.status == StageStatus::Success)
        {
            record.status = StageStatus::Retried;
        }
    }

    /// Marks the run as finished, freezing the overall duration.
    pub fn finish(&self) {
        let mut finished = self.finished_at.write();
        if finished.is_none() {
            *finished = Some(iso_timestamp());
            *self.overall_duration_ms.write() =
                Some(self.started.elapsed().as_secs_f64() * 1000.0);
            tracing::info!(pipeline = %self.pipeline, "Pipeline finished");
        }
    }

    /// Returns the run end timestamp, if the run has finished.
    #[must_use]
    pub fn finished_at(&self) -> Option<String> {
        self.finished_at.read().clone()
    }

    /// Returns a copy of the ordered execution log.
    #[must_use]
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns all records for a stage, in order.
    #[must_use]
    pub fn records_for(&self, stage: &str) -> Vec<ExecutionRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect()
    }

    /// Total retried invocations across the run.
    #[must_use]
    pub fn total_retries(&self) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.status == StageStatus::Retried)
            .count()
    }

    /// Computes metrics from the current log.
    #[must_use]
    pub fn metrics(&self) -> PipelineMetrics {
        let records = self.records.read();

        let mut successful = 0;
        let mut failed = 0;
        let mut retried = 0;
        let mut per_stage_duration_ms: BTreeMap<String, f64> = BTreeMap::new();

        for record in records.iter() {
            match record.status {
                StageStatus::Success => successful += 1,
                StageStatus::Failed => failed += 1,
                StageStatus::Retried => retried += 1,
            }
            *per_stage_duration_ms.entry(record.stage.clone()).or_insert(0.0) +=
                record.duration_ms;
        }

        let total = records.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };

        let overall_duration_ms = self
            .overall_duration_ms
            .read()
            .unwrap_or_else(|| self.started.elapsed().as_secs_f64() * 1000.0);

        PipelineMetrics {
            total_stages_executed: total,
            successful,
            failed,
            retried,
            per_stage_duration_ms,
            overall_duration_ms,
            success_rate,
        }
    }
}

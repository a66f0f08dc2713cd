//! End-to-end runs of the standard deck pipeline against scripted
//! services.

use super::PipelineOrchestrator;
use crate::config::{GateConfig, RunConfig};
use crate::core::{GateOutcome, StageStatus};
use crate::errors::{DeckflowError, StageError};
use crate::stage::{JitterStrategy, TransportRetryPolicy};
use crate::stages::{
    CHART_STATUS_KEY, EXPORT_RESULT_KEY, IMAGE_MANIFEST_KEY, OUTLINE_KEY, OUTLINE_REVIEW_KEY,
    REPORT_KNOWLEDGE_KEY, SLIDE_AND_SCRIPT_KEY, WEB_SLIDES_KEY,
};
use crate::testing::ScriptedService;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn fast_transport() -> TransportRetryPolicy {
    TransportRetryPolicy::new()
        .with_max_attempts(2)
        .with_base_delay_ms(1)
        .with_jitter(JitterStrategy::None)
        .with_call_timeout_ms(None)
}

fn knowledge() -> Value {
    json!({
        "summary": "Q3 revenue grew 12% on cloud demand",
        "sections": [{"id": "s1", "label": "Revenue", "key_points": ["cloud up 12%"]}],
    })
}

fn outline() -> Value {
    json!({
        "slides": [
            {"slide_number": 1, "title": "Intro", "key_points": ["welcome"]},
            {"slide_number": 2, "title": "Revenue", "key_points": ["cloud up 12%"]},
        ],
    })
}

fn plain_deck() -> Value {
    json!({
        "title": "Q3 Review",
        "slides": [
            {"slide_number": 1, "title": "Intro", "speaker_notes": "Welcome",
             "visual_elements": {"charts_needed": false, "image_keywords": ["handshake"]}},
            {"slide_number": 2, "title": "Revenue", "speaker_notes": "Numbers",
             "visual_elements": {"charts_needed": false}},
        ],
    })
}

fn chart_deck() -> Value {
    json!({
        "title": "Q3 Review",
        "slides": [
            {"slide_number": 1, "title": "Intro", "speaker_notes": "Welcome",
             "visual_elements": {"charts_needed": false}},
            {"slide_number": 2, "title": "Revenue", "speaker_notes": "Numbers",
             "visual_elements": {"charts_needed": true, "chart_spec": "quarterly bar chart"}},
        ],
    })
}

fn good_outline_review() -> Value {
    json!({
        "is_acceptable": true,
        "overall_quality_score": 85.0,
        "checks": {"hallucination": 0.95, "safety": 1.0},
        "evaluation_notes": "Solid flow",
    })
}

fn bad_outline_review() -> Value {
    json!({
        "is_acceptable": false,
        "overall_quality_score": 50.0,
        "checks": {"hallucination": 0.95, "safety": 1.0},
        "weaknesses": ["too shallow"],
        "recommendations": ["add a revenue breakdown slide"],
    })
}

fn good_layout_review() -> Value {
    json!({"is_acceptable": true, "overall_quality_score": 80.0})
}

fn happy_service(deck: &Value) -> ScriptedService {
    ScriptedService::new()
        .with_json("report_understanding", &knowledge())
        .with_json("outline_generator", &outline())
        .with_json("outline_critic", &good_outline_review())
        .with_json("slide_and_script_generator", deck)
        .with_json("layout_critic", &good_layout_review())
        .with_json(
            "chart_generator",
            &json!({"2": {"chart_type": "bar", "labels": ["Q1", "Q2", "Q3"]}}),
        )
}

fn run_config(dir: &TempDir) -> RunConfig {
    RunConfig::new("Q3 revenue grew 12% on cloud demand.")
        .with_scenario("pitching")
        .with_duration("10 minutes")
        .with_output_dir(dir.path())
}

#[tokio::test]
async fn test_full_run_accepted_on_first_attempt() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(happy_service(&plain_deck()));
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let run = pipeline.run().await.unwrap();

    for key in [
        REPORT_KNOWLEDGE_KEY,
        OUTLINE_KEY,
        OUTLINE_REVIEW_KEY,
        SLIDE_AND_SCRIPT_KEY,
        CHART_STATUS_KEY,
        IMAGE_MANIFEST_KEY,
        WEB_SLIDES_KEY,
        EXPORT_RESULT_KEY,
    ] {
        assert!(run.artifact(key).is_some(), "missing artifact {key}");
    }

    assert_eq!(run.gates["outline"], GateOutcome::Accepted);
    assert_eq!(run.gates["layout"], GateOutcome::Accepted);
    assert!(run.all_gates_met());

    // No chart slides, so the chart stage resolved locally.
    assert_eq!(run.artifacts[CHART_STATUS_KEY]["status"], "skipped");
    assert_eq!(run.artifacts[WEB_SLIDES_KEY]["slide_count"], 2);
    assert_eq!(run.artifacts[EXPORT_RESULT_KEY]["status"], "success");

    // One record per invocation: report, 2x(gen + critic + check),
    // chart, image, web, export.
    assert_eq!(run.records.len(), 11);
    assert_eq!(run.metrics.total_stages_executed, 11);
    assert_eq!(run.metrics.retried, 0);
    assert_eq!(run.metrics.failed, 0);
    assert_eq!(
        run.metrics.total_stages_executed,
        run.metrics.successful + run.metrics.failed + run.metrics.retried
    );
    assert!((run.metrics.success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_trace_timestamps_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(happy_service(&plain_deck()));
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let run = pipeline.run().await.unwrap();

    // ISO timestamps compare lexicographically.
    for pair in run.records.windows(2) {
        assert!(
            pair[0].started_at <= pair[1].started_at,
            "records out of order: {} after {}",
            pair[0].started_at,
            pair[1].started_at
        );
    }
}

#[tokio::test]
async fn test_outline_gate_retries_then_accepts() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(
        ScriptedService::new()
            .with_json("report_understanding", &knowledge())
            .with_json("outline_generator", &json!({"slides": [{"slide_number": 1, "title": "v1"}]}))
            .with_json("outline_generator", &outline())
            .with_json("outline_critic", &bad_outline_review())
            .with_json("outline_critic", &good_outline_review())
            .with_json("slide_and_script_generator", &plain_deck())
            .with_json("layout_critic", &good_layout_review()),
    );
    let config = run_config(&dir)
        .with_gates(GateConfig::default().with_outline_max_attempts(3));
    let pipeline =
        PipelineOrchestrator::standard_deck(service.clone(), config).with_transport(fast_transport());

    let run = pipeline.run().await.unwrap();

    assert_eq!(run.gates["outline"], GateOutcome::Accepted);
    assert_eq!(service.request_count("outline_generator"), 2);
    // The discarded first iteration: generator, critic, and the check.
    assert_eq!(run.metrics.retried, 3);

    let generator_statuses: Vec<StageStatus> = run
        .records
        .iter()
        .filter(|r| r.stage == "outline_generator")
        .map(|r| r.status)
        .collect();
    assert_eq!(
        generator_statuses,
        vec![StageStatus::Retried, StageStatus::Success]
    );

    // The second generator prompt carries the critic's feedback.
    let requests = service.requests();
    let retry_prompt = &requests
        .iter()
        .filter(|r| r.role == "outline_generator")
        .nth(1)
        .unwrap()
        .prompt;
    assert!(retry_prompt.contains("[PREVIOUS_OUTPUT]"));
    assert!(retry_prompt.contains("- too shallow"));
    assert!(retry_prompt.contains("- add a revenue breakdown slide"));

    // Check records: one retried, one accepted.
    let checks: Vec<_> = run
        .records
        .iter()
        .filter(|r| r.stage == "outline.check")
        .collect();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0].status, StageStatus::Retried);
    assert_eq!(checks[1].status, StageStatus::Success);
    assert_eq!(checks[1].quality_gate_met, Some(true));
}

#[tokio::test]
async fn test_outline_gate_exhaustion_commits_flagged_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(
        ScriptedService::new()
            .with_json("report_understanding", &knowledge())
            .with_json("outline_generator", &outline())
            .with_json("outline_critic", &bad_outline_review())
            .with_json("slide_and_script_generator", &plain_deck())
            .with_json("layout_critic", &good_layout_review()),
    );
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let run = pipeline.run().await.unwrap();

    // Gate exhausted, but the run still completed with the last outline.
    assert_eq!(run.gates["outline"], GateOutcome::Exhausted);
    assert!(!run.all_gates_met());
    assert_eq!(run.artifacts[OUTLINE_KEY], outline());
    assert!(run.artifact(EXPORT_RESULT_KEY).is_some());

    let last_check = run
        .records
        .iter()
        .filter(|r| r.stage == "outline.check")
        .next_back()
        .unwrap();
    assert_eq!(last_check.status, StageStatus::Success);
    assert_eq!(last_check.quality_gate_met, Some(false));
}

#[tokio::test]
async fn test_bare_stage_failure_aborts_with_partial_trace() {
    let service = Arc::new(
        ScriptedService::new().with_response("report_understanding", "I cannot help with that."),
    );
    let pipeline = PipelineOrchestrator::standard_deck(service.clone(), RunConfig::new("report"))
        .with_transport(fast_transport());

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.stage.as_deref(), Some("report_understanding"));
    assert!(matches!(failure.error, DeckflowError::StageFailed { .. }));

    // Nothing downstream ran.
    assert_eq!(failure.records.len(), 1);
    assert_eq!(failure.records[0].stage, "report_understanding");
    assert_eq!(failure.records[0].status, StageStatus::Failed);
    assert_eq!(failure.metrics.failed, 1);
    assert_eq!(service.request_count("outline_generator"), 0);
}

#[tokio::test]
async fn test_fork_failure_fails_join_but_keeps_both_records() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(
        ScriptedService::new()
            .with_json("report_understanding", &knowledge())
            .with_json("outline_generator", &outline())
            .with_json("outline_critic", &good_outline_review())
            .with_json("slide_and_script_generator", &chart_deck())
            .with_json("layout_critic", &good_layout_review())
            .with_error("chart_generator", StageError::transport("service unreachable")),
    );
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.stage.as_deref(), Some("chart_generator"));

    // The sibling branch completed and both records landed.
    let image_records: Vec<_> = failure
        .records
        .iter()
        .filter(|r| r.stage == "image_prefetch")
        .collect();
    assert_eq!(image_records.len(), 1);
    assert_eq!(image_records[0].status, StageStatus::Success);

    let chart_records: Vec<_> = failure
        .records
        .iter()
        .filter(|r| r.stage == "chart_generator")
        .collect();
    assert_eq!(chart_records.len(), 1);
    assert_eq!(chart_records[0].status, StageStatus::Failed);

    // The post-join stage never ran.
    assert!(failure.records.iter().all(|r| r.stage != "web_slides"));
}

#[tokio::test]
async fn test_evaluator_transport_exhaustion_is_fatal() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(
        ScriptedService::new()
            .with_json("report_understanding", &knowledge())
            .with_json("outline_generator", &outline())
            .with_error("outline_critic", StageError::transport("503")),
    );
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.stage.as_deref(), Some("outline_critic"));
    assert!(matches!(failure.error, DeckflowError::StageFailed { .. }));
    // The loop never commits on a transport failure.
    assert!(failure.records.iter().all(|r| r.stage != "outline.check"));
}

#[tokio::test]
async fn test_charts_generated_and_merged_into_web_deck() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(happy_service(&chart_deck()));
    let pipeline = PipelineOrchestrator::standard_deck(service.clone(), run_config(&dir))
        .with_transport(fast_transport());

    let run = pipeline.run().await.unwrap();

    assert_eq!(run.artifacts[CHART_STATUS_KEY]["status"], "success");
    assert_eq!(service.request_count("chart_generator"), 1);

    let web = &run.artifacts[WEB_SLIDES_KEY];
    assert_eq!(web["slides"][1]["chart_data"]["chart_type"], "bar");
}

#[tokio::test]
async fn test_trace_and_intermediate_artifacts_persisted() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(happy_service(&plain_deck()));
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let run = pipeline.run().await.unwrap();

    let trace: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("trace.json")).unwrap())
            .unwrap();
    assert_eq!(trace["pipeline"], "deck_generation");
    assert_eq!(
        trace["records"].as_array().unwrap().len(),
        run.records.len()
    );
    assert_eq!(trace["metrics"]["total_stages_executed"], 11);

    // Intermediate artifacts and the exported deck landed next to it.
    for file in [
        "report_knowledge.json",
        "presentation_outline.json",
        "slide_and_script.json",
        "web_slides_result.json",
        "deck.json",
    ] {
        assert!(dir.path().join(file).exists(), "missing {file}");
    }
}

#[tokio::test]
async fn test_rerun_uses_fresh_session() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(happy_service(&plain_deck()));
    let pipeline = PipelineOrchestrator::standard_deck(service, run_config(&dir))
        .with_transport(fast_transport());

    let first = pipeline.run().await.unwrap();
    let second = pipeline.run().await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.records.len(), second.records.len());
}

//! Bracket-tagged prompt assembly shared by the generative stages.

use crate::config::RunConfig;
use crate::stage::StageInput;

/// Wraps a body in `[TAG]...[END_TAG]` markers.
pub(crate) fn tagged(tag: &str, body: &str) -> String {
    format!("[{tag}]\n{body}\n[END_{tag}]")
}

/// Renders the scenario, audience, duration, and custom-instruction
/// sections of a prompt. Missing optional fields are marked N/A with an
/// instruction to infer them from the report.
pub(crate) fn config_sections(config: &RunConfig) -> String {
    let mut sections = Vec::new();

    if config.scenario_provided() {
        sections.push(format!("[SCENARIO]\n{}", config.scenario));
    } else {
        sections.push("[SCENARIO]\nN/A (Please infer from report content)".to_string());
    }

    match &config.target_audience {
        Some(audience) => sections.push(format!("[TARGET_AUDIENCE]\n{audience}")),
        None => sections.push(
            "[TARGET_AUDIENCE]\nN/A (Please infer from scenario and report content)".to_string(),
        ),
    }

    if !config.duration.trim().is_empty() {
        sections.push(format!("[DURATION]\n{}", config.duration));
    }

    if !config.custom_instruction.trim().is_empty() {
        sections.push(format!("[CUSTOM_INSTRUCTION]\n{}", config.custom_instruction));
    }

    sections.join("\n\n")
}

/// Renders the retry feedback suffix for a generator prompt, or an
/// empty string on a first attempt.
pub(crate) fn feedback_suffix(input: &StageInput) -> String {
    input
        .feedback
        .as_ref()
        .map(|feedback| {
            let rendered = feedback.render();
            if rendered.is_empty() {
                String::new()
            } else {
                format!("\n\n{rendered}")
            }
        })
        .unwrap_or_default()
}

/// Serializes an artifact for inclusion in a prompt section.
pub(crate) fn artifact_block(tag: &str, artifact: &serde_json::Value) -> String {
    tagged(tag, &serde_json::to_string(artifact).unwrap_or_default())
}

//! CLI presentation: frame encoding, terminal rendering of events, and
//! text/json formatters for the request/response commands.

use crate::api::{HealthResponse, IntentResponse, LatestResponse, ProjectResponse, QuestionnaireResponse};
use crate::catalog::Category;
use crate::cli::parse::FrameFormat;
use crate::error::ApiError;
use crate::events::{EventEnvelope, EventType};
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

/// Encode one envelope for stdout.
pub fn write_frame(envelope: &EventEnvelope, format: FrameFormat) -> String {
    match format {
        FrameFormat::Sse => envelope.to_sse_frame(),
        FrameFormat::Jsonl => format!("{}\n", envelope.to_json()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::Protocol(format!("Failed to serialize output: {}", e)))
}

/// Human rendering of an event for the interactive chat. Streaming edit
/// chunks and bookkeeping events render as `None`.
pub fn render_event(envelope: &EventEnvelope) -> Option<String> {
    let text = |key: &str| envelope.payload_str(key).unwrap_or_default().to_string();
    match envelope.event_type {
        EventType::ChatMessage => Some(text("content")),
        EventType::ThinkingStart => Some(format!("{}", "thinking...".dimmed())),
        EventType::ProgressUpdate => Some(format!(
            "  {} {}",
            text("step_id").cyan(),
            text("status").dimmed()
        )),
        EventType::FsWrite => Some(format!("  {} {}", "wrote".green(), text("path"))),
        EventType::FsDelete => Some(format!("  {} {}", "deleted".yellow(), text("path"))),
        EventType::Error => {
            let mut line = format!("{} {}", "error:".red().bold(), text("message"));
            if let Some(details) = envelope.payload_str("details") {
                line.push_str(&format!("\n  {}", details.dimmed()));
            }
            Some(line)
        }
        EventType::StreamComplete => Some(format!("{}", "done".green().bold())),
        EventType::StreamFailed => Some(format!("{}", "failed".red().bold())),
        _ => None,
    }
}

pub fn format_intent(response: &IntentResponse, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(response);
    }
    let mut lines = vec![format!(
        "Intent: {} (confidence {:.2}, {})",
        response.label, response.meta.confidence, response.meta.model_family
    )];
    if response.meta.degraded {
        lines.push("  classifier unavailable, heuristic result".to_string());
    }
    if !response.meta.explanation.is_empty() {
        lines.push(format!("  {}", response.meta.explanation));
    }
    if let Some(greeting) = &response.greeting_response {
        lines.push(String::new());
        lines.push(greeting.clone());
    }
    if let Some(answer) = &response.chat_response {
        lines.push(String::new());
        lines.push(answer.clone());
    }
    if let Some(key) = &response.page_type_key {
        lines.push(format!("Page type: {}", key));
    }
    if response.needs_page_type_selection == Some(true) {
        lines.push("  a page type must be selected before generation".to_string());
    }
    if let Some(needs) = response.needs_questionnaire {
        lines.push(format!("  questionnaire needed: {}", needs));
    }
    Ok(lines.join("\n"))
}

pub fn format_project(response: &ProjectResponse, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(response);
    }
    let mut s = format!(
        "{}\n  Files: {}\n  Tree: {}\n  Manifest: {}",
        response.message, response.files_count, response.project_path, response.project_json_path
    );
    if let Some(events) = &response.events_file {
        s.push_str(&format!("\n  Events: {}", events));
    }
    Ok(s)
}

pub fn format_latest(response: &LatestResponse, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(response);
    }
    let project = &response.project;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Path", "Language", "Bytes"]);
    for (path, entry) in &project.files {
        let language = project.language_of(path).unwrap_or_else(|| "-".to_string());
        table.add_row(vec![path.clone(), language, entry.text().len().to_string()]);
    }
    let title = project.name.as_deref().unwrap_or("Unnamed project");
    Ok(format!("{}\n  Manifest: {}\n{}", title, response.project_path, table))
}

pub fn format_health(response: &HealthResponse, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(response);
    }
    let providers = if response.providers_configured.is_empty() {
        "none".to_string()
    } else {
        response
            .providers_configured
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Ok(format!(
        "Status: {}\nVersion: {}\nProviders: {}",
        response.status, response.version, providers
    ))
}

pub fn format_categories(categories: &[Category], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&categories);
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Key", "Name", "Description"]);
    for category in categories {
        table.add_row(vec![&category.key, &category.display_name, &category.description]);
    }
    Ok(table.to_string())
}

pub fn format_questionnaire(
    key: &str,
    response: &QuestionnaireResponse,
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(response);
    }
    let Some(templates) = response.questionnaire.as_ref().filter(|t| !t.is_empty()) else {
        return Ok(format!("No questionnaire for {}", key));
    };
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Id", "Question", "Type", "Options"]);
    for template in templates {
        table.add_row(vec![
            template.id.clone(),
            template.question.clone(),
            template.question_kind().as_str().to_string(),
            template.options.join(", "),
        ]);
    }
    Ok(table.to_string())
}

/// One-line gist of an event payload for the log table.
fn event_summary(envelope: &EventEnvelope) -> String {
    let text = ["content", "message", "label", "path", "reason"]
        .iter()
        .find_map(|key| envelope.payload_str(key))
        .map(str::to_string)
        .or_else(|| {
            let step = envelope.payload_str("step_id")?;
            Some(format!("{} {}", step, envelope.payload_str("status").unwrap_or_default()))
        })
        .unwrap_or_default();
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > SUMMARY_WIDTH {
        format!("{}...", line.chars().take(SUMMARY_WIDTH).collect::<String>())
    } else {
        line.to_string()
    }
}

const SUMMARY_WIDTH: usize = 60;

pub fn format_events(events: &[EventEnvelope], format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return to_json(&events);
    }
    if events.is_empty() {
        return Ok("No matching events".to_string());
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Time", "Type", "Session", "Summary"]);
    for event in events {
        table.add_row(vec![
            event.timestamp.clone(),
            event.event_type.as_str().to_string(),
            event.conversation_id.clone().unwrap_or_else(|| "-".to_string()),
            event_summary(event),
        ]);
    }
    Ok(table.to_string())
}

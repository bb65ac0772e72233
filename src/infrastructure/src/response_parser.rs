//! Turns raw model text into an `InteractionResponse`.
//!
//! Parsing never fails. Text that is not a JSON object becomes a
//! `conversation` reply carrying the cleaned text.

use domain::models::{DiagnosticStep, InteractionResponse, ResponseKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

const DEFAULT_CONFIDENCE: f64 = 5.0;

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\s*").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").unwrap());

/// Trim the reply and drop a surrounding ```json / ``` fence.
pub fn strip_fences(raw: &str) -> String {
    let clean = raw.trim();
    if !clean.starts_with("```") {
        return clean.to_string();
    }
    let without_open = FENCE_OPEN.replace(clean, "");
    FENCE_CLOSE.replace(&without_open, "").trim().to_string()
}

pub fn parse_response(raw: &str) -> InteractionResponse {
    let clean = strip_fences(raw);

    match serde_json::from_str::<Value>(&clean) {
        Ok(Value::Object(fields)) => from_fields(&fields, &clean),
        Ok(_) | Err(_) => {
            debug!("Model reply is not a JSON object, treating as conversation");
            InteractionResponse::conversation(clean)
        }
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(fields: &Map<String, Value>, key: &str) -> Option<bool> {
    fields.get(key).and_then(Value::as_bool)
}

fn from_fields(fields: &Map<String, Value>, clean: &str) -> InteractionResponse {
    let kind = fields
        .get("type")
        .and_then(Value::as_str)
        .and_then(ResponseKind::parse)
        .unwrap_or(ResponseKind::Explanation);
    let content = string_field(fields, "content").unwrap_or_else(|| clean.to_string());
    let confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
        .map_or(DEFAULT_CONFIDENCE, |value| value.clamp(1.0, 10.0));

    let mut response = InteractionResponse::new(kind, content, confidence);
    response.command = string_field(fields, "command");
    response.explanation = string_field(fields, "explanation");
    response.llm_output = string_field(fields, "llm_output");
    response.final_command = string_field(fields, "final_command");
    response.final_safe = bool_field(fields, "final_safe");
    response.safe = bool_field(fields, "safe");
    response.steps = fields
        .get("steps")
        .and_then(Value::as_array)
        .map(|steps| steps.iter().map(parse_step).collect());
    response
}

fn parse_step(step: &Value) -> DiagnosticStep {
    let text = |key: &str| {
        step.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    DiagnosticStep {
        label: text("label"),
        command: text("command"),
        explanation: text("explanation"),
        safe: step.get("safe").and_then(Value::as_bool).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"type\":\"command\",\"content\":\"ls -la\",\"command\":\"ls -la\",\"confidence\":9}\n```";
        let response = parse_response(raw);
        assert_eq!(response.kind, ResponseKind::Command);
        assert_eq!(response.command.as_deref(), Some("ls -la"));
        assert_eq!(response.confidence, 9.0);
        assert!(response.explanation.is_none());
        assert!(response.steps.is_none());
        assert!(response.final_safe.is_none());
    }

    #[test]
    fn bare_fence_without_language() {
        let response = parse_response("```\n{\"type\":\"answer\",\"content\":\"42\"}\n```");
        assert_eq!(response.kind, ResponseKind::Answer);
        assert_eq!(response.content, "42");
    }

    #[test]
    fn missing_fields_get_defaults() {
        let raw = r#"{"command":"find . -name missing.txt","confidence":7}"#;
        let response = parse_response(raw);
        assert_eq!(response.kind, ResponseKind::Explanation);
        assert_eq!(response.content, raw);
        assert_eq!(response.confidence, 7.0);

        let response = parse_response(r#"{"type":"command"}"#);
        assert_eq!(response.confidence, 5.0);
    }

    #[test]
    fn unknown_type_becomes_explanation() {
        let response = parse_response(r#"{"type":"poem","content":"roses"}"#);
        assert_eq!(response.kind, ResponseKind::Explanation);
    }

    #[test]
    fn wrong_typed_fields_are_dropped() {
        let response =
            parse_response(r#"{"type":"command","content":"x","command":42,"safe":"yes"}"#);
        assert!(response.command.is_none());
        assert!(response.safe.is_none());
    }

    #[test]
    fn diagnostic_steps_are_normalised() {
        let raw = r#"{
            "type": "diagnostic",
            "content": "Let's look around",
            "steps": [
                {"label": "disk", "command": "df -h", "safe": true},
                {"command": "free -m"}
            ],
            "final_command": "sudo systemctl restart app",
            "final_safe": false,
            "confidence": 6
        }"#;
        let response = parse_response(raw);
        let steps = response.diagnostic_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].label, "disk");
        assert!(steps[0].safe);
        assert_eq!(steps[0].explanation, "");
        assert_eq!(steps[1].label, "");
        assert!(!steps[1].safe);
        assert_eq!(response.final_command.as_deref(), Some("sudo systemctl restart app"));
        assert_eq!(response.final_safe, Some(false));
    }

    #[test]
    fn plain_text_is_conversation() {
        let response = parse_response("  Sure, happy to help!  ");
        assert_eq!(response.kind, ResponseKind::Conversation);
        assert_eq!(response.content, "Sure, happy to help!");
        assert_eq!(response.confidence, 5.0);

        let response = parse_response("[1, 2, 3]");
        assert_eq!(response.kind, ResponseKind::Conversation);
    }

    #[test]
    fn confidence_is_kept_within_one_to_ten() {
        assert_eq!(parse_response(r#"{"type":"answer","confidence":42}"#).confidence, 10.0);
        assert_eq!(parse_response(r#"{"type":"answer","confidence":0}"#).confidence, 1.0);
        assert_eq!(parse_response(r#"{"type":"answer","confidence":7.5}"#).confidence, 7.5);
    }
}

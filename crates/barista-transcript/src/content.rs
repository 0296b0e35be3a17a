//! Text extraction and payload helpers shared by the event handlers.

use barista_types::INAUDIBLE_MARKER;
use serde_json::Value;

use crate::events::ContentPart;

/// Marker preceding the JSON blob in a guardrail correction message.
pub const GUARDRAIL_CORRECTION_MARKER: &str = "Failure Details: ";

/// Breadcrumb label for a guardrail correction sent to the model.
pub const GUARDRAIL_CORRECTION_LABEL: &str = "Output Guardrail Active";

/// Joins the displayable text of every recognized part with newlines.
pub fn extract_message_text(content: &[ContentPart]) -> String {
    content
        .iter()
        .filter_map(ContentPart::text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Final text for a completed transcription. Empty or bare-newline
/// transcripts mean nothing intelligible was heard.
pub fn normalize_transcript(transcript: Option<&str>) -> String {
    match transcript {
        None | Some("") | Some("\n") => INAUDIBLE_MARKER.to_string(),
        Some(text) => text.to_string(),
    }
}

/// Finds a guardrail correction payload embedded in message text.
///
/// Returns `None` when the marker is absent. When the marker is present but
/// the blob is not valid JSON, the raw blob is returned as a string value.
pub fn guardrail_correction(text: &str) -> Option<Value> {
    let (_, rest) = text.split_once(GUARDRAIL_CORRECTION_MARKER)?;
    let blob = json_object_prefix(rest)?;
    match serde_json::from_str(blob) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("guardrail correction details are not valid JSON: {}", e);
            Some(Value::String(blob.to_string()))
        }
    }
}

/// Parses a JSON-encoded string into structured data, falling back to the
/// original value. Non-string values pass through untouched.
pub fn maybe_parse_json(value: &Value) -> Value {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"')) {
        return value.clone();
    }
    match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("failed to parse JSON payload, keeping raw value: {}", e);
            value.clone()
        }
    }
}

/// The leading `{ ... }` span of `text`, matched on balanced braces outside
/// of string literals.
fn json_object_prefix(text: &str) -> Option<&str> {
    if !text.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    // Unterminated: hand back everything so the caller can report it.
    Some(text)
}

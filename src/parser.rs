//! Extracts the backend's result payload from its mixed stdout.
//!
//! The backend prints diagnostics around a single JSON object, so the payload
//! is everything between the first `{` and the last `}`. Text outside that
//! span is ignored.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// Always set after a successful parse; empty when the field was missing.
    pub extracted_text: String,
    /// `None` when the backend produced no translation.
    pub translated_text: Option<String>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No JSON found in output")]
    NoJsonFound,
    #[error("malformed JSON payload: {0}")]
    MalformedJson(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    extracted: Option<String>,
    #[serde(default)]
    translated: Option<String>,
}

pub fn parse(stdout: &str) -> Result<CaptureResult, ParseError> {
    let payload = json_span(stdout).ok_or(ParseError::NoJsonFound)?;
    let parsed: Payload = serde_json::from_str(payload).map_err(ParseError::MalformedJson)?;
    Ok(CaptureResult {
        extracted_text: parsed.extracted.unwrap_or_default(),
        translated_text: parsed.translated.filter(|value| !value.is_empty()),
    })
}

fn json_span(stdout: &str) -> Option<&str> {
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&stdout[start..=end])
}

use serde::Serialize;

use crate::parser::CaptureResult;

pub const SCANNING_PLACEHOLDER: &str = "Scanning in progress, please wait...";
pub const CANCELLED_TEXT: &str = "Process cancelled by user";
pub const TRANSLATING_PLACEHOLDER: &str = "Translating, please wait...";
pub const NO_TEXT_DISPLAY: &str = "No text detected";
pub const TRANSLATION_FAILED_DISPLAY: &str = "Translation failed";

const ERROR_PREFIXES: &[&str] = &[
    "Error:",
    "Error capturing screen:",
    "OCR Error:",
    "Main process error:",
];
const TRANSLATION_FAILURE_PREFIXES: &[&str] = &[
    "Translation failed",
    "Translation request error:",
    "Translation error:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeNotification {
    pub message: String,
    pub severity: Severity,
}

impl OutcomeNotification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Success)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Subprocess,
    Timeout,
    Parse,
    Backend,
    Translation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum TerminalState {
    Success,
    NoText,
    Cancelled,
    Error(ErrorKind),
}

/// What a parsed payload means before any fallback translation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Classification {
    Success,
    NoText,
    BackendError,
}

pub(crate) fn classify(result: &CaptureResult) -> Classification {
    let extracted = result.extracted_text.as_str();
    if is_error_sentinel(extracted) {
        return Classification::BackendError;
    }
    if is_no_text_sentinel(extracted) {
        return Classification::NoText;
    }
    Classification::Success
}

pub fn is_error_sentinel(text: &str) -> bool {
    ERROR_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
}

pub fn is_no_text_sentinel(text: &str) -> bool {
    text.trim().is_empty() || text.starts_with("No text") || text.contains("No text detected")
}

/// Returns the backend translation unless it is missing or a failure sentinel.
pub(crate) fn usable_translation(result: &CaptureResult) -> Option<&str> {
    result
        .translated_text
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .filter(|text| {
            !TRANSLATION_FAILURE_PREFIXES
                .iter()
                .any(|prefix| text.starts_with(prefix))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    fn result(extracted: &str, translated: Option<&str>) -> CaptureResult {
        CaptureResult {
            extracted_text: extracted.to_string(),
            translated_text: translated.map(str::to_string),
        }
    }

    #[test]
    fn classifies_sentinels() {
        assert_eq!(classify(&result("Hello", Some("Hola"))), Classification::Success);
        assert_eq!(
            classify(&result("No text detected in the image. Please try a different area.", None)),
            Classification::NoText
        );
        assert_eq!(classify(&result("", None)), Classification::NoText);
        assert_eq!(
            classify(&result("Error: Image file not found", None)),
            Classification::BackendError
        );
        assert_eq!(
            classify(&result("Error capturing screen: Process failed with code 1", None)),
            Classification::BackendError
        );
        assert_eq!(
            classify(&result("OCR Error: tesseract missing", None)),
            Classification::BackendError
        );
    }

    #[test]
    fn translation_failure_sentinels_are_not_usable() {
        assert_eq!(usable_translation(&result("Hi", Some("Merhaba"))), Some("Merhaba"));
        assert_eq!(usable_translation(&result("Hi", None)), None);
        assert_eq!(
            usable_translation(&result("Hi", Some("Translation failed: Empty API response"))),
            None
        );
        assert_eq!(
            usable_translation(&result("Hi", Some("Translation request error: 503"))),
            None
        );
    }

    #[test]
    fn notification_wire_shape() {
        assert_json_snapshot!(OutcomeNotification::success("Text successfully detected"), @r###"
        {
          "message": "Text successfully detected",
          "severity": "success"
        }
        "###);
    }

    #[test]
    fn terminal_state_wire_shape() {
        assert_json_snapshot!(TerminalState::Error(ErrorKind::Timeout), @r###"
        {
          "state": "error",
          "kind": "timeout"
        }
        "###);
    }
}

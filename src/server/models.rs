use serde::{Deserialize, Serialize};

use crate::orchestrator::{OutcomeNotification, Phase, TextField};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct CaptureRequest {
    pub(crate) silent: Option<bool>,
    pub(crate) lang: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateRequest {
    /// Defaults to the extracted text currently shown.
    pub(crate) text: Option<String>,
    pub(crate) lang: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct SaveRequestBody {
    /// Path picked by the host's dialog; absent means the dialog was canceled.
    pub(crate) file_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct CopyRequest {
    pub(crate) field: Option<TextField>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CopyResponse {
    pub(crate) field: TextField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    pub(crate) notification: OutcomeNotification,
}

#[derive(Debug, Serialize)]
pub(crate) struct StateResponse {
    pub(crate) phase: Phase,
    pub(crate) busy: bool,
    pub(crate) translating: bool,
    pub(crate) extracted: String,
    pub(crate) translated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) notification: Option<OutcomeNotification>,
    pub(crate) reveal_requests: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

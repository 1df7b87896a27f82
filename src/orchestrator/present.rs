use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::outcome::OutcomeNotification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Extracted,
    Translated,
}

/// The two text boxes shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextBuffers {
    pub extracted: String,
    pub translated: String,
}

impl TextBuffers {
    pub fn new(extracted: impl Into<String>, translated: impl Into<String>) -> Self {
        Self {
            extracted: extracted.into(),
            translated: translated.into(),
        }
    }

    pub fn get(&self, field: TextField) -> &str {
        match field {
            TextField::Extracted => &self.extracted,
            TextField::Translated => &self.translated,
        }
    }
}

/// Contract of the host window. Implementations only read the snapshots they get.
pub trait Present: Send + Sync {
    fn show_texts(&self, texts: &TextBuffers);
    fn notify(&self, notification: &OutcomeNotification);
    /// Brings a hidden or minimized window forward.
    fn reveal_window(&self);
    fn set_busy(&self, _busy: bool) {}
}

impl<P: Present + ?Sized> Present for Arc<P> {
    fn show_texts(&self, texts: &TextBuffers) {
        (**self).show_texts(texts)
    }

    fn notify(&self, notification: &OutcomeNotification) {
        (**self).notify(notification)
    }

    fn reveal_window(&self) {
        (**self).reveal_window()
    }

    fn set_busy(&self, busy: bool) {
        (**self).set_busy(busy)
    }
}

pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> anyhow::Result<()>;
}

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::outcome::TRANSLATION_FAILED_DISPLAY;
use super::present::TextBuffers;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub title: String,
    pub default_path: PathBuf,
    pub filters: Vec<FileFilter>,
}

impl SaveRequest {
    pub(crate) fn text_file(captures_dir: &Path, default_name: &str) -> Self {
        Self {
            title: "Save Text".to_string(),
            default_path: captures_dir.join(default_name),
            filters: vec![
                FileFilter {
                    name: "Text Files".to_string(),
                    extensions: vec!["txt".to_string()],
                },
                FileFilter {
                    name: "All Files".to_string(),
                    extensions: vec!["*".to_string()],
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub canceled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl SaveResponse {
    pub fn canceled() -> Self {
        Self {
            canceled: true,
            file_path: None,
        }
    }

    pub fn chosen(path: impl Into<PathBuf>) -> Self {
        Self {
            canceled: false,
            file_path: Some(path.into()),
        }
    }
}

pub type SaveDialogFuture<'a> = Pin<Box<dyn Future<Output = SaveResponse> + Send + 'a>>;

/// Native save dialog owned by the host.
pub trait SaveDialog: Send + Sync {
    fn prompt<'a>(&'a self, request: &'a SaveRequest) -> SaveDialogFuture<'a>;
}

/// Dialog stand-in that answers with a path chosen up front, or the default path.
#[derive(Debug, Clone, Default)]
pub struct PresetDialog {
    path: Option<PathBuf>,
    use_default: bool,
}

impl PresetDialog {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            use_default: false,
        }
    }

    pub fn default_path() -> Self {
        Self {
            path: None,
            use_default: true,
        }
    }

    pub fn cancel() -> Self {
        Self::default()
    }
}

impl SaveDialog for PresetDialog {
    fn prompt<'a>(&'a self, request: &'a SaveRequest) -> SaveDialogFuture<'a> {
        let response = match (&self.path, self.use_default) {
            (Some(path), _) => SaveResponse::chosen(path.clone()),
            (None, true) => SaveResponse::chosen(request.default_path.clone()),
            (None, false) => SaveResponse::canceled(),
        };
        Box::pin(async move { response })
    }
}

/// Picks the text to save: the translation first, then the extracted text.
pub(crate) fn choose_content(texts: &TextBuffers) -> Option<(&str, &'static str)> {
    let translated = texts.translated.as_str();
    if !translated.is_empty() && translated != TRANSLATION_FAILED_DISPLAY {
        return Some((translated, "translated_text.txt"));
    }
    if !texts.extracted.is_empty() {
        return Some((texts.extracted.as_str(), "extracted_text.txt"));
    }
    None
}

#[derive(Debug, Error)]
#[error("{source}")]
pub struct SaveError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

pub(crate) async fn write_text(path: &Path, content: &str) -> Result<(), SaveError> {
    tokio::fs::write(path, content.as_bytes())
        .await
        .map_err(|source| SaveError {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn prefers_translation_unless_it_failed() {
        let texts = TextBuffers::new("Hello", "Hola");
        assert_eq!(choose_content(&texts), Some(("Hola", "translated_text.txt")));

        let texts = TextBuffers::new("Hello", TRANSLATION_FAILED_DISPLAY);
        assert_eq!(choose_content(&texts), Some(("Hello", "extracted_text.txt")));

        assert_eq!(choose_content(&TextBuffers::default()), None);
    }

    #[cfg(unix)]
    #[test]
    fn save_request_wire_shape() {
        let request = SaveRequest::text_file(Path::new("/data/captures"), "translated_text.txt");
        assert_json_snapshot!(request, @r###"
        {
          "title": "Save Text",
          "defaultPath": "/data/captures/translated_text.txt",
          "filters": [
            {
              "name": "Text Files",
              "extensions": [
                "txt"
              ]
            },
            {
              "name": "All Files",
              "extensions": [
                "*"
              ]
            }
          ]
        }
        "###);
    }
}

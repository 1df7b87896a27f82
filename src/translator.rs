use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::settings::Settings;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation API error: {0}")]
    HttpError(u16),
    #[error("Translation API returned empty result")]
    EmptyResponse,
    #[error("Translation request error: {0}")]
    Request(String),
    #[error("failed to parse translation response: {0}")]
    InvalidResponse(String),
}

pub type TranslateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TranslationError>> + Send + 'a>>;

pub trait Translate: Send + Sync {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> TranslateFuture<'a>;
}

impl<T: Translate + ?Sized> Translate for Box<T> {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> TranslateFuture<'a> {
        (**self).translate(text, target_lang)
    }
}

/// Client for the public `translate_a/single` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslate {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TranslationError::Request(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, TranslationError> {
        Self::new(settings.translate_endpoint.clone(), settings.request_timeout)
    }

    async fn request(&self, text: &str, target_lang: &str) -> Result<String, TranslationError> {
        if text.is_empty() {
            return Ok(String::new());
        }
        debug!(
            "translating {} chars to {}",
            text.chars().count(),
            target_lang
        );
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|err| TranslationError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::HttpError(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|err| TranslationError::Request(err.to_string()))?;
        join_segments(&body)
    }
}

impl Translate for GoogleTranslate {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> TranslateFuture<'a> {
        Box::pin(self.request(text, target_lang))
    }
}

/// Joins the `[translated, original, ..]` tuples of the first element in order.
pub(crate) fn join_segments(body: &str) -> Result<String, TranslationError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|err| TranslationError::InvalidResponse(err.to_string()))?;
    let segments = match payload.get(0) {
        Some(Value::Array(segments)) if !segments.is_empty() => segments,
        _ => return Err(TranslationError::EmptyResponse),
    };

    let mut translated = String::new();
    for segment in segments {
        if let Some(chunk) = segment.get(0).and_then(Value::as_str) {
            translated.push_str(chunk);
        }
    }
    Ok(translated)
}

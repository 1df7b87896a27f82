//! Capture pipeline: backend run, cancellation check, parse, classify, notify.
//!
//! One [`Orchestrator`] owns the active capture session and both text buffers.
//! Every public method maps to one host trigger and reports its outcome to the
//! presenter exactly once.

mod console;
mod outcome;
mod present;
mod save;
mod session;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::invoker::{InvocationOutput, Invoke, InvokeError};
use crate::parser::{self, CaptureResult};
use crate::settings::Settings;
use crate::translator::Translate;

pub use console::{ConsolePresenter, StdoutClipboard};
pub use outcome::{
    CANCELLED_TEXT, ErrorKind, NO_TEXT_DISPLAY, OutcomeNotification, SCANNING_PLACEHOLDER,
    Severity, TRANSLATING_PLACEHOLDER, TRANSLATION_FAILED_DISPLAY, TerminalState,
    is_error_sentinel, is_no_text_sentinel,
};
pub use present::{Clipboard, Present, TextBuffers, TextField};
pub use save::{
    FileFilter, PresetDialog, SaveDialog, SaveDialogFuture, SaveError, SaveRequest, SaveResponse,
};
pub use session::{CaptureMode, CaptureSession, Phase};

use outcome::{Classification, classify, usable_translation};
use session::{BusyFlag, BusySource, BusySources, SessionSlot};

const CAPTURE_BUSY: &str = "A capture is already in progress";
const TRANSLATION_BUSY: &str = "A translation is already in progress";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub cancel_marker: PathBuf,
    pub log_file: PathBuf,
    pub captures_dir: PathBuf,
    pub fallback_translation: bool,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cancel_marker: settings.cancel_marker_path(),
            log_file: settings.log_file_path(),
            captures_dir: settings.captures_path(),
            fallback_translation: settings.fallback_translation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub mode: CaptureMode,
    pub terminal: TerminalState,
    pub notification: Option<OutcomeNotification>,
    pub revealed: bool,
    pub texts: TextBuffers,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureOutcome {
    Completed(CaptureReport),
    Busy { notification: OutcomeNotification },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslateStatus {
    Completed,
    Failed,
    Rejected,
    Busy,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateReport {
    pub status: TranslateStatus,
    pub notification: OutcomeNotification,
    pub texts: TextBuffers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum SaveStatus {
    Saved(PathBuf),
    Canceled,
    NothingToSave,
    Failed(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub status: SaveStatus,
    pub notification: Option<OutcomeNotification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub field: TextField,
    pub copied: Option<String>,
    pub notification: OutcomeNotification,
}

struct Resolution {
    terminal: TerminalState,
    texts: TextBuffers,
    notification: Option<OutcomeNotification>,
}

impl Resolution {
    fn failure(kind: ErrorKind, extracted: String, message: impl Into<String>) -> Self {
        Self {
            terminal: TerminalState::Error(kind),
            texts: TextBuffers::new(extracted, ""),
            notification: Some(OutcomeNotification::error(message)),
        }
    }
}

pub struct Orchestrator<I, T, P> {
    invoker: I,
    translator: T,
    presenter: P,
    options: PipelineOptions,
    sessions: SessionSlot,
    translating: BusyFlag,
    busy: Mutex<BusySources>,
    buffers: Mutex<TextBuffers>,
}

/// Work a trigger started that still owes the presenter its final update.
enum Pending {
    Capture(CaptureMode),
    Translation { previous: String },
}

/// Settles abandoned work when a trigger's future is dropped before completion.
struct PendingGuard<'a, I, T, P>
where
    I: Invoke,
    T: Translate,
    P: Present,
{
    orchestrator: &'a Orchestrator<I, T, P>,
    pending: Option<Pending>,
}

impl<I, T, P> PendingGuard<'_, I, T, P>
where
    I: Invoke,
    T: Translate,
    P: Present,
{
    fn settle(&mut self) {
        self.pending = None;
    }
}

impl<I, T, P> Drop for PendingGuard<'_, I, T, P>
where
    I: Invoke,
    T: Translate,
    P: Present,
{
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.orchestrator.abandon(pending);
        }
    }
}

impl<I, T, P> Orchestrator<I, T, P>
where
    I: Invoke,
    T: Translate,
    P: Present,
{
    pub fn new(invoker: I, translator: T, presenter: P, options: PipelineOptions) -> Self {
        Self {
            invoker,
            translator,
            presenter,
            options,
            sessions: SessionSlot::default(),
            translating: BusyFlag::default(),
            busy: Mutex::new(BusySources::default()),
            buffers: Mutex::new(TextBuffers::default()),
        }
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn phase(&self) -> Phase {
        self.sessions.phase()
    }

    pub fn active_session(&self) -> Option<CaptureSession> {
        self.sessions.snapshot()
    }

    pub fn is_translating(&self) -> bool {
        self.translating.is_busy()
    }

    pub fn texts(&self) -> TextBuffers {
        self.lock_buffers().clone()
    }

    /// Runs one capture session. A trigger while another session is active is ignored.
    pub async fn capture(&self, mode: CaptureMode, target_language: &str) -> CaptureOutcome {
        let Some(session) = self.sessions.begin(mode, target_language) else {
            info!("capture trigger ignored: a session is already active");
            let notification = self.emit(OutcomeNotification::info(CAPTURE_BUSY));
            return CaptureOutcome::Busy { notification };
        };
        info!(
            "capture session started (mode: {:?}, language: {})",
            mode, target_language
        );

        let mut pending = self.pending(Pending::Capture(mode));
        self.prepare_side_channels().await;
        match mode {
            CaptureMode::Interactive => {
                self.replace_texts(TextBuffers::new(SCANNING_PLACEHOLDER, ""), true);
                self.mark_busy(BusySource::Capture, true);
            }
            CaptureMode::Silent => self.replace_texts(TextBuffers::default(), false),
        }

        let invocation = self.invoker.invoke(target_language).await;
        session.set_phase(Phase::Parsing);
        let resolution = self.resolve(invocation, mode, target_language).await;
        pending.settle();

        if mode == CaptureMode::Interactive {
            self.mark_busy(BusySource::Capture, false);
        }
        let silent_cancel =
            mode == CaptureMode::Silent && resolution.terminal == TerminalState::Cancelled;
        // The window stays hidden on a silent cancel but still mirrors the cleared buffers.
        self.replace_texts(resolution.texts.clone(), true);

        let revealed = mode == CaptureMode::Silent && !silent_cancel;
        if revealed {
            self.presenter.reveal_window();
        }
        if let Some(notification) = &resolution.notification {
            self.presenter.notify(notification);
        }

        if let Some(started_at) = session.started_at() {
            let elapsed = OffsetDateTime::now_utc() - started_at;
            info!(
                "capture session finished as {:?} in {:.2}s",
                resolution.terminal,
                elapsed.as_seconds_f32()
            );
        }
        drop(session);

        CaptureOutcome::Completed(CaptureReport {
            mode,
            terminal: resolution.terminal,
            notification: resolution.notification,
            revealed,
            texts: resolution.texts,
        })
    }

    /// Manual re-translate of `text`; only the translated buffer is written.
    pub async fn translate_text(&self, text: &str, target_language: &str) -> TranslateReport {
        if text.is_empty() || text == SCANNING_PLACEHOLDER || text == CANCELLED_TEXT {
            let notification = self.emit(OutcomeNotification::error("Please capture text first"));
            return self.translate_report(TranslateStatus::Rejected, notification);
        }
        let Some(_busy) = self.translating.try_acquire() else {
            info!("translate trigger ignored: a translation is already running");
            let notification = self.emit(OutcomeNotification::info(TRANSLATION_BUSY));
            return self.translate_report(TranslateStatus::Busy, notification);
        };

        let previous = self.texts().translated;
        let mut pending = self.pending(Pending::Translation { previous });
        self.replace_translated(TRANSLATING_PLACEHOLDER.to_string());
        self.mark_busy(BusySource::Translation, true);
        let result = self.translator.translate(text, target_language).await;
        pending.settle();
        self.mark_busy(BusySource::Translation, false);

        match result {
            Ok(translated) => {
                self.replace_translated(translated);
                let notification = self.emit(OutcomeNotification::success("Translation completed"));
                self.translate_report(TranslateStatus::Completed, notification)
            }
            Err(err) => {
                warn!("manual translation failed: {}", err);
                self.replace_translated(format!("Translation error: {}", err));
                let notification = self.emit(OutcomeNotification::error("Translation failed"));
                self.translate_report(TranslateStatus::Failed, notification)
            }
        }
    }

    /// Saves the displayed text through the host's dialog.
    pub async fn save<D: SaveDialog + ?Sized>(&self, dialog: &D) -> SaveReport {
        let texts = self.texts();
        let Some((content, default_name)) = save::choose_content(&texts) else {
            let notification = self.emit(OutcomeNotification::error("No text to save"));
            return SaveReport {
                status: SaveStatus::NothingToSave,
                notification: Some(notification),
            };
        };

        let request = SaveRequest::text_file(&self.options.captures_dir, default_name);
        let response = dialog.prompt(&request).await;
        let path = match response.file_path {
            Some(path) if !response.canceled => path,
            _ => {
                debug!("save dialog canceled");
                return SaveReport {
                    status: SaveStatus::Canceled,
                    notification: None,
                };
            }
        };

        match save::write_text(&path, content).await {
            Ok(()) => {
                info!("saved text to {}", path.display());
                let notification = self.emit(OutcomeNotification::success(format!(
                    "Text successfully saved: {}",
                    path.display()
                )));
                SaveReport {
                    status: SaveStatus::Saved(path),
                    notification: Some(notification),
                }
            }
            Err(err) => {
                error!("{}", err);
                let notification =
                    self.emit(OutcomeNotification::error(format!("Could not save file: {}", err)));
                SaveReport {
                    status: SaveStatus::Failed(path),
                    notification: Some(notification),
                }
            }
        }
    }

    /// Copies the focused field, defaulting to the translation.
    pub fn copy<C: Clipboard + ?Sized>(&self, focus: Option<TextField>, clipboard: &C) -> CopyReport {
        let field = focus.unwrap_or(TextField::Translated);
        let text = self.texts().get(field).to_string();
        if text.is_empty() {
            return CopyReport {
                field,
                copied: None,
                notification: self.emit(OutcomeNotification::error("No text to copy")),
            };
        }
        match clipboard.write_text(&text) {
            Ok(()) => CopyReport {
                field,
                copied: Some(text),
                notification: self.emit(OutcomeNotification::success("Text copied to clipboard")),
            },
            Err(err) => {
                warn!("clipboard write failed: {:#}", err);
                CopyReport {
                    field,
                    copied: None,
                    notification: self.emit(OutcomeNotification::error("Could not copy text")),
                }
            }
        }
    }

    pub fn clear(&self) -> OutcomeNotification {
        self.replace_texts(TextBuffers::default(), true);
        self.emit(OutcomeNotification::info("Text cleared"))
    }

    async fn resolve(
        &self,
        invocation: Result<InvocationOutput, InvokeError>,
        mode: CaptureMode,
        target_language: &str,
    ) -> Resolution {
        let output = match invocation {
            Ok(output) => output,
            Err(err @ InvokeError::Timeout(_)) => {
                error!("{}", err);
                return Resolution::failure(
                    ErrorKind::Timeout,
                    format!("OCR execution error: {}", err),
                    "OCR process timed out",
                );
            }
            Err(err) => {
                error!("{}", err);
                return Resolution::failure(
                    ErrorKind::Subprocess,
                    format!("OCR execution error: {}", err),
                    format!("OCR process failed: {}", err),
                );
            }
        };

        if self.consume_cancel_marker().await {
            return match mode {
                CaptureMode::Interactive => Resolution {
                    terminal: TerminalState::Cancelled,
                    texts: TextBuffers::new(CANCELLED_TEXT, ""),
                    notification: Some(OutcomeNotification::info("Process cancelled")),
                },
                CaptureMode::Silent => Resolution {
                    terminal: TerminalState::Cancelled,
                    texts: TextBuffers::default(),
                    notification: None,
                },
            };
        }

        if !output.succeeded() {
            let stderr = output.stderr.trim();
            let detail = if stderr.is_empty() {
                output.exit_description()
            } else {
                stderr.to_string()
            };
            error!("OCR backend failed: {}", detail);
            debug!("OCR backend stdout: {}", output.stdout);
            return Resolution::failure(
                ErrorKind::Subprocess,
                format!("OCR execution error: {}", detail),
                format!("OCR process failed: {}", detail),
            );
        }

        match parser::parse(&output.stdout) {
            Ok(result) => self.resolve_parsed(result, target_language).await,
            Err(err) => {
                error!("could not parse OCR backend output: {}", err);
                self.dump_backend_log().await;
                Resolution::failure(
                    ErrorKind::Parse,
                    format!("JSON processing error: {}\n\nRaw output: {}", err, output.stdout),
                    "Could not process result",
                )
            }
        }
    }

    async fn resolve_parsed(&self, result: CaptureResult, target_language: &str) -> Resolution {
        let shown_translation = result
            .translated_text
            .clone()
            .unwrap_or_else(|| TRANSLATION_FAILED_DISPLAY.to_string());

        match classify(&result) {
            Classification::BackendError => {
                warn!("OCR backend reported: {}", result.extracted_text);
                Resolution {
                    terminal: TerminalState::Error(ErrorKind::Backend),
                    notification: Some(OutcomeNotification::error(result.extracted_text.clone())),
                    texts: TextBuffers::new(result.extracted_text, shown_translation),
                }
            }
            Classification::NoText => {
                let extracted = if result.extracted_text.is_empty() {
                    NO_TEXT_DISPLAY.to_string()
                } else {
                    result.extracted_text
                };
                Resolution {
                    terminal: TerminalState::NoText,
                    texts: TextBuffers::new(extracted, shown_translation),
                    notification: Some(OutcomeNotification::warning(
                        "No text found in the selected area",
                    )),
                }
            }
            Classification::Success => {
                let detected = OutcomeNotification::success("Text successfully detected");
                if let Some(translated) = usable_translation(&result) {
                    let texts = TextBuffers::new(result.extracted_text.clone(), translated);
                    return Resolution {
                        terminal: TerminalState::Success,
                        texts,
                        notification: Some(detected),
                    };
                }
                if !self.options.fallback_translation {
                    return Resolution {
                        terminal: TerminalState::Success,
                        texts: TextBuffers::new(result.extracted_text, shown_translation),
                        notification: Some(detected),
                    };
                }

                info!("backend returned no translation; translating in-process");
                match self
                    .translator
                    .translate(&result.extracted_text, target_language)
                    .await
                {
                    Ok(translated) => Resolution {
                        terminal: TerminalState::Success,
                        texts: TextBuffers::new(result.extracted_text, translated),
                        notification: Some(detected),
                    },
                    Err(err) => {
                        warn!("fallback translation failed: {}", err);
                        Resolution {
                            terminal: TerminalState::Error(ErrorKind::Translation),
                            texts: TextBuffers::new(
                                result.extracted_text,
                                format!("Translation error: {}", err),
                            ),
                            notification: Some(OutcomeNotification::error(format!(
                                "Translation failed: {}",
                                err
                            ))),
                        }
                    }
                }
            }
        }
    }

    /// Drops the previous session's log and any stale cancellation marker.
    async fn prepare_side_channels(&self) {
        remove_if_present(&self.options.log_file, "OCR log file").await;
        if remove_if_present(&self.options.cancel_marker, "cancellation marker").await {
            warn!(
                "removed stale cancellation marker: {}",
                self.options.cancel_marker.display()
            );
        }
    }

    async fn consume_cancel_marker(&self) -> bool {
        let marker = &self.options.cancel_marker;
        if tokio::fs::metadata(marker).await.is_err() {
            return false;
        }
        match tokio::fs::read_to_string(marker).await {
            Ok(reason) if !reason.trim().is_empty() => {
                info!("capture cancelled by user: {}", reason.trim())
            }
            _ => info!("capture cancelled by user"),
        }
        remove_if_present(marker, "cancellation marker").await;
        true
    }

    async fn dump_backend_log(&self) {
        match tokio::fs::read_to_string(&self.options.log_file).await {
            Ok(content) => error!("OCR log content:\n{}", content),
            Err(err) => debug!(
                "OCR log unavailable ({}): {}",
                self.options.log_file.display(),
                err
            ),
        }
    }

    fn pending(&self, pending: Pending) -> PendingGuard<'_, I, T, P> {
        PendingGuard {
            orchestrator: self,
            pending: Some(pending),
        }
    }

    fn abandon(&self, pending: Pending) {
        match pending {
            Pending::Capture(mode) => {
                warn!("capture session dropped before reaching a terminal state");
                match mode {
                    CaptureMode::Interactive => {
                        self.mark_busy(BusySource::Capture, false);
                        self.replace_texts(TextBuffers::new(CANCELLED_TEXT, ""), true);
                        self.presenter
                            .notify(&OutcomeNotification::info("Process cancelled"));
                    }
                    CaptureMode::Silent => self.replace_texts(TextBuffers::default(), true),
                }
            }
            Pending::Translation { previous } => {
                warn!("manual translation dropped before completing");
                self.mark_busy(BusySource::Translation, false);
                self.replace_translated(previous);
            }
        }
    }

    fn mark_busy(&self, source: BusySource, busy: bool) {
        let mut sources = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(indicator) = sources.set(source, busy) {
            self.presenter.set_busy(indicator);
        }
    }

    fn emit(&self, notification: OutcomeNotification) -> OutcomeNotification {
        self.presenter.notify(&notification);
        notification
    }

    fn translate_report(
        &self,
        status: TranslateStatus,
        notification: OutcomeNotification,
    ) -> TranslateReport {
        TranslateReport {
            status,
            notification,
            texts: self.texts(),
        }
    }

    fn replace_texts(&self, texts: TextBuffers, show: bool) {
        let snapshot = {
            let mut buffers = self.lock_buffers();
            *buffers = texts;
            buffers.clone()
        };
        if show {
            self.presenter.show_texts(&snapshot);
        }
    }

    fn replace_translated(&self, translated: String) {
        let snapshot = {
            let mut buffers = self.lock_buffers();
            buffers.translated = translated;
            buffers.clone()
        };
        self.presenter.show_texts(&snapshot);
    }

    fn lock_buffers(&self) -> MutexGuard<'_, TextBuffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns whether the file existed and was removed.
async fn remove_if_present(path: &Path, what: &str) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
        Err(err) => {
            warn!("could not remove {} {}: {}", what, path.display(), err);
            false
        }
    }
}

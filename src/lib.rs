use anyhow::{Context, Result, anyhow};
use std::path::Path;

pub mod invoker;
pub mod logging;
pub mod orchestrator;
pub mod parser;
mod paths;
pub mod server;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod translator;

pub use invoker::{InvocationOutput, Invoke, InvokeError, ProcessInvoker};
pub use orchestrator::{
    CaptureMode, CaptureOutcome, ConsolePresenter, Orchestrator, PipelineOptions, TerminalState,
    TranslateStatus,
};
pub use parser::{CaptureResult, ParseError};
pub use settings::Settings;
pub use translator::{GoogleTranslate, Translate, TranslationError};

pub type ConsoleOrchestrator = Orchestrator<ProcessInvoker, GoogleTranslate, ConsolePresenter>;

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Target language; falls back to `translate.default_lang`.
    pub lang: Option<String>,
    pub silent: bool,
    /// Skip the capture and only translate the given input.
    pub translate_only: bool,
    pub serve: Option<String>,
    pub settings_path: Option<String>,
}

pub async fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings = load(&config)?;

    if let Some(addr) = config.serve.clone() {
        server::run_server(settings, addr).await?;
        return Ok(String::new());
    }

    let lang = resolve_lang(config.lang.as_deref(), &settings)?;
    let orchestrator = console_orchestrator(&settings)?;

    if config.translate_only {
        let input = input.unwrap_or_default();
        let input = input.trim();
        if input.is_empty() {
            return Err(anyhow!("stdin is empty"));
        }
        let report = orchestrator.translate_text(input, &lang).await;
        return match report.status {
            TranslateStatus::Completed => Ok(report.texts.translated),
            _ => Err(anyhow!("{}", report.texts.translated)),
        };
    }

    let mode = if config.silent {
        CaptureMode::Silent
    } else {
        CaptureMode::Interactive
    };
    let outcome = orchestrator.capture(mode, &lang).await;
    Ok(format_capture_output(&outcome))
}

/// Loads settings for `config` and makes sure the captures directory exists.
pub fn load(config: &Config) -> Result<Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let captures = settings.captures_path();
    std::fs::create_dir_all(&captures)
        .with_context(|| format!("failed to create captures dir: {}", captures.display()))?;
    Ok(settings)
}

pub fn console_orchestrator(settings: &Settings) -> Result<ConsoleOrchestrator> {
    let translator = GoogleTranslate::from_settings(settings)
        .with_context(|| "failed to build translation client")?;
    Ok(Orchestrator::new(
        ProcessInvoker::from_settings(settings),
        translator,
        ConsolePresenter,
        PipelineOptions::from_settings(settings),
    ))
}

pub fn resolve_lang(requested: Option<&str>, settings: &Settings) -> Result<String> {
    let lang = requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(settings.default_lang.as_str());
    validate_lang_code(lang)?;
    Ok(lang.to_string())
}

pub fn validate_lang_code(code: &str) -> Result<()> {
    let valid_len = (2..=12).contains(&code.len());
    let valid_chars = code
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if !valid_len || !valid_chars {
        return Err(anyhow!("invalid language code: '{}'", code));
    }
    Ok(())
}

pub fn format_capture_output(outcome: &CaptureOutcome) -> String {
    match outcome {
        CaptureOutcome::Completed(report) => format!(
            "extracted:\n{}\ntranslated:\n{}",
            report.texts.extracted, report.texts.translated
        ),
        CaptureOutcome::Busy { notification } => notification.message.clone(),
    }
}

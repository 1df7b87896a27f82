use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_command: String,
    pub backend_args: Vec<String>,
    pub backend_working_dir: Option<String>,
    pub backend_timeout: Option<Duration>,
    pub cancel_marker: String,
    pub log_file: String,
    pub translate_endpoint: String,
    pub default_lang: String,
    pub request_timeout: Duration,
    pub fallback_translation: bool,
    pub captures_dir: String,
    pub notification_duration: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_command: "python".to_string(),
            backend_args: vec!["./backend/translate.py".to_string()],
            backend_working_dir: None,
            backend_timeout: Some(Duration::from_secs(30)),
            cancel_marker: "capture_cancelled.tmp".to_string(),
            log_file: "ocr_log.txt".to_string(),
            translate_endpoint: crate::translator::DEFAULT_ENDPOINT.to_string(),
            default_lang: "en".to_string(),
            request_timeout: Duration::from_secs(15),
            fallback_translation: true,
            captures_dir: "captures".to_string(),
            notification_duration: Duration::from_millis(3500),
        }
    }
}

impl Settings {
    /// Directory the backend runs in; marker and log paths are relative to it.
    pub fn backend_dir(&self) -> PathBuf {
        let cwd = paths::current_dir();
        match self.backend_working_dir.as_deref() {
            Some(dir) => paths::anchor(&cwd, dir),
            None => cwd,
        }
    }

    pub fn cancel_marker_path(&self) -> PathBuf {
        paths::anchor(&self.backend_dir(), &self.cancel_marker)
    }

    pub fn log_file_path(&self) -> PathBuf {
        paths::anchor(&self.backend_dir(), &self.log_file)
    }

    pub fn captures_path(&self) -> PathBuf {
        paths::anchor(&paths::current_dir(), &self.captures_dir)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    backend: Option<BackendSettings>,
    translate: Option<TranslateSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSettings {
    command: Option<String>,
    args: Option<Vec<String>>,
    working_dir: Option<String>,
    timeout_secs: Option<u64>,
    cancel_marker: Option<String>,
    log_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    endpoint: Option<String>,
    default_lang: Option<String>,
    request_timeout_secs: Option<u64>,
    fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    captures_dir: Option<String>,
    notification_ms: Option<u64>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub(crate) fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(backend) = incoming.backend {
            if let Some(command) = non_empty(backend.command) {
                self.backend_command = command;
            }
            if let Some(args) = backend.args {
                self.backend_args = args;
            }
            if let Some(dir) = non_empty(backend.working_dir) {
                self.backend_working_dir = Some(dir);
            }
            if let Some(secs) = backend.timeout_secs {
                self.backend_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            if let Some(marker) = non_empty(backend.cancel_marker) {
                self.cancel_marker = marker;
            }
            if let Some(log_file) = non_empty(backend.log_file) {
                self.log_file = log_file;
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(endpoint) = non_empty(translate.endpoint) {
                self.translate_endpoint = endpoint;
            }
            if let Some(lang) = non_empty(translate.default_lang) {
                self.default_lang = lang;
            }
            if let Some(secs) = translate.request_timeout_secs {
                if secs > 0 {
                    self.request_timeout = Duration::from_secs(secs);
                }
            }
            if let Some(fallback) = translate.fallback {
                self.fallback_translation = fallback;
            }
        }
        if let Some(output) = incoming.output {
            if let Some(dir) = non_empty(output.captures_dir) {
                self.captures_dir = dir;
            }
            if let Some(ms) = output.notification_ms {
                if ms > 0 {
                    self.notification_duration = Duration::from_millis(ms);
                }
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn bundled_settings_match_defaults() {
        let mut settings = Settings::default();
        settings.merge_str(DEFAULT_SETTINGS_TOML).expect("bundled settings");
        let defaults = Settings::default();
        assert_eq!(settings.backend_command, defaults.backend_command);
        assert_eq!(settings.backend_args, defaults.backend_args);
        assert_eq!(settings.backend_working_dir, None);
        assert_eq!(settings.backend_timeout, defaults.backend_timeout);
        assert_eq!(settings.translate_endpoint, defaults.translate_endpoint);
        assert_eq!(settings.notification_duration, defaults.notification_duration);
    }

    #[test]
    fn zero_timeout_disables_backend_timeout() {
        let mut settings = Settings::default();
        settings
            .merge_str("[backend]\ntimeout_secs = 0\ncommand = \"  \"\n")
            .expect("merge");
        assert_eq!(settings.backend_timeout, None);
        assert_eq!(settings.backend_command, "python");
    }

    #[test]
    fn relative_paths_follow_backend_working_dir() {
        let mut settings = Settings::default();
        settings
            .merge_str("[backend]\nworking_dir = \"/opt/ocr\"\nlog_file = \"logs/ocr.txt\"\n")
            .expect("merge");
        assert_eq!(settings.log_file_path(), PathBuf::from("/opt/ocr/logs/ocr.txt"));
        assert_eq!(
            settings.cancel_marker_path(),
            PathBuf::from("/opt/ocr/capture_cancelled.tmp")
        );
    }

    #[test]
    fn empty_working_dir_keeps_previous_layer() {
        let mut settings = Settings::default();
        settings
            .merge_str("[backend]\nworking_dir = \"/opt/ocr\"\n")
            .expect("merge");
        settings
            .merge_str("[backend]\nworking_dir = \"\"\n")
            .expect("merge");
        assert_eq!(settings.backend_working_dir.as_deref(), Some("/opt/ocr"));
    }

    #[test]
    fn load_settings_writes_home_defaults_and_applies_extra_file() {
        with_temp_home(|home| {
            let extra = home.join("extra.toml");
            fs::write(&extra, "[translate]\ndefault_lang = \"tr\"\n").expect("write extra");

            let settings = load_settings(Some(&extra)).expect("load settings");
            assert_eq!(settings.default_lang, "tr");
            assert!(home.join(".screen-translator/settings.toml").exists());
        });
    }

    #[test]
    fn load_settings_rejects_missing_extra_file() {
        with_temp_home(|home| {
            let missing = home.join("missing.toml");
            let err = load_settings(Some(&missing)).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }
}

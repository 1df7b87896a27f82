use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::settings::Settings;

/// Raw result of one backend run. Success/failure semantics are decided by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl InvocationOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn exit_description(&self) -> String {
        match self.exit_code {
            Some(code) => format!("process exited with code {}", code),
            None => "process terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to start OCR backend '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for OCR backend: {0}")]
    Wait(#[source] std::io::Error),
    #[error("backend timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

pub type InvokeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<InvocationOutput, InvokeError>> + Send + 'a>>;

pub trait Invoke: Send + Sync {
    /// Runs the capture+OCR backend once for `target_language`.
    fn invoke<'a>(&'a self, target_language: &'a str) -> InvokeFuture<'a>;
}

impl<T: Invoke + ?Sized> Invoke for Box<T> {
    fn invoke<'a>(&'a self, target_language: &'a str) -> InvokeFuture<'a> {
        (**self).invoke(target_language)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessInvoker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.backend_command.clone())
            .with_args(settings.backend_args.clone())
            .with_working_dir(settings.backend_dir())
            .with_timeout(settings.backend_timeout)
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, target_language: &str) -> Result<InvocationOutput, InvokeError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(target_language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(
            "starting OCR backend: {} {:?} {}",
            self.command, self.args, target_language
        );
        let started = Instant::now();
        let child = command.spawn().map_err(|source| InvokeError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let output = match self.timeout {
            // Dropping the pending future drops the child, which kills it.
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result.map_err(InvokeError::Wait)?,
                Err(_) => {
                    warn!("OCR backend exceeded {}s; killed", limit.as_secs());
                    return Err(InvokeError::Timeout(limit));
                }
            },
            None => child.wait_with_output().await.map_err(InvokeError::Wait)?,
        };

        let result = InvocationOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };
        debug!(
            "OCR backend finished in {:.2}s ({})",
            started.elapsed().as_secs_f32(),
            result.exit_description()
        );
        Ok(result)
    }
}

impl Invoke for ProcessInvoker {
    fn invoke<'a>(&'a self, target_language: &'a str) -> InvokeFuture<'a> {
        Box::pin(self.run(target_language))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> ProcessInvoker {
        ProcessInvoker::new("sh").with_args(vec!["-c".to_string(), script.to_string(), "sh".to_string()])
    }

    #[tokio::test]
    async fn passes_target_language_as_last_argument() {
        let invoker = shell("printf 'lang=%s' \"$1\"");
        let output = invoker.invoke("de").await.expect("invoke");
        assert_eq!(output.stdout, "lang=de");
        assert!(output.succeeded());
    }

    #[tokio::test]
    async fn returns_failures_verbatim() {
        let invoker = shell("echo 'disk error' >&2; exit 3");
        let output = invoker.invoke("en").await.expect("invoke");
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "disk error");
        assert!(!output.succeeded());
    }

    #[tokio::test]
    async fn kills_backend_after_timeout() {
        let invoker = shell("sleep 5").with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = invoker.invoke("en").await.unwrap_err();
        assert!(matches!(err, InvokeError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn reports_missing_executable() {
        let invoker = ProcessInvoker::new("/nonexistent/ocr-backend");
        let err = invoker.invoke("en").await.unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }
}

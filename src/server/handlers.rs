use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use super::models::{
    CaptureRequest, CopyRequest, CopyResponse, ErrorResponse, SaveRequestBody, StateResponse,
    TranslateRequest,
};
use super::state::{ServerOrchestrator, ServerState, SharedView};
use crate::invoker::{Invoke, ProcessInvoker};
use crate::orchestrator::{
    CaptureMode, CaptureOutcome, Clipboard, Orchestrator, OutcomeNotification, PipelineOptions,
    PresetDialog, SaveReport, TranslateReport, TranslateStatus,
};
use crate::settings;
use crate::translator::{GoogleTranslate, Translate};

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, addr: String) -> Result<()> {
    let view = Arc::new(SharedView::new(settings.notification_duration));
    let translator = GoogleTranslate::from_settings(&settings)
        .with_context(|| "failed to build translation client")?;
    let invoker: Box<dyn Invoke> = Box::new(ProcessInvoker::from_settings(&settings));
    let translator: Box<dyn Translate> = Box::new(translator);
    let orchestrator: ServerOrchestrator = Orchestrator::new(
        invoker,
        translator,
        view.clone(),
        PipelineOptions::from_settings(&settings),
    );
    let state = Arc::new(ServerState {
        orchestrator,
        view,
        default_lang: settings.default_lang.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("control server listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(view_state))
        .route("/capture", post(capture))
        .route("/translate", post(translate))
        .route("/save", post(save))
        .route("/copy", post(copy))
        .route("/clear", post(clear))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn view_state(State(state): State<Arc<ServerState>>) -> Json<StateResponse> {
    let snapshot = state.view.snapshot();
    Json(StateResponse {
        phase: state.orchestrator.phase(),
        busy: snapshot.busy,
        translating: state.orchestrator.is_translating(),
        extracted: snapshot.texts.extracted,
        translated: snapshot.texts.translated,
        notification: snapshot.notification,
        reveal_requests: snapshot.reveal_requests,
    })
}

async fn capture(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<CaptureRequest>,
) -> Result<(StatusCode, Json<CaptureOutcome>), ApiError> {
    let lang = request_lang(&state, payload.lang.as_deref())?;
    let mode = if payload.silent.unwrap_or(false) {
        CaptureMode::Silent
    } else {
        CaptureMode::Interactive
    };
    // A spawned task keeps running when the client disconnects mid-capture.
    let task_state = state.clone();
    let outcome =
        tokio::spawn(async move { task_state.orchestrator.capture(mode, &lang).await })
            .await
            .map_err(task_failed)?;
    let status = match outcome {
        CaptureOutcome::Busy { .. } => StatusCode::CONFLICT,
        CaptureOutcome::Completed(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

async fn translate(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<(StatusCode, Json<TranslateReport>), ApiError> {
    let lang = request_lang(&state, payload.lang.as_deref())?;
    let text = match payload.text {
        Some(text) => text,
        None => state.orchestrator.texts().extracted,
    };
    let task_state = state.clone();
    let report =
        tokio::spawn(async move { task_state.orchestrator.translate_text(&text, &lang).await })
            .await
            .map_err(task_failed)?;
    let status = match report.status {
        TranslateStatus::Busy => StatusCode::CONFLICT,
        TranslateStatus::Rejected => StatusCode::BAD_REQUEST,
        TranslateStatus::Completed | TranslateStatus::Failed => StatusCode::OK,
    };
    Ok((status, Json(report)))
}

async fn save(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<SaveRequestBody>,
) -> Json<SaveReport> {
    let dialog = match payload.file_path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => PresetDialog::path(path),
        _ => PresetDialog::cancel(),
    };
    Json(state.orchestrator.save(&dialog).await)
}

/// The host owns the real clipboard; the copied text travels back in the response.
struct ResponseClipboard;

impl Clipboard for ResponseClipboard {
    fn write_text(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn copy(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<CopyRequest>,
) -> Json<CopyResponse> {
    let report = state.orchestrator.copy(payload.field, &ResponseClipboard);
    Json(CopyResponse {
        field: report.field,
        text: report.copied,
        notification: report.notification,
    })
}

async fn clear(State(state): State<Arc<ServerState>>) -> Json<OutcomeNotification> {
    Json(state.orchestrator.clear())
}

fn task_failed(err: tokio::task::JoinError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("server task failed: {}", err),
        }),
    )
}

fn request_lang(state: &ServerState, requested: Option<&str>) -> Result<String, ApiError> {
    let lang = requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(state.default_lang.as_str());
    crate::validate_lang_code(lang).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
    })?;
    Ok(lang.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{InvocationOutput, InvokeFuture};
    use crate::translator::TranslateFuture;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct FixedBackend(&'static str);

    impl Invoke for FixedBackend {
        fn invoke<'a>(&'a self, _target_language: &'a str) -> InvokeFuture<'a> {
            let output = InvocationOutput {
                stdout: self.0.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
            };
            Box::pin(async move { Ok(output) })
        }
    }

    struct Tagging;

    impl Translate for Tagging {
        fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move { Ok(format!("[{}] {}", target_lang, text)) })
        }
    }

    /// Holds its output back until the test releases the gate.
    struct GatedBackend {
        stdout: &'static str,
        gate: Arc<Notify>,
    }

    impl Invoke for GatedBackend {
        fn invoke<'a>(&'a self, _target_language: &'a str) -> InvokeFuture<'a> {
            Box::pin(async move {
                self.gate.notified().await;
                Ok(InvocationOutput {
                    stdout: self.stdout.to_string(),
                    stderr: String::new(),
                    exit_code: Some(0),
                })
            })
        }
    }

    async fn spawn_server(stdout: &'static str) -> (String, TempDir) {
        spawn_server_with(Box::new(FixedBackend(stdout))).await
    }

    async fn spawn_server_with(invoker: Box<dyn Invoke>) -> (String, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let view = Arc::new(SharedView::new(Duration::from_secs(30)));
        let options = PipelineOptions {
            cancel_marker: dir.path().join("capture_cancelled.tmp"),
            log_file: dir.path().join("ocr_log.txt"),
            captures_dir: dir.path().to_path_buf(),
            fallback_translation: true,
        };
        let translator: Box<dyn Translate> = Box::new(Tagging);
        let state = Arc::new(ServerState {
            orchestrator: Orchestrator::new(invoker, translator, view.clone(), options),
            view,
            default_lang: "en".to_string(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });
        (format!("http://{}", addr), dir)
    }

    async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}{}", base, path))
            .json(&body)
            .send()
            .await
            .expect("send");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json"))
    }

    async fn get_json(base: &str, path: &str) -> Value {
        reqwest::get(format!("{}{}", base, path))
            .await
            .expect("send")
            .json()
            .await
            .expect("json")
    }

    #[tokio::test]
    async fn health_carries_cors_headers() {
        let (base, _dir) = spawn_server("{}").await;
        let response = reqwest::get(format!("{}/health", base)).await.expect("send");
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
        let body: Value = response.json().await.expect("json");
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn silent_capture_updates_polled_state() {
        let (base, _dir) =
            spawn_server(r#"log line\n{"extracted": "Hello", "translated": "Hola"}"#).await;
        let (status, body) = post(&base, "/capture", json!({ "silent": true, "lang": "es" })).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["terminal"]["state"], "success");
        assert_eq!(body["revealed"], true);

        let state = get_json(&base, "/state").await;
        assert_eq!(state["phase"], "idle");
        assert_eq!(state["extracted"], "Hello");
        assert_eq!(state["translated"], "Hola");
        assert_eq!(state["reveal_requests"], 1);
        assert_eq!(state["notification"]["message"], "Text successfully detected");
        assert_eq!(state["notification"]["severity"], "success");
    }

    #[tokio::test]
    async fn invalid_language_is_rejected_before_capture() {
        let (base, _dir) = spawn_server(r#"{"extracted": "Hello"}"#).await;
        let (status, body) = post(&base, "/capture", json!({ "lang": "en fr" })).await;
        assert_eq!(status, 400);
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("invalid language code")
        );
        let state = get_json(&base, "/state").await;
        assert_eq!(state["extracted"], "");
    }

    #[tokio::test]
    async fn translate_defaults_to_extracted_text() {
        let (base, _dir) = spawn_server(r#"{"extracted": "Hello", "translated": "Hola"}"#).await;
        post(&base, "/capture", json!({})).await;
        let (status, body) = post(&base, "/translate", json!({ "lang": "fr" })).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["texts"]["extracted"], "Hello");
        assert_eq!(body["texts"]["translated"], "[fr] Hello");
    }

    #[tokio::test]
    async fn translate_without_capture_is_bad_request() {
        let (base, _dir) = spawn_server("{}").await;
        let (status, body) = post(&base, "/translate", json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body["notification"]["message"], "Please capture text first");
    }

    #[tokio::test]
    async fn copy_returns_the_chosen_field() {
        let (base, _dir) = spawn_server(r#"{"extracted": "Hello", "translated": "Hola"}"#).await;
        let (_, empty) = post(&base, "/copy", json!({})).await;
        assert!(empty.get("text").is_none());
        assert_eq!(empty["notification"]["message"], "No text to copy");

        post(&base, "/capture", json!({})).await;
        let (_, body) = post(&base, "/copy", json!({})).await;
        assert_eq!(body["text"], "Hola");
        let (_, body) = post(&base, "/copy", json!({ "field": "extracted" })).await;
        assert_eq!(body["text"], "Hello");
        assert_eq!(body["notification"]["message"], "Text copied to clipboard");
    }

    #[tokio::test]
    async fn save_writes_to_the_chosen_path() {
        let (base, dir) = spawn_server(r#"{"extracted": "Hello", "translated": "Hola"}"#).await;
        post(&base, "/capture", json!({})).await;

        let (_, canceled) = post(&base, "/save", json!({})).await;
        assert_eq!(canceled["status"]["status"], "canceled");

        let target = dir.path().join("out.txt");
        let (_, body) = post(
            &base,
            "/save",
            json!({ "file_path": target.to_string_lossy() }),
        )
        .await;
        assert_eq!(body["status"]["status"], "saved");
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "Hola");
    }

    #[tokio::test]
    async fn clear_empties_both_texts() {
        let (base, _dir) = spawn_server(r#"{"extracted": "Hello", "translated": "Hola"}"#).await;
        post(&base, "/capture", json!({})).await;
        let (_, body) = post(&base, "/clear", json!({})).await;
        assert_eq!(body["message"], "Text cleared");
        let state = get_json(&base, "/state").await;
        assert_eq!(state["extracted"], "");
        assert_eq!(state["translated"], "");
    }

    #[tokio::test]
    async fn capture_finishes_after_client_disconnects() {
        let gate = Arc::new(Notify::new());
        let (base, _dir) = spawn_server_with(Box::new(GatedBackend {
            stdout: r#"{"extracted": "Hello", "translated": "Hola"}"#,
            gate: gate.clone(),
        }))
        .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .expect("client");
        let abandoned = client
            .post(format!("{}/capture", base))
            .json(&json!({}))
            .send()
            .await;
        assert!(abandoned.is_err());

        let state = get_json(&base, "/state").await;
        assert_eq!(state["phase"], "capturing");
        assert_eq!(state["busy"], true);

        gate.notify_one();
        let mut state = get_json(&base, "/state").await;
        for _ in 0..100 {
            if state["phase"] == "idle" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            state = get_json(&base, "/state").await;
        }
        assert_eq!(state["phase"], "idle");
        assert_eq!(state["busy"], false);
        assert_eq!(state["extracted"], "Hello");
        assert_eq!(state["notification"]["message"], "Text successfully detected");
    }
}

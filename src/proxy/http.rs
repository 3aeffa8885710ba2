//! HTTP surface for askpdf.
//!
//! This module exposes a compact axum router:
//!
//! - `POST /upload` – accept a multipart PDF, persist it under a fresh handle, and
//!   report page/chunk counts (chunking is previewed; embedding happens lazily on the
//!   first question).
//! - `POST /ask/{pdf_id}` – answer one question with retrieval-augmented generation.
//! - `POST /ask-multiple/{pdf_id}` – answer a batch; failures are isolated per entry.
//! - `GET /pdfs` – list uploaded handles.
//! - `DELETE /pdf/{pdf_id}` – drop the handle, its file, and its index.
//! - `GET /` – health payload with service counters.
//!
//! Every endpoint translates into `tools/call` invocations on the supervised tool
//! server; results are surfaced unchanged apart from handle echoing and wall-clock
//! timing. Tool faults map onto HTTP status codes by their `kind`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::error::{ErrorKind, ToolFault};
use crate::metrics::ServiceMetrics;

use super::handles::HandleRegistry;
use super::supervisor::ToolClient;

/// Shared state behind the router.
pub struct AppState {
    /// Client for the supervised tool server.
    pub tools: Arc<dyn ToolClient>,
    /// Upload handle registry.
    pub handles: Arc<HandleRegistry>,
    /// Service counters for the health payload.
    pub metrics: Arc<ServiceMetrics>,
}

/// Router construction parameters.
pub struct RouterConfig {
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// CORS origin allow-list.
    pub allowed_origins: Vec<String>,
}

/// Build the HTTP router.
pub fn create_router(state: Arc<AppState>, config: RouterConfig) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/upload", post(upload))
        .route("/ask/:pdf_id", post(ask))
        .route("/ask-multiple/:pdf_id", post(ask_multiple))
        .route("/pdfs", get(list_pdfs))
        .route("/pdf/:pdf_id", delete(delete_pdf))
        // Leave headroom for multipart framing; the handler enforces the real cap.
        .layer(DefaultBodyLimit::max(config.max_upload_bytes + 64 * 1024))
        .layer(cors_layer(&config.allowed_origins))
        .with_state(Arc::new(RouterState {
            app: state,
            max_upload_bytes: config.max_upload_bytes,
        }))
}

struct RouterState {
    app: Arc<AppState>,
    max_upload_bytes: usize,
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "askpdf",
        "version": env!("CARGO_PKG_VERSION"),
        "metrics": state.app.metrics.snapshot(),
    }))
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    pdf_id: String,
    filename: String,
    num_pages: u64,
    num_chunks: u64,
    message: String,
}

async fn upload(
    State(state): State<Arc<RouterState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                return Err(AppError::with_status(
                    StatusCode::BAD_REQUEST,
                    ToolFault::new(
                        ErrorKind::BadInput,
                        format!("malformed multipart body: {error}"),
                    ),
                ));
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "document.pdf".into());
        let bytes = field.bytes().await.map_err(|error| {
            AppError::with_status(
                StatusCode::PAYLOAD_TOO_LARGE,
                ToolFault::new(
                    ErrorKind::BadInput,
                    format!("failed to read upload: {error}"),
                ),
            )
        })?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            ToolFault::new(ErrorKind::BadInput, "multipart field 'file' is required"),
        ));
    };
    if bytes.len() > state.max_upload_bytes {
        return Err(AppError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            ToolFault::new(
                ErrorKind::BadInput,
                format!(
                    "upload of {} bytes exceeds the {} byte limit",
                    bytes.len(),
                    state.max_upload_bytes
                ),
            ),
        ));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(AppError::with_status(
            StatusCode::BAD_REQUEST,
            ToolFault::new(ErrorKind::BadInput, "the uploaded file is not a PDF"),
        ));
    }

    let record = state.app.handles.store(&filename, bytes).await?;
    let prepared = state
        .app
        .tools
        .call_tool(
            "prepare_pdf",
            json!({ "pdf_path": record.path.to_string_lossy() }),
        )
        .await;
    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(fault) => {
            // The document is unusable; roll the upload back before failing.
            state.app.handles.remove(&record.pdf_id).await;
            return Err(AppError::from(fault));
        }
    };

    state.app.metrics.record_upload();
    let num_chunks = prepared["num_chunks"].as_u64().unwrap_or_default();
    Ok(Json(UploadResponse {
        pdf_id: record.pdf_id,
        filename: record.filename,
        num_pages: prepared["num_pages"].as_u64().unwrap_or_default(),
        num_chunks,
        message: if num_chunks == 0 {
            "uploaded; the PDF yielded no text (scanned images?), questions will fail".into()
        } else {
            "uploaded and ready for questions".into()
        },
    }))
}

/// Request body for `POST /ask/{pdf_id}`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Request body for `POST /ask-multiple/{pdf_id}`.
#[derive(Deserialize)]
struct AskMultipleRequest {
    questions: Vec<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

/// Response envelope shared by both ask endpoints.
#[derive(Serialize)]
struct AskResponse {
    pdf_id: String,
    answers: Vec<Value>,
    processing_time: f64,
}

async fn ask(
    State(state): State<Arc<RouterState>>,
    Path(pdf_id): Path<String>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if request.question.trim().is_empty() {
        return Err(empty_question_error());
    }
    let record = state.app.handles.resolve_required(&pdf_id)?;

    let started = Instant::now();
    let mut arguments = json!({
        "pdf_path": record.path.to_string_lossy(),
        "question": request.question,
    });
    if let Some(top_k) = request.top_k {
        arguments["top_k"] = json!(top_k);
    }
    let answer = state
        .app
        .tools
        .call_tool("answer_question_rag", arguments)
        .await?;

    state.app.metrics.record_questions(1);
    Ok(Json(AskResponse {
        pdf_id,
        answers: vec![answer],
        processing_time: started.elapsed().as_secs_f64(),
    }))
}

async fn ask_multiple(
    State(state): State<Arc<RouterState>>,
    Path(pdf_id): Path<String>,
    Json(request): Json<AskMultipleRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if request.questions.is_empty()
        || request
            .questions
            .iter()
            .any(|question| question.trim().is_empty())
    {
        return Err(empty_question_error());
    }
    let record = state.app.handles.resolve_required(&pdf_id)?;

    let started = Instant::now();
    let mut arguments = json!({
        "pdf_path": record.path.to_string_lossy(),
        "questions": request.questions,
    });
    if let Some(top_k) = request.top_k {
        arguments["top_k"] = json!(top_k);
    }
    let result = state
        .app
        .tools
        .call_tool("answer_multiple_questions_rag", arguments)
        .await?;

    let answers = result["answers"].as_array().cloned().unwrap_or_default();
    state.app.metrics.record_questions(answers.len() as u64);
    Ok(Json(AskResponse {
        pdf_id,
        answers,
        processing_time: started.elapsed().as_secs_f64(),
    }))
}

async fn list_pdfs(State(state): State<Arc<RouterState>>) -> Json<Vec<Value>> {
    let records = state
        .app
        .handles
        .list()
        .into_iter()
        .map(|record| {
            json!({
                "pdf_id": record.pdf_id,
                "filename": record.filename,
                "uploaded_at": record.uploaded_at,
            })
        })
        .collect();
    Json(records)
}

async fn delete_pdf(
    State(state): State<Arc<RouterState>>,
    Path(pdf_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let record = state.app.handles.resolve_required(&pdf_id)?;

    // Drop the index first: the tool server needs the file on disk to locate its
    // cache entry, and deletion is refused while a build is in flight.
    state
        .app
        .tools
        .call_tool(
            "forget_pdf",
            json!({ "pdf_path": record.path.to_string_lossy() }),
        )
        .await?;

    state.app.handles.remove(&pdf_id).await;
    tracing::info!(pdf_id = %pdf_id, "Deleted upload");
    Ok(Json(json!({ "deleted": pdf_id })))
}

fn empty_question_error() -> AppError {
    AppError::with_status(
        StatusCode::UNPROCESSABLE_ENTITY,
        ToolFault::new(ErrorKind::BadInput, "`question` must not be empty"),
    )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Error wrapper mapping fault kinds onto HTTP responses.
struct AppError {
    status: StatusCode,
    fault: ToolFault,
}

impl AppError {
    fn with_status(status: StatusCode, fault: ToolFault) -> Self {
        Self { status, fault }
    }
}

impl From<ToolFault> for AppError {
    fn from(fault: ToolFault) -> Self {
        let status = StatusCode::from_u16(fault.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, fault }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.fault)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Tool client stub with per-tool scripted results.
    #[derive(Default)]
    struct StubToolClient {
        results: Mutex<HashMap<String, Result<Value, ToolFault>>>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl StubToolClient {
        fn with(tool: &str, result: Result<Value, ToolFault>) -> Arc<Self> {
            let stub = Self::default();
            stub.results.lock().unwrap().insert(tool.into(), result);
            Arc::new(stub)
        }

        fn also(self: Arc<Self>, tool: &str, result: Result<Value, ToolFault>) -> Arc<Self> {
            self.results.lock().unwrap().insert(tool.into(), result);
            self
        }

        fn recorded(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolClient for StubToolClient {
        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolFault> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            match self.results.lock().unwrap().get(name) {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(fault)) => Err(fault.clone()),
                None => Err(ToolFault::internal(format!("no stub for tool '{name}'"))),
            }
        }
    }

    fn test_router(tools: Arc<dyn ToolClient>, uploads: std::path::PathBuf) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState {
            tools,
            handles: Arc::new(HandleRegistry::new(uploads)),
            metrics: Arc::new(ServiceMetrics::new()),
        });
        let router = create_router(
            Arc::clone(&state),
            RouterConfig {
                max_upload_bytes: 1024 * 1024,
                allowed_origins: vec!["http://localhost:3000".into()],
            },
        );
        (router, state)
    }

    fn multipart_upload(path: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let boundary = "askpdf-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn json_request(method: Method, path: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_service_and_counters() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let (router, _) = test_router(
            StubToolClient::with("none", Ok(json!({}))),
            workdir.path().join("uploads"),
        );
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["service"], "askpdf");
        assert_eq!(body["metrics"]["documents_uploaded"], 0);
    }

    #[tokio::test]
    async fn upload_stores_file_and_reports_counts() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with(
            "prepare_pdf",
            Ok(json!({ "num_pages": 2, "num_characters": 120, "num_chunks": 5 })),
        );
        let (router, state) = test_router(stub.clone(), workdir.path().join("uploads"));

        let response = router
            .oneshot(multipart_upload("/upload", "report.pdf", b"%PDF-1.7 body"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["num_pages"], 2);
        assert_eq!(body["num_chunks"], 5);
        assert_eq!(body["filename"], "report.pdf");
        let pdf_id = body["pdf_id"].as_str().expect("pdf_id");
        assert!(pdf_id.starts_with("report-"));

        let record = state.handles.resolve(pdf_id).expect("handle registered");
        assert!(record.path.exists());
        assert_eq!(state.metrics.snapshot().documents_uploaded, 1);

        let calls = stub.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "prepare_pdf");
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_bytes() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let (router, _) = test_router(
            StubToolClient::with("prepare_pdf", Ok(json!({}))),
            workdir.path().join("uploads"),
        );
        let response = router
            .oneshot(multipart_upload("/upload", "notes.txt", b"plain text"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "bad_input");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_with_413() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let state = Arc::new(AppState {
            tools: StubToolClient::with("prepare_pdf", Ok(json!({}))),
            handles: Arc::new(HandleRegistry::new(workdir.path().join("uploads"))),
            metrics: Arc::new(ServiceMetrics::new()),
        });
        let router = create_router(
            state,
            RouterConfig {
                max_upload_bytes: 16,
                allowed_origins: vec![],
            },
        );
        let response = router
            .oneshot(multipart_upload(
                "/upload",
                "big.pdf",
                b"%PDF-1.7 well beyond sixteen bytes",
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn failed_preparation_rolls_the_upload_back() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with(
            "prepare_pdf",
            Err(ToolFault::new(ErrorKind::ExtractFailed, "corrupt xref")),
        );
        let (router, state) = test_router(stub, workdir.path().join("uploads"));

        let response = router
            .oneshot(multipart_upload("/upload", "broken.pdf", b"%PDF-1.0 junk"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["kind"], "extract_failed");
        assert!(state.handles.list().is_empty());
    }

    #[tokio::test]
    async fn ask_on_unknown_handle_is_404() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let (router, _) = test_router(
            StubToolClient::with("answer_question_rag", Ok(json!({}))),
            workdir.path().join("uploads"),
        );
        let response = router
            .oneshot(json_request(
                Method::POST,
                "/ask/does-not-exist",
                json!({ "question": "anything" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["kind"], "unknown_handle");
    }

    #[tokio::test]
    async fn empty_question_is_422() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let (router, state) = test_router(
            StubToolClient::with("answer_question_rag", Ok(json!({}))),
            workdir.path().join("uploads"),
        );
        let record = state
            .handles
            .store("doc.pdf", b"%PDF-1".to_vec())
            .await
            .expect("store");
        let response = router
            .oneshot(json_request(
                Method::POST,
                &format!("/ask/{}", record.pdf_id),
                json!({ "question": "   " }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn ask_returns_the_answer_with_timing() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with(
            "answer_question_rag",
            Ok(json!({
                "question": "What is the capital of Freedonia?",
                "answer": "Fredonia City",
                "model": "test-model-2024",
            })),
        );
        let (router, state) = test_router(stub.clone(), workdir.path().join("uploads"));
        let record = state
            .handles
            .store("doc.pdf", b"%PDF-1".to_vec())
            .await
            .expect("store");

        let response = router
            .oneshot(json_request(
                Method::POST,
                &format!("/ask/{}", record.pdf_id),
                json!({ "question": "What is the capital of Freedonia?" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pdf_id"], record.pdf_id);
        assert_eq!(body["answers"][0]["answer"], "Fredonia City");
        assert!(!body["answers"][0]["model"].as_str().unwrap().is_empty());
        assert!(body["processing_time"].as_f64().is_some());
        assert_eq!(state.metrics.snapshot().questions_answered, 1);

        // The tool call carried the stored file path, not the handle.
        let calls = stub.recorded();
        assert_eq!(calls[0].0, "answer_question_rag");
        assert_eq!(
            calls[0].1["pdf_path"],
            record.path.to_string_lossy().as_ref()
        );
    }

    #[tokio::test]
    async fn ask_multiple_passes_batch_results_through() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with(
            "answer_multiple_questions_rag",
            Ok(json!({
                "answers": [
                    { "question": "q1", "answer": "a1", "model": "m" },
                    { "question": "q2", "error": { "kind": "model_permanent", "detail": "bad" } },
                    { "question": "q3", "answer": "a3", "model": "m" },
                ]
            })),
        );
        let (router, state) = test_router(stub, workdir.path().join("uploads"));
        let record = state
            .handles
            .store("doc.pdf", b"%PDF-1".to_vec())
            .await
            .expect("store");

        let response = router
            .oneshot(json_request(
                Method::POST,
                &format!("/ask-multiple/{}", record.pdf_id),
                json!({ "questions": ["q1", "q2", "q3"] }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let answers = body["answers"].as_array().expect("answers");
        assert_eq!(answers.len(), 3);
        assert_eq!(answers[0]["answer"], "a1");
        assert_eq!(answers[1]["error"]["kind"], "model_permanent");
        assert_eq!(answers[2]["answer"], "a3");
        assert_eq!(state.metrics.snapshot().questions_answered, 3);
    }

    #[tokio::test]
    async fn backend_failures_map_to_503() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with(
            "answer_question_rag",
            Err(ToolFault::new(
                ErrorKind::BackendUnavailable,
                "restart budget exhausted",
            )),
        );
        let (router, state) = test_router(stub, workdir.path().join("uploads"));
        let record = state
            .handles
            .store("doc.pdf", b"%PDF-1".to_vec())
            .await
            .expect("store");

        let response = router
            .oneshot(json_request(
                Method::POST,
                &format!("/ask/{}", record.pdf_id),
                json!({ "question": "q" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["kind"], "backend_unavailable");
    }

    #[tokio::test]
    async fn model_timeouts_map_to_504() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with(
            "answer_question_rag",
            Err(ToolFault::new(ErrorKind::ModelTimeout, "deadline exceeded")),
        );
        let (router, state) = test_router(stub, workdir.path().join("uploads"));
        let record = state
            .handles
            .store("doc.pdf", b"%PDF-1".to_vec())
            .await
            .expect("store");

        let response = router
            .oneshot(json_request(
                Method::POST,
                &format!("/ask/{}", record.pdf_id),
                json!({ "question": "q" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn list_and_delete_round_trip() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with("forget_pdf", Ok(json!({ "forgotten": true })));
        let (router, state) = test_router(stub, workdir.path().join("uploads"));
        let record = state
            .handles
            .store("doc.pdf", b"%PDF-1".to_vec())
            .await
            .expect("store");

        let listed = router
            .clone()
            .oneshot(Request::builder().uri("/pdfs").body(Body::empty()).unwrap())
            .await
            .expect("response");
        let body = body_json(listed).await;
        assert_eq!(body.as_array().expect("list").len(), 1);
        assert_eq!(body[0]["pdf_id"], record.pdf_id);

        let deleted = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/pdf/{}", record.pdf_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(body_json(deleted).await["deleted"], record.pdf_id);
        assert!(!record.path.exists());

        let again = router
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/pdf/{}", record.pdf_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn also_helper_extends_the_script() {
        let workdir = tempfile::tempdir().expect("tempdir");
        let stub = StubToolClient::with("prepare_pdf", Ok(json!({ "num_pages": 1, "num_chunks": 1 })))
            .also("forget_pdf", Ok(json!({ "forgotten": true })));
        let (router, state) = test_router(stub, workdir.path().join("uploads"));

        let uploaded = router
            .clone()
            .oneshot(multipart_upload("/upload", "doc.pdf", b"%PDF-1.4 x"))
            .await
            .expect("response");
        assert_eq!(uploaded.status(), StatusCode::OK);
        let pdf_id = body_json(uploaded).await["pdf_id"]
            .as_str()
            .expect("pdf_id")
            .to_string();

        let deleted = router
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/pdf/{pdf_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(state.handles.list().is_empty());
    }
}

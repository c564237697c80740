use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use medicai_core::{LlmClient, LlmConfig, MedicalAssistant, DocumentExtractor};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::ServiceConfig,
    models::{AnalysisQuery, DiagnosisResponse, SummaryResponse, UploadResponse},
    session::{SessionRecord, SessionStore, new_session_id},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_store: Arc<dyn SessionStore>,
    pub assistant: MedicalAssistant,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        client: Arc<dyn LlmClient>,
        extractor: DocumentExtractor,
        llm_config: LlmConfig,
        config: ServiceConfig,
    ) -> Self {
        Self {
            session_store,
            assistant: MedicalAssistant::new(client, extractor, llm_config),
            config: Arc::new(config),
        }
    }
}

pub fn create_app(app_state: AppState) -> Router {
    let body_limit = app_state.config.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/upload", post(upload_files))
        .route("/api/patient-summary", get(patient_summary))
        .route("/api/diagnosis", get(diagnosis))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "MedicAI Assistant API is running"
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let uploads = read_file_fields(&mut multipart).await?;

    if uploads.first().is_none_or(|(name, _)| name.is_empty()) {
        return Err(bad_request_error("No selected files"));
    }
    if let Some((name, _)) = uploads
        .iter()
        .find(|(name, _)| !state.config.allows(name))
    {
        return Err(bad_request_error(&format!("File type not allowed: {name}")));
    }

    let session_id = new_session_id();
    let session_dir = state.config.upload_dir.join(&session_id);
    let file_paths = store_uploads(&session_dir, uploads).await.map_err(|e| {
        error!("Failed to store uploads for session {}: {}", session_id, e);
        internal_error("Failed to store uploaded files")
    })?;

    let count = file_paths.len();
    state
        .session_store
        .save(SessionRecord::new(session_id.clone(), file_paths))
        .await
        .map_err(|e| {
            error!("Failed to save session {}: {}", session_id, e);
            internal_error("Failed to create session")
        })?;

    info!("Session {} created with {} files", session_id, count);

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: format!("{count} files uploaded successfully"),
        session_id,
    }))
}

/// Collect every `files[]` part. Errors when the form has no file part at all.
async fn read_file_fields(multipart: &mut Multipart) -> Result<Vec<(String, Bytes)>, ApiError> {
    let mut uploads = Vec::new();
    let mut saw_files_part = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read multipart body: {}", e);
                return Err((e.status(), Json(json!({ "error": e.body_text() }))));
            }
        };

        if !matches!(field.name(), Some("files[]") | Some("files")) {
            continue;
        }
        saw_files_part = true;

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload bytes: {}", e);
            (e.status(), Json(json!({ "error": e.body_text() })))
        })?;
        uploads.push((filename, bytes));
    }

    if !saw_files_part {
        return Err(bad_request_error("No files part"));
    }
    Ok(uploads)
}

async fn store_uploads(
    session_dir: &std::path::Path,
    uploads: Vec<(String, Bytes)>,
) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(session_dir).await?;

    let mut file_paths = Vec::with_capacity(uploads.len());
    for (filename, bytes) in uploads {
        let name = sanitize_filename(&filename);
        let mut path = session_dir.join(&name);
        let mut attempt = 1;
        while file_paths.contains(&path) {
            path = session_dir.join(format!("{attempt}_{name}"));
            attempt += 1;
        }
        tokio::fs::write(&path, &bytes).await?;
        file_paths.push(path);
    }
    Ok(file_paths)
}

/// Reduce a client-supplied name to a safe single path component.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, Clone, Copy)]
enum Artifact {
    Summary,
    Diagnosis,
}

async fn patient_summary(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> ApiResult<SummaryResponse> {
    let summary = produce(&state, query, Artifact::Summary).await?;
    Ok(Json(SummaryResponse {
        status: "success".to_string(),
        summary,
    }))
}

async fn diagnosis(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> ApiResult<DiagnosisResponse> {
    let diagnosis = produce(&state, query, Artifact::Diagnosis).await?;
    Ok(Json(DiagnosisResponse {
        status: "success".to_string(),
        diagnosis,
    }))
}

async fn produce(state: &AppState, query: AnalysisQuery, artifact: Artifact) -> Result<Value, ApiError> {
    let mut record = load_session(state, query.session_id.as_deref()).await?;

    let cached = match artifact {
        Artifact::Summary => &record.summary,
        Artifact::Diagnosis => &record.diagnosis,
    };
    if let (false, Some(value)) = (query.refresh, cached) {
        info!("Returning cached {:?} for session {}", artifact, record.id);
        return Ok(value.clone());
    }

    let paths = &record.file_paths;
    let result = match artifact {
        Artifact::Summary => state
            .assistant
            .patient_summary(paths)
            .await
            .map(|analysis| (analysis.to_value(), analysis.is_fallback())),
        Artifact::Diagnosis => state
            .assistant
            .preliminary_diagnosis(paths)
            .await
            .map(|analysis| (analysis.to_value(), analysis.is_fallback())),
    };
    let (value, is_fallback) = result.map_err(|e| {
        error!("{:?} failed for session {}: {}", artifact, record.id, e);
        internal_error(&e.to_string())
    })?;

    // Fallbacks are returned but never cached, so the next request retries the model
    if is_fallback {
        warn!("Not caching fallback {:?} for session {}", artifact, record.id);
        return Ok(value);
    }

    match artifact {
        Artifact::Summary => record.summary = Some(value.clone()),
        Artifact::Diagnosis => record.diagnosis = Some(value.clone()),
    }
    let session_id = record.id.clone();
    if let Err(e) = state.session_store.save(record).await {
        warn!("Failed to cache {:?} for session {}: {}", artifact, session_id, e);
    }

    Ok(value)
}

async fn load_session(state: &AppState, session_id: Option<&str>) -> Result<SessionRecord, ApiError> {
    let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
        return Err(bad_request_error("No session ID provided"));
    };

    let record = match state.session_store.get(session_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(bad_request_error("Invalid session ID or session expired")),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            return Err(bad_request_error("Invalid session ID or session expired"));
        }
    };

    if record.file_paths.is_empty() {
        return Err(bad_request_error("No files found for this session"));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use axum::body::Body;
    use axum::http::{Request, header};
    use medicai_core::client::test_support::MockLlmClient;
    use medicai_core::{ChatCompletion, MedicError, TesseractOcr};
    use tower::ServiceExt;

    const BOUNDARY: &str = "medicai-test-boundary";

    struct TestApp {
        router: Router,
        store: Arc<InMemorySessionStore>,
        client: Arc<MockLlmClient>,
        _uploads: tempfile::TempDir,
    }

    fn test_app(client: MockLlmClient) -> TestApp {
        let uploads = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(client);
        let state = AppState::new(
            store.clone(),
            client.clone(),
            DocumentExtractor::new(Arc::new(TesseractOcr::default())),
            LlmConfig::builder("sk-test").build(),
            ServiceConfig::with_upload_dir(uploads.path()),
        );

        TestApp {
            router: create_app(state),
            store,
            client,
            _uploads: uploads,
        }
    }

    fn multipart_request(field: &str, files: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (filename, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn upload_notes(app: &TestApp) -> String {
        let (status, body) = send(
            &app.router,
            multipart_request("files[]", &[("notes.txt", "Shortness of breath on exertion")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn root_reports_running() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        let (status, body) = send(&app.router, get_request("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn upload_creates_session_with_stored_files() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        let (status, body) = send(
            &app.router,
            multipart_request("files[]", &[("a.txt", "one"), ("../b.TXT", "two")]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "2 files uploaded successfully");

        let session_id = body["session_id"].as_str().unwrap();
        let record = app.store.get(session_id).await.unwrap().unwrap();
        assert_eq!(record.file_paths.len(), 2);
        assert!(record.file_paths[1].ends_with("b.TXT"));
        assert_eq!(std::fs::read_to_string(&record.file_paths[0]).unwrap(), "one");
    }

    #[tokio::test]
    async fn duplicate_names_never_overwrite_each_other() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        let (status, body) = send(
            &app.router,
            multipart_request(
                "files[]",
                &[("a.txt", "one"), ("2_a.txt", "two"), ("a.txt", "three"), ("a.txt", "four")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let session_id = body["session_id"].as_str().unwrap();
        let record = app.store.get(session_id).await.unwrap().unwrap();
        let contents: Vec<String> = record
            .file_paths
            .iter()
            .map(|path| std::fs::read_to_string(path).unwrap())
            .collect();
        assert_eq!(contents, ["one", "two", "three", "four"]);
    }

    #[tokio::test]
    async fn upload_rejects_disallowed_types() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        let (status, body) = send(
            &app.router,
            multipart_request("files[]", &[("ok.txt", "fine"), ("run.exe", "MZ")]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File type not allowed: run.exe");
    }

    #[tokio::test]
    async fn upload_requires_a_files_part() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        let (status, body) =
            send(&app.router, multipart_request("attachment", &[("a.txt", "x")])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No files part");
    }

    #[tokio::test]
    async fn upload_requires_a_file_name() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        let (status, body) = send(&app.router, multipart_request("files[]", &[("", "x")])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No selected files");
    }

    #[tokio::test]
    async fn summary_is_computed_once_then_cached() {
        let app = test_app(MockLlmClient::with_reply(
            "```json\n{\"subjective\": \"dyspnoea\", \"objective\": \"\", \"assessment\": \"\", \"plan\": \"echo\"}\n```",
        ));
        let session_id = upload_notes(&app).await;
        let uri = format!("/api/patient-summary?session_id={session_id}");

        let (status, first) = send(&app.router, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "success");
        assert_eq!(first["summary"]["plan"], "echo");

        let (_, second) = send(&app.router, get_request(&uri)).await;
        assert_eq!(first, second);
        assert_eq!(app.client.requests().len(), 1);
    }

    #[tokio::test]
    async fn diagnosis_degrades_on_transport_failure() {
        let app = test_app(MockLlmClient::with_error(MedicError::LlmApi {
            status: 500,
            message: "internal server error".into(),
        }));
        let session_id = upload_notes(&app).await;

        let (status, body) = send(
            &app.router,
            get_request(&format!("/api/diagnosis?session_id={session_id}")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let diagnoses = body["diagnosis"]["diagnoses"].as_array().unwrap();
        assert_eq!(diagnoses.len(), 1);
        assert_eq!(diagnoses[0]["confidence"], "NA");
        assert!(
            diagnoses[0]["explanation"]
                .as_str()
                .unwrap()
                .contains("internal server error")
        );
    }

    #[tokio::test]
    async fn fallback_is_not_cached_so_the_next_request_retries() {
        let app = test_app(MockLlmClient::new(vec![
            Err(MedicError::LlmApi {
                status: 503,
                message: "service unavailable".into(),
            }),
            Ok(ChatCompletion::from_reply(
                r#"{"diagnoses": [{"name": "Asthma", "explanation": "wheeze", "confidence": "Medium", "next_steps": ["spirometry"]}]}"#,
            )),
        ]));
        let session_id = upload_notes(&app).await;
        let uri = format!("/api/diagnosis?session_id={session_id}");

        let (_, first) = send(&app.router, get_request(&uri)).await;
        assert_eq!(first["diagnosis"]["diagnoses"][0]["name"], "API Error");
        let record = app.store.get(&session_id).await.unwrap().unwrap();
        assert!(record.diagnosis.is_none());

        let (status, second) = send(&app.router, get_request(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["diagnosis"]["diagnoses"][0]["name"], "Asthma");
        assert_eq!(app.client.requests().len(), 2);

        let (_, third) = send(&app.router, get_request(&uri)).await;
        assert_eq!(third, second);
        assert_eq!(app.client.requests().len(), 2);
    }

    #[tokio::test]
    async fn configuration_error_is_a_server_error() {
        let app = test_app(MockLlmClient::with_error(MedicError::Config(
            "OPENAI_API_KEY missing".into(),
        )));
        let session_id = upload_notes(&app).await;

        let (status, body) = send(
            &app.router,
            get_request(&format!("/api/patient-summary?session_id={session_id}")),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn session_lookup_errors() {
        let app = test_app(MockLlmClient::new(Vec::new()));
        app.store
            .save(SessionRecord::new("empty".into(), Vec::new()))
            .await
            .unwrap();

        let cases = [
            ("/api/patient-summary", "No session ID provided"),
            ("/api/diagnosis?session_id=unknown", "Invalid session ID or session expired"),
            ("/api/diagnosis?session_id=empty", "No files found for this session"),
        ];
        for (uri, expected) in cases {
            let (status, body) = send(&app.router, get_request(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], expected, "{uri}");
        }
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/passwd.txt"), "passwd.txt");
        assert_eq!(sanitize_filename("C:\\scans\\chest x-ray.png"), "chest_x-ray.png");
        assert_eq!(sanitize_filename(".hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("..."), "upload");
    }
}

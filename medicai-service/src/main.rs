use medicai_core::{DocumentExtractor, LlmConfig, OcrConfig, OpenAiClient};
use medicai_service::{AppState, FileSessionStore, ServiceConfig, create_app, init_tracing};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // A missing API key is fatal: nothing useful can be served without it
    let llm_config = match LlmConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let client = OpenAiClient::new(&llm_config)?;

    let config = ServiceConfig::from_env();
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!(?llm_config, upload_dir = %config.upload_dir.display(), "Configuration loaded");

    let state = AppState::new(
        Arc::new(FileSessionStore::new(&config.upload_dir)),
        Arc::new(client),
        DocumentExtractor::with_tesseract(&OcrConfig::from_env()),
        llm_config,
        config.clone(),
    );
    let app = create_app(state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("MedicAI Assistant API starting on {}", addr);
    info!("Upload endpoint: POST http://{}/api/upload", addr);
    info!("Summary endpoint: GET http://{}/api/patient-summary?session_id=...", addr);
    info!("Diagnosis endpoint: GET http://{}/api/diagnosis?session_id=...", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

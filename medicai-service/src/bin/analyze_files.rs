use anyhow::Result;
use medicai_core::{DocumentExtractor, LlmConfig, MedicalAssistant, OcrConfig, OpenAiClient};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(String::as_str);
    if args.len() < 3 || !matches!(mode, Some("summary" | "diagnosis" | "both")) {
        eprintln!("Usage: {} <summary|diagnosis|both> <file>...", args[0]);
        eprintln!("Example: {} both labs.pdf referral.docx", args[0]);
        std::process::exit(1);
    }

    let config = match LlmConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Example: export OPENAI_API_KEY='your_key_here'");
            std::process::exit(1);
        }
    };

    let client = OpenAiClient::new(&config)?;
    let assistant = MedicalAssistant::new(
        Arc::new(client),
        DocumentExtractor::with_tesseract(&OcrConfig::from_env()),
        config,
    );
    let paths: Vec<PathBuf> = args[2..].iter().map(PathBuf::from).collect();

    println!("Analyzing {} files", paths.len());
    println!();

    if matches!(mode, Some("summary" | "both")) {
        let summary = assistant.patient_summary(&paths).await?;
        println!("SOAP Summary:");
        println!("─────────────");
        println!("{}", serde_json::to_string_pretty(&summary.to_value())?);
        println!();
    }

    if matches!(mode, Some("diagnosis" | "both")) {
        let diagnosis = assistant.preliminary_diagnosis(&paths).await?;
        println!("Preliminary Diagnoses:");
        println!("──────────────────────");
        println!("{}", serde_json::to_string_pretty(&diagnosis.to_value())?);
        println!();
    }

    Ok(())
}

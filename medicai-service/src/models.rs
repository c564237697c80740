use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct AnalysisQuery {
    pub session_id: Option<String>,
    /// Recompute even when a cached result exists.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub status: String,
    pub summary: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    pub status: String,
    pub diagnosis: Value,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// The files belonging to one upload, plus any results already computed for
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub file_paths: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Value>,
}

impl SessionRecord {
    pub fn new(id: String, file_paths: Vec<PathBuf>) -> Self {
        Self {
            id,
            file_paths,
            created_at: Utc::now(),
            summary: None,
            diagnosis: None,
        }
    }
}

pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Trait for storing and retrieving upload sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: SessionRecord) -> SessionResult<()>;
    async fn get(&self, id: &str) -> SessionResult<Option<SessionRecord>>;
    async fn delete(&self, id: &str) -> SessionResult<()>;
}

/// In-memory implementation of SessionStore
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, record: SessionRecord) -> SessionResult<()> {
        self.sessions.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> SessionResult<Option<SessionRecord>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// Keeps each session as `<id>.json` inside a directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Session ids come from clients, so anything that is not a plain token
    /// never maps to a path.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, record: SessionRecord) -> SessionResult<()> {
        let Some(path) = self.path_for(&record.id) else {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid session id: {}", record.id),
            )));
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> SessionResult<Option<SessionRecord>> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(session_id = id, error = %e, "Corrupt session file");
                Ok(None)
            }
        }
    }

    async fn delete(&self, id: &str) -> SessionResult<()> {
        let Some(path) = self.path_for(id) else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

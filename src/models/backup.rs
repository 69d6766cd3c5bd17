use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BackupResult {
    pub success: bool,
    pub message: String,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub message: String,
}

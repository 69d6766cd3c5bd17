use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlQueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SqlExecutionResult {
    pub success: bool,
    pub is_read_only: bool,
    pub execution_time: f64,
    pub row_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<serde_json::Value>>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SqlHistoryEntry {
    pub id: Uuid,
    pub query: String,
    pub is_read_only: bool,
    pub execution_time: f64,
    pub row_count: i64,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SqlSnippet {
    pub id: Uuid,
    pub name: String,
    pub sql_code: String,
    pub description: Option<String>,
    pub is_shared: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlSnippetCreate {
    pub name: String,
    pub sql_code: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
}

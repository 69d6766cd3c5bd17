use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Deployed,
    Failed,
    Undeployed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FunctionRecord {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub timeout_seconds: i32,
    pub owner_id: Uuid,
    pub is_active: bool,
    pub deployment_status: DeploymentStatus,
    pub deployment_error: Option<String>,
    pub version: i32,
    pub env_vars: serde_json::Value,
    pub count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_ms: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionCreate {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: i32,
    #[serde(default)]
    pub env_vars: serde_json::Value,
}

fn default_timeout() -> i32 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionUpdate {
    pub code: Option<String>,
    pub description: Option<String>,
    pub timeout_seconds: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvVarsUpdate {
    pub env_vars: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FunctionExecution {
    pub id: Uuid,
    pub function_id: Uuid,
    pub execution_id: String,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub execution_time_ms: i64,
    pub trigger_type: String,
    pub delivery_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FunctionLog {
    pub id: Uuid,
    pub function_id: Uuid,
    pub execution_id: String,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Strict-typed execution-result callback body from the external function
/// runtime. `success` and `execution_time_ms` reject loose coercions
/// (`0`/`1` for bool, numeric strings) by virtue of serde_json's default
/// deserialization of `bool`/`f64` — a JSON `0` will not deserialize into
/// `bool`, matching the source's `StrictBool`/`StrictFloat` enforcement.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionResultCallback {
    pub execution_id: String,
    pub function_name: String,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub logs: Vec<String>,
    pub execution_time_ms: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub delivery_id: Option<Uuid>,
}

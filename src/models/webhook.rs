use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Received,
    Queued,
    Executing,
    Completed,
    Failed,
    RetryPending,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Webhook {
    pub id: Uuid,
    pub function_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub webhook_token: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub is_active: bool,
    pub total_deliveries: i64,
    pub retry_attempts: i32,
    pub retry_delay_seconds: i32,
    pub rate_limit_per_minute: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookCreate {
    pub function_id: Uuid,
    pub name: String,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: i32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: i32,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i32,
}

fn default_retry_attempts() -> i32 {
    3
}
fn default_retry_delay() -> i32 {
    60
}
fn default_rate_limit() -> i32 {
    60
}

/// Returned once, at creation time, alongside the persisted `Webhook` (whose
/// `webhook_token`/`secret_key` are never serialized again afterward).
#[derive(Debug, Serialize)]
pub struct WebhookCreated {
    #[serde(flatten)]
    pub webhook: Webhook,
    pub webhook_token: String,
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub retry_attempts: Option<i32>,
    pub retry_delay_seconds: Option<i32>,
    pub rate_limit_per_minute: Option<i32>,
}

/// Returned from `/regenerate-token`, the one other place a caller needs to
/// see the freshly issued token value.
#[derive(Debug, Serialize)]
pub struct WebhookTokenRegenerated {
    #[serde(flatten)]
    pub webhook: Webhook,
    pub webhook_token: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub function_id: Uuid,
    pub request_headers: serde_json::Value,
    pub request_body: serde_json::Value,
    pub signature_valid: Option<bool>,
    pub status: DeliveryStatus,
    pub delivery_attempt: i32,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status_code: Option<i32>,
    pub response_body: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct WebhookTriggerResponse {
    pub accepted: bool,
    pub delivery_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

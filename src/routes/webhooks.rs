use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::extractors::AdminUser;
use crate::error::{AppError, AppResult};
use crate::functions_client::FunctionsClient;
use crate::models::webhook::{
    Webhook, WebhookCreate, WebhookCreated, WebhookDelivery, WebhookTokenRegenerated, WebhookUpdate,
};
use crate::pagination::parse_pagination;
use crate::state::AppState;
use crate::validation::{
    is_valid_webhook_token_shape, strict_query_params, validate_rate_limit_per_minute,
    validate_retry_attempts, validate_retry_delay_seconds,
};

type HmacSha256 = Hmac<Sha256>;

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Verifies an `X-Webhook-Signature: sha256=<hex>` header against the raw
/// request body. Returns `None` when no signature header was sent at all
/// (the caller records this as `signature_valid = NULL`, distinct from a
/// signature that was sent and failed).
fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Option<bool> {
    let provided = header?.strip_prefix("sha256=").unwrap_or(header?);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    Some(expected.eq_ignore_ascii_case(provided))
}

async fn fetch_webhook(pool: &sqlx::PgPool, id: Uuid) -> AppResult<Webhook> {
    sqlx::query_as("SELECT * FROM webhooks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("webhook not found".into()))
}

async fn fetch_delivery(pool: &sqlx::PgPool, id: Uuid) -> AppResult<WebhookDelivery> {
    sqlx::query_as("SELECT * FROM webhook_deliveries WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("delivery not found".into()))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["limit", "offset"])?;
    let pagination = parse_pagination(
        params.get("offset").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhooks").fetch_one(&state.pool).await?;
    let rows: Vec<Webhook> = sqlx::query_as("SELECT * FROM webhooks ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(pagination.limit)
        .bind(pagination.skip)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({
        "webhooks": rows,
        "total": total,
        "limit": pagination.limit,
        "offset": pagination.skip,
    })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Json(body): Json<WebhookCreate>,
) -> AppResult<(axum::http::StatusCode, Json<WebhookCreated>)> {
    validate_retry_attempts(body.retry_attempts)?;
    validate_retry_delay_seconds(body.retry_delay_seconds)?;
    validate_rate_limit_per_minute(body.rate_limit_per_minute)?;

    let webhook_token = random_token();
    let secret_key = random_token();
    let id = Uuid::new_v4();

    let webhook: Webhook = sqlx::query_as(
        "INSERT INTO webhooks (
            id, function_id, owner_id, name, webhook_token, secret_key, is_active,
            total_deliveries, retry_attempts, retry_delay_seconds, rate_limit_per_minute,
            created_at, updated_at
         ) VALUES ($1, $2, $3, $4, $5, $6, TRUE, 0, $7, $8, $9, now(), now())
         RETURNING *",
    )
    .bind(id)
    .bind(body.function_id)
    .bind(user.id)
    .bind(&body.name)
    .bind(&webhook_token)
    .bind(&secret_key)
    .bind(body.retry_attempts)
    .bind(body.retry_delay_seconds)
    .bind(body.rate_limit_per_minute)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::Conflict(format!("webhook with name '{}' already exists", body.name))
        }
        _ => AppError::from(e),
    })?;

    Ok((axum::http::StatusCode::CREATED, Json(WebhookCreated { webhook, webhook_token, secret_key })))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<Webhook>> {
    Ok(Json(fetch_webhook(&state.pool, id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
    Json(body): Json<WebhookUpdate>,
) -> AppResult<Json<Webhook>> {
    fetch_webhook(&state.pool, id).await?;
    if let Some(v) = body.retry_attempts {
        validate_retry_attempts(v)?;
    }
    if let Some(v) = body.retry_delay_seconds {
        validate_retry_delay_seconds(v)?;
    }
    if let Some(v) = body.rate_limit_per_minute {
        validate_rate_limit_per_minute(v)?;
    }

    let webhook: Webhook = sqlx::query_as(
        "UPDATE webhooks SET
            name = COALESCE($2, name),
            is_active = COALESCE($3, is_active),
            retry_attempts = COALESCE($4, retry_attempts),
            retry_delay_seconds = COALESCE($5, retry_delay_seconds),
            rate_limit_per_minute = COALESCE($6, rate_limit_per_minute),
            updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&body.name)
    .bind(body.is_active)
    .bind(body.retry_attempts)
    .bind(body.retry_delay_seconds)
    .bind(body.rate_limit_per_minute)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(webhook))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<axum::http::StatusCode> {
    fetch_webhook(&state.pool, id).await?;
    sqlx::query("DELETE FROM webhooks WHERE id = $1").bind(id).execute(&state.pool).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn regenerate_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<WebhookTokenRegenerated>> {
    fetch_webhook(&state.pool, id).await?;
    let webhook_token = random_token();

    let webhook: Webhook = sqlx::query_as(
        "UPDATE webhooks SET webhook_token = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&webhook_token)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(WebhookTokenRegenerated { webhook, webhook_token }))
}

/// Invokes the webhook's linked function and writes the outcome back onto
/// the delivery row. Never propagates a runtime-invocation failure as an
/// error response to the caller who issued the retry/trigger — it is
/// recorded as `status = failed` on the delivery instead.
async fn dispatch(state: &Arc<AppState>, delivery_id: Uuid, function_id: Uuid, payload: &serde_json::Value) {
    let function_name: Option<String> = sqlx::query_scalar("SELECT name FROM functions WHERE id = $1")
        .bind(function_id)
        .fetch_optional(&state.pool)
        .await
        .ok()
        .flatten();

    let Some(name) = function_name else {
        let _ = sqlx::query(
            "UPDATE webhook_deliveries SET status = 'failed', error_message = 'function not found', completed_at = now() WHERE id = $1",
        )
        .bind(delivery_id)
        .execute(&state.pool)
        .await;
        return;
    };

    let client = FunctionsClient::new(&state.http_client, &state.config);
    match client.invoke(&name, payload, delivery_id).await {
        Ok((status, body)) => {
            let delivery_status = if status < 400 { "completed" } else { "failed" };
            let _ = sqlx::query(
                "UPDATE webhook_deliveries SET
                    status = $2, response_status_code = $3, response_body = $4, completed_at = now()
                 WHERE id = $1",
            )
            .bind(delivery_id)
            .bind(delivery_status)
            .bind(status as i32)
            .bind(&body)
            .execute(&state.pool)
            .await;
        }
        Err(message) => {
            let _ = sqlx::query(
                "UPDATE webhook_deliveries SET status = 'failed', error_message = $2, completed_at = now() WHERE id = $1",
            )
            .bind(delivery_id)
            .bind(&message)
            .execute(&state.pool)
            .await;
        }
    }
}

/// Public endpoint: authenticated by the token in the path alone, bypassing
/// the API-key and bearer-token admission steps entirely.
pub async fn trigger(
    State(state): State<Arc<AppState>>,
    Path(webhook_token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<axum::response::Response> {
    if !is_valid_webhook_token_shape(&webhook_token) {
        return Err(AppError::NotFound("webhook not found or inactive".into()));
    }

    let webhook: Option<Webhook> = sqlx::query_as("SELECT * FROM webhooks WHERE webhook_token = $1 AND is_active = TRUE")
        .bind(&webhook_token)
        .fetch_optional(&state.pool)
        .await?;
    let Some(webhook) = webhook else {
        return Err(AppError::NotFound("webhook not found or inactive".into()));
    };

    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::json!({}));
    let signature_header = headers.get("x-webhook-signature").and_then(|v| v.to_str().ok());
    let signature_valid = verify_signature(&webhook.secret_key, &body, signature_header);

    let request_headers: serde_json::Value = headers
        .iter()
        .filter(|(name, _)| *name != "authorization" && *name != "x-api-key")
        .map(|(name, value)| {
            (name.to_string(), serde_json::Value::String(value.to_str().unwrap_or("").to_string()))
        })
        .collect::<serde_json::Map<_, _>>()
        .into();

    let delivery_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO webhook_deliveries (
            id, webhook_id, function_id, request_headers, request_body, signature_valid,
            status, delivery_attempt, retry_count, created_at
         ) VALUES ($1, $2, $3, $4, $5, $6, 'received', 1, 0, now())",
    )
    .bind(delivery_id)
    .bind(webhook.id)
    .bind(webhook.function_id)
    .bind(&request_headers)
    .bind(&payload)
    .bind(signature_valid)
    .execute(&state.pool)
    .await?;

    sqlx::query("UPDATE webhooks SET total_deliveries = total_deliveries + 1, updated_at = now() WHERE id = $1")
        .bind(webhook.id)
        .execute(&state.pool)
        .await?;

    dispatch(&state, delivery_id, webhook.function_id, &payload).await;

    let response = serde_json::json!({ "accepted": true, "delivery_id": delivery_id });
    Ok((axum::http::StatusCode::ACCEPTED, Json(response)).into_response())
}

pub async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["limit", "offset"])?;
    fetch_webhook(&state.pool, id).await?;
    let pagination = parse_pagination(
        params.get("offset").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_deliveries WHERE webhook_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    let rows: Vec<WebhookDelivery> = sqlx::query_as(
        "SELECT * FROM webhook_deliveries WHERE webhook_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(id)
    .bind(pagination.limit)
    .bind(pagination.skip)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({
        "deliveries": rows,
        "total": total,
        "limit": pagination.limit,
        "offset": pagination.skip,
    })))
}

pub async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<WebhookDelivery>> {
    Ok(Json(fetch_delivery(&state.pool, id).await?))
}

pub async fn retry_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<WebhookDelivery>> {
    let delivery = fetch_delivery(&state.pool, id).await?;

    sqlx::query(
        "UPDATE webhook_deliveries SET retry_count = retry_count + 1, delivery_attempt = delivery_attempt + 1 WHERE id = $1",
    )
    .bind(id)
    .execute(&state.pool)
    .await?;

    dispatch(&state, id, delivery.function_id, &delivery.request_body).await;

    Ok(Json(fetch_delivery(&state.pool, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_is_unique_and_url_safe() {
        let a = random_token();
        let b = random_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn verify_signature_returns_none_without_header() {
        assert_eq!(verify_signature("secret", b"payload", None), None);
    }

    #[test]
    fn verify_signature_accepts_matching_hmac_with_prefix() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert_eq!(verify_signature("secret", b"payload", Some(&header)), Some(true));
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert_eq!(verify_signature("wrong-secret", b"payload", Some(&header)), Some(false));
    }

    #[test]
    fn verify_signature_accepts_bare_hex_without_prefix() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        let digest = hex::encode(mac.finalize().into_bytes());
        assert_eq!(verify_signature("secret", b"payload", Some(&digest)), Some(true));
    }
}

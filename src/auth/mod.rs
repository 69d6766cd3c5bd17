pub mod extractors;

use crate::config::Config;
use crate::error::AppError;
use crate::models::token::Claims;
use crate::models::user::UserInDb;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

pub use extractors::{AdminUser, CurrentUser, OptionalCurrentUser};

/// Hashes a password off the request-handling task. bcrypt's cost-10 hash
/// takes on the order of 50-100ms; running it inline would stall the
/// scheduler for every other in-flight request. `spawn_blocking` is this
/// runtime's equivalent of the source's dedicated `ThreadPoolExecutor`.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, 10).map_err(|e| AppError::Internal(e.to_string()))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn create_access_token(config: &Config, user_id: Uuid, role: &str) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::minutes(config.access_token_expire_minutes)).timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp,
    };
    encode(
        &Header::new(config.algorithm),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

fn decode_claims(config: &Config, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret_key.as_bytes()),
        &Validation::new(config.algorithm),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::InvalidOrExpiredToken)
}

/// Resolves a bearer token to the active user it names, or rejects with
/// `InvalidOrExpiredToken`/`InactiveUser`. Shared by the required-auth and
/// optional-auth extractors so the two never drift.
pub async fn resolve_bearer_token(
    pool: &PgPool,
    config: &Config,
    token: &str,
) -> Result<UserInDb, AppError> {
    let claims = decode_claims(config, token)?;
    let user_id: Uuid = claims.sub.parse().map_err(|_| AppError::InvalidOrExpiredToken)?;

    let user: Option<UserInDb> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    let user = user.ok_or(AppError::InvalidOrExpiredToken)?;
    if !user.is_active {
        return Err(AppError::InactiveUser);
    }
    Ok(user)
}

/// Separate, non-raising entry point for WebSocket handshakes, which can't
/// reliably carry an `Authorization` header — the token arrives as a query
/// parameter instead. Returns `(user_id, role)` when the token is present
/// and valid; never errors, so the caller decides whether anonymous access
/// is acceptable for that socket.
pub async fn resolve_ws_token(
    pool: &PgPool,
    config: &Config,
    token: Option<&str>,
) -> Option<(Uuid, String)> {
    let token = token?;
    let user = resolve_bearer_token(pool, config, token).await.ok()?;
    Some((user.id, format!("{:?}", user.role).to_uppercase()))
}

const REFRESH_TOKEN_BYTES: usize = 32;

fn generate_refresh_token() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn create_refresh_token(pool: &PgPool, config: &Config, user_id: Uuid) -> Result<String, AppError> {
    let raw = generate_refresh_token();
    let token_hash = hash_token(&raw);
    let expires_at = Utc::now() + Duration::days(config.refresh_token_expire_days);

    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
         VALUES ($1, $2, $3, $4, now())",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(raw)
}

pub async fn validate_refresh_token(pool: &PgPool, raw: &str) -> Option<Uuid> {
    let token_hash = hash_token(raw);
    sqlx::query_scalar(
        "SELECT user_id FROM refresh_tokens
         WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > now()",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .ok()
    .flatten()
}

/// Rotates a refresh token: revokes the old row *iff it is currently
/// unrevoked* and creates a new one, all atomically via a single
/// `UPDATE ... WHERE revoked_at IS NULL RETURNING id`. If that update
/// affects zero rows, the token had already been revoked by an earlier
/// rotation — a reuse attempt — and every live token for the user is
/// revoked in response. This is the race-free primitive the concurrency
/// model relies on: two concurrent refreshes of the same token can only
/// ever have one of them observe a row to update.
pub async fn rotate_refresh_token(
    pool: &PgPool,
    config: &Config,
    raw: &str,
    user_id: Uuid,
) -> Result<Option<String>, AppError> {
    let token_hash = hash_token(raw);

    let revoked_id: Option<Uuid> = sqlx::query_scalar(
        "UPDATE refresh_tokens SET revoked_at = now()
         WHERE token_hash = $1 AND revoked_at IS NULL
         RETURNING id",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    if revoked_id.is_none() {
        revoke_all_user_tokens(pool, user_id).await?;
        return Ok(None);
    }

    let new_raw = create_refresh_token(pool, config, user_id).await?;
    Ok(Some(new_raw))
}

pub async fn revoke_refresh_token(pool: &PgPool, raw: &str) -> Result<(), AppError> {
    let token_hash = hash_token(raw);
    sqlx::query("UPDATE refresh_tokens SET revoked_at = now() WHERE token_hash = $1 AND revoked_at IS NULL")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn revoke_all_user_tokens(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE refresh_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

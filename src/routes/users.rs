use axum::extract::{Path, Query, State};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::extractors::{AdminUser, CurrentUser};
use crate::error::{AppError, AppResult};
use crate::models::token::{LogoutRequest, LogoutResponse, RefreshRequest, TokenPair};
use crate::models::user::{LoginRequest, Role, UserCreate, UserInDb, UserRead, UserUpdate};
use crate::pagination::{parse_pagination, parse_sort_by, parse_sort_order};
use crate::state::AppState;
use crate::validation::{strict_query_params, validate_search_term};

const SORTABLE: &[&str] = &["email", "first_name", "last_name", "created_at", "role"];

pub async fn count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    CurrentUser(_): CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["search"])?;
    let search = validate_search_term(params.get("search").cloned())?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users
         WHERE $1::text IS NULL OR email ILIKE '%' || $1 || '%'
            OR first_name ILIKE '%' || $1 || '%' OR last_name ILIKE '%' || $1 || '%'",
    )
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({ "count": total })))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    CurrentUser(_): CurrentUser,
) -> AppResult<Json<Vec<UserRead>>> {
    strict_query_params(&params, &["skip", "limit", "search", "sort_by", "sort_order"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let pagination = parse_pagination(
        params.get("skip").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;
    let sort_by = parse_sort_by(params.get("sort_by").map(|s| s.as_str()), SORTABLE, "created_at")?;
    let sort_order = parse_sort_order(params.get("sort_order").map(|s| s.as_str()))?;

    let sql = format!(
        "SELECT * FROM users
         WHERE $1::text IS NULL OR email ILIKE '%' || $1 || '%'
            OR first_name ILIKE '%' || $1 || '%' OR last_name ILIKE '%' || $1 || '%'
         ORDER BY {sort_by} {} NULLS LAST
         OFFSET $2 LIMIT $3",
        sort_order.as_sql()
    );

    let rows: Vec<UserInDb> = sqlx::query_as(&sql)
        .bind(&search)
        .bind(pagination.skip)
        .bind(pagination.limit)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows.into_iter().map(UserRead::from).collect()))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserRead> {
    Json(user.into())
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(_): CurrentUser,
) -> AppResult<Json<UserRead>> {
    let user: UserInDb = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    Ok(Json(user.into()))
}

/// Registration is idempotent: a second `POST` with an email that already
/// exists returns the existing row with `2xx` only if the new body is
/// indistinguishable from the stored one (same names); any other body
/// collision on the unique `email` is a genuine `409`.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserCreate>,
) -> AppResult<(axum::http::StatusCode, Json<UserRead>)> {
    let email = body.email.trim().to_lowercase();
    let password_hash = crate::auth::hash_password(body.password.clone()).await?;
    let id = Uuid::new_v4();

    let inserted: Option<UserInDb> = sqlx::query_as(
        "INSERT INTO users (id, email, password, first_name, last_name, role, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, 'USER', TRUE, now())
         ON CONFLICT (email) DO NOTHING
         RETURNING *",
    )
    .bind(id)
    .bind(&email)
    .bind(&password_hash)
    .bind(&body.first_name)
    .bind(&body.last_name)
    .fetch_optional(&state.pool)
    .await?;

    if let Some(user) = inserted {
        return Ok((axum::http::StatusCode::CREATED, Json(user.into())));
    }

    let existing: UserInDb = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(&state.pool)
        .await?;

    if existing.first_name == body.first_name && existing.last_name == body.last_name {
        Ok((axum::http::StatusCode::OK, Json(existing.into())))
    } else {
        Err(AppError::Conflict("a user with this email already exists".into()))
    }
}

/// Login is deliberately opaque: an unknown email and a known email with
/// the wrong password both produce `InvalidCredentials` with the exact
/// same message, so a caller cannot enumerate registered accounts.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let email = body.email.trim().to_lowercase();
    let user: Option<UserInDb> = sqlx::query_as("SELECT * FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let user = user.ok_or(AppError::InvalidCredentials)?;
    if !crate::auth::verify_password(body.password, user.password.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AppError::InactiveUser);
    }

    let access_token = crate::auth::create_access_token(&state.config, user.id, role_str(user.role))?;
    let refresh_token = crate::auth::create_refresh_token(&state.pool, &state.config, user.id).await?;

    // First-login bootstrap: flips the one-way latch that gates the
    // restore endpoint. Idempotent — a no-op on every subsequent login.
    sqlx::query("UPDATE system_config SET initialized = TRUE WHERE initialized = FALSE")
        .execute(&state.pool)
        .await?;

    Ok(Json(TokenPair {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
        expires_in: state.config.access_token_expire_minutes * 60,
    }))
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "USER",
        Role::Admin => "ADMIN",
    }
}

/// Refreshes an access/refresh pair. Reuse of an already-rotated refresh
/// token cascades a revoke of every live token the user holds and returns
/// `401` — see `auth::rotate_refresh_token` for the race-free primitive.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let user_id = crate::auth::validate_refresh_token(&state.pool, &body.refresh_token)
        .await
        .ok_or(AppError::InvalidOrExpiredToken)?;

    let new_refresh = crate::auth::rotate_refresh_token(&state.pool, &state.config, &body.refresh_token, user_id)
        .await?
        .ok_or(AppError::TokenReuse)?;

    let user: UserInDb = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;

    let access_token = crate::auth::create_access_token(&state.config, user.id, role_str(user.role))?;

    Ok(Json(TokenPair {
        access_token,
        refresh_token: new_refresh,
        token_type: "bearer".to_string(),
        expires_in: state.config.access_token_expire_minutes * 60,
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<Json<LogoutResponse>> {
    match body.and_then(|Json(b)| b.refresh_token) {
        Some(token) => crate::auth::revoke_refresh_token(&state.pool, &token).await?,
        None => crate::auth::revoke_all_user_tokens(&state.pool, user.id).await?,
    }
    Ok(Json(LogoutResponse { status: "ok" }))
}

pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<LogoutResponse>> {
    crate::auth::revoke_all_user_tokens(&state.pool, user.id).await?;
    Ok(Json(LogoutResponse { status: "ok" }))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_): AdminUser,
    Json(body): Json<UserUpdate>,
) -> AppResult<Json<UserRead>> {
    let role = body.role.map(role_str);
    let updated: Option<UserInDb> = sqlx::query_as(
        "UPDATE users SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            is_active = COALESCE($5, is_active),
            role = COALESCE($6, role)
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(body.email.map(|e| e.trim().to_lowercase()))
    .bind(body.first_name)
    .bind(body.last_name)
    .bind(body.is_active)
    .bind(role)
    .fetch_optional(&state.pool)
    .await?;

    let updated = updated.ok_or_else(|| AppError::NotFound("user not found".into()))?;
    Ok(Json(updated.into()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_): AdminUser,
) -> AppResult<axum::http::StatusCode> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&state.pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("user not found".into()));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

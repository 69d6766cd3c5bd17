use axum::extract::{Path, Query, State};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::extractors::AdminUser;
use crate::error::{AppError, AppResult};
use crate::functions_client::FunctionsClient;
use crate::models::function::{
    EnvVarsUpdate, ExecutionResultCallback, FunctionCreate, FunctionExecution, FunctionLog,
    FunctionRecord, FunctionUpdate,
};
use crate::pagination::{parse_pagination, parse_sort_by, parse_sort_order};
use crate::state::AppState;
use crate::validation::{strict_query_params, validate_search_term, validate_timeout_seconds};

const SORTABLE: &[&str] = &["created_at", "updated_at", "name", "last_executed_at", "count"];

async fn fetch_function(pool: &sqlx::PgPool, id: Uuid) -> AppResult<FunctionRecord> {
    sqlx::query_as("SELECT * FROM functions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("function not found".into()))
}

pub async fn count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["search"])?;
    let search = validate_search_term(params.get("search").cloned())?;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM functions
         WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%'",
    )
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["limit", "offset", "search", "sort_by", "sort_order"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let pagination = parse_pagination(
        params.get("offset").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;
    let sort_by = parse_sort_by(params.get("sort_by").map(|s| s.as_str()), SORTABLE, "created_at")?;
    let sort_order = match params.get("sort_order").map(|s| s.as_str()) {
        None => crate::pagination::SortOrder::Desc,
        Some(other) => parse_sort_order(Some(other))?,
    };

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM functions
         WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%'",
    )
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    let sql = format!(
        "SELECT * FROM functions
         WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%' OR description ILIKE '%' || $1 || '%'
         ORDER BY {sort_by} {} NULLS LAST
         LIMIT $2 OFFSET $3",
        sort_order.as_sql()
    );
    let rows: Vec<FunctionRecord> = sqlx::query_as(&sql)
        .bind(&search)
        .bind(pagination.limit)
        .bind(pagination.skip)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({
        "functions": rows,
        "total": total,
        "limit": pagination.limit,
        "offset": pagination.skip,
    })))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Json(body): Json<FunctionCreate>,
) -> AppResult<(axum::http::StatusCode, Json<FunctionRecord>)> {
    validate_timeout_seconds(body.timeout_seconds)?;
    let env_vars = if body.env_vars.is_null() { serde_json::json!({}) } else { body.env_vars };

    let record: FunctionRecord = sqlx::query_as(
        "INSERT INTO functions (
            id, name, code, description, timeout_seconds, env_vars, owner_id,
            is_active, deployment_status, version, count, success_count, error_count,
            avg_ms, created_at, updated_at
         ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, TRUE, 'pending', 1, 0, 0, 0, 0, now(), now()
         ) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&body.name)
    .bind(&body.code)
    .bind(&body.description)
    .bind(body.timeout_seconds)
    .bind(&env_vars)
    .bind(user.id)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.constraint().is_some() && db.code().as_deref() == Some("23505") => {
            AppError::Conflict(format!("function with name '{}' already exists", body.name))
        }
        _ => AppError::from(e),
    })?;

    Ok((axum::http::StatusCode::CREATED, Json(record)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<FunctionRecord>> {
    Ok(Json(fetch_function(&state.pool, id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
    Json(body): Json<FunctionUpdate>,
) -> AppResult<Json<FunctionRecord>> {
    fetch_function(&state.pool, id).await?;
    if let Some(timeout) = body.timeout_seconds {
        validate_timeout_seconds(timeout)?;
    }

    let code_changed = body.code.is_some();
    let record: FunctionRecord = sqlx::query_as(
        "UPDATE functions SET
            code = COALESCE($2, code),
            description = COALESCE($3, description),
            timeout_seconds = COALESCE($4, timeout_seconds),
            is_active = COALESCE($5, is_active),
            version = CASE WHEN $6 THEN version + 1 ELSE version END,
            deployment_status = CASE WHEN $6 THEN 'pending' ELSE deployment_status END,
            updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&body.code)
    .bind(&body.description)
    .bind(body.timeout_seconds)
    .bind(body.is_active)
    .bind(code_changed)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(record))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<axum::http::StatusCode> {
    let function = fetch_function(&state.pool, id).await?;

    let client = FunctionsClient::new(&state.http_client, &state.config);
    client.undeploy(&function.name).await;

    sqlx::query("DELETE FROM functions WHERE id = $1").bind(id).execute(&state.pool).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn deploy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<FunctionRecord>> {
    let function = fetch_function(&state.pool, id).await?;

    let client = FunctionsClient::new(&state.http_client, &state.config);
    let result = client.deploy(&function.name, &function.code, &function.env_vars).await;

    if result.get("success").and_then(|v| v.as_bool()).unwrap_or(false) {
        sqlx::query(
            "UPDATE functions SET deployment_status = 'deployed', deployment_error = NULL,
             last_deployed_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&state.pool)
        .await?;
    } else {
        let message = result.get("message").and_then(|v| v.as_str()).unwrap_or("Unknown error");
        sqlx::query(
            "UPDATE functions SET deployment_status = 'failed', deployment_error = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&state.pool)
        .await?;
    }

    Ok(Json(fetch_function(&state.pool, id).await?))
}

pub async fn update_env_vars(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(_user): AdminUser,
    Json(body): Json<EnvVarsUpdate>,
) -> AppResult<Json<FunctionRecord>> {
    fetch_function(&state.pool, id).await?;
    sqlx::query("UPDATE functions SET env_vars = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(&body.env_vars)
        .execute(&state.pool)
        .await?;
    Ok(Json(fetch_function(&state.pool, id).await?))
}

fn log_level_of(line: &str) -> &'static str {
    if line.starts_with("[ERROR]") {
        "error"
    } else if line.starts_with("[WARN]") {
        "warn"
    } else {
        "info"
    }
}

/// Internal callback hit by the Deno runtime after a function finishes
/// executing. Unknown function names are swallowed (`received: true` with a
/// warning) rather than rejected, since the runtime has no way to retry a
/// 404 meaningfully.
pub async fn execution_result(
    State(state): State<Arc<AppState>>,
    Path(function_name): Path<String>,
    Json(body): Json<ExecutionResultCallback>,
) -> AppResult<Json<serde_json::Value>> {
    if function_name.is_empty() || function_name.len() > 255 || !function_name.is_ascii() {
        return Err(AppError::NotFound("function not found".into()));
    }

    let row: Option<(Uuid, i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT id, count, success_count, error_count, avg_ms FROM functions WHERE name = $1",
    )
    .bind(&function_name)
    .fetch_optional(&state.pool)
    .await?;

    let Some((function_id, old_count, old_success, old_error, old_avg)) = row else {
        return Ok(Json(serde_json::json!({ "received": true, "warning": "Function not found" })));
    };

    let new_count = old_count + 1;
    let new_success = old_success + if body.success { 1 } else { 0 };
    let new_error = old_error + if body.success { 0 } else { 1 };
    let new_avg = if old_avg == 0 {
        body.execution_time_ms as i64
    } else {
        let total_time = old_avg * old_count;
        ((total_time as f64 + body.execution_time_ms) / new_count as f64) as i64
    };

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "UPDATE functions SET
            count = $2, success_count = $3, error_count = $4, avg_ms = $5, last_executed_at = now(), updated_at = now()
         WHERE id = $1",
    )
    .bind(function_id)
    .bind(new_count)
    .bind(new_success)
    .bind(new_error)
    .bind(new_avg)
    .execute(&mut *tx)
    .await?;

    let trigger_type = if body.delivery_id.is_some() { "webhook" } else { "http" };
    let execution: FunctionExecution = sqlx::query_as(
        "INSERT INTO function_executions (
            id, function_id, execution_id, success, result, execution_time_ms, trigger_type, delivery_id, created_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(function_id)
    .bind(&body.execution_id)
    .bind(body.success)
    .bind(&body.result)
    .bind(body.execution_time_ms as i64)
    .bind(trigger_type)
    .bind(body.delivery_id)
    .fetch_one(&mut *tx)
    .await?;

    for line in &body.logs {
        sqlx::query(
            "INSERT INTO function_logs (id, function_id, execution_id, level, message, created_at)
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(Uuid::new_v4())
        .bind(function_id)
        .bind(&body.execution_id)
        .bind(log_level_of(line))
        .bind(line)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({ "received": true, "execution_id": execution.id })))
}

pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["limit", "offset"])?;
    fetch_function(&state.pool, id).await?;
    let pagination = parse_pagination(
        params.get("offset").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM function_executions WHERE function_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;

    let rows: Vec<FunctionExecution> = sqlx::query_as(
        "SELECT * FROM function_executions WHERE function_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(id)
    .bind(pagination.limit)
    .bind(pagination.skip)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({
        "executions": rows,
        "total": total,
        "limit": pagination.limit,
        "offset": pagination.skip,
    })))
}

pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["limit", "offset", "level"])?;
    fetch_function(&state.pool, id).await?;
    let pagination = parse_pagination(
        params.get("offset").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        500,
    )?;
    let level = params.get("level").cloned();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM function_logs WHERE function_id = $1 AND ($2::text IS NULL OR level = $2)",
    )
    .bind(id)
    .bind(&level)
    .fetch_one(&state.pool)
    .await?;

    let rows: Vec<FunctionLog> = sqlx::query_as(
        "SELECT * FROM function_logs WHERE function_id = $1 AND ($2::text IS NULL OR level = $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(id)
    .bind(&level)
    .bind(pagination.limit)
    .bind(pagination.skip)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({
        "logs": rows,
        "total": total,
        "limit": pagination.limit,
        "offset": pagination.skip,
    })))
}

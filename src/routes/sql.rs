use axum::extract::{Path, Query, State};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::auth::extractors::AdminUser;
use crate::error::{AppError, AppResult};
use crate::models::sql::{SqlExecutionResult, SqlHistoryEntry, SqlQueryRequest, SqlSnippet, SqlSnippetCreate};
use crate::pagination::parse_pagination;
use crate::state::AppState;
use crate::tables_engine::sql_parser;

/// Runs an arbitrary SQL query against the database. The console is
/// admin-only: every statement runs with the same privileges as the
/// service's own pool, so ordinary users never reach this handler.
///
/// Read-only queries (`select`/`explain`/`show`/`describe`/`with`) run
/// directly. Anything else runs inside a transaction, and on success the
/// statement text is re-scanned for `CREATE TABLE`/`DROP TABLE` so the
/// `tables` registry stays reconciled with whatever DDL the console just
/// executed out-of-band of the normal table-registry endpoints.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Json(body): Json<SqlQueryRequest>,
) -> AppResult<Json<SqlExecutionResult>> {
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::ValidationFailure("query must not be empty".into()));
    }

    if let Some(reason) = sql_parser::validate_query_security(&query) {
        save_history(&state, user.id, &query, false, 0.0, 0, Some(&reason)).await;
        return Err(AppError::BadInput(reason));
    }

    let read_only = sql_parser::is_read_only_query(&query);
    let started = Instant::now();

    let result = if read_only {
        run_read_only(&state, &query).await
    } else {
        run_mutating(&state, &query).await
    };

    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok((row_count, columns, data)) => {
            save_history(&state, user.id, &query, read_only, elapsed, row_count, None).await;
            Ok(Json(SqlExecutionResult {
                success: true,
                is_read_only: read_only,
                execution_time: elapsed,
                row_count,
                columns,
                data,
                message: "query executed successfully".to_string(),
            }))
        }
        Err(e) => {
            let message = e.to_string();
            save_history(&state, user.id, &query, read_only, elapsed, 0, Some(&message)).await;
            Err(e)
        }
    }
}

async fn run_read_only(
    state: &AppState,
    query: &str,
) -> AppResult<(i64, Option<Vec<String>>, Option<Vec<serde_json::Value>>)> {
    let rows = sqlx::query(query).fetch_all(&state.pool).await?;
    let columns: Vec<String> = rows
        .first()
        .map(|r| {
            use sqlx::Column;
            r.columns().iter().map(|c| c.name().to_string()).collect()
        })
        .unwrap_or_default();
    let row_count = rows.len() as i64;
    let data: Vec<serde_json::Value> = rows.into_iter().map(crate::routes::tables::row_to_json).collect();
    Ok((row_count, Some(columns), Some(data)))
}

async fn run_mutating(state: &AppState, query: &str) -> AppResult<(i64, Option<Vec<String>>, Option<Vec<serde_json::Value>>)> {
    let statements = sql_parser::split_statements(query);
    let mut tx = state.pool.begin().await?;
    let mut row_count = 0i64;

    for stmt in &statements {
        let result = sqlx::query(stmt).execute(&mut *tx).await?;
        row_count += result.rows_affected() as i64;
    }

    let created = sql_parser::extract_create_tables(&statements);
    let dropped = sql_parser::extract_drop_tables(&statements);

    for (name, schema) in &created {
        if sql_parser::SYSTEM_TABLES.contains(&name.as_str()) {
            continue;
        }
        let schema_json = serde_json::to_value(schema).unwrap_or_default();
        sqlx::query(
            "INSERT INTO tables (id, name, table_schema, public, owner_id, description, metadata, row_count, realtime_enabled, created_at, updated_at)
             VALUES ($1, $2, $3, FALSE, $4, NULL, '{}'::jsonb, 0, FALSE, now(), now())
             ON CONFLICT (name) DO UPDATE SET table_schema = EXCLUDED.table_schema, updated_at = now()",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&schema_json)
        .bind(state_admin_id())
        .execute(&mut *tx)
        .await
        .ok();
    }

    for name in &dropped {
        if sql_parser::SYSTEM_TABLES.contains(&name.as_str()) {
            continue;
        }
        sqlx::query("DELETE FROM tables WHERE name = $1").bind(name).execute(&mut *tx).await.ok();
    }

    tx.commit().await?;
    Ok((row_count, None, None))
}

/// Reconciliation writes a placeholder owner for tables created by raw DDL,
/// since the console has no per-row owner concept. Using the nil UUID keeps
/// these rows visible only to admins in listings that check ownership.
fn state_admin_id() -> Uuid {
    Uuid::nil()
}

async fn save_history(
    state: &AppState,
    user_id: Uuid,
    query: &str,
    is_read_only: bool,
    execution_time: f64,
    row_count: i64,
    error: Option<&str>,
) {
    let _ = sqlx::query(
        "INSERT INTO sql_history (id, user_id, query, is_read_only, execution_time, row_count, error, executed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(query)
    .bind(is_read_only)
    .bind(execution_time)
    .bind(row_count)
    .bind(error)
    .execute(&state.pool)
    .await;
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    AdminUser(user): AdminUser,
) -> AppResult<Json<Vec<SqlHistoryEntry>>> {
    crate::validation::strict_query_params(&params, &["skip", "limit"])?;
    let pagination = parse_pagination(
        params.get("skip").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        500,
    )?;

    let rows: Vec<SqlHistoryEntry> = sqlx::query_as(
        "SELECT * FROM sql_history WHERE user_id = $1 ORDER BY executed_at DESC OFFSET $2 LIMIT $3",
    )
    .bind(user.id)
    .bind(pagination.skip)
    .bind(pagination.limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
) -> AppResult<axum::http::StatusCode> {
    sqlx::query("DELETE FROM sql_history WHERE user_id = $1").bind(user.id).execute(&state.pool).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn list_snippets(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
) -> AppResult<Json<Vec<SqlSnippet>>> {
    let rows: Vec<SqlSnippet> = sqlx::query_as(
        "SELECT * FROM sql_snippets WHERE created_by = $1 OR is_shared = TRUE ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

pub async fn create_snippet(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Json(body): Json<SqlSnippetCreate>,
) -> AppResult<(axum::http::StatusCode, Json<SqlSnippet>)> {
    let snippet: SqlSnippet = sqlx::query_as(
        "INSERT INTO sql_snippets (id, name, sql_code, description, is_shared, created_by, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, now())
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&body.name)
    .bind(&body.sql_code)
    .bind(&body.description)
    .bind(body.is_shared)
    .bind(user.id)
    .fetch_one(&state.pool)
    .await?;
    Ok((axum::http::StatusCode::CREATED, Json(snippet)))
}

pub async fn delete_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AdminUser(user): AdminUser,
) -> AppResult<axum::http::StatusCode> {
    let result = sqlx::query("DELETE FROM sql_snippets WHERE id = $1 AND created_by = $2")
        .bind(id)
        .bind(user.id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("snippet not found".into()));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

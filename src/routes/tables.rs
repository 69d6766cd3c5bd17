use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::extractors::{CurrentUser, OptionalCurrentUser};
use crate::error::{AppError, AppResult};
use crate::models::table::{
    ColumnAdd, ColumnUpdate, TableCreate, TableRegistryEntry, TableSchema, TableUpdate,
};
use crate::models::user::Role;
use crate::pagination::{parse_pagination, parse_sort_by, parse_sort_order};
use crate::state::AppState;
use crate::tables_engine::ddl;
use crate::validation::{strict_query_params, validate_identifier, validate_search_term};

const SORTABLE: &[&str] = &["name", "created_at", "updated_at", "row_count"];

fn schema_of(entry: &TableRegistryEntry) -> TableSchema {
    serde_json::from_value(entry.table_schema.clone()).unwrap_or_default()
}

fn has_user_id_column(schema: &TableSchema) -> bool {
    schema.contains_key("user_id")
}

async fn fetch_table(pool: &sqlx::PgPool, id: Uuid) -> AppResult<TableRegistryEntry> {
    sqlx::query_as("SELECT * FROM tables WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("table not found".into()))
}

fn require_visible(table: &TableRegistryEntry, user: &Option<crate::models::user::UserInDb>) -> AppResult<()> {
    if table.public || user.is_some() {
        Ok(())
    } else {
        Err(AppError::NotFound("table not found".into()))
    }
}

fn require_owner_or_admin(table: &TableRegistryEntry, user: &crate::models::user::UserInDb) -> AppResult<()> {
    if user.role == Role::Admin || user.id == table.owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("not the owner of this table".into()))
    }
}

// ── Registry CRUD ───────────────────────────────────────────────────────

pub async fn count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<Value>> {
    strict_query_params(&params, &["search"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let anon = user.is_none();

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tables
         WHERE (NOT $1 OR public = TRUE)
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%')",
    )
    .bind(anon)
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({ "count": total })))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<Vec<TableRegistryEntry>>> {
    strict_query_params(&params, &["skip", "limit", "search", "sort_by", "sort_order"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let pagination = parse_pagination(
        params.get("skip").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;
    let sort_by = parse_sort_by(params.get("sort_by").map(|s| s.as_str()), SORTABLE, "created_at")?;
    let sort_order = parse_sort_order(params.get("sort_order").map(|s| s.as_str()))?;
    let anon = user.is_none();

    let sql = format!(
        "SELECT * FROM tables
         WHERE (NOT $1 OR public = TRUE)
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%')
         ORDER BY {sort_by} {} NULLS LAST
         OFFSET $3 LIMIT $4",
        sort_order.as_sql()
    );

    let rows: Vec<TableRegistryEntry> = sqlx::query_as(&sql)
        .bind(anon)
        .bind(&search)
        .bind(pagination.skip)
        .bind(pagination.limit)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<TableRegistryEntry>> {
    let table = fetch_table(&state.pool, id).await?;
    require_visible(&table, &user)?;
    Ok(Json(table))
}

/// Creates the physical table and its registry row together. On a unique
/// violation of `name`, the create is idempotent: the existing row is
/// returned rather than erroring, matching the registry-wide create
/// semantics in §4.3.
pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<TableCreate>,
) -> AppResult<(axum::http::StatusCode, Json<TableRegistryEntry>)> {
    let name = body.name.trim().to_lowercase();
    validate_identifier(&name)?;

    let mut tx = state.pool.begin().await?;
    let create_sql = ddl::build_create_table_sql(&name, &body.table_schema);
    sqlx::query(&create_sql).execute(&mut *tx).await?;

    let schema_json = serde_json::to_value(&body.table_schema).unwrap_or(Value::Object(Map::new()));
    let id = Uuid::new_v4();
    let inserted: Option<TableRegistryEntry> = sqlx::query_as(
        "INSERT INTO tables (id, name, table_schema, public, owner_id, description, metadata, row_count, realtime_enabled, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, '{}'::jsonb, 0, FALSE, now(), now())
         ON CONFLICT (name) DO NOTHING
         RETURNING *",
    )
    .bind(id)
    .bind(&name)
    .bind(&schema_json)
    .bind(body.public)
    .bind(user.id)
    .bind(&body.description)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;

    if let Some(entry) = inserted {
        return Ok((axum::http::StatusCode::CREATED, Json(entry)));
    }

    let existing: TableRegistryEntry = sqlx::query_as("SELECT * FROM tables WHERE name = $1")
        .bind(&name)
        .fetch_one(&state.pool)
        .await?;
    Ok((axum::http::StatusCode::OK, Json(existing)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<TableUpdate>,
) -> AppResult<Json<TableRegistryEntry>> {
    let table = fetch_table(&state.pool, id).await?;
    require_owner_or_admin(&table, &user)?;

    let mut tx = state.pool.begin().await?;

    let new_name = body.name.as_ref().map(|n| n.trim().to_lowercase());
    if let Some(ref n) = new_name {
        if n != &table.name {
            validate_identifier(n)?;
            sqlx::query(&format!(
                "ALTER TABLE {} RENAME TO {}",
                ddl::quote_ident(&table.name),
                ddl::quote_ident(n)
            ))
            .execute(&mut *tx)
            .await?;

            if table.realtime_enabled {
                sqlx::query("SELECT disable_realtime_for_table($1)")
                    .bind(&table.name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("SELECT enable_realtime_for_table($1)")
                    .bind(n)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }

    if let Some(realtime) = body.realtime_enabled {
        if realtime != table.realtime_enabled {
            let effective_name = new_name.clone().unwrap_or_else(|| table.name.clone());
            let proc = if realtime {
                "enable_realtime_for_table"
            } else {
                "disable_realtime_for_table"
            };
            sqlx::query(&format!("SELECT {proc}($1)"))
                .bind(&effective_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::BadInput(format!("failed to toggle realtime: {e}")))?;
        }
    }

    let updated: Option<TableRegistryEntry> = sqlx::query_as(
        "UPDATE tables SET
            name = COALESCE($2, name),
            public = COALESCE($3, public),
            description = COALESCE($4, description),
            realtime_enabled = COALESCE($5, realtime_enabled),
            updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&new_name)
    .bind(body.public)
    .bind(&body.description)
    .bind(body.realtime_enabled)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Json(updated.ok_or_else(|| AppError::NotFound("table not found".into()))?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> AppResult<axum::http::StatusCode> {
    let table = fetch_table(&state.pool, id).await?;
    require_owner_or_admin(&table, &user)?;

    let mut tx = state.pool.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", ddl::quote_ident(&table.name)))
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tables WHERE id = $1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

// ── Column mutations ────────────────────────────────────────────────────

pub async fn add_column(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ColumnAdd>,
) -> AppResult<Json<TableRegistryEntry>> {
    let table = fetch_table(&state.pool, id).await?;
    require_owner_or_admin(&table, &user)?;

    let mut schema = schema_of(&table);
    let mut tx = state.pool.begin().await?;
    sqlx::query(&ddl::build_add_column_sql(&table.name, &body)).execute(&mut *tx).await?;
    ddl::add_column_to_schema(&mut schema, &body);

    let updated: TableRegistryEntry = sqlx::query_as(
        "UPDATE tables SET table_schema = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(serde_json::to_value(&schema).unwrap())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(updated))
}

pub async fn update_column(
    State(state): State<Arc<AppState>>,
    Path((id, column)): Path<(Uuid, String)>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ColumnUpdate>,
) -> AppResult<Json<TableRegistryEntry>> {
    let table = fetch_table(&state.pool, id).await?;
    require_owner_or_admin(&table, &user)?;

    let mut schema = schema_of(&table);
    if !schema.contains_key(&column) {
        return Err(AppError::NotFound(format!("column '{column}' not found")));
    }

    let mut tx = state.pool.begin().await?;
    for stmt in ddl::build_column_update_statements(&table.name, &column, &body) {
        sqlx::query(&stmt).execute(&mut *tx).await?;
    }
    ddl::apply_schema_update(&mut schema, &column, &body)?;

    let updated: TableRegistryEntry = sqlx::query_as(
        "UPDATE tables SET table_schema = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(serde_json::to_value(&schema).unwrap())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(updated))
}

pub async fn delete_column(
    State(state): State<Arc<AppState>>,
    Path((id, column)): Path<(Uuid, String)>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<TableRegistryEntry>> {
    let table = fetch_table(&state.pool, id).await?;
    require_owner_or_admin(&table, &user)?;

    let mut schema = schema_of(&table);
    if schema.remove(&column).is_none() {
        return Err(AppError::NotFound(format!("column '{column}' not found")));
    }

    let mut tx = state.pool.begin().await?;
    sqlx::query(&ddl::build_drop_column_sql(&table.name, &column)).execute(&mut *tx).await?;

    let updated: TableRegistryEntry = sqlx::query_as(
        "UPDATE tables SET table_schema = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(serde_json::to_value(&schema).unwrap())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(updated))
}

// ── Row data CRUD ────────────────────────────────────────────────────────

/// Row-data listing uses its own `page`/`page_size` model rather than the
/// registries' `skip`/`limit`, with a wider `page_size` ceiling of 1000 —
/// grounded directly in the source's `get_table_data` handler rather than
/// the generic registry pagination helper.
pub async fn list_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<crate::models::table::TableDataResponse>> {
    strict_query_params(&params, &["page", "page_size", "search", "sort_by", "sort_order"])?;
    let table = fetch_table(&state.pool, id).await?;
    require_visible(&table, &user)?;

    let schema = schema_of(&table);
    let search = validate_search_term(params.get("search").cloned())?;

    let page: i64 = match params.get("page").map(|s| s.parse::<i64>()) {
        None => 1,
        Some(Ok(p)) if p >= 1 => p,
        _ => return Err(AppError::ValidationFailure("page must be >= 1".into())),
    };
    let page_size: i64 = match params.get("page_size").map(|s| s.parse::<i64>()) {
        None => 100,
        Some(Ok(p)) if (1..=1000).contains(&p) => p,
        _ => return Err(AppError::ValidationFailure("page_size must be between 1 and 1000".into())),
    };
    let offset = (page - 1) * page_size;

    let sort_order = match params.get("sort_order").map(|s| s.as_str()) {
        None => crate::pagination::SortOrder::Desc,
        Some(other) => parse_sort_order(Some(other))?,
    };

    let order_clause = match params.get("sort_by") {
        None => String::new(),
        Some(col) => {
            if !schema.contains_key(col) {
                return Err(AppError::BadInput(format!(
                    "Invalid sort_by column: '{col}'. Valid columns: {}",
                    schema.keys().cloned().collect::<Vec<_>>().join(", ")
                )));
            }
            format!("ORDER BY {} {}", ddl::quote_ident(col), sort_order.as_sql())
        }
    };

    let text_columns: Vec<&String> = schema
        .iter()
        .filter(|(_, c)| ddl::is_text_like(&ddl::map_type(&c.type_name)))
        .map(|(name, _)| name)
        .collect();

    let has_search = search.is_some() && !text_columns.is_empty();
    let where_clause = if has_search {
        let clauses: Vec<String> = text_columns
            .iter()
            .map(|c| format!("{}::text ILIKE '%' || $1 || '%'", ddl::quote_ident(c)))
            .collect();
        format!("WHERE {}", clauses.join(" OR "))
    } else {
        String::new()
    };

    let quoted_name = ddl::quote_ident(&table.name);

    // page_size/offset are validated integers, inlined as literals rather
    // than bound so the search placeholder's position ($1) doesn't shift
    // depending on whether a WHERE clause is present.
    let count_sql = format!("SELECT COUNT(*) FROM {quoted_name} {where_clause}");
    let data_sql =
        format!("SELECT * FROM {quoted_name} {where_clause} {order_clause} LIMIT {page_size} OFFSET {offset}");

    let (total, rows) = if has_search {
        let total: i64 = sqlx::query_scalar(&count_sql).bind(&search).fetch_one(&state.pool).await?;
        let rows = sqlx::query(&data_sql).bind(&search).fetch_all(&state.pool).await?;
        (total, rows)
    } else {
        let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&state.pool).await?;
        let rows = sqlx::query(&data_sql).fetch_all(&state.pool).await?;
        (total, rows)
    };

    Ok(Json(crate::models::table::TableDataResponse {
        data: rows.into_iter().map(row_to_json).collect(),
        total,
        page,
        page_size,
    }))
}

/// Converts a dynamically-shaped row into a JSON object without relying on
/// reflection over an anonymous map at the hot path: each Postgres oid we
/// might plausibly see from a user-defined table is decoded explicitly.
pub(crate) fn row_to_json(row: sqlx::postgres::PgRow) -> Value {
    use sqlx::{Column, Row, TypeInfo, ValueRef};
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name().to_string();
        let raw = row.try_get_raw(col.ordinal());
        let value = match raw {
            Ok(raw) if raw.is_null() => Value::Null,
            _ => match col.type_info().name() {
                "BOOL" => row.try_get::<bool, _>(col.ordinal()).map(Value::Bool).unwrap_or(Value::Null),
                "INT2" | "INT4" => row
                    .try_get::<i32, _>(col.ordinal())
                    .map(|v| Value::Number(v.into()))
                    .unwrap_or(Value::Null),
                "INT8" => row
                    .try_get::<i64, _>(col.ordinal())
                    .map(|v| Value::Number(v.into()))
                    .unwrap_or(Value::Null),
                "FLOAT4" | "FLOAT8" | "NUMERIC" => row
                    .try_get::<f64, _>(col.ordinal())
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "JSON" | "JSONB" => row.try_get::<Value, _>(col.ordinal()).unwrap_or(Value::Null),
                "UUID" => row
                    .try_get::<Uuid, _>(col.ordinal())
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null),
                "TIMESTAMPTZ" | "TIMESTAMP" => row
                    .try_get::<chrono::DateTime<chrono::Utc>, _>(col.ordinal())
                    .map(|v| Value::String(v.to_rfc3339()))
                    .unwrap_or(Value::Null),
                "DATE" => row
                    .try_get::<chrono::NaiveDate, _>(col.ordinal())
                    .map(|v| Value::String(v.to_string()))
                    .unwrap_or(Value::Null),
                _ => row
                    .try_get::<String, _>(col.ordinal())
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            },
        };
        map.insert(name, value);
    }
    Value::Object(map)
}

fn json_to_sql_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Every row value crosses the wire as text (dynamic tables have no
/// compile-time type to bind against), so each placeholder carries an
/// explicit `::type` cast matching the column's physical type. Without it
/// Postgres has no way to coerce a text-typed parameter into an integer,
/// boolean, or jsonb column.
fn placeholder_for(schema: &TableSchema, column: &str, index: usize) -> String {
    match schema.get(column) {
        Some(col) => format!("${index}::{}", ddl::map_type(&col.type_name)),
        None => format!("${index}"),
    }
}

pub async fn insert_row(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    OptionalCurrentUser(user): OptionalCurrentUser,
    Json(body): Json<Value>,
) -> AppResult<(axum::http::StatusCode, Json<Value>)> {
    let table = fetch_table(&state.pool, id).await?;
    if !table.public && user.is_none() {
        return Err(AppError::InvalidOrExpiredToken);
    }

    let schema = schema_of(&table);
    let mut body_map = match body {
        Value::Object(m) => m,
        _ => return Err(AppError::ValidationFailure("row body must be a JSON object".into())),
    };

    // Hardening (Design Note #9/3): the caller's `user_id` is never taken
    // at face value for an insert. If the schema has a user_id column, it
    // is always set from the resolved caller (or NULL for an anonymous
    // insert on a public table), regardless of what the body supplied.
    if has_user_id_column(&schema) {
        match &user {
            Some(u) => {
                body_map.insert("user_id".to_string(), Value::String(u.id.to_string()));
            }
            None => {
                body_map.insert("user_id".to_string(), Value::Null);
            }
        }
    }

    // UUID-typed `id` columns left unset get a server-generated UUID.
    if let Some(id_col) = schema.get("id") {
        if ddl::map_type(&id_col.type_name) == "UUID"
            && body_map.get("id").map(|v| v.is_null()).unwrap_or(true)
        {
            body_map.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
    }

    let columns: Vec<String> = body_map.keys().cloned().collect();
    if columns.is_empty() {
        return Err(AppError::ValidationFailure("row body must not be empty".into()));
    }

    let quoted_cols: Vec<String> = columns.iter().map(|c| ddl::quote_ident(c)).collect();
    let placeholders: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| placeholder_for(&schema, c, i + 1))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        ddl::quote_ident(&table.name),
        quoted_cols.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for col in &columns {
        let v = body_map.get(col).unwrap();
        query = query.bind(json_to_sql_param(v));
    }

    let row = query.fetch_one(&state.pool).await?;

    sqlx::query("UPDATE tables SET row_count = row_count + 1, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
        .ok();

    Ok((axum::http::StatusCode::CREATED, Json(row_to_json(row))))
}

pub async fn update_row(
    State(state): State<Arc<AppState>>,
    Path((id, row_id)): Path<(Uuid, Uuid)>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let table = fetch_table(&state.pool, id).await?;
    let schema = schema_of(&table);

    let body_map = match body {
        Value::Object(m) => m,
        _ => return Err(AppError::ValidationFailure("row body must be a JSON object".into())),
    };
    if body_map.is_empty() {
        return Err(AppError::ValidationFailure("patch body must not be empty".into()));
    }

    let columns: Vec<String> = body_map.keys().cloned().collect();
    let set_clauses: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", ddl::quote_ident(c), placeholder_for(&schema, c, i + 1)))
        .collect();

    // Ownership via dropped predicate (Design Note #9/5): the `user_id`
    // filter is simply omitted from the statement for admins, rather than
    // branching in SQL, so the query shape never differs by role.
    let owned = has_user_id_column(&schema);
    let sql = if owned && user.role != Role::Admin {
        format!(
            "UPDATE {} SET {} WHERE id = ${} AND user_id = ${} RETURNING *",
            ddl::quote_ident(&table.name),
            set_clauses.join(", "),
            columns.len() + 1,
            columns.len() + 2
        )
    } else {
        format!(
            "UPDATE {} SET {} WHERE id = ${} RETURNING *",
            ddl::quote_ident(&table.name),
            set_clauses.join(", "),
            columns.len() + 1
        )
    };

    let mut query = sqlx::query(&sql);
    for col in &columns {
        query = query.bind(json_to_sql_param(body_map.get(col).unwrap()));
    }
    query = query.bind(row_id);
    if owned && user.role != Role::Admin {
        query = query.bind(user.id);
    }

    let row = query.fetch_optional(&state.pool).await?;
    // Missing row and wrong owner are indistinguishable by design: both
    // surface as 404 so a caller cannot probe for another user's rows.
    let row = row.ok_or_else(|| AppError::NotFound("row not found".into()))?;

    sqlx::query("UPDATE tables SET updated_at = now() WHERE id = $1").bind(id).execute(&state.pool).await.ok();

    Ok(Json(row_to_json(row)))
}

pub async fn delete_row(
    State(state): State<Arc<AppState>>,
    Path((id, row_id)): Path<(Uuid, Uuid)>,
    CurrentUser(user): CurrentUser,
) -> AppResult<axum::http::StatusCode> {
    let table = fetch_table(&state.pool, id).await?;
    let schema = schema_of(&table);
    let owned = has_user_id_column(&schema);

    let sql = if owned && user.role != Role::Admin {
        format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", ddl::quote_ident(&table.name))
    } else {
        format!("DELETE FROM {} WHERE id = $1", ddl::quote_ident(&table.name))
    };

    let mut query = sqlx::query(&sql).bind(row_id);
    if owned && user.role != Role::Admin {
        query = query.bind(user.id);
    }
    let result = query.execute(&state.pool).await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("row not found".into()));
    }

    sqlx::query("UPDATE tables SET row_count = GREATEST(row_count - 1, 0), updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await
        .ok();

    Ok(axum::http::StatusCode::NO_CONTENT)
}

use axum::extract::{Path, Query, Request, State};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::extractors::{CurrentUser, OptionalCurrentUser};
use crate::error::{AppError, AppResult};
use crate::models::bucket::{Bucket, BucketCreate, BucketUpdate};
use crate::models::file::{FileRecord, FileUploadResponse};
use crate::models::user::Role;
use crate::pagination::parse_pagination;
use crate::state::AppState;
use crate::storage_client::StorageClient;
use crate::validation::{strict_query_params, validate_bucket_name, validate_search_term};

async fn fetch_bucket(pool: &sqlx::PgPool, id: Uuid) -> AppResult<Bucket> {
    sqlx::query_as("SELECT * FROM buckets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("bucket not found".into()))
}

fn require_bucket_readable(bucket: &Bucket, user: &Option<crate::models::user::UserInDb>) -> AppResult<()> {
    if bucket.public || user.is_some() {
        Ok(())
    } else {
        Err(AppError::NotFound("bucket not found".into()))
    }
}

fn require_bucket_owner(bucket: &Bucket, user: &crate::models::user::UserInDb) -> AppResult<()> {
    if user.role == Role::Admin || user.id == bucket.owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden("you can only modify buckets you own".into()))
    }
}

// ── Buckets ──────────────────────────────────────────────────────────────

pub async fn bucket_count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["search"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let anon = user.is_none();
    let owner_id = user.as_ref().map(|u| u.id);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM buckets
         WHERE (public = TRUE OR (NOT $1 AND owner_id = $2))
           AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR description ILIKE '%' || $3 || '%')",
    )
    .bind(anon)
    .bind(owner_id.unwrap_or(Uuid::nil()))
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<Vec<Bucket>>> {
    strict_query_params(&params, &["skip", "limit", "search", "sort_by", "sort_order"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let pagination = parse_pagination(
        params.get("skip").and_then(|s| s.parse().ok()),
        params.get("limit").and_then(|s| s.parse().ok()),
        100,
    )?;
    let sort_by = crate::pagination::parse_sort_by(
        params.get("sort_by").map(|s| s.as_str()),
        &["created_at", "updated_at", "name"],
        "created_at",
    )?;
    let sort_order = crate::pagination::parse_sort_order(params.get("sort_order").map(|s| s.as_str()))?;
    let anon = user.is_none();
    let owner_id = user.as_ref().map(|u| u.id);

    let sql = format!(
        "SELECT * FROM buckets
         WHERE (public = TRUE OR (NOT $1 AND owner_id = $2))
           AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR description ILIKE '%' || $3 || '%')
         ORDER BY {sort_by} {} NULLS LAST
         OFFSET $4 LIMIT $5",
        sort_order.as_sql()
    );

    let rows: Vec<Bucket> = sqlx::query_as(&sql)
        .bind(anon)
        .bind(owner_id.unwrap_or(Uuid::nil()))
        .bind(&search)
        .bind(pagination.skip)
        .bind(pagination.limit)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows))
}

pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<BucketCreate>,
) -> AppResult<(axum::http::StatusCode, Json<Bucket>)> {
    let name = body.name.trim().to_lowercase();
    validate_bucket_name(&name)?;

    let client = StorageClient::new(&state.http_client, &state.config);
    client.create_bucket(&name, body.public).await?;

    let id = Uuid::new_v4();
    let inserted: Option<Bucket> = sqlx::query_as(
        "INSERT INTO buckets (id, name, public, description, owner_id, metadata, file_count, total_size, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, '{}'::jsonb, 0, 0, now(), now())
         ON CONFLICT (name) DO NOTHING
         RETURNING *",
    )
    .bind(id)
    .bind(&name)
    .bind(body.public)
    .bind(&body.description)
    .bind(user.id)
    .fetch_optional(&state.pool)
    .await?;

    if let Some(bucket) = inserted {
        return Ok((axum::http::StatusCode::CREATED, Json(bucket)));
    }

    let existing: Bucket = sqlx::query_as("SELECT * FROM buckets WHERE name = $1")
        .bind(&name)
        .fetch_one(&state.pool)
        .await?;
    Ok((axum::http::StatusCode::OK, Json(existing)))
}

pub async fn get_bucket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<Bucket>> {
    let bucket = fetch_bucket(&state.pool, id).await?;
    require_bucket_readable(&bucket, &user)?;
    Ok(Json(bucket))
}

pub async fn update_bucket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<BucketUpdate>,
) -> AppResult<Json<Bucket>> {
    let bucket = fetch_bucket(&state.pool, id).await?;
    require_bucket_owner(&bucket, &user)?;

    let updated: Bucket = sqlx::query_as(
        "UPDATE buckets SET
            public = COALESCE($2, public),
            description = COALESCE($3, description),
            updated_at = now()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(body.public)
    .bind(&body.description)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(updated))
}

pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> AppResult<axum::http::StatusCode> {
    let bucket = fetch_bucket(&state.pool, id).await?;
    require_bucket_owner(&bucket, &user)?;

    let client = StorageClient::new(&state.http_client, &state.config);
    client.delete_bucket(&bucket.name).await.ok();

    sqlx::query("DELETE FROM buckets WHERE id = $1").bind(id).execute(&state.pool).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn bucket_file_count(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let bucket = fetch_bucket(&state.pool, id).await?;
    require_bucket_readable(&bucket, &user)?;

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM files WHERE bucket_id = $1 AND is_latest = TRUE AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({ "count": count })))
}

pub async fn storage_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["search"])?;
    let search = validate_search_term(params.get("search").cloned())?;
    let anon = user.is_none();

    let row: (i64, i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(file_count), 0), COALESCE(SUM(total_size), 0), COUNT(*)
         FROM buckets
         WHERE (public = TRUE OR NOT $1)
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR description ILIKE '%' || $2 || '%')",
    )
    .bind(anon)
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({
        "total_files": row.0,
        "total_size": row.1,
        "bucket_count": row.2,
    })))
}

// ── macOS-style duplicate filename resolution ──────────────────────────

/// Ports the source's `find_next_available_filename`: if `original_path`
/// is free, use it unchanged; otherwise probe `name (1).ext`, `name
/// (2).ext`, ... and return the first number not already taken by a live
/// file in the same directory.
async fn find_next_available_filename(pool: &sqlx::PgPool, bucket_id: Uuid, original_path: &str) -> AppResult<String> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM files WHERE bucket_id = $1 AND path = $2 AND is_latest = TRUE AND deleted_at IS NULL)",
    )
    .bind(bucket_id)
    .bind(original_path)
    .fetch_one(pool)
    .await?;

    if !exists {
        return Ok(original_path.to_string());
    }

    let (directory, filename) = match original_path.rsplit_once('/') {
        Some((dir, rest)) => (format!("{dir}/"), rest.to_string()),
        None => (String::new(), original_path.to_string()),
    };
    let (base_name, ext) = match filename.rsplit_once('.') {
        Some((base, e)) => (base.to_string(), format!(".{e}")),
        None => (filename.clone(), String::new()),
    };

    let like_pattern = format!("{directory}{base_name}%{ext}");
    let existing: Vec<String> = sqlx::query_scalar(
        "SELECT path FROM files WHERE bucket_id = $1 AND path LIKE $2 AND is_latest = TRUE AND deleted_at IS NULL",
    )
    .bind(bucket_id)
    .bind(&like_pattern)
    .fetch_all(pool)
    .await?;

    let name_re = regex::Regex::new(&format!(
        "^{}{}(?:\\s*\\(([0-9]+)\\))?{}$",
        regex::escape(&directory),
        regex::escape(&base_name),
        regex::escape(&ext)
    ))
    .expect("constructed dedup regex is always valid");

    let mut used = std::collections::HashSet::new();
    for f in &existing {
        if let Some(caps) = name_re.captures(f) {
            let n = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()).unwrap_or(0);
            used.insert(n);
        }
    }

    let mut next = 1u32;
    while used.contains(&next) {
        next += 1;
    }

    Ok(format!("{directory}{base_name} ({next}){ext}"))
}

// ── Files ────────────────────────────────────────────────────────────────

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    strict_query_params(&params, &["bucket_id", "page", "page_size", "search", "sort_by", "sort_order"])?;
    let bucket_id: Uuid = params
        .get("bucket_id")
        .ok_or_else(|| AppError::ValidationFailure("bucket_id is required".into()))?
        .parse()
        .map_err(|_| AppError::ValidationFailure("bucket_id must be a UUID".into()))?;

    let bucket = fetch_bucket(&state.pool, bucket_id).await?;
    require_bucket_readable(&bucket, &user)?;

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
    let sort_by = crate::pagination::parse_sort_by(
        params.get("sort_by").map(|s| s.as_str()),
        &["created_at", "updated_at", "name", "size"],
        "created_at",
    )?;
    let sort_order = match params.get("sort_order").map(|s| s.as_str()) {
        None => crate::pagination::SortOrder::Desc,
        Some(other) => crate::pagination::parse_sort_order(Some(other))?,
    };

    let sql = format!(
        "SELECT * FROM files
         WHERE bucket_id = $1 AND is_latest = TRUE AND deleted_at IS NULL
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR path ILIKE '%' || $2 || '%')
         ORDER BY {sort_by} {} NULLS LAST OFFSET $3 LIMIT $4",
        sort_order.as_sql()
    );
    let rows: Vec<FileRecord> = sqlx::query_as(&sql)
        .bind(bucket_id)
        .bind(&search)
        .bind(offset)
        .bind(page_size)
        .fetch_all(&state.pool)
        .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM files
         WHERE bucket_id = $1 AND is_latest = TRUE AND deleted_at IS NULL
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%' OR path ILIKE '%' || $2 || '%')",
    )
    .bind(bucket_id)
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({
        "files": rows,
        "total": total,
        "page": page,
        "page_size": page_size,
    })))
}

/// Streams the request body straight through to the storage worker without
/// buffering the whole file in the gateway process.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    OptionalCurrentUser(user): OptionalCurrentUser,
    request: Request,
) -> AppResult<(axum::http::StatusCode, Json<FileUploadResponse>)> {
    strict_query_params(&params, &["bucket_id", "path", "filename", "content_type"])?;
    let bucket_id: Uuid = params
        .get("bucket_id")
        .ok_or_else(|| AppError::ValidationFailure("bucket_id is required".into()))?
        .parse()
        .map_err(|_| AppError::ValidationFailure("bucket_id must be a UUID".into()))?;
    let filename = params
        .get("filename")
        .cloned()
        .ok_or_else(|| AppError::ValidationFailure("filename is required".into()))?;
    let content_type = params.get("content_type").cloned().unwrap_or_else(|| "application/octet-stream".to_string());

    let bucket = fetch_bucket(&state.pool, bucket_id).await?;
    if !bucket.public && user.is_none() {
        return Err(AppError::InvalidOrExpiredToken);
    }

    let initial_path = params.get("path").cloned().unwrap_or_else(|| filename.clone());
    if initial_path.contains("..") {
        return Err(AppError::BadInput("path must not contain '..'".into()));
    }
    let target_path = find_next_available_filename(&state.pool, bucket_id, initial_path.trim()).await?;

    let content_length: Option<u64> = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let client = StorageClient::new(&state.http_client, &state.config);
    let stream = request.into_body().into_data_stream();
    let storage_result = client
        .upload_file_streaming(&bucket.name, &target_path, stream, &filename, &content_type, content_length)
        .await?;

    let file_size = storage_result
        .get("file")
        .and_then(|f| f.get("size"))
        .and_then(|s| s.as_i64())
        .unwrap_or(0);

    let file_id = Uuid::new_v4();
    let short_name = target_path.rsplit('/').next().unwrap_or(&target_path).to_string();

    let mut tx = state.pool.begin().await?;
    let record: FileRecord = sqlx::query_as(
        "INSERT INTO files (id, bucket_id, name, path, size, mime_type, owner_id, metadata, version, is_latest, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, '{}'::jsonb, 1, TRUE, now(), now())
         RETURNING *",
    )
    .bind(file_id)
    .bind(bucket_id)
    .bind(&short_name)
    .bind(&target_path)
    .bind(file_size)
    .bind(&content_type)
    .bind(user.as_ref().map(|u| u.id))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE buckets SET file_count = file_count + 1, total_size = total_size + $2, updated_at = now() WHERE id = $1")
        .bind(bucket_id)
        .bind(file_size)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let (original_path, message) = if target_path != initial_path {
        (
            Some(initial_path.clone()),
            Some(format!("file uploaded successfully (renamed from '{initial_path}' to avoid overwrite)")),
        )
    } else {
        (None, Some("file uploaded successfully".to_string()))
    };

    Ok((
        axum::http::StatusCode::CREATED,
        Json(FileUploadResponse { file: record, original_path, message }),
    ))
}

pub async fn get_file_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<Json<FileRecord>> {
    let file: FileRecord = sqlx::query_as("SELECT * FROM files WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("file not found".into()))?;
    let bucket = fetch_bucket(&state.pool, file.bucket_id).await?;
    require_bucket_readable(&bucket, &user)?;
    Ok(Json(file))
}

pub async fn update_file_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
    Json(metadata): Json<serde_json::Value>,
) -> AppResult<Json<FileRecord>> {
    let file: FileRecord = sqlx::query_as("SELECT * FROM files WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("file not found".into()))?;

    if user.role != Role::Admin && file.owner_id != Some(user.id) {
        return Err(AppError::Forbidden("you can only update files you own".into()));
    }

    let updated: FileRecord = sqlx::query_as(
        "UPDATE files SET metadata = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&metadata)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(updated))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> AppResult<axum::http::StatusCode> {
    let file: FileRecord = sqlx::query_as("SELECT * FROM files WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("file not found".into()))?;

    if user.role != Role::Admin && file.owner_id != Some(user.id) {
        return Err(AppError::Forbidden("you can only delete files you own".into()));
    }

    let bucket = fetch_bucket(&state.pool, file.bucket_id).await?;
    let client = StorageClient::new(&state.http_client, &state.config);
    client.delete_file(&bucket.name, &file.path).await.ok();

    let mut tx = state.pool.begin().await?;
    sqlx::query("DELETE FROM files WHERE id = $1").bind(id).execute(&mut *tx).await?;
    sqlx::query("UPDATE buckets SET file_count = GREATEST(file_count - 1, 0), total_size = GREATEST(total_size - $2, 0), updated_at = now() WHERE id = $1")
        .bind(file.bucket_id)
        .bind(file.size)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Public download by bucket name + path, proxying the storage worker's
/// streaming response through untouched.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((bucket_name, path)): Path<(String, String)>,
    OptionalCurrentUser(user): OptionalCurrentUser,
) -> AppResult<axum::response::Response> {
    let bucket: Bucket = sqlx::query_as("SELECT * FROM buckets WHERE name = $1")
        .bind(&bucket_name)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("bucket not found".into()))?;
    require_bucket_readable(&bucket, &user)?;

    let file: FileRecord = sqlx::query_as(
        "SELECT * FROM files WHERE bucket_id = $1 AND path = $2 AND is_latest = TRUE AND deleted_at IS NULL",
    )
    .bind(bucket.id)
    .bind(&path)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("file not found".into()))?;

    let client = StorageClient::new(&state.http_client, &state.config);
    let upstream = client.download_file(&bucket_name, &path).await?;

    let filename = path.rsplit('/').next().unwrap_or(&path);
    let body = axum::body::Body::from_stream(upstream.bytes_stream());

    let response = axum::response::Response::builder()
        .status(axum::http::StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, &file.mime_type)
        .header(axum::http::header::CONTENT_LENGTH, file.size.to_string())
        .header(
            axum::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(response)
}

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use crate::auth::extractors::AdminUser;
use crate::error::{AppError, AppResult};
use crate::models::backup::{BackupInfo, BackupResult, RestoreResult};
use crate::state::AppState;

pub async fn list(State(state): State<Arc<AppState>>, AdminUser(_user): AdminUser) -> Json<Vec<BackupInfo>> {
    Json(crate::backup::list_backups(&state).await)
}

pub async fn create(State(state): State<Arc<AppState>>, AdminUser(_user): AdminUser) -> AppResult<Json<BackupResult>> {
    let result = crate::backup::create_backup(&state).await;
    if !result.success {
        return Err(AppError::Internal(result.message));
    }
    Ok(Json(result))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    AdminUser(_user): AdminUser,
) -> AppResult<impl IntoResponse> {
    let path = crate::backup::get_backup_path(&state, &filename)
        .await
        .ok_or_else(|| AppError::NotFound("backup file not found".into()))?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<serde_json::Value>> {
    if !crate::backup::delete_backup(&state, &filename).await {
        return Err(AppError::NotFound("backup file not found".into()));
    }
    Ok(Json(serde_json::json!({ "message": format!("Backup {filename} deleted successfully") })))
}

/// Public by necessity: there is no admin account yet on a fresh install.
/// Gated instead on `system_config.initialized = false`, which flips to
/// `true` on first successful login and never flips back outside a
/// restore.
pub async fn restore(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<RestoreResult>> {
    let initialized: bool = sqlx::query_scalar("SELECT initialized FROM system_config WHERE id = 1")
        .fetch_optional(&state.pool)
        .await?
        .unwrap_or(false);

    if initialized {
        return Err(AppError::Forbidden(
            "system is already initialized. Restore is only available on fresh installs".into(),
        ));
    }

    let mut backup_data = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::BadInput(e.to_string()))? {
        if field.name() == Some("file") {
            backup_data = field.bytes().await.map_err(|e| AppError::BadInput(e.to_string()))?.to_vec();
        }
    }

    if backup_data.is_empty() {
        return Err(AppError::BadInput("uploaded file is empty".into()));
    }

    let result = crate::backup::restore_from_backup(&state, &backup_data).await;
    if !result.success {
        return Err(AppError::BadInput(result.message));
    }
    Ok(Json(result))
}

pub async fn restore_method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, [("Allow", "POST")], Json(serde_json::json!({ "detail": "Method not allowed" })))
}

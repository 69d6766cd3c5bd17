use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::system::SystemStatus;
use crate::state::AppState;

/// Public: used by the frontend to decide whether to show the restore
/// option on the login page, so it is not gated on any bearer token.
pub async fn get_status(State(state): State<Arc<AppState>>) -> AppResult<Json<SystemStatus>> {
    let initialized: bool = sqlx::query_scalar("SELECT initialized FROM system_config WHERE id = 1")
        .fetch_optional(&state.pool)
        .await?
        .unwrap_or(false);

    Ok(Json(SystemStatus {
        initialized,
        version: state.config.app_version.clone(),
    }))
}

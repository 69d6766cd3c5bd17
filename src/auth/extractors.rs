use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::user::{Role, UserInDb};
use crate::state::AppState;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Required-auth extractor: any route that takes this fails admission with
/// `401` if the bearer token is missing, malformed, expired, or names an
/// inactive/unknown user. This is step 6 of the admission pipeline.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserInDb);

impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let token = bearer_token(parts).ok_or(AppError::InvalidOrExpiredToken)?;
        let user = crate::auth::resolve_bearer_token(&app_state.pool, &app_state.config, token).await?;
        Ok(CurrentUser(user))
    }
}

/// Optional-auth extractor: never rejects on a missing or invalid token.
/// Handlers that accept this branch on `Some`/`None` themselves, matching
/// the source's dependency that resolves to `UserInDB | None`.
#[derive(Debug, Clone)]
pub struct OptionalCurrentUser(pub Option<UserInDb>);

impl<S> FromRequestParts<S> for OptionalCurrentUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let user = match bearer_token(parts) {
            Some(token) => crate::auth::resolve_bearer_token(&app_state.pool, &app_state.config, token)
                .await
                .ok(),
            None => None,
        };
        Ok(OptionalCurrentUser(user))
    }
}

/// Admin-only extractor: resolves the caller the same way `CurrentUser`
/// does, then additionally requires `role=ADMIN`, else `403`. This is step
/// 7 of the admission pipeline for admin-gated routes.
#[derive(Debug, Clone)]
pub struct AdminUser(pub UserInDb);

impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(AppError::Forbidden("admin access required".into()));
        }
        Ok(AdminUser(user))
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Uniform error envelope returned by every handler: `{"detail": "..."}`.
///
/// Each variant carries its own fixed HTTP status so that handlers convert
/// service-specific failures (unique violation, missing row, timeout) into
/// one of these instead of leaking raw database or transport errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("missing X-API-Key header")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Token reuse detected. All sessions revoked.")]
    TokenReuse,
    #[error("Inactive user")]
    InactiveUser,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ValidationFailure(String),
    #[error("Unknown query parameters: {0}")]
    UnknownQueryParam(String),
    #[error("{0}")]
    BadInput(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::MissingApiKey => StatusCode::NOT_ACCEPTABLE,
            AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::InvalidOrExpiredToken => StatusCode::UNAUTHORIZED,
            AppError::TokenReuse => StatusCode::UNAUTHORIZED,
            AppError::InactiveUser => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ValidationFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnknownQueryParam(_) => StatusCode::BAD_REQUEST,
            AppError::BadInput(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "unhandled error");
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("not found".into()),
            sqlx::Error::Database(db_err) => {
                // Postgres unique_violation = 23505, foreign_key_violation = 23503
                match db_err.code().as_deref() {
                    Some("23505") => AppError::Conflict("resource already exists".into()),
                    Some("23503") => AppError::BadInput("foreign key violation".into()),
                    _ => AppError::Internal(db_err.to_string()),
                }
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AppError::Unavailable(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Printable-ASCII-only search term, matching the source's `SEARCH_TERM_REGEX`
/// (`^[\x20-\x7E]*$`) in `utils/validation.py`. Rejects anything with control
/// characters or non-ASCII bytes, which would otherwise be handed raw into an
/// `ILIKE` pattern.
static SEARCH_TERM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\x20-\x7E]*$").unwrap());

pub fn validate_search_term(term: Option<String>) -> Result<Option<String>, AppError> {
    match term {
        None => Ok(None),
        Some(t) if t.is_empty() => Ok(None),
        Some(t) => {
            if t.len() > 100 {
                return Err(AppError::BadInput("search term too long".into()));
            }
            if !SEARCH_TERM_RE.is_match(&t) {
                return Err(AppError::BadInput("search term contains invalid characters".into()));
            }
            Ok(Some(t))
        }
    }
}

/// Rejects any query parameter not in `allowed`, returning `400` (not
/// `422`) so client logic bugs are distinguishable from schema-validation
/// failures.
pub fn strict_query_params(
    params: &HashMap<String, String>,
    allowed: &[&str],
) -> Result<(), AppError> {
    let unknown: Vec<&str> = params
        .keys()
        .filter(|k| !allowed.contains(&k.as_str()))
        .map(|k| k.as_str())
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(AppError::UnknownQueryParam(unknown.join(", ")))
    }
}

/// SQL identifier shape: lowercase letters, digits, underscore, must start
/// with a letter or underscore, ≤63 bytes (Postgres's own identifier limit).
static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

const RESERVED_NAMES: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "table", "from", "where",
    "user", "order", "group", "join", "union", "grant", "revoke",
];

pub fn validate_identifier(name: &str) -> Result<(), AppError> {
    if name.is_empty() || name.len() > 63 {
        return Err(AppError::BadInput(format!(
            "'{name}' is not a valid identifier: must be 1-63 characters"
        )));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(AppError::BadInput(format!(
            "'{name}' is not a valid identifier: must be lowercase letters, digits, underscore"
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(AppError::BadInput(format!("'{name}' is a reserved name")));
    }
    Ok(())
}

/// Bucket name shape: S3-style, 3-63 chars, lowercase alphanumeric + hyphen,
/// not starting/ending with a hyphen.
static BUCKET_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{1,61})[a-z0-9]$").unwrap());

pub fn validate_bucket_name(name: &str) -> Result<(), AppError> {
    if name.len() < 3 || name.len() > 63 || !BUCKET_NAME_RE.is_match(name) {
        return Err(AppError::BadInput(format!(
            "'{name}' is not a valid bucket name: 3-63 lowercase alphanumeric/hyphen characters, \
             must not start or end with a hyphen"
        )));
    }
    Ok(())
}

/// Webhook trigger token shape: ASCII word characters and hyphens only,
/// bounded length — matches `webhooks.py`'s `trigger_webhook` validation
/// that collapses every malformed-token case into the same 404.
static WEBHOOK_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

pub fn is_valid_webhook_token_shape(token: &str) -> bool {
    !token.is_empty() && token.len() <= 255 && WEBHOOK_TOKEN_RE.is_match(token)
}

/// Function execution timeout, in seconds.
pub fn validate_timeout_seconds(value: i32) -> Result<(), AppError> {
    if (5..=300).contains(&value) {
        Ok(())
    } else {
        Err(AppError::ValidationFailure("timeout_seconds must be between 5 and 300".into()))
    }
}

/// Webhook delivery retry count before a delivery is given up on.
pub fn validate_retry_attempts(value: i32) -> Result<(), AppError> {
    if (1..=10).contains(&value) {
        Ok(())
    } else {
        Err(AppError::ValidationFailure("retry_attempts must be between 1 and 10".into()))
    }
}

/// Delay between webhook delivery retries, in seconds. Must be positive.
pub fn validate_retry_delay_seconds(value: i32) -> Result<(), AppError> {
    if value > 0 {
        Ok(())
    } else {
        Err(AppError::ValidationFailure("retry_delay_seconds must be greater than 0".into()))
    }
}

/// Per-minute webhook delivery cap. Must be positive.
pub fn validate_rate_limit_per_minute(value: i32) -> Result<(), AppError> {
    if value > 0 {
        Ok(())
    } else {
        Err(AppError::ValidationFailure("rate_limit_per_minute must be greater than 0".into()))
    }
}

use crate::error::AppError;

/// Shared skip/limit/search/sort_by/sort_order handling for the five
/// registries (§4.3). Each registry calls these helpers with its own
/// sort-column allowlist — `sort_by` is never interpolated from the raw
/// query string directly into SQL.
pub struct Pagination {
    pub skip: i64,
    pub limit: i64,
}

pub fn parse_pagination(skip: Option<i64>, limit: Option<i64>, max_limit: i64) -> Result<Pagination, AppError> {
    let skip = skip.unwrap_or(0);
    if skip < 0 {
        return Err(AppError::ValidationFailure("skip must be >= 0".into()));
    }
    let limit = limit.unwrap_or(20.min(max_limit));
    if limit < 1 || limit > max_limit {
        return Err(AppError::ValidationFailure(format!("limit must be between 1 and {max_limit}")));
    }
    Ok(Pagination { skip, limit })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub fn parse_sort_order(sort_order: Option<&str>) -> Result<SortOrder, AppError> {
    match sort_order.unwrap_or("asc") {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => Err(AppError::ValidationFailure(format!(
            "sort_order must be 'asc' or 'desc', got '{other}'"
        ))),
    }
}

/// Validates `sort_by` against a per-entity allowlist so it is never
/// interpolated raw. Returns the matched column name (from the allowlist,
/// not the caller's string) for defense in depth.
pub fn parse_sort_by<'a>(sort_by: Option<&str>, allowed: &[&'a str], default: &'a str) -> Result<&'a str, AppError> {
    match sort_by {
        None => Ok(default),
        Some(col) => allowed
            .iter()
            .find(|&&c| c == col)
            .copied()
            .ok_or_else(|| AppError::ValidationFailure(format!("sort_by '{col}' is not a sortable column"))),
    }
}

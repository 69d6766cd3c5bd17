use axum::extract::State;
use axum::Json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::auth::extractors::AdminUser;
use crate::error::AppResult;
use crate::models::schema::{SchemaColumn, SchemaEdge, SchemaNode, SchemaVisualizationResponse};
use crate::state::AppState;

const SYSTEM_TABLES_TO_EXCLUDE: &[&str] = &[
    "alembic_version",
    "sql_history",
    "sql_snippets",
    "storage_buckets",
    "storage_objects",
    "pg_stat_statements",
    "tables_metadata",
];

const CORE_TABLES_TO_INCLUDE: &[&str] = &[
    "users",
    "sessions",
    "tables",
    "webhooks",
    "webhook_deliveries",
    "functions",
    "scheduled_functions",
    "backup_configs",
    "backups",
];

fn is_system_table(name: &str) -> bool {
    if SYSTEM_TABLES_TO_EXCLUDE.contains(&name) {
        return true;
    }
    if CORE_TABLES_TO_INCLUDE.contains(&name) {
        return false;
    }
    name.starts_with("pg_") || name.starts_with('_')
}

async fn visible_table_names(pool: &sqlx::PgPool) -> AppResult<Vec<String>> {
    let all: Vec<String> = sqlx::query_scalar(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(all.into_iter().filter(|t| !is_system_table(t)).collect())
}

pub async fn list_tables(
    State(state): State<Arc<AppState>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(visible_table_names(&state.pool).await?))
}

pub async fn visualization(
    State(state): State<Arc<AppState>>,
    AdminUser(_user): AdminUser,
) -> AppResult<Json<SchemaVisualizationResponse>> {
    let table_names = visible_table_names(&state.pool).await?;
    if table_names.is_empty() {
        return Ok(Json(SchemaVisualizationResponse { nodes: vec![], edges: vec![] }));
    }

    let columns_rows: Vec<(String, String, String, Option<String>, bool)> = sqlx::query_as(
        "SELECT
            c.table_name, c.column_name, c.data_type, c.column_default,
            COALESCE(
                (SELECT true
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                   AND tc.table_schema = 'public'
                   AND tc.table_name = c.table_name
                   AND kcu.column_name = c.column_name
                ), false
            ) AS is_primary_key
         FROM information_schema.columns c
         WHERE c.table_schema = 'public' AND c.table_name = ANY($1)
         ORDER BY c.table_name, c.ordinal_position",
    )
    .bind(&table_names)
    .fetch_all(&state.pool)
    .await?;

    let fk_rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
        "SELECT
            tc.constraint_name AS id, tc.table_name AS source, kcu.column_name AS source_column,
            ccu.table_name AS target, ccu.column_name AS target_column
         FROM information_schema.table_constraints tc
         JOIN information_schema.key_column_usage kcu
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
         JOIN information_schema.constraint_column_usage ccu
           ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
         WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public'
           AND tc.table_name = ANY($1)
         ORDER BY tc.table_name, kcu.column_name",
    )
    .bind(&table_names)
    .fetch_all(&state.pool)
    .await?;

    let mut table_columns: HashMap<String, Vec<SchemaColumn>> = HashMap::new();
    let mut table_primary_keys: HashMap<String, Vec<String>> = HashMap::new();

    for (table_name, column_name, data_type, column_default, is_primary_key) in columns_rows {
        if is_primary_key {
            table_primary_keys.entry(table_name.clone()).or_default().push(column_name.clone());
        }
        table_columns.entry(table_name).or_default().push(SchemaColumn {
            column_name,
            data_type,
            column_default,
            is_primary_key,
        });
    }

    let nodes: Vec<SchemaNode> = table_names
        .iter()
        .filter_map(|name| {
            table_columns.get(name).map(|columns| SchemaNode {
                id: name.clone(),
                label: name.clone(),
                columns: columns.clone(),
                primary_keys: table_primary_keys.get(name).cloned().unwrap_or_default(),
            })
        })
        .collect();

    let table_set: HashSet<&String> = table_names.iter().collect();
    let edges: Vec<SchemaEdge> = fk_rows
        .into_iter()
        .filter(|(_, source, _, target, _)| table_set.contains(source) && table_set.contains(target))
        .map(|(id, source, source_column, target, target_column)| SchemaEdge {
            id,
            source,
            source_column,
            target,
            target_column,
        })
        .collect();

    Ok(Json(SchemaVisualizationResponse { nodes, edges }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_tables_are_never_excluded() {
        for name in CORE_TABLES_TO_INCLUDE {
            assert!(!is_system_table(name), "{name} should be visible");
        }
    }

    #[test]
    fn explicit_exclusions_and_pg_prefixes_are_hidden() {
        assert!(is_system_table("sql_history"));
        assert!(is_system_table("pg_stat_activity"));
        assert!(is_system_table("_sqlx_migrations"));
    }

    #[test]
    fn ordinary_user_tables_are_visible() {
        assert!(!is_system_table("orders"));
        assert!(!is_system_table("customer_notes"));
    }
}

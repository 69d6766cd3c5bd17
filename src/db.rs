use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Opens the connection pool and verifies that the expected schema has
/// already been provisioned.
///
/// There is no migrations framework here — the schema (tables, triggers,
/// stored procedures) is assumed to exist before this process starts, the
/// same contract the original data service's `init_db()` enforces via an
/// `information_schema` probe. Each request acquires one connection from
/// this pool for the duration of the request and releases it on
/// completion; an external pooler (e.g. PgBouncer) is expected to sit in
/// front of Postgres and absorb connection churn — this pool's
/// `max_connections` only bounds how many requests this process can have
/// in flight against the database at once.
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    verify_schema(&pool).await?;

    Ok(pool)
}

async fn verify_schema(pool: &PgPool) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = 'system_config'
        )",
    )
    .fetch_one(pool)
    .await
    .context("failed to query information_schema")?;

    if !exists {
        anyhow::bail!(
            "database schema is not provisioned: table 'system_config' is missing. \
             Run the init scripts before starting the gateway."
        );
    }

    Ok(())
}

pub async fn close_db(pool: &PgPool) {
    pool.close().await;
}

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::Config;

/// The only process-wide mutable state, per the concurrency model: the DB
/// pool handle and the shared storage/functions HTTP client. The backup
/// scheduler's handle lives in its own spawned task (see `backup::spawn_scheduler`).
/// Everything here has explicit lifecycle tied to process bootstrap/shutdown
/// rather than being constructed lazily behind a `OnceCell`, so tests can
/// build an `AppState` deterministically.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    /// Shared client for the streaming storage proxy and the function
    /// runtime's HTTP contract. One client per process gives connection
    /// pooling and keep-alive across every outbound call; timeouts are
    /// tuned for multi-gigabyte streams (connect 5s, read/write 300s per
    /// chunk).
    pub http_client: reqwest::Client,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let pool = crate::db::init_db(&config.database_url, config.db_max_connections).await?;

        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.storage_max_keepalive)
            .connect_timeout(config.storage_connect_timeout)
            .timeout(
                config
                    .storage_read_timeout
                    .max(config.storage_write_timeout)
                    + Duration::from_secs(5),
            )
            .build()?;

        Ok(Arc::new(Self {
            config,
            pool,
            http_client,
        }))
    }

    pub async fn close(&self) {
        crate::db::close_db(&self.pool).await;
    }
}

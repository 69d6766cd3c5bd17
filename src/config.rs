use std::time::Duration;

/// Process-wide configuration, loaded once at startup and failing fast on
/// anything missing. There is no fallback for required settings in release
/// builds: a gateway that silently starts with a default secret key is a
/// worse outcome than one that refuses to start.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,

    /// Discrete Postgres connection parameters, used only by the backup
    /// scheduler to shell out to `pg_dump`/`psql` directly (those tools
    /// take connection flags, not a single DSN).
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,

    pub backup_dir: String,
    pub storage_data_path: String,

    pub secret_key: String,
    pub algorithm: jsonwebtoken::Algorithm,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,

    pub api_key: String,

    pub cors_origins: Vec<String>,

    pub app_name: String,
    pub app_description: String,
    pub app_version: String,

    pub storage_host: String,
    pub storage_internal_port: u16,
    pub storage_max_connections: usize,
    pub storage_max_keepalive: usize,
    pub storage_connect_timeout: Duration,
    pub storage_read_timeout: Duration,
    pub storage_write_timeout: Duration,
    pub storage_pool_timeout: Duration,

    pub functions_host: String,
    pub functions_internal_port: u16,

    pub realtime_internal_port: u16,

    pub backup_retention_days: i64,
    pub backup_schedule_cron: String,

    pub port: u16,
}

fn required(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        panic!("FATAL: required environment variable {name} is not set");
    })
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        // Dev fallback only for the two secrets that would otherwise make
        // local iteration impossible without a .env file; both are loud
        // warnings and both panic outright in release builds, matching the
        // teacher's NEURAL_TOKEN loading pattern in `state.rs`.
        let secret_key = std::env::var("SECRET_KEY").unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                tracing::warn!("SECRET_KEY not set. Using an insecure dev key. DO NOT deploy without setting this variable.");
                "dev-only-insecure-secret-key".to_string()
            } else {
                panic!("FATAL: SECRET_KEY environment variable is not set.");
            }
        });

        let api_key = std::env::var("API_KEY").unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                tracing::warn!("API_KEY not set. Using an insecure dev key. DO NOT deploy without setting this variable.");
                "dev-only-insecure-api-key".to_string()
            } else {
                panic!("FATAL: API_KEY environment variable is not set.");
            }
        });

        let algorithm_str = optional("ALGORITHM", "HS256");
        let algorithm = match algorithm_str.as_str() {
            "HS256" => jsonwebtoken::Algorithm::HS256,
            "HS384" => jsonwebtoken::Algorithm::HS384,
            "HS512" => jsonwebtoken::Algorithm::HS512,
            other => panic!("FATAL: unsupported ALGORITHM '{other}', expected HS256/HS384/HS512"),
        };

        let cors_origins = required("CORS_ORIGINS")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url: required("DATABASE_URL"),
            db_max_connections: optional_parsed("DB_MAX_CONNECTIONS", 50),

            postgres_host: required("POSTGRES_HOST"),
            postgres_port: optional_parsed("POSTGRES_PORT", 5432),
            postgres_user: required("POSTGRES_USER"),
            postgres_password: required("POSTGRES_PASSWORD"),
            postgres_db: required("POSTGRES_DB"),

            backup_dir: optional("BACKUP_DIR", "/backups"),
            storage_data_path: optional("STORAGE_DATA_PATH", "/storage_data"),

            secret_key,
            algorithm,
            access_token_expire_minutes: required("ACCESS_TOKEN_EXPIRE_MINUTES")
                .parse()
                .expect("ACCESS_TOKEN_EXPIRE_MINUTES must be an integer"),
            refresh_token_expire_days: optional_parsed("REFRESH_TOKEN_EXPIRE_DAYS", 30),

            api_key,
            cors_origins,

            app_name: required("APP_NAME"),
            app_description: required("APP_DESCRIPTION"),
            app_version: required("APP_VERSION"),

            storage_host: required("STORAGE_HOST"),
            storage_internal_port: required("STORAGE_INTERNAL_PORT")
                .parse()
                .expect("STORAGE_INTERNAL_PORT must be a port number"),
            storage_max_connections: optional_parsed("STORAGE_MAX_CONNECTIONS", 100),
            storage_max_keepalive: optional_parsed("STORAGE_MAX_KEEPALIVE", 20),
            storage_connect_timeout: Duration::from_secs_f64(optional_parsed("STORAGE_CONNECT_TIMEOUT", 5.0)),
            storage_read_timeout: Duration::from_secs_f64(optional_parsed("STORAGE_READ_TIMEOUT", 300.0)),
            storage_write_timeout: Duration::from_secs_f64(optional_parsed("STORAGE_WRITE_TIMEOUT", 300.0)),
            storage_pool_timeout: Duration::from_secs_f64(optional_parsed("STORAGE_POOL_TIMEOUT", 5.0)),

            functions_host: required("FUNCTIONS_HOST"),
            functions_internal_port: required("FUNCTIONS_INTERNAL_PORT")
                .parse()
                .expect("FUNCTIONS_INTERNAL_PORT must be a port number"),

            realtime_internal_port: required("REALTIME_INTERNAL_PORT")
                .parse()
                .expect("REALTIME_INTERNAL_PORT must be a port number"),

            backup_retention_days: optional_parsed("BACKUP_RETENTION_DAYS", 30),
            backup_schedule_cron: optional("BACKUP_SCHEDULE_CRON", "0 3 * * *"),

            port: optional_parsed("PORT", 8000),
        }
    }

    pub fn storage_base_url(&self) -> String {
        format!("http://{}:{}/api/v1", self.storage_host, self.storage_internal_port)
    }

    pub fn functions_base_url(&self) -> String {
        format!("http://{}:{}", self.functions_host, self.functions_internal_port)
    }

    pub fn realtime_ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.realtime_internal_port)
    }
}

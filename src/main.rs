use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod backup;
mod config;
mod db;
mod error;
mod functions_client;
mod middleware;
mod models;
mod pagination;
mod routes;
mod state;
mod storage_client;
mod tables_engine;
mod validation;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if dotenvy::dotenv().is_err() {
        tracing::warn!("no .env file found, relying on process environment");
    }

    let config = Config::from_env();
    let cors = build_cors(&config.cors_origins);
    let port = config.port;
    let state = AppState::new(config).await?;

    backup::spawn_scheduler(state.clone());

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/users/", post(routes::users::register))
        .route("/users/token", post(routes::users::login))
        .route("/users/token/refresh", post(routes::users::refresh))
        .route("/webhooks/trigger/:token", post(routes::webhooks::trigger))
        .route("/backups/restore", post(routes::backups::restore))
        .route("/backups/restore", get(routes::backups::restore_method_not_allowed))
        .route("/functions/:name/execution-result", post(routes::functions::execution_result))
        .route("/realtime/socket", get(routes::realtime::socket))
        .route("/system/status", get(routes::system::get_status));

    let authenticated_routes = Router::new()
        .route("/users/me", get(routes::users::me))
        .route("/users/logout", post(routes::users::logout))
        .route("/users/logout/all", post(routes::users::logout_all))
        .route("/users/count", get(routes::users::count))
        .route("/users/", get(routes::users::list))
        .route("/users/:id", get(routes::users::get_one))
        .route("/users/:id", patch(routes::users::update))
        .route("/users/:id", delete(routes::users::delete))
        // Tables registry and dynamic table engine.
        .route("/tables/count", get(routes::tables::count))
        .route("/tables/", get(routes::tables::list))
        .route("/tables/", post(routes::tables::create))
        .route("/tables/:id", get(routes::tables::get_one))
        .route("/tables/:id", patch(routes::tables::update))
        .route("/tables/:id", delete(routes::tables::delete))
        .route("/tables/:id/columns", post(routes::tables::add_column))
        .route("/tables/:id/columns/:column", patch(routes::tables::update_column))
        .route("/tables/:id/columns/:column", delete(routes::tables::delete_column))
        .route("/tables/:id/data", get(routes::tables::list_data))
        .route("/tables/:id/data", post(routes::tables::insert_row))
        .route("/tables/:id/data/:row_id", patch(routes::tables::update_row))
        .route("/tables/:id/data/:row_id", delete(routes::tables::delete_row))
        // SQL console.
        .route("/sql/query", post(routes::sql::execute))
        .route("/sql/history", get(routes::sql::history))
        .route("/sql/history", delete(routes::sql::clear_history))
        .route("/sql/snippets", get(routes::sql::list_snippets))
        .route("/sql/snippets", post(routes::sql::create_snippet))
        .route("/sql/snippets/:id", delete(routes::sql::delete_snippet))
        // Storage: buckets and files.
        .route("/storage/buckets/count", get(routes::storage::bucket_count))
        .route("/storage/buckets", get(routes::storage::list_buckets))
        .route("/storage/buckets", post(routes::storage::create_bucket))
        .route("/storage/buckets/:id", get(routes::storage::get_bucket))
        .route("/storage/buckets/:id", patch(routes::storage::update_bucket))
        .route("/storage/buckets/:id", delete(routes::storage::delete_bucket))
        .route("/storage/buckets/:id/files/count", get(routes::storage::bucket_file_count))
        .route("/storage/stats", get(routes::storage::storage_stats))
        .route("/storage/files", get(routes::storage::list_files))
        .route("/storage/files/upload", post(routes::storage::upload_file))
        .route("/storage/files/:id", get(routes::storage::get_file_metadata))
        .route("/storage/files/:id", patch(routes::storage::update_file_metadata))
        .route("/storage/files/:id", delete(routes::storage::delete_file))
        .route("/storage/files/download/:bucket_name/*path", get(routes::storage::download_file))
        // Functions and webhooks.
        .route("/functions/count", get(routes::functions::count))
        .route("/functions", get(routes::functions::list))
        .route("/functions", post(routes::functions::create))
        .route("/functions/:id", get(routes::functions::get_one))
        .route("/functions/:id", patch(routes::functions::update))
        .route("/functions/:id", delete(routes::functions::delete))
        .route("/functions/:id/deploy", post(routes::functions::deploy))
        .route("/functions/:id/env-vars", patch(routes::functions::update_env_vars))
        .route("/functions/:id/executions", get(routes::functions::list_executions))
        .route("/functions/:id/logs", get(routes::functions::list_logs))
        .route("/webhooks", get(routes::webhooks::list))
        .route("/webhooks", post(routes::webhooks::create))
        .route("/webhooks/:id", get(routes::webhooks::get_one))
        .route("/webhooks/:id", patch(routes::webhooks::update))
        .route("/webhooks/:id", delete(routes::webhooks::delete))
        .route("/webhooks/:id/regenerate-token", post(routes::webhooks::regenerate_token))
        .route("/webhooks/:id/deliveries", get(routes::webhooks::list_deliveries))
        .route("/webhooks/deliveries/:id", get(routes::webhooks::get_delivery))
        .route("/webhooks/deliveries/:id/retry", post(routes::webhooks::retry_delivery))
        // Backups (admin only, enforced by the AdminUser extractor).
        .route("/backups", get(routes::backups::list))
        .route("/backups", post(routes::backups::create))
        .route("/backups/:filename", get(routes::backups::download))
        .route("/backups/:filename", delete(routes::backups::delete))
        // Schema introspection/visualization.
        .route("/schema/tables", get(routes::schema::list_tables))
        .route("/schema/visualization", get(routes::schema::visualization));

    let app = Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), middleware::api_key::require_api_key))
        .with_state(state.clone())
        .layer(cors);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.close().await;
    Ok(())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        tracing::warn!("CORS: no origins configured, defaulting to permissive (dev mode)");
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let allowed: Vec<_> = origins.iter().filter_map(|s| s.parse().ok()).collect();
    if allowed.is_empty() {
        tracing::warn!("CORS: configured origins did not parse, defaulting to permissive");
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

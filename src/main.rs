//! MD Wiki Backend
//!
//! A versioned Markdown wiki over SQLite: per-document commit history,
//! title/tag metadata, view and update activity, and substring search.

mod api;
mod config;
mod db;
mod engine;
mod errors;
mod models;
mod search;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use engine::WikiEngine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WikiEngine>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MD Wiki Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Initialize database and engine; the search index is rebuilt from current heads
    let pool = db::init_database(&config.db_path).await?;
    let engine = Arc::new(WikiEngine::open(pool, config.engine_options()).await?);

    let state = AppState {
        engine,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Documents
        .route(
            "/documents",
            get(api::list_documents).post(api::create_document),
        )
        .route("/documents/search", get(api::search_documents))
        .route(
            "/documents/{filename}",
            get(api::get_document)
                .put(api::write_document)
                .post(api::write_document)
                .delete(api::delete_document),
        )
        .route("/documents/history/{filename}", get(api::get_history))
        .route("/documents/{filename}/history", get(api::get_history))
        .route(
            "/documents/version/{filename}/{commit_id}",
            get(api::get_version),
        )
        .route(
            "/documents/{filename}/metadata",
            get(api::get_metadata)
                .put(api::set_metadata)
                .post(api::set_metadata),
        )
        // Wiki paths resolve to the same operations
        .route("/wiki", get(api::list_documents))
        .route("/wiki/search", get(api::search_documents))
        .route(
            "/wiki/{filename}",
            get(api::get_document).post(api::write_document),
        )
        .route("/wiki/history/{filename}", get(api::get_history))
        .route("/wiki/version/{filename}/{commit_id}", get(api::get_version))
        .route("/wiki/{filename}/version/{commit_id}", get(api::get_version))
        // Metadata and tags
        .route(
            "/metadata/{filename}",
            get(api::get_metadata).put(api::set_metadata),
        )
        .route("/tags", get(api::list_tags))
        .route("/tags/search", get(api::search_by_tag))
        .route("/tags/{tag}", get(api::documents_by_tag))
        // Activity and search
        .route("/recent", get(api::recent_documents))
        .route("/search", get(api::search_documents))
        .route("/health", get(health_check));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

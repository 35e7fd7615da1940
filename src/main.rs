//! Payout Tracker - Main Application Entry Point
//!
//! A REST API server that tracks prop-trading firm payouts on-chain. It
//! reads each firm's wallet history from a block explorer, keeps the
//! outgoing stablecoin payouts, aggregates them into statistics, and flags
//! incidents from payout behaviour and classified reviews.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Explorer**: Etherscan-compatible API via reqwest, with backoff
//! - **Authentication**: API key with SHA-256 hashing (admin and webhook routes)
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build the explorer client and shared state
//! 4. Spawn the sync scheduler (unless disabled)
//! 5. Build HTTP router and start serving

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod scheduler;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    services::{classifier::KeywordClassifier, explorer::EtherscanClient},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let explorer = EtherscanClient::new(
        &config.explorer_base_url,
        &config.explorer_api_key,
        Duration::from_secs(config.explorer_timeout_secs),
    )?;

    let sync_interval = config.sync_interval();
    let server_port = config.server_port;
    let state = AppState::new(pool, config, Arc::new(explorer), Arc::new(KeywordClassifier));

    match sync_interval {
        Some(period) => {
            scheduler::spawn(state.clone(), period);
        }
        None => tracing::info!("Scheduled sync disabled"),
    }

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble public and authenticated routes.
fn build_router(state: AppState) -> Router {
    // Routes behind the API key middleware
    let authenticated_routes = Router::new()
        .route("/api/v1/admin/firms", post(handlers::admin::create_firm))
        .route("/api/v1/admin/sync", post(handlers::admin::sync_all))
        .route(
            "/api/v1/admin/firms/{slug}/sync",
            post(handlers::admin::sync_firm),
        )
        .route(
            "/api/v1/admin/firms/{slug}/reviews",
            post(handlers::admin::ingest_reviews),
        )
        .route(
            "/api/v1/admin/firms/{slug}/incidents/detect",
            post(handlers::admin::detect_incidents),
        )
        .route(
            "/api/v1/webhooks",
            post(handlers::webhooks::create_webhook).get(handlers::webhooks::list_webhooks),
        )
        .route(
            "/api/v1/webhooks/{id}",
            delete(handlers::webhooks::delete_webhook),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Read-only routes used by the frontend
    let public_routes = Router::new()
        .route("/api/v1/firms", get(handlers::firms::list_firms))
        .route("/api/v1/firms/{slug}", get(handlers::firms::get_firm))
        .route(
            "/api/v1/firms/{slug}/payouts",
            get(handlers::firms::list_payouts),
        )
        .route("/api/v1/firms/{slug}/stats", get(handlers::firms::get_stats))
        .route(
            "/api/v1/firms/{slug}/reviews",
            get(handlers::firms::list_reviews),
        )
        .route(
            "/api/v1/firms/{slug}/incidents",
            get(handlers::firms::list_incidents),
        )
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    /// Only routes that reject before touching the database can be exercised.
    fn offline_state() -> AppState {
        let explorer = EtherscanClient::new(
            "http://127.0.0.1:1/api",
            "test",
            Duration::from_secs(1),
        )
        .unwrap();

        state::offline_state(Arc::new(explorer))
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        build_router(offline_state())
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn admin_routes_require_api_key() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/admin/sync")
            .body(Body::empty())
            .unwrap();

        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_authorization_is_rejected() {
        let request = Request::builder()
            .method("GET")
            .uri("/api/v1/webhooks")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();

        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let request = Request::builder()
            .uri("/api/v1/nothing-here")
            .body(Body::empty())
            .unwrap();

        assert_eq!(status_of(request).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/firms")
            .body(Body::empty())
            .unwrap();

        assert_eq!(status_of(request).await, StatusCode::METHOD_NOT_ALLOWED);
    }
}

//! FlightLens REST API
//!
//! HTTP API layer for FlightLens, built with Axum. Every route is served both
//! at the root and under `/api`.
//!
//! # Endpoints
//!
//! ## Upload
//! - `POST /upload_chunk` - One chunk of a chunked upload
//! - `POST /analyze` - A whole log in one request
//!
//! ## Query (all take `?token=`)
//! - `GET /timeseries` - One field of one message type
//! - `GET /download` - One message type as CSV
//! - `GET /stats` - Record totals and time span
//! - `GET /params` - Final parameter values
//! - `GET /dump` - First N raw records of a type
//! - `GET /flight_modes` - Flight mode segments
//! - `GET /messages` - Message types and numeric fields
//!
//! ## Profiles
//! - `POST /profiles`, `GET /profiles` - Create, list
//! - `GET /profiles/:id`, `DELETE /profiles/:id` - Fetch, cascade delete
//! - `GET /profiles/:id/analyses` - Saved analyses
//! - `POST /profiles/:id/graphs`, `GET /profiles/:id/graphs` - Saved graphs
//! - `DELETE /graphs/:id` - Delete a saved graph
//! - `GET /analyses/:token` - Saved analysis for a session
//!
//! ## Health
//! - `GET /health` - Server status
//! - `GET /ping` - Liveness
//!
//! # Example
//!
//! ```rust,no_run
//! use flightlens::api::{serve, AppState};
//! use flightlens::config::Config;
//! use flightlens::persistence::open_store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let profiles = open_store(&config.persistence);
//!
//!     let state = AppState::new(&config, profiles);
//!     serve(state, &config.api).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Upload routes
        .route("/upload_chunk", post(routes::upload::upload_chunk))
        .route("/analyze", post(routes::upload::analyze))
        // Query routes
        .route("/timeseries", get(routes::query::timeseries))
        .route("/download", get(routes::export::download))
        .route("/stats", get(routes::query::stats))
        .route("/params", get(routes::query::params))
        .route("/dump", get(routes::query::dump))
        .route("/flight_modes", get(routes::query::flight_modes))
        .route("/messages", get(routes::query::messages))
        // Profile routes
        .route(
            "/profiles",
            post(routes::profiles::create_profile).get(routes::profiles::list_profiles),
        )
        .route(
            "/profiles/:id",
            get(routes::profiles::get_profile).delete(routes::profiles::delete_profile),
        )
        .route("/profiles/:id/analyses", get(routes::profiles::list_analyses))
        .route(
            "/profiles/:id/graphs",
            post(routes::profiles::save_graph).get(routes::profiles::list_graphs),
        )
        .route("/graphs/:id", delete(routes::profiles::delete_graph))
        .route("/analyses/:token", get(routes::profiles::analysis_by_token))
        // Health routes
        .route("/health", get(routes::health::health))
        .route("/ping", get(routes::health::ping))
}

/// Reject requests whose declared length is over the limit before any body
/// bytes are read
async fn reject_oversized(
    State(config): State<Arc<ApiConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if declared.is_some_and(|len| len > config.max_body_size) {
        return ApiError::PayloadTooLarge(config.max_body_mb()).into_response();
    }
    next.run(request).await
}

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    let shared_state = Arc::new(state);

    Router::new()
        .merge(api_routes())
        .nest("/api", api_routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&config),
            reject_oversized,
        ))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(max_body_mb = config.max_body_mb(), "FlightLens API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("FlightLens API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // The map client is served from another origin during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Inputs
        .route("/population", post(handlers::load_population))
        .route("/targets", get(handlers::list_targets))
        .route("/targets", post(handlers::create_target))
        .route("/targets/{target_id}", delete(handlers::delete_target))
        // Parameters
        .route("/selection", put(handlers::update_selection))
        .route("/distribution", put(handlers::update_distribution))
        // Results
        .route("/aggregation", get(handlers::get_aggregation))
        .route("/aggregation/refresh", post(handlers::refresh_aggregation))
        .route("/aggregation/stream", get(handlers::stream_aggregation))
        .route("/batches/{generation}", get(handlers::get_batch));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        // Population uploads can be large.
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

//! Route configuration.

use crate::handlers;
use crate::identity::trace_context_middleware;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Streaming uploads enforce their own limits while hashing
    let upload_routes = Router::new()
        .route("/upload", post(handlers::upload_file))
        .route("/upload/chunk", post(handlers::upload_chunk))
        .layer(DefaultBodyLimit::disable());

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/upload/init", post(handlers::init_upload))
        .route("/upload/complete", post(handlers::complete_upload))
        .route("/download", get(handlers::download_by_query))
        .route("/download/{id}", get(handlers::download_file))
        .route("/files/{id}", get(handlers::get_file))
        .route("/delete/{id}", delete(handlers::delete_file));

    let mut router = Router::new().merge(upload_routes).merge(api_routes);

    // When enabled, restrict /metrics to the scraper's network.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

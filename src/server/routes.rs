//! Router configuration for the web server.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Dashboard metadata
        .route("/api/stats", get(handlers::stats))
        .route("/api/filters/options", get(handlers::project_filter_options))
        .route("/api/cig/filters/options", get(handlers::procurement_filter_options))
        // Projects
        .route("/api/projects", get(handlers::search_projects))
        .route("/api/projects/:cup", get(handlers::project_detail))
        .route("/api/projects/:cup/cig", get(handlers::project_procurements))
        .route("/api/aggregations/:field", get(handlers::project_aggregation))
        .route("/api/export", get(handlers::export_projects))
        // Procurements; the static segments win over `:cig`.
        .route("/api/cig/search", get(handlers::search_procurements))
        .route("/api/cig/export", get(handlers::export_procurements))
        .route(
            "/api/cig/aggregations/:field",
            get(handlers::procurement_aggregation),
        )
        .route("/api/cig/:cig", get(handlers::procurement_detail))
        .route("/api/cig/:cig/cup", get(handlers::procurement_projects))
        .route("/api/cig/:cig/aggiudicatari", get(handlers::procurement_awardees))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

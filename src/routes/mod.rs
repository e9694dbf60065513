// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: Router assembly, guard composition and middleware
// - auth.rs: Auth passthroughs and identity endpoints
// - videos.rs: Video service passthroughs, uploads and streamed downloads
// - health.rs: Health, readiness and metrics endpoints
// - extractors.rs: Authentication guard and AuthenticatedUser extractor
// - middleware.rs: Request id, request logging, instrumentation, panics
//
// ============================================================================

mod auth;
pub mod extractors;
mod health;
pub mod middleware;
mod videos;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::context::AppContext;

/// Create the gateway router with all routes
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    let upload_limit = DefaultBodyLimit::max(app_context.config.max_upload_bytes);

    // Health, metrics and credential-issuing endpoints skip the guard
    let public = Router::new()
        .route("/", get(health::health_check))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh));

    // Everything below requires a verified identity
    let protected = Router::new()
        .route("/auth/profile", get(auth::profile))
        .route("/auth/verify", get(auth::verify))
        .route("/videos", get(videos::list))
        .route(
            "/videos/upload",
            post(videos::upload).layer(upload_limit.clone()),
        )
        .route(
            "/videos/upload-single",
            post(videos::upload_single).layer(upload_limit),
        )
        .route("/videos/download/:filename", get(videos::download))
        .route("/videos/status", get(videos::status))
        .route("/videos/queue/stats", get(videos::queue_stats))
        .route_layer(axum::middleware::from_fn_with_state(
            app_context.clone(),
            extractors::require_identity,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        // Apply middleware (ServiceBuilder order: first listed runs first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::propagate_request_id))
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(axum::middleware::from_fn_with_state(
                    app_context.clone(),
                    middleware::instrument_requests,
                ))
                .layer(CatchPanicLayer::custom(middleware::handle_panic))
                .into_inner(),
        )
        .with_state(app_context)
}

// ============================================================================
// Auth Routes
// ============================================================================
//
// Endpoints:
// - POST /auth/register - Forwarded to the auth service
// - POST /auth/login    - Forwarded to the auth service
// - POST /auth/refresh  - Forwarded to the auth service
// - GET  /auth/profile  - Identity verified by the guard
// - GET  /auth/verify   - `{valid, user}` built from the guard's identity
//
// ============================================================================

use axum::{extract::State, response::Response, Json};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::gateway::{Backend, Forwarded};
use crate::metrics::AuthOutcome;
use crate::routes::extractors::AuthenticatedUser;
use crate::routes::middleware::RequestId;

/// POST /auth/register
pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    request_id: RequestId,
    body: Bytes,
) -> AppResult<Response> {
    forward(&ctx, "register", "/auth/register", &request_id, body).await
}

/// POST /auth/login
pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    request_id: RequestId,
    body: Bytes,
) -> AppResult<Response> {
    forward(&ctx, "login", "/auth/login", &request_id, body).await
}

/// POST /auth/refresh
pub async fn refresh(
    State(ctx): State<Arc<AppContext>>,
    request_id: RequestId,
    body: Bytes,
) -> AppResult<Response> {
    forward(&ctx, "refresh", "/auth/refresh", &request_id, body).await
}

/// Relay a JSON body to the auth service and its answer back, both unchanged
async fn forward(
    ctx: &AppContext,
    operation: &str,
    path: &str,
    request_id: &RequestId,
    body: Bytes,
) -> AppResult<Response> {
    ctx.metrics
        .record_business_operation(operation, Backend::Auth.name());

    let relayed = ctx
        .service_client
        .post_json(
            Backend::Auth,
            path,
            body,
            Forwarded {
                user_id: None,
                request_id: Some(request_id.as_str()),
            },
        )
        .await;

    let success = matches!(&relayed, Ok(r) if r.is_success());
    ctx.metrics
        .record_auth_operation(operation, AuthOutcome::from_success(success));

    relayed?.into_result()
}

/// GET /auth/profile
pub async fn profile(AuthenticatedUser(identity): AuthenticatedUser) -> Json<Value> {
    Json(identity.payload)
}

/// GET /auth/verify
pub async fn verify(AuthenticatedUser(identity): AuthenticatedUser) -> Json<Value> {
    Json(json!({
        "valid": true,
        "user": identity.payload,
    }))
}

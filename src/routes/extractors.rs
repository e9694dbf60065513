// ============================================================================
// Authentication Guard & Extractors
// ============================================================================
//
// - require_identity: route layer for protected routes. Verifies the bearer
//   token with the auth service on every request (no caching) and attaches
//   the normalized VerifiedIdentity to the request before the handler runs.
// - AuthenticatedUser: handler-side extractor for that identity.
//
// ============================================================================

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::context::AppContext;
use crate::error::AppError;
use crate::identity::VerifiedIdentity;
use crate::metrics::AuthOutcome;
use crate::routes::middleware::RequestId;

const VERIFY_OPERATION: &str = "verify";

/// Extract the token from `Authorization: Bearer <token>`.
///
/// Missing header, another scheme or an empty token all fail the same way.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::TokenMissing)?;

    let (scheme, token) = auth_header
        .trim()
        .split_once(' ')
        .ok_or(AppError::TokenMissing)?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AppError::TokenMissing);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::TokenMissing);
    }
    Ok(token)
}

/// Authentication guard for protected routes
pub async fn require_identity(
    State(ctx): State<Arc<AppContext>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match bearer_token(req.headers()) {
        Ok(token) => token.to_string(),
        Err(e) => {
            tracing::debug!(path = %req.uri().path(), "Missing or malformed Authorization header");
            ctx.metrics
                .record_auth_operation(VERIFY_OPERATION, AuthOutcome::Failure);
            return Err(e);
        }
    };

    let request_id = req.extensions().get::<RequestId>().cloned();
    let verified = ctx
        .service_client
        .verify_token(&token, request_id.as_ref().map(RequestId::as_str))
        .await
        .and_then(VerifiedIdentity::from_payload);

    ctx.metrics
        .record_auth_operation(VERIFY_OPERATION, AuthOutcome::from_success(verified.is_ok()));

    let identity = verified?;
    tracing::debug!(user_id = ?identity.user_id, path = %req.uri().path(), "Request authenticated");

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Extractor for the identity attached by `require_identity`
///
/// Usage:
/// ```rust,ignore
/// async fn handler(AuthenticatedUser(identity): AuthenticatedUser) -> ... {
///     let user_id = identity.require_user_id()?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub VerifiedIdentity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only reachable without an identity if a handler was mounted unguarded
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AppError::TokenMissing)
    }
}

// ============================================================================
// Axum Middleware
// ============================================================================
//
// Middleware for request processing:
// - propagate_request_id: Accept or mint X-Request-Id, echo it on the response
// - request_logging: Log all incoming requests
// - instrument_requests: Request metrics (count, duration, in-flight, errors)
// - handle_panic: Turn handler panics into a 500 the metrics still see
//
// ============================================================================

use axum::{
    async_trait,
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::{request::Parts, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::any::Any;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::ErrorKind;
use crate::gateway::service_client::HEADER_REQUEST_ID;
use crate::metrics::GatewayMetrics;

/// Trace id for one inbound request, forwarded to every backend call
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| RequestId(Uuid::new_v4().to_string())))
    }
}

/// Accept a client-supplied X-Request-Id or generate one
pub async fn propagate_request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(HEADER_REQUEST_ID), value);
    }
    response
}

/// Request logging middleware
pub async fn request_logging(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    tracing::debug!(
        method = %method,
        path = %path,
        request_id = %request_id,
        "Incoming request"
    );

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        request_id = %request_id,
        status = %response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// One request's metrics lifetime.
///
/// Created when the request enters, finished once with the final status. If
/// the request future is dropped first (client disconnect), `Drop` writes the
/// terminal record instead, so every request is counted exactly once.
struct RequestRecord {
    metrics: Arc<GatewayMetrics>,
    method: String,
    route: String,
    started: Instant,
    finished: bool,
}

/// Status label for requests abandoned by the client
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl RequestRecord {
    fn start(metrics: Arc<GatewayMetrics>, method: String, route: String) -> Self {
        metrics.http_requests_in_flight.inc();
        Self {
            metrics,
            method,
            route,
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self, status: StatusCode, error_kind: Option<ErrorKind>) {
        self.write(status.as_u16(), error_kind);
    }

    fn write(&mut self, status: u16, error_kind: Option<ErrorKind>) {
        self.finished = true;
        self.metrics
            .record_request(&self.method, &self.route, status, self.started.elapsed());
        if let Some(kind) = error_kind {
            self.metrics.record_error(kind.0, &self.method, &self.route);
        }
    }
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        if !self.finished {
            self.write(CLIENT_CLOSED_REQUEST, Some(ErrorKind::CANCELLED));
        }
        self.metrics.http_requests_in_flight.dec();
    }
}

/// Error kind for a finished response; any 4xx/5xx counts as an error
fn response_error_kind(response: &Response) -> Option<ErrorKind> {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return None;
    }
    Some(
        response
            .extensions()
            .get::<ErrorKind>()
            .copied()
            .unwrap_or(ErrorKind("HttpError")),
    )
}

/// Request instrumentation middleware
pub async fn instrument_requests(
    State(ctx): State<Arc<AppContext>>,
    matched_path: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let route = ctx.metrics.resolve_route(
        matched_path.as_ref().map(MatchedPath::as_str),
        req.uri().path(),
        &req.uri().to_string(),
    );

    let record = RequestRecord::start(ctx.metrics.clone(), method, route);
    let response = next.run(req).await;
    record.finish(response.status(), response_error_kind(&response));

    response
}

/// Panic handler for `CatchPanicLayer`
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");

    let body = json!({
        "error": "Internal server error",
        "error_code": "INTERNAL_ERROR",
        "status": 500,
    });
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
    response.extensions_mut().insert(ErrorKind::PANIC);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_record_counts_as_cancelled() {
        let metrics = Arc::new(GatewayMetrics::new().unwrap());
        let record = RequestRecord::start(metrics.clone(), "GET".into(), "/videos".into());
        assert_eq!(metrics.http_requests_in_flight.get(), 1);
        drop(record);

        assert_eq!(metrics.http_requests_in_flight.get(), 0);
        assert_eq!(
            metrics
                .http_requests_total
                .with_label_values(&["GET", "/videos", "499"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .http_errors_total
                .with_label_values(&["Cancelled", "GET", "/videos"])
                .get(),
            1
        );
    }

    #[test]
    fn finished_record_is_written_once() {
        let metrics = Arc::new(GatewayMetrics::new().unwrap());
        let record = RequestRecord::start(metrics.clone(), "GET".into(), "/health".into());
        record.finish(StatusCode::OK, None);

        assert_eq!(metrics.http_requests_in_flight.get(), 0);
        assert_eq!(
            metrics
                .http_requests_total
                .with_label_values(&["GET", "/health", "200"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .http_requests_total
                .with_label_values(&["GET", "/health", "499"])
                .get(),
            0
        );
    }

    #[test]
    fn error_kind_falls_back_for_plain_rejections() {
        let response = StatusCode::NOT_FOUND.into_response();
        assert_eq!(response_error_kind(&response), Some(ErrorKind("HttpError")));

        let response = StatusCode::OK.into_response();
        assert_eq!(response_error_kind(&response), None);
    }

    #[test]
    fn panic_response_is_tagged() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<ErrorKind>(),
            Some(&ErrorKind::PANIC)
        );
    }
}

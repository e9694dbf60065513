// ============================================================================
// Video Routes
// ============================================================================
//
// Endpoints (all behind the authentication guard, X-User-Id injected):
// - POST /videos/upload              - 1..3 files, queued processing
// - POST /videos/upload-single       - exactly 1 file, immediate processing
// - GET  /videos                     - list the caller's videos
// - GET  /videos/download/:filename  - streamed ZIP
// - GET  /videos/status              - processing + queue status
// - GET  /videos/queue/stats         - queue statistics
//
// ============================================================================

use axum::{
    body::Body,
    extract::{Multipart, Path, RawQuery, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use std::sync::Arc;

use crate::config::MAX_FILES_PER_UPLOAD;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::gateway::{Backend, Forwarded};
use crate::routes::extractors::AuthenticatedUser;
use crate::routes::middleware::RequestId;
use crate::upload::UploadBundle;

/// Form field carrying the files of a bulk upload
pub const UPLOAD_FIELD: &str = "videos";
/// Form field carrying the file of a single upload
pub const UPLOAD_SINGLE_FIELD: &str = "video";

/// Outbound context for a call on the caller's own resources.
///
/// Resolved before any other work so a token without a subject never
/// reaches the video service.
fn forwarded<'a>(
    user: &'a AuthenticatedUser,
    request_id: &'a RequestId,
) -> AppResult<Forwarded<'a>> {
    Ok(Forwarded {
        user_id: Some(user.0.require_user_id()?),
        request_id: Some(request_id.as_str()),
    })
}

/// POST /videos/upload
pub async fn upload(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    request_id: RequestId,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let forwarded = forwarded(&user, &request_id)?;
    let bundle =
        UploadBundle::from_multipart(&mut multipart, UPLOAD_FIELD, MAX_FILES_PER_UPLOAD).await?;

    tracing::info!(
        user_id = ?forwarded.user_id,
        files = bundle.file_count(),
        total_bytes = bundle.total_bytes(),
        "Forwarding bulk upload"
    );
    ctx.metrics
        .record_business_operation("upload", Backend::Video.name());

    ctx.service_client
        .upload(
            "/api/v1/videos/upload",
            UPLOAD_FIELD,
            bundle,
            forwarded,
        )
        .await?
        .into_result()
}

/// POST /videos/upload-single
pub async fn upload_single(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    request_id: RequestId,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let forwarded = forwarded(&user, &request_id)?;
    let bundle = UploadBundle::from_multipart(&mut multipart, UPLOAD_SINGLE_FIELD, 1).await?;

    tracing::info!(
        user_id = ?forwarded.user_id,
        total_bytes = bundle.total_bytes(),
        "Forwarding single upload"
    );
    ctx.metrics
        .record_business_operation("upload_single", Backend::Video.name());

    ctx.service_client
        .upload(
            "/api/v1/videos/upload-single",
            UPLOAD_SINGLE_FIELD,
            bundle,
            forwarded,
        )
        .await?
        .into_result()
}

/// GET /videos
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    request_id: RequestId,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    passthrough(&ctx, "list", "/api/v1/videos", query, &user, &request_id).await
}

/// GET /videos/status
pub async fn status(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    request_id: RequestId,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    passthrough(&ctx, "status", "/api/v1/videos/status", query, &user, &request_id).await
}

/// GET /videos/queue/stats
pub async fn queue_stats(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    request_id: RequestId,
    RawQuery(query): RawQuery,
) -> AppResult<Response> {
    passthrough(
        &ctx,
        "queue_stats",
        "/api/v1/videos/queue/stats",
        query,
        &user,
        &request_id,
    )
    .await
}

async fn passthrough(
    ctx: &AppContext,
    operation: &str,
    path: &str,
    query: Option<String>,
    user: &AuthenticatedUser,
    request_id: &RequestId,
) -> AppResult<Response> {
    let forwarded = forwarded(user, request_id)?;
    ctx.metrics
        .record_business_operation(operation, Backend::Video.name());

    ctx.service_client
        .get(Backend::Video, path, query.as_deref(), forwarded)
        .await?
        .into_result()
}

/// GET /videos/download/:filename
///
/// The backend body is streamed chunk by chunk. If the client goes away the
/// response body is dropped, which drops the backend stream with it.
pub async fn download(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    request_id: RequestId,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    let forwarded = forwarded(&user, &request_id)?;
    let content_disposition = HeaderValue::from_str(&format!("attachment; filename={}", filename))
        .map_err(|_| AppError::validation("Invalid filename"))?;

    ctx.metrics
        .record_business_operation("download", Backend::Video.name());

    let upstream = ctx
        .service_client
        .open_download(&filename, forwarded)
        .await?;
    let content_length = upstream.content_length();

    let stream_file = filename.clone();
    let stream_request_id = request_id.0.clone();
    let stream = upstream.bytes_stream().map_err(move |e| {
        AppError::Stream(format!("{} ({}): {}", stream_file, stream_request_id, e)).log();
        e
    });

    tracing::info!(
        user_id = ?forwarded.user_id,
        filename = %filename,
        content_length = ?content_length,
        "Streaming download"
    );

    let mut response = (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        Body::from_stream(stream),
    )
        .into_response();

    if let Some(length) = content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

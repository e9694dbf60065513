// ============================================================================
// Service Client
// ============================================================================
//
// HTTP client for the two backends behind the gateway.
// Handles:
// - Token verification against the auth service
// - JSON passthrough (request body and response relayed unchanged)
// - Multipart re-encoding of uploaded files
// - Streamed downloads (response body is never buffered)
// - Health probes for readiness
//
// Every call is a single attempt; retries are left to clients and backends.
//
// ============================================================================

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

use crate::config::ServicesConfig;
use crate::error::{AppError, AppResult};
use crate::upload::UploadBundle;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_REQUEST_ID: &str = "x-request-id";

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Backend a call is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Auth,
    Video,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Auth => "auth",
            Backend::Video => "video",
        }
    }
}

/// Per-call context forwarded to the backend
#[derive(Debug, Clone, Copy, Default)]
pub struct Forwarded<'a> {
    pub user_id: Option<&'a str>,
    pub request_id: Option<&'a str>,
}

/// HTTP client for forwarding requests to the backends
#[derive(Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    auth_service_url: String,
    video_service_url: String,
    timeout: Duration,
    upload_timeout: Duration,
}

impl ServiceClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        // Connections are pooled per backend host and reused across requests.
        // No client-wide timeout: it would also cap streamed download bodies.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth_service_url: config.auth_service_url.trim_end_matches('/').to_string(),
            video_service_url: config.video_service_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            upload_timeout: config.upload_timeout(),
        })
    }

    pub fn base_url(&self, backend: Backend) -> &str {
        match backend {
            Backend::Auth => &self.auth_service_url,
            Backend::Video => &self.video_service_url,
        }
    }

    fn url(&self, backend: Backend, path: &str, query: Option<&str>) -> String {
        match query {
            Some(query) if !query.is_empty() => {
                format!("{}{}?{}", self.base_url(backend), path, query)
            }
            _ => format!("{}{}", self.base_url(backend), path),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        forwarded: Forwarded<'_>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(user_id) = forwarded.user_id {
            builder = builder.header(HEADER_USER_ID, user_id);
        }
        if let Some(request_id) = forwarded.request_id {
            builder = builder.header(HEADER_REQUEST_ID, request_id);
        }
        builder
    }

    /// Verify a bearer token with the auth service.
    ///
    /// Any failure (transport, timeout, non-2xx, unparsable body) collapses
    /// into `TokenInvalid`; the detail is only logged.
    pub async fn verify_token(&self, token: &str, request_id: Option<&str>) -> AppResult<Value> {
        let url = self.url(Backend::Auth, "/auth/verify", None);
        let forwarded = Forwarded {
            user_id: None,
            request_id,
        };

        let response = self
            .request(reqwest::Method::GET, &url, forwarded)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, token_length = token.len(), "Token verification call failed");
                AppError::TokenInvalid(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = %status.as_u16(), "Auth service rejected token");
            return Err(AppError::TokenInvalid(format!(
                "auth service responded with {}",
                status
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            tracing::warn!(error = %e, "Auth service returned an unreadable verify body");
            AppError::TokenInvalid(e.to_string())
        })
    }

    /// POST a JSON body to a backend and relay its response
    pub async fn post_json(
        &self,
        backend: Backend,
        path: &str,
        body: Bytes,
        forwarded: Forwarded<'_>,
    ) -> AppResult<RelayedResponse> {
        let url = self.url(backend, path, None);
        let response = self
            .request(reqwest::Method::POST, &url, forwarded)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| log_transport_error(backend, path, e))?;

        RelayedResponse::read(response).await
    }

    /// GET a backend resource and relay its response
    pub async fn get(
        &self,
        backend: Backend,
        path: &str,
        query: Option<&str>,
        forwarded: Forwarded<'_>,
    ) -> AppResult<RelayedResponse> {
        let url = self.url(backend, path, query);
        let response = self
            .request(reqwest::Method::GET, &url, forwarded)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| log_transport_error(backend, path, e))?;

        RelayedResponse::read(response).await
    }

    /// Re-encode an upload bundle as multipart and POST it to the video service.
    ///
    /// Bounded by the upload timeout, since the body can be up to the upload limit.
    pub async fn upload(
        &self,
        path: &str,
        field_name: &str,
        bundle: UploadBundle,
        forwarded: Forwarded<'_>,
    ) -> AppResult<RelayedResponse> {
        let mut form = Form::new();
        for file in bundle.into_files() {
            let length = file.data.len() as u64;
            let mut part = Part::stream_with_length(file.data, length).file_name(file.file_name);
            if let Some(content_type) = file.content_type.as_deref() {
                part = part.mime_str(content_type).map_err(|_| {
                    AppError::validation(format!("Invalid content type: {}", content_type))
                })?;
            } else {
                part = part.mime_str("application/octet-stream")?;
            }
            form = form.part(field_name.to_string(), part);
        }

        let url = self.url(Backend::Video, path, None);
        let response = self
            .request(reqwest::Method::POST, &url, forwarded)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| log_transport_error(Backend::Video, path, e))?;

        RelayedResponse::read(response).await
    }

    /// Start a download from the video service.
    ///
    /// Only the wait for response headers is bounded by the timeout; the
    /// returned response still has its body unread so it can be streamed.
    pub async fn open_download(
        &self,
        filename: &str,
        forwarded: Forwarded<'_>,
    ) -> AppResult<reqwest::Response> {
        let mut url = reqwest::Url::parse(self.base_url(Backend::Video))
            .map_err(|e| AppError::internal(format!("invalid video service URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::internal("video service URL cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "v1", "videos", "download", filename]);

        let send = self
            .request(reqwest::Method::GET, url.as_str(), forwarded)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| AppError::UpstreamTimeout(Backend::Video.name().to_string()))?
            .map_err(|e| log_transport_error(Backend::Video, "/api/v1/videos/download", e))?;

        if !response.status().is_success() {
            // Error bodies are small JSON documents; buffer and relay them
            return Err(RelayedResponse::read(response).await?.into_backend_error());
        }

        Ok(response)
    }

    /// Check if a backend is healthy
    pub async fn check_health(&self, backend: Backend) -> bool {
        let health_url = self.url(backend, "/health", None);
        match self
            .client
            .get(&health_url)
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(service = backend.name(), service_url = %health_url, error = %e, "Service health check failed");
                false
            }
        }
    }
}

fn log_transport_error(backend: Backend, path: &str, e: reqwest::Error) -> AppError {
    tracing::error!(
        service = backend.name(),
        path = %path,
        timeout = e.is_timeout(),
        error = %e,
        "Failed to forward request to service"
    );
    AppError::Upstream(e)
}

/// Fully read backend response, relayed to the client as-is
#[derive(Debug)]
pub struct RelayedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl RelayedResponse {
    async fn read(response: reqwest::Response) -> AppResult<Self> {
        let status = response.status();
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            content_type,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_backend_error(self) -> AppError {
        AppError::Backend {
            status: self.status,
            content_type: self.content_type,
            body: self.body,
        }
    }

    /// 2xx responses pass through; anything else becomes a backend error so
    /// the middleware counts it, with status and body left untouched
    pub fn into_result(self) -> AppResult<Response> {
        if !self.is_success() {
            return Err(self.into_backend_error());
        }

        let mut response = (self.status, Body::from(self.body)).into_response();
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        Ok(response)
    }
}

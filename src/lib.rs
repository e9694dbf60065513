//! HTTP gateway in front of the auth service and the video-processing service.
//!
//! The gateway owns no state beyond its metrics: it authenticates requests by
//! asking the auth service, forwards them to the right backend with the caller's
//! id attached, and relays responses (including streamed downloads) unchanged.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod upload;

use context::AppContext;

/// Serve the gateway on an already bound listener until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    app_context: Arc<AppContext>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = routes::create_router(app_context);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

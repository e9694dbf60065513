use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::gateway::ServiceClient;
use crate::metrics::GatewayMetrics;

/// Application context containing shared dependencies
///
/// The metrics registry is the only cross-request mutable state; everything
/// else is read-only after startup.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub service_client: ServiceClient,
    pub metrics: Arc<GatewayMetrics>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let service_client = ServiceClient::new(&config.services)?;
        let metrics = Arc::new(GatewayMetrics::new()?);

        Ok(Self {
            config: Arc::new(config),
            service_client,
            metrics,
            started_at: Instant::now(),
        })
    }
}

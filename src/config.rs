use anyhow::{Context, Result};
use std::time::Duration;

mod logging;

pub use logging::{LogFormat, LoggingConfig};

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_AUTH_SERVICE_URL: &str = "http://localhost:3002";
const DEFAULT_VIDEO_SERVICE_URL: &str = "http://localhost:3000";

// Backend call limits (in seconds)
const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SERVICE_CONNECT_TIMEOUT_SECS: u64 = 5;
// Uploads carry up to MAX_UPLOAD_BYTES to the video service
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;

// Upload routes only; everything else keeps axum's default body limit
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// Hard cap on files accepted by the bulk upload route
pub const MAX_FILES_PER_UPLOAD: usize = 3;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Backend service locations and call limits
#[derive(Clone, Debug)]
pub struct ServicesConfig {
    /// Auth service base URL (e.g., "http://auth-service:3002")
    pub auth_service_url: String,
    /// Video processing service base URL (e.g., "http://video-service:3000")
    pub video_service_url: String,
    /// Timeout for a whole backend call; for downloads only the time to response headers
    pub timeout_secs: u64,
    /// TCP connect timeout for backend calls
    pub connect_timeout_secs: u64,
    /// Timeout for a whole multipart upload call, body transfer included
    pub upload_timeout_secs: u64,
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub(crate) fn from_env() -> Result<Self> {
        Ok(Self {
            auth_service_url: service_url_from_env("AUTH_SERVICE_URL", DEFAULT_AUTH_SERVICE_URL)?,
            video_service_url: service_url_from_env(
                "VIDEO_SERVICE_URL",
                DEFAULT_VIDEO_SERVICE_URL,
            )?,
            timeout_secs: parse_env("SERVICE_TIMEOUT_SECS", DEFAULT_SERVICE_TIMEOUT_SECS)?,
            connect_timeout_secs: parse_env(
                "SERVICE_CONNECT_TIMEOUT_SECS",
                DEFAULT_SERVICE_CONNECT_TIMEOUT_SECS,
            )?,
            upload_timeout_secs: parse_env("UPLOAD_TIMEOUT_SECS", DEFAULT_UPLOAD_TIMEOUT_SECS)?,
        })
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            auth_service_url: DEFAULT_AUTH_SERVICE_URL.to_string(),
            video_service_url: DEFAULT_VIDEO_SERVICE_URL.to_string(),
            timeout_secs: DEFAULT_SERVICE_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_SERVICE_CONNECT_TIMEOUT_SECS,
            upload_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            services: ServicesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: parse_env("PORT", DEFAULT_PORT)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            services: ServicesConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }
}

/// Read an optional variable, failing loudly if it is set but unparsable
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        _ => Ok(default),
    }
}

fn service_url_from_env(name: &str, default: &str) -> Result<String> {
    let url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    let url = url.trim().trim_end_matches('/').to_string();
    if url.is_empty() {
        anyhow::bail!("{} must not be empty", name);
    }
    Ok(url)
}

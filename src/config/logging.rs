// ============================================================================
// Logging Configuration
// ============================================================================

use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be \"text\" or \"json\", got {:?}", other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// EnvFilter directive (RUST_LOG)
    pub rust_log: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            format: match std::env::var("LOG_FORMAT") {
                Ok(raw) => raw.parse()?,
                Err(_) => LogFormat::Text,
            },
        })
    }
}

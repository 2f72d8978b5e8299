use backseat_core::{env_or, StreamingConfig};
use thiserror::Error;

use crate::DEFAULT_PORT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Port must be a number, got {0}")]
    InvalidPort(String),
    #[error("No origin to deliver tokens to, set BACKSEAT_APP_ORIGIN")]
    MissingAppOrigin,
}

/// How the proxy is served and what it talks to
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub streaming: StreamingConfig,
    /// The only origin the callback page hands tokens to
    pub app_origin: String,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_or("BACKSEAT_SERVER_PORT", &DEFAULT_PORT.to_string());
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;

        let streaming = StreamingConfig::from_env();

        let app_origin = match std::env::var("BACKSEAT_APP_ORIGIN") {
            Ok(origin) if !origin.is_empty() => origin,
            _ => streaming
                .redirect_origin()
                .ok_or(ConfigError::MissingAppOrigin)?,
        };

        Ok(Self {
            port,
            streaming,
            app_origin,
        })
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let streaming = StreamingConfig::default();
        let app_origin = streaming.redirect_origin().unwrap_or_default();

        Self {
            port: DEFAULT_PORT,
            streaming,
            app_origin,
        }
    }
}

use backseat_core::{env_or, Cadence, StreamingConfig};

/// Everything a host or guest device needs to know
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub database_url: String,
    /// The deployed app origin join urls are built on
    pub app_base: String,
    /// Where the streaming proxy is served
    pub proxy_url: String,
    pub streaming: StreamingConfig,
    pub cadence: Cadence,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: env_or("BACKSEAT_DATABASE_URL", &defaults.database_url),
            app_base: env_or("BACKSEAT_APP_BASE", &defaults.app_base),
            proxy_url: env_or("BACKSEAT_PROXY_URL", &defaults.proxy_url),
            streaming: StreamingConfig::from_env(),
            cadence: defaults.cadence,
        }
    }

    /// The origin the token message is expected from
    pub fn token_origin(&self) -> Option<String> {
        self.streaming.redirect_origin()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/backseat".to_string(),
            app_base: "http://localhost:5173".to_string(),
            proxy_url: "http://localhost:9050".to_string(),
            streaming: StreamingConfig::default(),
            cadence: Cadence::default(),
        }
    }
}

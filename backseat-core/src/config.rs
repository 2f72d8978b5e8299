use std::{env, time::Duration};

use url::Url;

/// Where the streaming service's authorization server lives
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
/// Where the streaming service's Web API lives
pub const DEFAULT_API_URL: &str = "https://api.spotify.com";

/// Reading what the host is playing, and adding to its queue
pub const PLAYBACK_SCOPES: &str =
    "user-read-currently-playing user-read-playback-state user-modify-playback-state";

/// Returns the environment variable, or the default if it is missing
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// How to reach and identify against the streaming service
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// The public client id. There is no secret, the authorization flow uses PKCE.
    pub client_id: String,
    /// Where the authorization server sends the browser back to, the proxy callback.
    pub redirect_uri: String,
    pub accounts_url: String,
    pub api_url: String,
    pub scopes: String,
}

impl StreamingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            client_id: env_or("STREAMING_CLIENT_ID", &defaults.client_id),
            redirect_uri: env_or("STREAMING_REDIRECT_URI", &defaults.redirect_uri),
            accounts_url: env_or("STREAMING_ACCOUNTS_URL", &defaults.accounts_url),
            api_url: env_or("STREAMING_API_URL", &defaults.api_url),
            scopes: defaults.scopes,
        }
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.accounts_url.trim_end_matches('/'))
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/api/token", self.accounts_url.trim_end_matches('/'))
    }

    /// Returns an endpoint of the Web API, `path` starting with a slash
    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// The origin of the redirect uri, which is where the token message comes from
    pub fn redirect_origin(&self) -> Option<String> {
        origin_of(&self.redirect_uri)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://localhost:9050/auth/callback".to_string(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            scopes: PLAYBACK_SCOPES.to_string(),
        }
    }
}

/// Returns the serialized origin of an absolute url, like `https://example.com:8080`
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();

    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// How often the host and the guests do their periodic work.
/// These are targets, not guarantees.
#[derive(Debug, Clone)]
pub struct Cadence {
    /// How often the host reads the member list
    pub roster: Duration,
    /// How often the host reads heartbeats
    pub presence: Duration,
    /// How often the host asks the streaming service what is playing
    pub playback: Duration,
    /// How often a guest checks its membership and writes a heartbeat
    pub heartbeat: Duration,
    /// How old a heartbeat may be for its user to count as online
    pub presence_ttl: Duration,
    /// How long the host waits on the authorization popup
    pub authorization_timeout: Duration,
}

impl Cadence {
    pub fn presence_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.presence_ttl).unwrap_or_else(|_| chrono::Duration::seconds(30))
    }

    pub fn authorization_timeout(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.authorization_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(120))
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            roster: Duration::from_secs(4),
            presence: Duration::from_secs(4),
            playback: Duration::from_secs(4),
            heartbeat: Duration::from_secs(10),
            presence_ttl: Duration::from_secs(30),
            authorization_timeout: Duration::from_secs(120),
        }
    }
}

use backseat_core::{SearchResults, Track};
use log::warn;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The track could not be added, usually because no playback device is active
    #[error("Could not queue, make sure a device is active")]
    Queue { status: u16, details: String },
    #[error("Search failed with {status}")]
    Search { status: u16, body: Value },
    #[error("Could not reach the proxy: {0}")]
    Transport(String),
    #[error("Unexpected response from the proxy: {0}")]
    Parse(String),
}

impl ProxyError {
    /// Returns true if the streaming service rejected the access token
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Queue { status, .. } | Self::Search { status, .. } => *status == 401,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// The error envelope the proxy answers with
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(default)]
    details: Option<Value>,
}

/// Talks to the streaming proxy on behalf of the host
#[derive(Debug, Clone)]
pub struct ProxyClient {
    base: String,
    client: Client,
}

impl ProxyClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Adds a track to the host's playback queue
    pub async fn enqueue(&self, access_token: &str, uri: &str) -> Result<(), ProxyError> {
        let response = self
            .client
            .post(format!("{}/queue", self.base))
            .bearer_auth(access_token)
            .json(&json!({ "uri": uri }))
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let details = match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => match envelope.details {
                Some(Value::String(details)) => details,
                Some(details) => details.to_string(),
                None => envelope.error,
            },
            Err(_) => text,
        };

        warn!("Queueing {} failed with {}: {}", uri, status, details);

        Err(ProxyError::Queue {
            status: status.as_u16(),
            details,
        })
    }

    /// Searches for tracks
    pub async fn search(&self, access_token: &str, query: &str) -> Result<Vec<Track>, ProxyError> {
        let response = self
            .client
            .get(format!("{}/search", self.base))
            .query(&[("q", query)])
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status != StatusCode::OK {
            return Err(ProxyError::Search {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_value::<SearchResults>(body)
            .map(SearchResults::into_tracks)
            .map_err(|e| ProxyError::Parse(e.to_string()))
    }
}

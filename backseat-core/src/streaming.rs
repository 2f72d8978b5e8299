use log::{debug, warn};
use reqwest::{header, Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{CurrentlyPlaying, StreamingConfig, Track};

#[derive(Debug, Error)]
pub enum StreamingError {
    /// The access token was rejected, it has expired or was revoked
    #[error("Access token was rejected")]
    Unauthorized,
    /// The streaming service answered with a non-success status
    #[error("Streaming service responded with {status}: {body}")]
    Upstream { status: u16, body: String },
    /// The request never got an answer
    #[error("Request to the streaming service failed: {0}")]
    Transport(String),
    #[error("Failed to parse streaming service response: {0}")]
    Parse(String),
}

impl StreamingError {
    /// The HTTP status this error should be passed on with
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Upstream { status, body: _ } => *status,
            Self::Transport(_) => 502,
            Self::Parse(_) => 502,
        }
    }

    /// Returns true if trying again later might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Upstream { status, body: _ } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    async fn from_response(response: Response) -> Self {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Self::Unauthorized;
        }

        let body = response.text().await.unwrap_or_default();

        Self::Upstream {
            status: status.as_u16(),
            body,
        }
    }
}

impl From<reqwest::Error> for StreamingError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// A response to be handed on as it is, status and all
#[derive(Debug, Clone, PartialEq)]
pub struct Passthrough {
    pub status: u16,
    pub body: Value,
}

#[derive(Serialize)]
struct CodeExchangeParams<'a> {
    client_id: &'a str,
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    code_verifier: &'a str,
}

/// A thin client for the streaming service's accounts and Web API
#[derive(Debug, Clone)]
pub struct StreamingApi {
    config: StreamingConfig,
    client: Client,
}

impl StreamingApi {
    /// How many results a track search returns
    pub const SEARCH_LIMIT: u32 = 10;

    pub fn new(config: StreamingConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Exchanges an authorization code and its PKCE verifier for tokens.
    /// The token JSON is returned untouched so it can be handed to the host as is.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Value, StreamingError> {
        let params = CodeExchangeParams {
            client_id: &self.config.client_id,
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.config.redirect_uri,
            code_verifier: verifier,
        };

        let response = self
            .client
            .post(self.config.token_endpoint())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Token exchange failed with {}", status);
            return Err(StreamingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| StreamingError::Parse(e.to_string()))
    }

    /// Returns the track the account is playing, or [None] if nothing is
    pub async fn currently_playing(&self, access_token: &str) -> Result<Option<Track>, StreamingError> {
        let response = self
            .client
            .get(self.config.api_endpoint("/v1/me/player/currently-playing"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            debug!("Nothing is playing");
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(StreamingError::from_response(response).await);
        }

        let playing: CurrentlyPlaying = response
            .json()
            .await
            .map_err(|e| StreamingError::Parse(e.to_string()))?;

        Ok(playing.into_track())
    }

    /// Searches for tracks. Any status is handed back, only transport failures are errors.
    pub async fn search(&self, access_token: &str, query: &str) -> Result<Passthrough, StreamingError> {
        let limit = Self::SEARCH_LIMIT.to_string();

        let response = self
            .client
            .get(self.config.api_endpoint("/v1/search"))
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(Passthrough { status, body })
    }

    /// Adds a track to the end of the account's playback queue
    pub async fn add_to_queue(&self, access_token: &str, uri: &str) -> Result<(), StreamingError> {
        let response = self
            .client
            .post(self.config.api_endpoint("/v1/me/player/queue"))
            .query(&[("uri", uri)])
            .bearer_auth(access_token)
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(StreamingError::from_response(response).await)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Form, Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        format!("http://{}", addr)
    }

    fn api_for(base: &str) -> StreamingApi {
        StreamingApi::new(StreamingConfig {
            client_id: "client".to_string(),
            redirect_uri: "http://localhost/auth/callback".to_string(),
            accounts_url: base.to_string(),
            api_url: base.to_string(),
            ..Default::default()
        })
    }

    fn bearer(headers: &HeaderMap) -> String {
        headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_currently_playing() {
        let router = Router::new().route(
            "/v1/me/player/currently-playing",
            get(|headers: HeaderMap| async move {
                match bearer(&headers).as_str() {
                    "Bearer playing" => (
                        AxumStatus::OK,
                        Json(json!({ "item": { "uri": "spotify:track:T", "name": "X", "artists": [{ "name": "Y" }] } })),
                    ),
                    "Bearer idle" => (AxumStatus::NO_CONTENT, Json(json!(null))),
                    _ => (AxumStatus::UNAUTHORIZED, Json(json!({ "error": "expired" }))),
                }
            }),
        );

        let api = api_for(&serve(router).await);

        let track = api.currently_playing("playing").await.unwrap().unwrap();
        assert_eq!(track.title, "X");
        assert_eq!(track.artist, "Y");

        assert!(api.currently_playing("idle").await.unwrap().is_none());
        assert!(matches!(
            api.currently_playing("expired").await,
            Err(StreamingError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_verifier() {
        let router = Router::new().route(
            "/api/token",
            post(|Form(params): Form<HashMap<String, String>>| async move {
                if params.get("code_verifier").map(String::as_str) != Some("verifier")
                    || params.get("grant_type").map(String::as_str) != Some("authorization_code")
                    || params.get("client_id").map(String::as_str) != Some("client")
                {
                    return (AxumStatus::BAD_REQUEST, Json(json!({ "error": "invalid_grant" })));
                }

                (
                    AxumStatus::OK,
                    Json(json!({ "access_token": "a", "refresh_token": "r", "expires_in": 3600 })),
                )
            }),
        );

        let api = api_for(&serve(router).await);

        let tokens = api.exchange_code("code", "verifier").await.unwrap();
        assert_eq!(tokens["access_token"], "a");

        let error = api.exchange_code("code", "wrong").await.unwrap_err();
        assert_eq!(error.status(), 400);
        assert!(error.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_search_and_queue() {
        let router = Router::new()
            .route(
                "/v1/search",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    assert_eq!(params["type"], "track");
                    assert_eq!(params["limit"], "10");
                    Json(json!({ "tracks": { "items": [] }, "q": params["q"] }))
                }),
            )
            .route(
                "/v1/me/player/queue",
                post(|Query(params): Query<HashMap<String, String>>| async move {
                    if params["uri"] == "spotify:track:Z" {
                        (AxumStatus::NO_CONTENT, String::new())
                    } else {
                        (AxumStatus::NOT_FOUND, "No active device found".to_string())
                    }
                }),
            );

        let api = api_for(&serve(router).await);

        let result = api.search("token", "hello world").await.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.body["q"], "hello world");

        api.add_to_queue("token", "spotify:track:Z").await.unwrap();

        let error = api.add_to_queue("token", "spotify:track:Q").await.unwrap_err();
        assert_eq!(error.status(), 404);
        assert!(!error.is_transient());
    }
}

use backseat_core::{Pkce, StreamingConfig, TokenMessage, Tokens};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use super::SessionError;

/// A message received from the authorization popup
#[derive(Debug, Clone)]
pub struct AuthorizationMessage {
    /// The origin of the window that sent it
    pub origin: String,
    pub message: TokenMessage,
}

/// Where the host stands with the streaming service
#[derive(Debug, Clone)]
pub enum ConnectionState {
    Disconnected,
    /// The popup is open, waiting on the token message
    Authorizing {
        pkce: Pkce,
        started_at: DateTime<Utc>,
    },
    Connected {
        tokens: Tokens,
    },
}

/// [ConnectionState] without its data, for views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Authorizing,
    Connected,
}

/// The streaming connection state machine
#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    /// The only origin token messages are accepted from
    trusted_origin: Option<String>,
    timeout: Duration,
}

impl Connection {
    /// Starts connected if reusable tokens are at hand
    pub fn new(
        tokens: Option<Tokens>,
        trusted_origin: Option<String>,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let state = match tokens {
            Some(tokens) if !tokens.is_expired(now) => {
                info!("Reusing stored streaming tokens");
                ConnectionState::Connected { tokens }
            }
            Some(_) => {
                info!("Stored streaming tokens have expired");
                ConnectionState::Disconnected
            }
            None => ConnectionState::Disconnected,
        };

        Self {
            state,
            trusted_origin,
            timeout,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.state {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Authorizing { .. } => ConnectionStatus::Authorizing,
            ConnectionState::Connected { .. } => ConnectionStatus::Connected,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Connected { tokens } => Some(&tokens.access_token),
            _ => None,
        }
    }

    /// Starts a new authorization, returning the url for the popup.
    /// Any authorization in progress is replaced.
    pub fn begin_authorization(
        &mut self,
        config: &StreamingConfig,
        now: DateTime<Utc>,
    ) -> Result<Url, SessionError> {
        let pkce = Pkce::generate();
        let url = pkce.authorize_url(config)?;

        self.state = ConnectionState::Authorizing {
            pkce,
            started_at: now,
        };

        Ok(url)
    }

    /// Accepts the token message of the pending authorization
    pub fn complete_authorization(
        &mut self,
        message: AuthorizationMessage,
        now: DateTime<Utc>,
    ) -> Result<Tokens, SessionError> {
        let ConnectionState::Authorizing { pkce, .. } = &self.state else {
            return Err(SessionError::NotAuthorizing);
        };

        if self.trusted_origin.as_deref() != Some(message.origin.as_str()) {
            warn!("Ignoring token message from {}", message.origin);
            return Err(SessionError::UntrustedOrigin(message.origin));
        }

        if message.message.state != pkce.verifier {
            return Err(SessionError::StateMismatch);
        }

        let mut tokens: Tokens = serde_json::from_value(message.message.tokens)
            .map_err(|e| SessionError::InvalidTokens(e.to_string()))?;

        if tokens.access_token.is_empty() {
            return Err(SessionError::InvalidTokens("access_token is empty".to_string()));
        }

        tokens.obtained_at = Some(now);
        self.state = ConnectionState::Connected {
            tokens: tokens.clone(),
        };

        Ok(tokens)
    }

    /// The popup was closed without a token message
    pub fn cancel_authorization(&mut self) -> bool {
        if let ConnectionState::Authorizing { .. } = self.state {
            self.state = ConnectionState::Disconnected;
            return true;
        }

        false
    }

    /// Gives up on an authorization that has been pending for too long
    pub fn expire_authorization(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            ConnectionState::Authorizing { started_at, .. } if now - started_at >= self.timeout => {
                info!("Authorization timed out");
                self.state = ConnectionState::Disconnected;
                true
            }
            _ => false,
        }
    }

    /// Forgets the tokens, returning true if there were any
    pub fn disconnect(&mut self) -> bool {
        let was_connected = matches!(self.state, ConnectionState::Connected { .. });
        self.state = ConnectionState::Disconnected;

        was_connected
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ORIGIN: &str = "http://localhost:9050";

    fn connection() -> Connection {
        Connection::new(None, Some(ORIGIN.to_string()), Duration::seconds(120), Utc::now())
    }

    fn begin(connection: &mut Connection) -> String {
        let url = connection
            .begin_authorization(&StreamingConfig::default(), Utc::now())
            .unwrap();

        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.to_string())
            .unwrap()
    }

    fn message(origin: &str, state: &str) -> AuthorizationMessage {
        AuthorizationMessage {
            origin: origin.to_string(),
            message: TokenMessage {
                state: state.to_string(),
                tokens: json!({ "access_token": "a", "refresh_token": "r", "expires_in": 3600 }),
            },
        }
    }

    #[test]
    fn test_full_authorization() {
        let mut connection = connection();
        let state = begin(&mut connection);

        assert_eq!(connection.status(), ConnectionStatus::Authorizing);

        let tokens = connection
            .complete_authorization(message(ORIGIN, &state), Utc::now())
            .unwrap();

        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
        assert!(tokens.obtained_at.is_some());
        assert_eq!(connection.access_token(), Some("a"));
    }

    #[test]
    fn test_rejects_untrusted_messages() {
        let mut connection = connection();
        let state = begin(&mut connection);

        assert!(matches!(
            connection.complete_authorization(message("https://evil.example", &state), Utc::now()),
            Err(SessionError::UntrustedOrigin(_))
        ));
        assert!(matches!(
            connection.complete_authorization(message(ORIGIN, "other"), Utc::now()),
            Err(SessionError::StateMismatch)
        ));
        assert_eq!(connection.status(), ConnectionStatus::Authorizing);
    }

    #[test]
    fn test_message_without_authorization() {
        let mut connection = connection();

        assert!(matches!(
            connection.complete_authorization(message(ORIGIN, "x"), Utc::now()),
            Err(SessionError::NotAuthorizing)
        ));
    }

    #[test]
    fn test_timeout_and_cancel() {
        let mut connection = connection();
        begin(&mut connection);

        assert!(!connection.expire_authorization(Utc::now()));
        assert!(connection.expire_authorization(Utc::now() + Duration::seconds(121)));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);

        begin(&mut connection);
        assert!(connection.cancel_authorization());
        assert!(!connection.cancel_authorization());
    }

    #[test]
    fn test_stored_tokens() {
        let now = Utc::now();
        let tokens = Tokens {
            access_token: "a".to_string(),
            token_type: "Bearer".to_string(),
            scope: String::new(),
            expires_in: 3600,
            refresh_token: None,
            obtained_at: Some(now - Duration::minutes(10)),
        };

        let fresh = Connection::new(Some(tokens.clone()), None, Duration::seconds(120), now);
        assert_eq!(fresh.status(), ConnectionStatus::Connected);

        let stale = Connection::new(
            Some(tokens),
            None,
            Duration::seconds(120),
            now + Duration::hours(2),
        );
        assert_eq!(stale.status(), ConnectionStatus::Disconnected);
    }
}

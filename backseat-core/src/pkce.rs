use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use crate::StreamingConfig;

/// A PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    const VERIFIER_BYTES: usize = 32;

    /// Generates a verifier from 32 random bytes
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::VERIFIER_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);

        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = challenge_for(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// Builds the url the host opens in the authorization popup.
    ///
    /// The verifier travels in `state` so the stateless callback can
    /// finish the exchange without remembering anything.
    pub fn authorize_url(&self, config: &StreamingConfig) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&config.authorize_endpoint())?;

        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &self.challenge)
            .append_pair("state", &self.verifier)
            .append_pair("scope", &config.scopes);

        Ok(url)
    }
}

/// What the callback page posts to the host window once the code is exchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMessage {
    /// The `state` the authorization started with, which is the verifier
    pub state: String,
    /// The token endpoint's response, untouched
    pub tokens: Value,
}

/// base64url(SHA-256(verifier)), without padding
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_challenge_matches_rfc_example() {
        // RFC 7636, appendix B
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());

        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGGSYtr4Ec");
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = Pkce::generate();

        // 32 bytes is 43 characters of unpadded base64
        assert_eq!(pkce.verifier.len(), 43);
        assert!(!pkce.verifier.contains('='));
        assert!(!pkce.verifier.contains('+'));
        assert!(!pkce.verifier.contains('/'));
        assert_eq!(pkce.challenge, challenge_for(&pkce.verifier));
        assert_ne!(pkce.verifier, Pkce::generate().verifier);
    }

    #[test]
    fn test_authorize_url() {
        let config = StreamingConfig {
            client_id: "client".to_string(),
            redirect_uri: "https://backseat.example/auth/callback".to_string(),
            ..Default::default()
        };
        let pkce = Pkce::generate();
        let url = pkce.authorize_url(&config).expect("url is valid");

        assert_eq!(url.path(), "/authorize");

        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "client");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "https://backseat.example/auth/callback");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["code_challenge"], pkce.challenge);
        assert_eq!(pairs["state"], pkce.verifier);
        assert!(pairs["scope"].contains("user-read-currently-playing"));
    }
}

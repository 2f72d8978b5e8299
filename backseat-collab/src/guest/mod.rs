use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::{IdentityError, SessionId, StoreError};

mod participant;
pub use participant::*;

/// The session guests land in when the join url carries none
pub const DEMO_SID: &str = "demo-session";

#[derive(Debug, Error)]
pub enum ParticipantError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Log in first")]
    NotJoined,
    #[error("Nothing playing")]
    NothingPlaying,
    /// Signing in while joined, leaving comes first
    #[error("Already joined as {0}, leave first")]
    AlreadyJoined(String),
}

/// What the guest screen shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Menu,
    Signup,
    Login,
    Joined,
}

/// What a heartbeat found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    /// Nobody is joined, nothing was written
    Idle,
    Alive,
    /// The membership was gone, the guest is back in the menu
    Kicked,
}

/// Reads the session id from a join url, falling back to [DEMO_SID].
///
/// Both `/#/join?sid=..` and `/join?sid=..` are understood.
pub fn resolve_sid(url: &str) -> SessionId {
    sid_from_url(url).unwrap_or_else(|| DEMO_SID.to_string())
}

fn sid_from_url(url: &str) -> Option<SessionId> {
    let parsed = Url::parse(url).ok()?;

    let from_fragment = parsed
        .fragment()
        .and_then(|fragment| fragment.split_once('?'))
        .and_then(|(_, query)| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "sid")
                .map(|(_, value)| value.into_owned())
        });

    from_fragment
        .or_else(|| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "sid")
                .map(|(_, value)| value.into_owned())
        })
        .map(|sid| sid.trim().to_string())
        .filter(|sid| !sid.is_empty())
}

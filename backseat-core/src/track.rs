use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What the room knows about a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    pub title: String,
    /// Artist names, joined with ", "
    pub artist: String,
    /// The first album image, or empty if there is none
    pub artwork: String,
}

/// The token JSON handed out by the streaming service's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    /// Lifetime of the access token, in seconds
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the host received the tokens. Not part of the token endpoint's response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obtained_at: Option<DateTime<Utc>>,
}

impl Tokens {
    /// Returns true if the access token is known to be expired at `now`.
    /// Tokens without a known age or lifetime are assumed valid until the API says otherwise.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.obtained_at {
            Some(obtained_at) if self.expires_in > 0 => {
                let expires_at = i64::try_from(self.expires_in)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|lifetime| obtained_at.checked_add_signed(lifetime));

                // A lifetime too long to represent never runs out
                expires_at.is_some_and(|expires_at| now >= expires_at)
            }
            _ => false,
        }
    }
}

// The payload shapes of the streaming Web API, only the fields in use.

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiTrack {
    uri: String,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiAlbum {
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiImage {
    url: String,
}

/// The body of `GET /v1/me/player/currently-playing`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlaying {
    /// Missing for ads, and for podcast episodes unless asked for
    item: Option<ApiTrack>,
}

/// The body of `GET /v1/search?type=track`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Clone, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<ApiTrack>,
}

impl From<ApiTrack> for Track {
    fn from(value: ApiTrack) -> Self {
        let artist = value
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let artwork = value
            .album
            .and_then(|a| a.images.into_iter().next())
            .map(|i| i.url)
            .unwrap_or_default();

        Self {
            uri: value.uri,
            title: value.name,
            artist,
            artwork,
        }
    }
}

impl CurrentlyPlaying {
    pub fn into_track(self) -> Option<Track> {
        self.item.map(Into::into)
    }
}

impl SearchResults {
    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
            .map(|page| page.items.into_iter().map(Into::into).collect())
            .unwrap_or_default()
    }
}

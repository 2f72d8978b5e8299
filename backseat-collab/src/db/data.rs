use backseat_core::Track;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An opaque session identifier, generated by the host
pub type SessionId = String;

/// A participant of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MemberRow {
    pub sid: SessionId,
    pub username: String,
    pub favorite: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// The latest heartbeat of a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PresenceRow {
    pub sid: SessionId,
    pub username: String,
    pub last_seen: DateTime<Utc>,
}

/// What the host is playing. There is at most one per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NowPlayingRow {
    pub sid: SessionId,
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub artwork: String,
    pub updated_at: DateTime<Utc>,
}

/// A reaction of a participant to a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LikedSongRow {
    pub sid: SessionId,
    pub username: String,
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub artwork: String,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub sid: SessionId,
    pub username: String,
    pub favorite: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLikedSong {
    pub sid: SessionId,
    pub username: String,
    pub track: Track,
}

impl NowPlayingRow {
    pub fn new(sid: &str, track: &Track, updated_at: DateTime<Utc>) -> Self {
        Self {
            sid: sid.to_string(),
            uri: track.uri.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            artwork: track.artwork.clone(),
            updated_at,
        }
    }

    pub fn track(&self) -> Track {
        Track {
            uri: self.uri.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artwork: self.artwork.clone(),
        }
    }
}

impl LikedSongRow {
    pub fn track(&self) -> Track {
        Track {
            uri: self.uri.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artwork: self.artwork.clone(),
        }
    }
}

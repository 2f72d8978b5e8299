use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod feed;
pub use feed::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened with the backend
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource in the backend doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError;
    fn any(self) -> StoreError;
}

/// The shared backend every participant of a session reads and writes.
///
/// Every row has exactly one writer, the participant owning its key, so
/// upserts never race with each other. Deleting a row that doesn't exist is not an error.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Inserts or refreshes a member. `joined_at` is only set on first insert.
    async fn upsert_member(&self, new_member: NewMember) -> Result<MemberRow>;
    async fn member(&self, sid: &str, username: &str) -> Result<Option<MemberRow>>;
    /// Members of a session, oldest first
    async fn list_members(&self, sid: &str) -> Result<Vec<MemberRow>>;
    async fn delete_member(&self, sid: &str, username: &str) -> Result<()>;

    async fn upsert_presence(&self, sid: &str, username: &str, last_seen: DateTime<Utc>)
        -> Result<()>;
    /// Heartbeats of a session with `last_seen >= since`
    async fn list_presence(&self, sid: &str, since: DateTime<Utc>) -> Result<Vec<PresenceRow>>;
    async fn delete_presence(&self, sid: &str, username: &str) -> Result<()>;
    /// Deletes heartbeats of a session older than `before`, returning how many were removed
    async fn clear_stale_presence(&self, sid: &str, before: DateTime<Utc>) -> Result<u64>;

    async fn upsert_now_playing(&self, row: NowPlayingRow) -> Result<()>;
    async fn now_playing(&self, sid: &str) -> Result<Option<NowPlayingRow>>;

    /// Records a reaction. Repeating it is a no-op, the first `liked_at` is kept.
    async fn upsert_liked_song(&self, new_like: NewLikedSong) -> Result<LikedSongRow>;
    async fn liked_songs_for_uri(&self, sid: &str, uri: &str) -> Result<Vec<LikedSongRow>>;
    /// Reactions of a user in a session, newest first
    async fn liked_songs_for_user(&self, sid: &str, username: &str) -> Result<Vec<LikedSongRow>>;

    /// Subscribes to row changes of one table, for one session
    async fn subscribe(&self, table: Table, sid: &str) -> Result<Subscription>;
}

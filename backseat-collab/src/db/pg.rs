use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use sqlx::{
    postgres::{PgListener, PgPoolOptions},
    query, query_as, Error as SqlxError, PgPool,
};
use tokio::task::JoinHandle;

use super::{
    Change, ChangeFeed, IntoStoreError, LikedSongRow, MemberRow, NewLikedSong, NewMember,
    NowPlayingRow, PresenceRow, Result, Store, StoreError, Subscription, Table,
};

/// The channel the migration triggers notify on
const CHANGES_CHANNEL: &str = "backseat_changes";

/// A postgres backed store. Row changes are relayed from `LISTEN` to local subscribers.
pub struct PgStore {
    pool: PgPool,
    feed: ChangeFeed,
    listener: JoinHandle<()>,
}

impl PgStore {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| StoreError::Internal(Box::new(e)))?;

        let mut listener = PgListener::connect_with(&pool)
            .await
            .map_err(|e| e.any())?;

        listener
            .listen(CHANGES_CHANNEL)
            .await
            .map_err(|e| e.any())?;

        let feed = ChangeFeed::new();
        let listener = tokio::spawn(relay_changes(listener, feed.clone()));

        info!("Connected to postgres, listening on {}", CHANGES_CHANNEL);

        Ok(Self {
            pool,
            feed,
            listener,
        })
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn relay_changes(mut listener: PgListener, feed: ChangeFeed) {
    loop {
        match listener.recv().await {
            Ok(notification) => match serde_json::from_str::<Change>(notification.payload()) {
                Ok(change) => feed.publish(change),
                Err(err) => warn!("Ignoring malformed change payload: {}", err),
            },
            Err(err) => {
                // The listener reconnects on its own, so only a closed pool ends the relay
                if matches!(err, SqlxError::PoolClosed) {
                    break;
                }

                error!("Change listener failed: {}", err);
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_member(&self, new_member: NewMember) -> Result<MemberRow> {
        query_as::<_, MemberRow>(
            "
            INSERT INTO members (sid, username, favorite)
            VALUES ($1, $2, $3)
            ON CONFLICT (sid, username) DO UPDATE SET favorite = EXCLUDED.favorite
            RETURNING *",
        )
        .bind(new_member.sid)
        .bind(new_member.username)
        .bind(new_member.favorite)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn member(&self, sid: &str, username: &str) -> Result<Option<MemberRow>> {
        query_as::<_, MemberRow>("SELECT * FROM members WHERE sid = $1 AND username = $2")
            .bind(sid)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn list_members(&self, sid: &str) -> Result<Vec<MemberRow>> {
        query_as::<_, MemberRow>(
            "SELECT * FROM members WHERE sid = $1 ORDER BY joined_at ASC, username ASC",
        )
        .bind(sid)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_member(&self, sid: &str, username: &str) -> Result<()> {
        query("DELETE FROM members WHERE sid = $1 AND username = $2")
            .bind(sid)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn upsert_presence(
        &self,
        sid: &str,
        username: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO presence (sid, username, last_seen)
            VALUES ($1, $2, $3)
            ON CONFLICT (sid, username) DO UPDATE SET last_seen = EXCLUDED.last_seen",
        )
        .bind(sid)
        .bind(username)
        .bind(last_seen)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn list_presence(&self, sid: &str, since: DateTime<Utc>) -> Result<Vec<PresenceRow>> {
        query_as::<_, PresenceRow>("SELECT * FROM presence WHERE sid = $1 AND last_seen >= $2")
            .bind(sid)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn delete_presence(&self, sid: &str, username: &str) -> Result<()> {
        query("DELETE FROM presence WHERE sid = $1 AND username = $2")
            .bind(sid)
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_stale_presence(&self, sid: &str, before: DateTime<Utc>) -> Result<u64> {
        query("DELETE FROM presence WHERE sid = $1 AND last_seen < $2")
            .bind(sid)
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|r| r.rows_affected())
    }

    async fn upsert_now_playing(&self, row: NowPlayingRow) -> Result<()> {
        query(
            "
            INSERT INTO now_playing (sid, uri, title, artist, artwork, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (sid) DO UPDATE SET
                uri = EXCLUDED.uri,
                title = EXCLUDED.title,
                artist = EXCLUDED.artist,
                artwork = EXCLUDED.artwork,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(row.sid)
        .bind(row.uri)
        .bind(row.title)
        .bind(row.artist)
        .bind(row.artwork)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn now_playing(&self, sid: &str) -> Result<Option<NowPlayingRow>> {
        query_as::<_, NowPlayingRow>("SELECT * FROM now_playing WHERE sid = $1")
            .bind(sid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn upsert_liked_song(&self, new_like: NewLikedSong) -> Result<LikedSongRow> {
        let NewLikedSong {
            sid,
            username,
            track,
        } = new_like;

        query(
            "
            INSERT INTO liked_songs (sid, username, uri, title, artist, artwork)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (sid, username, uri) DO NOTHING",
        )
        .bind(&sid)
        .bind(&username)
        .bind(&track.uri)
        .bind(&track.title)
        .bind(&track.artist)
        .bind(&track.artwork)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        query_as::<_, LikedSongRow>(
            "SELECT * FROM liked_songs WHERE sid = $1 AND username = $2 AND uri = $3",
        )
        .bind(&sid)
        .bind(&username)
        .bind(&track.uri)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("liked song", "sid:username:uri"))
    }

    async fn liked_songs_for_uri(&self, sid: &str, uri: &str) -> Result<Vec<LikedSongRow>> {
        query_as::<_, LikedSongRow>(
            "SELECT * FROM liked_songs WHERE sid = $1 AND uri = $2 ORDER BY liked_at ASC",
        )
        .bind(sid)
        .bind(uri)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn liked_songs_for_user(&self, sid: &str, username: &str) -> Result<Vec<LikedSongRow>> {
        query_as::<_, LikedSongRow>(
            "SELECT * FROM liked_songs WHERE sid = $1 AND username = $2 ORDER BY liked_at DESC",
        )
        .bind(sid)
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn subscribe(&self, table: Table, sid: &str) -> Result<Subscription> {
        Ok(self.feed.subscribe(table, sid))
    }
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        StoreError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}

//! Test doubles shared by the controller tests

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use backseat_core::{Cadence, StreamingError, Tokens, Track};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    db::Result as StoreResult, ClientConfig, LikedSongRow, LocalStorageExt, MemberRow,
    MemoryStorage, MemoryStore, NewLikedSong, NewMember, NowPlayingRow, ParticipantController,
    PresenceRow, ProxyError, SessionController, Store, StoreError, StreamingService, Subscription,
    Table, TOKENS_KEY,
};

pub type TestHost = SessionController<MemoryStore, MemoryStorage, FakeStreaming>;
pub type TestGuest = ParticipantController<MemoryStore, MemoryStorage>;

/// A streaming service answering from a script
pub struct FakeStreaming {
    /// What currently-playing answers, `Err` holding an HTTP status
    pub playing: Mutex<Result<Option<Track>, u16>>,
    pub device_active: AtomicBool,
    pub queued: Mutex<Vec<String>>,
}

impl FakeStreaming {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            playing: Mutex::new(Ok(None)),
            device_active: AtomicBool::new(true),
            queued: Default::default(),
        })
    }

    pub fn play(&self, track: Option<Track>) {
        *self.playing.lock() = Ok(track);
    }

    pub fn fail_with(&self, status: u16) {
        *self.playing.lock() = Err(status);
    }
}

#[async_trait]
impl StreamingService for FakeStreaming {
    async fn currently_playing(&self, _access_token: &str) -> Result<Option<Track>, StreamingError> {
        match self.playing.lock().clone() {
            Ok(track) => Ok(track),
            Err(401) => Err(StreamingError::Unauthorized),
            Err(status) => Err(StreamingError::Upstream {
                status,
                body: "scripted failure".to_string(),
            }),
        }
    }

    async fn enqueue(&self, _access_token: &str, uri: &str) -> Result<(), ProxyError> {
        if !self.device_active.load(Ordering::SeqCst) {
            return Err(ProxyError::Queue {
                status: 404,
                details: "No active device found".to_string(),
            });
        }

        self.queued.lock().push(uri.to_string());
        Ok(())
    }

    async fn search(&self, _access_token: &str, query: &str) -> Result<Vec<Track>, ProxyError> {
        Ok(vec![track("spotify:track:S", query, "Searcher")])
    }
}

/// A memory store that fails every request while told to.
/// Subscriptions keep working, the change feed is not a request.
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("down".into()));
        }

        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn upsert_member(&self, new_member: NewMember) -> StoreResult<MemberRow> {
        self.check()?;
        self.inner.upsert_member(new_member).await
    }

    async fn member(&self, sid: &str, username: &str) -> StoreResult<Option<MemberRow>> {
        self.check()?;
        self.inner.member(sid, username).await
    }

    async fn list_members(&self, sid: &str) -> StoreResult<Vec<MemberRow>> {
        self.check()?;
        self.inner.list_members(sid).await
    }

    async fn delete_member(&self, sid: &str, username: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_member(sid, username).await
    }

    async fn upsert_presence(
        &self,
        sid: &str,
        username: &str,
        last_seen: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.upsert_presence(sid, username, last_seen).await
    }

    async fn list_presence(&self, sid: &str, since: DateTime<Utc>) -> StoreResult<Vec<PresenceRow>> {
        self.check()?;
        self.inner.list_presence(sid, since).await
    }

    async fn delete_presence(&self, sid: &str, username: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_presence(sid, username).await
    }

    async fn clear_stale_presence(&self, sid: &str, before: DateTime<Utc>) -> StoreResult<u64> {
        self.check()?;
        self.inner.clear_stale_presence(sid, before).await
    }

    async fn upsert_now_playing(&self, row: NowPlayingRow) -> StoreResult<()> {
        self.check()?;
        self.inner.upsert_now_playing(row).await
    }

    async fn now_playing(&self, sid: &str) -> StoreResult<Option<NowPlayingRow>> {
        self.check()?;
        self.inner.now_playing(sid).await
    }

    async fn upsert_liked_song(&self, new_like: NewLikedSong) -> StoreResult<LikedSongRow> {
        self.check()?;
        self.inner.upsert_liked_song(new_like).await
    }

    async fn liked_songs_for_uri(&self, sid: &str, uri: &str) -> StoreResult<Vec<LikedSongRow>> {
        self.check()?;
        self.inner.liked_songs_for_uri(sid, uri).await
    }

    async fn liked_songs_for_user(
        &self,
        sid: &str,
        username: &str,
    ) -> StoreResult<Vec<LikedSongRow>> {
        self.check()?;
        self.inner.liked_songs_for_user(sid, username).await
    }

    async fn subscribe(&self, table: Table, sid: &str) -> StoreResult<Subscription> {
        self.inner.subscribe(table, sid).await
    }
}

pub fn track(uri: &str, title: &str, artist: &str) -> Track {
    Track {
        uri: uri.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        artwork: String::new(),
    }
}

pub fn fast_cadence() -> Cadence {
    Cadence {
        roster: Duration::from_millis(40),
        presence: Duration::from_millis(40),
        playback: Duration::from_millis(40),
        heartbeat: Duration::from_millis(40),
        ..Default::default()
    }
}

pub fn config() -> ClientConfig {
    ClientConfig {
        app_base: "https://backseat.example/".to_string(),
        cadence: fast_cadence(),
        ..Default::default()
    }
}

/// Storage of a host device that connected earlier
pub fn connected_storage() -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let tokens = Tokens {
        access_token: "token".to_string(),
        token_type: "Bearer".to_string(),
        scope: String::new(),
        expires_in: 3600,
        refresh_token: Some("refresh".to_string()),
        obtained_at: Some(Utc::now()),
    };

    storage.set_json(TOKENS_KEY, &tokens).unwrap();
    storage
}

/// Polls `check` until it holds, giving up after about two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    false
}

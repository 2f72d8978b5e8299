use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

use super::{
    Change, ChangeFeed, ChangeKind, LikedSongRow, MemberRow, NewLikedSong, NewMember,
    NowPlayingRow, PresenceRow, Result, Store, Subscription, Table,
};

type MemberKey = (String, String);
type LikeKey = (String, String, String);

/// A store living in process memory, shared by every controller holding it.
/// Used for tests and single-process demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    members: DashMap<MemberKey, MemberRow>,
    presence: DashMap<MemberKey, PresenceRow>,
    now_playing: DashMap<String, NowPlayingRow>,
    liked_songs: DashMap<LikeKey, LikedSongRow>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, table: Table, sid: &str, kind: ChangeKind) {
        self.feed.publish(Change {
            table,
            sid: sid.to_string(),
            kind,
        });
    }
}

fn key(sid: &str, username: &str) -> MemberKey {
    (sid.to_string(), username.to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_member(&self, new_member: NewMember) -> Result<MemberRow> {
        let (row, kind) = match self
            .members
            .entry(key(&new_member.sid, &new_member.username))
        {
            Entry::Occupied(mut entry) => {
                entry.get_mut().favorite = new_member.favorite;
                (entry.get().clone(), ChangeKind::Update)
            }
            Entry::Vacant(entry) => {
                let row = MemberRow {
                    sid: new_member.sid,
                    username: new_member.username,
                    favorite: new_member.favorite,
                    joined_at: Utc::now(),
                };

                (entry.insert(row).clone(), ChangeKind::Insert)
            }
        };

        self.publish(Table::Members, &row.sid, kind);
        Ok(row)
    }

    async fn member(&self, sid: &str, username: &str) -> Result<Option<MemberRow>> {
        Ok(self.members.get(&key(sid, username)).map(|r| r.clone()))
    }

    async fn list_members(&self, sid: &str) -> Result<Vec<MemberRow>> {
        let mut members: Vec<_> = self
            .members
            .iter()
            .filter(|r| r.sid == sid)
            .map(|r| r.clone())
            .collect();

        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.username.cmp(&b.username))
        });

        Ok(members)
    }

    async fn delete_member(&self, sid: &str, username: &str) -> Result<()> {
        if self.members.remove(&key(sid, username)).is_some() {
            self.publish(Table::Members, sid, ChangeKind::Delete);
        }

        Ok(())
    }

    async fn upsert_presence(
        &self,
        sid: &str,
        username: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        let previous = self.presence.insert(
            key(sid, username),
            PresenceRow {
                sid: sid.to_string(),
                username: username.to_string(),
                last_seen,
            },
        );

        let kind = match previous {
            Some(_) => ChangeKind::Update,
            None => ChangeKind::Insert,
        };

        self.publish(Table::Presence, sid, kind);
        Ok(())
    }

    async fn list_presence(&self, sid: &str, since: DateTime<Utc>) -> Result<Vec<PresenceRow>> {
        Ok(self
            .presence
            .iter()
            .filter(|r| r.sid == sid && r.last_seen >= since)
            .map(|r| r.clone())
            .collect())
    }

    async fn delete_presence(&self, sid: &str, username: &str) -> Result<()> {
        if self.presence.remove(&key(sid, username)).is_some() {
            self.publish(Table::Presence, sid, ChangeKind::Delete);
        }

        Ok(())
    }

    async fn clear_stale_presence(&self, sid: &str, before: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0;
        self.presence.retain(|_, r| {
            let stale = r.sid == sid && r.last_seen < before;
            removed += stale as u64;
            !stale
        });

        if removed > 0 {
            self.publish(Table::Presence, sid, ChangeKind::Delete);
        }

        Ok(removed)
    }

    async fn upsert_now_playing(&self, row: NowPlayingRow) -> Result<()> {
        let sid = row.sid.clone();
        let kind = match self.now_playing.insert(sid.clone(), row) {
            Some(_) => ChangeKind::Update,
            None => ChangeKind::Insert,
        };

        self.publish(Table::NowPlaying, &sid, kind);
        Ok(())
    }

    async fn now_playing(&self, sid: &str) -> Result<Option<NowPlayingRow>> {
        Ok(self.now_playing.get(sid).map(|r| r.clone()))
    }

    async fn upsert_liked_song(&self, new_like: NewLikedSong) -> Result<LikedSongRow> {
        let like_key = (
            new_like.sid.clone(),
            new_like.username.clone(),
            new_like.track.uri.clone(),
        );

        let (row, inserted) = match self.liked_songs.entry(like_key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let NewLikedSong {
                    sid,
                    username,
                    track,
                } = new_like;

                let row = LikedSongRow {
                    sid,
                    username,
                    uri: track.uri,
                    title: track.title,
                    artist: track.artist,
                    artwork: track.artwork,
                    liked_at: Utc::now(),
                };

                (entry.insert(row).clone(), true)
            }
        };

        if inserted {
            self.publish(Table::LikedSongs, &row.sid, ChangeKind::Insert);
        }

        Ok(row)
    }

    async fn liked_songs_for_uri(&self, sid: &str, uri: &str) -> Result<Vec<LikedSongRow>> {
        let mut likes: Vec<_> = self
            .liked_songs
            .iter()
            .filter(|r| r.sid == sid && r.uri == uri)
            .map(|r| r.clone())
            .collect();

        likes.sort_by(|a, b| a.liked_at.cmp(&b.liked_at));
        Ok(likes)
    }

    async fn liked_songs_for_user(&self, sid: &str, username: &str) -> Result<Vec<LikedSongRow>> {
        let mut likes: Vec<_> = self
            .liked_songs
            .iter()
            .filter(|r| r.sid == sid && r.username == username)
            .map(|r| r.clone())
            .collect();

        likes.sort_by(|a, b| b.liked_at.cmp(&a.liked_at));
        Ok(likes)
    }

    async fn subscribe(&self, table: Table, sid: &str) -> Result<Subscription> {
        Ok(self.feed.subscribe(table, sid))
    }
}

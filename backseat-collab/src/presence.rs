use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::{LikedSongRow, MemberRow, PresenceRow};

/// The oldest heartbeat that still counts as online
pub fn presence_cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now - ttl
}

/// Usernames that have a heartbeat at or after `cutoff` and are still members.
/// Sorted, so views can compare sets cheaply.
pub fn online_set(
    presence: &[PresenceRow],
    members: &[MemberRow],
    cutoff: DateTime<Utc>,
) -> Vec<String> {
    let members: HashSet<_> = members.iter().map(|m| m.username.as_str()).collect();

    let mut online: Vec<_> = presence
        .iter()
        .filter(|p| p.last_seen >= cutoff && members.contains(p.username.as_str()))
        .map(|p| p.username.clone())
        .collect();

    online.sort();
    online.dedup();
    online
}

/// Usernames that reacted to `uri`, in the order they did
pub fn active_reactions(likes: &[LikedSongRow], uri: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    likes
        .iter()
        .filter(|l| l.uri == uri)
        .filter(|l| seen.insert(l.username.as_str()))
        .map(|l| l.username.clone())
        .collect()
}

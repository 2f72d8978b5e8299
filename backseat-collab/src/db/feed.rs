use futures_util::{stream, Stream};
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use super::SessionId;

/// The tables of the shared backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Members,
    Presence,
    NowPlaying,
    LikedSongs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub table: Table,
    pub sid: SessionId,
    pub kind: ChangeKind,
}

/// Fans out changes to every subscriber
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

/// A stream of changes to one table of one session.
/// Dropping it releases the subscription.
#[derive(Debug)]
pub struct Subscription {
    table: Table,
    sid: SessionId,
    receiver: broadcast::Receiver<Change>,
}

impl ChangeFeed {
    const CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(Self::CAPACITY);

        Self { sender }
    }

    pub fn publish(&self, change: Change) {
        // Nobody listening is fine
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self, table: Table, sid: &str) -> Subscription {
        Subscription {
            table,
            sid: sid.to_string(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    /// Waits for the next matching change, or [None] once the feed is gone
    pub async fn next_change(&mut self) -> Option<Change> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.table == self.table && change.sid == self.sid => {
                    return Some(change)
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // Readers refetch on any change, so a synthetic one covers what was missed
                    warn!("Subscription to {:?} lagged by {} changes", self.table, skipped);

                    return Some(Change {
                        table: self.table,
                        sid: self.sid.clone(),
                        kind: ChangeKind::Update,
                    });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The matching changes as a stream, ending once the feed is gone
    pub fn into_stream(self) -> impl Stream<Item = Change> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .next_change()
                .await
                .map(|change| (change, subscription))
        })
    }
}

use backseat_core::Track;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::{ConnectionStatus, MemberRow, Mode, NowPlayingRow, SessionId};

pub type HostEventSender = Sender<HostEvent>;
pub type HostEventReceiver = Receiver<HostEvent>;
pub type GuestEventSender = Sender<GuestEvent>;
pub type GuestEventReceiver = Receiver<GuestEvent>;

/// How many events are kept for a renderer that falls behind
pub const EVENT_BACKLOG: usize = 256;

/// Creates a channel holding at most [EVENT_BACKLOG] events
pub fn event_channel<T>() -> (Sender<T>, Receiver<T>) {
    bounded(EVENT_BACKLOG)
}

/// Sends without blocking. When the backlog is full the oldest event is dropped.
pub(crate) fn send_event<T>(sender: &Sender<T>, receiver: &Receiver<T>, event: T) {
    if let Err(TrySendError::Full(event)) = sender.try_send(event) {
        let _ = receiver.try_recv();
        let _ = sender.try_send(event);
    }
}

/// Events emitted by the host for whatever renders it
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The session id changed, on creation or rotation
    SessionChanged { sid: SessionId, join_url: String },
    /// The member list changed
    RosterChanged { members: Vec<MemberRow> },
    /// The set of members with a fresh heartbeat changed
    OnlineChanged { online: Vec<String> },
    /// What the streaming account plays changed. [None] means nothing is playing.
    NowPlayingChanged { track: Option<Track> },
    /// Who reacted to the current track
    ReactionsChanged { uri: String, usernames: Vec<String> },
    ConnectionChanged { status: ConnectionStatus },
    /// A backend read failed, the last good view is kept
    ErrorRecorded { message: String },
    /// A previously recorded error no longer applies
    ErrorCleared,
}

/// Events emitted by a guest for whatever renders it
#[derive(Debug, Clone, PartialEq)]
pub enum GuestEvent {
    ModeChanged { mode: Mode },
    /// The host removed this guest from the session
    Kicked { username: String },
    RosterChanged { members: Vec<MemberRow> },
    NowPlayingChanged { now_playing: Option<NowPlayingRow> },
    /// A reaction was recorded by this guest
    Reacted { uri: String },
    ErrorRecorded { message: String },
}

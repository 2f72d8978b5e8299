use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use backseat_core::{is_playable_uri, like_label, new_session_id, StreamingError, Tokens, Track};
use chrono::Utc;
use futures_util::{pin_mut, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use url::Url;

use super::{AuthorizationMessage, Connection, ConnectionStatus, SessionError};
use crate::{
    events::{event_channel, send_event},
    active_reactions, online_set, presence_cutoff, ClientConfig, HostEvent, HostEventReceiver,
    HostEventSender, LocalStorage, LocalStorageExt, MemberRow, NowPlayingRow, PresenceRow,
    SessionId, Store, StoreError, StreamingService, Table, HOST_SID_KEY, TOKENS_KEY,
};

/// What the host shows, scoped to the current session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostView {
    /// Members, oldest first
    pub roster: Vec<MemberRow>,
    /// Heartbeats read on the last presence poll
    pub presence: Vec<PresenceRow>,
    /// Members with a fresh heartbeat
    pub online: Vec<String>,
    pub now_playing: Option<Track>,
    /// Who reacted to [HostView::now_playing]
    pub reactions: Vec<String>,
    /// The last backend read error, if the last read failed
    pub error: Option<String>,
}

/// Identifies the session and generation an operation started in.
/// Results are only applied if both are still current when they arrive.
struct Ticket {
    sid: SessionId,
    generation: u64,
}

/// Owns a session on the host device.
///
/// Keeps the session id sticky across reloads, replicates what the streaming
/// account plays into the shared store, and keeps roster, presence and reaction
/// views of the session up to date.
pub struct SessionController<Db, S, St> {
    me: Weak<Self>,
    store: Arc<Db>,
    storage: Arc<S>,
    streaming: Arc<St>,
    config: ClientConfig,

    sid: Mutex<SessionId>,
    /// Bumped on rotation and on stop, invalidating results still in flight
    generation: AtomicU64,
    view: Mutex<HostView>,
    connection: Mutex<Connection>,

    loops: Mutex<Vec<JoinHandle<()>>>,
    reactions_loop: Mutex<Option<JoinHandle<()>>>,

    event_sender: HostEventSender,
    event_receiver: HostEventReceiver,
}

impl<Db, S, St> SessionController<Db, S, St>
where
    Db: Store,
    S: LocalStorage,
    St: StreamingService,
{
    pub fn new(
        store: &Arc<Db>,
        storage: &Arc<S>,
        streaming: &Arc<St>,
        config: ClientConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let sid = resume_or_create(storage.as_ref())?;

        let stored_tokens: Option<Tokens> = storage.get_json(TOKENS_KEY);
        let had_tokens = stored_tokens.is_some();
        let connection = Connection::new(
            stored_tokens,
            config.token_origin(),
            config.cadence.authorization_timeout(),
            Utc::now(),
        );

        if had_tokens && connection.status() == ConnectionStatus::Disconnected {
            storage.remove(TOKENS_KEY)?;
        }

        let (event_sender, event_receiver) = event_channel();

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store: store.clone(),
            storage: storage.clone(),
            streaming: streaming.clone(),
            config,
            sid: Mutex::new(sid),
            generation: AtomicU64::new(0),
            view: Default::default(),
            connection: Mutex::new(connection),
            loops: Default::default(),
            reactions_loop: Default::default(),
            event_sender,
            event_receiver,
        }))
    }

    /// Returns the persisted session id, creating and persisting one if there is none
    pub fn create_or_resume(&self) -> Result<SessionId, SessionError> {
        let sid = resume_or_create(self.storage.as_ref())?;
        *self.sid.lock() = sid.clone();

        Ok(sid)
    }

    /// Replaces the session with a fresh one. Rows of the old session are left alone.
    pub fn rotate(&self) -> Result<SessionId, SessionError> {
        let sid = new_session_id();
        self.storage.set(HOST_SID_KEY, &sid)?;

        *self.sid.lock() = sid.clone();
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.view.lock() = HostView::default();

        info!("Rotated to session {}", sid);
        self.emit(HostEvent::SessionChanged {
            sid: sid.clone(),
            join_url: self.join_url(&sid),
        });

        let mut reactions_loop = self.reactions_loop.lock();
        if let Some(handle) = reactions_loop.take() {
            handle.abort();
            *reactions_loop = Some(self.spawn_reactions_loop());
        }

        Ok(sid)
    }

    /// The url guests open to join. The hash route keeps it working on static hosting.
    pub fn join_url(&self, sid: &str) -> String {
        format!(
            "{}/#/join?sid={}",
            self.config.app_base.trim_end_matches('/'),
            sid
        )
    }

    pub fn sid(&self) -> SessionId {
        self.sid.lock().clone()
    }

    pub fn view(&self) -> HostView {
        self.view.lock().clone()
    }

    pub fn roster(&self) -> Vec<MemberRow> {
        self.view.lock().roster.clone()
    }

    pub fn online(&self) -> Vec<String> {
        self.view.lock().online.clone()
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.view.lock().now_playing.clone()
    }

    pub fn reactions(&self) -> Vec<String> {
        self.view.lock().reactions.clone()
    }

    /// "No likes yet", "1 like", ...
    pub fn reaction_label(&self) -> String {
        like_label(self.view.lock().reactions.len())
    }

    pub fn error(&self) -> Option<String> {
        self.view.lock().error.clone()
    }

    /// A receiver of view events. Every clone competes for the same events.
    pub fn events(&self) -> HostEventReceiver {
        self.event_receiver.clone()
    }

    /// Reads the members of the session into the roster view
    pub async fn poll_roster(&self) -> Result<Vec<MemberRow>, SessionError> {
        let ticket = self.ticket();
        let result = self.store.list_members(&ticket.sid).await;
        let members = self.record(&ticket, result)?;

        if self.is_current(&ticket) {
            let (changed, online) = {
                let mut view = self.view.lock();
                let changed = view.roster != members;
                view.roster = members.clone();

                (changed, self.derive_online(&mut view))
            };

            if changed {
                self.emit(HostEvent::RosterChanged {
                    members: members.clone(),
                });
            }

            self.emit_online(online);
        }

        Ok(members)
    }

    /// Reads fresh heartbeats, returning the members they make online.
    /// Heartbeats of anyone missing from the roster don't count.
    pub async fn poll_presence(&self) -> Result<Vec<String>, SessionError> {
        let ticket = self.ticket();
        let cutoff = presence_cutoff(Utc::now(), self.config.cadence.presence_ttl());

        let result = self.store.list_presence(&ticket.sid, cutoff).await;
        let rows = self.record(&ticket, result)?;

        if !self.is_current(&ticket) {
            return Ok(online_set(&rows, &self.roster(), cutoff));
        }

        let (online, changed) = {
            let mut view = self.view.lock();
            view.presence = rows;
            let changed = self.derive_online(&mut view);

            (view.online.clone(), changed)
        };

        self.emit_online(changed);
        Ok(online)
    }

    /// Removes a member from the session. Their device notices on its next heartbeat.
    pub async fn kick(&self, username: &str) -> Result<(), SessionError> {
        let sid = self.sid();

        self.store.delete_member(&sid, username).await?;
        self.store.delete_presence(&sid, username).await?;

        info!("Kicked {} from {}", username, sid);

        let (members, online) = {
            let mut view = self.view.lock();
            view.roster.retain(|m| m.username != username);
            view.presence.retain(|p| p.username != username);

            (view.roster.clone(), self.derive_online(&mut view))
        };

        self.emit(HostEvent::RosterChanged { members });
        self.emit_online(online);

        Ok(())
    }

    /// Asks the streaming service what is playing and replicates it to the session.
    ///
    /// Nothing playing leaves the stored row alone, so guests keep seeing the last track.
    pub async fn reconcile_playback(&self) -> Result<Option<Track>, SessionError> {
        let ticket = self.ticket();
        let access_token = self.access_token()?;

        match self.streaming.currently_playing(&access_token).await {
            Ok(None) => {
                self.set_now_playing(&ticket, None);
                Ok(None)
            }
            Ok(Some(track)) => {
                if !self.is_current(&ticket) {
                    return Ok(Some(track));
                }

                let track_changed = self.set_now_playing(&ticket, Some(track.clone()));

                let row = NowPlayingRow::new(&ticket.sid, &track, Utc::now());
                let result = self.store.upsert_now_playing(row).await;
                self.record(&ticket, result)?;

                if track_changed {
                    debug!("Now playing {} in {}", track.uri, ticket.sid);

                    if let Err(err) = self.refresh_reactions(&track.uri).await {
                        warn!("Could not read reactions for {}: {}", track.uri, err);
                    }
                }

                Ok(Some(track))
            }
            Err(StreamingError::Unauthorized) => {
                warn!("Streaming service rejected the access token, disconnecting");
                self.disconnect()?;

                Err(StreamingError::Unauthorized.into())
            }
            Err(err) => {
                if err.is_transient() {
                    warn!("Could not read playback, retrying next tick: {}", err);
                } else {
                    error!("Could not read playback: {}", err);
                }

                Err(err.into())
            }
        }
    }

    /// Reads who reacted to `uri`
    pub async fn refresh_reactions(&self, uri: &str) -> Result<Vec<String>, SessionError> {
        let ticket = self.ticket();
        let result = self.store.liked_songs_for_uri(&ticket.sid, uri).await;
        let likes = self.record(&ticket, result)?;
        let usernames = active_reactions(&likes, uri);

        if self.is_current(&ticket) {
            let applied = {
                let mut view = self.view.lock();
                let is_playing = view.now_playing.as_ref().map(|t| t.uri.as_str()) == Some(uri);

                if is_playing {
                    view.reactions = usernames.clone();
                }

                is_playing
            };

            if applied {
                self.emit(HostEvent::ReactionsChanged {
                    uri: uri.to_string(),
                    usernames: usernames.clone(),
                });
            }
        }

        Ok(usernames)
    }

    /// Reads reactions to whatever is playing
    pub async fn refresh_current_reactions(&self) -> Result<Vec<String>, SessionError> {
        let uri = self.view.lock().now_playing.as_ref().map(|t| t.uri.clone());

        match uri {
            Some(uri) => self.refresh_reactions(&uri).await,
            None => {
                self.view.lock().reactions.clear();
                Ok(vec![])
            }
        }
    }

    /// Adds a track to the playback queue of the connected account
    pub async fn enqueue(&self, uri: &str) -> Result<(), SessionError> {
        let uri = uri.trim();

        if !is_playable_uri(uri) {
            return Err(SessionError::InvalidUri(uri.to_string()));
        }

        let access_token = self.access_token()?;

        match self.streaming.enqueue(&access_token, uri).await {
            Ok(()) => {
                info!("Queued {}", uri);
                Ok(())
            }
            Err(err) => {
                if err.is_unauthorized() {
                    self.disconnect()?;
                }

                Err(err.into())
            }
        }
    }

    /// Searches for tracks to queue. An empty query finds nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<Track>, SessionError> {
        let query = query.trim();

        if query.is_empty() {
            return Ok(vec![]);
        }

        let access_token = self.access_token()?;

        match self.streaming.search(&access_token, query).await {
            Ok(tracks) => Ok(tracks),
            Err(err) => {
                if err.is_unauthorized() {
                    self.disconnect()?;
                }

                Err(err.into())
            }
        }
    }

    /// Deletes heartbeats too old to count, returning how many went away
    pub async fn sweep_stale_presence(&self) -> Result<u64, SessionError> {
        let sid = self.sid();
        let cutoff = presence_cutoff(Utc::now(), self.config.cadence.presence_ttl());

        let removed = self.store.clear_stale_presence(&sid, cutoff).await?;

        if removed > 0 {
            debug!("Swept {} stale heartbeats from {}", removed, sid);
        }

        Ok(removed)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.lock().status()
    }

    /// Starts authorizing with the streaming service, returning the url to open in a popup
    pub fn begin_authorization(&self) -> Result<Url, SessionError> {
        let url = self
            .connection
            .lock()
            .begin_authorization(&self.config.streaming, Utc::now())?;

        self.emit_connection();
        Ok(url)
    }

    /// Takes the token message posted by the authorization popup
    pub fn complete_authorization(&self, message: AuthorizationMessage) -> Result<(), SessionError> {
        let tokens = self
            .connection
            .lock()
            .complete_authorization(message, Utc::now())?;

        info!("Connected to the streaming service");
        self.emit_connection();

        self.storage.set_json(TOKENS_KEY, &tokens)?;
        Ok(())
    }

    /// The popup was closed before it posted anything
    pub fn cancel_authorization(&self) {
        if self.connection.lock().cancel_authorization() {
            self.emit_connection();
        }
    }

    /// Gives up on an authorization pending for longer than the configured timeout
    pub fn expire_authorization(&self) -> bool {
        let expired = self.connection.lock().expire_authorization(Utc::now());

        if expired {
            self.emit_connection();
        }

        expired
    }

    /// Forgets the streaming tokens
    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.connection.lock().disconnect();

        let cleared = {
            let mut view = self.view.lock();
            let was_playing = view.now_playing.take().is_some();
            view.reactions.clear();

            was_playing
        };

        if cleared {
            self.emit(HostEvent::NowPlayingChanged { track: None });
        }

        self.emit_connection();
        self.storage.remove(TOKENS_KEY)?;

        Ok(())
    }

    /// Starts polling, playback reconciliation and the reaction subscription
    pub fn start(&self) {
        let mut loops = self.loops.lock();

        if !loops.is_empty() {
            return;
        }

        let cadence = &self.config.cadence;

        loops.push(self.spawn_loop(cadence.roster, |host| async move {
            if let Err(err) = host.poll_roster().await {
                debug!("Roster poll failed: {}", err);
            }
        }));

        loops.push(self.spawn_loop(cadence.presence, |host| async move {
            if let Err(err) = host.poll_presence().await {
                debug!("Presence poll failed: {}", err);
            }

            if let Err(err) = host.sweep_stale_presence().await {
                debug!("Presence sweep failed: {}", err);
            }
        }));

        loops.push(self.spawn_loop(cadence.playback, |host| async move {
            host.expire_authorization();

            if host.connection_status() == ConnectionStatus::Connected {
                // Failures are logged and recorded where they happen
                let _ = host.reconcile_playback().await;
            }
        }));

        *self.reactions_loop.lock() = Some(self.spawn_reactions_loop());

        info!("Started hosting {}", self.sid());
        self.emit(HostEvent::SessionChanged {
            sid: self.sid(),
            join_url: self.join_url(&self.sid()),
        });
    }

    /// Stops every loop. Results still in flight are discarded.
    pub fn stop(&self) {
        for handle in self.loops.lock().drain(..) {
            handle.abort();
        }

        if let Some(handle) = self.reactions_loop.lock().take() {
            handle.abort();
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn spawn_loop<F, Fut>(&self, period: Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let me = self.me.clone();

        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let Some(host) = me.upgrade() else {
                    break;
                };

                tick(host).await;
            }
        })
    }

    fn spawn_reactions_loop(&self) -> JoinHandle<()> {
        let me = self.me.clone();
        let store = self.store.clone();
        let sid = self.sid();

        tokio::spawn(async move {
            let subscription = match store.subscribe(Table::LikedSongs, &sid).await {
                Ok(subscription) => subscription,
                Err(err) => {
                    error!("Could not subscribe to reactions in {}: {}", sid, err);
                    return;
                }
            };

            let changes = subscription.into_stream();
            pin_mut!(changes);

            while changes.next().await.is_some() {
                let Some(host) = me.upgrade() else {
                    break;
                };

                if let Err(err) = host.refresh_current_reactions().await {
                    warn!("Could not refresh reactions: {}", err);
                }
            }
        })
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            sid: self.sid(),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
            && *self.sid.lock() == ticket.sid
    }

    fn access_token(&self) -> Result<String, SessionError> {
        self.connection
            .lock()
            .access_token()
            .map(str::to_string)
            .ok_or(SessionError::NotConnected)
    }

    /// Keeps the error view in line with the outcome of a backend read
    fn record<T>(&self, ticket: &Ticket, result: Result<T, StoreError>) -> Result<T, SessionError> {
        let current = self.is_current(ticket);

        match result {
            Ok(value) => {
                let cleared = current && self.view.lock().error.take().is_some();

                if cleared {
                    self.emit(HostEvent::ErrorCleared);
                }

                Ok(value)
            }
            Err(err) => {
                warn!("Backend request failed: {}", err);

                if current {
                    let message = err.to_string();
                    self.view.lock().error = Some(message.clone());
                    self.emit(HostEvent::ErrorRecorded { message });
                }

                Err(err.into())
            }
        }
    }

    /// Returns true if the track uri changed
    fn set_now_playing(&self, ticket: &Ticket, track: Option<Track>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        let (changed, uri_changed) = {
            let mut view = self.view.lock();

            let changed = view.now_playing != track;
            let uri_changed =
                view.now_playing.as_ref().map(|t| &t.uri) != track.as_ref().map(|t| &t.uri);

            if uri_changed {
                view.reactions.clear();
            }

            view.now_playing = track.clone();
            (changed, uri_changed)
        };

        if changed {
            self.emit(HostEvent::NowPlayingChanged { track });
        }

        uri_changed
    }

    /// Returns the online set if it changed
    fn derive_online(&self, view: &mut HostView) -> Option<Vec<String>> {
        let cutoff = presence_cutoff(Utc::now(), self.config.cadence.presence_ttl());
        let online = online_set(&view.presence, &view.roster, cutoff);

        if online == view.online {
            return None;
        }

        view.online = online.clone();
        Some(online)
    }

    fn emit_online(&self, online: Option<Vec<String>>) {
        if let Some(online) = online {
            self.emit(HostEvent::OnlineChanged { online });
        }
    }

    fn emit_connection(&self) {
        let status = self.connection_status();
        self.emit(HostEvent::ConnectionChanged { status });
    }

    fn emit(&self, event: HostEvent) {
        send_event(&self.event_sender, &self.event_receiver, event);
    }
}

impl<Db, S, St> Drop for SessionController<Db, S, St> {
    fn drop(&mut self) {
        for handle in self.loops.get_mut().drain(..) {
            handle.abort();
        }

        if let Some(handle) = self.reactions_loop.get_mut().take() {
            handle.abort();
        }
    }
}

fn resume_or_create<S: LocalStorage>(storage: &S) -> Result<SessionId, SessionError> {
    if let Some(sid) = storage.get(HOST_SID_KEY).filter(|s| !s.is_empty()) {
        return Ok(sid);
    }

    let sid = new_session_id();
    storage.set(HOST_SID_KEY, &sid)?;
    info!("Created session {}", sid);

    Ok(sid)
}

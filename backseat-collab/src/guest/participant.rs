use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

use backseat_core::{like_label, Cadence};
use chrono::Utc;
use futures_util::{pin_mut, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use super::{resolve_sid, Heartbeat, Mode, ParticipantError};
use crate::{
    events::{event_channel, send_event},
    Credentials, CurrentUser, GuestEvent, GuestEventReceiver, GuestEventSender, Identity,
    LikedSongRow, LocalStorage, MemberRow, NewLikedSong, NewMember, NowPlayingRow, SessionId,
    Store, Table,
};

/// What the guest shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestView {
    pub mode: Mode,
    pub user: Option<CurrentUser>,
    /// Members of the session, oldest first
    pub roster: Vec<MemberRow>,
    pub now_playing: Option<NowPlayingRow>,
    /// This guest's reactions, newest first
    pub my_likes: Vec<LikedSongRow>,
    /// The last failed reaction, shown next to the button
    pub error: Option<String>,
}

/// Runs a guest device: local identity, membership, heartbeats and reactions
pub struct ParticipantController<Db, S> {
    me: Weak<Self>,
    store: Arc<Db>,
    identity: Identity<S>,
    cadence: Cadence,
    sid: SessionId,

    /// Bumped whenever the guest stops being joined, so heartbeats in flight don't write
    epoch: AtomicU64,
    mounted: AtomicBool,
    view: Mutex<GuestView>,

    heartbeat_loop: Mutex<Option<JoinHandle<()>>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,

    event_sender: GuestEventSender,
    event_receiver: GuestEventReceiver,
}

impl<Db, S> ParticipantController<Db, S>
where
    Db: Store,
    S: LocalStorage,
{
    /// Creates a guest for the session named by the join url
    pub fn new(store: &Arc<Db>, storage: &Arc<S>, cadence: Cadence, join_url: &str) -> Arc<Self> {
        let sid = resolve_sid(join_url);
        let (event_sender, event_receiver) = event_channel();

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store: store.clone(),
            identity: Identity::new(storage),
            cadence,
            sid,
            epoch: AtomicU64::new(0),
            mounted: AtomicBool::new(false),
            view: Default::default(),
            heartbeat_loop: Default::default(),
            watchers: Default::default(),
            event_sender,
            event_receiver,
        })
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn view(&self) -> GuestView {
        self.view.lock().clone()
    }

    pub fn mode(&self) -> Mode {
        self.view.lock().mode
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.view.lock().user.clone()
    }

    pub fn now_playing(&self) -> Option<NowPlayingRow> {
        self.view.lock().now_playing.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.view.lock().error.clone()
    }

    /// A receiver of view events. Every clone competes for the same events.
    pub fn events(&self) -> GuestEventReceiver {
        self.event_receiver.clone()
    }

    /// Loads the views and starts watching the session.
    /// A device that already joined this session resumes without logging in again.
    pub async fn mount(&self) -> Mode {
        self.mounted.store(true, Ordering::SeqCst);

        let resumable = self
            .identity
            .current_user()
            .filter(|user| user.sid == self.sid);

        if let Some(user) = resumable {
            info!("Resuming as {} in {}", user.username, self.sid);
            self.enter_joined(user);
        }

        if let Err(err) = self.refresh_roster().await {
            warn!("Could not read the roster: {}", err);
        }

        if let Err(err) = self.observe_now_playing().await {
            warn!("Could not read what is playing: {}", err);
        }

        if let Err(err) = self.my_likes().await {
            warn!("Could not read liked songs: {}", err);
        }

        self.watch();
        self.mode()
    }

    /// Stops every loop and subscription. Results still in flight are discarded.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);

        self.stop_heartbeat();

        for handle in self.watchers.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn show_signup(&self) -> bool {
        self.switch_mode(Mode::Signup)
    }

    pub fn show_login(&self) -> bool {
        self.switch_mode(Mode::Login)
    }

    pub fn show_menu(&self) -> bool {
        self.switch_mode(Mode::Menu)
    }

    /// Creates a local identity and joins the session with it
    pub async fn signup(
        &self,
        username: &str,
        passcode: &str,
        favorite: Option<String>,
    ) -> Result<CurrentUser, ParticipantError> {
        self.ensure_not_joined()?;

        let user = self.identity.register(
            Credentials {
                username: username.to_string(),
                passcode: passcode.to_string(),
            },
            favorite,
        )?;

        let current = self.identity.set_current(&user, &self.sid)?;
        self.join(current).await
    }

    /// Joins the session with an identity created earlier on this device
    pub async fn login(
        &self,
        username: &str,
        passcode: &str,
    ) -> Result<CurrentUser, ParticipantError> {
        self.ensure_not_joined()?;

        let user = self.identity.verify(Credentials {
            username: username.to_string(),
            passcode: passcode.to_string(),
        })?;

        let current = self.identity.set_current(&user, &self.sid)?;
        self.join(current).await
    }

    /// Leaves the session and forgets the current identity
    pub async fn leave(&self) -> Result<(), ParticipantError> {
        let user = self.joined_user().ok_or(ParticipantError::NotJoined)?;

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.stop_heartbeat();

        let deleted = async {
            self.store.delete_member(&self.sid, &user.username).await?;
            self.store.delete_presence(&self.sid, &user.username).await
        };

        if let Err(err) = deleted.await {
            // Still a member, keep the heartbeat going
            self.start_heartbeat();
            return Err(err.into());
        }

        self.identity.clear_current()?;
        self.enter_menu();

        info!("{} left {}", user.username, self.sid);

        if let Err(err) = self.refresh_roster().await {
            debug!("Could not read the roster: {}", err);
        }

        Ok(())
    }

    /// Checks the membership is still there, and if so writes a heartbeat.
    /// A missing membership means the host removed this guest.
    pub async fn heartbeat(&self) -> Result<Heartbeat, ParticipantError> {
        self.beat(self.epoch.load(Ordering::SeqCst)).await
    }

    /// A heartbeat for a loop started in `epoch`. Once the epoch moved on it does nothing.
    async fn beat(&self, epoch: u64) -> Result<Heartbeat, ParticipantError> {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Ok(Heartbeat::Idle);
        }

        let Some(user) = self.joined_user() else {
            return Ok(Heartbeat::Idle);
        };

        let member = self.store.member(&self.sid, &user.username).await?;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            return Ok(Heartbeat::Idle);
        }

        if member.is_none() {
            self.kicked(&user).await;
            return Ok(Heartbeat::Kicked);
        }

        self.store
            .upsert_presence(&self.sid, &user.username, Utc::now())
            .await?;

        Ok(Heartbeat::Alive)
    }

    /// Reads what the host is playing
    pub async fn observe_now_playing(&self) -> Result<Option<NowPlayingRow>, ParticipantError> {
        let now_playing = self.store.now_playing(&self.sid).await?;

        if self.mounted.load(Ordering::SeqCst) {
            let changed = {
                let mut view = self.view.lock();
                let changed = view.now_playing != now_playing;
                view.now_playing = now_playing.clone();

                changed
            };

            if changed {
                self.emit(GuestEvent::NowPlayingChanged {
                    now_playing: now_playing.clone(),
                });
            }
        }

        Ok(now_playing)
    }

    /// Likes the track on screen. Liking it again changes nothing.
    pub async fn react(&self) -> Result<LikedSongRow, ParticipantError> {
        let user = self.joined_user().ok_or(ParticipantError::NotJoined)?;
        let now_playing = self
            .now_playing()
            .ok_or(ParticipantError::NothingPlaying)?;

        self.view.lock().error = None;

        let result = self
            .store
            .upsert_liked_song(NewLikedSong {
                sid: self.sid.clone(),
                username: user.username,
                track: now_playing.track(),
            })
            .await;

        match result {
            Ok(like) => {
                self.emit(GuestEvent::Reacted {
                    uri: like.uri.clone(),
                });

                if let Err(err) = self.my_likes().await {
                    debug!("Could not read liked songs: {}", err);
                }

                Ok(like)
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Could not save reaction: {}", message);

                self.view.lock().error = Some(message.clone());
                self.emit(GuestEvent::ErrorRecorded { message });

                Err(err.into())
            }
        }
    }

    /// The reactions of the current user in this session, newest first
    pub async fn my_likes(&self) -> Result<Vec<LikedSongRow>, ParticipantError> {
        let Some(user) = self.current_user() else {
            self.view.lock().my_likes.clear();
            return Ok(vec![]);
        };

        let likes = self
            .store
            .liked_songs_for_user(&self.sid, &user.username)
            .await?;

        self.view.lock().my_likes = likes.clone();
        Ok(likes)
    }

    /// How many people liked what is playing, as a label
    pub async fn like_label(&self) -> Result<String, ParticipantError> {
        let Some(now_playing) = self.now_playing() else {
            return Ok(like_label(0));
        };

        let likes = self
            .store
            .liked_songs_for_uri(&self.sid, &now_playing.uri)
            .await?;

        Ok(like_label(likes.len()))
    }

    /// Reads the members of the session
    pub async fn refresh_roster(&self) -> Result<Vec<MemberRow>, ParticipantError> {
        let members = self.store.list_members(&self.sid).await?;

        if self.mounted.load(Ordering::SeqCst) {
            let changed = {
                let mut view = self.view.lock();
                let changed = view.roster != members;
                view.roster = members.clone();

                changed
            };

            if changed {
                self.emit(GuestEvent::RosterChanged {
                    members: members.clone(),
                });
            }
        }

        Ok(members)
    }

    async fn join(&self, current: CurrentUser) -> Result<CurrentUser, ParticipantError> {
        let new_member = NewMember {
            sid: self.sid.clone(),
            username: current.username.clone(),
            favorite: current.favorite.clone(),
        };

        if let Err(err) = self.store.upsert_member(new_member).await {
            // Not a member, so there is nothing to resume later
            if let Err(clear_err) = self.identity.clear_current() {
                warn!("Could not clear current user: {}", clear_err);
            }

            return Err(err.into());
        }

        info!("{} joined {}", current.username, self.sid);
        self.enter_joined(current.clone());

        if let Err(err) = self.refresh_roster().await {
            debug!("Could not read the roster: {}", err);
        }

        if let Err(err) = self.my_likes().await {
            debug!("Could not read liked songs: {}", err);
        }

        Ok(current)
    }

    async fn kicked(&self, user: &CurrentUser) {
        info!("{} was removed from {}", user.username, self.sid);

        self.epoch.fetch_add(1, Ordering::SeqCst);

        // Possibly called from the heartbeat loop itself, so it is not aborted here.
        // It started in an earlier epoch and ends on its next tick.
        drop(self.heartbeat_loop.lock().take());

        if let Err(err) = self.store.delete_presence(&self.sid, &user.username).await {
            warn!("Could not delete presence after removal: {}", err);
        }

        if let Err(err) = self.identity.clear_current() {
            error!("Could not clear current user: {}", err);
        }

        self.emit(GuestEvent::Kicked {
            username: user.username.clone(),
        });
        self.enter_menu();
    }

    fn ensure_not_joined(&self) -> Result<(), ParticipantError> {
        match self.joined_user() {
            Some(user) => Err(ParticipantError::AlreadyJoined(user.username)),
            None => Ok(()),
        }
    }

    fn joined_user(&self) -> Option<CurrentUser> {
        let view = self.view.lock();

        match view.mode {
            Mode::Joined => view.user.clone(),
            _ => None,
        }
    }

    fn enter_joined(&self, user: CurrentUser) {
        {
            let mut view = self.view.lock();
            view.mode = Mode::Joined;
            view.user = Some(user);
        }

        self.emit(GuestEvent::ModeChanged { mode: Mode::Joined });
        self.start_heartbeat();
    }

    fn enter_menu(&self) {
        {
            let mut view = self.view.lock();
            view.mode = Mode::Menu;
            view.user = None;
            view.my_likes.clear();
            view.error = None;
        }

        self.emit(GuestEvent::ModeChanged { mode: Mode::Menu });
    }

    /// Moves between the screens before joining
    fn switch_mode(&self, mode: Mode) -> bool {
        let switched = {
            let mut view = self.view.lock();

            if view.mode == Mode::Joined || view.mode == mode {
                false
            } else {
                view.mode = mode;
                true
            }
        };

        if switched {
            self.emit(GuestEvent::ModeChanged { mode });
        }

        switched
    }

    fn start_heartbeat(&self) {
        let mut heartbeat_loop = self.heartbeat_loop.lock();

        if matches!(heartbeat_loop.as_ref(), Some(handle) if !handle.is_finished()) {
            return;
        }

        let me = self.me.clone();
        let period = self.cadence.heartbeat;
        let epoch = self.epoch.load(Ordering::SeqCst);

        *heartbeat_loop = Some(tokio::spawn(async move {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let Some(guest) = me.upgrade() else {
                    break;
                };

                match guest.beat(epoch).await {
                    Ok(Heartbeat::Alive) => {}
                    Ok(Heartbeat::Idle) | Ok(Heartbeat::Kicked) => break,
                    // The next tick retries
                    Err(err) => warn!("Heartbeat failed: {}", err),
                }
            }
        }));
    }

    fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat_loop.lock().take() {
            handle.abort();
        }
    }

    /// Refreshes views whenever the host or other guests change something
    fn watch(&self) {
        let mut watchers = self.watchers.lock();

        if !watchers.is_empty() {
            return;
        }

        watchers.push(self.spawn_watcher(Table::NowPlaying, |guest| async move {
            if let Err(err) = guest.observe_now_playing().await {
                warn!("Could not read what is playing: {}", err);
            }
        }));

        watchers.push(self.spawn_watcher(Table::Members, |guest| async move {
            if let Err(err) = guest.refresh_roster().await {
                warn!("Could not read the roster: {}", err);
            }
        }));
    }

    fn spawn_watcher<F, Fut>(&self, table: Table, on_change: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let me = self.me.clone();
        let store = self.store.clone();
        let sid = self.sid.clone();

        tokio::spawn(async move {
            let subscription = match store.subscribe(table, &sid).await {
                Ok(subscription) => subscription,
                Err(err) => {
                    error!("Could not subscribe to {:?} in {}: {}", table, sid, err);
                    return;
                }
            };

            let changes = subscription.into_stream();
            pin_mut!(changes);

            while changes.next().await.is_some() {
                let Some(guest) = me.upgrade() else {
                    break;
                };

                on_change(guest).await;
            }
        })
    }

    fn emit(&self, event: GuestEvent) {
        send_event(&self.event_sender, &self.event_receiver, event);
    }
}

impl<Db, S> Drop for ParticipantController<Db, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat_loop.get_mut().take() {
            handle.abort();
        }

        for handle in self.watchers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{eventually, fast_cadence, track, FlakyStore, TestGuest},
        IdentityError, LocalStorage, MemoryStorage, MemoryStore, CURRENT_USER_KEY,
    };

    const JOIN_URL: &str = "https://backseat.example/#/join?sid=S1";

    fn guest(store: &Arc<MemoryStore>, storage: &Arc<MemoryStorage>) -> Arc<TestGuest> {
        ParticipantController::new(store, storage, fast_cadence(), JOIN_URL)
    }

    fn playing_uri(guest: &TestGuest) -> Option<String> {
        guest.now_playing().map(|n| n.uri)
    }

    async fn play(store: &MemoryStore, uri: &str) {
        store
            .upsert_now_playing(NowPlayingRow::new("S1", &track(uri, "X", "Y"), Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signup_joins_and_heartbeats() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));

        assert_eq!(guest.mount().await, Mode::Menu);
        assert!(guest.show_signup());

        guest.signup("alice", "1234", Some("Jazz".into())).await.unwrap();

        assert_eq!(guest.mode(), Mode::Joined);
        let member = store.member("S1", "alice").await.unwrap().unwrap();
        assert_eq!(member.favorite.as_deref(), Some("Jazz"));

        assert_eq!(guest.heartbeat().await.unwrap(), Heartbeat::Alive);
        let since = Utc::now() - chrono::Duration::seconds(30);
        assert_eq!(store.list_presence("S1", since).await.unwrap().len(), 1);

        guest.unmount();
    }

    #[tokio::test]
    async fn test_login_failures_stay_in_menu() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;

        assert!(matches!(
            guest.signup("", "1234", None).await,
            Err(ParticipantError::Identity(IdentityError::MissingCredentials))
        ));
        assert!(matches!(
            guest.login("nobody", "1234").await,
            Err(ParticipantError::Identity(IdentityError::UnknownUser))
        ));

        guest.signup("alice", "1234", None).await.unwrap();
        guest.leave().await.unwrap();

        let error = guest.login("alice", "9999").await.unwrap_err();
        assert_eq!(error.to_string(), "Wrong passcode");
        assert_eq!(guest.mode(), Mode::Menu);
    }

    #[tokio::test]
    async fn test_leave_removes_membership() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let guest = guest(&store, &storage);
        guest.mount().await;

        guest.signup("alice", "1234", None).await.unwrap();
        guest.heartbeat().await.unwrap();
        guest.leave().await.unwrap();

        assert_eq!(guest.mode(), Mode::Menu);
        assert!(store.member("S1", "alice").await.unwrap().is_none());
        assert!(storage.get(CURRENT_USER_KEY).is_none());
        assert!(matches!(guest.leave().await, Err(ParticipantError::NotJoined)));
    }

    #[tokio::test]
    async fn test_resumes_in_same_session_only() {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStorage::new());

        let first = guest(&store, &storage);
        first.mount().await;
        first.signup("alice", "1234", None).await.unwrap();
        first.unmount();

        let reloaded = guest(&store, &storage);
        assert_eq!(reloaded.mount().await, Mode::Joined);
        assert_eq!(reloaded.current_user().unwrap().username, "alice");
        reloaded.unmount();

        let elsewhere = ParticipantController::new(
            &store,
            &storage,
            fast_cadence(),
            "https://backseat.example/#/join?sid=S2",
        );
        assert_eq!(elsewhere.mount().await, Mode::Menu);
        elsewhere.unmount();
    }

    #[tokio::test]
    async fn test_react_requirements() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;

        assert_eq!(
            guest.react().await.unwrap_err().to_string(),
            "Log in first"
        );

        guest.signup("alice", "1234", None).await.unwrap();
        assert_eq!(
            guest.react().await.unwrap_err().to_string(),
            "Nothing playing"
        );

        guest.unmount();
    }

    #[tokio::test]
    async fn test_concurrent_reactions_make_one_row() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;
        guest.signup("alice", "1234", None).await.unwrap();

        play(&store, "spotify:track:T").await;
        assert!(guest.observe_now_playing().await.unwrap().is_some());

        let (first, second) = tokio::join!(guest.react(), guest.react());
        first.unwrap();
        second.unwrap();
        guest.react().await.unwrap();

        assert_eq!(
            store.liked_songs_for_uri("S1", "spotify:track:T").await.unwrap().len(),
            1
        );
        assert_eq!(guest.like_label().await.unwrap(), "1 like");

        guest.unmount();
    }

    #[tokio::test]
    async fn test_now_playing_follows_changes() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;

        assert!(guest.now_playing().is_none());

        play(&store, "spotify:track:T").await;
        assert!(eventually(|| playing_uri(&guest).as_deref() == Some("spotify:track:T")).await);

        play(&store, "spotify:track:Q").await;
        assert!(eventually(|| playing_uri(&guest).as_deref() == Some("spotify:track:Q")).await);

        guest.unmount();
    }

    #[tokio::test]
    async fn test_my_likes_newest_first() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;
        guest.signup("alice", "1234", None).await.unwrap();

        for uri in ["spotify:track:A", "spotify:track:B"] {
            play(&store, uri).await;
            guest.observe_now_playing().await.unwrap();
            guest.react().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let uris: Vec<_> = guest.my_likes().await.unwrap().into_iter().map(|l| l.uri).collect();
        assert_eq!(uris, vec!["spotify:track:B", "spotify:track:A"]);
        assert_eq!(guest.view().my_likes.len(), 2);

        guest.unmount();
    }

    #[tokio::test]
    async fn test_roster_is_visible_from_menu() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_member(NewMember {
                sid: "S1".into(),
                username: "bo".into(),
                favorite: None,
            })
            .await
            .unwrap();

        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;

        let names: Vec<_> = guest.view().roster.into_iter().map(|m| m.username).collect();
        assert_eq!(names, vec!["bo"]);

        guest.unmount();
    }

    async fn presence_count(store: &MemoryStore) -> usize {
        let since = Utc::now() - chrono::Duration::seconds(30);
        store.list_presence("S1", since).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_loops_of_a_kicked_login_stop_on_unmount() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;
        guest.signup("alice", "1234", None).await.unwrap();

        store.delete_member("S1", "alice").await.unwrap();
        assert_eq!(guest.heartbeat().await.unwrap(), Heartbeat::Kicked);

        guest.login("alice", "1234").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        guest.unmount();

        store.delete_presence("S1", "alice").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(presence_count(&store).await, 0);
    }

    #[tokio::test]
    async fn test_signing_in_while_joined_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        guest.mount().await;
        guest.signup("alice", "1234", None).await.unwrap();

        assert!(matches!(
            guest.signup("bo", "1234", None).await,
            Err(ParticipantError::AlreadyJoined(name)) if name == "alice"
        ));
        assert!(matches!(
            guest.login("alice", "1234").await,
            Err(ParticipantError::AlreadyJoined(_))
        ));

        let names: Vec<_> = store
            .list_members("S1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.username)
            .collect();
        assert_eq!(names, vec!["alice"]);
        assert_eq!(guest.current_user().unwrap().username, "alice");

        guest.unmount();
    }

    #[tokio::test]
    async fn test_unchanged_roster_emits_nothing() {
        let store = Arc::new(MemoryStore::new());
        let guest = guest(&store, &Arc::new(MemoryStorage::new()));
        let events = guest.events();
        store
            .upsert_member(NewMember {
                sid: "S1".into(),
                username: "bo".into(),
                favorite: None,
            })
            .await
            .unwrap();

        guest.mount().await;
        events.try_iter().for_each(drop);

        for _ in 0..100 {
            guest.refresh_roster().await.unwrap();
        }

        assert!(events.is_empty());
        guest.unmount();
    }

    #[tokio::test]
    async fn test_heartbeat_failures_are_retried() {
        let store = FlakyStore::new();
        let guest = ParticipantController::new(
            &store,
            &Arc::new(MemoryStorage::new()),
            fast_cadence(),
            JOIN_URL,
        );
        guest.mount().await;
        guest.signup("alice", "1234", None).await.unwrap();

        store.set_failing(true);
        store.inner.delete_presence("S1", "alice").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        assert_eq!(guest.mode(), Mode::Joined);
        assert_eq!(presence_count(&store.inner).await, 0);

        store.set_failing(false);

        let mut beating = false;
        for _ in 0..100 {
            if presence_count(&store.inner).await == 1 {
                beating = true;
                break;
            }

            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert!(beating);
        guest.unmount();
    }

    #[tokio::test]
    async fn test_failed_reaction_is_shown() {
        let store = FlakyStore::new();
        let guest = ParticipantController::new(
            &store,
            &Arc::new(MemoryStorage::new()),
            fast_cadence(),
            JOIN_URL,
        );
        let events = guest.events();
        guest.mount().await;
        guest.signup("alice", "1234", None).await.unwrap();

        play(&store.inner, "spotify:track:T").await;
        guest.observe_now_playing().await.unwrap();

        store.set_failing(true);

        assert!(guest.react().await.is_err());
        assert_eq!(guest.error().as_deref(), Some("down"));
        assert!(events.try_iter().any(|e| e
            == GuestEvent::ErrorRecorded {
                message: "down".to_string()
            }));

        store.set_failing(false);

        guest.react().await.unwrap();
        assert!(guest.error().is_none());

        guest.unmount();
    }
}

//! Room synchronization controller.
//!
//! [`RoomSync`] owns the identity, the transports and at most one running
//! room session. Each session runs as its own tokio task:
//!
//! ```text
//!   RoomHandle ──Command──►┐
//!                          │      ┌──────────────┐   Effect    spawned calls
//!   spawned calls ─Inbound─┼─────►│ SessionDriver│───────────► (remote, push)
//!                          │      │ (RoomSession)│
//!   PushSubscription ─event┘      └──────┬───────┘
//!                                        │ watch
//!                                        ▼
//!                                     RoomView
//! ```
//!
//! Only the driver task touches session state. Network calls run in spawned
//! tasks and report back on the session's own inbound channel, so a call
//! that outlives its session has nowhere to deliver its result.

use std::future::Future;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;

use chatsync_core::{
    Completion, Effect, MessageId, NewMessage, Result, RoomId, RoomRef, RoomSession, RoomView,
    SessionId, StreamEvent, SyncError,
};

use crate::config::SyncConfig;
use crate::identity::Identity;
use crate::push::{push_transport, PushSubscription, PushTransport};
use crate::remote::{HttpRemote, RemoteService};

/// Host commands queued per session.
const COMMAND_CAPACITY: usize = 64;

enum Command {
    Activity,
    ToggleViewers(MessageId),
    Send {
        body: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave,
}

/// Results coming back from spawned work, tagged with the issuing session.
enum Inbound {
    Completed(SessionId, Completion),
    Channel(SessionId, Result<PushSubscription>),
}

struct ActiveSession {
    session: SessionId,
    room: RoomRef,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// Entry point for the host: enter and leave rooms.
pub struct RoomSync {
    remote: Arc<dyn RemoteService>,
    push: Arc<dyn PushTransport>,
    identity: Option<Identity>,
    config: SyncConfig,
    active: Option<ActiveSession>,
}

impl RoomSync {
    pub fn new(
        identity: Identity,
        remote: Arc<dyn RemoteService>,
        push: Arc<dyn PushTransport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            push,
            identity: Some(identity),
            config,
            active: None,
        }
    }

    /// Controller over HTTP, with the push transport the config selects.
    pub fn connect(identity: Identity, config: SyncConfig) -> Result<Self> {
        let remote = Arc::new(HttpRemote::new(&config)?);
        let push = push_transport(&config)?;
        Ok(Self::new(identity, remote, push, config))
    }

    /// Start a session for `room`, leaving the current one first.
    pub async fn enter_room(&mut self, room: RoomRef) -> Result<RoomHandle> {
        let identity = self.identity.clone().ok_or(SyncError::SessionClosed)?;
        self.leave_room().await;

        let session = RoomSession::new(room.clone(), identity.user().clone());
        let session_id = session.id();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(session.view());

        let driver = SessionDriver {
            session,
            identity,
            remote: Arc::clone(&self.remote),
            push: Arc::clone(&self.push),
            viewer_permits: Arc::new(Semaphore::new(self.config.viewer_fetch_concurrency())),
            inbound: inbound_tx,
            subscription: None,
            view: view_tx,
        };
        let task = tokio::spawn(driver.run(command_rx, inbound_rx));

        info!("entered room {} ({}) as session {session_id}", room.id, room.label);
        self.active = Some(ActiveSession {
            session: session_id,
            room: room.clone(),
            commands: command_tx.clone(),
            task,
        });

        Ok(RoomHandle {
            session: session_id,
            room,
            commands: command_tx,
            view: view_rx,
        })
    }

    /// End the active session, if any.
    ///
    /// Waits up to the configured shutdown timeout for the session to close
    /// its channel and mark the user inactive, then aborts it.
    pub async fn leave_room(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let ActiveSession {
            session,
            room,
            commands,
            mut task,
        } = active;

        if commands.send(Command::Leave).await.is_err() {
            debug!("session {session} already stopped");
        }

        match tokio::time::timeout(self.config.shutdown_timeout(), &mut task).await {
            Ok(Ok(())) => info!("left room {} (session {session})", room.id),
            Ok(Err(err)) => warn!("room {}: session task failed: {err}", room.id),
            Err(_) => {
                warn!(
                    "room {}: session {session} did not stop within {:?}, aborting",
                    room.id,
                    self.config.shutdown_timeout()
                );
                task.abort();
            }
        }
    }

    /// Leave the room and forget the identity. No room can be entered afterwards.
    pub async fn logout(&mut self) {
        self.leave_room().await;
        if self.identity.take().is_some() {
            info!("logged out");
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn active_room(&self) -> Option<&RoomRef> {
        self.active.as_ref().map(|active| &active.room)
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|active| active.session)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for RoomSync {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

/// Host-side handle to one room session.
#[derive(Clone)]
pub struct RoomHandle {
    session: SessionId,
    room: RoomRef,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<RoomView>,
}

impl RoomHandle {
    /// The user interacted with the room (focus, scroll, keypress).
    pub fn notify_activity(&self) {
        if self.commands.try_send(Command::Activity).is_err() {
            debug!("session {}: activity signal dropped", self.session);
        }
    }

    /// Post a message. On error the host should keep the draft.
    pub async fn send_message(&self, body: impl Into<String>) -> Result<()> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { body, reply })
            .await
            .map_err(|_| SyncError::SessionClosed)?;
        response.await.map_err(|_| SyncError::SessionClosed)?
    }

    /// Reveal or hide the viewer list of a message.
    pub fn toggle_viewers(&self, id: MessageId) {
        if self.commands.try_send(Command::ToggleViewers(id)).is_err() {
            debug!("session {}: viewer toggle dropped", self.session);
        }
    }

    /// Latest published view.
    pub fn view(&self) -> RoomView {
        self.view.borrow().clone()
    }

    /// Wait for the next view. Fails once the session has ended and its
    /// final view was observed.
    pub async fn changed(&mut self) -> Result<RoomView> {
        self.view
            .changed()
            .await
            .map_err(|_| SyncError::SessionClosed)?;
        Ok(self.view.borrow_and_update().clone())
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn room(&self) -> &RoomRef {
        &self.room
    }
}

// ─── Session task ───────────────────────────────────────────────────

struct SessionDriver {
    session: RoomSession,
    identity: Identity,
    remote: Arc<dyn RemoteService>,
    push: Arc<dyn PushTransport>,
    viewer_permits: Arc<Semaphore>,
    inbound: mpsc::UnboundedSender<Inbound>,
    subscription: Option<PushSubscription>,
    view: watch::Sender<RoomView>,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
    ) {
        let effects = self.session.start();
        self.execute_all(effects);
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Leave) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = inbound.recv() => self.handle_inbound(message),
                event = next_push(&mut self.subscription) => match event {
                    Some(event) => {
                        let effects = self.session.on_stream_event(event);
                        self.execute_all(effects);
                    }
                    None => {
                        self.subscription = None;
                        self.session.on_channel_lost();
                    }
                },
            }
            self.publish();
        }

        self.shutdown().await;
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Activity => {
                let effects = self.session.notify_activity();
                self.execute_all(effects);
            }
            Command::ToggleViewers(id) => self.session.toggle_viewers(id),
            Command::Send { body, reply } => self.send(body, reply),
            Command::Leave => {}
        }
    }

    fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Completed(session, completion) => {
                let effects = self.session.complete(session, completion);
                self.execute_all(effects);
            }
            Inbound::Channel(session, Ok(subscription)) => {
                if session != self.session.id() || !self.session.is_active() {
                    debug!("discarding push subscription for stale session {session}");
                    return;
                }
                self.subscription = Some(subscription);
                let effects = self.session.complete(session, Completion::ChannelOpened(Ok(())));
                self.execute_all(effects);
            }
            Inbound::Channel(session, Err(err)) => {
                let effects = self.session.complete(session, Completion::ChannelOpened(Err(err)));
                self.execute_all(effects);
            }
        }
    }

    fn execute_all(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        let remote = Arc::clone(&self.remote);
        let identity = self.identity.clone();
        let room = self.room_id();

        match effect {
            Effect::FetchSnapshot => self.spawn_completion(async move {
                Completion::Snapshot(remote.fetch_history(&identity, room).await)
            }),
            Effect::FetchUnseen => self.spawn_completion(async move {
                Completion::Unseen(remote.fetch_unseen(&identity, room).await)
            }),
            Effect::Acknowledge(batch) => {
                debug!("room {room}: acknowledging {} message(s)", batch.len());
                self.spawn_completion(async move {
                    let result = remote.mark_seen(&identity, room, batch.ids()).await;
                    Completion::Acknowledged { batch, result }
                })
            }
            Effect::FetchViewers(message_id) => {
                let permits = Arc::clone(&self.viewer_permits);
                let inbound = self.inbound.clone();
                let session = self.session.id();
                tokio::spawn(async move {
                    // Closed when the session shuts down: queued fetches never start.
                    let Ok(_permit) = permits.acquire_owned().await else {
                        debug!("room {room}: viewer fetch for message {message_id} dropped");
                        return;
                    };
                    let result = remote.fetch_viewers(&identity, room, message_id).await;
                    let completion = Completion::Viewers { message_id, result };
                    let _ = inbound.send(Inbound::Completed(session, completion));
                });
            }
            Effect::OpenChannel => {
                let push = Arc::clone(&self.push);
                let inbound = self.inbound.clone();
                let session = self.session.id();
                tokio::spawn(async move {
                    let result = push.subscribe(&identity, room).await;
                    let _ = inbound.send(Inbound::Channel(session, result));
                });
            }
            Effect::CloseChannel => {
                if let Some(mut subscription) = self.subscription.take() {
                    subscription.close();
                }
            }
            Effect::MarkInactive => {
                tokio::spawn(async move {
                    if let Err(err) = remote.mark_inactive(&identity, room).await {
                        warn!("room {room}: mark inactive failed: {err}");
                    }
                });
            }
        }
    }

    fn send(&mut self, body: String, reply: oneshot::Sender<Result<()>>) {
        let message = match NewMessage::new(body, self.session.me().clone(), self.session.room().clone()) {
            Ok(message) => message,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };

        let remote = Arc::clone(&self.remote);
        let identity = self.identity.clone();
        self.spawn_completion(async move {
            let result = remote.send_message(&identity, &message).await;
            let _ = reply.send(result.clone());
            Completion::Sent(result)
        });
    }

    fn spawn_completion<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let inbound = self.inbound.clone();
        let session = self.session.id();
        tokio::spawn(async move {
            let completion = call.await;
            if inbound.send(Inbound::Completed(session, completion)).is_err() {
                debug!("session {session} gone, result dropped");
            }
        });
    }

    async fn shutdown(mut self) {
        let room = self.room_id();
        self.viewer_permits.close();
        for effect in self.session.close() {
            match effect {
                Effect::MarkInactive => {
                    if let Err(err) = self.remote.mark_inactive(&self.identity, room).await {
                        warn!("room {room}: mark inactive failed: {err}");
                    }
                }
                other => self.execute(other),
            }
        }
        self.session.finish();
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(self.session.view());
    }

    fn room_id(&self) -> RoomId {
        self.session.room().id
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        // An aborted task skips shutdown.
        self.viewer_permits.close();
    }
}

async fn next_push(subscription: &mut Option<PushSubscription>) -> Option<StreamEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

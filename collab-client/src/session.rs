//! CollabSession - the main interface for diagram collaboration.
//!
//! A session joins one collaboration room as one user. It keeps the roster,
//! the lock map and the remote cursors up to date from inbound messages,
//! dispatches every accepted message to subscribers, and sends local changes
//! with outbound throttling applied.
//!
//! # Example
//!
//! ```ignore
//! use collab_client::{CollabSession, SessionConfig, WebSocketTransport};
//!
//! let config = SessionConfig::new("room-1".into(), "u-42".into(), "Ada");
//! let session = CollabSession::new(config, WebSocketTransport::new());
//!
//! let _sub = session.subscribe(|event| println!("{event:?}"));
//! session.join().await?;
//! session.request_lock("n1").await?;
//! session.run().await;
//! ```
//!
//! All state changes happen synchronously while handling one message, under
//! a lock that is never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use collab_core::{
    color_for, ConnectionEvent, CursorOverlay, Dispatcher, LockRequest, MessageClock,
    PresenceEffect, PresenceStore, ReconnectPolicy, Subscription, Throttle, ThrottleCategory,
    User, UserView, DEFAULT_THROTTLE_WINDOW,
};
use collab_types::{
    CodecError, CursorMove, DiagramEdge, DiagramNode, EdgeUpdate, Lock, Message, NodeId,
    NodeUpdate, Payload, Point, PresenceAction, SessionId, Unlock, UserId, UserInfo,
    UserPresence,
};
use thiserror::Error;

use crate::config::{ClientConfig, ServerConfig};
use crate::connection::{ConnectParams, ConnectionError, ConnectionManager, Recovery, SendOutcome};
use crate::transport::Transport;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Opening the connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// An outbound message could not be encoded.
    #[error("encoding failed: {0}")]
    Codec(#[from] CodecError),
}

/// Configuration for a [`CollabSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Room to join.
    pub session_id: SessionId,
    /// Local user id.
    pub user_id: UserId,
    /// Local display name.
    pub user_name: String,
    /// Relay endpoint.
    pub server: ServerConfig,
    /// Reconnection bounds.
    pub reconnect: ReconnectPolicy,
    /// Outbound throttle window.
    pub throttle_window: Duration,
    /// Idle threshold for roster views.
    pub idle_after: Duration,
    /// Answer joins with a snapshot when designated.
    pub answer_joins: bool,
}

impl SessionConfig {
    /// Create a configuration with default endpoint and timings.
    pub fn new(session_id: SessionId, user_id: UserId, user_name: impl Into<String>) -> Self {
        Self::from_client_config(&ClientConfig::default(), session_id, user_id, user_name)
    }

    /// Create a configuration from a loaded [`ClientConfig`].
    pub fn from_client_config(
        client: &ClientConfig,
        session_id: SessionId,
        user_id: UserId,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            user_id,
            user_name: user_name.into(),
            server: client.server.clone(),
            reconnect: client.reconnect_policy(),
            throttle_window: client.throttle_window(),
            idle_after: client.idle_after(),
            answer_joins: client.presence.answer_joins,
        }
    }

    fn local_user(&self) -> UserInfo {
        UserInfo {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            color: Some(color_for(&self.user_id)),
        }
    }
}

/// Everything a subscriber can be told.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An inbound message from another user, already applied to the session.
    Received(Message),
    /// Connection lifecycle change.
    Connection(ConnectionEvent),
    /// A lock the local user asked for is held by someone else.
    LockDenied {
        /// The contested node.
        node_id: NodeId,
        /// Its holder.
        locked_by: UserId,
    },
    /// A lock the local user claimed crossed another request, which won.
    LockLost {
        /// The contested node.
        node_id: NodeId,
        /// The new holder.
        locked_by: UserId,
    },
}

/// Result of one [`CollabSession::pump`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// A message was applied and dispatched.
    Handled,
    /// A frame was dropped (malformed, unknown, foreign or our own).
    Ignored,
    /// The connection was lost and is open again.
    Reconnected,
    /// The connection was lost and every reconnection attempt failed.
    Exhausted,
    /// The session is not connected.
    Closed,
}

struct SessionState {
    presence: PresenceStore,
    cursors: CursorOverlay,
    throttle: Throttle,
    clock: MessageClock,
}

/// One user's membership in one collaboration room.
pub struct CollabSession<T: Transport> {
    config: SessionConfig,
    connection: ConnectionManager<T>,
    state: Mutex<SessionState>,
    events: Dispatcher<SessionEvent>,
}

impl<T: Transport> CollabSession<T> {
    /// Create a session. Nothing is sent until [`join`](Self::join).
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let connection = ConnectionManager::new(transport, config.server.clone(), config.reconnect);
        let state = SessionState {
            presence: PresenceStore::new(&config.local_user(), now_ms()),
            cursors: CursorOverlay::new(),
            throttle: Throttle::new(config.throttle_window),
            clock: MessageClock::new(),
        };
        Self {
            config,
            connection,
            state: Mutex::new(state),
            events: Dispatcher::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The room id.
    pub fn session_id(&self) -> &SessionId {
        &self.config.session_id
    }

    /// The local user as a roster entry.
    pub fn local_user(&self) -> UserInfo {
        self.config.local_user()
    }

    /// Whether the connection is open.
    pub async fn is_open(&self) -> bool {
        self.connection.is_open().await
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        self.connection.transport()
    }

    /// Register an event handler.
    pub fn subscribe<F>(&self, handler: F) -> Subscription<SessionEvent>
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    // ===========================================
    // Lifecycle
    // ===========================================

    /// Open the connection and announce the local user.
    pub async fn join(&self) -> Result<(), SessionError> {
        let params = ConnectParams::new(
            self.config.session_id.clone(),
            self.config.user_id.clone(),
            self.config.user_name.clone(),
        );
        self.connection.connect(params).await?;
        self.events
            .dispatch(&SessionEvent::Connection(ConnectionEvent::Connected));
        self.announce(PresenceAction::Joined).await?;
        Ok(())
    }

    /// Announce departure, close the connection and forget remote state.
    ///
    /// Calling it on a session that is not connected only clears state.
    pub async fn leave(&self) {
        let was_open = self.connection.is_open().await;
        if was_open {
            if let Err(e) = self.announce(PresenceAction::Left).await {
                tracing::warn!(error = %e, "could not announce departure");
            }
        }
        self.connection.disconnect().await;

        {
            let mut state = self.state();
            state.presence.reset();
            state.cursors.clear();
            state.throttle.reset();
        }

        if was_open {
            tracing::info!(session = %self.config.session_id, "left session");
            self.events
                .dispatch(&SessionEvent::Connection(ConnectionEvent::Disconnected {
                    reason: "left session".into(),
                }));
        }
    }

    async fn announce(&self, action: PresenceAction) -> Result<SendOutcome, SessionError> {
        self.send_payload(Payload::UserPresence(UserPresence {
            action,
            user: self.config.local_user(),
        }))
        .await
    }

    /// Receive and handle one frame.
    ///
    /// If the connection was lost, runs the reconnection policy first and
    /// announces the local user again once it is back.
    pub async fn pump(&self) -> PumpOutcome {
        match self.connection.recv().await {
            Ok(frame) => {
                if self.handle_frame(&frame).await {
                    PumpOutcome::Handled
                } else {
                    PumpOutcome::Ignored
                }
            }
            Err(e) => {
                if !self.connection.is_open().await {
                    return PumpOutcome::Closed;
                }
                let recovery = self
                    .connection
                    .recover(e.to_string(), |event| {
                        self.events.dispatch(&SessionEvent::Connection(event));
                    })
                    .await;

                match recovery {
                    Recovery::Reconnected => {
                        self.state().throttle.reset();
                        if let Err(e) = self.announce(PresenceAction::Joined).await {
                            tracing::warn!(error = %e, "could not announce rejoin");
                        }
                        self.reannounce_locks().await;
                        PumpOutcome::Reconnected
                    }
                    Recovery::Exhausted => PumpOutcome::Exhausted,
                    Recovery::Stopped => PumpOutcome::Closed,
                }
            }
        }
    }

    /// Announce every local lock again so claims made while the connection
    /// was down meet the current holders.
    async fn reannounce_locks(&self) {
        let held = self.state().presence.local_locks();
        for node_id in held {
            if let Err(e) = self.send_payload(Payload::Lock(Lock { node_id })).await {
                tracing::warn!(error = %e, "could not re-announce lock");
            }
        }
    }

    /// Pump until the session is left or reconnection gives up.
    pub async fn run(&self) -> PumpOutcome {
        loop {
            match self.pump().await {
                PumpOutcome::Handled | PumpOutcome::Ignored | PumpOutcome::Reconnected => {}
                outcome => return outcome,
            }
        }
    }

    // ===========================================
    // Inbound
    // ===========================================

    /// Apply one inbound text frame and dispatch it.
    ///
    /// Returns `false` if the frame was dropped. Malformed frames, unknown
    /// message types, other sessions' messages and our own echoes are
    /// dropped without error.
    pub async fn handle_frame(&self, frame: &str) -> bool {
        let message = match Message::from_json(frame) {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!("ignoring message of unknown type");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed message");
                return false;
            }
        };

        if message.session_id != self.config.session_id {
            tracing::debug!(session = %message.session_id, "ignoring message for another session");
            return false;
        }
        // Skip our own messages
        if message.user_id == self.config.user_id {
            return false;
        }

        let (notices, replies) = self.apply_inbound(&message);

        self.events.dispatch(&SessionEvent::Received(message));
        for notice in &notices {
            self.events.dispatch(notice);
        }
        for reply in replies {
            if let Err(e) = self.send_payload(reply).await {
                tracing::warn!(error = %e, "could not send reply");
            }
        }
        true
    }

    fn apply_inbound(&self, message: &Message) -> (Vec<SessionEvent>, Vec<Payload>) {
        let mut state = self.state();
        let effects = state.presence.apply(message, now_ms());
        state.cursors.apply(message);

        let mut notices = Vec::new();
        let mut replies = Vec::new();
        for effect in effects {
            match effect {
                PresenceEffect::UserJoined {
                    user_id,
                    newly_present,
                } => {
                    if newly_present {
                        tracing::info!(user = %user_id, "user joined");
                    }
                }
                PresenceEffect::UserLeft { user_id, released } => {
                    state.cursors.remove(&user_id);
                    tracing::info!(user = %user_id, released = released.len(), "user left");
                }
                PresenceEffect::AnswerLock(failed) => {
                    tracing::debug!(node = %failed.node_id, "rejecting conflicting lock");
                    replies.push(Payload::LockFailed(failed));
                }
                PresenceEffect::LockDenied { node_id, locked_by } => {
                    notices.push(SessionEvent::LockDenied { node_id, locked_by });
                }
                PresenceEffect::LockLost { node_id, locked_by } => {
                    notices.push(SessionEvent::LockLost { node_id, locked_by });
                }
            }
        }

        if self.config.answer_joins {
            if let Payload::UserPresence(presence) = &message.payload {
                if presence.action == PresenceAction::Joined
                    && state.presence.should_answer_join(&presence.user.user_id)
                {
                    replies.push(Payload::Sync(state.presence.snapshot()));
                }
            }
        }

        (notices, replies)
    }

    // ===========================================
    // Outbound
    // ===========================================

    async fn send_payload(&self, payload: Payload) -> Result<SendOutcome, SessionError> {
        let stamp = self.stamp();
        self.send_stamped(payload, stamp).await
    }

    fn stamp(&self) -> u64 {
        let mut state = self.state();
        let stamp = state.clock.stamp(now_ms());
        state.presence.touch(&self.config.user_id, stamp);
        stamp
    }

    async fn send_stamped(&self, payload: Payload, stamp: u64) -> Result<SendOutcome, SessionError> {
        let message = Message::new(
            self.config.user_id.clone(),
            self.config.user_name.clone(),
            self.config.session_id.clone(),
            stamp,
            payload,
        );
        let frame = message.to_json()?;
        Ok(self.connection.send(&frame).await)
    }

    async fn send_throttled(
        &self,
        category: ThrottleCategory,
        payload: Payload,
    ) -> Result<SendOutcome, SessionError> {
        if !self.connection.is_open().await {
            tracing::warn!("not connected, dropping outbound message");
            return Ok(SendOutcome::Dropped);
        }
        let now = tokio::time::Instant::now().into_std();
        if !self.state().throttle.try_acquire(category, now) {
            return Ok(SendOutcome::Throttled);
        }
        self.send_payload(payload).await
    }

    /// Send the full node list now. Use for structural changes.
    pub async fn send_nodes(&self, nodes: Vec<DiagramNode>) -> Result<SendOutcome, SessionError> {
        self.send_payload(Payload::NodeUpdate(NodeUpdate { nodes })).await
    }

    /// Send the node list while dragging; throttled.
    pub async fn send_node_positions(
        &self,
        nodes: Vec<DiagramNode>,
    ) -> Result<SendOutcome, SessionError> {
        self.send_throttled(
            ThrottleCategory::NodePosition,
            Payload::NodeUpdate(NodeUpdate { nodes }),
        )
        .await
    }

    /// Send the full edge list; throttled.
    pub async fn send_edges(&self, edges: Vec<DiagramEdge>) -> Result<SendOutcome, SessionError> {
        self.send_throttled(ThrottleCategory::Edge, Payload::EdgeUpdate(EdgeUpdate { edges }))
            .await
    }

    /// Send the local pointer position; throttled.
    pub async fn move_cursor(&self, x: f64, y: f64) -> Result<SendOutcome, SessionError> {
        self.send_throttled(ThrottleCategory::Cursor, Payload::CursorMove(CursorMove { x, y }))
            .await
    }

    /// Ask for exclusive edit of a node.
    ///
    /// If someone else already holds it, nothing is sent and
    /// [`LockRequest::HeldBy`] is returned. Otherwise the local user becomes
    /// holder and the lock is announced.
    pub async fn request_lock(&self, node_id: impl Into<NodeId>) -> Result<LockRequest, SessionError> {
        let node_id = node_id.into();
        let (request, stamp) = {
            let mut state = self.state();
            let stamp = state.clock.stamp(now_ms());
            (state.presence.claim_local(&node_id, stamp), stamp)
        };

        if request == LockRequest::Granted {
            self.send_stamped(Payload::Lock(Lock { node_id }), stamp).await?;
        }
        Ok(request)
    }

    /// Release a node and announce it.
    pub async fn release_lock(&self, node_id: impl Into<NodeId>) -> Result<SendOutcome, SessionError> {
        let node_id = node_id.into();
        self.state().presence.release(&node_id);
        self.send_payload(Payload::Unlock(Unlock { node_id })).await
    }

    // ===========================================
    // Queries
    // ===========================================

    /// Whether a node is held by someone other than the local user.
    pub fn is_locked_by_other(&self, node_id: &NodeId) -> bool {
        self.state().presence.is_locked_by_other(node_id)
    }

    /// The user holding a node, if any.
    pub fn lock_holder(&self, node_id: &NodeId) -> Option<UserId> {
        self.state().presence.lock_holder(node_id).cloned()
    }

    /// The holder of a node as a roster entry, if locked and present.
    pub fn lock_holder_user(&self, node_id: &NodeId) -> Option<User> {
        self.state().presence.lock_holder_user(node_id).cloned()
    }

    /// Every lock, node id to holder.
    pub fn locks(&self) -> BTreeMap<NodeId, UserId> {
        self.state().presence.locks()
    }

    /// The roster as of now.
    pub fn users(&self) -> Vec<UserView> {
        self.users_at(now_ms())
    }

    /// The roster with idle flags computed for `now` (ms since the epoch).
    pub fn users_at(&self, now: u64) -> Vec<UserView> {
        self.state().presence.views(now, self.config.idle_after)
    }

    /// Whether a user is present.
    pub fn is_present(&self, user_id: &UserId) -> bool {
        self.state().presence.is_present(user_id)
    }

    /// A remote user's last cursor position.
    pub fn cursor(&self, user_id: &UserId) -> Option<Point> {
        self.state().cursors.get(user_id)
    }

    /// Every remote cursor.
    pub fn cursors(&self) -> Vec<(UserId, Point)> {
        self.state()
            .cursors
            .iter()
            .map(|(id, point)| (id.clone(), point))
            .collect()
    }
}

impl<T: Transport> std::fmt::Debug for CollabSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabSession")
            .field("session_id", &self.config.session_id)
            .field("user_id", &self.config.user_id)
            .field("subscribers", &self.events.len())
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: SessionId::random(),
            user_id: UserId::random(),
            user_name: "anonymous".into(),
            server: ServerConfig::default(),
            reconnect: ReconnectPolicy::default(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            idle_after: Duration::from_secs(60),
            answer_joins: true,
        }
    }
}

/// Wall clock in milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

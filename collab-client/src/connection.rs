//! Transport connection manager.
//!
//! [`ConnectionManager`] owns one transport and drives the pure
//! [`ConnectionState`] machine from collab-core, executing the actions it
//! returns: opening and closing the transport and sleeping between
//! reconnection attempts.
//!
//! ```text
//! CollabSession → ConnectionManager → Transport → Network
//!                        ↓
//!             collab-core (pure state machine)
//! ```
//!
//! Each session owns its own manager; nothing here is process-global.

use collab_core::{Action, ConnectionEvent, ConnectionState, Event, ReconnectPolicy};
use collab_types::{SessionId, UserId};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{ConfigError, ServerConfig};
use crate::transport::{Transport, TransportError};

/// Connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport could not be opened.
    #[error("connection failed: {0}")]
    ConnectFailed(#[from] TransportError),

    /// The endpoint URL could not be built.
    #[error(transparent)]
    Endpoint(#[from] ConfigError),

    /// `connect` was called while a connection is open or being established.
    #[error("already connected")]
    AlreadyConnected,
}

/// Who is connecting, and to which session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Session to join.
    pub session_id: SessionId,
    /// Local user id.
    pub user_id: UserId,
    /// Local display name.
    pub user_name: String,
}

impl ConnectParams {
    /// Bundle session parameters.
    pub fn new(session_id: SessionId, user_id: UserId, user_name: impl Into<String>) -> Self {
        Self {
            session_id,
            user_id,
            user_name: user_name.into(),
        }
    }
}

/// Result of a send attempt. A dropped send is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the transport.
    Sent,
    /// Not sent: the connection is not open, or the transport refused it.
    Dropped,
    /// Not sent: another update of the same kind went out within the
    /// throttle window.
    Throttled,
}

/// How a reconnection sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The transport is open again.
    Reconnected,
    /// Every attempt failed; the connection stays closed.
    Exhausted,
    /// A disconnect was requested while reconnecting.
    Stopped,
}

/// Owns a transport and its connection lifecycle.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    server: ServerConfig,
    policy: ReconnectPolicy,
    state: Mutex<ConnectionState>,
    params: Mutex<Option<ConnectParams>>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager. Nothing is opened until [`connect`](Self::connect).
    pub fn new(transport: T, server: ServerConfig, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            server,
            policy,
            state: Mutex::new(ConnectionState::new()),
            params: Mutex::new(None),
        }
    }

    /// Feed one event to the state machine and return the actions.
    async fn step(&self, event: Event) -> Vec<Action> {
        let mut state = self.state.lock().await;
        let (new_state, actions) = state.clone().on_event(event, &self.policy);
        *state = new_state;
        actions
    }

    /// Open the transport with the stored parameters.
    async fn open(&self) -> Result<(), ConnectionError> {
        let params = self
            .params
            .lock()
            .await
            .clone()
            .ok_or(ConnectionError::ConnectFailed(TransportError::NotConnected))?;
        let url = self
            .server
            .endpoint_url(&params.session_id, &params.user_id, &params.user_name)?;
        self.transport.connect(url.as_str()).await?;
        Ok(())
    }

    /// Open a connection for `params`.
    ///
    /// A failure here is returned to the caller and does not start the
    /// reconnection policy.
    pub async fn connect(&self, params: ConnectParams) -> Result<(), ConnectionError> {
        if !matches!(*self.state.lock().await, ConnectionState::Disconnected) {
            return Err(ConnectionError::AlreadyConnected);
        }

        let session_id = params.session_id.clone();
        *self.params.lock().await = Some(params);
        self.step(Event::ConnectRequested).await;

        match self.open().await {
            Ok(()) => {
                self.step(Event::ConnectSucceeded).await;
                if !self.is_open().await {
                    self.close_abandoned().await;
                    return Err(ConnectionError::ConnectFailed(TransportError::ConnectionClosed));
                }
                tracing::info!(session = %session_id, "connected");
                Ok(())
            }
            Err(e) => {
                self.step(Event::ConnectFailed {
                    error: e.to_string(),
                })
                .await;
                *self.params.lock().await = None;
                tracing::warn!(session = %session_id, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Close a transport that finished opening after a disconnect was requested.
    async fn close_abandoned(&self) {
        tracing::debug!("disconnect requested while opening, closing transport");
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "close failed");
        }
    }

    /// Close the connection and forget the session parameters.
    ///
    /// Calling it while already disconnected does nothing.
    pub async fn disconnect(&self) {
        for action in self.step(Event::DisconnectRequested).await {
            if let Action::Disconnect = action {
                if let Err(e) = self.transport.close().await {
                    tracing::debug!(error = %e, "close failed");
                }
            }
        }
        *self.params.lock().await = None;
    }

    /// Send one frame if the connection is open; drop it otherwise.
    pub async fn send(&self, frame: &str) -> SendOutcome {
        if !self.is_open().await {
            tracing::warn!("not connected, dropping outbound message");
            return SendOutcome::Dropped;
        }
        match self.transport.send(frame).await {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                tracing::warn!(error = %e, "send failed, dropping outbound message");
                SendOutcome::Dropped
            }
        }
    }

    /// Wait for the next inbound frame.
    pub async fn recv(&self) -> Result<String, TransportError> {
        self.transport.recv().await
    }

    /// Whether the connection is open.
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.is_connected()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    /// The parameters of the current (or pending) connection.
    pub async fn params(&self) -> Option<ConnectParams> {
        self.params.lock().await.clone()
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the reconnection policy after the open connection was lost.
    ///
    /// Lifecycle events are passed to `on_event` as they happen. Returns once
    /// the transport is open again, the attempts are used up, or a
    /// disconnect was requested meanwhile.
    pub async fn recover<F>(&self, reason: String, mut on_event: F) -> Recovery
    where
        F: FnMut(ConnectionEvent),
    {
        let mut actions = self.step(Event::ConnectionLost { reason }).await;
        let mut exhausted = false;

        loop {
            let mut next = None;
            for action in actions {
                match action {
                    Action::EmitEvent(event) => {
                        log_event(&event);
                        exhausted |= matches!(event, ConnectionEvent::ReconnectExhausted { .. });
                        on_event(event);
                    }
                    Action::StartReconnectTimer { delay, .. } => {
                        tokio::time::sleep(delay).await;
                        next = Some(Event::ReconnectTimer);
                    }
                    Action::Connect => {
                        next = Some(match self.open().await {
                            Ok(()) => Event::ConnectSucceeded,
                            Err(e) => Event::ConnectFailed {
                                error: e.to_string(),
                            },
                        });
                    }
                    Action::Disconnect => {
                        if let Err(e) = self.transport.close().await {
                            tracing::debug!(error = %e, "close failed");
                        }
                    }
                    Action::CancelReconnect => {}
                }
            }

            match next {
                Some(event) => {
                    let opened = event == Event::ConnectSucceeded;
                    actions = self.step(event).await;
                    if opened && !self.is_open().await {
                        self.close_abandoned().await;
                    }
                }
                None => break,
            }
        }

        if self.is_open().await {
            Recovery::Reconnected
        } else if exhausted {
            *self.params.lock().await = None;
            Recovery::Exhausted
        } else {
            Recovery::Stopped
        }
    }
}

fn log_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected => tracing::info!("reconnected"),
        ConnectionEvent::Disconnected { reason } => {
            tracing::info!(%reason, "connection closed")
        }
        ConnectionEvent::Reconnecting { attempt, delay } => {
            tracing::info!(attempt, ?delay, "reconnecting")
        }
        ConnectionEvent::ReconnectFailed { attempt, error } => {
            tracing::debug!(attempt, %error, "reconnect attempt failed")
        }
        ConnectionEvent::ReconnectExhausted { attempts } => {
            tracing::warn!(attempts, "giving up reconnecting; rejoin required")
        }
        ConnectionEvent::ConnectFailed { error } => tracing::warn!(%error, "connect failed"),
    }
}

//! Connection state machine for a collaboration session.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! connection lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (opening sockets, sleeping between attempts) is performed by
//! collab-client, not by this module.
//!
//! Reconnection is bounded: after an unexpected close the machine schedules up
//! to [`ReconnectPolicy::max_attempts`] attempts with a linear delay
//! (`base_delay × attempt`). When the attempt that carries the last number
//! fails, the machine parks in `Disconnected` and a manual rejoin is needed.

use std::time::Duration;

/// Bounds and pacing for automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts made after one unexpected close before giving up.
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `n × base_delay`.
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Default number of attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    /// Default delay unit.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

    /// Create a policy.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, no reconnection scheduled.
    Disconnected,
    /// Transport open in progress.
    Connecting {
        /// Reconnection attempt number; 0 for the initial join.
        attempt: u32,
    },
    /// Transport open; messages flow.
    Connected,
    /// Closed unexpectedly, waiting for the reconnect timer.
    Reconnecting {
        /// The attempt the pending timer will start.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (collab-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event, policy: &ReconnectPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => {
                (Self::Connecting { attempt: 0 }, vec![Action::Connect])
            }
            (Self::Disconnected, Event::DisconnectRequested) => (Self::Disconnected, vec![]),

            // From Connecting
            (Self::Connecting { .. }, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(ConnectionEvent::Connected)],
            ),
            (Self::Connecting { attempt: 0 }, Event::ConnectFailed { error }) => (
                Self::Disconnected,
                vec![Action::EmitEvent(ConnectionEvent::ConnectFailed { error })],
            ),
            (Self::Connecting { attempt }, Event::ConnectFailed { error }) => {
                let mut actions = vec![Action::EmitEvent(ConnectionEvent::ReconnectFailed {
                    attempt,
                    error,
                })];
                let (state, mut next) = schedule_attempt(attempt.saturating_add(1), policy);
                actions.append(&mut next);
                (state, actions)
            }
            (Self::Connecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::Disconnect])
            }

            // From Connected
            (Self::Connected, Event::ConnectionLost { reason }) => {
                let mut actions = vec![Action::EmitEvent(ConnectionEvent::Disconnected {
                    reason,
                })];
                let (state, mut next) = schedule_attempt(1, policy);
                actions.append(&mut next);
                (state, actions)
            }
            (Self::Connected, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::EmitEvent(ConnectionEvent::Disconnected {
                        reason: "user requested".into(),
                    }),
                ],
            ),

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => {
                (Self::Connecting { attempt }, vec![Action::Connect])
            }
            (Self::Reconnecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CancelReconnect])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if the transport is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to (re)connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. } | Self::Reconnecting { .. })
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule reconnection attempt `attempt`, or give up if it exceeds the bound.
fn schedule_attempt(attempt: u32, policy: &ReconnectPolicy) -> (ConnectionState, Vec<Action>) {
    if attempt > policy.max_attempts {
        return (
            ConnectionState::Disconnected,
            vec![Action::EmitEvent(ConnectionEvent::ReconnectExhausted {
                attempts: policy.max_attempts,
            })],
        );
    }

    let delay = policy.delay_for(attempt);
    (
        ConnectionState::Reconnecting { attempt },
        vec![
            Action::EmitEvent(ConnectionEvent::Reconnecting { attempt, delay }),
            Action::StartReconnectTimer { attempt, delay },
        ],
    )
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Host asked to join.
    ConnectRequested,
    /// Transport open succeeded.
    ConnectSucceeded,
    /// Transport open failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// An open connection closed without being asked to.
    ConnectionLost {
        /// Reason for the close.
        reason: String,
    },
    /// Host asked to leave.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by collab-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the transport with the stored session parameters.
    Connect,
    /// Close the transport.
    Disconnect,
    /// Sleep, then feed [`Event::ReconnectTimer`].
    StartReconnectTimer {
        /// The attempt the timer will start.
        attempt: u32,
        /// How long to wait.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Emit an event to the application.
    EmitEvent(ConnectionEvent),
}

/// Connection lifecycle notifications for the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport open.
    Connected,
    /// The initial join could not open the transport.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The connection closed.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// Which attempt.
        attempt: u32,
        /// Wait before the attempt starts.
        delay: Duration,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Which attempt.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// Retries are used up; the session stays disconnected.
    ReconnectExhausted {
        /// How many attempts were made.
        attempts: u32,
    },
}

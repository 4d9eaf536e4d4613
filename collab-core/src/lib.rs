//! # collab-core
//!
//! Pure logic for diagram collaboration (no I/O, instant tests).
//!
//! This crate implements the state machines and bookkeeping behind a
//! collaboration session without any network access, enabling fast unit
//! tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is always passed in by the caller.
//!
//! The actual I/O (sockets, timers) is performed by `collab-client`, which
//! interprets the actions and effects produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod cursor;
pub mod dispatch;
pub mod presence;
pub mod state;
pub mod throttle;

pub use clock::MessageClock;
pub use cursor::CursorOverlay;
pub use dispatch::{Dispatcher, Subscription};
pub use presence::{
    color_for, LockClaim, LockRequest, PresenceEffect, PresenceStore, User, UserView,
};
pub use state::{Action, ConnectionEvent, ConnectionState, Event, ReconnectPolicy};
pub use throttle::{Throttle, ThrottleCategory, DEFAULT_THROTTLE_WINDOW};

//! # collab-client
//!
//! Client library for real-time diagram collaboration.
//!
//! This is the library applications use to join a collaboration room: it
//! broadcasts node, edge and cursor updates, keeps track of who is present,
//! and coordinates advisory per-node edit locks between peers.
//!
//! ## Features
//!
//! - **Presence**: roster with stable colors and idle detection
//! - **Advisory Locks**: first-claim-wins node locks; crossing claims go to the smaller id
//! - **Throttling**: at most one drag/edge/cursor update per window
//! - **Bounded Reconnection**: linear backoff, rejoin announcement on success
//! - **Transport Abstraction**: WebSocket, or a mock for tests
//! - **Pure State Machines**: uses collab-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use collab_client::{ClientConfig, CollabSession, SessionConfig, WebSocketTransport};
//!
//! let client = ClientConfig::default();
//! let config = SessionConfig::from_client_config(&client, "room-1".into(), "u-42".into(), "Ada");
//! let session = CollabSession::new(config, WebSocketTransport::new());
//!
//! session.join().await?;
//! session.move_cursor(120.0, 80.0).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod session;
pub mod transport;

pub use config::{share_link, ClientConfig, ConfigError, ServerConfig};
pub use connection::{ConnectParams, ConnectionError, ConnectionManager, Recovery, SendOutcome};
pub use session::{CollabSession, PumpOutcome, SessionConfig, SessionError, SessionEvent};
pub use transport::{MockTransport, Transport, TransportError, WebSocketTransport};

pub use collab_core::{ConnectionEvent, LockRequest, Subscription, UserView};

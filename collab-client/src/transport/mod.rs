//! Transport abstraction for diagram collaboration.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` opens a connection to an endpoint URL
//! - `send()` transmits one JSON text frame
//! - `recv()` waits for the next text frame
//! - `close()` gracefully terminates
//!
//! A transport carries frames between this client and its peers; it does not
//! interpret them. Broadcast fan-out is the relay's job.

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for sending and receiving protocol frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to the given endpoint URL.
    async fn connect(&self, url: &str) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Blocks until a frame is available or the connection closes. A close
    /// is reported as [`TransportError::ConnectionClosed`].
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}

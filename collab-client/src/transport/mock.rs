//! Mock transport for testing.
//!
//! Allows queueing inbound frames, scripting connect failures and capturing
//! sent frames for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one handle while the session owns
/// another.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_url: Option<String>,
    connect_attempts: u32,
    close_calls: u32,
    sent_frames: Vec<String>,
    receive_queue: VecDeque<String>,
    failing_connects: VecDeque<String>,
    fail_next_send: Option<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a frame to be returned by a later `recv()` call.
    pub fn queue_incoming(&self, frame: impl Into<String>) {
        self.lock().receive_queue.push_back(frame.into());
    }

    /// All frames that were sent.
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock().sent_frames.clone()
    }

    /// Drain and return the frames sent so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().sent_frames)
    }

    /// The last frame that was sent.
    pub fn last_sent(&self) -> Option<String> {
        self.lock().sent_frames.last().cloned()
    }

    /// The URL of the last successful connect.
    pub fn connected_url(&self) -> Option<String> {
        self.lock().connected_url.clone()
    }

    /// How many times `connect()` was called, failures included.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// How many times `close()` was called.
    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.fail_connects(1, error);
    }

    /// Cause the next `count` connect() calls to fail with the given error.
    pub fn fail_connects(&self, count: u32, error: &str) {
        let mut inner = self.lock();
        for _ in 0..count {
            inner.failing_connects.push_back(error.to_string());
        }
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Simulate the peer closing the connection.
    pub fn drop_connection(&self) {
        let mut inner = self.lock();
        inner.connected = false;
        inner.receive_queue.clear();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;

        // Check for forced failure
        if let Some(error) = inner.failing_connects.pop_front() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_url = Some(url.to_string());
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_frames.push(frame.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // An exhausted script looks like the peer hanging up.
        match inner.receive_queue.pop_front() {
            Some(frame) => Ok(frame),
            None => {
                inner.connected = false;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.close_calls += 1;
        Ok(())
    }
}

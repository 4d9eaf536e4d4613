//! WebSocket transport.
//!
//! One text frame per protocol message. The socket is split so a task blocked
//! in `recv()` does not stop other tasks from sending.

use super::{Transport, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport over a WebSocket connection (`ws://` or `wss://`).
#[derive(Default)]
pub struct WebSocketTransport {
    writer: Mutex<Option<SplitSink<WsStream, WsMessage>>>,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    connected: AtomicBool,
}

impl WebSocketTransport {
    /// Create an unconnected transport.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<(), TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (sink, source) = stream.split();

        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(source);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(url, "websocket open");
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(WsMessage::Text(frame.to_owned()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<String, TransportError> {
        let mut reader = self.reader.lock().await;
        let source = reader.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match source.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text),
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(text),
                    Err(_) => tracing::debug!("dropping non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.connected.store(false, Ordering::SeqCst);
                    *reader = None;
                    return Err(TransportError::ConnectionClosed);
                }
                // Ping/pong and raw frames are handled by tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    *reader = None;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);

        let sink = self.writer.lock().await.take();
        // A task blocked in recv() holds the reader; it sees the close frame.
        if let Ok(mut reader) = self.reader.try_lock() {
            *reader = None;
        }

        match sink {
            Some(mut sink) => sink
                .close()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string())),
            None => Ok(()),
        }
    }
}

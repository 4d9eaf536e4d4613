//! Error types for the collaboration wire format.

use thiserror::Error;

use crate::MessageType;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The frame is not a JSON envelope
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The envelope names a known type but its payload does not match it
    #[error("malformed {kind} payload: {source}")]
    MalformedPayload {
        /// The type tag found on the envelope.
        kind: MessageType,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

//! Message - the envelope every frame travels in.
//!
//! Wire shape:
//!
//! ```json
//! {"type":"lock","userId":"A","userName":"Alice","sessionId":"room-1",
//!  "timestamp":1718000000000,"data":{"nodeId":"n1"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::messages::{
    CursorMove, EdgeUpdate, Lock, LockFailed, MessageType, NodeUpdate, Payload, SyncSnapshot,
    Unlock, UserInfo, UserPresence,
};
use crate::{CodecError, SessionId, UserId};

/// One protocol message: sender metadata plus a type-specific payload.
///
/// Messages are immutable once sent. There is no message id and no
/// acknowledgement numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Sender's user id
    pub user_id: UserId,
    /// Sender's display name
    pub user_name: String,
    /// Session the message belongs to
    pub session_id: SessionId,
    /// Sender clock, milliseconds since the Unix epoch. Non-decreasing per
    /// sender; a display and ordering hint, not a correctness input.
    pub timestamp: u64,
    /// Type-specific body
    pub payload: Payload,
}

/// The envelope as it is laid out on the wire.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    user_id: UserId,
    user_name: String,
    session_id: SessionId,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    data: Value,
}

impl Message {
    /// Create a message.
    pub fn new(
        user_id: UserId,
        user_name: impl Into<String>,
        session_id: SessionId,
        timestamp: u64,
        payload: Payload,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            session_id,
            timestamp,
            payload,
        }
    }

    /// The type tag of the payload.
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// The sender as a roster entry.
    pub fn sender(&self) -> UserInfo {
        UserInfo::new(self.user_id.clone(), self.user_name.clone())
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, CodecError> {
        let data = match &self.payload {
            Payload::Sync(p) => serde_json::to_value(p),
            Payload::UserPresence(p) => serde_json::to_value(p),
            Payload::NodeUpdate(p) => serde_json::to_value(p),
            Payload::EdgeUpdate(p) => serde_json::to_value(p),
            Payload::CursorMove(p) => serde_json::to_value(p),
            Payload::Lock(p) => serde_json::to_value(p),
            Payload::Unlock(p) => serde_json::to_value(p),
            Payload::LockFailed(p) => serde_json::to_value(p),
        }
        .map_err(CodecError::Serialization)?;

        let wire = WireEnvelope {
            kind: self.message_type().as_str().to_owned(),
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            session_id: self.session_id.clone(),
            timestamp: self.timestamp,
            data,
        };
        serde_json::to_string(&wire).map_err(CodecError::Serialization)
    }

    /// Deserialize a JSON text frame.
    ///
    /// Returns `Ok(None)` for a well-formed envelope whose `type` is not
    /// known to this version; such frames are ignored, not rejected.
    pub fn from_json(frame: &str) -> Result<Option<Self>, CodecError> {
        let wire: WireEnvelope =
            serde_json::from_str(frame).map_err(CodecError::MalformedEnvelope)?;

        let Some(kind) = MessageType::from_tag(&wire.kind) else {
            return Ok(None);
        };

        let payload = decode_payload(kind, wire.data)
            .map_err(|source| CodecError::MalformedPayload { kind, source })?;

        Ok(Some(Self {
            user_id: wire.user_id,
            user_name: wire.user_name,
            session_id: wire.session_id,
            timestamp: wire.timestamp,
            payload,
        }))
    }
}

fn decode_payload(kind: MessageType, data: Value) -> Result<Payload, serde_json::Error> {
    Ok(match kind {
        MessageType::Sync => Payload::Sync(serde_json::from_value::<SyncSnapshot>(data)?),
        MessageType::UserPresence => {
            Payload::UserPresence(serde_json::from_value::<UserPresence>(data)?)
        }
        MessageType::NodeUpdate => Payload::NodeUpdate(serde_json::from_value::<NodeUpdate>(data)?),
        MessageType::EdgeUpdate => Payload::EdgeUpdate(serde_json::from_value::<EdgeUpdate>(data)?),
        MessageType::CursorMove => Payload::CursorMove(serde_json::from_value::<CursorMove>(data)?),
        MessageType::Lock => Payload::Lock(serde_json::from_value::<Lock>(data)?),
        MessageType::Unlock => Payload::Unlock(serde_json::from_value::<Unlock>(data)?),
        MessageType::LockFailed => Payload::LockFailed(serde_json::from_value::<LockFailed>(data)?),
    })
}

//! Protocol payloads for the collaboration protocol.
//!
//! These are the type-specific bodies carried in the `data` field of a
//! [`Message`](crate::Message) envelope. Field names are camelCase on the wire
//! and must stay stable across versions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::{NodeId, UserId};

/// The closed set of message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Full state snapshot for a newly joined client
    Sync,
    /// Roster change
    UserPresence,
    /// Replacement of the sender's node list
    NodeUpdate,
    /// Replacement of the sender's edge list
    EdgeUpdate,
    /// Pointer position in canvas coordinates
    CursorMove,
    /// Announce exclusive edit intent on a node
    Lock,
    /// Release a node
    Unlock,
    /// Tell a would-be locker the node is already held
    LockFailed,
}

impl MessageType {
    /// All known tags, in wire-table order.
    pub const ALL: [MessageType; 8] = [
        MessageType::Sync,
        MessageType::UserPresence,
        MessageType::NodeUpdate,
        MessageType::EdgeUpdate,
        MessageType::CursorMove,
        MessageType::Lock,
        MessageType::Unlock,
        MessageType::LockFailed,
    ];

    /// The tag as it appears in the envelope's `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Sync => "sync",
            MessageType::UserPresence => "user_presence",
            MessageType::NodeUpdate => "node_update",
            MessageType::EdgeUpdate => "edge_update",
            MessageType::CursorMove => "cursor_move",
            MessageType::Lock => "lock",
            MessageType::Unlock => "unlock",
            MessageType::LockFailed => "lock_failed",
        }
    }

    /// Look up a wire tag. Unknown tags return `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All possible protocol payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Full state snapshot
    Sync(SyncSnapshot),
    /// Roster change
    UserPresence(UserPresence),
    /// Node list replacement
    NodeUpdate(NodeUpdate),
    /// Edge list replacement
    EdgeUpdate(EdgeUpdate),
    /// Pointer motion
    CursorMove(CursorMove),
    /// Lock announcement
    Lock(Lock),
    /// Lock release
    Unlock(Unlock),
    /// Lock conflict answer
    LockFailed(LockFailed),
}

impl Payload {
    /// The type tag this payload travels under.
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Sync(_) => MessageType::Sync,
            Payload::UserPresence(_) => MessageType::UserPresence,
            Payload::NodeUpdate(_) => MessageType::NodeUpdate,
            Payload::EdgeUpdate(_) => MessageType::EdgeUpdate,
            Payload::CursorMove(_) => MessageType::CursorMove,
            Payload::Lock(_) => MessageType::Lock,
            Payload::Unlock(_) => MessageType::Unlock,
            Payload::LockFailed(_) => MessageType::LockFailed,
        }
    }
}

/// A 2D point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Create a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A participant as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// User identifier
    pub user_id: UserId,
    /// Display name
    pub user_name: String,
    /// Display color, if the sender included one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl UserInfo {
    /// Create a user entry without a color.
    pub fn new(user_id: impl Into<UserId>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            color: None,
        }
    }
}

/// A diagram node.
///
/// Only `id` and `position` are interpreted here; every other field the
/// renderer puts on a node is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    /// Node identifier (the lock key)
    pub id: NodeId,
    /// Canvas position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    /// Renderer-owned fields
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl DiagramNode {
    /// Create a node at a position with no extra attributes.
    pub fn at(id: impl Into<NodeId>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            position: Some(Point::new(x, y)),
            attributes: Map::new(),
        }
    }
}

/// A diagram edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    /// Edge identifier
    pub id: String,
    /// Source node
    pub source: NodeId,
    /// Target node
    pub target: NodeId,
    /// Renderer-owned fields
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl DiagramEdge {
    /// Create an edge with no extra attributes.
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            attributes: Map::new(),
        }
    }
}

/// Full state snapshot sent to a newly joined client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Everyone currently present
    #[serde(default)]
    pub users: Vec<UserInfo>,
    /// Node id to holder
    #[serde(default)]
    pub locks: BTreeMap<NodeId, UserId>,
}

/// Roster change direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    /// The user entered the session
    Joined,
    /// The user left the session
    Left,
}

/// Roster change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    /// Joined or left
    pub action: PresenceAction,
    /// The user concerned
    pub user: UserInfo,
}

/// Full replacement of the sender's view of the node list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    /// The nodes
    pub nodes: Vec<DiagramNode>,
}

/// Full replacement of the sender's view of the edge list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeUpdate {
    /// The edges
    pub edges: Vec<DiagramEdge>,
}

/// Pointer position in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CursorMove {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

/// Announce intent to hold exclusive edit on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    /// The node to lock
    pub node_id: NodeId,
}

/// Release a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unlock {
    /// The node to release
    pub node_id: NodeId,
}

/// Informs the would-be locker that a node is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFailed {
    /// The contested node
    pub node_id: NodeId,
    /// The holder of record
    pub locked_by: UserId,
    /// The requester this answer is meant for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
    /// When the holder claimed the node (sender clock, ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<u64>,
}

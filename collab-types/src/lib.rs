//! # collab-types
//!
//! Wire format types for the diagram collaboration protocol.
//!
//! This crate provides the foundational types used across all collab crates:
//! - [`UserId`], [`SessionId`], [`NodeId`] - Identity types
//! - [`Message`] - The envelope every frame travels in (sender, session, timestamp)
//! - [`Payload`] - The closed set of message variants (`sync`, `lock`, ...)
//! - [`CodecError`] - Error types
//!
//! Frames are JSON text. Decoding a frame whose `type` tag this version does
//! not know yields `Ok(None)` so that old and new clients can share a session.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;

pub use envelope::Message;
pub use error::CodecError;
pub use ids::{NodeId, SessionId, UserId};
pub use messages::{
    CursorMove, DiagramEdge, DiagramNode, EdgeUpdate, Lock, LockFailed, MessageType, NodeUpdate,
    Payload, Point, PresenceAction, SyncSnapshot, Unlock, UserInfo, UserPresence,
};

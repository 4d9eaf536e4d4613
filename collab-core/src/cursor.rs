//! Remote cursor overlay.
//!
//! Tracks the last reported pointer position of every remote user. A user's
//! entry appears on their first `cursor_move` and disappears when their
//! `left` is observed. A snapshot never removes cursors.
//! Positions are plain canvas coordinates; nothing here smooths or animates.

use std::collections::BTreeMap;

use collab_types::{Message, Payload, Point, PresenceAction, UserId};

/// Last known pointer position per remote user.
#[derive(Debug, Clone, Default)]
pub struct CursorOverlay {
    positions: BTreeMap<UserId, Point>,
}

impl CursorOverlay {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from one inbound message.
    ///
    /// Returns `true` if the overlay changed.
    pub fn apply(&mut self, message: &Message) -> bool {
        match &message.payload {
            Payload::CursorMove(cursor) => {
                let point = Point::new(cursor.x, cursor.y);
                self.positions.insert(message.user_id.clone(), point) != Some(point)
            }
            Payload::UserPresence(presence) if presence.action == PresenceAction::Left => {
                self.remove(&presence.user.user_id)
            }
            _ => false,
        }
    }

    /// Forget a user's cursor. Returns `true` if there was one.
    pub fn remove(&mut self, user_id: &UserId) -> bool {
        self.positions.remove(user_id).is_some()
    }

    /// A user's last position.
    pub fn get(&self, user_id: &UserId) -> Option<Point> {
        self.positions.get(user_id).copied()
    }

    /// All cursors, ordered by user id.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, Point)> {
        self.positions.iter().map(|(id, point)| (id, *point))
    }

    /// Number of tracked cursors.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no cursors are tracked.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Forget every cursor.
    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

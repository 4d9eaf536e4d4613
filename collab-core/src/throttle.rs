//! Outbound rate limiting for high-frequency updates.
//!
//! Each [`ThrottleCategory`] gets its own window. A send is allowed if no send
//! of the same category was allowed within the last window; otherwise the
//! update is dropped, not queued. Callers pass the current [`Instant`] so the
//! policy stays pure and testable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window between two sends of one category.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(100);

/// Independent throttle buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleCategory {
    /// Node positions while dragging.
    NodePosition,
    /// Edge list changes.
    Edge,
    /// Pointer motion.
    Cursor,
}

/// Per-category "at most one send per window" gate.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last_sent: HashMap<ThrottleCategory, Instant>,
}

impl Throttle {
    /// Create a throttle with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Ask to send one update of `category` at `now`.
    ///
    /// Returns `true` and records the send if the window has passed since the
    /// last allowed send of that category. Returns `false` (drop it) otherwise.
    pub fn try_acquire(&mut self, category: ThrottleCategory, now: Instant) -> bool {
        match self.last_sent.get(&category) {
            Some(last) if now.saturating_duration_since(*last) < self.window => false,
            _ => {
                self.last_sent.insert(category, now);
                true
            }
        }
    }

    /// Forget all history; the next send of every category is allowed.
    pub fn reset(&mut self) {
        self.last_sent.clear();
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

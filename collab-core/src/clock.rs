//! Outbound message timestamps.

/// Stamps outbound messages with a non-decreasing sender time.
///
/// The wall clock can step backwards (NTP, manual changes); the stamp never
/// does, so peers see a monotone sequence per sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageClock {
    last: u64,
}

impl MessageClock {
    /// Create a clock that has stamped nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a message sent at wall time `now_ms`.
    pub fn stamp(&mut self, now_ms: u64) -> u64 {
        self.last = self.last.max(now_ms);
        self.last
    }

    /// The last stamp handed out.
    pub fn last(&self) -> u64 {
        self.last
    }
}

//! Inbound paste in progress

use std::time::{Duration, Instant};

use crate::display::Atom;

/// State of a paste arriving from another client
#[derive(Debug, Clone)]
pub struct TransferIn {
    /// Our property the owner writes into
    pub property: Atom,
    /// Owner switched to incremental delivery
    pub incremental: bool,
    /// Paste-begin marker already sent
    pub bracket_open: bool,
    pub bytes: usize,
    pub chunks: usize,
    last_progress: Instant,
}

impl TransferIn {
    pub fn new(property: Atom, now: Instant) -> Self {
        Self {
            property,
            incremental: false,
            bracket_open: false,
            bytes: 0,
            chunks: 0,
            last_progress: now,
        }
    }

    pub fn progress(&mut self, len: usize, now: Instant) {
        self.bytes += len;
        self.chunks += 1;
        self.last_progress = now;
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_progress = now;
    }

    pub fn stalled(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_progress) > timeout
    }

    /// Time left before the transfer counts as stalled
    pub fn remaining(&self, now: Instant, timeout: Duration) -> Duration {
        timeout.saturating_sub(now.saturating_duration_since(self.last_progress))
    }
}

use crate::frame::Reason;

pub type WindowSize = u32;

/// The largest legal flow-control window.
pub const MAX_WINDOW_SIZE: WindowSize = (1 << 31) - 1;

/// Credit the peer granted us.
///
/// The window is signed: a SETTINGS change may shrink it below zero, in
/// which case nothing may be sent until updates bring it back up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SendWindow {
    window: i64,
}

impl SendWindow {
    pub fn new(sz: WindowSize) -> SendWindow {
        SendWindow { window: sz as i64 }
    }

    /// The amount that may be claimed right now.
    pub fn available(&self) -> i64 {
        self.window
    }

    /// Claims `sz` bytes. Callers never claim more than is available.
    pub fn claim(&mut self, sz: WindowSize) {
        debug_assert!(sz as i64 <= self.window);
        self.window -= sz as i64;
    }

    /// Applies a WINDOW_UPDATE increment.
    pub fn inc(&mut self, sz: WindowSize) -> Result<(), Reason> {
        let next = self.window + sz as i64;
        if next > MAX_WINDOW_SIZE as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }
        self.window = next;
        Ok(())
    }

    /// Applies the difference between an old and a new initial window size.
    pub fn apply_delta(&mut self, delta: i64) -> Result<(), Reason> {
        let next = self.window + delta;
        if next > MAX_WINDOW_SIZE as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }
        self.window = next;
        Ok(())
    }
}

/// Credit we granted the peer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecvWindow {
    /// The window the peer was told about.
    capacity: WindowSize,

    /// What the peer may still send.
    available: i64,

    /// Bytes handed to the application but not yet returned to the peer.
    unacked: WindowSize,
}

impl RecvWindow {
    pub fn new(capacity: WindowSize) -> RecvWindow {
        RecvWindow {
            capacity,
            available: capacity as i64,
            unacked: 0,
        }
    }

    pub fn capacity(&self) -> WindowSize {
        self.capacity
    }

    /// Accounts for `sz` received bytes. Fails when the peer overran the
    /// window.
    pub fn consume(&mut self, sz: WindowSize) -> Result<(), Reason> {
        if sz as i64 > self.available {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }
        self.available -= sz as i64;
        Ok(())
    }

    /// Marks `sz` bytes as processed. The credit is returned by a later
    /// `take_update`.
    pub fn release(&mut self, sz: WindowSize) {
        self.unacked = self.unacked.saturating_add(sz);
    }

    /// Returns the increment to announce once released credit reaches the
    /// threshold (half the window unless configured).
    pub fn take_update(&mut self, threshold: Option<WindowSize>) -> Option<WindowSize> {
        let threshold = threshold.unwrap_or(self.capacity / 2);
        if self.unacked == 0 || self.unacked < threshold {
            return None;
        }

        let incr = self.unacked;
        self.unacked = 0;
        self.available += incr as i64;
        Some(incr)
    }

    /// Grows the window to `capacity`, returning the increment to announce.
    pub fn grow(&mut self, capacity: WindowSize) -> Option<WindowSize> {
        if capacity <= self.capacity {
            return None;
        }

        let delta = capacity - self.capacity;
        self.capacity = capacity;
        self.available += delta as i64;
        Some(delta)
    }
}

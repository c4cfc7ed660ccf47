use crate::handler::Observer;
use crate::tracing::trace;

/// Concurrency accounting for one session.
#[derive(Debug)]
pub(super) struct Counts {
    /// Maximum number of locally initiated streams
    max_outgoing: u32,

    /// Current number of locally initiated streams
    num_outgoing: u32,

    /// Maximum number of remote initiated streams
    max_incoming: u32,

    /// Current number of remote initiated streams
    num_incoming: u32,

    /// Whether the observer was last told the outgoing side is full.
    full: bool,
}

impl Counts {
    pub fn new(max_outgoing: u32, max_incoming: u32) -> Self {
        Counts {
            max_outgoing,
            num_outgoing: 0,
            max_incoming,
            num_incoming: 0,
            full: false,
        }
    }

    /// Returns true if another locally initiated stream may be opened.
    pub fn can_inc_outgoing(&self) -> bool {
        self.num_outgoing < self.max_outgoing
    }

    /// Returns true if the receive stream concurrency can be incremented
    pub fn can_inc_incoming(&self) -> bool {
        self.num_incoming < self.max_incoming
    }

    /// Increments the number of concurrent outgoing streams.
    ///
    /// # Panics
    ///
    /// Panics on failure as this should have been validated before hand.
    pub fn inc_outgoing(&mut self) {
        assert!(self.can_inc_outgoing());
        self.num_outgoing += 1;
    }

    /// Increments the number of concurrent incoming streams.
    ///
    /// Pushed streams are admitted without checking the limit.
    pub fn inc_incoming(&mut self) {
        self.num_incoming += 1;
    }

    pub fn dec(&mut self, outgoing: bool) {
        if outgoing {
            assert!(self.num_outgoing > 0);
            self.num_outgoing -= 1;
        } else {
            assert!(self.num_incoming > 0);
            self.num_incoming -= 1;
        }
    }

    pub fn num_outgoing(&self) -> u32 {
        self.num_outgoing
    }

    pub fn num_incoming(&self) -> u32 {
        self.num_incoming
    }

    pub fn max_outgoing(&self) -> u32 {
        self.max_outgoing
    }

    pub fn set_max_outgoing(&mut self, max: u32) {
        self.max_outgoing = max;
    }

    pub fn set_max_incoming(&mut self, max: u32) {
        self.max_incoming = max;
    }

    /// Tells the observer when the outgoing side crossed its limit in either
    /// direction. Each crossing is reported once.
    pub fn transition(&mut self, observer: Option<&mut (dyn Observer + 'static)>) {
        let full = !self.can_inc_outgoing();
        if full == self.full {
            return;
        }
        self.full = full;

        trace!(full, num = self.num_outgoing, max = self.max_outgoing, "outgoing streams");

        if let Some(observer) = observer {
            if full {
                observer.on_outgoing_full();
            } else {
                observer.on_outgoing_not_full();
            }
        }
    }
}

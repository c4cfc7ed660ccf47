use crate::frame::StreamId;

use std::collections::VecDeque;

/// Tracks which transactions have bytes in flight on the transport.
///
/// Every egress append records the session offset of the last byte written
/// for the transaction. Once the transport acknowledges writes past that
/// offset the event completes and the transaction may be torn down.
#[derive(Debug, Default)]
pub(super) struct ByteEvents {
    events: VecDeque<ByteEvent>,

    /// Total bytes appended to the write buffer.
    queued: u64,

    /// Total bytes the transport reported written.
    acked: u64,
}

#[derive(Debug, Clone, Copy)]
struct ByteEvent {
    id: StreamId,
    offset: u64,
}

impl ByteEvents {
    /// Accounts for `len` bytes appended on behalf of `id`.
    ///
    /// Returns true if a new event was created, in which case the caller
    /// bumps the transaction's pending count.
    pub fn record(&mut self, id: StreamId, len: usize) -> bool {
        if len == 0 {
            return false;
        }

        self.queued += len as u64;

        if let Some(back) = self.events.back_mut() {
            if back.id == id {
                back.offset = self.queued;
                return false;
            }
        }

        self.events.push_back(ByteEvent {
            id,
            offset: self.queued,
        });
        true
    }

    /// Accounts for bytes that belong to no transaction.
    pub fn skip(&mut self, len: usize) {
        self.queued += len as u64;
    }

    /// Acknowledges `len` written bytes and returns the ids whose events
    /// completed, oldest first.
    pub fn ack(&mut self, len: usize) -> Vec<StreamId> {
        self.acked += len as u64;

        let mut done = Vec::new();
        while let Some(front) = self.events.front() {
            if front.offset > self.acked {
                break;
            }
            done.push(front.id);
            self.events.pop_front();
        }
        done
    }

    /// Drops every outstanding event, returning the affected ids.
    pub fn clear(&mut self) -> Vec<StreamId> {
        self.events.drain(..).map(|e| e.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

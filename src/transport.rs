//! The I/O seams a session drives.
//!
//! A session never performs I/O itself. It hands bytes to a [`Transport`]
//! and arms timers on a [`Timer`]; whoever owns those reports completions
//! back through `Session::on_write_success`, `Session::on_read`,
//! `Session::on_timeout` and friends. [`crate::driver`] wires both to tokio.

use crate::frame::StreamId;

use bytes::Bytes;

use std::time::Duration;

/// The byte stream a session runs over.
pub trait Transport {
    /// Queues `buf` for writing. Every call is answered by exactly one
    /// `on_write_success` or `on_write_error`, in call order.
    fn write(&mut self, buf: Bytes);

    /// Stops delivering reads until `resume_reads`.
    fn pause_reads(&mut self);

    fn resume_reads(&mut self);

    /// Closes the transport without waiting for queued writes.
    fn close_now(&mut self);

    /// Whether data written now cannot be replayed by an attacker (for
    /// example after a 0-RTT handshake completed).
    fn is_replay_safe(&self) -> bool {
        true
    }
}

/// Identifies a scheduled timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKey {
    /// Idle timer of one transaction.
    Transaction(StreamId),
    /// Session idle timer, armed while no transaction is live.
    Idle,
    /// Armed while writes are outstanding.
    Write,
}

/// Schedules callbacks into `Session::on_timeout`.
///
/// Scheduling a key that is already armed replaces it.
pub trait Timer {
    fn schedule(&mut self, key: TimeoutKey, after: Duration);

    fn cancel(&mut self, key: TimeoutKey);
}

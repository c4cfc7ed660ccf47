//! Application callbacks.

use crate::codec::{CodecError, Protocol};
use crate::error::Error;
use crate::frame::{Reason, Setting, StreamId};
use crate::message::Message;
use crate::proto::Transaction;

use bytes::Bytes;
use http::HeaderMap;

/// Receives the events of one transaction.
///
/// Callbacks are delivered one at a time from the session's dispatch loop,
/// never from inside another callback. `on_detach` is always the last call;
/// after it returns the transaction no longer exists.
#[allow(unused_variables)]
pub trait Handler {
    fn on_attach(&mut self, txn: Transaction<'_>) {}

    fn on_headers(&mut self, txn: Transaction<'_>, msg: Message) {}

    fn on_body(&mut self, txn: Transaction<'_>, chunk: Bytes) {}

    fn on_chunk_header(&mut self, txn: Transaction<'_>, len: usize) {}

    fn on_chunk_complete(&mut self, txn: Transaction<'_>) {}

    fn on_trailers(&mut self, txn: Transaction<'_>, trailers: HeaderMap) {}

    fn on_eom(&mut self, txn: Transaction<'_>) {}

    /// The stream switched to `protocol`; further body bytes belong to it.
    fn on_upgrade(&mut self, txn: Transaction<'_>, protocol: String) {}

    /// Delivered at most once per transaction.
    fn on_error(&mut self, txn: Transaction<'_>, err: &Error) {}

    /// The peer sent GOAWAY; this transaction was acknowledged and may
    /// complete.
    fn on_goaway(&mut self, txn: Transaction<'_>, reason: Reason) {}

    fn on_egress_paused(&mut self, txn: Transaction<'_>) {}

    fn on_egress_resumed(&mut self, txn: Transaction<'_>) {}

    /// The peer promised `pushed` on this transaction. Returning `None`
    /// refuses the push.
    fn on_pushed_transaction(
        &mut self,
        txn: Transaction<'_>,
        pushed: StreamId,
        request: &Message,
    ) -> Option<Box<dyn Handler>> {
        None
    }

    fn on_replay_safe(&mut self, txn: Transaction<'_>) {}

    /// The transaction was removed. Operations on `txn` fail from here on,
    /// but `txn.session()` may still be used.
    fn on_detach(&mut self, txn: Transaction<'_>) {}
}

/// Supplies handlers for requests the peer opens.
pub trait Controller {
    /// Returns the handler for a new incoming request, or `None` to refuse it.
    fn handler_for(&mut self, request: &Message) -> Option<Box<dyn Handler>>;
}

/// Observes session level events.
#[allow(unused_variables)]
pub trait Observer {
    fn on_create(&mut self) {}

    fn on_destroy(&mut self) {}

    fn on_read(&mut self, bytes: usize) {}

    fn on_write(&mut self, bytes: usize) {}

    fn on_settings(&mut self, settings: &[Setting]) {}

    fn on_settings_ack(&mut self) {}

    fn on_outgoing_full(&mut self) {}

    fn on_outgoing_not_full(&mut self) {}

    fn on_ingress_error(&mut self, err: &CodecError) {}

    fn on_codec_change(&mut self, protocol: Protocol) {}
}

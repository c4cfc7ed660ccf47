use super::flow_control::{RecvWindow, SendWindow};
use super::state::{Egress, Ingress};
use super::{Priority, Session};
use crate::error::Error;
use crate::frame::StreamId;
use crate::handler::Handler;
use crate::message::Message;

use bytes::Bytes;
use http::HeaderMap;

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Per stream state owned by the session.
pub(super) struct Txn {
    pub id: StreamId,

    /// Locally initiated; counts against the outgoing limit.
    pub outgoing: bool,

    /// The stream this one was pushed on.
    pub assoc: Option<StreamId>,

    pub handler: Option<Box<dyn Handler>>,

    pub ingress: Ingress,
    pub egress: Egress,

    /// Ingress parsed but not yet handed to the handler.
    pub deferred: VecDeque<Deferred>,
    pub ingress_paused: bool,
    pub egress_paused: bool,

    /// Body waiting for flow control or buffer space.
    pub body: VecDeque<Bytes>,
    pub trailers: Option<HeaderMap>,

    pub send_window: SendWindow,
    pub recv_window: RecvWindow,

    /// A receive window increase to announce once headers are out.
    pub pending_grant: Option<u32>,

    pub priority: Option<Priority>,
    pub priority_fallback: bool,

    /// Writes holding bytes of this transaction that did not complete.
    pub pending_byte_events: usize,

    pub idle_timeout: Option<Duration>,

    pub aborted: bool,
    pub error_delivered: bool,
    pub detach_queued: bool,
}

/// Ingress waiting for delivery.
#[derive(Debug)]
pub(super) enum Deferred {
    Headers(Message),
    Body { chunk: Bytes, flow: usize },
    ChunkHeader(usize),
    ChunkComplete,
    Trailers(HeaderMap),
    Upgrade(String),
    Eom,
}

impl Txn {
    pub fn new(
        id: StreamId,
        outgoing: bool,
        send_window: u32,
        recv_window: u32,
        idle_timeout: Option<Duration>,
    ) -> Txn {
        Txn {
            id,
            outgoing,
            assoc: None,
            handler: None,
            ingress: Ingress::Start,
            egress: Egress::default(),
            deferred: VecDeque::new(),
            ingress_paused: false,
            egress_paused: false,
            body: VecDeque::new(),
            trailers: None,
            send_window: SendWindow::new(send_window),
            recv_window: RecvWindow::new(recv_window),
            pending_grant: None,
            priority: None,
            priority_fallback: false,
            pending_byte_events: 0,
            idle_timeout,
            aborted: false,
            error_delivered: false,
            detach_queued: false,
        }
    }

    /// Nothing more will be handed to the handler.
    pub fn is_ingress_complete(&self) -> bool {
        self.deferred.is_empty() && (self.aborted || self.ingress == Ingress::ReceivingDone)
    }

    pub fn is_egress_complete(&self) -> bool {
        self.aborted || self.egress.is_complete()
    }

    /// Marks the transaction aborted and drops queued egress.
    ///
    /// Ingress that was already accepted stays queued so the handler still
    /// sees it ahead of the error.
    pub fn abort(&mut self) {
        self.aborted = true;
        self.body.clear();
        self.trailers = None;
    }

    /// Drops undelivered ingress, returning the body bytes it held against
    /// the receive windows.
    pub fn discard_ingress(&mut self) -> usize {
        self.deferred
            .drain(..)
            .map(|item| match item {
                Deferred::Body { flow, .. } => flow,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Debug for Txn {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Txn")
            .field("id", &self.id)
            .field("outgoing", &self.outgoing)
            .field("ingress", &self.ingress)
            .field("egress", &self.egress)
            .field("deferred", &self.deferred.len())
            .field("aborted", &self.aborted)
            .field("pending_byte_events", &self.pending_byte_events)
            .finish()
    }
}

/// A handle to one live transaction.
///
/// Handlers receive one with every callback; applications get one from
/// [`Session::transaction`]. Every operation goes through the session, which
/// owns the transaction's state; once the transaction is gone the operations
/// fail with [`UserError::UnknownTransaction`].
///
/// [`UserError::UnknownTransaction`]: crate::UserError::UnknownTransaction
pub struct Transaction<'a> {
    session: &'a mut Session,
    id: StreamId,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(session: &'a mut Session, id: StreamId) -> Transaction<'a> {
        Transaction { session, id }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// The session this transaction lives on.
    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    pub fn send_headers(&mut self, msg: Message) -> Result<(), Error> {
        self.session.send_headers(self.id, msg, false)
    }

    /// Sends headers and ends the message in one step.
    pub fn send_headers_with_eom(&mut self, msg: Message) -> Result<(), Error> {
        self.session.send_headers(self.id, msg, true)
    }

    pub fn send_body(&mut self, chunk: Bytes) -> Result<(), Error> {
        self.session.send_body(self.id, chunk)
    }

    /// Stores trailers to be written with the end of message.
    pub fn send_trailers(&mut self, trailers: HeaderMap) -> Result<(), Error> {
        self.session.send_trailers(self.id, trailers)
    }

    pub fn send_eom(&mut self) -> Result<(), Error> {
        self.session.send_eom(self.id)
    }

    /// Resets the stream where the protocol allows it and tears the
    /// transaction down once its in-flight bytes are written.
    pub fn send_abort(&mut self) -> Result<(), Error> {
        self.session.send_abort(self.id)
    }

    pub fn pause_ingress(&mut self) -> Result<(), Error> {
        self.session.pause_ingress(self.id)
    }

    pub fn resume_ingress(&mut self) -> Result<(), Error> {
        self.session.resume_ingress(self.id)
    }

    /// Replaces the idle timeout and restarts the timer.
    pub fn set_idle_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        self.session.set_idle_timeout(self.id, timeout)
    }

    pub fn update_and_send_priority(&mut self, priority: Priority) -> Result<(), Error> {
        self.session.update_and_send_priority(self.id, priority)
    }

    /// Moves the transaction under the virtual node for `level`.
    pub fn update_and_send_priority_level(&mut self, level: u8) -> Result<(), Error> {
        self.session.update_and_send_priority_level(self.id, level)
    }

    /// Grows the stream receive window to `size`.
    pub fn set_receive_window(&mut self, size: u32) -> Result<(), Error> {
        self.session.set_receive_window(self.id, size)
    }

    /// Promises `request` and opens a pushed transaction served by `handler`.
    pub fn push(&mut self, request: Message, handler: Box<dyn Handler>) -> Result<StreamId, Error> {
        self.session.push(self.id, request, handler)
    }

    /// Asks for `Handler::on_replay_safe` once the transport is replay safe.
    pub fn add_replay_safety_waiter(&mut self) -> Result<(), Error> {
        self.session.add_replay_safety_waiter(self.id)
    }

    pub fn remove_replay_safety_waiter(&mut self) {
        self.session.remove_replay_safety_waiter(self.id)
    }

    pub fn is_ingress_paused(&self) -> bool {
        self.txn().map_or(false, |txn| txn.ingress_paused)
    }

    pub fn is_egress_paused(&self) -> bool {
        self.txn().map_or(false, |txn| txn.egress_paused)
    }

    pub fn priority(&self) -> Option<Priority> {
        self.txn().and_then(|txn| txn.priority)
    }

    /// True when the priority points at a legacy per level node.
    pub fn is_priority_fallback(&self) -> bool {
        self.txn().map_or(false, |txn| txn.priority_fallback)
    }

    /// The stream send window, when the stream is flow controlled.
    pub fn send_window(&self) -> Option<i64> {
        if !self.session.codec().supports_stream_flow_control() {
            return None;
        }
        self.txn().map(|txn| txn.send_window.available())
    }

    /// The stream receive window, when the stream is flow controlled.
    pub fn recv_window(&self) -> Option<u32> {
        if !self.session.codec().supports_stream_flow_control() {
            return None;
        }
        self.txn().map(|txn| txn.recv_window.capacity())
    }

    /// Whether the peer pushed this transaction, and on which stream.
    pub fn assoc_stream_id(&self) -> Option<StreamId> {
        self.txn().and_then(|txn| txn.assoc)
    }

    fn txn(&self) -> Option<&Txn> {
        self.session.store.get(self.id)
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Transaction").field("id", &self.id).finish()
    }
}

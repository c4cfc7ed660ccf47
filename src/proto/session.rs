use super::byte_events::ByteEvents;
use super::counts::Counts;
use super::flow_control::{RecvWindow, SendWindow};
use super::priority::{self, Coordinator};
use super::state::Event as Step;
use super::store::Store;
use super::transaction::{Deferred, Transaction, Txn};
use super::upgrade::Upgrade;
use super::Priority;
use crate::codec::{Codec, Direction, Protocol};
use crate::config::Config;
use crate::error::{Error, ErrorKind, UserError};
use crate::frame::{Reason, Setting, StreamId};
use crate::handler::{Controller, Handler, Observer};
use crate::message::Message;
use crate::tracing::{debug, trace};
use crate::transport::{TimeoutKey, Timer, Transport};

use bytes::BytesMut;
use fnv::FnvBuildHasher;
use indexmap::IndexSet;

use std::collections::VecDeque;
use std::{fmt, io};

pub(super) type IdSet = IndexSet<StreamId, FnvBuildHasher>;

/// One connection: a transport, the codec speaking on it and every live
/// transaction.
///
/// The session is sans-io and single threaded. The owner feeds it reads,
/// write completions and timer expirations, and calls [`Session::flush`] to
/// let it write. Handler callbacks are delivered from an internal queue so
/// that a callback never runs inside another one; a handler may call back
/// into the session (including dropping the connection) at any point.
pub struct Session {
    pub(super) config: Config,
    pub(super) codec: Box<dyn Codec>,
    pub(super) transport: Box<dyn Transport>,
    pub(super) timer: Box<dyn Timer>,
    pub(super) observer: Option<Box<dyn Observer>>,
    pub(super) controller: Option<Box<dyn Controller>>,

    pub(super) state: State,
    pub(super) started: bool,

    pub(super) read_buf: BytesMut,
    pub(super) write_buf: BytesMut,

    /// Lengths of the writes handed to the transport, oldest first.
    pub(super) pending_writes: VecDeque<usize>,
    pub(super) pending_write_bytes: usize,

    pub(super) store: Store,
    pub(super) counts: Counts,

    /// Connection level windows.
    pub(super) send_window: SendWindow,
    pub(super) recv_window: RecvWindow,

    /// The peer's SETTINGS_INITIAL_WINDOW_SIZE.
    pub(super) peer_initial_window: u32,
    pub(super) peer_max_concurrent: Option<u32>,
    pub(super) peer_push: bool,

    pub(super) priority: Coordinator,
    pub(super) upgrade: Upgrade,
    pub(super) byte_events: ByteEvents,

    notify: VecDeque<(StreamId, Notify)>,
    dispatching: bool,
    pub(super) parsing: bool,

    /// Transactions with body or an end of message waiting to be written.
    pub(super) egress_pending: IdSet,
    pub(super) egress_paused: bool,
    /// Transactions paused by the write buffer, in pause order.
    pub(super) paused_order: IdSet,

    pub(super) replay_waiters: IdSet,

    /// A transaction paused ingress on a serial codec.
    pub(super) serial_pause: bool,
    /// Too many unparsed bytes are buffered.
    pub(super) read_buf_full: bool,
    reads_paused: bool,

    /// Our GOAWAY still has to be written.
    pub(super) goaway_pending: bool,

    /// Highest stream id allocated locally.
    pub(super) last_local: StreamId,
    /// Highest stream id the peer opened.
    pub(super) max_remote: StreamId,

    /// A serial codec lost message framing; no message may follow.
    pub(super) unusable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum State {
    Open,
    Draining,
    Closed,
    Destroyed,
}

/// A callback waiting for delivery.
pub(super) enum Notify {
    Attach,
    /// Hand the next deferred ingress item to the handler.
    Ingress,
    Error(Error),
    Goaway(Reason),
    EgressPaused,
    EgressResumed,
    ReplaySafe,
    Pushed { id: StreamId, request: Message },
    Detach,
}

impl Session {
    pub fn new(
        config: Config,
        codec: Box<dyn Codec>,
        transport: Box<dyn Transport>,
        timer: Box<dyn Timer>,
    ) -> Session {
        let window = codec.default_window_size();
        let max_outgoing = outgoing_limit(&*codec, &config, None);
        let counts = Counts::new(max_outgoing, config.max_concurrent_incoming);
        let priority = Coordinator::new(config.priority_tree.clone());

        debug!(
            protocol = %codec.protocol(),
            direction = ?codec.direction(),
            "new session"
        );

        Session {
            config,
            codec,
            transport,
            timer,
            observer: None,
            controller: None,
            state: State::Open,
            started: false,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            pending_writes: VecDeque::new(),
            pending_write_bytes: 0,
            store: Store::new(),
            counts,
            send_window: SendWindow::new(window),
            recv_window: RecvWindow::new(window),
            peer_initial_window: window,
            peer_max_concurrent: None,
            peer_push: true,
            priority,
            upgrade: Upgrade::Idle,
            byte_events: ByteEvents::default(),
            notify: VecDeque::new(),
            dispatching: false,
            parsing: false,
            egress_pending: IdSet::default(),
            egress_paused: false,
            paused_order: IdSet::default(),
            replay_waiters: IdSet::default(),
            serial_pause: false,
            read_buf_full: false,
            reads_paused: false,
            goaway_pending: false,
            last_local: StreamId::zero(),
            max_remote: StreamId::zero(),
            unusable: false,
        }
    }

    /// Installs the observer. It is told about the session's creation
    /// right away.
    pub fn set_observer(&mut self, mut observer: Box<dyn Observer>) {
        observer.on_create();
        self.observer = Some(observer);
    }

    /// Installs the controller that supplies handlers for incoming requests.
    pub fn set_controller(&mut self, controller: Box<dyn Controller>) {
        self.controller = Some(controller);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn codec(&self) -> &dyn Codec {
        &*self.codec
    }

    pub fn protocol(&self) -> Protocol {
        self.codec.protocol()
    }

    /// Writes the connection preface and initial settings and builds the
    /// virtual priority tree.
    ///
    /// Every other entry point calls this on first use.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        trace!("starting session");
        self.emit_preface();
        self.build_priority_tree();

        if self.store.is_empty() {
            self.schedule_idle();
        }
    }

    /// Announces the virtual priority nodes once the active codec can carry
    /// them.
    pub(super) fn build_priority_tree(&mut self) {
        let before = self.write_buf.len();
        self.priority.build(&mut *self.codec, &mut self.write_buf);
        self.byte_events.skip(self.write_buf.len() - before);
        self.sync_last_local();
    }

    /// Preface, settings and connection window for the active codec.
    pub(super) fn emit_preface(&mut self) {
        self.generate(None, |codec, dst| codec.generate_connection_preface(dst));

        if self.codec.supports_stream_flow_control() {
            let window = self.config.initial_stream_window;
            self.codec
                .set_egress_setting(Setting::InitialWindowSize(window));
        }
        if self.codec.supports_parallel_requests() {
            let max = self.config.max_concurrent_incoming;
            self.codec
                .set_egress_setting(Setting::MaxConcurrentStreams(max));
        }
        if self.codec.supports_push() && self.codec.direction() == Direction::Upstream {
            let enable = self.config.enable_push as u32;
            self.codec.set_egress_setting(Setting::EnablePush(enable));
        }
        self.generate(None, |codec, dst| codec.generate_settings(dst));

        if self.codec.supports_session_flow_control() {
            if let Some(delta) = self.recv_window.grow(self.config.session_window) {
                self.generate(None, |codec, dst| {
                    codec.generate_window_update(dst, StreamId::zero(), delta)
                });
            }
        }
    }

    /// Opens a locally initiated transaction served by `handler`.
    pub fn new_transaction(&mut self, handler: Box<dyn Handler>) -> Result<StreamId, Error> {
        match self.state {
            State::Open => {}
            State::Draining => return Err(UserError::Draining.into()),
            State::Closed | State::Destroyed => return Err(UserError::SessionClosed.into()),
        }

        self.start();

        if self.unusable || !self.codec.is_reusable() {
            return Err(UserError::Draining.into());
        }

        if !self.counts.can_inc_outgoing() {
            return Err(UserError::ConcurrencyLimit.into());
        }

        let id = self
            .codec
            .create_stream()
            .ok_or(UserError::StreamIdsExhausted)?;

        trace!(?id, "new transaction");

        let mut txn = Txn::new(
            id,
            true,
            self.peer_initial_window,
            self.config.initial_stream_window,
            self.config.transaction_timeout,
        );
        txn.handler = Some(handler);

        self.insert(txn);
        self.note_local(id);
        self.dispatch();

        Ok(id)
    }

    /// A handle to the live transaction `id`.
    pub fn transaction(&mut self, id: StreamId) -> Option<Transaction<'_>> {
        if self.store.contains(id) {
            Some(Transaction::new(self, id))
        } else {
            None
        }
    }

    /// Admits `txn`: counts it, arms its timer and queues its attach.
    pub(super) fn insert(&mut self, txn: Txn) {
        let id = txn.id;
        let outgoing = txn.outgoing;
        let attached = txn.handler.is_some();
        let egress_done = txn.is_egress_complete();
        let timeout = txn.idle_timeout;

        self.store.insert(txn);

        if outgoing {
            self.counts.inc_outgoing();
        } else {
            self.counts.inc_incoming();
        }
        self.counts.transition(self.observer.as_deref_mut());

        self.timer.cancel(TimeoutKey::Idle);
        if let Some(timeout) = timeout {
            self.timer.schedule(TimeoutKey::Transaction(id), timeout);
        }

        if attached {
            self.attach(id, egress_done);
        }
    }

    /// Queues the attach notification, pausing egress if the session is.
    pub(super) fn attach(&mut self, id: StreamId, egress_done: bool) {
        self.notify.push_back((id, Notify::Attach));

        if self.egress_paused && !egress_done {
            if let Some(txn) = self.store.get_mut(id) {
                txn.egress_paused = true;
                self.paused_order.insert(id);
                self.notify.push_back((id, Notify::EgressPaused));
            }
        }
    }

    /// Like `attach`, but delivered before anything already queued.
    pub(super) fn attach_first(&mut self, id: StreamId) {
        self.notify.push_front((id, Notify::Attach));
    }

    pub(super) fn queue(&mut self, id: StreamId, notify: Notify) {
        self.notify.push_back((id, notify));
    }

    /// Stops admitting transactions and closes once the live ones finish.
    pub fn drain(&mut self) {
        self.start();
        self.begin_drain();
        self.dispatch();
    }

    pub(super) fn begin_drain(&mut self) {
        if self.state != State::Open {
            return;
        }

        debug!(live = self.store.len(), "draining session");
        self.state = State::Draining;

        if self.codec.supports_parallel_requests() {
            self.goaway_pending = true;
        } else {
            let last = self.max_remote;
            self.generate(None, |codec, dst| {
                codec.generate_goaway(dst, last, Reason::NO_ERROR)
            });
        }
    }

    /// Fails every live transaction with a `Dropped` error and closes the
    /// transport.
    pub fn drop_connection(&mut self) {
        self.fail_connection(Error::new(ErrorKind::Dropped));
        self.dispatch();
    }

    /// Sends GOAWAY (where the protocol has one) and fails the connection.
    pub(super) fn connection_error(&mut self, reason: Reason, err: Error) {
        if matches!(self.state, State::Closed | State::Destroyed) {
            return;
        }

        if self.codec.supports_parallel_requests() {
            let last = self.max_remote;
            self.generate(None, |codec, dst| codec.generate_goaway(dst, last, reason));
            self.goaway_pending = false;
            self.write_out();
        }

        self.fail_connection(err);
    }

    /// The single funnel for connection fatal conditions.
    ///
    /// Every live transaction that has not started detaching gets exactly one
    /// error, then everything is torn down. Re-entry is a no-op.
    pub(super) fn fail_connection(&mut self, err: Error) {
        if matches!(self.state, State::Closed | State::Destroyed) {
            return;
        }

        debug!(error = %err, live = self.store.len(), "connection failed");
        self.state = State::Closed;

        let ids = self.store.ids();
        for &id in &ids {
            let deliver = match self.store.get_mut(id) {
                Some(txn) if !txn.detach_queued => {
                    let first = !txn.error_delivered;
                    txn.error_delivered = true;
                    txn.abort();
                    txn.discard_ingress();
                    txn.pending_byte_events = 0;
                    first
                }
                _ => false,
            };

            if deliver {
                let err = err.clone().with_stream(id);
                self.notify.push_back((id, Notify::Error(err)));
            }
        }

        self.byte_events.clear();
        self.read_buf.clear();
        self.write_buf.clear();
        self.pending_writes.clear();
        self.pending_write_bytes = 0;
        self.egress_pending.clear();
        self.paused_order.clear();
        self.replay_waiters.clear();
        self.goaway_pending = false;

        self.timer.cancel(TimeoutKey::Idle);
        self.timer.cancel(TimeoutKey::Write);
        self.transport.close_now();

        for id in ids {
            self.maybe_detach(id);
        }
    }

    /// Aborts one transaction: optionally reports `err` to its handler and
    /// resets the stream with `rst` where the codec can.
    ///
    /// Ingress accepted before the abort is still delivered first, unless the
    /// handler has ingress paused; then it is dropped.
    pub(super) fn abort_txn(&mut self, id: StreamId, err: Option<Error>, rst: Option<Reason>) {
        let (deliver, started, dropped) = match self.store.get_mut(id) {
            Some(txn) if !txn.aborted => {
                let deliver = err.is_some() && !txn.error_delivered;
                if deliver {
                    txn.error_delivered = true;
                }
                let started = !txn.outgoing || txn.egress.headers_sent;
                let complete = txn.is_ingress_complete() && txn.is_egress_complete();
                txn.abort();
                let dropped = if txn.ingress_paused {
                    txn.discard_ingress()
                } else {
                    0
                };
                (deliver, started && !complete, dropped)
            }
            _ => return,
        };

        debug!(?id, reason = ?rst, dropped, "aborting transaction");
        self.release_credit(id, dropped);
        self.egress_pending.shift_remove(&id);

        if let Some(reason) = rst {
            if self.codec.supports_stream_reset() {
                if started {
                    self.generate(None, |codec, dst| codec.generate_rst_stream(dst, id, reason));
                }
            } else if started {
                // the message framing on this connection is lost
                self.unusable = true;
                self.begin_drain();
            }
        }

        if deliver {
            if let Some(err) = err {
                self.notify.push_back((id, Notify::Error(err)));
            }
        }

        self.maybe_detach(id);
    }

    /// Queues the detach once both directions are done and no written bytes
    /// of the transaction are still in flight.
    pub(super) fn maybe_detach(&mut self, id: StreamId) {
        let txn = match self.store.get_mut(id) {
            Some(txn) => txn,
            None => return,
        };

        if txn.detach_queued
            || !txn.is_ingress_complete()
            || !txn.is_egress_complete()
            || txn.pending_byte_events > 0
        {
            return;
        }

        trace!(?id, "detach queued");
        txn.detach_queued = true;
        self.timer.cancel(TimeoutKey::Transaction(id));
        self.notify.push_back((id, Notify::Detach));
    }

    /// Delivers queued callbacks until the queue is empty.
    ///
    /// Calls made while a delivery is in progress return immediately; the
    /// outer loop picks up whatever they queued.
    pub(super) fn dispatch(&mut self) {
        if self.dispatching {
            return;
        }
        self.dispatching = true;

        while let Some((id, notify)) = self.notify.pop_front() {
            self.deliver(id, notify);
        }

        self.dispatching = false;
        self.check_destroy();
    }

    fn deliver(&mut self, id: StreamId, notify: Notify) {
        match notify {
            Notify::Attach => self.with_handler(id, |h, txn| h.on_attach(txn)),
            Notify::Ingress => self.deliver_ingress(id),
            Notify::Error(err) => self.with_handler(id, |h, txn| h.on_error(txn, &err)),
            Notify::Goaway(reason) => self.with_handler(id, |h, txn| h.on_goaway(txn, reason)),
            Notify::EgressPaused => self.with_handler(id, |h, txn| h.on_egress_paused(txn)),
            Notify::EgressResumed => self.with_handler(id, |h, txn| h.on_egress_resumed(txn)),
            Notify::ReplaySafe => self.with_handler(id, |h, txn| h.on_replay_safe(txn)),
            Notify::Pushed { id: pushed, request } => self.deliver_push(id, pushed, request),
            Notify::Detach => self.detach(id),
        }
    }

    /// Runs `f` with the transaction's handler taken out, so the handler may
    /// call back into the session.
    pub(super) fn with_handler<F>(&mut self, id: StreamId, f: F)
    where
        F: FnOnce(&mut dyn Handler, Transaction<'_>),
    {
        let mut handler = match self.store.get_mut(id).and_then(|txn| txn.handler.take()) {
            Some(handler) => handler,
            None => return,
        };

        f(&mut *handler, Transaction::new(self, id));

        if let Some(txn) = self.store.get_mut(id) {
            if txn.handler.is_none() {
                txn.handler = Some(handler);
            }
        }
    }

    fn deliver_ingress(&mut self, id: StreamId) {
        let item = match self.store.get_mut(id) {
            Some(txn) if !txn.ingress_paused || txn.aborted => match txn.deferred.pop_front() {
                Some(item) => item,
                None => return,
            },
            _ => return,
        };

        match item {
            Deferred::Headers(msg) => self.with_handler(id, |h, txn| h.on_headers(txn, msg)),
            Deferred::Body { chunk, flow } => {
                self.release_credit(id, flow);
                self.with_handler(id, |h, txn| h.on_body(txn, chunk));
            }
            Deferred::ChunkHeader(len) => {
                self.with_handler(id, |h, txn| h.on_chunk_header(txn, len))
            }
            Deferred::ChunkComplete => self.with_handler(id, |h, txn| h.on_chunk_complete(txn)),
            Deferred::Trailers(trailers) => {
                self.with_handler(id, |h, txn| h.on_trailers(txn, trailers))
            }
            Deferred::Upgrade(protocol) => {
                self.with_handler(id, |h, txn| h.on_upgrade(txn, protocol))
            }
            Deferred::Eom => {
                if let Some(txn) = self.store.get_mut(id) {
                    if let Some(next) = txn.ingress.transition(Step::EomDelivered) {
                        txn.ingress = next;
                    }
                }
                self.with_handler(id, |h, txn| h.on_eom(txn));
            }
        }

        self.maybe_detach(id);
    }

    fn deliver_push(&mut self, assoc: StreamId, pushed: StreamId, request: Message) {
        let mut handler = None;
        self.with_handler(assoc, |h, txn| {
            handler = h.on_pushed_transaction(txn, pushed, &request);
        });

        match handler {
            Some(handler) if self.store.contains(pushed) => {
                if let Some(txn) = self.store.get_mut(pushed) {
                    txn.handler = Some(handler);
                }
                self.attach_first(pushed);
            }
            _ => {
                debug!(?pushed, ?assoc, "push refused");
                self.abort_txn(pushed, None, Some(Reason::REFUSED_STREAM));
            }
        }
    }

    fn detach(&mut self, id: StreamId) {
        let mut txn = match self.store.remove(id) {
            Some(txn) => txn,
            None => return,
        };

        trace!(?id, live = self.store.len(), "detach");

        self.counts.dec(txn.outgoing);
        self.counts.transition(self.observer.as_deref_mut());

        self.egress_pending.shift_remove(&id);
        self.paused_order.shift_remove(&id);
        self.replay_waiters.shift_remove(&id);
        self.timer.cancel(TimeoutKey::Transaction(id));

        if self.store.is_empty() {
            // a forgotten pause must not starve the next transaction
            self.serial_pause = false;
            self.sync_reads();
            self.schedule_idle();
        }

        if let Some(mut handler) = txn.handler.take() {
            handler.on_detach(Transaction::new(self, id));
        }
    }

    /// Advances the session's own lifecycle once callbacks settled.
    fn check_destroy(&mut self) {
        loop {
            match self.state {
                State::Open => {
                    if self.store.is_empty() && (self.unusable || !self.codec.is_reusable()) {
                        self.begin_drain();
                        continue;
                    }
                    return;
                }
                State::Draining => {
                    if self.store.is_empty()
                        && !self.goaway_pending
                        && self.write_buf.is_empty()
                        && self.pending_writes.is_empty()
                    {
                        self.close();
                        continue;
                    }
                    return;
                }
                State::Closed => {
                    if self.store.is_empty() && self.notify.is_empty() {
                        debug!("session destroyed");
                        self.state = State::Destroyed;
                        if let Some(observer) = self.observer.as_mut() {
                            observer.on_destroy();
                        }
                    }
                    return;
                }
                State::Destroyed => return,
            }
        }
    }

    fn close(&mut self) {
        debug!("closing transport");
        self.state = State::Closed;
        self.timer.cancel(TimeoutKey::Idle);
        self.timer.cancel(TimeoutKey::Write);
        self.transport.close_now();
    }

    // ===== timers =====

    pub(super) fn refresh_timer(&mut self, id: StreamId) {
        let timeout = match self.store.get(id) {
            Some(txn) if !txn.detach_queued => txn.idle_timeout,
            _ => None,
        };

        if let Some(timeout) = timeout {
            self.timer.cancel(TimeoutKey::Transaction(id));
            self.timer.schedule(TimeoutKey::Transaction(id), timeout);
        }
    }

    pub(super) fn schedule_idle(&mut self) {
        if self.state != State::Open {
            return;
        }
        if let Some(timeout) = self.config.idle_timeout {
            self.timer.cancel(TimeoutKey::Idle);
            self.timer.schedule(TimeoutKey::Idle, timeout);
        }
    }

    /// Called by the timer when `key` expires.
    pub fn on_timeout(&mut self, key: TimeoutKey) {
        match key {
            TimeoutKey::Transaction(id) => {
                let live = self.store.get(id).map_or(false, |txn| !txn.detach_queued);
                if live {
                    debug!(?id, "transaction timed out");
                    let err = Error::new(ErrorKind::Timeout).with_stream(id);
                    self.abort_txn(id, Some(err), Some(Reason::CANCEL));
                }
            }
            TimeoutKey::Idle => {
                if self.store.is_empty() && self.state == State::Open {
                    debug!("session idle timeout");
                    self.begin_drain();
                }
            }
            TimeoutKey::Write => {
                if !self.pending_writes.is_empty() {
                    self.fail_connection(Error::new(ErrorKind::WriteTimeout));
                }
            }
        }
        self.dispatch();
    }

    // ===== transport callbacks =====

    /// The oldest outstanding write completed.
    pub fn on_write_success(&mut self) {
        if matches!(self.state, State::Closed | State::Destroyed) {
            return;
        }

        let len = match self.pending_writes.pop_front() {
            Some(len) => len,
            None => return,
        };
        self.pending_write_bytes -= len;

        if self.pending_writes.is_empty() {
            self.timer.cancel(TimeoutKey::Write);
        }

        for id in self.byte_events.ack(len) {
            if let Some(txn) = self.store.get_mut(id) {
                txn.pending_byte_events = txn.pending_byte_events.saturating_sub(1);
            }
            self.maybe_detach(id);
        }

        self.update_egress_pause();
        self.dispatch();
    }

    /// The oldest outstanding write failed. Every live transaction fails.
    pub fn on_write_error(&mut self, err: io::Error) {
        if matches!(self.state, State::Closed | State::Destroyed) {
            return;
        }
        let err = Error::new(ErrorKind::Write).with_detail(err.to_string());
        self.fail_connection(err);
        self.dispatch();
    }

    /// The transport became replay safe.
    pub fn on_replay_safe(&mut self) {
        let waiters: Vec<StreamId> = self.replay_waiters.drain(..).collect();
        for id in waiters {
            self.queue(id, Notify::ReplaySafe);
        }
        self.dispatch();
    }

    pub(super) fn add_replay_safety_waiter(&mut self, id: StreamId) -> Result<(), Error> {
        if !self.store.contains(id) {
            return Err(UserError::UnknownTransaction.into());
        }

        if self.transport.is_replay_safe() {
            self.queue(id, Notify::ReplaySafe);
            self.dispatch();
        } else {
            self.replay_waiters.insert(id);
        }
        Ok(())
    }

    pub(super) fn remove_replay_safety_waiter(&mut self, id: StreamId) {
        self.replay_waiters.shift_remove(&id);
    }

    /// Tells the transport whether reads should flow.
    pub(super) fn sync_reads(&mut self) {
        let paused = self.serial_pause || self.read_buf_full;
        if paused == self.reads_paused || matches!(self.state, State::Closed | State::Destroyed) {
            return;
        }
        self.reads_paused = paused;
        if paused {
            trace!("pausing reads");
            self.transport.pause_reads();
        } else {
            trace!("resuming reads");
            self.transport.resume_reads();
        }
    }

    // ===== limits and priority =====

    /// Caps locally initiated streams. The peer's own limit still applies.
    pub fn set_max_concurrent_outgoing_streams(&mut self, max: u32) {
        self.config.max_concurrent_outgoing = max;
        self.refresh_outgoing_limit();
        self.dispatch();
    }

    pub(super) fn refresh_outgoing_limit(&mut self) {
        let max = outgoing_limit(&*self.codec, &self.config, self.peer_max_concurrent);
        self.counts.set_max_outgoing(max);
        self.counts.set_max_incoming(self.config.max_concurrent_incoming);
        self.counts.transition(self.observer.as_deref_mut());
    }

    /// Changes the receive windows: `stream` for every stream (announced
    /// in SETTINGS) and `session` for the connection.
    pub fn set_flow_control(&mut self, stream: u32, session: u32) {
        self.config.initial_stream_window = stream;
        self.config.session_window = session;

        if !self.started {
            return;
        }
        if self.state != State::Open {
            // announced windows stay frozen once draining starts
            debug!(stream, session, "flow control change ignored while draining");
            return;
        }

        if self.codec.supports_stream_flow_control() {
            for txn in self.store.iter_mut() {
                txn.recv_window.grow(stream);
            }
            self.codec
                .set_egress_setting(Setting::InitialWindowSize(stream));
            self.generate(None, |codec, dst| codec.generate_settings(dst));
        }

        if self.codec.supports_session_flow_control() {
            if let Some(delta) = self.recv_window.grow(session) {
                self.generate(None, |codec, dst| {
                    codec.generate_window_update(dst, StreamId::zero(), delta)
                });
            }
        }
    }

    /// Announces a virtual priority node and returns its id, on codecs that
    /// prioritize.
    pub fn send_priority(&mut self, pri: Priority) -> Option<StreamId> {
        self.start();
        let before = self.write_buf.len();
        let id = priority::send_priority(&mut *self.codec, &mut self.write_buf, pri);
        self.byte_events.skip(self.write_buf.len() - before);
        if let Some(id) = id {
            self.note_local(id);
        }
        id
    }

    /// The priority for `level` from the virtual tree, if one was built.
    pub fn get_priority(&mut self, level: u8) -> Option<Priority> {
        self.start();
        self.priority.get(level)
    }

    /// Virtual priority nodes consume local stream ids too.
    pub(super) fn sync_last_local(&mut self) {
        if let Some(id) = self.priority.last_node() {
            self.note_local(id);
        }
    }

    pub(super) fn note_local(&mut self, id: StreamId) {
        if id > self.last_local {
            self.last_local = id;
        }
    }

    // ===== queries =====

    pub fn is_destroyed(&self) -> bool {
        self.state == State::Destroyed
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed | State::Destroyed)
    }

    pub fn is_draining(&self) -> bool {
        self.state != State::Open
    }

    /// Whether another message may follow on this connection.
    pub fn is_reusable(&self) -> bool {
        self.state == State::Open && !self.unusable && self.codec.is_reusable()
    }

    pub fn num_outgoing_streams(&self) -> u32 {
        self.counts.num_outgoing()
    }

    pub fn num_incoming_streams(&self) -> u32 {
        self.counts.num_incoming()
    }

    pub fn max_concurrent_outgoing_streams(&self) -> u32 {
        self.counts.max_outgoing()
    }

    /// Whether `new_transaction` would currently succeed.
    pub fn supports_more_transactions(&self) -> bool {
        self.is_reusable() && self.counts.can_inc_outgoing()
    }

    /// The connection send window, when the codec has one.
    pub fn send_window(&self) -> Option<i64> {
        if self.codec.supports_session_flow_control() {
            Some(self.send_window.available())
        } else {
            None
        }
    }

    /// Bytes handed to the transport whose writes have not completed.
    pub fn pending_write_bytes(&self) -> usize {
        self.pending_write_bytes
    }

    pub fn is_egress_paused(&self) -> bool {
        self.egress_paused
    }

    /// Whether `id` is a stream this side opens.
    pub(super) fn is_local_id(&self, id: StreamId) -> bool {
        let direction = self.codec.direction();
        if !self.codec.supports_parallel_requests() {
            return direction == Direction::Upstream;
        }
        match direction {
            Direction::Upstream => id.is_client_initiated(),
            Direction::Downstream => id.is_server_initiated(),
        }
    }
}

fn outgoing_limit(codec: &dyn Codec, config: &Config, peer: Option<u32>) -> u32 {
    if !codec.supports_parallel_requests() {
        return 1;
    }
    match peer {
        Some(peer) => peer.min(config.max_concurrent_outgoing),
        None => config.max_concurrent_outgoing,
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Session")
            .field("protocol", &self.codec.protocol())
            .field("direction", &self.codec.direction())
            .field("state", &self.state)
            .field("live", &self.store.len())
            .field("upgrade", &self.upgrade)
            .finish()
    }
}

impl fmt::Debug for Notify {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Notify::Attach => fmt.write_str("Attach"),
            Notify::Ingress => fmt.write_str("Ingress"),
            Notify::Error(ref err) => fmt.debug_tuple("Error").field(err).finish(),
            Notify::Goaway(reason) => fmt.debug_tuple("Goaway").field(&reason).finish(),
            Notify::EgressPaused => fmt.write_str("EgressPaused"),
            Notify::EgressResumed => fmt.write_str("EgressResumed"),
            Notify::ReplaySafe => fmt.write_str("ReplaySafe"),
            Notify::Pushed { id, .. } => fmt.debug_struct("Pushed").field("id", &id).finish(),
            Notify::Detach => fmt.write_str("Detach"),
        }
    }
}

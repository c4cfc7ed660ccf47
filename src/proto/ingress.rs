//! Handling of codec events.

use super::session::{Notify, Session, State};
use super::state::{Event as Step, Ingress};
use super::transaction::{Deferred, Txn};
use super::upgrade::{self, Selected, Upgrade};
use crate::codec::{CodecError, Direction, Event};
use crate::error::{Error, ErrorKind};
use crate::frame::{Reason, Setting, StreamId};
use crate::message::Message;
use crate::tracing::{debug, trace};

use bytes::{Buf, Bytes};
use http::header::{HeaderValue, CONTENT_LENGTH};
use http::StatusCode;

use std::collections::VecDeque;
use std::mem;

impl Session {
    /// Feeds bytes read from the transport.
    pub fn on_read(&mut self, buf: &[u8]) {
        if self.is_closed() {
            return;
        }
        self.start();

        if let Some(observer) = self.observer.as_mut() {
            observer.on_read(buf.len());
        }

        self.read_buf.extend_from_slice(buf);
        self.process_read_buf();
        self.dispatch();
    }

    /// The transport reached end of file.
    pub fn on_eof(&mut self) {
        if self.is_closed() {
            return;
        }
        self.start();

        debug!(live = self.store.len(), "read eof");

        let mut events = VecDeque::new();
        self.codec.on_ingress_eof(&mut events);
        while let Some(event) = events.pop_front() {
            if self.is_closed() {
                break;
            }
            self.handle_event(event);
        }

        for id in self.store.ids() {
            let waiting = self
                .store
                .get(id)
                .map_or(false, |txn| !txn.aborted && !txn.ingress.is_eom_seen());
            if waiting {
                let err = Error::new(ErrorKind::Eof).with_stream(id);
                self.abort_txn(id, Some(err), None);
            }
        }

        if self.state == State::Open {
            self.state = State::Draining;
        }
        self.dispatch();
    }

    /// Handles one event as if the codec had produced it.
    pub fn on_codec_event(&mut self, event: Event) {
        self.start();
        self.handle_event(event);
        self.dispatch();
    }

    /// Parses buffered ingress until the codec needs more bytes or ingress
    /// is paused.
    pub(super) fn process_read_buf(&mut self) {
        if self.parsing {
            return;
        }
        self.parsing = true;

        let mut events = VecDeque::new();

        while !self.read_buf.is_empty() && !self.is_closed() {
            if self.serial_pause || self.codec.is_waiting_for_egress() {
                break;
            }

            let consumed = self.codec.on_ingress(&self.read_buf, &mut events);
            self.read_buf.advance(consumed);

            while let Some(event) = events.pop_front() {
                if self.is_closed() {
                    break;
                }
                self.handle_event(event);
            }

            if consumed == 0 {
                break;
            }
        }

        self.parsing = false;
        self.read_buf_full = self.read_buf.len() >= self.config.read_buffer_limit;
        self.sync_reads();
    }

    pub(super) fn handle_event(&mut self, event: Event) {
        trace!(?event, "ingress event");

        match event {
            Event::MessageBegin { id } => self.on_message_begin(id),
            Event::PushPromise { id, assoc, request } => self.on_push_promise(id, assoc, request),
            Event::Headers { id, msg } => self.on_headers(id, msg),
            Event::Body { id, chunk, padding } => self.on_body(id, chunk, padding),
            Event::ChunkHeader { id, len } => {
                self.on_simple(id, Step::ChunkHeader, Deferred::ChunkHeader(len))
            }
            Event::ChunkComplete { id } => {
                self.on_simple(id, Step::ChunkComplete, Deferred::ChunkComplete)
            }
            Event::Trailers { id, trailers } => {
                self.on_simple(id, Step::Trailers, Deferred::Trailers(trailers))
            }
            Event::MessageComplete { id, upgrade } => self.on_message_complete(id, upgrade),
            Event::Abort { id, reason } => self.on_abort(id, reason),
            Event::GoAway {
                last_stream_id,
                reason,
                ..
            } => self.on_goaway(last_stream_id, reason),
            Event::Ping { payload, ack } => {
                if !ack {
                    self.generate(None, |codec, dst| codec.generate_ping_reply(dst, payload));
                }
            }
            Event::WindowUpdate { id, increment } => self.on_window_update(id, increment),
            Event::Settings(settings) => self.on_settings(settings),
            Event::SettingsAck => {
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_settings_ack();
                }
            }
            Event::Priority { id, priority } => {
                if let Some(txn) = self.store.get_mut(id) {
                    txn.priority = Some(priority);
                }
            }
            Event::Error { id, error } => self.on_codec_error(id, error),
        }
    }

    fn on_message_begin(&mut self, id: StreamId) {
        if self.store.contains(id) {
            return;
        }
        if self.codec.direction() == Direction::Upstream {
            return self.unknown_stream(id);
        }

        if id > self.max_remote {
            self.max_remote = id;
        }

        if self.state != State::Open {
            debug!(?id, "refusing stream while draining");
            if self.codec.supports_parallel_requests() {
                self.generate(None, |codec, dst| {
                    codec.generate_rst_stream(dst, id, Reason::REFUSED_STREAM)
                });
            }
            return;
        }

        if self.codec.supports_parallel_requests() && !self.counts.can_inc_incoming() {
            debug!(?id, "incoming stream limit reached");
            self.generate(None, |codec, dst| {
                codec.generate_rst_stream(dst, id, Reason::REFUSED_STREAM)
            });
            return;
        }

        let txn = Txn::new(
            id,
            false,
            self.peer_initial_window,
            self.config.initial_stream_window,
            self.config.transaction_timeout,
        );
        self.insert(txn);
    }

    fn on_push_promise(&mut self, id: StreamId, assoc: StreamId, request: Message) {
        if id > self.max_remote {
            self.max_remote = id;
        }

        if !self.config.enable_push {
            let err = Error::new(ErrorKind::Connection)
                .with_reason(Reason::PROTOCOL_ERROR)
                .with_detail("push promise with push disabled");
            return self.connection_error(Reason::PROTOCOL_ERROR, err);
        }

        let valid = self
            .store
            .get(assoc)
            .map_or(false, |txn| !txn.aborted && !txn.ingress.is_eom_seen());

        if !valid || self.state != State::Open {
            debug!(?id, ?assoc, "rejecting push promise");
            self.generate(None, |codec, dst| {
                codec.generate_rst_stream(dst, id, Reason::PROTOCOL_ERROR)
            });
            return;
        }

        let mut txn = Txn::new(
            id,
            false,
            self.peer_initial_window,
            self.config.initial_stream_window,
            self.config.transaction_timeout,
        );
        txn.assoc = Some(assoc);
        txn.egress.headers_sent = true;
        txn.egress.eom_queued = true;
        txn.egress.eom_sent = true;

        self.insert(txn);
        self.queue(assoc, Notify::Pushed { id, request });
    }

    fn on_headers(&mut self, id: StreamId, msg: Message) {
        let (needs_handler, outgoing) = match self.store.get(id) {
            Some(txn) => (
                txn.handler.is_none()
                    && !txn.outgoing
                    && txn.assoc.is_none()
                    && !txn.aborted
                    && txn.ingress == Ingress::Start,
                txn.outgoing,
            ),
            None => return self.unknown_stream(id),
        };

        let downstream = self.codec.direction() == Direction::Downstream;

        if needs_handler && downstream {
            let handler = self
                .controller
                .as_mut()
                .and_then(|controller| controller.handler_for(&msg));

            match handler {
                Some(handler) => {
                    if let Some(txn) = self.store.get_mut(id) {
                        txn.handler = Some(handler);
                    }
                    self.attach(id, false);
                }
                None => {
                    self.refuse(id);
                    if self.codec.supports_parallel_requests() {
                        return;
                    }
                }
            }
        }

        if !downstream && msg.status() == Some(StatusCode::SWITCHING_PROTOCOLS) {
            return self.on_switching_protocols(id, msg);
        }

        if !msg.is_informational() {
            if let Upgrade::Requested { id: req, .. } = self.upgrade {
                if req == id {
                    debug!(?id, "upgrade declined");
                    self.upgrade = Upgrade::Idle;
                }
            }
        }

        let step = if msg.is_informational() {
            Step::InformationalHeaders
        } else {
            Step::Headers
        };

        if !self.ingress_transition(id, step) {
            return;
        }

        if !outgoing {
            if let (Some(pri), Some(txn)) = (msg.priority(), self.store.get_mut(id)) {
                txn.priority = Some(pri);
            }
        }

        self.defer(id, Deferred::Headers(msg));
    }

    /// No handler for an incoming request.
    fn refuse(&mut self, id: StreamId) {
        debug!(?id, "refusing request");

        if self.codec.supports_parallel_requests() {
            self.abort_txn(id, None, Some(Reason::REFUSED_STREAM));
            return;
        }

        // the connection closes after the refusal
        self.begin_drain();

        let msg = Message::response(StatusCode::SERVICE_UNAVAILABLE)
            .with_header(CONTENT_LENGTH, HeaderValue::from_static("0"));
        self.generate(Some(id), |codec, dst| codec.generate_header(dst, id, &msg, true));

        if let Some(txn) = self.store.get_mut(id) {
            txn.egress.headers_sent = true;
            txn.egress.eom_queued = true;
            txn.egress.eom_sent = true;
        }
    }

    fn on_switching_protocols(&mut self, id: StreamId, msg: Message) {
        let tokens = match mem::replace(&mut self.upgrade, Upgrade::Idle) {
            Upgrade::Requested { id: req, tokens } if req == id => tokens,
            other => {
                self.upgrade = other;
                let err = Error::new(ErrorKind::BadUpgrade)
                    .with_stream(id)
                    .with_detail("unexpected 101 response");
                return self.fail_connection(err);
            }
        };

        match upgrade::select(&tokens, &msg) {
            Ok(Selected::Native(codec)) => {
                debug!(?id, protocol = %codec.protocol(), "upgrade confirmed");
                self.upgrade = Upgrade::Confirmed { id, codec };
            }
            Ok(Selected::Other(protocol)) => {
                debug!(?id, %protocol, "upgrade to foreign protocol");
                self.upgrade = Upgrade::Passthrough { id, protocol };
                if self.ingress_transition(id, Step::Headers) {
                    self.defer(id, Deferred::Headers(msg));
                }
            }
            Err(detail) => {
                let err = Error::new(ErrorKind::BadUpgrade)
                    .with_stream(id)
                    .with_detail(detail);
                self.fail_connection(err);
            }
        }
    }

    fn on_body(&mut self, id: StreamId, chunk: Bytes, padding: usize) {
        let flow = chunk.len() + padding;

        if self.codec.supports_session_flow_control()
            && self.recv_window.consume(flow as u32).is_err()
        {
            let err = Error::new(ErrorKind::FlowControl)
                .with_reason(Reason::FLOW_CONTROL_ERROR)
                .with_detail("connection window exceeded");
            return self.connection_error(Reason::FLOW_CONTROL_ERROR, err);
        }

        let stream_flow = self.codec.supports_stream_flow_control();
        let overrun = match self.store.get_mut(id) {
            Some(txn) => stream_flow && !txn.aborted && txn.recv_window.consume(flow as u32).is_err(),
            None => {
                self.release_credit(id, flow);
                return self.unknown_stream(id);
            }
        };

        if overrun {
            self.release_credit(id, flow);
            let err = Error::new(ErrorKind::FlowControl)
                .with_stream(id)
                .with_reason(Reason::FLOW_CONTROL_ERROR);
            return self.abort_txn(id, Some(err), Some(Reason::FLOW_CONTROL_ERROR));
        }

        if !self.ingress_transition(id, Step::Body) || chunk.is_empty() {
            self.release_credit(id, flow);
            return;
        }

        self.defer(id, Deferred::Body { chunk, flow });
    }

    fn on_simple(&mut self, id: StreamId, step: Step, item: Deferred) {
        if !self.store.contains(id) {
            return self.unknown_stream(id);
        }
        if self.ingress_transition(id, step) {
            self.defer(id, item);
        }
    }

    fn on_message_complete(&mut self, id: StreamId, upgrade: bool) {
        if upgrade {
            match mem::replace(&mut self.upgrade, Upgrade::Switched) {
                Upgrade::Confirmed { id: req, codec } if req == id => {
                    self.switch_codec(id, codec);
                }
                Upgrade::Passthrough { id: req, protocol } if req == id => {
                    if self.ingress_transition(id, Step::Upgrade) {
                        self.defer(id, Deferred::Upgrade(protocol));
                    }
                }
                other => {
                    self.upgrade = other;
                    let err = Error::new(ErrorKind::BadUpgrade)
                        .with_stream(id)
                        .with_detail("protocol switch without a switch response");
                    self.fail_connection(err);
                }
            }
            return;
        }

        if !self.store.contains(id) {
            return self.unknown_stream(id);
        }
        if self.ingress_transition(id, Step::Eom) {
            self.defer(id, Deferred::Eom);
        }
    }

    /// Replaces the codec after a confirmed protocol switch. The switching
    /// stream carries on under the new codec.
    fn switch_codec(&mut self, id: StreamId, mut codec: Box<dyn crate::codec::Codec>) {
        let ready = self.store.get(id).map_or(false, |txn| txn.egress.eom_sent);
        if !ready {
            let err = Error::new(ErrorKind::BadUpgrade)
                .with_stream(id)
                .with_detail("request body still pending at protocol switch");
            return self.fail_connection(err);
        }

        codec.on_ingress_upgrade(id);
        self.codec = codec;

        let protocol = self.codec.protocol();
        debug!(?id, %protocol, "switched codec");

        let window = self.codec.default_window_size();
        self.send_window = super::flow_control::SendWindow::new(window);
        self.recv_window = super::flow_control::RecvWindow::new(window);
        self.peer_initial_window = window;

        let stream_window = self.config.initial_stream_window;
        if let Some(txn) = self.store.get_mut(id) {
            txn.send_window = super::flow_control::SendWindow::new(window);
            txn.recv_window = super::flow_control::RecvWindow::new(stream_window);
        }

        self.refresh_outgoing_limit();
        self.emit_preface();
        self.build_priority_tree();

        if let Some(observer) = self.observer.as_mut() {
            observer.on_codec_change(protocol);
        }
    }

    fn on_abort(&mut self, id: StreamId, reason: Reason) {
        if !self.store.contains(id) {
            return self.unknown_stream(id);
        }

        debug!(?id, ?reason, "stream reset by peer");
        let err = Error::new(ErrorKind::StreamAbort)
            .with_stream(id)
            .with_reason(reason);
        self.abort_txn(id, Some(err), None);
    }

    fn on_goaway(&mut self, last: StreamId, reason: Reason) {
        debug!(?last, ?reason, "received GOAWAY");

        if self.state == State::Open {
            self.state = State::Draining;
        }

        for id in self.store.ids() {
            let (live, attached) = match self.store.get(id) {
                Some(txn) => (!txn.aborted && !txn.detach_queued, txn.handler.is_some()),
                None => continue,
            };
            if !live {
                continue;
            }

            if self.is_local_id(id) && id > last {
                let err = Error::new(ErrorKind::StreamUnacknowledged)
                    .with_stream(id)
                    .with_reason(reason);
                self.abort_txn(id, Some(err), None);
            } else if attached {
                self.queue(id, Notify::Goaway(reason));
            }
        }
    }

    fn on_window_update(&mut self, id: StreamId, increment: u32) {
        if id.is_zero() {
            if self.send_window.inc(increment).is_err() {
                let err = Error::new(ErrorKind::FlowControl)
                    .with_reason(Reason::FLOW_CONTROL_ERROR)
                    .with_detail("connection window overflow");
                self.connection_error(Reason::FLOW_CONTROL_ERROR, err);
            }
            return;
        }

        let overflow = match self.store.get_mut(id) {
            Some(txn) if !txn.aborted => txn.send_window.inc(increment).is_err(),
            Some(_) => return,
            None => return self.unknown_stream(id),
        };

        if overflow {
            let err = Error::new(ErrorKind::FlowControl)
                .with_stream(id)
                .with_reason(Reason::FLOW_CONTROL_ERROR);
            self.abort_txn(id, Some(err), Some(Reason::FLOW_CONTROL_ERROR));
        }
    }

    fn on_settings(&mut self, settings: Vec<Setting>) {
        for setting in &settings {
            match *setting {
                Setting::MaxConcurrentStreams(0) => {
                    debug!("peer allows no streams");
                    self.peer_max_concurrent = Some(0);
                    self.begin_drain();
                }
                Setting::MaxConcurrentStreams(max) => {
                    self.peer_max_concurrent = Some(max);
                    self.refresh_outgoing_limit();
                }
                Setting::InitialWindowSize(size) => {
                    let delta = size as i64 - self.peer_initial_window as i64;
                    self.peer_initial_window = size;

                    let overflow = self
                        .store
                        .iter_mut()
                        .any(|txn| txn.send_window.apply_delta(delta).is_err());
                    if overflow {
                        let err = Error::new(ErrorKind::FlowControl)
                            .with_reason(Reason::FLOW_CONTROL_ERROR)
                            .with_detail("initial window size overflow");
                        return self.connection_error(Reason::FLOW_CONTROL_ERROR, err);
                    }
                }
                Setting::EnablePush(value) => self.peer_push = value != 0,
                _ => {}
            }
        }

        self.generate(None, |codec, dst| codec.generate_settings_ack(dst));

        if let Some(observer) = self.observer.as_mut() {
            observer.on_settings(&settings);
        }
    }

    fn on_codec_error(&mut self, id: StreamId, error: CodecError) {
        debug!(?id, %error, "codec error");

        if let Some(observer) = self.observer.as_mut() {
            observer.on_ingress_error(&error);
        }

        let reason = error.reason();

        if error.is_connection_fatal() || id.is_zero() {
            let kind = if self.codec.supports_parallel_requests() {
                ErrorKind::Connection
            } else {
                ErrorKind::Parse
            };
            let err = Error::new(kind)
                .with_reason(reason)
                .with_detail(error.message().to_string());
            return self.connection_error(reason, err);
        }

        let live = self.store.get(id).map_or(false, |txn| !txn.aborted);
        if live {
            let err = Error::new(ErrorKind::Parse)
                .with_stream(id)
                .with_reason(reason)
                .with_detail(error.message().to_string());
            self.abort_txn(id, Some(err), Some(reason));
        } else if self.codec.supports_stream_reset() {
            self.generate(None, |codec, dst| codec.generate_rst_stream(dst, id, reason));
        }
    }

    /// An event named a stream with no live transaction.
    ///
    /// Streams that existed once are ignored; anything else breaks the
    /// connection.
    fn unknown_stream(&mut self, id: StreamId) {
        let plausible = if self.is_local_id(id) {
            id <= self.last_local
        } else {
            id <= self.max_remote
        };

        if plausible {
            trace!(?id, "ignoring event for closed stream");
            return;
        }

        let err = Error::new(ErrorKind::Connection)
            .with_reason(Reason::PROTOCOL_ERROR)
            .with_detail(format!("event for unknown stream {}", id));
        self.connection_error(Reason::PROTOCOL_ERROR, err);
    }

    /// Applies an ingress step. An illegal step aborts the transaction.
    fn ingress_transition(&mut self, id: StreamId, step: Step) -> bool {
        let txn = match self.store.get_mut(id) {
            Some(txn) => txn,
            None => return false,
        };
        if txn.aborted {
            return false;
        }

        match txn.ingress.transition(step) {
            Some(next) => {
                txn.ingress = next;
                true
            }
            None => {
                let detail = format!("state={}, event={}", txn.ingress, step);
                debug!(?id, %detail, "invalid ingress transition");
                let err = Error::new(ErrorKind::IngressState)
                    .with_stream(id)
                    .with_detail(detail);
                self.abort_txn(id, Some(err), Some(Reason::PROTOCOL_ERROR));
                false
            }
        }
    }

    /// Queues `item` for delivery to the transaction's handler.
    fn defer(&mut self, id: StreamId, item: Deferred) {
        match self.store.get_mut(id) {
            Some(txn) => txn.deferred.push_back(item),
            None => return,
        }
        self.refresh_timer(id);
        self.queue(id, Notify::Ingress);
    }

    /// Returns delivered body credit to the peer once enough accumulated.
    ///
    /// A draining session grants nothing more; the announced windows stay
    /// where they were.
    pub(super) fn release_credit(&mut self, id: StreamId, flow: usize) {
        if flow == 0 || self.is_draining() {
            return;
        }
        let flow = flow as u32;
        let threshold = self.config.window_update_threshold;

        if self.codec.supports_session_flow_control() {
            self.recv_window.release(flow);
            if let Some(inc) = self.recv_window.take_update(threshold) {
                self.generate(None, |codec, dst| {
                    codec.generate_window_update(dst, StreamId::zero(), inc)
                });
            }
        }

        if self.codec.supports_stream_flow_control() {
            let inc = match self.store.get_mut(id) {
                Some(txn) => {
                    txn.recv_window.release(flow);
                    if txn.aborted || txn.ingress.is_eom_seen() {
                        None
                    } else {
                        txn.recv_window.take_update(threshold)
                    }
                }
                None => None,
            };
            if let Some(inc) = inc {
                self.generate(None, |codec, dst| codec.generate_window_update(dst, id, inc));
            }
        }
    }
}

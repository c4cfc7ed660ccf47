use super::session::{Notify, Session, State};
use super::state::Ingress;
use super::transaction::Txn;
use super::upgrade::Upgrade;
use super::{Priority, DEFAULT_WEIGHT};
use crate::codec::{Codec, Direction};
use crate::error::{Error, ErrorKind, UserError};
use crate::frame::{Reason, StreamId};
use crate::handler::Handler;
use crate::message::Message;
use crate::tracing::{debug, trace};
use crate::transport::TimeoutKey;

use bytes::{Bytes, BytesMut};
use http::HeaderMap;

use std::mem;
use std::time::Duration;

impl Session {
    /// Writes everything that can be written.
    ///
    /// Parses buffered ingress, delivers pending callbacks, serializes queued
    /// body within the flow-control windows and the write buffer limit, and
    /// hands the result to the transport. Repeats until nothing changes.
    pub fn flush(&mut self) {
        self.start();

        loop {
            if !self.read_buf.is_empty() {
                self.process_read_buf();
            }

            self.dispatch();
            if self.is_closed() {
                break;
            }

            self.process_egress();

            if self.goaway_pending {
                self.goaway_pending = false;
                let last = self.max_remote;
                self.generate(None, |codec, dst| {
                    codec.generate_goaway(dst, last, Reason::NO_ERROR)
                });
            }

            if self.write_buf.is_empty() {
                break;
            }

            self.write_out();
            self.update_egress_pause();
        }

        self.dispatch();
    }

    /// Runs one codec command against the write buffer, attributing the
    /// bytes to `owner` for byte event tracking.
    pub(super) fn generate<F>(&mut self, owner: Option<StreamId>, f: F) -> usize
    where
        F: FnOnce(&mut dyn Codec, &mut BytesMut) -> usize,
    {
        let n = f(&mut *self.codec, &mut self.write_buf);

        match owner {
            Some(id) => {
                if self.byte_events.record(id, n) {
                    if let Some(txn) = self.store.get_mut(id) {
                        txn.pending_byte_events += 1;
                    }
                }
            }
            None => self.byte_events.skip(n),
        }
        n
    }

    /// Hands the write buffer to the transport.
    pub(super) fn write_out(&mut self) {
        if self.write_buf.is_empty() {
            return;
        }

        let buf = self.write_buf.split().freeze();
        let len = buf.len();

        if self.pending_writes.is_empty() {
            if let Some(timeout) = self.config.write_timeout {
                self.timer.schedule(TimeoutKey::Write, timeout);
            }
        }
        self.pending_writes.push_back(len);
        self.pending_write_bytes += len;

        trace!(len, pending = self.pending_write_bytes, "write");

        if let Some(observer) = self.observer.as_mut() {
            observer.on_write(len);
        }
        self.transport.write(buf);
    }

    fn buffered(&self) -> usize {
        self.pending_write_bytes + self.write_buf.len()
    }

    /// Pauses or resumes egress of every transaction as buffered bytes
    /// cross the write buffer limit.
    pub(super) fn update_egress_pause(&mut self) {
        let buffered = self.buffered();
        let limit = self.config.write_buffer_limit;

        if buffered > limit && !self.egress_paused {
            debug!(buffered, limit, "pausing egress");
            self.egress_paused = true;

            for id in self.store.ids() {
                match self.store.get_mut(id) {
                    Some(txn)
                        if !txn.egress_paused && !txn.detach_queued && !txn.is_egress_complete() =>
                    {
                        txn.egress_paused = true;
                    }
                    _ => continue,
                }
                self.paused_order.insert(id);
                self.queue(id, Notify::EgressPaused);
            }
        } else if buffered <= limit && self.egress_paused {
            debug!(buffered, limit, "resuming egress");
            self.egress_paused = false;

            let paused: Vec<StreamId> = self.paused_order.drain(..).collect();
            for id in paused {
                if let Some(txn) = self.store.get_mut(id) {
                    txn.egress_paused = false;
                    self.queue(id, Notify::EgressResumed);
                }
            }
        }
    }

    /// Serializes queued body and end of message, oldest request first.
    fn process_egress(&mut self) {
        let ids: Vec<StreamId> = self.egress_pending.iter().copied().collect();

        for id in ids {
            if self.buffered() >= self.config.write_buffer_limit {
                break;
            }
            self.egress_one(id);
        }
    }

    fn egress_one(&mut self, id: StreamId) {
        let limit = self.config.write_buffer_limit;
        let stream_flow = self.codec.supports_stream_flow_control();
        let session_flow = self.codec.supports_session_flow_control();

        loop {
            if self.buffered() >= limit {
                return;
            }

            let txn = match self.store.get_mut(id) {
                Some(txn) if !txn.aborted => txn,
                _ => {
                    self.egress_pending.shift_remove(&id);
                    return;
                }
            };

            if let Some(front) = txn.body.front_mut() {
                let mut max = front.len();
                if stream_flow {
                    max = max.min(txn.send_window.available().max(0) as usize);
                }
                if session_flow {
                    max = max.min(self.send_window.available().max(0) as usize);
                }
                if max == 0 {
                    trace!(?id, "egress blocked on flow control");
                    return;
                }

                let chunk = if max < front.len() {
                    front.split_to(max)
                } else {
                    mem::take(front)
                };
                if front.is_empty() {
                    txn.body.pop_front();
                }

                if stream_flow {
                    txn.send_window.claim(max as u32);
                }
                if session_flow {
                    self.send_window.claim(max as u32);
                }

                let eom = txn.body.is_empty() && txn.egress.eom_queued && txn.trailers.is_none();
                txn.egress.body_sent = true;
                if eom {
                    txn.egress.eom_sent = true;
                }

                self.generate(Some(id), |codec, dst| codec.generate_body(dst, id, chunk, eom));

                if eom {
                    return self.egress_done(id);
                }
                continue;
            }

            if txn.egress.eom_queued && !txn.egress.eom_sent {
                txn.egress.eom_sent = true;
                match txn.trailers.take() {
                    Some(trailers) => self.generate(Some(id), |codec, dst| {
                        codec.generate_trailers(dst, id, &trailers)
                    }),
                    None => self.generate(Some(id), |codec, dst| codec.generate_eom(dst, id)),
                };
                return self.egress_done(id);
            }

            self.egress_pending.shift_remove(&id);
            return;
        }
    }

    fn egress_done(&mut self, id: StreamId) {
        trace!(?id, "egress complete");
        self.egress_pending.shift_remove(&id);
        self.maybe_detach(id);
    }

    /// Checks that `id` still accepts egress.
    fn egress_txn(&mut self, id: StreamId) -> Result<&mut Txn, Error> {
        if self.is_closed() {
            return Err(UserError::SessionClosed.into());
        }

        let txn = self
            .store
            .get_mut(id)
            .ok_or(UserError::UnknownTransaction)?;

        if txn.aborted {
            return Err(Error::new(ErrorKind::EgressState)
                .with_stream(id)
                .with_detail("transaction aborted"));
        }
        if txn.egress.eom_queued {
            return Err(UserError::SendAfterEom.into());
        }
        Ok(txn)
    }

    pub(super) fn send_headers(
        &mut self,
        id: StreamId,
        mut msg: Message,
        eom: bool,
    ) -> Result<(), Error> {
        self.start();

        let txn = self.egress_txn(id)?;
        if txn.egress.headers_sent {
            return Err(UserError::HeadersAlreadySent.into());
        }
        if msg.priority().is_none() {
            msg.set_priority(txn.priority);
        }

        let upgrade_request = self.codec.direction() == Direction::Upstream
            && !self.codec.supports_parallel_requests()
            && msg.is_request()
            && id == StreamId::from(1)
            && self.upgrade.is_idle();
        if upgrade_request {
            let tokens = msg.upgrade_tokens();
            if !tokens.is_empty() {
                debug!(?id, ?tokens, "requesting protocol upgrade");
                self.upgrade = Upgrade::Requested { id, tokens };
            }
        }

        let informational = msg.is_informational();
        let eom = eom && !informational;

        self.generate(Some(id), |codec, dst| codec.generate_header(dst, id, &msg, eom));

        let grant = match self.store.get_mut(id) {
            Some(txn) => {
                if !informational {
                    txn.egress.headers_sent = true;
                }
                if eom {
                    txn.egress.eom_queued = true;
                    txn.egress.eom_sent = true;
                }
                txn.pending_grant.take()
            }
            None => None,
        };

        if let Some(delta) = grant.filter(|_| !self.is_draining()) {
            self.generate(None, |codec, dst| codec.generate_window_update(dst, id, delta));
        }

        self.refresh_timer(id);
        self.maybe_detach(id);
        self.dispatch();
        Ok(())
    }

    pub(super) fn send_body(&mut self, id: StreamId, chunk: Bytes) -> Result<(), Error> {
        let txn = self.egress_txn(id)?;
        if !txn.egress.headers_sent {
            return Err(UserError::BodyBeforeHeaders.into());
        }
        if chunk.is_empty() {
            return Ok(());
        }

        txn.body.push_back(chunk);
        self.egress_pending.insert(id);
        self.refresh_timer(id);
        Ok(())
    }

    pub(super) fn send_trailers(&mut self, id: StreamId, trailers: HeaderMap) -> Result<(), Error> {
        let txn = self.egress_txn(id)?;
        if !txn.egress.headers_sent {
            return Err(UserError::BodyBeforeHeaders.into());
        }
        txn.trailers = Some(trailers);
        Ok(())
    }

    pub(super) fn send_eom(&mut self, id: StreamId) -> Result<(), Error> {
        let txn = self.egress_txn(id)?;
        if !txn.egress.headers_sent {
            return Err(UserError::BodyBeforeHeaders.into());
        }
        txn.egress.eom_queued = true;
        self.egress_pending.insert(id);
        self.refresh_timer(id);
        Ok(())
    }

    pub(super) fn send_abort(&mut self, id: StreamId) -> Result<(), Error> {
        if !self.store.contains(id) {
            return Err(UserError::UnknownTransaction.into());
        }
        self.abort_txn(id, None, Some(Reason::CANCEL));
        self.dispatch();
        Ok(())
    }

    pub(super) fn pause_ingress(&mut self, id: StreamId) -> Result<(), Error> {
        let txn = self
            .store
            .get_mut(id)
            .ok_or(UserError::UnknownTransaction)?;
        if txn.ingress_paused {
            return Ok(());
        }

        trace!(?id, "pausing ingress");
        txn.ingress_paused = true;

        if !self.codec.supports_parallel_requests() {
            self.serial_pause = true;
            self.sync_reads();
        }
        Ok(())
    }

    pub(super) fn resume_ingress(&mut self, id: StreamId) -> Result<(), Error> {
        let txn = self
            .store
            .get_mut(id)
            .ok_or(UserError::UnknownTransaction)?;
        if !txn.ingress_paused {
            return Ok(());
        }

        trace!(?id, deferred = txn.deferred.len(), "resuming ingress");
        txn.ingress_paused = false;

        for _ in 0..txn.deferred.len() {
            self.queue(id, Notify::Ingress);
        }

        if !self.codec.supports_parallel_requests() {
            self.serial_pause = false;
            self.sync_reads();
            if !self.read_buf.is_empty() {
                self.process_read_buf();
            }
        }

        self.dispatch();
        Ok(())
    }

    pub(super) fn set_idle_timeout(&mut self, id: StreamId, timeout: Duration) -> Result<(), Error> {
        let txn = self
            .store
            .get_mut(id)
            .ok_or(UserError::UnknownTransaction)?;
        txn.idle_timeout = Some(timeout);
        self.refresh_timer(id);
        Ok(())
    }

    pub(super) fn update_and_send_priority(
        &mut self,
        id: StreamId,
        priority: Priority,
    ) -> Result<(), Error> {
        let txn = self
            .store
            .get_mut(id)
            .ok_or(UserError::UnknownTransaction)?;
        txn.priority = Some(priority);
        txn.priority_fallback = false;

        if self.codec.supports_priority() {
            self.generate(None, |codec, dst| codec.generate_priority(dst, id, &priority));
        }
        Ok(())
    }

    pub(super) fn update_and_send_priority_level(
        &mut self,
        id: StreamId,
        level: u8,
    ) -> Result<(), Error> {
        let weight = match self.store.get(id) {
            Some(txn) => txn.priority.map_or(DEFAULT_WEIGHT, |pri| pri.weight),
            None => return Err(UserError::UnknownTransaction.into()),
        };

        if self.priority.has_tree() {
            if let Some(pri) = self.priority.get(level) {
                return self.update_and_send_priority(id, pri);
            }
        }

        if !self.codec.supports_priority() {
            return Ok(());
        }

        let before = self.write_buf.len();
        let node = self
            .priority
            .fallback_node(&mut *self.codec, &mut self.write_buf, level);
        self.byte_events.skip(self.write_buf.len() - before);

        if let Some(node) = node {
            self.note_local(node);
            self.update_and_send_priority(id, Priority::new(node, false, weight))?;
            if let Some(txn) = self.store.get_mut(id) {
                txn.priority_fallback = true;
            }
        }
        Ok(())
    }

    pub(super) fn set_receive_window(&mut self, id: StreamId, size: u32) -> Result<(), Error> {
        let stream_flow = self.codec.supports_stream_flow_control();
        let txn = self
            .store
            .get_mut(id)
            .ok_or(UserError::UnknownTransaction)?;

        if !stream_flow || self.state != State::Open {
            return Ok(());
        }

        let delta = match txn.recv_window.grow(size) {
            Some(delta) => delta,
            None => return Ok(()),
        };

        if txn.outgoing && !txn.egress.headers_sent {
            // the stream does not exist on the wire yet
            txn.pending_grant = Some(txn.pending_grant.unwrap_or(0) + delta);
            return Ok(());
        }

        self.generate(None, |codec, dst| codec.generate_window_update(dst, id, delta));
        Ok(())
    }

    pub(super) fn push(
        &mut self,
        assoc: StreamId,
        request: Message,
        handler: Box<dyn Handler>,
    ) -> Result<StreamId, Error> {
        if self.is_closed() {
            return Err(UserError::SessionClosed.into());
        }
        if self.is_draining() {
            return Err(UserError::Draining.into());
        }
        if self.codec.direction() != Direction::Downstream
            || !self.codec.supports_push()
            || !self.peer_push
        {
            return Err(UserError::PushUnsupported.into());
        }

        match self.store.get(assoc) {
            Some(txn) if txn.aborted || txn.egress.eom_queued => {
                return Err(UserError::SendAfterEom.into());
            }
            Some(_) => {}
            None => return Err(UserError::UnknownTransaction.into()),
        }

        if !self.counts.can_inc_outgoing() {
            return Err(UserError::ConcurrencyLimit.into());
        }

        let id = self
            .codec
            .create_stream()
            .ok_or(UserError::StreamIdsExhausted)?;

        debug!(?id, ?assoc, "pushing");
        self.generate(Some(assoc), |codec, dst| {
            codec.generate_push_promise(dst, assoc, id, &request)
        });

        let mut txn = Txn::new(
            id,
            true,
            self.peer_initial_window,
            self.config.initial_stream_window,
            self.config.transaction_timeout,
        );
        txn.assoc = Some(assoc);
        txn.ingress = Ingress::ReceivingDone;
        txn.handler = Some(handler);

        self.insert(txn);
        self.note_local(id);
        self.dispatch();
        Ok(id)
    }
}

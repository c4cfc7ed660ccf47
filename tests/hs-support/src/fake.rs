//! A scriptable codec.
//!
//! `FakeCodec` parses nothing: every read consumes all its bytes and yields
//! whatever events the test queued. Every egress command is recorded and
//! written as a short tag (body commands write the body itself) so byte
//! accounting still works.

use hsession::codec::{Codec, Direction, Event, Protocol};
use hsession::{Message, Priority, Reason, Setting, StreamId};

use bytes::{BufMut, Bytes, BytesMut};
use http::HeaderMap;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// An egress command the session issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Preface,
    Header { id: StreamId, eom: bool },
    Body { id: StreamId, len: usize, eom: bool },
    Trailers { id: StreamId },
    Eom { id: StreamId },
    Reset { id: StreamId, reason: Reason },
    Goaway { last: StreamId, reason: Reason },
    WindowUpdate { id: StreamId, delta: u32 },
    Settings,
    SettingsAck,
    Priority { id: StreamId },
    PushPromise { assoc: StreamId, promised: StreamId },
    PingReply,
}

#[derive(Debug)]
pub struct FakeState {
    /// Events handed out on the next read.
    pub ingress: VecDeque<Event>,
    /// Events handed out at EOF.
    pub eof: VecDeque<Event>,
    pub generated: Vec<Generated>,
    pub reusable: bool,
    pub waiting_for_egress: bool,
    pub settings: Vec<Setting>,
    pub upgraded: Option<StreamId>,
}

#[derive(Debug, Clone)]
pub struct Fake(Rc<RefCell<FakeState>>);

impl Fake {
    pub fn queue(&self, event: Event) {
        self.0.borrow_mut().ingress.push_back(event);
    }

    pub fn queue_eof(&self, event: Event) {
        self.0.borrow_mut().eof.push_back(event);
    }

    pub fn generated(&self) -> Vec<Generated> {
        self.0.borrow().generated.clone()
    }

    /// Returns the commands recorded since the last call.
    pub fn take_generated(&self) -> Vec<Generated> {
        std::mem::take(&mut self.0.borrow_mut().generated)
    }

    pub fn set_reusable(&self, reusable: bool) {
        self.0.borrow_mut().reusable = reusable;
    }

    pub fn set_waiting_for_egress(&self, waiting: bool) {
        self.0.borrow_mut().waiting_for_egress = waiting;
    }

    pub fn settings(&self) -> Vec<Setting> {
        self.0.borrow().settings.clone()
    }

    pub fn upgraded(&self) -> Option<StreamId> {
        self.0.borrow().upgraded
    }
}

/// Which capabilities the fake claims.
#[derive(Debug, Clone, Copy)]
pub struct Caps {
    pub parallel: bool,
    pub stream_flow: bool,
    pub session_flow: bool,
    pub priority: bool,
    pub push: bool,
    pub reset: bool,
    pub window: u32,
}

impl Caps {
    /// Multiplexed, flow controlled, like HTTP/2.
    pub fn parallel() -> Caps {
        Caps {
            parallel: true,
            stream_flow: true,
            session_flow: true,
            priority: true,
            push: true,
            reset: true,
            window: 65_535,
        }
    }

    /// One exchange at a time, like HTTP/1.1.
    pub fn serial() -> Caps {
        Caps {
            parallel: false,
            stream_flow: false,
            session_flow: false,
            priority: false,
            push: false,
            reset: false,
            window: 65_535,
        }
    }
}

pub struct FakeCodec {
    caps: Caps,
    direction: Direction,
    next_id: u32,
    state: Fake,
}

impl FakeCodec {
    pub fn new(caps: Caps, direction: Direction) -> (FakeCodec, Fake) {
        let state = Fake(Rc::new(RefCell::new(FakeState {
            ingress: VecDeque::new(),
            eof: VecDeque::new(),
            generated: vec![],
            reusable: true,
            waiting_for_egress: false,
            settings: vec![],
            upgraded: None,
        })));

        let next_id = match (caps.parallel, direction) {
            (true, Direction::Downstream) => 2,
            _ => 1,
        };

        let codec = FakeCodec {
            caps,
            direction,
            next_id,
            state: state.clone(),
        };
        (codec, state)
    }

    fn record(&mut self, dst: &mut BytesMut, generated: Generated, tag: &[u8]) -> usize {
        self.state.0.borrow_mut().generated.push(generated);
        dst.put_slice(tag);
        tag.len()
    }
}

impl Codec for FakeCodec {
    fn protocol(&self) -> Protocol {
        if self.caps.parallel {
            Protocol::Http2
        } else {
            Protocol::Http1
        }
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn supports_parallel_requests(&self) -> bool {
        self.caps.parallel
    }

    fn supports_stream_flow_control(&self) -> bool {
        self.caps.stream_flow
    }

    fn supports_session_flow_control(&self) -> bool {
        self.caps.session_flow
    }

    fn supports_priority(&self) -> bool {
        self.caps.priority
    }

    fn supports_push(&self) -> bool {
        self.caps.push
    }

    fn supports_stream_reset(&self) -> bool {
        self.caps.reset
    }

    fn is_reusable(&self) -> bool {
        self.state.0.borrow().reusable
    }

    fn is_waiting_for_egress(&self) -> bool {
        self.state.0.borrow().waiting_for_egress
    }

    fn default_window_size(&self) -> u32 {
        self.caps.window
    }

    fn create_stream(&mut self) -> Option<StreamId> {
        let id = StreamId::from(self.next_id);
        self.next_id += if self.caps.parallel { 2 } else { 1 };
        Some(id)
    }

    fn on_ingress(&mut self, src: &[u8], events: &mut VecDeque<Event>) -> usize {
        events.extend(self.state.0.borrow_mut().ingress.drain(..));
        src.len()
    }

    fn on_ingress_eof(&mut self, events: &mut VecDeque<Event>) {
        events.extend(self.state.0.borrow_mut().eof.drain(..));
    }

    fn on_ingress_upgrade(&mut self, id: StreamId) {
        self.state.0.borrow_mut().upgraded = Some(id);
    }

    fn generate_connection_preface(&mut self, dst: &mut BytesMut) -> usize {
        self.record(dst, Generated::Preface, b"P")
    }

    fn generate_header(&mut self, dst: &mut BytesMut, id: StreamId, _msg: &Message, eom: bool) -> usize {
        self.record(dst, Generated::Header { id, eom }, b"H")
    }

    fn generate_body(&mut self, dst: &mut BytesMut, id: StreamId, chunk: Bytes, eom: bool) -> usize {
        let len = chunk.len();
        self.state
            .0
            .borrow_mut()
            .generated
            .push(Generated::Body { id, len, eom });
        dst.put(chunk);
        len
    }

    fn generate_trailers(&mut self, dst: &mut BytesMut, id: StreamId, _trailers: &HeaderMap) -> usize {
        self.record(dst, Generated::Trailers { id }, b"T")
    }

    fn generate_eom(&mut self, dst: &mut BytesMut, id: StreamId) -> usize {
        self.record(dst, Generated::Eom { id }, b"E")
    }

    fn generate_rst_stream(&mut self, dst: &mut BytesMut, id: StreamId, reason: Reason) -> usize {
        if !self.caps.reset {
            return 0;
        }
        self.record(dst, Generated::Reset { id, reason }, b"R")
    }

    fn generate_goaway(&mut self, dst: &mut BytesMut, last: StreamId, reason: Reason) -> usize {
        self.state.0.borrow_mut().reusable = false;
        if !self.caps.parallel {
            self.state
                .0
                .borrow_mut()
                .generated
                .push(Generated::Goaway { last, reason });
            return 0;
        }
        self.record(dst, Generated::Goaway { last, reason }, b"G")
    }

    fn generate_window_update(&mut self, dst: &mut BytesMut, id: StreamId, delta: u32) -> usize {
        self.record(dst, Generated::WindowUpdate { id, delta }, b"W")
    }

    fn generate_settings(&mut self, dst: &mut BytesMut) -> usize {
        self.record(dst, Generated::Settings, b"S")
    }

    fn generate_settings_ack(&mut self, dst: &mut BytesMut) -> usize {
        self.record(dst, Generated::SettingsAck, b"A")
    }

    fn generate_priority(&mut self, dst: &mut BytesMut, id: StreamId, _pri: &Priority) -> usize {
        self.record(dst, Generated::Priority { id }, b"Y")
    }

    fn generate_push_promise(
        &mut self,
        dst: &mut BytesMut,
        assoc: StreamId,
        promised: StreamId,
        _request: &Message,
    ) -> usize {
        self.record(dst, Generated::PushPromise { assoc, promised }, b"U")
    }

    fn generate_ping_reply(&mut self, dst: &mut BytesMut, _payload: [u8; 8]) -> usize {
        self.record(dst, Generated::PingReply, b"O")
    }

    fn set_egress_setting(&mut self, setting: Setting) {
        let mut state = self.state.0.borrow_mut();
        state
            .settings
            .retain(|s| std::mem::discriminant(s) != std::mem::discriminant(&setting));
        state.settings.push(setting);
    }
}

//! A recording transport and a manual timer.

use hsession::{TimeoutKey, Timer, Transport};

use bytes::Bytes;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Everything the session did to its transport and timer.
#[derive(Debug)]
pub struct Io {
    /// Buffers handed to `Transport::write`, in order.
    pub writes: Vec<Bytes>,
    /// How many of `writes` were acknowledged.
    pub completed: usize,
    /// Bytes of `writes` already returned by `take_written`.
    pub taken: usize,
    pub closed: bool,
    pub reads_paused: bool,
    pub pause_calls: usize,
    pub replay_safe: bool,
    /// Armed timers with their durations.
    pub timers: Vec<(TimeoutKey, Duration)>,
}

pub type Handle = Rc<RefCell<Io>>;

impl Default for Io {
    fn default() -> Io {
        Io {
            writes: vec![],
            completed: 0,
            taken: 0,
            closed: false,
            reads_paused: false,
            pause_calls: 0,
            replay_safe: true,
            timers: vec![],
        }
    }
}

impl Io {
    /// Every byte written so far.
    pub fn written(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|b| b.iter().copied()).collect()
    }

    /// Bytes written since the last call.
    pub fn take_written(&mut self) -> Vec<u8> {
        let all = self.written();
        let new = all[self.taken..].to_vec();
        self.taken = all.len();
        new
    }

    pub fn outstanding(&self) -> usize {
        self.writes.len() - self.completed
    }

    pub fn is_armed(&self, key: TimeoutKey) -> bool {
        self.timers.iter().any(|&(k, _)| k == key)
    }

    pub fn timeout(&self, key: TimeoutKey) -> Option<Duration> {
        self.timers.iter().find(|&&(k, _)| k == key).map(|&(_, d)| d)
    }
}

pub struct MockTransport(pub Handle);

impl Transport for MockTransport {
    fn write(&mut self, buf: Bytes) {
        self.0.borrow_mut().writes.push(buf);
    }

    fn pause_reads(&mut self) {
        let mut io = self.0.borrow_mut();
        io.reads_paused = true;
        io.pause_calls += 1;
    }

    fn resume_reads(&mut self) {
        self.0.borrow_mut().reads_paused = false;
    }

    fn close_now(&mut self) {
        self.0.borrow_mut().closed = true;
    }

    fn is_replay_safe(&self) -> bool {
        self.0.borrow().replay_safe
    }
}

pub struct MockTimer(pub Handle);

impl Timer for MockTimer {
    fn schedule(&mut self, key: TimeoutKey, after: Duration) {
        let mut io = self.0.borrow_mut();
        io.timers.retain(|&(k, _)| k != key);
        io.timers.push((key, after));
    }

    fn cancel(&mut self, key: TimeoutKey) {
        self.0.borrow_mut().timers.retain(|&(k, _)| k != key);
    }
}

/// A transport and timer sharing one `Io` record.
pub fn new() -> (Box<dyn Transport>, Box<dyn Timer>, Handle) {
    let io = Handle::default();
    (
        Box::new(MockTransport(io.clone())),
        Box::new(MockTimer(io.clone())),
        io,
    )
}

//! Runs a [`Session`] over a tokio byte stream.
//!
//! The session itself never touches I/O. [`Connection`] owns the socket,
//! feeds reads into the session, performs the writes it queues and fires
//! its timers from a [`DelayQueue`].

use crate::codec::Codec;
use crate::config::Config;
use crate::proto::Session;
use crate::tracing::{debug, trace};
use crate::transport::{TimeoutKey, Timer, Transport};

use bytes::Bytes;
use fnv::FnvHashMap;
use futures_util::future::poll_fn;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::time::delay_queue::{self, DelayQueue};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use std::{fmt, io};

const READ_CHUNK: usize = 16 * 1024;

/// A session bound to an I/O object.
///
/// Must be created and run inside a tokio runtime with the time driver
/// enabled. The connection is `!Send`; run it on a current thread runtime
/// or a `LocalSet`.
pub struct Connection<T> {
    io: T,
    session: Session,
    shared: Rc<RefCell<Shared>>,
    buf: Vec<u8>,
}

/// State shared by the session's transport and timer and the driver loop.
#[derive(Default)]
struct Shared {
    writes: VecDeque<Bytes>,
    closed: bool,
    reads_paused: bool,
    timers: DelayQueue<TimeoutKey>,
    keys: FnvHashMap<TimeoutKey, delay_queue::Key>,
}

enum Wakeup {
    Read(io::Result<usize>),
    Timer(Option<TimeoutKey>),
    Stalled,
}

struct SharedTransport(Rc<RefCell<Shared>>);

struct SharedTimer(Rc<RefCell<Shared>>);

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, codec: Box<dyn Codec>, config: Config) -> Connection<T> {
        let shared = Rc::new(RefCell::new(Shared::default()));
        let session = Session::new(
            config,
            codec,
            Box::new(SharedTransport(shared.clone())),
            Box::new(SharedTimer(shared.clone())),
        );

        Connection {
            io,
            session,
            shared,
            buf: vec![0; READ_CHUNK],
        }
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Drives the session until it is destroyed or the transport fails.
    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            self.session.flush();

            if self.write_queued().await {
                // completions may have released paused egress
                continue;
            }

            if self.shared.borrow().closed || self.session.is_destroyed() {
                debug!("connection closed");
                let _ = self.io.shutdown().await;
                return Ok(());
            }

            let reads_paused = self.shared.borrow().reads_paused;
            let has_timers = !self.shared.borrow().keys.is_empty();

            let wakeup = {
                let shared = &self.shared;
                let io = &mut self.io;
                let buf = &mut self.buf[..];

                tokio::select! {
                    res = io.read(buf), if !reads_paused => Wakeup::Read(res),
                    expired = poll_fn(|cx| shared.borrow_mut().timers.poll_expired(cx)), if has_timers => {
                        Wakeup::Timer(expired.map(|expired| expired.into_inner()))
                    }
                    else => Wakeup::Stalled,
                }
            };

            match wakeup {
                Wakeup::Read(Ok(0)) => self.session.on_eof(),
                Wakeup::Read(Ok(n)) => {
                    trace!(n, "read");
                    self.session.on_read(&self.buf[..n]);
                }
                Wakeup::Read(Err(err)) => {
                    debug!(%err, "read error");
                    self.session.drop_connection();
                    return Err(err);
                }
                Wakeup::Timer(Some(key)) => {
                    self.shared.borrow_mut().keys.remove(&key);
                    trace!(?key, "timer fired");
                    self.session.on_timeout(key);
                }
                Wakeup::Timer(None) => {}
                Wakeup::Stalled => {
                    debug!("reads paused with no timer armed; dropping connection");
                    self.session.drop_connection();
                }
            }
        }
    }

    /// Performs every write the session queued. Returns false if there was
    /// nothing to write.
    async fn write_queued(&mut self) -> bool {
        let mut wrote = false;

        loop {
            let next = self.shared.borrow_mut().writes.pop_front();
            let buf = match next {
                Some(buf) => buf,
                None => return wrote,
            };
            wrote = true;

            match self.io.write_all(&buf).await {
                Ok(()) => self.session.on_write_success(),
                Err(err) => {
                    debug!(%err, "write error");
                    self.shared.borrow_mut().writes.clear();
                    self.session.on_write_error(err);
                    return true;
                }
            }
        }
    }
}

impl<T> fmt::Debug for Connection<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Connection")
            .field("session", &self.session)
            .finish()
    }
}

impl Transport for SharedTransport {
    fn write(&mut self, buf: Bytes) {
        let mut shared = self.0.borrow_mut();
        if !shared.closed {
            shared.writes.push_back(buf);
        }
    }

    fn pause_reads(&mut self) {
        self.0.borrow_mut().reads_paused = true;
    }

    fn resume_reads(&mut self) {
        self.0.borrow_mut().reads_paused = false;
    }

    fn close_now(&mut self) {
        // writes handed over before the close still go out
        self.0.borrow_mut().closed = true;
    }
}

impl Timer for SharedTimer {
    fn schedule(&mut self, key: TimeoutKey, after: Duration) {
        let mut shared = self.0.borrow_mut();
        match shared.keys.get(&key).copied() {
            Some(slot) => shared.timers.reset(&slot, after),
            None => {
                let slot = shared.timers.insert(key, after);
                shared.keys.insert(key, slot);
            }
        }
    }

    fn cancel(&mut self, key: TimeoutKey) {
        let mut shared = self.0.borrow_mut();
        if let Some(slot) = shared.keys.remove(&key) {
            shared.timers.remove(&slot);
        }
    }
}

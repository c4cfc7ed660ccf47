//! Handlers, controllers and observers that record what they are told.

use hsession::codec::{CodecError, Protocol};
use hsession::{Controller, Error, Handler, Message, Observer, Reason, Setting, StreamId, Transaction};

use bytes::Bytes;
use http::HeaderMap;

use std::cell::RefCell;
use std::rc::Rc;

/// One handler callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Ev {
    Attach,
    Headers(Message),
    Body(Bytes),
    ChunkHeader(usize),
    ChunkComplete,
    Trailers(HeaderMap),
    Eom,
    Upgrade(String),
    Error(Error),
    Goaway(Reason),
    EgressPaused,
    EgressResumed,
    Pushed(StreamId),
    ReplaySafe,
    Detach,
}

impl Ev {
    pub fn is_error(&self) -> bool {
        matches!(*self, Ev::Error(_))
    }
}

/// The callbacks seen by one handler.
#[derive(Debug, Clone, Default)]
pub struct Log(Rc<RefCell<Vec<Ev>>>);

impl Log {
    pub fn new() -> Log {
        Log::default()
    }

    pub fn push(&self, ev: Ev) {
        self.0.borrow_mut().push(ev);
    }

    pub fn events(&self) -> Vec<Ev> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn errors(&self) -> Vec<Error> {
        self.0
            .borrow()
            .iter()
            .filter_map(|ev| match *ev {
                Ev::Error(ref err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, f: impl Fn(&Ev) -> bool) -> usize {
        self.0.borrow().iter().filter(|ev| f(ev)).count()
    }

    pub fn is_detached(&self) -> bool {
        self.0.borrow().last() == Some(&Ev::Detach)
    }

    /// The body bytes delivered so far, concatenated.
    pub fn body(&self) -> Vec<u8> {
        self.0
            .borrow()
            .iter()
            .filter_map(|ev| match *ev {
                Ev::Body(ref chunk) => Some(chunk.clone()),
                _ => None,
            })
            .flat_map(|chunk| chunk.to_vec())
            .collect()
    }
}

type Reaction = Box<dyn FnMut(&mut Transaction<'_>, &Ev)>;
type PushFn = Box<dyn FnMut(StreamId, &Message) -> Option<Box<dyn Handler>>>;

/// A handler that records every callback and then runs an optional
/// scripted reaction with the transaction.
pub struct Recorder {
    log: Log,
    reaction: Option<Reaction>,
    push: Option<PushFn>,
}

impl Recorder {
    pub fn new() -> (Recorder, Log) {
        let log = Log::new();
        (Recorder::with_log(log.clone()), log)
    }

    pub fn with_log(log: Log) -> Recorder {
        Recorder {
            log,
            reaction: None,
            push: None,
        }
    }

    /// Runs `f` after every recorded callback.
    pub fn react<F>(mut self, f: F) -> Recorder
    where
        F: FnMut(&mut Transaction<'_>, &Ev) + 'static,
    {
        self.reaction = Some(Box::new(f));
        self
    }

    /// Serves pushed transactions with handlers returned by `f`.
    pub fn on_push<F>(mut self, f: F) -> Recorder
    where
        F: FnMut(StreamId, &Message) -> Option<Box<dyn Handler>> + 'static,
    {
        self.push = Some(Box::new(f));
        self
    }

    pub fn boxed(self) -> Box<dyn Handler> {
        Box::new(self)
    }

    fn record(&mut self, mut txn: Transaction<'_>, ev: Ev) {
        self.log.push(ev.clone());
        if let Some(reaction) = self.reaction.as_mut() {
            reaction(&mut txn, &ev);
        }
    }
}

impl Handler for Recorder {
    fn on_attach(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::Attach);
    }

    fn on_headers(&mut self, txn: Transaction<'_>, msg: Message) {
        self.record(txn, Ev::Headers(msg));
    }

    fn on_body(&mut self, txn: Transaction<'_>, chunk: Bytes) {
        self.record(txn, Ev::Body(chunk));
    }

    fn on_chunk_header(&mut self, txn: Transaction<'_>, len: usize) {
        self.record(txn, Ev::ChunkHeader(len));
    }

    fn on_chunk_complete(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::ChunkComplete);
    }

    fn on_trailers(&mut self, txn: Transaction<'_>, trailers: HeaderMap) {
        self.record(txn, Ev::Trailers(trailers));
    }

    fn on_eom(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::Eom);
    }

    fn on_upgrade(&mut self, txn: Transaction<'_>, protocol: String) {
        self.record(txn, Ev::Upgrade(protocol));
    }

    fn on_error(&mut self, txn: Transaction<'_>, err: &Error) {
        self.record(txn, Ev::Error(err.clone()));
    }

    fn on_goaway(&mut self, txn: Transaction<'_>, reason: Reason) {
        self.record(txn, Ev::Goaway(reason));
    }

    fn on_egress_paused(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::EgressPaused);
    }

    fn on_egress_resumed(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::EgressResumed);
    }

    fn on_pushed_transaction(
        &mut self,
        txn: Transaction<'_>,
        pushed: StreamId,
        request: &Message,
    ) -> Option<Box<dyn Handler>> {
        self.record(txn, Ev::Pushed(pushed));
        self.push.as_mut().and_then(|f| f(pushed, request))
    }

    fn on_replay_safe(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::ReplaySafe);
    }

    fn on_detach(&mut self, txn: Transaction<'_>) {
        self.record(txn, Ev::Detach);
    }
}

/// A controller backed by a closure.
pub struct ControllerFn<F>(pub F);

impl<F> Controller for ControllerFn<F>
where
    F: FnMut(&Message) -> Option<Box<dyn Handler>>,
{
    fn handler_for(&mut self, request: &Message) -> Option<Box<dyn Handler>> {
        (self.0)(request)
    }
}

/// A controller that serves every request with a fresh `Recorder` running
/// `reaction`, and keeps the logs in arrival order.
pub fn serve<F>(
    reaction: F,
) -> (
    ControllerFn<impl FnMut(&Message) -> Option<Box<dyn Handler>>>,
    Rc<RefCell<Vec<Log>>>,
)
where
    F: FnMut(&mut Transaction<'_>, &Ev) + Clone + 'static,
{
    let logs = Rc::new(RefCell::new(Vec::new()));
    let shared = logs.clone();

    let controller = ControllerFn(move |_request: &Message| {
        let (recorder, log) = Recorder::new();
        shared.borrow_mut().push(log);
        Some(recorder.react(reaction.clone()).boxed())
    });

    (controller, logs)
}

/// Session level callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEv {
    Create,
    Destroy,
    Read(usize),
    Write(usize),
    Settings(Vec<Setting>),
    SettingsAck,
    OutgoingFull,
    OutgoingNotFull,
    IngressError(String),
    CodecChange(Protocol),
}

#[derive(Debug, Clone, Default)]
pub struct Recording(Rc<RefCell<Vec<SessionEv>>>);

impl Recording {
    pub fn events(&self) -> Vec<SessionEv> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, ev: &SessionEv) -> bool {
        self.0.borrow().iter().any(|e| e == ev)
    }
}

impl Observer for Recording {
    fn on_create(&mut self) {
        self.0.borrow_mut().push(SessionEv::Create);
    }

    fn on_destroy(&mut self) {
        self.0.borrow_mut().push(SessionEv::Destroy);
    }

    fn on_read(&mut self, bytes: usize) {
        self.0.borrow_mut().push(SessionEv::Read(bytes));
    }

    fn on_write(&mut self, bytes: usize) {
        self.0.borrow_mut().push(SessionEv::Write(bytes));
    }

    fn on_settings(&mut self, settings: &[Setting]) {
        self.0.borrow_mut().push(SessionEv::Settings(settings.to_vec()));
    }

    fn on_settings_ack(&mut self) {
        self.0.borrow_mut().push(SessionEv::SettingsAck);
    }

    fn on_outgoing_full(&mut self) {
        self.0.borrow_mut().push(SessionEv::OutgoingFull);
    }

    fn on_outgoing_not_full(&mut self) {
        self.0.borrow_mut().push(SessionEv::OutgoingNotFull);
    }

    fn on_ingress_error(&mut self, err: &CodecError) {
        self.0.borrow_mut().push(SessionEv::IngressError(err.to_string()));
    }

    fn on_codec_change(&mut self, protocol: Protocol) {
        self.0.borrow_mut().push(SessionEv::CodecChange(protocol));
    }
}

/// A reaction that sends `msg` and ends the message once the transaction
/// attaches.
pub fn send_on_attach(msg: Message) -> impl FnMut(&mut Transaction<'_>, &Ev) + Clone + 'static {
    move |txn: &mut Transaction<'_>, ev: &Ev| {
        if *ev == Ev::Attach {
            txn.send_headers_with_eom(msg.clone()).unwrap();
        }
    }
}

/// A reaction that answers with `status` and `body` once the request ended.
pub fn respond_on_eom(
    status: u16,
    body: &'static [u8],
) -> impl FnMut(&mut Transaction<'_>, &Ev) + Clone + 'static {
    move |txn: &mut Transaction<'_>, ev: &Ev| {
        if *ev != Ev::Eom {
            return;
        }
        let msg = crate::util::response(status);
        if body.is_empty() {
            txn.send_headers_with_eom(msg).unwrap();
        } else {
            txn.send_headers(msg).unwrap();
            txn.send_body(Bytes::from_static(body)).unwrap();
            txn.send_eom().unwrap();
        }
    }
}

// Re-export the crate under test
pub use hsession;

pub use hsession::codec::{self, Codec, Direction, Event, Protocol};
pub use hsession::{
    Category, Config, Error, ErrorKind, Handler, Message, Priority, PriorityTree, Reason,
    Session, Setting, StreamId, TimeoutKey, Transaction, UserError, DEFAULT_WEIGHT,
};

// Re-export support modules
pub use crate::fake::{Caps, Fake, FakeCodec, Generated};
pub use crate::frames;
pub use crate::handler::{
    respond_on_eom, send_on_attach, serve, ControllerFn, Ev, Log, Recorder, Recording, SessionEv,
};
pub use crate::harness::Harness;
pub use crate::peer::{self, Peer};
pub use crate::util::{self, get, header, post, response};

// Re-export macros
pub use crate::{assert_error, assert_event, assert_headers, assert_no_event, trace_init};

// Re-export useful crates
pub use bytes::{self, Bytes, BytesMut};
pub use http::{self, HeaderMap, Method, StatusCode, Version};
pub use tokio;

pub use std::time::Duration;

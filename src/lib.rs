//! A connection level HTTP session engine.
//!
//! A [`Session`] multiplexes HTTP transactions over one transport, using a
//! pluggable [`Codec`](codec::Codec) for the wire protocol. HTTP/1.x runs one
//! exchange at a time; HTTP/2 runs many in parallel with flow control,
//! priorities and server push. The same session API covers both.
//!
//! The session is sans-io. It writes through a [`Transport`], arms timeouts
//! on a [`Timer`] and is told about reads, write completions and expired
//! timers by its owner. [`driver::Connection`] does this over any tokio
//! `AsyncRead + AsyncWrite`.
//!
//! Each transaction is served by a [`Handler`]. Clients open transactions
//! with [`Session::new_transaction`]; servers install a [`Controller`] that
//! returns a handler for every incoming request. Callbacks are queued and
//! delivered one at a time, so a handler may call back into the session
//! from any callback, including tearing the whole connection down.
//!
//! # Example
//!
//! ```no_run
//! use hsession::codec::{self, Direction};
//! use hsession::driver::Connection;
//! use hsession::{Config, Handler, Message, Transaction};
//! use http::Method;
//! use tokio::net::TcpStream;
//!
//! struct Get;
//!
//! impl Handler for Get {
//!     fn on_attach(&mut self, mut txn: Transaction<'_>) {
//!         let req = Message::request(Method::GET, "http://example.com/".parse().unwrap());
//!         txn.send_headers_with_eom(req).unwrap();
//!     }
//!
//!     fn on_headers(&mut self, _txn: Transaction<'_>, msg: Message) {
//!         println!("status: {:?}", msg.status());
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::io::Result<()> {
//!     let tcp = TcpStream::connect("example.com:80").await?;
//!     let codec = codec::for_protocol("http/1.1", Direction::Upstream).unwrap();
//!
//!     let mut conn = Connection::new(tcp, codec, Config::default());
//!     conn.session().new_transaction(Box::new(Get)).unwrap();
//!     conn.session().drain();
//!     conn.run().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hsession/0.1.0")]

mod tracing;

#[cfg(feature = "unstable")]
pub mod frame;

#[cfg(not(feature = "unstable"))]
mod frame;

mod hpack;

pub mod codec;
pub mod driver;

mod config;
mod error;
mod handler;
mod message;
mod proto;
mod transport;

pub use crate::config::{defaults, Config};
pub use crate::error::{Category, Error, ErrorKind, UserError};
pub use crate::frame::{Reason, Setting, StreamId};
pub use crate::handler::{Controller, Handler, Observer};
pub use crate::message::{Head, Message};
pub use crate::proto::{Priority, PriorityTree, Session, Transaction, DEFAULT_WEIGHT};
pub use crate::transport::{TimeoutKey, Timer, Transport};

use hsession::codec::{self, Direction};
use hsession::driver::Connection;
use hsession::{Config, Controller, Error, Handler, Message, Transaction};

use bytes::Bytes;
use http::StatusCode;
use tokio::net::TcpListener;
use tokio::task::LocalSet;

use std::env;

struct Hello;

impl Hello {
    fn respond(txn: &mut Transaction<'_>) -> Result<(), Error> {
        txn.send_headers(Message::response(StatusCode::OK))?;
        txn.send_body(Bytes::from_static(b"hello world"))?;
        txn.send_eom()
    }
}

impl Handler for Hello {
    fn on_headers(&mut self, _txn: Transaction<'_>, msg: Message) {
        println!("GOT request: {:?}", msg);
    }

    fn on_eom(&mut self, mut txn: Transaction<'_>) {
        if let Err(e) = Hello::respond(&mut txn) {
            println!("  -> err={}", e);
        }
    }

    fn on_error(&mut self, _txn: Transaction<'_>, err: &Error) {
        println!("  -> err={}", err);
    }
}

struct Routes;

impl Controller for Routes {
    fn handler_for(&mut self, _request: &Message) -> Option<Box<dyn Handler>> {
        Some(Box::new(Hello))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let _ = env_logger::try_init();

    // `h2` for prior knowledge HTTP/2, anything else serves HTTP/1.1.
    // HPACK has no Huffman decoder, so h2 clients must send raw literals
    // (the bundled client does; curl and browsers do not).
    let protocol = env::args().nth(1).unwrap_or_else(|| "http/1.1".into());

    let listener = TcpListener::bind("127.0.0.1:5928").await?;
    println!("listening on {:?}", listener.local_addr());

    let local = LocalSet::new();
    local
        .run_until(async move {
            loop {
                let (socket, peer) = listener.accept().await?;
                let codec = match codec::for_protocol(&protocol, Direction::Downstream) {
                    Some(codec) => codec,
                    None => {
                        eprintln!("unknown protocol {:?}", protocol);
                        return Ok(());
                    }
                };

                let mut conn = Connection::new(socket, codec, Config::default());
                conn.session().set_controller(Box::new(Routes));

                tokio::task::spawn_local(async move {
                    if let Err(e) = conn.run().await {
                        println!("  -> err={:?}", e);
                    }
                    println!("connection from {} closed", peer);
                });
            }
        })
        .await
}

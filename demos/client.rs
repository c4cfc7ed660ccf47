use hsession::codec::{self, Direction};
use hsession::driver::Connection;
use hsession::{Config, Error, Handler, Message, Transaction};

use bytes::Bytes;
use http::Method;
use tokio::net::TcpStream;

use std::env;

struct Get {
    uri: http::Uri,
}

impl Handler for Get {
    fn on_attach(&mut self, mut txn: Transaction<'_>) {
        let req = Message::request(Method::GET, self.uri.clone());
        if let Err(e) = txn.send_headers_with_eom(req) {
            println!("  -> err={}", e);
        }
    }

    fn on_headers(&mut self, _txn: Transaction<'_>, msg: Message) {
        println!("GOT response: {:?}", msg);
    }

    fn on_body(&mut self, _txn: Transaction<'_>, chunk: Bytes) {
        println!("GOT chunk = {:?}", chunk);
    }

    fn on_error(&mut self, _txn: Transaction<'_>, err: &Error) {
        println!("  -> err={}", err);
    }

    fn on_detach(&mut self, mut txn: Transaction<'_>) {
        // one request per run
        txn.session().drain();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let _ = env_logger::try_init();

    // with `h2` the server must not Huffman-code its headers, so point it at
    // the bundled server rather than a general purpose one
    let protocol = env::args().nth(1).unwrap_or_else(|| "http/1.1".into());
    let codec = match codec::for_protocol(&protocol, Direction::Upstream) {
        Some(codec) => codec,
        None => {
            eprintln!("unknown protocol {:?}", protocol);
            return Ok(());
        }
    };

    let tcp = TcpStream::connect("127.0.0.1:5928").await?;
    let mut conn = Connection::new(tcp, codec, Config::default());

    let uri = http::Uri::from_static("http://127.0.0.1:5928/");
    if let Err(e) = conn.session().new_transaction(Box::new(Get { uri })) {
        println!("  -> err={}", e);
        return Ok(());
    }

    conn.run().await
}

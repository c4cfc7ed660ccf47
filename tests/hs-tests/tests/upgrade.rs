use hs_support::prelude::*;

fn upgrade_request(tokens: &'static str) -> Message {
    header(get("http://example.com/"), "upgrade", tokens)
}

fn switching(protocol: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: {}\r\n\r\n",
        protocol
    )
    .into_bytes()
}

#[test]
fn native_upgrade_switches_to_h2() {
    hs_support::trace_init!();

    let mut h = Harness::h1(Direction::Upstream);
    let observer = Recording::default();
    h.session.set_observer(Box::new(observer.clone()));

    let (handler, log) = Recorder::new();
    let handler = handler.react(send_on_attach(upgrade_request("blarf, h2c")));
    let id = h.session.new_transaction(handler.boxed()).unwrap();
    h.run();

    let request = h.take_written();
    assert!(request.starts_with(b"GET / HTTP/1.1\r\n"));
    assert!(request
        .windows(b"upgrade: blarf, h2c".len())
        .any(|w| w == b"upgrade: blarf, h2c"));

    // the switch response and the first HTTP/2 frames in one read
    let mut peer = Peer::new("h2c", Direction::Upstream);
    let mut read = switching("h2c");
    read.extend_from_slice(&peer.handshake());
    read.extend_from_slice(&peer.headers(id, &response(200), false));
    read.extend_from_slice(&peer.body(id, b"hello", true));
    h.read(&read);

    let events = log.events();
    assert_eq!(events.len(), 5, "{:?}", events);
    assert_eq!(events[0], Ev::Attach);
    let msg = assert_headers!(events[1].clone());
    assert_eq!(msg.status(), Some(StatusCode::OK));
    assert_eq!(msg.version(), Version::HTTP_2);
    assert_eq!(events[2], Ev::Body(Bytes::from_static(b"hello")));
    assert_eq!(events[3], Ev::Eom);
    assert_eq!(events[4], Ev::Detach);

    assert_eq!(h.session.protocol(), Protocol::Http2);
    assert!(observer.contains(&SessionEv::CodecChange(Protocol::Http2)));

    // the client preface follows the switch
    let written = h.take_written();
    assert!(written.starts_with(frames::PREFACE));
    let frames = peer.recv(&written);
    assert_event!(frames, Event::Settings(_));
    assert_event!(frames, Event::SettingsAck);

    // stream 1 was used by the upgrade
    assert!(h.session.is_reusable());
    let (handler, _log) = Recorder::new();
    let next = h.session.new_transaction(handler.boxed()).unwrap();
    assert_eq!(next, StreamId::from(3));
}

#[test]
fn upgrade_builds_the_priority_tree() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.priority_tree(Some(PriorityTree::new(1).level(0, 18)));
    let mut h = Harness::with_protocol("http/1.1", Direction::Upstream, config);

    let (handler, _log) = Recorder::new();
    let handler = handler.react(send_on_attach(upgrade_request("h2c")));
    h.session.new_transaction(handler.boxed()).unwrap();
    h.run();
    h.take_written();

    // HTTP/1.1 has nowhere to put the nodes
    assert_eq!(h.session.get_priority(0), None);

    let mut peer = Peer::new("h2c", Direction::Upstream);
    let mut read = switching("h2c");
    read.extend_from_slice(&peer.handshake());
    h.read(&read);

    let frames = peer.recv(&h.take_written());
    let nodes: Vec<_> = frames
        .iter()
        .filter_map(|ev| match *ev {
            Event::Priority { id, .. } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(nodes, vec![StreamId::from(3), StreamId::from(5)]);
    assert_eq!(
        h.session.get_priority(0),
        Some(Priority::new(StreamId::from(3), false, 18))
    );

    let next = h.session.new_transaction(Recorder::new().0.boxed()).unwrap();
    assert_eq!(next, StreamId::from(7));
}

#[test]
fn foreign_protocol_is_passed_through() {
    hs_support::trace_init!();

    let mut h = Harness::h1(Direction::Upstream);
    let (handler, log) = Recorder::new();
    h.session
        .new_transaction(handler.react(send_on_attach(upgrade_request("blarf"))).boxed())
        .unwrap();
    h.run();

    let mut read = switching("blarf");
    read.extend_from_slice(b"opaque bytes");
    h.read(&read);

    let events = log.events();
    assert_eq!(events[0], Ev::Attach);
    let msg = assert_headers!(events[1].clone());
    assert_eq!(msg.status(), Some(StatusCode::SWITCHING_PROTOCOLS));
    assert_eq!(events[2], Ev::Upgrade("blarf".into()));
    assert_eq!(events[3], Ev::Body(Bytes::from_static(b"opaque bytes")));
    assert_eq!(log.len(), 4);
    assert_eq!(h.session.protocol(), Protocol::Http1);

    // the upgraded stream ends with the connection
    h.eof();
    let events = log.events();
    assert_eq!(events[4], Ev::Eom);
    assert_eq!(events[5], Ev::Detach);
    assert!(log.errors().is_empty());
    assert!(h.session.is_destroyed());
}

#[test]
fn unrequested_protocol_is_a_bad_upgrade() {
    hs_support::trace_init!();

    let mut h = Harness::h1(Direction::Upstream);
    let (handler, log) = Recorder::new();
    h.session
        .new_transaction(handler.react(send_on_attach(upgrade_request("blarf, h2c"))).boxed())
        .unwrap();
    h.run();

    h.read(&switching("websocket"));

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::BadUpgrade);
    assert_eq!(errors[0].category(), Category::Policy);
    assert!(log.is_detached());
    assert!(h.session.is_destroyed());
}

#[test]
fn switch_without_a_request_is_a_bad_upgrade() {
    hs_support::trace_init!();

    let mut h = Harness::h1(Direction::Upstream);
    let (handler, log) = Recorder::new();
    h.session
        .new_transaction(handler.react(send_on_attach(get("http://example.com/"))).boxed())
        .unwrap();
    h.run();

    h.read(&switching("h2c"));

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::BadUpgrade);
    assert!(errors[0].detail().is_some());
    assert!(h.session.is_destroyed());
}

#[test]
fn declined_upgrade_keeps_http1() {
    hs_support::trace_init!();

    let mut h = Harness::h1(Direction::Upstream);
    let (handler, log) = Recorder::new();
    h.session
        .new_transaction(handler.react(send_on_attach(upgrade_request("h2c"))).boxed())
        .unwrap();
    h.run();

    h.read(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok");

    assert_eq!(log.body(), b"ok");
    assert!(log.is_detached());
    assert_eq!(h.session.protocol(), Protocol::Http1);
    assert!(h.session.is_reusable());
}

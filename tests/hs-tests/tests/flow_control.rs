use hs_support::prelude::*;

const MAX_WINDOW_SIZE: u32 = (1 << 31) - 1;

/// A client session whose peer announced `settings`.
fn connect(settings: &[Setting]) -> (Harness, Peer) {
    let mut h = Harness::h2(Direction::Upstream);
    let mut peer = Peer::h2_server();

    h.run();
    peer.recv(&h.take_written());
    h.read(&frames::settings(settings));
    peer.recv(&h.take_written());

    (h, peer)
}

/// Opens a stream that sends `body` as its request body.
fn upload(h: &mut Harness, body: &'static [u8]) -> (StreamId, Log) {
    let (handler, log) = Recorder::new();
    let handler = handler.react(move |txn, ev| {
        if *ev == Ev::Attach {
            txn.send_headers(post("https://example.com/upload")).unwrap();
            txn.send_body(Bytes::from_static(body)).unwrap();
            txn.send_eom().unwrap();
        }
    });
    let id = h.session.new_transaction(handler.boxed()).unwrap();
    h.run();
    (id, log)
}

/// Opens a GET stream and delivers the response head.
fn download(h: &mut Harness, peer: &mut Peer) -> (StreamId, Log) {
    let (handler, log) = Recorder::new();
    let handler = handler.react(send_on_attach(get("https://example.com/")));
    let id = h.session.new_transaction(handler.boxed()).unwrap();
    h.run();
    peer.recv(&h.take_written());

    h.read(&peer.headers(id, &response(200), false));
    (id, log)
}

fn body_lens(frames: &[Event]) -> Vec<usize> {
    frames
        .iter()
        .filter_map(|ev| match *ev {
            Event::Body { ref chunk, .. } => Some(chunk.len()),
            _ => None,
        })
        .collect()
}

fn window_updates(frames: &[Event]) -> Vec<(StreamId, u32)> {
    frames
        .iter()
        .filter_map(|ev| match *ev {
            Event::WindowUpdate { id, increment } => Some((id, increment)),
            _ => None,
        })
        .collect()
}

#[test]
fn send_waits_for_stream_window() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[Setting::InitialWindowSize(10)]);
    let (id, _log) = upload(&mut h, &[b'x'; 25]);

    let frames = peer.recv(&h.take_written());
    assert_eq!(body_lens(&frames), vec![10]);
    assert_eq!(h.session.transaction(id).unwrap().send_window(), Some(0));

    h.read(&frames::window_update(id.into(), 10));
    let frames = peer.recv(&h.take_written());
    assert_eq!(body_lens(&frames), vec![10]);
    assert_no_event!(frames, Event::MessageComplete { .. });

    h.read(&frames::window_update(id.into(), 10));
    let frames = peer.recv(&h.take_written());
    assert_eq!(body_lens(&frames), vec![5]);
    assert_event!(frames, Event::MessageComplete { .. });

    assert_eq!(h.session.transaction(id).unwrap().send_window(), Some(5));
}

#[test]
fn send_waits_for_connection_window() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (one, _) = upload(&mut h, &[b'a'; 40_000]);
    let (three, _) = upload(&mut h, &[b'b'; 40_000]);

    // the older stream went out whole
    let frames = peer.recv(&h.take_written());
    assert_event!(
        peer::on_stream(&frames, one),
        Event::MessageComplete { .. }
    );
    let sent: usize = body_lens(&frames).iter().sum();
    assert_eq!(sent, 65_535);
    assert_eq!(h.session.send_window(), Some(0));

    // stream credit alone is not enough
    h.read(&frames::window_update(three.into(), 10_000));
    assert!(peer.recv(&h.take_written()).is_empty());

    h.read(&frames::window_update(0, 20_000));
    let frames = peer.recv(&h.take_written());
    let sent: usize = body_lens(&frames).iter().sum();
    assert_eq!(sent, 14_465);
    assert!(peer::on_stream(&frames, one).is_empty());
    assert_event!(
        peer::on_stream(&frames, three),
        Event::MessageComplete { .. }
    );
}

#[test]
fn initial_window_change_applies_to_open_streams() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[Setting::InitialWindowSize(0)]);
    let (id, _log) = upload(&mut h, &[b'x'; 25]);

    let frames = peer.recv(&h.take_written());
    assert!(body_lens(&frames).is_empty());

    h.read(&frames::settings(&[Setting::InitialWindowSize(25)]));
    let frames = peer.recv(&h.take_written());
    assert_event!(frames, Event::SettingsAck);
    assert_eq!(body_lens(&frames), vec![25]);
    assert_eq!(h.session.transaction(id).unwrap().send_window(), Some(0));
}

#[test]
fn credit_returns_after_half_the_window() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, log) = download(&mut h, &mut peer);
    let chunk = [0u8; 16_384];
    let raw: u32 = id.into();

    h.read(&frames::data(raw, &chunk, false));
    assert!(window_updates(&peer.recv(&h.take_written())).is_empty());

    h.read(&frames::data(raw, &chunk, false));
    let updates = window_updates(&peer.recv(&h.take_written()));
    assert_eq!(updates, vec![(StreamId::zero(), 32_768), (id, 32_768)]);

    h.read(&frames::data(raw, &chunk, false));
    assert!(window_updates(&peer.recv(&h.take_written())).is_empty());

    // the stream ended, so only the connection gets its credit back
    h.read(&frames::data(raw, &chunk, true));
    let updates = window_updates(&peer.recv(&h.take_written()));
    assert_eq!(updates, vec![(StreamId::zero(), 32_768)]);

    assert_eq!(log.body().len(), 4 * 16_384);
    assert!(log.is_detached());
}

#[test]
fn configured_threshold_in_bytes() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.window_update_threshold(Some(1_000));

    let mut h = Harness::with_protocol("h2", Direction::Upstream, config);
    let mut peer = Peer::h2_server();
    h.run();
    peer.recv(&h.take_written());

    let (id, _log) = download(&mut h, &mut peer);
    h.read(&frames::data(id.into(), &[0u8; 999], false));
    assert!(window_updates(&peer.recv(&h.take_written())).is_empty());

    h.read(&frames::data(id.into(), &[0u8; 1], false));
    let updates = window_updates(&peer.recv(&h.take_written()));
    assert_eq!(updates, vec![(StreamId::zero(), 1_000), (id, 1_000)]);
}

#[test]
fn paused_ingress_holds_back_credit() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, log) = download(&mut h, &mut peer);
    h.session.transaction(id).unwrap().pause_ingress().unwrap();

    let chunk = [0u8; 16_384];
    h.read(&frames::data(id.into(), &chunk, false));
    h.read(&frames::data(id.into(), &chunk, false));
    assert!(window_updates(&peer.recv(&h.take_written())).is_empty());
    assert!(log.body().is_empty());

    h.session.transaction(id).unwrap().resume_ingress().unwrap();
    h.run();
    assert_eq!(log.body().len(), 32_768);
    let updates = window_updates(&peer.recv(&h.take_written()));
    assert_eq!(updates.len(), 2);
}

#[test]
fn draining_session_grants_no_credit() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, log) = download(&mut h, &mut peer);

    h.session.drain();
    h.run();
    let frames = peer.recv(&h.take_written());
    assert_event!(frames, Event::GoAway { .. });

    let chunk = [0u8; 16_384];
    h.read(&frames::data(id.into(), &chunk, false));
    h.read(&frames::data(id.into(), &chunk, false));
    assert_eq!(log.body().len(), 32_768);

    let frames = peer.recv(&h.take_written());
    assert!(window_updates(&frames).is_empty(), "{:?}", frames);
}

#[test]
fn connection_window_violation_is_fatal() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, log) = download(&mut h, &mut peer);

    let mut read = Vec::new();
    for _ in 0..5 {
        read.extend_from_slice(&frames::data(id.into(), &[0u8; 16_384], false));
    }
    h.read(&read);

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::FlowControl);
    assert!(log.is_detached());

    let frames = peer.recv(&h.take_written());
    assert_event!(
        frames,
        Event::GoAway {
            reason: Reason::FLOW_CONTROL_ERROR,
            ..
        }
    );
    assert!(h.session.is_destroyed());
}

#[test]
fn stream_window_overflow_resets_the_stream() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, log) = download(&mut h, &mut peer);

    h.read(&frames::window_update(id.into(), MAX_WINDOW_SIZE));

    let err = assert_error!(log.events()[2].clone(), ErrorKind::FlowControl);
    assert_eq!(err.reason(), Some(Reason::FLOW_CONTROL_ERROR));
    assert!(log.is_detached());

    let frames = peer.recv(&h.take_written());
    assert_eq!(
        frames,
        vec![Event::Abort {
            id,
            reason: Reason::FLOW_CONTROL_ERROR
        }]
    );
    assert!(!h.session.is_closed());
}

#[test]
fn connection_window_overflow_is_fatal() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (_, log) = download(&mut h, &mut peer);

    h.read(&frames::window_update(0, MAX_WINDOW_SIZE));

    assert_eq!(log.errors()[0].kind(), ErrorKind::FlowControl);
    let frames = peer.recv(&h.take_written());
    assert_event!(
        frames,
        Event::GoAway {
            reason: Reason::FLOW_CONTROL_ERROR,
            ..
        }
    );
    assert!(h.session.is_destroyed());
}

#[test]
fn growing_the_receive_window() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, _log) = download(&mut h, &mut peer);

    h.session
        .transaction(id)
        .unwrap()
        .set_receive_window(100_000)
        .unwrap();
    h.run();

    let updates = window_updates(&peer.recv(&h.take_written()));
    assert_eq!(updates, vec![(id, 100_000 - 65_535)]);
    assert_eq!(
        h.session.transaction(id).unwrap().recv_window(),
        Some(100_000)
    );

    // shrinking is not possible
    h.session
        .transaction(id)
        .unwrap()
        .set_receive_window(10)
        .unwrap();
    h.run();
    assert!(h.take_written().is_empty());
}

#[test]
fn raising_the_default_windows() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    h.session.set_flow_control(100_000, 200_000);
    h.run();

    let frames = peer.recv(&h.take_written());
    match frames.iter().find(|ev| matches!(ev, Event::Settings(_))) {
        Some(Event::Settings(settings)) => {
            assert!(settings.contains(&Setting::InitialWindowSize(100_000)))
        }
        other => panic!("expected settings; actual={:?}", other),
    }
    assert_eq!(
        window_updates(&frames),
        vec![(StreamId::zero(), 200_000 - 65_535)]
    );

    // streams opened afterwards start with the larger window
    let (id, _log) = download(&mut h, &mut peer);
    assert_eq!(
        h.session.transaction(id).unwrap().recv_window(),
        Some(100_000)
    );
}

#[test]
fn reset_while_paused_drops_the_held_body() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, log) = download(&mut h, &mut peer);
    h.session.transaction(id).unwrap().pause_ingress().unwrap();

    let chunk = [0u8; 16_384];
    h.read(&frames::data(id.into(), &chunk, false));
    h.read(&frames::data(id.into(), &chunk, false));
    assert!(window_updates(&peer.recv(&h.take_written())).is_empty());

    h.read(&frames::reset(id.into(), Reason::CANCEL));

    assert!(log.body().is_empty());
    assert_error!(log.events()[2].clone(), ErrorKind::StreamAbort);
    assert!(log.is_detached());

    // the connection gets the dropped bytes back, the dead stream does not
    let updates = window_updates(&peer.recv(&h.take_written()));
    assert_eq!(updates, vec![(StreamId::zero(), 32_768)]);
}

#[test]
fn draining_session_keeps_its_windows() {
    hs_support::trace_init!();

    let (mut h, mut peer) = connect(&[]);
    let (id, _log) = download(&mut h, &mut peer);

    h.session.drain();
    h.run();
    let frames = peer.recv(&h.take_written());
    assert_event!(frames, Event::GoAway { .. });

    h.session.set_flow_control(1_000_000, 1_000_000);
    h.session
        .transaction(id)
        .unwrap()
        .set_receive_window(1_000_000)
        .unwrap();
    h.run();

    let frames = peer.recv(&h.take_written());
    assert_no_event!(frames, Event::Settings(_));
    assert!(window_updates(&frames).is_empty(), "{:?}", frames);
    assert_eq!(
        h.session.transaction(id).unwrap().recv_window(),
        Some(65_535)
    );
}

use hs_support::prelude::*;

fn parallel() -> (Harness, Fake) {
    Harness::fake(Caps::parallel(), Direction::Upstream, Config::default())
}

fn open(h: &mut Harness) -> (StreamId, Log) {
    let (handler, log) = Recorder::new();
    let handler = handler.react(send_on_attach(get("https://example.com/")));
    let id = h.session.new_transaction(handler.boxed()).unwrap();
    (id, log)
}

fn respond(fake: &Fake, id: StreamId) {
    fake.queue(Event::Headers {
        id,
        msg: response(200),
    });
    fake.queue(Event::MessageComplete { id, upgrade: false });
}

/// Opens a stream that sends headers and `len` body bytes, leaving the
/// message open.
fn upload(h: &mut Harness, len: usize) -> (StreamId, Log) {
    let (handler, log) = Recorder::new();
    let handler = handler.react(move |txn, ev| {
        if *ev == Ev::Attach {
            txn.send_headers(post("https://example.com/upload")).unwrap();
            txn.send_body(Bytes::from(vec![0; len])).unwrap();
        }
    });
    let id = h.session.new_transaction(handler.boxed()).unwrap();
    (id, log)
}

#[test]
fn drain_waits_for_live_transactions() {
    hs_support::trace_init!();

    let (mut h, fake) = parallel();
    let txns: Vec<_> = (0..3).map(|_| open(&mut h)).collect();
    h.run();

    h.session.drain();
    h.run();
    assert!(h.session.is_draining());
    assert!(!h.session.is_closed());
    assert!(fake.generated().contains(&Generated::Goaway {
        last: StreamId::zero(),
        reason: Reason::NO_ERROR
    }));

    let err = h.session.new_transaction(Recorder::new().0.boxed()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::User(UserError::Draining));

    for &(id, _) in &txns[..2] {
        respond(&fake, id);
    }
    h.read(b"x");
    assert!(!h.session.is_closed());

    respond(&fake, txns[2].0);
    h.read(b"x");

    for (_, log) in &txns {
        assert!(log.is_detached());
        assert!(log.errors().is_empty());
    }
    assert!(h.session.is_destroyed());
    assert!(h.is_closed());

    let err = h.session.new_transaction(Recorder::new().0.boxed()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::User(UserError::SessionClosed));
}

#[test]
fn write_error_fails_each_transaction_once() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.write_buffer_limit(64);
    let (mut h, _fake) = Harness::fake(Caps::parallel(), Direction::Upstream, config);

    let (_, log1) = upload(&mut h, 100);
    let (_, log2) = upload(&mut h, 100);
    h.flush();
    assert!(h.session.is_egress_paused());

    h.fail_write();

    for log in &[log1, log2] {
        assert_eq!(log.count(Ev::is_error), 1, "{:?}", log.events());
        assert_eq!(log.errors()[0].kind(), ErrorKind::Write);
        assert!(log.errors()[0].is_transport());
        assert!(log.is_detached());
    }
    assert!(h.session.is_destroyed());
    assert!(h.is_closed());
}

#[test]
fn drop_connection_from_a_callback() {
    hs_support::trace_init!();

    let mut h = Harness::h2(Direction::Upstream);
    let (bystander, log1) = open(&mut h);

    let (handler, log2) = Recorder::new();
    let handler = handler.react(|txn, ev| match *ev {
        Ev::Attach | Ev::Error(_) => txn.session().drop_connection(),
        _ => {}
    });
    h.session.new_transaction(handler.boxed()).unwrap();

    let events = log2.events();
    assert_eq!(events.len(), 3, "{:?}", events);
    assert_eq!(events[0], Ev::Attach);
    assert_error!(events[1].clone(), ErrorKind::Dropped);
    assert_eq!(events[2], Ev::Detach);

    let err = assert_error!(log1.events()[1].clone(), ErrorKind::Dropped);
    assert_eq!(err.stream_id(), Some(bystander));
    assert_eq!(log1.count(Ev::is_error), 1);
    assert!(log1.is_detached());

    assert!(h.session.is_destroyed());
    assert!(h.is_closed());
}

#[test]
fn detach_waits_for_written_bytes() {
    hs_support::trace_init!();

    let (mut h, fake) = parallel();
    let (id, log) = open(&mut h);
    h.flush();
    assert_eq!(h.io.borrow().outstanding(), 1);

    respond(&fake, id);
    h.session.on_read(b"x");
    assert_eq!(log.events().last(), Some(&Ev::Eom));
    assert!(!log.is_detached());

    h.complete_writes();
    assert!(log.is_detached());
}

#[test]
fn transaction_timeout_resets_the_stream() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.transaction_timeout(Some(Duration::from_secs(5)));
    let (mut h, fake) = Harness::fake(Caps::parallel(), Direction::Upstream, config);

    let (id, log) = open(&mut h);
    h.run();
    assert_eq!(
        h.io.borrow().timeout(TimeoutKey::Transaction(id)),
        Some(Duration::from_secs(5))
    );

    h.fire(TimeoutKey::Transaction(id));
    h.run();

    let err = assert_error!(log.events()[1].clone(), ErrorKind::Timeout);
    assert_eq!(err.stream_id(), Some(id));
    assert!(log.is_detached());
    assert!(fake.generated().contains(&Generated::Reset {
        id,
        reason: Reason::CANCEL
    }));
    assert!(!h.io.borrow().is_armed(TimeoutKey::Transaction(id)));
    assert!(!h.session.is_closed());
}

#[test]
fn idle_timeout_drains_an_empty_session() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.idle_timeout(Some(Duration::from_secs(30)));
    let (mut h, fake) = Harness::fake(Caps::parallel(), Direction::Upstream, config);
    h.run();
    assert!(h.io.borrow().is_armed(TimeoutKey::Idle));

    // a live transaction disarms it
    let (id, _log) = open(&mut h);
    h.run();
    assert!(!h.io.borrow().is_armed(TimeoutKey::Idle));

    respond(&fake, id);
    h.read(b"x");
    assert!(h.io.borrow().is_armed(TimeoutKey::Idle));

    h.fire(TimeoutKey::Idle);
    h.run();
    assert_event!(fake.generated(), Generated::Goaway { .. });
    assert!(h.session.is_destroyed());
}

#[test]
fn write_timeout_fails_the_connection() {
    hs_support::trace_init!();

    let (mut h, _fake) = parallel();
    let (_, log) = open(&mut h);
    h.flush();
    assert!(h.io.borrow().is_armed(TimeoutKey::Write));

    h.fire(TimeoutKey::Write);

    assert_eq!(log.errors()[0].kind(), ErrorKind::WriteTimeout);
    assert!(log.is_detached());
    assert!(h.session.is_destroyed());
}

#[test]
fn replay_safety_waiters() {
    hs_support::trace_init!();

    let (mut h, _fake) = parallel();
    h.io.borrow_mut().replay_safe = false;

    let (one, log1) = open(&mut h);
    let (two, log2) = open(&mut h);
    h.session
        .transaction(one)
        .unwrap()
        .add_replay_safety_waiter()
        .unwrap();
    {
        let mut txn = h.session.transaction(two).unwrap();
        txn.add_replay_safety_waiter().unwrap();
        txn.remove_replay_safety_waiter();
    }
    assert_eq!(log1.count(|ev| *ev == Ev::ReplaySafe), 0);

    h.io.borrow_mut().replay_safe = true;
    h.session.on_replay_safe();
    assert_eq!(log1.count(|ev| *ev == Ev::ReplaySafe), 1);
    assert_eq!(log2.count(|ev| *ev == Ev::ReplaySafe), 0);

    // once safe, a new waiter is told right away
    h.session
        .transaction(two)
        .unwrap()
        .add_replay_safety_waiter()
        .unwrap();
    assert_eq!(log2.count(|ev| *ev == Ev::ReplaySafe), 1);

    // no second notification for the first waiter
    h.session.on_replay_safe();
    assert_eq!(log1.count(|ev| *ev == Ev::ReplaySafe), 1);
}

#[test]
fn egress_pauses_over_the_buffer_limit() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.write_buffer_limit(64);
    let (mut h, _fake) = Harness::fake(Caps::parallel(), Direction::Upstream, config);

    let (one, log1) = upload(&mut h, 100);
    h.flush();
    assert!(h.session.is_egress_paused());
    assert_eq!(log1.events().last(), Some(&Ev::EgressPaused));
    assert!(h.session.transaction(one).unwrap().is_egress_paused());

    // a transaction opened while paused starts paused
    let (_, log2) = upload(&mut h, 1);
    assert_eq!(log2.events()[..2], [Ev::Attach, Ev::EgressPaused]);

    h.complete_writes();
    assert!(!h.session.is_egress_paused());
    assert_eq!(log1.count(|ev| *ev == Ev::EgressResumed), 1);
    assert_eq!(log2.count(|ev| *ev == Ev::EgressResumed), 1);
    assert!(!h.session.transaction(one).unwrap().is_egress_paused());
}

#[test]
fn paused_serial_ingress_stops_reads() {
    hs_support::trace_init!();

    let mut h = Harness::h1(Direction::Upstream);
    let (id, log) = open(&mut h);
    h.run();

    h.session.transaction(id).unwrap().pause_ingress().unwrap();
    assert!(h.io.borrow().reads_paused);

    h.read(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok");
    assert_eq!(log.len(), 1);

    h.session.transaction(id).unwrap().resume_ingress().unwrap();
    assert!(!h.io.borrow().reads_paused);
    assert_eq!(log.body(), b"ok");
    assert!(log.is_detached());
}

#[test]
fn eof_fails_open_streams() {
    hs_support::trace_init!();

    let (mut h, _fake) = parallel();
    let (_, log1) = open(&mut h);
    let (_, log3) = open(&mut h);
    h.run();

    h.eof();

    for log in &[log1, log3] {
        assert_eq!(log.errors().len(), 1);
        assert_eq!(log.errors()[0].kind(), ErrorKind::Eof);
        assert!(log.is_detached());
    }
    assert!(h.session.is_destroyed());
}

#[test]
fn outgoing_limit_is_observed() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.max_concurrent_outgoing_streams(2);
    let (mut h, fake) = Harness::fake(Caps::parallel(), Direction::Upstream, config);
    let observer = Recording::default();
    h.session.set_observer(Box::new(observer.clone()));

    let (one, _) = open(&mut h);
    assert!(h.session.supports_more_transactions());
    open(&mut h);
    assert!(!h.session.supports_more_transactions());
    assert!(observer.contains(&SessionEv::OutgoingFull));
    h.run();

    respond(&fake, one);
    h.read(b"x");
    assert_eq!(observer.events().iter().filter(|ev| **ev == SessionEv::OutgoingNotFull).count(), 1);
    assert_eq!(h.session.num_outgoing_streams(), 1);

    // the application may lower the limit at any time
    h.session.set_max_concurrent_outgoing_streams(1);
    assert!(!h.session.supports_more_transactions());
}

#[test]
fn virtual_priority_tree() {
    hs_support::trace_init!();

    let mut config = Config::default();
    config.priority_tree(Some(PriorityTree::new(1).level(0, 18).level(1, 2)));
    let (mut h, fake) = Harness::fake(Caps::parallel(), Direction::Upstream, config);

    let (id, _log) = open(&mut h);
    assert_eq!(id, StreamId::from(7));

    let nodes: Vec<_> = fake
        .generated()
        .into_iter()
        .filter(|g| matches!(g, Generated::Priority { .. }))
        .collect();
    assert_eq!(
        nodes,
        vec![
            Generated::Priority { id: StreamId::from(1) },
            Generated::Priority { id: StreamId::from(3) },
            Generated::Priority { id: StreamId::from(5) },
        ]
    );

    let root = StreamId::from(1);
    assert_eq!(h.session.get_priority(0), Some(Priority::new(root, false, 18)));
    assert_eq!(h.session.get_priority(9), Some(Priority::new(root, false, 2)));

    fake.take_generated();
    {
        let mut txn = h.session.transaction(id).unwrap();
        txn.update_and_send_priority_level(0).unwrap();
        assert_eq!(txn.priority(), Some(Priority::new(root, false, 18)));
        assert!(!txn.is_priority_fallback());
    }
    assert_eq!(fake.take_generated(), vec![Generated::Priority { id }]);
}

#[test]
fn priority_fallback_nodes() {
    hs_support::trace_init!();

    let (mut h, fake) = parallel();
    let (id, _log) = open(&mut h);
    assert_eq!(h.session.get_priority(0), None);
    fake.take_generated();

    let mut txn = h.session.transaction(id).unwrap();
    txn.update_and_send_priority_level(3).unwrap();
    assert!(txn.is_priority_fallback());
    let pri = txn.priority().unwrap();
    assert_eq!(pri.dependency, StreamId::from(3));
    assert_eq!(pri.weight, DEFAULT_WEIGHT);

    assert_eq!(
        fake.take_generated(),
        vec![
            Generated::Priority { id: StreamId::from(3) },
            Generated::Priority { id },
        ]
    );
}

#[test]
fn serial_codec_has_no_priority() {
    hs_support::trace_init!();

    let (mut h, fake) = Harness::fake(Caps::serial(), Direction::Upstream, Config::default());
    assert_eq!(h.session.send_priority(Priority::default()), None);

    let (id, _log) = open(&mut h);
    h.session
        .transaction(id)
        .unwrap()
        .update_and_send_priority_level(2)
        .unwrap();
    assert!(!fake
        .generated()
        .iter()
        .any(|g| matches!(g, Generated::Priority { .. })));
}

#[test]
fn codec_events_can_be_injected() {
    hs_support::trace_init!();

    let (mut h, _fake) = parallel();
    let (id, log) = open(&mut h);
    h.run();

    h.session.on_codec_event(Event::Headers {
        id,
        msg: response(204),
    });
    h.session.on_codec_event(Event::MessageComplete { id, upgrade: false });

    let msg = assert_headers!(log.events()[1].clone());
    assert_eq!(msg.status(), Some(StatusCode::NO_CONTENT));
    assert!(log.is_detached());
}

#[test]
fn ingress_out_of_order_is_a_state_error() {
    hs_support::trace_init!();

    let (mut h, fake) = parallel();
    let (id, log) = open(&mut h);
    h.run();

    fake.queue(Event::Body {
        id,
        chunk: Bytes::from_static(b"early"),
        padding: 0,
    });
    h.read(b"x");

    let err = assert_error!(log.events()[1].clone(), ErrorKind::IngressState);
    let detail = err.detail().unwrap_or("");
    assert!(detail.contains("Start"), "{}", detail);
    assert!(detail.contains("onBody"), "{}", detail);
    assert!(fake.generated().contains(&Generated::Reset {
        id,
        reason: Reason::PROTOCOL_ERROR
    }));
}

#[test]
fn second_headers_after_body_is_a_state_error() {
    hs_support::trace_init!();

    let (mut h, fake) = parallel();
    let (id, log) = open(&mut h);
    h.run();

    fake.queue(Event::Headers {
        id,
        msg: response(200),
    });
    fake.queue(Event::Body {
        id,
        chunk: Bytes::from_static(&[b'x'; 20]),
        padding: 0,
    });
    fake.queue(Event::Headers {
        id,
        msg: response(200),
    });
    h.read(b"x");

    // what was accepted before the bad event still arrives, in order
    let events = log.events();
    assert_eq!(events.len(), 5, "{:?}", events);
    let msg = assert_headers!(events[1].clone());
    assert_eq!(msg.status(), Some(StatusCode::OK));
    assert_eq!(events[2], Ev::Body(Bytes::from_static(&[b'x'; 20])));
    let err = assert_error!(events[3].clone(), ErrorKind::IngressState);
    assert_eq!(err.detail(), Some("state=RegularBodyReceived, event=onHeaders"));
    assert_eq!(events[4], Ev::Detach);

    assert!(fake.generated().contains(&Generated::Reset {
        id,
        reason: Reason::PROTOCOL_ERROR
    }));
}

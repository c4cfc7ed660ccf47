#[macro_export]
macro_rules! assert_headers {
    ($ev:expr) => {{
        match $ev {
            $crate::handler::Ev::Headers(msg) => msg,
            ev => panic!("expected headers; actual={:?}", ev),
        }
    }};
}

#[macro_export]
macro_rules! assert_error {
    ($ev:expr, $kind:pat) => {{
        match $ev {
            $crate::handler::Ev::Error(err) => {
                assert!(
                    matches!(err.kind(), $kind),
                    "unexpected error kind; actual={:?}",
                    err
                );
                err
            }
            ev => panic!("expected error; actual={:?}", ev),
        }
    }};
}

#[macro_export]
macro_rules! assert_event {
    ($events:expr, $pat:pat) => {{
        assert!(
            $events.iter().any(|ev| matches!(ev, $pat)),
            "no event matching {}; events={:?}",
            stringify!($pat),
            $events
        );
    }};
}

#[macro_export]
macro_rules! assert_no_event {
    ($events:expr, $pat:pat) => {{
        assert!(
            !$events.iter().any(|ev| matches!(ev, $pat)),
            "unexpected event matching {}; events={:?}",
            stringify!($pat),
            $events
        );
    }};
}

#[macro_export]
macro_rules! trace_init {
    () => {
        let _guard = $crate::trace::init();
    };
}

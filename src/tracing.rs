//! Logging macros that compile to nothing without the `tracing` feature.

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)+);
    }};
}

pub(crate) use debug;

macro_rules! trace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)+);
    }};
}

pub(crate) use trace;

use crate::proto::PriorityTree;

use std::time::Duration;

/// Fallback values used by [`Config::default`].
///
/// These are plain constants; nothing in the crate reads process wide
/// mutable state.
pub mod defaults {
    use std::time::Duration;

    /// Bytes buffered for the transport before egress pauses.
    pub const WRITE_BUFFER_LIMIT: usize = 65_536;

    /// Unparsed ingress bytes buffered before reads pause.
    pub const READ_BUFFER_LIMIT: usize = 65_536;

    /// The HTTP/2 default stream window.
    pub const INITIAL_WINDOW_SIZE: u32 = 65_535;

    /// The HTTP/2 default connection window.
    pub const SESSION_WINDOW_SIZE: u32 = 65_535;

    pub const MAX_CONCURRENT_OUTGOING_STREAMS: u32 = 100;

    pub const MAX_CONCURRENT_INCOMING_STREAMS: u32 = 100;

    pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);

    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Session configuration.
///
/// Methods chain on `&mut Self`:
///
/// ```
/// use hsession::Config;
/// use std::time::Duration;
///
/// let mut config = Config::default();
/// config
///     .write_buffer_limit(16 * 1024)
///     .initial_stream_window(1 << 20)
///     .transaction_timeout(Some(Duration::from_secs(5)));
/// assert_eq!(config.get_write_buffer_limit(), 16 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) write_buffer_limit: usize,
    pub(crate) read_buffer_limit: usize,
    pub(crate) window_update_threshold: Option<u32>,
    pub(crate) initial_stream_window: u32,
    pub(crate) session_window: u32,
    pub(crate) max_concurrent_outgoing: u32,
    pub(crate) max_concurrent_incoming: u32,
    pub(crate) transaction_timeout: Option<Duration>,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) enable_push: bool,
    pub(crate) priority_tree: Option<PriorityTree>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Egress pauses once this many bytes are buffered or in flight.
    pub fn write_buffer_limit(&mut self, limit: usize) -> &mut Self {
        self.write_buffer_limit = limit;
        self
    }

    /// Reads pause once this many unparsed bytes are buffered.
    pub fn read_buffer_limit(&mut self, limit: usize) -> &mut Self {
        self.read_buffer_limit = limit;
        self
    }

    /// Released receive credit is announced once it reaches `threshold`
    /// bytes. Unset, the threshold is half the window.
    pub fn window_update_threshold(&mut self, threshold: Option<u32>) -> &mut Self {
        self.window_update_threshold = threshold;
        self
    }

    /// The receive window of each new stream.
    pub fn initial_stream_window(&mut self, size: u32) -> &mut Self {
        self.initial_stream_window = size;
        self
    }

    /// The connection receive window.
    pub fn session_window(&mut self, size: u32) -> &mut Self {
        self.session_window = size;
        self
    }

    pub fn max_concurrent_outgoing_streams(&mut self, max: u32) -> &mut Self {
        self.max_concurrent_outgoing = max;
        self
    }

    pub fn max_concurrent_incoming_streams(&mut self, max: u32) -> &mut Self {
        self.max_concurrent_incoming = max;
        self
    }

    /// Per transaction idle timeout. `None` disables it.
    pub fn transaction_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.transaction_timeout = timeout;
        self
    }

    /// How long a session with no live transactions stays open.
    pub fn idle_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.idle_timeout = timeout;
        self
    }

    /// How long a transport write may stay outstanding.
    pub fn write_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.write_timeout = timeout;
        self
    }

    /// Whether the peer may push (clients) or whether push is offered
    /// (servers).
    pub fn enable_push(&mut self, enabled: bool) -> &mut Self {
        self.enable_push = enabled;
        self
    }

    /// Virtual priority nodes to build when the session starts.
    pub fn priority_tree(&mut self, tree: Option<PriorityTree>) -> &mut Self {
        self.priority_tree = tree;
        self
    }

    pub fn get_write_buffer_limit(&self) -> usize {
        self.write_buffer_limit
    }

    pub fn get_initial_stream_window(&self) -> u32 {
        self.initial_stream_window
    }

    pub fn get_session_window(&self) -> u32 {
        self.session_window
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            write_buffer_limit: defaults::WRITE_BUFFER_LIMIT,
            read_buffer_limit: defaults::READ_BUFFER_LIMIT,
            window_update_threshold: None,
            initial_stream_window: defaults::INITIAL_WINDOW_SIZE,
            session_window: defaults::SESSION_WINDOW_SIZE,
            max_concurrent_outgoing: defaults::MAX_CONCURRENT_OUTGOING_STREAMS,
            max_concurrent_incoming: defaults::MAX_CONCURRENT_INCOMING_STREAMS,
            transaction_timeout: Some(defaults::TRANSACTION_TIMEOUT),
            idle_timeout: Some(defaults::IDLE_TIMEOUT),
            write_timeout: Some(defaults::WRITE_TIMEOUT),
            enable_push: false,
            priority_tree: None,
        }
    }
}

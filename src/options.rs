//! Connection configuration.

use std::time::Duration;

/// Default cap on a single incoming frame payload: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;
/// Default cap on a reassembled message: 64 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 20;
/// Outgoing messages larger than this are split into continuation frames.
pub const DEFAULT_FRAGMENT_SIZE: usize = 1 << 20;
/// Upper bound on the HTTP head exchanged during the handshake.
pub const DEFAULT_MAX_HANDSHAKE_SIZE: usize = 8192;

/// Configuration options for a WebSocket connection.
///
/// ```rust
/// use std::time::Duration;
/// use probe_websocket::Options;
///
/// let options = Options::default()
///     .with_max_message_size(Some(1024 * 1024))
///     .with_ping_timeout(Duration::from_secs(5))
///     .with_protocol("chat");
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Largest payload accepted in one incoming frame.
    pub max_frame_size: usize,
    /// Largest reassembled message. `None` disables the check.
    pub max_message_size: Option<usize>,
    /// Payload size above which `send` fragments a message.
    pub fragment_size: usize,
    /// How long a ping waits for its pong.
    pub ping_timeout: Duration,
    /// Grace period for the peer's close frame once we have sent ours.
    pub close_timeout: Duration,
    /// Largest HTTP head accepted during the handshake.
    pub max_handshake_size: usize,
    /// Events buffered between the reader task and `receive`.
    pub event_buffer: usize,
    /// Subprotocols offered (client) or supported (server), in preference order.
    pub protocols: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            ping_timeout: Duration::from_secs(20),
            close_timeout: Duration::from_secs(5),
            max_handshake_size: DEFAULT_MAX_HANDSHAKE_SIZE,
            event_buffer: 64,
            protocols: Vec::new(),
        }
    }
}

impl Options {
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    #[must_use]
    pub fn with_max_message_size(mut self, size: Option<usize>) -> Self {
        self.max_message_size = size;
        self
    }

    /// Fragment outgoing messages larger than `size` bytes. Zero is treated as one.
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }
}

//! Error types for the probe-websocket crate.

use thiserror::Error;

use crate::close::CloseCode;
use crate::codec::Opcode;
use crate::connection::ConnectionState;

/// Errors raised while negotiating the opening handshake.
///
/// All of these are fatal: a connection that hits one never reaches `Open`.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The response status was not `101 Switching Protocols`.
    #[error("Unexpected handshake status {0}")]
    BadStatus(u16),
    /// A required header was absent.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),
    /// A required header was present with the wrong value.
    #[error("Header has an unexpected value: {0}")]
    HeaderMismatch(&'static str),
    /// `Sec-WebSocket-Accept` did not match the key we sent.
    #[error("Sec-WebSocket-Accept does not match the request key")]
    AcceptMismatch,
    /// A header line could not be parsed.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),
    /// The request or status line could not be parsed.
    #[error("Malformed start line: {0}")]
    MalformedStartLine(String),
    /// The request method was not `GET`.
    #[error("Handshake method must be GET, got {0}")]
    BadMethod(String),
    /// The HTTP version was older than 1.1.
    #[error("Handshake requires HTTP/1.1")]
    BadVersion,
    /// `Sec-WebSocket-Version` was not 13.
    #[error("Unsupported WebSocket version {0}")]
    UnsupportedVersion(String),
    /// `Sec-WebSocket-Key` did not decode to exactly 16 bytes.
    #[error("Sec-WebSocket-Key must be 16 base64-encoded bytes")]
    InvalidKey,
    /// The handshake head exceeded the configured size limit.
    #[error("Handshake exceeds {0} bytes")]
    TooLarge(usize),
    /// The peer closed the stream before the head was complete.
    #[error("Stream ended before the handshake completed")]
    Incomplete,
    /// An underlying I/O error occurred while exchanging the handshake.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Violations of the framing rules. Each variant names the rule broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The opcode in the frame is not recognized.
    #[error("Unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    /// One or more RSV bits were set without a negotiated extension.
    #[error("Reserved bits set: {0:#05b}")]
    ReservedBits(u8),
    /// A 64-bit payload length with the most significant bit set.
    #[error("Payload length {0:#x} has the most significant bit set")]
    InvalidLength(u64),
    /// A control frame carried more than 125 bytes.
    #[error("Control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLarge(u64),
    /// A control frame arrived without FIN.
    #[error("Control frame {0:?} must not be fragmented")]
    FragmentedControlFrame(Opcode),
    /// A frame was masked (or unmasked) against the role's policy.
    #[error("Mask policy violation: {0}")]
    MaskPolicyViolation(&'static str),
    /// A new data frame started while a fragmented message was in progress.
    #[error("Data frame received while a fragmented message is in progress")]
    UnexpectedDataFrame,
    /// A continuation frame arrived with no message in progress.
    #[error("Continuation frame without an initial data frame")]
    UnexpectedContinuation,
    /// A text message was not valid UTF-8.
    #[error("Text message is not valid UTF-8")]
    InvalidUtf8,
    /// A close frame payload of exactly one byte.
    #[error("Close payload must be empty or at least 2 bytes")]
    InvalidClosePayload,
}

impl ProtocolError {
    /// The close code sent to the peer before the connection is torn down.
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            ProtocolError::InvalidUtf8 => CloseCode::InvalidPayloadData,
            _ => CloseCode::ProtocolError,
        }
    }
}

/// Errors produced by the WebSocket codec (framing, protocol, IO, etc).
#[derive(Debug, Error)]
pub enum WebsocketCodecError {
    /// The WebSocket protocol was violated in some way.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    /// A single frame exceeded the configured frame size.
    #[error("Frame too big: {0} bytes")]
    FrameTooLarge(u64),
    /// A reassembled message exceeded the configured message size.
    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
    /// An underlying I/O error occurred during WebSocket processing.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl WebsocketCodecError {
    /// The close code to send before closing, if the error allows one.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            WebsocketCodecError::Protocol(e) => Some(e.close_code()),
            WebsocketCodecError::FrameTooLarge(_) | WebsocketCodecError::MessageTooLarge { .. } => {
                Some(CloseCode::MessageTooBig)
            }
            WebsocketCodecError::IOError(_) => None,
        }
    }
}

impl Clone for WebsocketCodecError {
    fn clone(&self) -> Self {
        match self {
            WebsocketCodecError::Protocol(e) => WebsocketCodecError::Protocol(e.clone()),
            WebsocketCodecError::FrameTooLarge(size) => WebsocketCodecError::FrameTooLarge(*size),
            WebsocketCodecError::MessageTooLarge { size, limit } => {
                WebsocketCodecError::MessageTooLarge {
                    size: *size,
                    limit: *limit,
                }
            }
            WebsocketCodecError::IOError(e) => {
                WebsocketCodecError::IOError(std::io::Error::new(e.kind(), e.to_string()))
            }
        }
    }
}

/// A close frame whose reason is not valid UTF-8.
///
/// Recoverable: the connection keeps the code and treats the reason as empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Close reason for code {code} is not valid UTF-8")]
pub struct MalformedClosePayload {
    pub code: CloseCode,
}

/// Errors produced by the WebSocket connection and handshake logic.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The operation is not permitted in the current state.
    #[error("Operation not permitted while {0:?}")]
    InvalidState(ConnectionState),
    /// The WebSocket connection has been closed.
    #[error("WebSocket closed")]
    ConnectionClosed,
    /// No pong arrived within the ping timeout.
    #[error("Timed out waiting for the peer")]
    Timeout,
    /// The close code may not be sent in a close frame.
    #[error("Close code {0} is reserved")]
    ReservedCloseCode(CloseCode),
    /// A control frame payload exceeded 125 bytes.
    #[error("Control payload of {0} bytes exceeds 125")]
    PayloadTooLarge(usize),
    /// The opening handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    /// An error occurred in the WebSocket codec.
    #[error("Codec error: {0}")]
    Codec(#[from] WebsocketCodecError),
    /// The provided URI is invalid.
    #[error("Invalid URI: {0}")]
    InvalidUri(&'static str),
    /// Failed to connect to the server.
    #[error("Failed to connect to server: {0}")]
    ConnectFailed(std::io::Error),
}

impl From<ProtocolError> for ConnectionError {
    fn from(value: ProtocolError) -> Self {
        ConnectionError::Codec(value.into())
    }
}

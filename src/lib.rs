//! WebSocket protocol implementation.
//!
//! This crate provides the pieces of an RFC 6455 endpoint: the opening
//! handshake, the frame codec, message reassembly, and a [`Connection`] that
//! drives the connection lifecycle with ping/pong and the closing handshake.
//! It supports both client and server endpoints over any
//! `AsyncRead + AsyncWrite` stream.
//!
//! This crate does not handle any extension negotiation or TLS. It focuses
//! solely on the WebSocket protocol as defined in RFC 6455.
pub mod close;
pub mod codec;
pub(crate) mod connection;
pub mod errors;
pub mod handshake;
pub mod mask;
pub mod options;
pub mod reassembly;

pub use close::{CloseCode, CloseFrame};
pub use codec::{Opcode, Role, WebsocketCodec, WebsocketFrame};
pub use connection::{
    ClientConnectionBuilder, Connection, ConnectionState, Event, PongWaiter, WebSocketStream,
};
pub use errors::{
    ConnectionError, HandshakeError, MalformedClosePayload, ProtocolError, WebsocketCodecError,
};
pub use handshake::{HandshakeRequest, HandshakeResponse, compute_accept};
pub use options::Options;
pub use reassembly::{Message, MessageKind, MessageReassembler};

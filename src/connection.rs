//! WebSocket connection lifecycle shared by both client and server.
//!
//! A [`Connection`] starts in [`ConnectionState::Connecting`] wrapping a raw
//! byte stream. The role-specific handshake (`connect` for clients, `accept` for
//! servers) moves it to `Open`, splits the framed stream, and spawns one reader
//! task that decodes, reassembles and dispatches frames in arrival order. Every
//! outbound frame, including automatic pongs and close replies, goes through the
//! single mutex-guarded sink in [`Shared`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Framed, FramedParts};

use crate::close::{CloseCode, CloseFrame, parse_close_payload};
use crate::codec::{MAX_CONTROL_PAYLOAD, Opcode, Role, WebsocketCodec, WebsocketFrame};
use crate::errors::{ConnectionError, WebsocketCodecError};
use crate::options::Options;
use crate::reassembly::{Assembled, Message, MessageReassembler};

pub(crate) mod client;
pub(crate) mod server;

pub use client::ClientConnectionBuilder;

// Trait alias for boxed stream type used in Connection
pub trait WebSocketStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + Sync> WebSocketStream for T {}

pub(crate) type BoxedStream = Box<dyn WebSocketStream>;
type FramedStream = Framed<BoxedStream, WebsocketCodec>;
type Writer = SplitSink<FramedStream, WebsocketFrame>;
type Reader = SplitStream<FramedStream>;
type EventSender = mpsc::Sender<Result<Event, ConnectionError>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// What [`Connection::receive`] yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A complete text or binary message.
    Message(Message),
    /// The peer pinged us. A pong has already been sent unless we were closing.
    Ping(Vec<u8>),
    /// The peer answered a ping (or sent an unsolicited pong).
    Pong(Vec<u8>),
    /// The peer sent a close frame; `None` when it carried no status.
    Close(Option<CloseFrame>),
}

struct PendingPing {
    payload: Vec<u8>,
    tx: oneshot::Sender<Instant>,
}

/// State reachable from both the connection handle and its reader task.
struct Shared {
    role: Role,
    state: watch::Sender<ConnectionState>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    close_sent: AtomicBool,
    pings: std::sync::Mutex<VecDeque<PendingPing>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `to` if the current state is one of `from`.
    fn transition(&self, from: &[ConnectionState], to: ConnectionState) -> bool {
        let role = self.role;
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                tracing::debug!(%role, from = ?*state, ?to, "state transition");
                *state = to;
                true
            } else {
                false
            }
        })
    }

    async fn write(&self, frame: WebsocketFrame) -> Result<(), ConnectionError> {
        self.write_all(vec![frame]).await
    }

    /// Write frames back to back while holding the sink, then flush.
    async fn write_all(&self, frames: Vec<WebsocketFrame>) -> Result<(), ConnectionError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::ConnectionClosed)?;
        let mut result = Ok(());
        for frame in frames {
            result = writer.feed(frame).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            result = writer.flush().await;
        }
        match result {
            Ok(()) => Ok(()),
            Err(WebsocketCodecError::IOError(e)) => {
                tracing::debug!(role = %self.role, error = %e, "write failed");
                guard.take();
                drop(guard);
                self.mark_closed();
                Err(ConnectionError::ConnectionClosed)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send our close frame unless one already went out. Returns whether it was sent now.
    async fn send_close(&self, status: Option<&CloseFrame>) -> Result<bool, ConnectionError> {
        if self.close_sent.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.write(WebsocketFrame::close(status)).await?;
        Ok(true)
    }

    fn resolve_pings(&self, payload: &[u8], at: Instant) {
        let mut pings = self.pings.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(idx) = pings.iter().position(|p| p.payload == payload) else {
            tracing::trace!(role = %self.role, "unsolicited pong");
            return;
        };
        // a pong acknowledges every ping sent before the one it echoes
        for ping in pings.drain(..=idx) {
            let _ = ping.tx.send(at);
        }
    }

    fn mark_closed(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                return false;
            }
            tracing::debug!(role = %self.role, from = ?*state, "state transition to Closed");
            *state = ConnectionState::Closed;
            true
        });
        self.pings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Move to Closed and shut the transport down.
    async fn finish(&self) {
        self.mark_closed();
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.close().await
        {
            tracing::trace!(role = %self.role, error = %e, "error shutting down transport");
        }
    }
}

enum Stage {
    Handshake {
        stream: BoxedStream,
        rng: StdRng,
    },
    Running {
        events: mpsc::Receiver<Result<Event, ConnectionError>>,
        reader: JoinHandle<()>,
    },
    Done,
}

/// A websocket connection
pub struct Connection {
    options: Options,
    shared: Arc<Shared>,
    stage: Stage,
    protocol: Option<String>,
}

impl Connection {
    pub(crate) fn new(role: Role, stream: BoxedStream, options: Options) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            options,
            shared: Arc::new(Shared {
                role,
                state,
                writer: tokio::sync::Mutex::new(None),
                close_sent: AtomicBool::new(false),
                pings: std::sync::Mutex::new(VecDeque::new()),
            }),
            stage: Stage::Handshake {
                stream,
                rng: StdRng::from_os_rng(),
            },
            protocol: None,
        }
    }

    /// Replace the random source used for the handshake key and masking keys.
    ///
    /// Only meaningful before the handshake; afterwards it is ignored.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        if let Stage::Handshake { rng: current, .. } = &mut self.stage {
            *current = rng;
        }
        self
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// The subprotocol agreed during the handshake.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Take the raw stream for the handshake, or fail if it already ran.
    pub(crate) fn take_handshake(&mut self) -> Result<(BoxedStream, StdRng), ConnectionError> {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Handshake { stream, rng } => Ok((stream, rng)),
            other => {
                self.stage = other;
                Err(ConnectionError::InvalidState(self.state()))
            }
        }
    }

    /// Record a failed handshake. No frames are ever exchanged afterwards.
    pub(crate) fn handshake_failed(&mut self) {
        self.stage = Stage::Done;
        self.shared.mark_closed();
    }

    /// Switch to framing after a successful handshake.
    ///
    /// `leftover` holds bytes that arrived after the handshake head.
    pub(crate) async fn start(
        &mut self,
        stream: BoxedStream,
        rng: StdRng,
        leftover: BytesMut,
        protocol: Option<String>,
    ) {
        let codec = WebsocketCodec::with_rng(self.shared.role, self.options.max_frame_size, rng);
        let mut parts = FramedParts::new::<WebsocketFrame>(stream, codec);
        parts.read_buf = leftover;
        let (writer, reader) = Framed::from_parts(parts).split();
        *self.shared.writer.lock().await = Some(writer);

        let (tx, rx) = mpsc::channel(self.options.event_buffer.max(1));
        let reassembler = MessageReassembler::new(self.options.max_message_size);
        self.shared
            .transition(&[ConnectionState::Connecting], ConnectionState::Open);
        let reader = tokio::spawn(read_loop(self.shared.clone(), reader, reassembler, tx));
        self.protocol = protocol;
        self.stage = Stage::Running { events: rx, reader };
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            state => Err(ConnectionError::InvalidState(state)),
        }
    }

    /// Send a message, fragmenting it when it exceeds the configured fragment size.
    /// # Errors
    /// Returns `InvalidState` unless the connection is open, or an error if sending fails.
    pub async fn send(&self, message: Message) -> Result<(), ConnectionError> {
        self.send_fragmented(message, self.options.fragment_size)
            .await
    }

    /// Send a message split into frames of at most `fragment_size` bytes.
    /// # Errors
    /// Returns `InvalidState` unless the connection is open, or an error if sending fails.
    pub async fn send_fragmented(
        &self,
        message: Message,
        fragment_size: usize,
    ) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        self.shared
            .write_all(fragment(message, fragment_size.max(1)))
            .await
    }

    /// Send a text message.
    /// # Errors
    /// Returns an error if the connection is not open or sending fails.
    pub async fn send_text(&self, text: &str) -> Result<(), ConnectionError> {
        self.send(Message::text(text)).await
    }

    /// Send a binary message.
    /// # Errors
    /// Returns an error if the connection is not open or sending fails.
    pub async fn send_binary(&self, data: &[u8]) -> Result<(), ConnectionError> {
        self.send(Message::binary(data)).await
    }

    /// Send a ping and return a future that resolves with the round-trip time
    /// once the matching pong arrives.
    ///
    /// Pongs are matched by payload. The waiter fails with `Timeout` after the
    /// configured ping timeout, or with `ConnectionClosed` if the connection
    /// goes away first.
    /// # Errors
    /// Returns `PayloadTooLarge` for payloads over 125 bytes and `InvalidState`
    /// unless the connection is open.
    pub async fn ping(&self, payload: impl Into<Vec<u8>>) -> Result<PongWaiter, ConnectionError> {
        let payload = payload.into();
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(ConnectionError::PayloadTooLarge(payload.len()));
        }
        self.ensure_open()?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pings = self
                .shared
                .pings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pings.retain(|p| !p.tx.is_closed());
            pings.push_back(PendingPing {
                payload: payload.clone(),
                tx,
            });
        }
        let sent_at = Instant::now();
        self.shared.write(WebsocketFrame::ping(payload)).await?;
        Ok(PongWaiter::new(rx, sent_at, self.options.ping_timeout))
    }

    /// Wait for the next message or control event.
    /// # Errors
    /// Returns `ConnectionClosed` once the connection is closed and all buffered
    /// events were delivered, or the protocol error that closed it.
    pub async fn receive(&mut self) -> Result<Event, ConnectionError> {
        match &mut self.stage {
            Stage::Running { events, .. } => events
                .recv()
                .await
                .unwrap_or(Err(ConnectionError::ConnectionClosed)),
            Stage::Handshake { .. } => Err(ConnectionError::InvalidState(
                ConnectionState::Connecting,
            )),
            Stage::Done => Err(ConnectionError::ConnectionClosed),
        }
    }

    /// Start the closing handshake: send a close frame and move to `Closing`.
    ///
    /// Does not wait for the peer; see [`Connection::drain`].
    /// # Errors
    /// Returns `ReservedCloseCode` for 1005, 1006 and 1015, which never go on the
    /// wire, and `InvalidState` unless the connection is open. A second call
    /// never sends a second close frame.
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<(), ConnectionError> {
        if code.is_reserved() {
            return Err(ConnectionError::ReservedCloseCode(code));
        }
        if !self
            .shared
            .transition(&[ConnectionState::Open], ConnectionState::Closing)
        {
            return Err(ConnectionError::InvalidState(self.state()));
        }
        self.shared
            .send_close(Some(&CloseFrame::new(code, reason)))
            .await?;
        Ok(())
    }

    /// Complete the closing handshake.
    ///
    /// Discards incoming events until the peer's close frame arrives or the
    /// transport ends, and returns the peer's close status. After the close
    /// timeout the transport is forced closed and `Timeout` is returned.
    /// Either way the connection ends up `Closed`.
    /// # Errors
    /// Returns `InvalidState` while `Connecting` or `Open`.
    pub async fn drain(&mut self) -> Result<Option<CloseFrame>, ConnectionError> {
        match self.state() {
            ConnectionState::Closing | ConnectionState::Closed => {}
            state => return Err(ConnectionError::InvalidState(state)),
        }
        let close_timeout = self.options.close_timeout;
        let Stage::Running { events, .. } = &mut self.stage else {
            return Ok(None);
        };
        let wait = async {
            let mut peer = None;
            while let Some(event) = events.recv().await {
                if let Ok(Event::Close(status)) = event {
                    peer = status;
                }
            }
            peer
        };
        let result = tokio::time::timeout(close_timeout, wait).await;
        match result {
            Ok(peer) => Ok(peer),
            Err(_) => {
                tracing::warn!(role = %self.shared.role, "close handshake timed out, dropping transport");
                self.abort().await;
                Err(ConnectionError::Timeout)
            }
        }
    }

    /// Tear the transport down without a closing handshake.
    pub async fn abort(&mut self) {
        if let Stage::Running { reader, .. } = &self.stage {
            reader.abort();
        }
        self.shared.finish().await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Stage::Running { reader, .. } = &self.stage {
            reader.abort();
        }
    }
}

impl Stream for Connection {
    type Item = Result<Event, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.stage {
            Stage::Running { events, .. } => events.poll_recv(cx),
            _ => Poll::Ready(None),
        }
    }
}

/// Resolves when the pong for a [`Connection::ping`] arrives.
pub struct PongWaiter {
    sent_at: Instant,
    inner: Pin<Box<tokio::time::Timeout<oneshot::Receiver<Instant>>>>,
}

impl PongWaiter {
    fn new(rx: oneshot::Receiver<Instant>, sent_at: Instant, timeout: Duration) -> Self {
        Self {
            sent_at,
            inner: Box::pin(tokio::time::timeout(timeout, rx)),
        }
    }
}

impl Future for PongWaiter {
    type Output = Result<Duration, ConnectionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let sent_at = self.sent_at;
        Poll::Ready(match ready!(self.inner.as_mut().poll(cx)) {
            Ok(Ok(at)) => Ok(at.saturating_duration_since(sent_at)),
            Ok(Err(_)) => Err(ConnectionError::ConnectionClosed),
            Err(_) => Err(ConnectionError::Timeout),
        })
    }
}

fn fragment(message: Message, fragment_size: usize) -> Vec<WebsocketFrame> {
    let opcode = Opcode::from(message.kind);
    if message.payload.len() <= fragment_size {
        return vec![WebsocketFrame::new(opcode, message.payload)];
    }
    let count = message.payload.len().div_ceil(fragment_size);
    message
        .payload
        .chunks(fragment_size)
        .enumerate()
        .map(|(i, chunk)| {
            let opcode = if i == 0 { opcode } else { Opcode::Continuation };
            WebsocketFrame::new(opcode, chunk).with_fin(i + 1 == count)
        })
        .collect()
}

async fn read_loop(
    shared: Arc<Shared>,
    mut reader: Reader,
    mut reassembler: MessageReassembler,
    events: EventSender,
) {
    let role = shared.role;
    while let Some(next) = reader.next().await {
        let frame = match next {
            Ok(frame) => frame,
            Err(WebsocketCodecError::IOError(e)) => {
                tracing::debug!(%role, error = %e, "transport error");
                break;
            }
            Err(e) => {
                fail(&shared, &events, e).await;
                break;
            }
        };

        let event = match reassembler.feed(frame) {
            Ok(None) => continue,
            Ok(Some(Assembled::Message(message))) => Event::Message(message),
            Ok(Some(Assembled::Control(frame))) => match frame.opcode {
                Opcode::Ping => {
                    if shared.state() == ConnectionState::Open
                        && shared
                            .write(WebsocketFrame::pong(frame.payload.clone()))
                            .await
                            .is_err()
                    {
                        break;
                    }
                    Event::Ping(frame.payload)
                }
                Opcode::Pong => {
                    shared.resolve_pings(&frame.payload, Instant::now());
                    Event::Pong(frame.payload)
                }
                Opcode::Close => {
                    let status = match parse_close_payload(&frame.payload) {
                        Ok(Ok(status)) => status,
                        Ok(Err((status, err))) => {
                            tracing::warn!(%role, error = %err, "ignoring malformed close reason");
                            Some(status)
                        }
                        Err(e) => {
                            fail(&shared, &events, e.into()).await;
                            break;
                        }
                    };
                    shared.transition(&[ConnectionState::Open], ConnectionState::Closing);
                    let reply = status.as_ref().map(|s| {
                        let code = if s.code.is_reserved() {
                            CloseCode::NormalClosure
                        } else {
                            s.code
                        };
                        CloseFrame::new(code, "")
                    });
                    if let Err(e) = shared.send_close(reply.as_ref()).await {
                        tracing::debug!(%role, error = %e, "could not answer close frame");
                    }
                    let _ = events.send(Ok(Event::Close(status))).await;
                    break;
                }
                Opcode::Continuation | Opcode::Text | Opcode::Binary => continue,
            },
            Err(e) => {
                fail(&shared, &events, e).await;
                break;
            }
        };

        if events.send(Ok(event)).await.is_err() {
            break;
        }
    }
    shared.finish().await;
}

/// Report a fatal codec error: close with the matching status, then surface it.
async fn fail(shared: &Shared, events: &EventSender, err: WebsocketCodecError) {
    tracing::error!(role = %shared.role, error = %err, "closing connection after protocol failure");
    if let Some(code) = err.close_code()
        && shared.state() != ConnectionState::Closed
    {
        shared.transition(&[ConnectionState::Open], ConnectionState::Closing);
        let status = CloseFrame::new(code, err.to_string());
        if let Err(e) = shared.send_close(Some(&status)).await {
            tracing::debug!(role = %shared.role, error = %e, "could not send close frame");
        }
    }
    let _ = events.send(Err(err.into())).await;
}

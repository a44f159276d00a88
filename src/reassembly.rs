//! Coalescing of fragmented data frames into complete messages (RFC 6455 §5.4).

use crate::codec::{Opcode, WebsocketFrame};
use crate::errors::{ProtocolError, WebsocketCodecError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

impl From<MessageKind> for Opcode {
    fn from(value: MessageKind) -> Self {
        match value {
            MessageKind::Text => Opcode::Text,
            MessageKind::Binary => Opcode::Binary,
        }
    }
}

/// A complete application message. Text payloads are valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: text.into().into_bytes(),
        }
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: data.into(),
        }
    }

    /// The payload as text, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.payload).ok(),
            MessageKind::Binary => None,
        }
    }
}

/// Output of [`MessageReassembler::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// A data message is complete.
    Message(Message),
    /// A control frame, passed through untouched.
    Control(WebsocketFrame),
}

#[derive(Debug)]
struct Partial {
    kind: MessageKind,
    buffer: Vec<u8>,
    frames: usize,
}

/// Turns a stream of frames into complete messages.
#[derive(Debug, Default)]
pub struct MessageReassembler {
    max_message_bytes: Option<usize>,
    partial: Option<Partial>,
}

impl MessageReassembler {
    #[must_use]
    pub fn new(max_message_bytes: Option<usize>) -> Self {
        Self {
            max_message_bytes,
            partial: None,
        }
    }

    /// True while a fragmented message is waiting for its final frame.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one decoded frame.
    ///
    /// Returns `Ok(None)` while a fragmented message is still being collected.
    /// Any error aborts the message in progress.
    pub fn feed(
        &mut self,
        frame: WebsocketFrame,
    ) -> Result<Option<Assembled>, WebsocketCodecError> {
        let result = self.feed_inner(frame);
        if result.is_err() {
            self.partial = None;
        }
        result
    }

    fn feed_inner(
        &mut self,
        frame: WebsocketFrame,
    ) -> Result<Option<Assembled>, WebsocketCodecError> {
        let kind = match frame.opcode {
            Opcode::Close | Opcode::Ping | Opcode::Pong => {
                return Ok(Some(Assembled::Control(frame)));
            }
            Opcode::Continuation => None,
            Opcode::Text => Some(MessageKind::Text),
            Opcode::Binary => Some(MessageKind::Binary),
        };

        let limit = self.max_message_bytes;
        let Some(partial) = self.partial.as_mut() else {
            let Some(kind) = kind else {
                return Err(ProtocolError::UnexpectedContinuation.into());
            };
            check_size(frame.payload.len(), limit)?;
            if frame.fin {
                return finish(kind, frame.payload).map(Some);
            }
            self.partial = Some(Partial {
                kind,
                buffer: frame.payload,
                frames: 1,
            });
            return Ok(None);
        };

        if kind.is_some() {
            return Err(ProtocolError::UnexpectedDataFrame.into());
        }
        check_size(partial.buffer.len() + frame.payload.len(), limit)?;
        partial.buffer.extend_from_slice(&frame.payload);
        partial.frames += 1;
        if !frame.fin {
            return Ok(None);
        }

        let Some(partial) = self.partial.take() else {
            return Err(ProtocolError::UnexpectedContinuation.into());
        };
        tracing::trace!(frames = partial.frames, len = partial.buffer.len(), "reassembled message");
        finish(partial.kind, partial.buffer).map(Some)
    }
}

fn check_size(size: usize, limit: Option<usize>) -> Result<(), WebsocketCodecError> {
    match limit {
        Some(limit) if size > limit => Err(WebsocketCodecError::MessageTooLarge { size, limit }),
        _ => Ok(()),
    }
}

fn finish(kind: MessageKind, payload: Vec<u8>) -> Result<Assembled, WebsocketCodecError> {
    if kind == MessageKind::Text && std::str::from_utf8(&payload).is_err() {
        return Err(ProtocolError::InvalidUtf8.into());
    }
    Ok(Assembled::Message(Message { kind, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_message(out: Option<Assembled>) -> Message {
        match out {
            Some(Assembled::Message(m)) => m,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn test_single_frame_message() {
        let mut r = MessageReassembler::default();
        let m = expect_message(r.feed(WebsocketFrame::binary(vec![1, 2, 3])).unwrap());
        assert_eq!(m, Message::binary(vec![1, 2, 3]));
        assert!(!r.in_progress());
    }

    #[test]
    fn test_fragmented_text() {
        let mut r = MessageReassembler::default();
        assert!(r.feed(WebsocketFrame::text("Hel").with_fin(false)).unwrap().is_none());
        assert!(r.feed(WebsocketFrame::continuation("lo ").with_fin(false)).unwrap().is_none());
        let m = expect_message(r.feed(WebsocketFrame::continuation("World")).unwrap());
        assert_eq!(m.kind, MessageKind::Text);
        assert_eq!(m.as_text(), Some("Hello World"));
        assert!(!r.in_progress());
    }

    #[test]
    fn test_ping_mid_fragmentation_passes_through() {
        let mut r = MessageReassembler::default();
        assert!(r.feed(WebsocketFrame::text("Hel").with_fin(false)).unwrap().is_none());

        let ping = WebsocketFrame::ping("are you there");
        assert_eq!(r.feed(ping.clone()).unwrap(), Some(Assembled::Control(ping)));
        assert!(r.in_progress());

        let m = expect_message(r.feed(WebsocketFrame::continuation("lo")).unwrap());
        assert_eq!(m.as_text(), Some("Hello"));
    }

    #[test]
    fn test_data_frame_while_in_progress() {
        let mut r = MessageReassembler::default();
        r.feed(WebsocketFrame::binary(vec![1]).with_fin(false)).unwrap();
        let err = r.feed(WebsocketFrame::text("oops")).unwrap_err();
        assert!(matches!(
            err,
            WebsocketCodecError::Protocol(ProtocolError::UnexpectedDataFrame)
        ));
        assert!(!r.in_progress());
    }

    #[test]
    fn test_continuation_without_start() {
        let mut r = MessageReassembler::default();
        let err = r.feed(WebsocketFrame::continuation("x")).unwrap_err();
        assert!(matches!(
            err,
            WebsocketCodecError::Protocol(ProtocolError::UnexpectedContinuation)
        ));
    }

    #[test]
    fn test_message_too_large_aborts() {
        let mut r = MessageReassembler::new(Some(8));
        r.feed(WebsocketFrame::binary(vec![0; 5]).with_fin(false)).unwrap();
        let err = r.feed(WebsocketFrame::continuation(vec![0; 5])).unwrap_err();
        assert!(matches!(
            err,
            WebsocketCodecError::MessageTooLarge { size: 10, limit: 8 }
        ));
        assert!(!r.in_progress());

        let err = r.feed(WebsocketFrame::binary(vec![0; 9])).unwrap_err();
        assert!(matches!(err, WebsocketCodecError::MessageTooLarge { .. }));
    }

    #[test]
    fn test_invalid_utf8_text() {
        let mut r = MessageReassembler::default();
        let frame = WebsocketFrame::new(Opcode::Text, vec![0xFF, 0xFE]);
        let err = r.feed(frame).unwrap_err();
        assert!(matches!(
            err,
            WebsocketCodecError::Protocol(ProtocolError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_utf8_split_across_fragments() {
        let bytes = "héllo".as_bytes();
        let mut r = MessageReassembler::default();
        r.feed(WebsocketFrame::new(Opcode::Text, bytes[..2].to_vec()).with_fin(false))
            .unwrap();
        let m = expect_message(r.feed(WebsocketFrame::continuation(bytes[2..].to_vec())).unwrap());
        assert_eq!(m.as_text(), Some("héllo"));
    }
}

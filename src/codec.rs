//! WebSocket frame codec.
//! This module provides the frame type and a role-aware `tokio_util` codec that
//! encodes and decodes the RFC 6455 §5.2 wire format, including masking and the
//! extended payload length fields.

use rand::{Rng, SeedableRng};
use tokio_util::bytes::{Buf as _, BytesMut};

use crate::close::CloseFrame;
use crate::errors::{ProtocolError, WebsocketCodecError};
use crate::mask::apply_mask;

const FIN_MASK: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;
const MASKBIT_MASK: u8 = 0x80;
const LENGTH_MASK: u8 = 0x7F;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Close, ping and pong.
    #[must_use]
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            x => Err(ProtocolError::UnknownOpcode(x)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value as u8
    }
}

/// A single WebSocket frame with its payload already unmasked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebsocketFrame {
    pub fin: bool,
    /// RSV1-3 as the low three bits. Always zero on frames this crate accepts.
    pub rsv: u8,
    pub opcode: Opcode,
    /// The masking key used on the wire, if any.
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl WebsocketFrame {
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<String>) -> Self {
        Self::new(Opcode::Text, payload.into().into_bytes())
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn continuation(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Continuation, payload)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// A close frame; `None` sends an empty payload (no status).
    pub fn close(status: Option<&CloseFrame>) -> Self {
        Self::new(Opcode::Close, status.map(CloseFrame::to_payload).unwrap_or_default())
    }

    #[must_use]
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Use a fixed masking key instead of a random one when encoding as a client.
    #[must_use]
    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    fn check_control(&self, len: u64) -> Result<(), ProtocolError> {
        if self.opcode.is_control() {
            if len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(ProtocolError::ControlFrameTooLarge(len));
            }
            if !self.fin {
                return Err(ProtocolError::FragmentedControlFrame(self.opcode));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

#[derive(Debug)]
pub struct WebsocketCodec {
    role: Role,
    max_length: usize,
    rng: rand::rngs::StdRng,
}

impl WebsocketCodec {
    /// Create a new WebSocket codec.
    ///
    /// `role` specifies whether this codec is for a client or server.
    /// `max_length` specifies the maximum allowed payload length for incoming frames.
    /// Frames exceeding this length will result in a `FrameTooLarge` error.
    #[must_use]
    pub fn new(role: Role, max_length: usize) -> Self {
        Self::with_rng(role, max_length, rand::rngs::StdRng::from_os_rng())
    }

    /// Like [`WebsocketCodec::new`] with an explicit source for masking keys.
    #[must_use]
    pub fn with_rng(role: Role, max_length: usize, rng: rand::rngs::StdRng) -> Self {
        Self {
            role,
            max_length,
            rng,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

impl tokio_util::codec::Decoder for WebsocketCodec {
    type Item = WebsocketFrame;
    type Error = WebsocketCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        let fin = src[0] & FIN_MASK != 0;
        let rsv = (src[0] & RSV_MASK) >> 4;
        if rsv != 0 {
            return Err(ProtocolError::ReservedBits(rsv).into());
        }
        let opcode = Opcode::try_from(src[0] & OPCODE_MASK)?;
        let masked = src[1] & MASKBIT_MASK != 0;
        let length_flag = src[1] & LENGTH_MASK;

        match self.role {
            Role::Client if masked => {
                return Err(ProtocolError::MaskPolicyViolation(
                    "Client must not receive masked frames",
                )
                .into());
            }
            Role::Server if !masked => {
                return Err(ProtocolError::MaskPolicyViolation(
                    "Server must receive masked frames",
                )
                .into());
            }
            _ => {}
        }

        let (header_len, payload_len) = match length_flag {
            0..=125 => (2, u64::from(length_flag)),
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (4, u64::from(u16::from_be_bytes([src[2], src[3]])))
            }
            _ => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let len = u64::from_be_bytes([
                    src[2], src[3], src[4], src[5], src[6], src[7], src[8], src[9],
                ]);
                if len & 0x8000_0000_0000_0000 != 0 {
                    return Err(ProtocolError::InvalidLength(len).into());
                }
                (10, len)
            }
        };

        if opcode.is_control() {
            if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(ProtocolError::ControlFrameTooLarge(payload_len).into());
            }
            if !fin {
                return Err(ProtocolError::FragmentedControlFrame(opcode).into());
            }
        }
        if payload_len > self.max_length as u64 {
            return Err(WebsocketCodecError::FrameTooLarge(payload_len));
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Bounded by max_length above"
        )]
        let payload_len = payload_len as usize;

        let mask_len = if masked { 4 } else { 0 };
        let total_len = header_len + mask_len + payload_len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        src.advance(header_len);

        let masking_key = if masked {
            let key = src.split_to(4);
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        let mut payload = src.split_to(payload_len).to_vec();
        if let Some(mask) = masking_key {
            apply_mask(&mut payload, mask);
        }

        tracing::trace!(role = %self.role, ?opcode, fin, len = payload_len, "decoded frame");

        Ok(Some(WebsocketFrame {
            fin,
            rsv,
            opcode,
            mask: masking_key,
            payload,
        }))
    }
}

impl tokio_util::codec::Encoder<WebsocketFrame> for WebsocketCodec {
    type Error = WebsocketCodecError;

    fn encode(&mut self, item: WebsocketFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.payload.len() as u64;
        if item.rsv != 0 {
            return Err(ProtocolError::ReservedBits(item.rsv).into());
        }
        item.check_control(len)?;

        let mask_key = match self.role {
            Role::Client => Some(item.mask.unwrap_or_else(|| self.rng.random())),
            Role::Server if item.mask.is_some() => {
                return Err(ProtocolError::MaskPolicyViolation(
                    "Server must not send masked frames",
                )
                .into());
            }
            Role::Server => None,
        };

        let mut header = [0u8; 2];
        if item.fin {
            header[0] |= FIN_MASK;
        }
        header[0] |= u8::from(item.opcode);
        if mask_key.is_some() {
            header[1] |= MASKBIT_MASK;
        }

        dst.reserve(14 + item.payload.len());
        #[allow(
            clippy::cast_possible_truncation,
            reason = "The lengths have been checked"
        )]
        match len {
            ..=125 => {
                header[1] |= len as u8;
                dst.extend_from_slice(&header);
            }
            126..=0xFFFF => {
                header[1] |= 126;
                dst.extend_from_slice(&header);
                dst.extend_from_slice(&(len as u16).to_be_bytes());
            }
            0x1_0000..=0x7FFF_FFFF_FFFF_FFFF => {
                header[1] |= 127;
                dst.extend_from_slice(&header);
                dst.extend_from_slice(&len.to_be_bytes());
            }
            _ => return Err(WebsocketCodecError::FrameTooLarge(len)),
        }

        if let Some(key) = mask_key {
            dst.extend_from_slice(&key);
        }
        let start = dst.len();
        dst.extend_from_slice(&item.payload);
        if let Some(key) = mask_key {
            apply_mask(&mut dst[start..], key);
        }

        tracing::trace!(role = %self.role, opcode = ?item.opcode, fin = item.fin, len, "encoded frame");

        Ok(())
    }
}

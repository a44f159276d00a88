//! Close status codes and close frame payloads (RFC 6455 §5.5.1, §7.4).

use crate::errors::{MalformedClosePayload, ProtocolError};

/// WebSocket close status codes as defined in RFC 6455 §7.4.1 and the IANA registry.
///
/// Codes outside the registry are carried verbatim in [`CloseCode::Other`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: Normal closure
    NormalClosure,
    /// 1001: Endpoint is going away
    GoingAway,
    /// 1002: Protocol error
    ProtocolError,
    /// 1003: Unsupported data
    UnsupportedData,
    /// 1005: No status received (reserved, not to be sent)
    NoStatusReceived,
    /// 1006: Abnormal closure (reserved, not to be sent)
    AbnormalClosure,
    /// 1007: Invalid payload data
    InvalidPayloadData,
    /// 1008: Policy violation
    PolicyViolation,
    /// 1009: Message too big
    MessageTooBig,
    /// 1010: Mandatory extension (client only)
    MandatoryExtension,
    /// 1011: Internal server error
    InternalServerError,
    /// 1012: Service restart
    ServiceRestart,
    /// 1013: Try again later
    TryAgainLater,
    /// 1014: Bad gateway
    BadGateway,
    /// 1015: TLS handshake failure (reserved, not to be sent)
    TlsHandshake,
    /// Any other code, including application-defined 4000-4999.
    Other(u16),
}

impl CloseCode {
    /// Codes that an endpoint must never put in a close frame.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            CloseCode::NoStatusReceived | CloseCode::AbnormalClosure | CloseCode::TlsHandshake
        )
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CloseCode::NormalClosure => "Normal closure",
            CloseCode::GoingAway => "Endpoint is going away",
            CloseCode::ProtocolError => "Protocol error",
            CloseCode::UnsupportedData => "Unsupported data",
            CloseCode::NoStatusReceived => "No status received",
            CloseCode::AbnormalClosure => "Abnormal closure",
            CloseCode::InvalidPayloadData => "Invalid payload data",
            CloseCode::PolicyViolation => "Policy violation",
            CloseCode::MessageTooBig => "Message too big",
            CloseCode::MandatoryExtension => "Mandatory extension",
            CloseCode::InternalServerError => "Internal server error",
            CloseCode::ServiceRestart => "Service restart",
            CloseCode::TryAgainLater => "Try again later",
            CloseCode::BadGateway => "Bad gateway",
            CloseCode::TlsHandshake => "TLS handshake failure",
            CloseCode::Other(_) => "Other",
        };
        write!(f, "{} ({name})", u16::from(*self))
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => CloseCode::NormalClosure,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusReceived,
            1006 => CloseCode::AbnormalClosure,
            1007 => CloseCode::InvalidPayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalServerError,
            1012 => CloseCode::ServiceRestart,
            1013 => CloseCode::TryAgainLater,
            1014 => CloseCode::BadGateway,
            1015 => CloseCode::TlsHandshake,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> Self {
        match value {
            CloseCode::NormalClosure => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusReceived => 1005,
            CloseCode::AbnormalClosure => 1006,
            CloseCode::InvalidPayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalServerError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
            CloseCode::BadGateway => 1014,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Other(code) => code,
        }
    }
}

impl From<CloseCode> for [u8; 2] {
    fn from(value: CloseCode) -> Self {
        u16::from(value).to_be_bytes()
    }
}

/// The status carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Serialize into a close frame payload: 2-byte big-endian code then the reason.
    ///
    /// The reason is truncated on a character boundary so the payload fits in 125 bytes.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        let mut reason = self.reason.as_str();
        while reason.len() > 123 {
            let mut end = 123;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason = &reason[..end];
        }
        let mut data = Vec::with_capacity(2 + reason.len());
        data.extend_from_slice(&<[u8; 2]>::from(self.code));
        data.extend_from_slice(reason.as_bytes());
        data
    }
}

/// Outcome of decoding a close payload whose framing is valid.
pub type ClosePayload = Result<Option<CloseFrame>, (CloseFrame, MalformedClosePayload)>;

/// Decode a close frame payload.
///
/// An empty payload means no status was given. A one-byte payload cannot hold a
/// status code and is a protocol error. A reason that is not UTF-8 yields the
/// frame with an empty reason alongside a [`MalformedClosePayload`] so the caller
/// can decide how loudly to report it.
pub fn parse_close_payload(payload: &[u8]) -> Result<ClosePayload, ProtocolError> {
    match payload {
        [] => Ok(Ok(None)),
        [_] => Err(ProtocolError::InvalidClosePayload),
        [hi, lo, reason @ ..] => {
            let code = CloseCode::from(u16::from_be_bytes([*hi, *lo]));
            match std::str::from_utf8(reason) {
                Ok(reason) => Ok(Ok(Some(CloseFrame::new(code, reason)))),
                Err(_) => Ok(Err((
                    CloseFrame::new(code, String::new()),
                    MalformedClosePayload { code },
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_codes_map_both_ways() {
        for code in [1000u16, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 1015] {
            assert_eq!(u16::from(CloseCode::from(code)), code);
        }
        assert_eq!(CloseCode::from(1002), CloseCode::ProtocolError);
    }

    #[test]
    fn test_unknown_codes_are_kept() {
        assert_eq!(CloseCode::from(4321), CloseCode::Other(4321));
        assert_eq!(u16::from(CloseCode::Other(4321)), 4321);
        assert_eq!(CloseCode::from(65535), CloseCode::Other(65535));
    }

    #[test]
    fn test_parse_empty_payload() {
        assert_eq!(parse_close_payload(&[]).unwrap(), Ok(None));
    }

    #[test]
    fn test_parse_single_byte_is_protocol_error() {
        assert_eq!(
            parse_close_payload(&[0x03]),
            Err(ProtocolError::InvalidClosePayload)
        );
    }

    #[test]
    fn test_parse_code_and_reason() {
        let payload = CloseFrame::new(CloseCode::GoingAway, "bye").to_payload();
        assert_eq!(&payload[..2], &[0x03, 0xE9]);
        let frame = parse_close_payload(&payload).unwrap().unwrap().unwrap();
        assert_eq!(frame.code, CloseCode::GoingAway);
        assert_eq!(frame.reason, "bye");
    }

    #[test]
    fn test_parse_invalid_utf8_reason_blanks_reason() {
        let payload = [0x03, 0xE8, 0xFF, 0xFE];
        let (frame, err) = parse_close_payload(&payload).unwrap().unwrap_err();
        assert_eq!(frame.code, CloseCode::NormalClosure);
        assert!(frame.reason.is_empty());
        assert_eq!(err.code, CloseCode::NormalClosure);
    }

    #[test]
    fn test_long_reason_is_truncated() {
        let frame = CloseFrame::new(CloseCode::NormalClosure, "é".repeat(100));
        let payload = frame.to_payload();
        assert!(payload.len() <= 125);
        assert!(std::str::from_utf8(&payload[2..]).is_ok());
    }
}

//! The opening handshake (RFC 6455 §4).
//!
//! Requests and responses are plain HTTP/1.1 heads. Parsing goes through
//! `httparse`; headers land in an [`http::HeaderMap`], so lookups are
//! case-insensitive and a repeated header keeps its last value.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as base64;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Version};
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::bytes::BytesMut;

use crate::errors::HandshakeError;

/// Appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const MAX_HEADERS: usize = 64;

pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
#[must_use]
pub fn compute_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID.as_bytes());
    base64.encode(sha1.finalize())
}

/// A client's upgrade request.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

impl HandshakeRequest {
    /// Parse a request head (everything up to and including the blank line).
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let status = req.parse(head).map_err(map_parse_error)?;
        if status.is_partial() {
            return Err(HandshakeError::Incomplete);
        }
        let method = req
            .method
            .ok_or_else(|| HandshakeError::MalformedStartLine("missing method".into()))?;
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| HandshakeError::MalformedStartLine(format!("bad method {method}")))?;
        let target = req
            .path
            .ok_or_else(|| HandshakeError::MalformedStartLine("missing target".into()))?
            .to_owned();
        Ok(Self {
            method,
            target,
            version: map_version(req.version),
            headers: collect_headers(req.headers)?,
        })
    }

    /// The `Sec-WebSocket-Key` this request carries.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        header_str(&self.headers, SEC_WEBSOCKET_KEY)
    }

    /// Subprotocols offered in `Sec-WebSocket-Protocol`, in preference order.
    #[must_use]
    pub fn protocols(&self) -> Vec<&str> {
        self.headers
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), HandshakeError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HandshakeError::MalformedHeader(name.to_owned()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| HandshakeError::MalformedHeader(format!("{name}: {value}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Serialize as HTTP/1.1 request text.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.target).into_bytes();
        write_headers(&mut out, &self.headers);
        out
    }
}

/// A server's reply to an upgrade request.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
}

impl HandshakeResponse {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: HeaderMap::new(),
        }
    }

    /// Parse a response head (everything up to and including the blank line).
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut headers);
        let status = res.parse(head).map_err(map_parse_error)?;
        if status.is_partial() {
            return Err(HandshakeError::Incomplete);
        }
        let code = res
            .code
            .ok_or_else(|| HandshakeError::MalformedStartLine("missing status".into()))?;
        let status = StatusCode::from_u16(code)
            .map_err(|_| HandshakeError::MalformedStartLine(format!("bad status {code}")))?;
        Ok(Self {
            status,
            reason: res.reason.unwrap_or_default().to_owned(),
            headers: collect_headers(res.headers)?,
        })
    }

    /// The subprotocol the server selected, if any.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        header_str(&self.headers, SEC_WEBSOCKET_PROTOCOL)
    }

    /// Serialize as HTTP/1.1 response text.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.reason).into_bytes();
        write_headers(&mut out, &self.headers);
        out
    }
}

/// Build a client upgrade request for `host` and `path` with a fresh random key.
///
/// The key stays on the request (see [`HandshakeRequest::key`]) for checking the
/// server's accept value later.
pub fn build_request<R>(host: &str, path: &str, rng: &mut R) -> Result<HandshakeRequest, HandshakeError>
where
    R: RngCore + ?Sized,
{
    let mut key_bytes = [0u8; 16];
    rng.fill_bytes(&mut key_bytes);
    let key = base64.encode(key_bytes);

    let target = if path.is_empty() { "/" } else { path };
    let mut req = HandshakeRequest {
        method: Method::GET,
        target: target.to_owned(),
        version: Version::HTTP_11,
        headers: HeaderMap::new(),
    };
    req.set_header("Host", host)?;
    req.set_header("Upgrade", "websocket")?;
    req.set_header("Connection", "Upgrade")?;
    req.set_header(SEC_WEBSOCKET_KEY, &key)?;
    req.set_header(SEC_WEBSOCKET_VERSION, "13")?;
    Ok(req)
}

/// Check a server response against the request that produced it.
pub fn validate_response(
    req: &HandshakeRequest,
    resp: &HandshakeResponse,
) -> Result<(), HandshakeError> {
    if resp.status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(HandshakeError::BadStatus(resp.status.as_u16()));
    }
    let upgrade = required(&resp.headers, "Upgrade")?;
    let connection = required(&resp.headers, "Connection")?;
    let accept = required(&resp.headers, SEC_WEBSOCKET_ACCEPT)?;

    if !upgrade.trim().eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::HeaderMismatch("Upgrade"));
    }
    if !has_token(connection, "upgrade") {
        return Err(HandshakeError::HeaderMismatch("Connection"));
    }
    let key = req
        .key()
        .ok_or(HandshakeError::MissingHeader(SEC_WEBSOCKET_KEY))?;
    if accept.trim() != compute_accept(key) {
        return Err(HandshakeError::AcceptMismatch);
    }
    if let Some(selected) = resp.protocol()
        && !req.protocols().contains(&selected)
    {
        return Err(HandshakeError::HeaderMismatch(SEC_WEBSOCKET_PROTOCOL));
    }
    Ok(())
}

/// Check an incoming upgrade request on the server side.
pub fn validate_request(req: &HandshakeRequest) -> Result<(), HandshakeError> {
    if req.method != Method::GET {
        return Err(HandshakeError::BadMethod(req.method.to_string()));
    }
    if req.version < Version::HTTP_11 {
        return Err(HandshakeError::BadVersion);
    }
    required(&req.headers, "Host")?;
    let upgrade = required(&req.headers, "Upgrade")?;
    let connection = required(&req.headers, "Connection")?;
    let key = required(&req.headers, SEC_WEBSOCKET_KEY)?;
    let version = required(&req.headers, SEC_WEBSOCKET_VERSION)?;

    if !upgrade.trim().eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::HeaderMismatch("Upgrade"));
    }
    if !has_token(connection, "upgrade") {
        return Err(HandshakeError::HeaderMismatch("Connection"));
    }
    if version.trim() != "13" {
        return Err(HandshakeError::UnsupportedVersion(version.trim().to_owned()));
    }
    match base64.decode(key.trim()) {
        Ok(raw) if raw.len() == 16 => Ok(()),
        _ => Err(HandshakeError::InvalidKey),
    }
}

/// Build the `101 Switching Protocols` reply for a validated request.
///
/// The first subprotocol offered by the client that also appears in `supported`
/// is selected and echoed back.
pub fn accept_response(
    req: &HandshakeRequest,
    supported: &[String],
) -> Result<HandshakeResponse, HandshakeError> {
    let key = req
        .key()
        .ok_or(HandshakeError::MissingHeader(SEC_WEBSOCKET_KEY))?;
    let mut resp = HandshakeResponse::new(StatusCode::SWITCHING_PROTOCOLS);
    resp.headers
        .insert(http::header::UPGRADE, HeaderValue::from_static("websocket"));
    resp.headers
        .insert(http::header::CONNECTION, HeaderValue::from_static("Upgrade"));
    let accept = HeaderValue::from_str(&compute_accept(key.trim()))
        .map_err(|_| HandshakeError::InvalidKey)?;
    resp.headers.insert(http::header::SEC_WEBSOCKET_ACCEPT, accept);

    let selected = req
        .protocols()
        .into_iter()
        .find(|offered| supported.iter().any(|s| s == offered));
    if let Some(protocol) = selected {
        let value = HeaderValue::from_str(protocol)
            .map_err(|_| HandshakeError::MalformedHeader(protocol.to_owned()))?;
        resp.headers.insert(http::header::SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(resp)
}

/// The reply sent when a request fails validation.
#[must_use]
pub fn rejection_response(err: &HandshakeError) -> HandshakeResponse {
    let mut resp = match err {
        HandshakeError::UnsupportedVersion(_) => {
            let mut resp = HandshakeResponse::new(StatusCode::UPGRADE_REQUIRED);
            resp.headers.insert(
                http::header::SEC_WEBSOCKET_VERSION,
                HeaderValue::from_static("13"),
            );
            resp
        }
        HandshakeError::BadMethod(_) => HandshakeResponse::new(StatusCode::METHOD_NOT_ALLOWED),
        HandshakeError::TooLarge(_) => {
            HandshakeResponse::new(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
        }
        _ => HandshakeResponse::new(StatusCode::BAD_REQUEST),
    };
    resp.headers
        .insert(http::header::CONNECTION, HeaderValue::from_static("close"));
    resp.headers
        .insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    resp
}

/// Read an HTTP head from `stream`.
///
/// Returns the head (through the blank line) and any bytes that arrived after it,
/// which belong to the frame stream.
pub async fn read_head<S>(stream: &mut S, limit: usize) -> Result<(BytesMut, BytesMut), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let mut scanned = 0usize;
    loop {
        let from = scanned.saturating_sub(3);
        if let Some(pos) = buf[from..].windows(4).position(|w| w == b"\r\n\r\n") {
            let end = from + pos + 4;
            if end > limit {
                return Err(HandshakeError::TooLarge(limit));
            }
            let rest = buf.split_off(end);
            return Ok((buf, rest));
        }
        scanned = buf.len();
        if buf.len() > limit {
            return Err(HandshakeError::TooLarge(limit));
        }
        buf.reserve(1024);
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(HandshakeError::Incomplete);
        }
    }
}

fn map_parse_error(err: httparse::Error) -> HandshakeError {
    match err {
        httparse::Error::HeaderName
        | httparse::Error::HeaderValue
        | httparse::Error::NewLine
        | httparse::Error::TooManyHeaders => HandshakeError::MalformedHeader(err.to_string()),
        _ => HandshakeError::MalformedStartLine(err.to_string()),
    }
}

fn map_version(version: Option<u8>) -> Version {
    match version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, HandshakeError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for h in raw {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| HandshakeError::MalformedHeader(h.name.to_owned()))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| HandshakeError::MalformedHeader(h.name.to_owned()))?;
        // last one wins
        headers.insert(name, value);
    }
    Ok(headers)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn required<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, HandshakeError> {
    let value = headers
        .get(name)
        .ok_or(HandshakeError::MissingHeader(name))?;
    value
        .to_str()
        .map_err(|_| HandshakeError::MalformedHeader(name.to_owned()))
}

fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(canonical_name(name).as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// `sec-websocket-key` -> `Sec-WebSocket-Key`. Some peers match header names
/// case-sensitively.
fn canonical_name(name: &HeaderName) -> String {
    name.as_str()
        .split('-')
        .map(|part| {
            if part == "websocket" {
                return "WebSocket".to_owned();
            }
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn sample_request() -> HandshakeRequest {
        HandshakeRequest::parse(
            b"GET /ws HTTP/1.1\r\n\
              Host: localhost:8080\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              Sec-WebSocket-Version: 13\r\n\r\n",
        )
        .unwrap()
    }

    fn response_with(headers: &str) -> HandshakeResponse {
        let head = format!("HTTP/1.1 101 Switching Protocols\r\n{headers}\r\n");
        HandshakeResponse::parse(head.as_bytes()).unwrap()
    }

    #[test]
    fn test_rfc_accept_example() {
        assert_eq!(compute_accept(SAMPLE_KEY), SAMPLE_ACCEPT);
    }

    #[test]
    fn test_accept_is_deterministic() {
        let key = base64.encode(b"test_key_1234567");
        assert_eq!(compute_accept(&key), compute_accept(&key));
        assert_ne!(compute_accept(&key), SAMPLE_ACCEPT);
    }

    #[test]
    fn test_build_request_with_seeded_rng() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let req = build_request("example.com", "/chat", &mut rng).unwrap();
        let key = req.key().unwrap().to_owned();
        assert_eq!(base64.decode(&key).unwrap().len(), 16);

        let mut again = rand::rngs::StdRng::seed_from_u64(42);
        let same = build_request("example.com", "/chat", &mut again).unwrap();
        assert_eq!(same.key(), Some(key.as_str()));

        assert_eq!(req.method, Method::GET);
        assert_eq!(req.target, "/chat");
        validate_request(&req).unwrap();
    }

    #[test]
    fn test_request_wire_format() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let req = build_request("localhost:8080", "/ws", &mut rng).unwrap();
        let text = String::from_utf8(req.to_bytes()).unwrap();
        assert!(text.starts_with("GET /ws HTTP/1.1\r\n"));
        assert!(text.contains("Host: localhost:8080\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Key: {}\r\n", req.key().unwrap())));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_accept_response_validates() {
        let req = sample_request();
        validate_request(&req).unwrap();
        let resp = accept_response(&req, &[]).unwrap();
        let text = String::from_utf8(resp.to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n")));

        let parsed = HandshakeResponse::parse(text.as_bytes()).unwrap();
        validate_response(&req, &parsed).unwrap();
    }

    #[test]
    fn test_missing_accept_header() {
        let resp = response_with("Upgrade: websocket\r\nConnection: Upgrade\r\n");
        assert!(matches!(
            validate_response(&sample_request(), &resp),
            Err(HandshakeError::MissingHeader(SEC_WEBSOCKET_ACCEPT))
        ));
    }

    #[test]
    fn test_bad_status() {
        let resp = HandshakeResponse::parse(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").unwrap();
        assert!(matches!(
            validate_response(&sample_request(), &resp),
            Err(HandshakeError::BadStatus(404))
        ));
    }

    #[test]
    fn test_header_mismatch() {
        let resp = response_with(&format!(
            "Upgrade: h2c\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n"
        ));
        assert!(matches!(
            validate_response(&sample_request(), &resp),
            Err(HandshakeError::HeaderMismatch("Upgrade"))
        ));

        let resp = response_with(&format!(
            "Upgrade: websocket\r\nConnection: keep-alive\r\nSec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n"
        ));
        assert!(matches!(
            validate_response(&sample_request(), &resp),
            Err(HandshakeError::HeaderMismatch("Connection"))
        ));
    }

    #[test]
    fn test_connection_token_list_and_case() {
        let resp = response_with(&format!(
            "upgrade: WebSocket\r\nconnection: keep-alive, UPGRADE\r\nsec-websocket-accept: {SAMPLE_ACCEPT}\r\n"
        ));
        validate_response(&sample_request(), &resp).unwrap();
    }

    #[test]
    fn test_accept_mismatch_is_case_sensitive() {
        let resp = response_with(&format!(
            "Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
            SAMPLE_ACCEPT.to_lowercase()
        ));
        assert!(matches!(
            validate_response(&sample_request(), &resp),
            Err(HandshakeError::AcceptMismatch)
        ));
    }

    #[test]
    fn test_header_without_colon_is_malformed() {
        let err = HandshakeResponse::parse(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade websocket\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, HandshakeError::MalformedHeader(_)));
    }

    #[test]
    fn test_duplicate_headers_last_wins() {
        let resp = response_with(&format!(
            "Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: bogus\r\nSec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\n"
        ));
        validate_response(&sample_request(), &resp).unwrap();
    }

    #[test]
    fn test_validate_request_failures() {
        let base = sample_request();

        let mut req = base.clone();
        req.method = Method::POST;
        assert!(matches!(validate_request(&req), Err(HandshakeError::BadMethod(_))));

        let mut req = base.clone();
        req.version = Version::HTTP_10;
        assert!(matches!(validate_request(&req), Err(HandshakeError::BadVersion)));

        let mut req = base.clone();
        req.headers.remove("Host");
        assert!(matches!(validate_request(&req), Err(HandshakeError::MissingHeader("Host"))));

        let mut req = base.clone();
        req.set_header(SEC_WEBSOCKET_VERSION, "8").unwrap();
        let err = validate_request(&req).unwrap_err();
        assert!(matches!(err, HandshakeError::UnsupportedVersion(_)));
        let resp = rejection_response(&err);
        assert_eq!(resp.status, StatusCode::UPGRADE_REQUIRED);
        assert_eq!(resp.headers.get(SEC_WEBSOCKET_VERSION).unwrap(), "13");

        let mut req = base.clone();
        req.set_header(SEC_WEBSOCKET_KEY, &base64.encode(b"short")).unwrap();
        assert!(matches!(validate_request(&req), Err(HandshakeError::InvalidKey)));

        let mut req = base;
        req.set_header(SEC_WEBSOCKET_KEY, "not base64!").unwrap();
        assert!(matches!(validate_request(&req), Err(HandshakeError::InvalidKey)));
    }

    #[test]
    fn test_protocol_selection() {
        let mut req = sample_request();
        req.set_header(SEC_WEBSOCKET_PROTOCOL, "chat.v2, chat.v1").unwrap();
        assert_eq!(req.protocols(), vec!["chat.v2", "chat.v1"]);

        let resp = accept_response(&req, &["chat.v1".to_owned()]).unwrap();
        assert_eq!(resp.protocol(), Some("chat.v1"));
        validate_response(&req, &resp).unwrap();

        let resp = accept_response(&req, &["other".to_owned()]).unwrap();
        assert_eq!(resp.protocol(), None);

        let resp = response_with(&format!(
            "Upgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {SAMPLE_ACCEPT}\r\nSec-WebSocket-Protocol: unknown\r\n"
        ));
        assert!(matches!(
            validate_response(&req, &resp),
            Err(HandshakeError::HeaderMismatch(SEC_WEBSOCKET_PROTOCOL))
        ));
    }

    #[tokio::test]
    async fn test_read_head_keeps_trailing_bytes() {
        let mut input: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n\x81\x02hi";
        let (head, rest) = read_head(&mut input, 8192).await.unwrap();
        assert!(head.ends_with(b"\r\n\r\n"));
        assert_eq!(&rest[..], b"\x81\x02hi");
    }

    #[tokio::test]
    async fn test_read_head_limits() {
        let mut eof: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n";
        assert!(matches!(
            read_head(&mut eof, 8192).await,
            Err(HandshakeError::Incomplete)
        ));

        let big = format!("GET / HTTP/1.1\r\nX-Pad: {}\r\n\r\n", "a".repeat(4096));
        let mut input = big.as_bytes();
        assert!(matches!(
            read_head(&mut input, 1024).await,
            Err(HandshakeError::TooLarge(1024))
        ));
    }
}

use tokio::io::AsyncWriteExt;
use tokio_util::bytes::BytesMut;

use crate::codec::Role;
use crate::connection::{BoxedStream, Connection, WebSocketStream};
use crate::errors::{ConnectionError, HandshakeError};
use crate::handshake::{self, HandshakeRequest, HandshakeResponse};
use crate::options::Options;

impl Connection {
    /// Wrap an accepted byte stream as the server end of a connection.
    ///
    /// The connection stays `Connecting` until [`Connection::accept`] succeeds.
    pub fn server<S: WebSocketStream + 'static>(stream: S, options: Options) -> Self {
        Self::new(Role::Server, Box::new(stream), options)
    }

    /// Read and answer the client's upgrade request.
    ///
    /// A valid request gets `101 Switching Protocols` and the connection opens.
    /// An invalid one gets an HTTP error response (426 for an unsupported
    /// version) and the connection closes. Returns the accepted request so the
    /// caller can inspect its target and headers.
    /// # Errors
    /// Returns `InvalidState` if the handshake already ran, or the handshake failure.
    pub async fn accept(&mut self) -> Result<HandshakeRequest, ConnectionError> {
        let (mut stream, rng) = self.take_handshake()?;
        let result = match read_request(&mut stream, &self.options).await {
            Ok((req, resp, rest)) => write_response(&mut stream, &resp)
                .await
                .map(|()| (req, resp, rest)),
            Err(err) => {
                if !matches!(err, HandshakeError::Io(_) | HandshakeError::Incomplete) {
                    let rejection = handshake::rejection_response(&err);
                    tracing::debug!(status = %rejection.status, "rejecting upgrade request");
                    let _ = write_response(&mut stream, &rejection).await;
                }
                Err(err)
            }
        };

        match result {
            Ok((req, resp, rest)) => {
                tracing::debug!(path = %req.target, leftover = rest.len(), "server handshake complete");
                let protocol = resp.protocol().map(str::to_owned);
                self.start(stream, rng, rest, protocol).await;
                Ok(req)
            }
            Err(e) => {
                tracing::warn!(error = %e, "server handshake failed");
                let _ = stream.shutdown().await;
                self.handshake_failed();
                Err(e.into())
            }
        }
    }
}

async fn read_request(
    stream: &mut BoxedStream,
    options: &Options,
) -> Result<(HandshakeRequest, HandshakeResponse, BytesMut), HandshakeError> {
    let (head, rest) = handshake::read_head(stream, options.max_handshake_size).await?;
    let req = HandshakeRequest::parse(&head)?;
    handshake::validate_request(&req)?;
    let resp = handshake::accept_response(&req, &options.protocols)?;
    Ok((req, resp, rest))
}

async fn write_response(
    stream: &mut BoxedStream,
    resp: &HandshakeResponse,
) -> Result<(), HandshakeError> {
    stream.write_all(&resp.to_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::connection::ConnectionState;

    async fn reply_to(request: &str) -> (Result<HandshakeRequest, ConnectionError>, Connection, String) {
        let (mut a, b) = tokio::io::duplex(4096);
        let mut server = Connection::server(b, Options::default());
        a.write_all(request.as_bytes()).await.unwrap();
        let result = server.accept().await;
        let mut reply = String::new();
        let _ = read_all(&mut a, &mut reply).await;
        (result, server, reply)
    }

    async fn read_all(stream: &mut DuplexStream, out: &mut String) -> std::io::Result<()> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        out.push_str(&String::from_utf8_lossy(&buf));
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_unsupported_version() {
        let (result, server, reply) = reply_to(
            "GET /chat HTTP/1.1\r\nHost: server.example.com\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 8\r\n\r\n",
        )
        .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Handshake(HandshakeError::UnsupportedVersion(_)))
        ));
        assert_eq!(server.state(), ConnectionState::Closed);
        assert!(reply.starts_with("HTTP/1.1 426 Upgrade Required\r\n"), "{reply}");
        assert!(reply.contains("Sec-WebSocket-Version: 13\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn test_rejects_post() {
        let (result, _server, reply) = reply_to(
            "POST /chat HTTP/1.1\r\nHost: server.example.com\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
        )
        .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Handshake(HandshakeError::BadMethod(_)))
        ));
        assert!(reply.starts_with("HTTP/1.1 405 "), "{reply}");
    }

    #[tokio::test]
    async fn test_accepts_rfc_example_request() {
        let (a, b) = tokio::io::duplex(4096);
        let (mut read, mut write) = tokio::io::split(a);
        let mut server = Connection::server(b, Options::default());
        write
            .write_all(
                b"GET /chat HTTP/1.1\r\nHost: server.example.com\r\nUpgrade: websocket\r\n\
                  Connection: keep-alive, Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  Sec-WebSocket-Version: 13\r\n\r\n",
            )
            .await
            .unwrap();
        let req = server.accept().await.unwrap();
        assert_eq!(req.target, "/chat");
        assert_eq!(server.state(), ConnectionState::Open);

        let mut buf = vec![0u8; 512];
        let n = read.read(&mut buf).await.unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);
        assert!(reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "{reply}");
        assert!(reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn test_accept_after_failure_is_invalid() {
        let (_a, b) = tokio::io::duplex(64);
        let mut server = Connection::server(b, Options::default());
        server.handshake_failed();
        assert!(matches!(
            server.accept().await,
            Err(ConnectionError::InvalidState(ConnectionState::Closed))
        ));
    }
}

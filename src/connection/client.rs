use std::collections::HashMap;
use std::fmt::Write as _;

use rand::rngs::StdRng;
use tokio::io::AsyncWriteExt;
use tokio_util::bytes::BytesMut;

use crate::codec::Role;
use crate::connection::{BoxedStream, Connection, WebSocketStream};
use crate::errors::{ConnectionError, HandshakeError};
use crate::handshake::{self, HandshakeResponse, SEC_WEBSOCKET_PROTOCOL};
use crate::options::Options;

impl Connection {
    /// Wrap an established byte stream as the client end of a connection.
    ///
    /// The connection stays `Connecting` until [`Connection::connect`] succeeds.
    pub fn client<S: WebSocketStream + 'static>(stream: S, options: Options) -> Self {
        Self::new(Role::Client, Box::new(stream), options)
    }

    /// Create a new builder that dials `uri` over TCP.
    ///
    /// The host in the URI is required. The port defaults to 80 and the path to "/".
    /// Only the "ws" scheme is accepted; TLS termination is left to the caller, who can
    /// wrap their own stream with [`Connection::client`].
    ///
    /// Do not accept user input directly for the URI to avoid injection attacks.
    pub fn builder(uri: http::Uri) -> ClientConnectionBuilder {
        ClientConnectionBuilder {
            uri,
            options: Options::default(),
            query_params: None,
            auth_header: None,
            cookies: None,
            origin: None,
        }
    }

    /// Run the client handshake for `path` on `host`.
    ///
    /// On success the connection is `Open` and the server's response is returned.
    /// On failure it is `Closed` and no frame is ever exchanged.
    /// # Errors
    /// Returns `InvalidState` if the handshake already ran, or the handshake failure.
    pub async fn connect(
        &mut self,
        host: &str,
        path: &str,
    ) -> Result<HandshakeResponse, ConnectionError> {
        self.connect_with(host, path, &[]).await
    }

    pub(crate) async fn connect_with(
        &mut self,
        host: &str,
        path: &str,
        extra_headers: &[(&str, String)],
    ) -> Result<HandshakeResponse, ConnectionError> {
        let (mut stream, mut rng) = self.take_handshake()?;
        let result = client_handshake(
            &mut stream,
            &mut rng,
            &self.options,
            host,
            path,
            extra_headers,
        )
        .await;
        match result {
            Ok((resp, rest)) => {
                tracing::debug!(%host, %path, leftover = rest.len(), "client handshake complete");
                let protocol = resp.protocol().map(str::to_owned);
                self.start(stream, rng, rest, protocol).await;
                Ok(resp)
            }
            Err(e) => {
                tracing::warn!(%host, %path, error = %e, "client handshake failed");
                let _ = stream.shutdown().await;
                self.handshake_failed();
                Err(e.into())
            }
        }
    }
}

async fn client_handshake(
    stream: &mut BoxedStream,
    rng: &mut StdRng,
    options: &Options,
    host: &str,
    path: &str,
    extra_headers: &[(&str, String)],
) -> Result<(HandshakeResponse, BytesMut), HandshakeError> {
    let mut req = handshake::build_request(host, path, rng)?;
    if !options.protocols.is_empty() {
        req.set_header(SEC_WEBSOCKET_PROTOCOL, &options.protocols.join(", "))?;
    }
    for (name, value) in extra_headers {
        req.set_header(name, value)?;
    }
    stream.write_all(&req.to_bytes()).await?;
    stream.flush().await?;

    let (head, rest) = handshake::read_head(stream, options.max_handshake_size).await?;
    let resp = HandshakeResponse::parse(&head)?;
    handshake::validate_response(&req, &resp)?;
    Ok((resp, rest))
}

/// Builder for creating a WebSocket client connection with optional parameters.
pub struct ClientConnectionBuilder {
    uri: http::Uri,
    options: Options,
    query_params: Option<HashMap<String, String>>,
    auth_header: Option<String>,
    cookies: Option<Vec<String>>,
    origin: Option<String>,
}

impl ClientConnectionBuilder {
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    /// Set query parameters to be included in the WebSocket handshake request.
    pub fn query_params<T>(mut self, params: T) -> Self
    where
        T: Into<HashMap<String, String>>,
    {
        self.query_params = Some(params.into());
        self
    }

    /// Add a single query parameter to be included in the WebSocket handshake request.
    ///
    /// Query parameters should not be URL-encoded; this method will handle encoding.
    pub fn add_query_param<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    /// Set the Authorization header for the WebSocket handshake request.
    ///
    /// It is the caller's responsibility to ensure the value is properly formatted (e.g., "Bearer <token>").
    /// Be cautious about logging or exposing this value, as it may contain sensitive information.
    pub fn auth_header<S: AsRef<str>>(mut self, value: S) -> Self {
        self.auth_header = Some(value.as_ref().to_string());
        self
    }

    #[must_use]
    /// Set cookies to be included in the WebSocket handshake request.
    pub fn cookies<T>(mut self, cookies: T) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
    {
        self.cookies = Some(cookies.into_iter().map(Into::into).collect());
        self
    }

    /// Add a single cookie to be included in the WebSocket handshake request.
    pub fn add_cookie<S: Into<String>>(&mut self, cookie: S) -> &mut Self {
        self.cookies.get_or_insert_with(Vec::new).push(cookie.into());
        self
    }

    #[must_use]
    /// Set the Origin header for the WebSocket handshake request.
    pub fn origin<S: AsRef<str>>(mut self, value: S) -> Self {
        self.origin = Some(value.as_ref().to_string());
        self
    }

    /// The request target: the URI path plus the encoded query parameters.
    fn target(&self) -> String {
        let mut target = self.uri.path().to_owned();
        if target.is_empty() {
            target.push('/');
        }
        let mut separator = match self.uri.query() {
            Some(query) => {
                target.push('?');
                target.push_str(query);
                '&'
            }
            None => '?',
        };
        if let Some(params) = &self.query_params {
            let mut params: Vec<_> = params.iter().collect();
            params.sort();
            for (k, v) in params {
                let _ = write!(
                    target,
                    "{separator}{}={}",
                    urlencoding::encode(k),
                    urlencoding::encode(v)
                );
                separator = '&';
            }
        }
        target
    }

    fn extra_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(auth) = &self.auth_header {
            headers.push(("Authorization", auth.clone()));
        }
        if let Some(cookies) = &self.cookies {
            headers.push(("Cookie", cookies.join("; ")));
        }
        if let Some(origin) = &self.origin {
            headers.push(("Origin", origin.clone()));
        }
        headers
    }

    /// Connect and return an open WebSocket connection using the configured options.
    ///
    /// # Errors
    /// Returns an error if the URI is unusable, the TCP connection fails, or the
    /// handshake is rejected.
    pub async fn connect(self) -> Result<Connection, ConnectionError> {
        match self.uri.scheme_str() {
            Some("ws") => {}
            Some(s) => {
                return Err(ConnectionError::InvalidUri(match s {
                    "wss" => "wss requires TLS termination, wrap the stream with Connection::client",
                    "http" => "http scheme is not supported for WebSocket",
                    "https" => "https scheme is not supported for WebSocket",
                    _ => "unsupported URI scheme for WebSocket",
                }));
            }
            None => return Err(ConnectionError::InvalidUri("missing URI scheme")),
        }
        let host = self
            .uri
            .host()
            .ok_or(ConnectionError::InvalidUri("missing host"))?;
        let port = self.uri.port_u16().unwrap_or(80);
        let host_header = match self.uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        let stream = tokio::net::TcpStream::connect((host, port))
            .await
            .map_err(ConnectionError::ConnectFailed)?;
        tracing::debug!(%host, port, "tcp connection established");

        let mut conn = Connection::client(stream, self.options.clone());
        conn.connect_with(&host_header, &self.target(), &self.extra_headers())
            .await?;
        Ok(conn)
    }
}

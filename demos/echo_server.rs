//! An echo server that owns its own listener and hands each accepted stream to a
//! server-side `Connection`.
//!
//! Run with `cargo run --example echo_server -- 127.0.0.1:8080`.

use probe_websocket::{Connection, ConnectionError, Event, Options};
use tokio::net::{TcpListener, TcpStream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_owned());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = serve(stream).await {
                tracing::warn!(%peer, error = %e, "connection ended with an error");
            }
        });
    }
}

async fn serve(stream: TcpStream) -> Result<(), ConnectionError> {
    let mut conn = Connection::server(stream, Options::default().with_protocol("echo"));
    let req = conn.accept().await?;
    tracing::info!(path = %req.target, protocol = ?conn.protocol(), "client connected");

    loop {
        match conn.receive().await {
            Ok(Event::Message(msg)) => conn.send(msg).await?,
            Ok(Event::Ping(payload)) => tracing::debug!(len = payload.len(), "ping"),
            Ok(Event::Pong(_)) => {}
            Ok(Event::Close(status)) => {
                tracing::info!(?status, "client closed the connection");
                return Ok(());
            }
            Err(ConnectionError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

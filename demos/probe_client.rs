//! Connects to an echo server, checks the echo, and reports ping latency.
//!
//! Run with `cargo run --example probe_client -- ws://localhost:8080/ws`.

use probe_websocket::{CloseCode, Connection, Event, Message, Options};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let uri: http::Uri = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:8080/ws".to_owned())
        .parse()?;
    let mut conn = Connection::builder(uri)
        .options(Options::default().with_protocol("echo"))
        .connect()
        .await?;
    println!("connected, protocol {:?}", conn.protocol());

    for text in ["Hello, WebSocket!", "Testing after ping"] {
        conn.send_text(text).await?;
        let reply = echo(&mut conn).await?;
        println!("echo: {reply:?}");

        let latency = conn.ping("probe").await?.await?;
        println!("pong after {latency:?}");
    }

    for i in 1..=3u8 {
        let latency = conn.ping(vec![i]).await?.await?;
        println!("ping {i}: {latency:?}");
    }

    conn.close(CloseCode::NormalClosure, "probe done").await?;
    let status = conn.drain().await?;
    println!("closed, server replied {status:?}");
    Ok(())
}

/// Wait for the next data message, skipping control events.
async fn echo(conn: &mut Connection) -> Result<Message, Box<dyn std::error::Error>> {
    loop {
        match conn.receive().await? {
            Event::Message(msg) => return Ok(msg),
            Event::Close(status) => return Err(format!("server closed: {status:?}").into()),
            Event::Ping(_) | Event::Pong(_) => {}
        }
    }
}

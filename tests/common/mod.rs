#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use ptycast::api::{self, AppState};
use ptycast::codec::Compression;
use ptycast::config::Config;

pub const TOKEN: &str = "test-token";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Config for tests: short TTL so cleanup tests finish quickly.
pub fn test_config(compression: Compression) -> Config {
    Config {
        token: TOKEN.into(),
        compression,
        session_ttl: Duration::from_millis(300),
        ..Config::default()
    }
}

/// Serve the relay on an ephemeral port and return its address and state.
pub async fn spawn_relay(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config);
    let app = api::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, state)
}

pub async fn connect_runner(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/runner?token={TOKEN}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    stream
}

pub async fn connect_viewer(addr: SocketAddr, id: &str) -> WsStream {
    let url = format!("ws://{addr}/ws?id={id}&token={TOKEN}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    stream
}

/// Receive the next message within a deadline.
pub async fn recv(ws: &mut WsStream) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for message")
        .expect("stream ended unexpectedly")
        .expect("websocket error")
}

/// Receive the next text message and parse it as JSON.
pub async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    match recv(ws).await {
        Message::Text(text) => serde_json::from_str(&text).expect("invalid JSON"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// Receive the next binary message.
pub async fn recv_binary(ws: &mut WsStream) -> Vec<u8> {
    match recv(ws).await {
        Message::Binary(data) => data,
        other => panic!("expected binary frame, got {other:?}"),
    }
}

/// Open a runner connection and return it plus its session id.
pub async fn runner_with_session(addr: SocketAddr) -> (WsStream, String) {
    let mut runner = connect_runner(addr).await;
    let hello = recv_json(&mut runner).await;
    assert_eq!(hello["type"], "session");
    let id = hello["id"].as_str().unwrap().to_string();
    (runner, id)
}

/// Drain a freshly joined viewer's compression / snapshot / ready
/// sequence (and the viewer-count notice that follows it), returning the
/// decoded snapshot bytes.
pub async fn drain_join_sequence(ws: &mut WsStream, compression: Compression) -> Vec<u8> {
    let announce = recv_json(ws).await;
    assert_eq!(announce["type"], "compression");

    let framed = recv_binary(ws).await;
    let codec = ptycast::codec::Codec::new(compression);
    let snapshot = codec.decompress_from_buffer(&framed).unwrap();

    let ready = recv_json(ws).await;
    assert_eq!(ready["type"], "ready");

    let viewers = recv_json(ws).await;
    assert_eq!(viewers["type"], "viewers");
    snapshot
}

/// Receive the next binary frame, skipping interleaved control text
/// (viewer-count notices and the like).
pub async fn recv_binary_skipping_text(ws: &mut WsStream) -> Vec<u8> {
    loop {
        match recv(ws).await {
            Message::Binary(data) => return data,
            Message::Text(_) => continue,
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
}

//! End-to-end relay tests over real WebSocket connections.

mod common;

use futures::SinkExt;
use tokio_tungstenite::tungstenite::{self, Message};

use common::*;
use ptycast::codec::{Codec, Compression};
use ptycast::framebuffer::Framebuffer;

#[tokio::test(flavor = "multi_thread")]
async fn runner_gets_session_frame_with_three_word_id() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    assert_eq!(id.split('-').count(), 3);

    let _ = runner.close(None).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn runner_session_frame_announces_codec() {
    let (addr, _state) = spawn_relay(test_config(Compression::Smaz)).await;
    let mut runner = connect_runner(addr).await;
    let hello = recv_json(&mut runner).await;
    assert_eq!(hello["type"], "session");
    assert_eq!(hello["compression"], "smaz");
}

#[tokio::test(flavor = "multi_thread")]
async fn requested_session_id_is_reused() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let url = format!("ws://{addr}/runner?token={TOKEN}&id=pre-printed-id");
    let (mut runner, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let hello = recv_json(&mut runner).await;
    assert_eq!(hello["id"], "pre-printed-id");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_token_rejected_with_401() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/runner"))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_token_rejected_with_401() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?id=x&token=nope"))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_session_closed_with_4004() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let mut viewer = connect_viewer(addr, "no-such-session").await;
    match recv(&mut viewer).await {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 4004);
            assert_eq!(frame.reason, "Session not found");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn second_runner_on_same_session_refused() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let (_runner, id) = runner_with_session(addr).await;

    let url = format!("ws://{addr}/runner?token={TOKEN}&id={id}");
    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    match recv(&mut second).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4009),
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn join_flow_for(compression: Compression) {
    let (addr, _state) = spawn_relay(test_config(compression)).await;
    let codec = Codec::new(compression);
    let (mut runner, id) = runner_with_session(addr).await;

    // Runner streams a frame before anyone watches.
    let payload = codec.compress(b"hello").unwrap();
    runner.send(Message::Binary(payload)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Joiner sees codec announcement, snapshot, ready -- in that order.
    let mut viewer = connect_viewer(addr, &id).await;
    let snapshot = drain_join_sequence(&mut viewer, compression).await;

    // The snapshot replays to a screen with "hello" at the origin.
    let mut fb = Framebuffer::default();
    fb.write(&snapshot);
    assert_eq!(&fb.row_text(0)[..5], "hello");
    assert_eq!(fb.cursor(), (5, 0, true));

    // Live frames arrive as the exact bytes the runner sent.
    let live = codec.compress(b" world").unwrap();
    runner.send(Message::Binary(live.clone())).await.unwrap();
    let received = recv_binary_skipping_text(&mut viewer).await;
    assert_eq!(received, live);
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_join_flow_none() {
    join_flow_for(Compression::None).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_join_flow_zstd() {
    join_flow_for(Compression::Zstd).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_join_flow_smaz() {
    join_flow_for(Compression::Smaz).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_join_flow_deflate() {
    join_flow_for(Compression::Deflate).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_frames_are_padded_under_zstd() {
    let (addr, _state) = spawn_relay(test_config(Compression::Zstd)).await;
    let (_runner, id) = runner_with_session(addr).await;

    let mut viewer = connect_viewer(addr, &id).await;
    let announce = recv_json(&mut viewer).await;
    assert_eq!(announce["type"], "compression");
    let framed = recv_binary(&mut viewer).await;

    let pad_len = u16::from_be_bytes([framed[0], framed[1]]) as usize;
    assert!((16..128).contains(&pad_len), "pad length {pad_len}");
    assert!(framed.len() > 2 + pad_len);
}

#[tokio::test(flavor = "multi_thread")]
async fn frames_fan_out_to_multiple_viewers_in_order() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;

    let mut viewer_a = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer_a, Compression::None).await;
    let mut viewer_b = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer_b, Compression::None).await;

    for i in 0..5u8 {
        runner.send(Message::Binary(vec![i; 4])).await.unwrap();
    }
    for viewer in [&mut viewer_a, &mut viewer_b] {
        for i in 0..5u8 {
            let frame = recv_binary_skipping_text(viewer).await;
            assert_eq!(frame, vec![i; 4], "frame order broken");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_keystrokes_reach_runner_unchanged() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::None).await;

    viewer
        .send(Message::Binary(b"ls -la\r".to_vec()))
        .await
        .unwrap();

    loop {
        match recv(&mut runner).await {
            Message::Binary(data) => {
                assert_eq!(data, b"ls -la\r");
                break;
            }
            Message::Text(_) => continue, // viewer-count notices
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn resize_applies_to_framebuffer_and_forwards() {
    let (addr, state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::None).await;

    runner
        .send(Message::Text(
            r#"{"type":"resize","cols":100,"rows":30}"#.into(),
        ))
        .await
        .unwrap();

    // Forwarded verbatim to the viewer.
    loop {
        match recv(&mut viewer).await {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                if json["type"] == "resize" {
                    assert_eq!(json["cols"], 100);
                    assert_eq!(json["rows"], 30);
                    break;
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // Applied to the relay-side framebuffer.
    let session = state.sessions.get(&id).unwrap();
    assert_eq!(session.screen_size(), (100, 30));
}

#[tokio::test(flavor = "multi_thread")]
async fn exit_message_marks_session_exited_and_forwards() {
    let (addr, state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::None).await;

    runner
        .send(Message::Text(r#"{"type":"exit","code":0}"#.into()))
        .await
        .unwrap();

    loop {
        match recv(&mut viewer).await {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                if json["type"] == "exit" {
                    break;
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    let session = state.sessions.get(&id).unwrap();
    assert!(session.is_exited());
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_json_from_runner_still_forwards() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::None).await;

    runner
        .send(Message::Text("{not json at all".into()))
        .await
        .unwrap();

    loop {
        match recv(&mut viewer).await {
            Message::Text(text) => {
                if text == "{not json at all" {
                    break;
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_binary_frame_is_dropped_entirely() {
    let (addr, state) = spawn_relay(test_config(Compression::Zstd)).await;
    let codec = Codec::new(Compression::Zstd);
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::Zstd).await;

    // Garbage that zstd cannot decode, then a valid frame.
    runner
        .send(Message::Binary(b"not zstd".to_vec()))
        .await
        .unwrap();
    let good = codec.compress(b"after").unwrap();
    runner.send(Message::Binary(good.clone())).await.unwrap();

    // The viewer sees only the valid frame.
    let received = recv_binary_skipping_text(&mut viewer).await;
    assert_eq!(received, good);

    // And the framebuffer only absorbed the valid frame.
    let session = state.sessions.get(&id).unwrap();
    let mut fb = Framebuffer::default();
    fb.write(session.serialize_screen().as_bytes());
    assert_eq!(&fb.row_text(0)[..5], "after");
}

#[tokio::test(flavor = "multi_thread")]
async fn late_joiner_snapshot_includes_every_prior_frame() {
    let (addr, _state) = spawn_relay(test_config(Compression::Zstd)).await;
    let codec = Codec::new(Compression::Zstd);
    let (mut runner, id) = runner_with_session(addr).await;

    for chunk in ["one ", "two ", "three"] {
        let frame = codec.compress(chunk.as_bytes()).unwrap();
        runner.send(Message::Binary(frame)).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let mut viewer = connect_viewer(addr, &id).await;
    let snapshot = drain_join_sequence(&mut viewer, Compression::Zstd).await;
    let mut fb = Framebuffer::default();
    fb.write(&snapshot);
    assert_eq!(fb.row_text(0).trim_end(), "one two three");
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_live_sockets_with_normal_close_frame() {
    let (addr, state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::None).await;

    state.shutdown.shutdown();

    for ws in [&mut runner, &mut viewer] {
        loop {
            match recv(ws).await {
                Message::Close(Some(frame)) => {
                    assert_eq!(u16::from(frame.code), 1000);
                    assert_eq!(frame.reason, "server shutting down");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => continue,
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    // Once both handlers have exited, the drain wait completes.
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.shutdown.wait_for_all_closed(),
    )
    .await
    .expect("all connections should drain after shutdown");
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_count_notices_reach_runner() {
    let (addr, _state) = spawn_relay(test_config(Compression::None)).await;
    let (mut runner, id) = runner_with_session(addr).await;
    let mut viewer = connect_viewer(addr, &id).await;
    drain_join_sequence(&mut viewer, Compression::None).await;

    loop {
        match recv(&mut runner).await {
            Message::Text(text) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                if json["type"] == "viewers" {
                    assert_eq!(json["count"], 1);
                    break;
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

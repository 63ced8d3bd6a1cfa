//! The two WebSocket endpoints and their routing loops.
//!
//! `/runner` hosts the PTY side: its binary frames are decompressed into
//! the session framebuffer and fanned out (still compressed) to every
//! viewer; its JSON text frames are interpreted for `exit`/`resize` and
//! forwarded verbatim. `/ws` hosts viewers: on join they receive the
//! codec announcement, a padded snapshot, and a `ready` marker, then the
//! live stream. Viewer frames flow back to the runner unchanged.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::protocol::{ControlMessage, Frame};
use crate::session::JoinError;

use super::auth;
use super::error::ApiError;
use super::AppState;

/// Viewer join to an id with no session.
const CLOSE_SESSION_NOT_FOUND: u16 = 4004;
/// Viewer join past the per-session cap.
const CLOSE_SESSION_FULL: u16 = 4005;
/// Viewer queue overflowed; the relay gave up on it.
const CLOSE_VIEWER_TOO_SLOW: u16 = 4008;
/// A second runner tried to claim an occupied session.
const CLOSE_RUNNER_CONFLICT: u16 = 4009;

#[derive(Deserialize)]
pub(super) struct RunnerParams {
    token: Option<String>,
    id: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct ViewerParams {
    token: Option<String>,
    id: Option<String>,
}

pub(super) async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "viewers": state.sessions.total_viewers(),
    }))
}

// ── Runner ───────────────────────────────────────────────────────────

pub(super) async fn runner_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<RunnerParams>,
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    if let Err(e) = auth::check_token(&state.config.token, params.token.as_deref(), peer, "/runner")
    {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| handle_runner(socket, state, params.id))
}

async fn handle_runner(socket: WebSocket, state: AppState, requested_id: Option<String>) {
    let (_guard, mut shutdown_rx) = state.shutdown.register();
    let session = state.sessions.create(requested_id);
    let Some(mut from_viewers) = session.attach_runner() else {
        close_with(socket, CLOSE_RUNNER_CONFLICT, "Session already has a runner").await;
        return;
    };
    tracing::info!(session = %session.id, "runner connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let hello = ControlMessage::Session {
        id: session.id.clone(),
        compression: state.codec.mode(),
    };
    if ws_tx.send(Message::Text(hello.to_json())).await.is_err() {
        session.detach_runner();
        session.schedule_cleanup_if_idle(&state.sessions, state.config.session_ttl);
        return;
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ControlMessage>(&text) {
                        Ok(ControlMessage::Exit { code }) => {
                            tracing::debug!(session = %session.id, code, "runner reported exit");
                            session.mark_exited();
                        }
                        Ok(ControlMessage::Resize { cols, rows }) => {
                            session.resize(cols, rows);
                        }
                        // Other shapes (and unparseable text) are not the
                        // relay's business; forwarding below still happens.
                        _ => {}
                    }
                    session.fanout(Frame::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    match state.codec.decompress(&data) {
                        Ok(raw) => {
                            state.stats.record_in(data.len(), raw.len());
                            // Framebuffer first, fan-out second: a viewer
                            // joining between the two sees a snapshot that
                            // already includes this frame, never a gap.
                            session.apply_output(&raw);
                            let reached = session.fanout(Frame::Binary(Bytes::from(data)));
                            tracing::trace!(session = %session.id, reached, "frame fanned out");
                        }
                        Err(e) => {
                            state.stats.record_dropped();
                            tracing::warn!(session = %session.id, error = %e, "dropping undecodable frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong handled by the transport
                Some(Err(e)) => {
                    tracing::debug!(session = %session.id, error = %e, "runner socket error");
                    break;
                }
            },
            frame = from_viewers.recv() => match frame {
                Some(frame) => {
                    if ws_tx.send(to_message(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!(session = %session.id, "closing runner for shutdown");
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "server shutting down".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    }

    session.detach_runner();
    session.broadcast_viewer_count();
    session.schedule_cleanup_if_idle(&state.sessions, state.config.session_ttl);
    tracing::info!(session = %session.id, "runner disconnected");
}

// ── Viewer ───────────────────────────────────────────────────────────

pub(super) async fn viewer_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<ViewerParams>,
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    if let Err(e) = auth::check_token(&state.config.token, params.token.as_deref(), peer, "/ws") {
        return e.into_response();
    }
    let Some(id) = params.id else {
        tracing::warn!(peer = ?peer, "rejected viewer: missing session id");
        return ApiError::MissingSessionId.into_response();
    };
    ws.on_upgrade(move |socket| handle_viewer(socket, state, id))
}

async fn handle_viewer(socket: WebSocket, state: AppState, id: String) {
    let (_guard, mut shutdown_rx) = state.shutdown.register();
    let Some(session) = state.sessions.get(&id) else {
        tracing::warn!(session = %id, "rejected viewer: unknown session");
        close_with(socket, CLOSE_SESSION_NOT_FOUND, "Session not found").await;
        return;
    };

    let mut joined = match session.join_viewer(state.codec, state.config.max_viewers) {
        Ok(joined) => joined,
        Err(JoinError::Full) => {
            close_with(socket, CLOSE_SESSION_FULL, "Session full").await;
            return;
        }
        Err(JoinError::Snapshot(e)) => {
            tracing::error!(session = %session.id, error = %e, "snapshot build failed");
            close_with(socket, 1011, "Snapshot failed").await;
            return;
        }
    };
    tracing::info!(session = %session.id, viewer = joined.id, "viewer joined");
    session.broadcast_viewer_count();

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut dropped_for_lag = false;

    loop {
        tokio::select! {
            frame = joined.rx.recv() => match frame {
                Some(frame) => {
                    let len = frame.len();
                    if ws_tx.send(to_message(frame)).await.is_err() {
                        break;
                    }
                    state.stats.record_out(len);
                }
                // The session dropped our sender: the queue overflowed.
                None => {
                    dropped_for_lag = true;
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    session.send_to_runner(Frame::Binary(Bytes::from(data)));
                }
                Some(Ok(Message::Text(text))) => {
                    session.send_to_runner(Frame::Text(text));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session = %session.id, viewer = joined.id, error = %e, "viewer socket error");
                    break;
                }
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!(session = %session.id, viewer = joined.id, "closing viewer for shutdown");
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "server shutting down".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    }

    if dropped_for_lag {
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_VIEWER_TOO_SLOW,
                reason: "Viewer too slow".into(),
            })))
            .await;
    }

    session.leave_viewer(joined.id);
    session.broadcast_viewer_count();
    session.schedule_cleanup_if_idle(&state.sessions, state.config.session_ttl);
    tracing::info!(session = %session.id, viewer = joined.id, "viewer left");
}

// ── Shared plumbing ──────────────────────────────────────────────────

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes.to_vec()),
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

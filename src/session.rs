//! Session state and the registry that multiplexes them.
//!
//! A session binds one runner connection, any number of viewer
//! connections, and one framebuffer. Connection handlers never hold
//! references to each other: each side owns a bounded mpsc receiver, the
//! session holds the matching senders, and frames move through those
//! queues. All per-session state sits behind one mutex so a framebuffer
//! update and the fan-out that follows it are a single logical step.
//!
//! A slow viewer never stalls the runner: fan-out uses `try_send`, and a
//! viewer whose queue overflows is dropped from the session. Its handler
//! notices the closed queue and closes the socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::codec::{Codec, CodecError};
use crate::framebuffer::Framebuffer;
use crate::names;
use crate::protocol::{ControlMessage, Frame};

/// Outbound queue depth per viewer; overflow drops the viewer.
const VIEWER_QUEUE: usize = 256;
/// Outbound queue depth toward the runner (viewer keystrokes).
const RUNNER_QUEUE: usize = 256;

#[derive(Debug)]
pub enum JoinError {
    /// The session is at its viewer cap.
    Full,
    /// Building the snapshot frame failed.
    Snapshot(CodecError),
}

/// A joined viewer: its slot id and the receive side of its queue. The
/// queue is pre-loaded with the `compression` message, the padded
/// snapshot, and the `ready` marker, in that order.
pub struct JoinedViewer {
    pub id: u64,
    pub rx: mpsc::Receiver<Frame>,
}

struct SessionState {
    framebuffer: Framebuffer,
    runner: Option<mpsc::Sender<Frame>>,
    viewers: HashMap<u64, mpsc::Sender<Frame>>,
    next_viewer: u64,
    exited: bool,
    cleanup: Option<AbortHandle>,
}

#[derive(Clone)]
pub struct Session {
    pub id: String,
    state: Arc<Mutex<SessionState>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(SessionState {
                framebuffer: Framebuffer::default(),
                runner: None,
                viewers: HashMap::new(),
                next_viewer: 0,
                exited: false,
                cleanup: None,
            })),
        }
    }

    // ── Runner side ──────────────────────────────────────────────────

    /// Claim the runner slot. Returns the queue of frames bound for the
    /// runner, or `None` if another runner already holds the session.
    pub fn attach_runner(&self) -> Option<mpsc::Receiver<Frame>> {
        let mut state = self.state.lock();
        if state.runner.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::channel(RUNNER_QUEUE);
        state.runner = Some(tx);
        state.exited = false;
        if let Some(handle) = state.cleanup.take() {
            handle.abort();
        }
        Some(rx)
    }

    /// The runner connection went away.
    pub fn detach_runner(&self) {
        let mut state = self.state.lock();
        state.runner = None;
        state.exited = true;
    }

    /// The runner reported `{type:"exit"}`.
    pub fn mark_exited(&self) {
        self.state.lock().exited = true;
    }

    pub fn has_runner(&self) -> bool {
        self.state.lock().runner.is_some()
    }

    pub fn is_exited(&self) -> bool {
        self.state.lock().exited
    }

    /// Queue a frame toward the runner. Returns false when no runner is
    /// connected or its queue is full.
    pub fn send_to_runner(&self, frame: Frame) -> bool {
        let state = self.state.lock();
        match &state.runner {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Feed decompressed runner output to the framebuffer.
    pub fn apply_output(&self, bytes: &[u8]) {
        self.state.lock().framebuffer.write(bytes);
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        self.state
            .lock()
            .framebuffer
            .resize(cols as usize, rows as usize);
    }

    pub fn screen_size(&self) -> (usize, usize) {
        self.state.lock().framebuffer.size()
    }

    /// Serialize the current screen (test and snapshot plumbing).
    pub fn serialize_screen(&self) -> String {
        self.state.lock().framebuffer.serialize()
    }

    // ── Viewer side ──────────────────────────────────────────────────

    /// Add a viewer and hand back its frame queue, pre-loaded with the
    /// join sequence. Holding the state lock across the snapshot keeps
    /// the queue ordered relative to live frames.
    pub fn join_viewer(&self, codec: Codec, max_viewers: usize) -> Result<JoinedViewer, JoinError> {
        let mut state = self.state.lock();
        if state.viewers.len() >= max_viewers {
            return Err(JoinError::Full);
        }

        let snapshot = state.framebuffer.serialize();
        let framed = codec
            .compress_for_replay(snapshot.as_bytes())
            .map_err(JoinError::Snapshot)?;

        let (tx, rx) = mpsc::channel(VIEWER_QUEUE);
        // Capacity is far above three; these sends cannot fail.
        let _ = tx.try_send(Frame::control(&ControlMessage::Compression {
            mode: codec.mode(),
        }));
        let _ = tx.try_send(Frame::Binary(Bytes::from(framed)));
        let _ = tx.try_send(Frame::control(&ControlMessage::Ready));

        let id = state.next_viewer;
        state.next_viewer += 1;
        state.viewers.insert(id, tx);

        if let Some(handle) = state.cleanup.take() {
            handle.abort();
        }
        Ok(JoinedViewer { id, rx })
    }

    pub fn leave_viewer(&self, id: u64) {
        self.state.lock().viewers.remove(&id);
    }

    pub fn viewer_count(&self) -> usize {
        self.state.lock().viewers.len()
    }

    /// Queue a frame to every viewer. Viewers with full or closed queues
    /// are removed; their handlers observe the closed queue and hang up.
    /// Returns the number of viewers reached.
    pub fn fanout(&self, frame: Frame) -> usize {
        let mut state = self.state.lock();
        let mut dropped: Vec<u64> = Vec::new();
        for (&id, tx) in &state.viewers {
            if tx.try_send(frame.clone()).is_err() {
                dropped.push(id);
            }
        }
        for id in &dropped {
            state.viewers.remove(id);
            tracing::warn!(session = %self.id, viewer = id, "dropping slow viewer");
        }
        state.viewers.len()
    }

    /// Tell the runner and every viewer how many viewers are connected.
    pub fn broadcast_viewer_count(&self) {
        let count = self.viewer_count();
        let frame = Frame::control(&ControlMessage::Viewers { count });
        self.send_to_runner(frame.clone());
        self.fanout(frame);
    }

    // ── Cleanup ──────────────────────────────────────────────────────

    /// Exited with nobody watching.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.exited && state.viewers.is_empty() && state.runner.is_none()
    }

    /// Arm the deletion timer if the session is idle and none is pending.
    /// The timer is disarmed by a viewer joining or a runner reattaching
    /// under a pre-printed id.
    pub fn schedule_cleanup_if_idle(&self, registry: &SessionRegistry, ttl: Duration) {
        let mut state = self.state.lock();
        if !(state.exited && state.viewers.is_empty() && state.runner.is_none()) {
            return;
        }
        if state.cleanup.is_some() {
            return;
        }
        let registry = registry.clone();
        let id = self.id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if registry.remove_if_idle(&id) {
                tracing::info!(session = %id, "idle session removed");
            }
        });
        state.cleanup = Some(handle.abort_handle());
    }
}

/// All live sessions, keyed by id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch-or-create the session a runner asked for. A requested id is
    /// reused (integrated mode pre-prints URLs); otherwise a fresh
    /// three-word id is generated, with a bounded retry against the
    /// registry and a suffix fallback so creation cannot spin under the
    /// write lock as the id space fills up.
    pub fn create(&self, requested_id: Option<String>) -> Session {
        let mut map = self.inner.write();
        let id = match requested_id {
            Some(id) => id,
            None => names::generate_unique_session_id(|candidate| map.contains_key(candidate)),
        };
        map.entry(id.clone())
            .or_insert_with(|| Session::new(id))
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().get(id).cloned()
    }

    /// Remove the session only if it is still idle; a viewer that joined
    /// after the timer fired keeps it alive.
    pub fn remove_if_idle(&self, id: &str) -> bool {
        let mut map = self.inner.write();
        let idle = map.get(id).map(|s| s.is_idle()).unwrap_or(false);
        if idle {
            map.remove(id);
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Viewer connections across all sessions.
    pub fn total_viewers(&self) -> usize {
        self.inner.read().values().map(|s| s.viewer_count()).sum()
    }
}

//! WebSocket control protocol.
//!
//! Text frames carry one JSON object tagged by a `type` field; binary
//! frames carry opaque (possibly compressed) terminal bytes. Unknown
//! `type` tags fail to parse and are ignored by the relay, which still
//! forwards the raw text where routing calls for it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::Compression;

/// The JSON control messages exchanged over text frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// First frame from relay to a runner after upgrade.
    Session { id: String, compression: Compression },
    /// Runner's terminal changed size; applied to the framebuffer and
    /// forwarded to viewers.
    Resize { cols: u16, rows: u16 },
    /// Runner's child exited; the session enters cleanup semantics.
    Exit {
        #[serde(default)]
        code: i32,
    },
    /// First frame from relay to a viewer: the codec in effect.
    Compression { mode: Compression },
    /// Snapshot finished; live frames follow.
    Ready,
    /// Current viewer count for a session, sent on join and leave.
    Viewers { count: usize },
}

impl ControlMessage {
    /// The message as a JSON text frame body.
    pub fn to_json(&self) -> String {
        // Serialization of these shapes cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One outbound WebSocket frame, decoupled from the transport types so
/// sessions can queue frames without touching axum.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn control(msg: &ControlMessage) -> Self {
        Frame::Text(msg.to_json())
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

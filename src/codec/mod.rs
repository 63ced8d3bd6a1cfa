//! Binary frame compression.
//!
//! The relay announces one [`Compression`] mode per process to every runner
//! and viewer. Live runner frames are compressed by the runner and pass
//! through the relay untouched; the relay only decompresses its own copy to
//! feed the framebuffer. Snapshot frames sent to joining viewers get the
//! padded replay framing `[u16 BE padLen][padLen random bytes][payload]` so
//! their size cannot be used as an oracle for screen contents
//! (BREACH/CRIME-style probing). Padding lengths and bytes come from the
//! operating system RNG, not a seeded generator.

pub mod smaz;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inclusive lower bound of the per-frame padding length.
pub const MIN_PAD: usize = 16;
/// Exclusive upper bound of the per-frame padding length.
pub const MAX_PAD: usize = 128;

const ZSTD_LEVEL: i32 = 3;

/// Frame codec selected at startup and announced in the `session` /
/// `compression` control messages.
///
/// `deflate` has no application-level framing: the transport's
/// per-message-deflate extension does the work and the codec passes bytes
/// through.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Zstd,
    #[default]
    Deflate,
    Smaz,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::None => "none",
            Compression::Zstd => "zstd",
            Compression::Deflate => "deflate",
            Compression::Smaz => "smaz",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("zstd: {0}")]
    Zstd(#[from] std::io::Error),

    #[error("smaz: {0}")]
    Smaz(#[from] smaz::SmazError),

    #[error("replay frame shorter than its declared padding")]
    Truncated,
}

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    mode: Compression,
}

impl Codec {
    pub fn new(mode: Compression) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Compression {
        self.mode
    }

    /// Compress one live frame. Identity under `none` and `deflate`.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.mode {
            Compression::None | Compression::Deflate => Ok(data.to_vec()),
            Compression::Zstd => Ok(zstd::stream::encode_all(data, ZSTD_LEVEL)?),
            Compression::Smaz => Ok(smaz::compress(data)),
        }
    }

    /// Decompress one live frame. Identity under `none` and `deflate`.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.mode {
            Compression::None | Compression::Deflate => Ok(data.to_vec()),
            Compression::Zstd => Ok(zstd::stream::decode_all(data)?),
            Compression::Smaz => Ok(smaz::decompress(data)?),
        }
    }

    /// Build a snapshot frame: compressed payload behind random padding.
    /// Under `none`/`deflate` the raw bytes go out unframed.
    pub fn compress_for_replay(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.mode {
            Compression::None | Compression::Deflate => Ok(data.to_vec()),
            Compression::Zstd | Compression::Smaz => {
                let payload = self.compress(data)?;
                Ok(pad_frame(&payload))
            }
        }
    }

    /// Invert [`Codec::compress_for_replay`].
    pub fn decompress_from_buffer(&self, frame: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.mode {
            Compression::None | Compression::Deflate => Ok(frame.to_vec()),
            Compression::Zstd | Compression::Smaz => self.decompress(unpad_frame(frame)?),
        }
    }
}

fn pad_frame(payload: &[u8]) -> Vec<u8> {
    let pad_len = OsRng.gen_range(MIN_PAD..MAX_PAD);
    let mut pad = vec![0u8; pad_len];
    OsRng.fill_bytes(&mut pad);

    let mut out = Vec::with_capacity(2 + pad_len + payload.len());
    out.extend_from_slice(&(pad_len as u16).to_be_bytes());
    out.extend_from_slice(&pad);
    out.extend_from_slice(payload);
    out
}

fn unpad_frame(frame: &[u8]) -> Result<&[u8], CodecError> {
    if frame.len() < 2 {
        return Err(CodecError::Truncated);
    }
    let pad_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    frame.get(2 + pad_len..).ok_or(CodecError::Truncated)
}

//! Throughput accounting.
//!
//! Totals are atomics so connection handlers can record without
//! contention; the rolling window behind rate figures is a deque of
//! timestamped samples pruned lazily on every record and snapshot.
//! "in" is the runner-to-relay direction, "out" is frames delivered to
//! viewers. Raw (decompressed) input sizes are kept alongside wire sizes
//! so the log line can report compression ratios.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How much history feeds the rate figures.
const WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    wire_in: u64,
    raw_in: u64,
    out: u64,
}

#[derive(Clone, Default)]
pub struct StatsTracker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    raw_bytes_in: AtomicU64,
    window: Mutex<VecDeque<Sample>>,
}

/// Point-in-time view of the tracker, produced for the periodic log line.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub frames_in: u64,
    pub frames_out: u64,
    pub frames_dropped: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Bytes per second over the window, per direction.
    pub in_rate: u64,
    pub out_rate: u64,
    /// Frames per second over the window, per direction.
    pub in_fps: f64,
    pub out_fps: f64,
    /// Decompressed/wire ratio over the window and over the lifetime.
    pub window_ratio: f64,
    pub lifetime_ratio: f64,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one runner frame: its wire size and its decompressed size.
    pub fn record_in(&self, wire: usize, raw: usize) {
        self.inner.frames_in.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_in.fetch_add(wire as u64, Ordering::Relaxed);
        self.inner
            .raw_bytes_in
            .fetch_add(raw as u64, Ordering::Relaxed);
        self.push_sample(Sample {
            at: Instant::now(),
            wire_in: wire as u64,
            raw_in: raw as u64,
            out: 0,
        });
    }

    /// Record one frame delivered to a viewer.
    pub fn record_out(&self, bytes: usize) {
        self.inner.frames_out.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_out
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.push_sample(Sample {
            at: Instant::now(),
            wire_in: 0,
            raw_in: 0,
            out: bytes as u64,
        });
    }

    /// Record a runner frame discarded because it failed to decompress.
    pub fn record_dropped(&self) {
        self.inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn push_sample(&self, sample: Sample) {
        let mut window = self.inner.window.lock();
        window.push_back(sample);
        prune(&mut window, sample.at);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let (mut wire_in, mut raw_in, mut out) = (0u64, 0u64, 0u64);
        let (mut in_frames, mut out_frames) = (0u64, 0u64);
        {
            let mut window = self.inner.window.lock();
            prune(&mut window, now);
            for s in window.iter() {
                wire_in += s.wire_in;
                raw_in += s.raw_in;
                out += s.out;
                if s.wire_in > 0 {
                    in_frames += 1;
                }
                if s.out > 0 {
                    out_frames += 1;
                }
            }
        }

        let secs = WINDOW.as_secs_f64();
        let bytes_in = self.inner.bytes_in.load(Ordering::Relaxed);
        let raw_bytes_in = self.inner.raw_bytes_in.load(Ordering::Relaxed);

        StatsSnapshot {
            frames_in: self.inner.frames_in.load(Ordering::Relaxed),
            frames_out: self.inner.frames_out.load(Ordering::Relaxed),
            frames_dropped: self.inner.frames_dropped.load(Ordering::Relaxed),
            bytes_in,
            bytes_out: self.inner.bytes_out.load(Ordering::Relaxed),
            in_rate: (wire_in as f64 / secs) as u64,
            out_rate: (out as f64 / secs) as u64,
            in_fps: in_frames as f64 / secs,
            out_fps: out_frames as f64 / secs,
            window_ratio: ratio(raw_in, wire_in),
            lifetime_ratio: ratio(raw_bytes_in, bytes_in),
        }
    }
}

fn prune(window: &mut VecDeque<Sample>, now: Instant) {
    while let Some(front) = window.front() {
        if now.duration_since(front.at) > WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn ratio(raw: u64, wire: u64) -> f64 {
    if wire == 0 {
        1.0
    } else {
        raw as f64 / wire as f64
    }
}

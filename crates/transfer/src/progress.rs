use std::panic::{AssertUnwindSafe, catch_unwind};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// Snapshot emitted after every acknowledged chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProgress {
    /// `completed_chunks / total_chunks * 100`, computed from chunk counts.
    pub percentage: f64,
    /// Index of the chunk just acknowledged.
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Sliding-window throughput; 0.0 until two samples exist.
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
}

impl ChunkProgress {
    /// Whether this snapshot reports the final chunk.
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == self.total_chunks
    }
}

/// Receives progress synchronously after each acknowledged chunk.
///
/// Implementations must be cheap; they run on the upload task.
pub trait ProgressReporter: Send + Sync {
    fn on_chunk(&self, progress: &ChunkProgress);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ChunkProgress) + Send + Sync,
{
    fn on_chunk(&self, progress: &ChunkProgress) {
        self(progress)
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_chunk(&self, _progress: &ChunkProgress) {}
}

/// Forwards snapshots into a bounded channel without blocking.
///
/// When the receiver lags, snapshots are dropped rather than stalling the
/// transfer. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<ChunkProgress>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<ChunkProgress>) -> Self {
        Self { tx }
    }

    /// Creates a reporter and its receiving half.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChunkProgress>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_chunk(&self, progress: &ChunkProgress) {
        if let Err(mpsc::error::TrySendError::Full(p)) = self.tx.try_send(progress.clone()) {
            tracing::trace!(chunk_index = p.chunk_index, "progress channel full, snapshot dropped");
        }
    }
}

/// Invokes `reporter`, containing any panic it raises.
///
/// Returns `false` if the reporter panicked. The panic is logged and the
/// caller carries on.
pub fn notify_isolated(reporter: &dyn ProgressReporter, progress: &ChunkProgress) -> bool {
    match catch_unwind(AssertUnwindSafe(|| reporter.on_chunk(progress))) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            tracing::error!(
                chunk_index = progress.chunk_index,
                total_chunks = progress.total_chunks,
                panic = %message,
                "progress reporter panicked"
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Throughput
// ---------------------------------------------------------------------------

/// Transfer rate over the last few seconds of acknowledgments.
///
/// Marks are cumulative byte counts, so a re-acknowledged chunk that does
/// not move the counter adds no throughput.
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    window: Duration,
    marks: VecDeque<(Instant, u64)>,
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ThroughputWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            marks: VecDeque::new(),
        }
    }

    /// Records the cumulative bytes acknowledged so far.
    pub fn record(&mut self, total_bytes: u64) {
        self.record_at(total_bytes, Instant::now());
    }

    fn record_at(&mut self, total_bytes: u64, now: Instant) {
        self.marks.push_back((now, total_bytes));
        // Keep the newest mark at or before the cutoff as the window base.
        if let Some(cutoff) = now.checked_sub(self.window) {
            while self.marks.len() > 2 && self.marks[1].0 <= cutoff {
                self.marks.pop_front();
            }
        }
    }

    /// Bytes per second across the window; 0.0 until two marks exist.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(t0, b0)), Some(&(t1, b1))) = (self.marks.front(), self.marks.back()) else {
            return 0.0;
        };
        let elapsed = t1.duration_since(t0);
        if elapsed.is_zero() {
            return 0.0;
        }
        b1.saturating_sub(b0) as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining_bytes` at the current rate.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        (rate > 0.0).then(|| Duration::from_secs_f64(remaining_bytes as f64 / rate))
    }
}

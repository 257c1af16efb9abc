use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use appvault_protocol::SessionState;

use crate::TransferError;
use crate::splitter::{ChunkRange, total_chunks};

/// One in-flight transfer: identity, size, per-chunk completion and state.
///
/// Owned by exactly one orchestrator handle; mutations go through `&mut self`.
#[derive(Debug)]
pub struct UploadSession {
    session_id: Option<String>,
    file_name: String,
    total_size: u64,
    chunk_size: u64,
    total_chunks: u32,
    completed: BTreeSet<u32>,
    bytes_transferred: u64,
    state: SessionState,
    started_at: Instant,
    finished_at: Option<Instant>,
    error: Option<String>,
}

impl UploadSession {
    /// Creates a session in `Created` state. The server assigns the id later.
    pub fn new(file_name: &str, total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        Ok(Self {
            session_id: None,
            file_name: file_name.to_string(),
            total_size,
            chunk_size,
            total_chunks: total_chunks(total_size, chunk_size)?,
            completed: BTreeSet::new(),
            bytes_transferred: 0,
            state: SessionState::Created,
            started_at: Instant::now(),
            finished_at: None,
            error: None,
        })
    }

    /// `Created -> Uploading`, recording the server-assigned id.
    pub fn begin(&mut self, session_id: String) -> Result<(), TransferError> {
        self.transition(SessionState::Uploading)?;
        self.session_id = Some(session_id);
        Ok(())
    }

    /// Records an acknowledged chunk.
    ///
    /// Returns `false` when the index had already been acknowledged; the
    /// byte count is not incremented twice.
    pub fn record_chunk(&mut self, range: &ChunkRange) -> Result<bool, TransferError> {
        if self.state != SessionState::Uploading {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: SessionState::Uploading,
            });
        }
        if range.index >= self.total_chunks {
            return Err(TransferError::ChunkOutOfRange {
                index: range.index,
                total: self.total_chunks,
            });
        }
        let newly = self.completed.insert(range.index);
        if newly {
            self.bytes_transferred += range.len();
        }
        Ok(newly)
    }

    /// `Uploading -> Completing`. Every chunk must have been acknowledged.
    pub fn begin_complete(&mut self) -> Result<(), TransferError> {
        if !self.is_complete() {
            return Err(TransferError::IncompleteSession {
                completed: self.completed_count(),
                total: self.total_chunks,
            });
        }
        self.transition(SessionState::Completing)
    }

    /// `Completing -> Committed`.
    pub fn commit(&mut self) -> Result<(), TransferError> {
        self.transition(SessionState::Committed)?;
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Moves a non-terminal session to `Failed`.
    ///
    /// Fails with `InvalidTransition` when the session already reached a
    /// terminal state; the earlier outcome is kept.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransferError> {
        self.transition(SessionState::Failed)?;
        self.error = Some(reason.to_string());
        self.finished_at = Some(Instant::now());
        Ok(())
    }

    fn transition(&mut self, to: SessionState) -> Result<(), TransferError> {
        if !self.state.can_transition_to(to) {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Progress as a percentage of acknowledged chunks (not bytes).
    pub fn percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        f64::from(self.completed_count()) / f64::from(self.total_chunks) * 100.0
    }

    /// `true` once every chunk has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.total_chunks
    }

    /// Lowest index not yet acknowledged.
    pub fn next_pending(&self) -> Option<u32> {
        (0..self.total_chunks).find(|i| !self.completed.contains(i))
    }

    /// Whether `index` has been acknowledged.
    pub fn is_chunk_done(&self, index: u32) -> bool {
        self.completed.contains(&index)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn completed_count(&self) -> u32 {
        self.completed.len() as u32
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Failure reason, if the session failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Time since creation, frozen once the session is terminal.
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }
}

//! Upload orchestrator: validate, claim, start, send chunks, complete.
//!
//! [`UploadOrchestrator::upload`] runs the whole flow. The step-wise form
//! ([`UploadOrchestrator::begin`] plus [`ActiveUpload`]) lets a caller
//! re-send a failed chunk on the same session instead of starting over.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use appvault_protocol::{CommittedArtifact, SessionState, UploadMetadata};
use appvault_transfer::{
    ChunkProgress, ChunkRange, ChunkRanges, ChunkReader, FileDigest, ProgressReporter,
    ThroughputWindow, TransferError, UploadSession, ValidationError, calculate_file_checksum,
    notify_isolated, validate_upload,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CompleteFailure, UploadError};
use crate::registry::{UploadGuard, UploadRegistry};
use crate::transport::{ChunkAck, SessionTransport, StartUpload};
use crate::types::{UploadOptions, UploadReport};

/// Drives chunked uploads over a [`SessionTransport`].
pub struct UploadOrchestrator {
    transport: Arc<dyn SessionTransport>,
    registry: UploadRegistry,
    options: UploadOptions,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    /// Creates an orchestrator with default options.
    ///
    /// Orchestrators sharing `registry` never upload to the same target at
    /// the same time.
    pub fn new(transport: Arc<dyn SessionTransport>, registry: UploadRegistry) -> Self {
        Self {
            transport,
            registry,
            options: UploadOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn registry(&self) -> &UploadRegistry {
        &self.registry
    }

    /// Token that cancels every upload started by this orchestrator.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `path` and returns the committed artifact.
    pub async fn upload(
        &self,
        path: &Path,
        metadata: UploadMetadata,
        reporter: impl ProgressReporter + 'static,
    ) -> Result<CommittedArtifact, UploadError> {
        self.upload_with_report(path, metadata, reporter)
            .await
            .map(|report| report.artifact)
    }

    /// Uploads `path` and returns the artifact with transfer statistics.
    ///
    /// Any failure is terminal for the session: the caller starts over
    /// with a new call.
    pub async fn upload_with_report(
        &self,
        path: &Path,
        metadata: UploadMetadata,
        reporter: impl ProgressReporter + 'static,
    ) -> Result<UploadReport, UploadError> {
        let mut active = self.begin(path, metadata, reporter).await?;
        let outcome = match active.send_remaining().await {
            Ok(()) => active.finish().await,
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            active.fail(&e.to_string());
            error!(
                session_id = active.session_id(),
                phase = %e.phase(),
                error = %e,
                "upload failed"
            );
        }
        outcome
    }

    /// Validates the upload, claims its target and opens a session.
    ///
    /// Nothing touches the network until validation and the target claim
    /// succeed. The claim is held until the returned handle is dropped.
    pub async fn begin(
        &self,
        path: &Path,
        metadata: UploadMetadata,
        reporter: impl ProgressReporter + 'static,
    ) -> Result<ActiveUpload, UploadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ValidationError::InvalidFileName(path.display().to_string()))?
            .to_string();
        let file_size = tokio::fs::metadata(path)
            .await
            .map_err(TransferError::from)?
            .len();
        validate_upload(&file_name, file_size, &metadata, &self.options.limits())?;

        let target = metadata.target();
        let Some(guard) = self.registry.try_acquire(&target) else {
            warn!(target = %target, "upload already in progress");
            return Err(UploadError::ConcurrentUpload { target });
        };

        let cancel = self.cancel.child_token();
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let reader = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || ChunkReader::open(&path))
                .await
                .map_err(join_error)??
        };
        let chunk_size = self.options.chunk_size;
        let plan = ChunkRanges::new(file_size, chunk_size)?;
        let mut session = UploadSession::new(&file_name, file_size, chunk_size)?;

        let request = StartUpload {
            metadata: metadata.clone(),
            file_name: file_name.clone(),
            file_size,
            chunk_size,
            total_chunks: plan.total(),
        };
        info!(
            target = %target,
            file = %file_name,
            bytes = file_size,
            total_chunks = plan.total(),
            "starting upload"
        );

        let session_id = match cancellable(&cancel, self.transport.start(&request)).await {
            None => {
                let _ = session.fail("cancelled");
                return Err(UploadError::Cancelled);
            }
            Some(Err(e)) => {
                let _ = session.fail(&e.to_string());
                warn!(target = %target, error = %e, "failed to open upload session");
                return Err(UploadError::SessionCreate(e));
            }
            Some(Ok(id)) => id,
        };
        debug!(session_id = %session_id, "upload session opened");
        session.begin(session_id)?;

        let mut speed = ThroughputWindow::default();
        speed.record(0);

        Ok(ActiveUpload {
            transport: Arc::clone(&self.transport),
            session,
            plan,
            reader: Arc::new(Mutex::new(reader)),
            digest: FileDigest::new(),
            path: path.to_path_buf(),
            metadata,
            reporter: Box::new(reporter),
            speed,
            cancel,
            started_at: Utc::now(),
            _guard: guard,
        })
    }
}

/// An open upload session owned by one caller.
///
/// A failed chunk leaves the session `Uploading` so the same index can be
/// sent again. Dropping the handle releases the target claim.
pub struct ActiveUpload {
    transport: Arc<dyn SessionTransport>,
    session: UploadSession,
    plan: ChunkRanges,
    reader: Arc<Mutex<ChunkReader>>,
    digest: FileDigest,
    path: PathBuf,
    metadata: UploadMetadata,
    reporter: Box<dyn ProgressReporter>,
    speed: ThroughputWindow,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    _guard: UploadGuard,
}

impl ActiveUpload {
    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        self.session.session_id().unwrap_or_default()
    }

    pub fn metadata(&self) -> &UploadMetadata {
        &self.metadata
    }

    /// Token that cancels only this upload.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reads and sends chunk `index`.
    ///
    /// While `Completing` (after a missing-chunks completion failure) an
    /// already acknowledged chunk may be sent again before retrying
    /// [`finish`](Self::finish).
    pub async fn send_chunk(&mut self, index: u32) -> Result<ChunkAck, UploadError> {
        let state = self.session.state();
        let resend = state == SessionState::Completing;
        if state != SessionState::Uploading && !resend {
            return Err(TransferError::InvalidTransition {
                from: state,
                to: SessionState::Uploading,
            }
            .into());
        }
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        let range = self.plan.range(index)?;
        let data = match self.read(range).await {
            Ok(data) => data,
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e);
            }
        };

        let session_id = self.session_id().to_string();
        debug!(session_id = %session_id, index, bytes = range.len(), "sending chunk");
        let result = cancellable(
            &self.cancel,
            self.transport.upload_chunk(&session_id, index, &data),
        )
        .await;
        let ack = match result {
            None => return Err(self.cancelled()),
            Some(Err(e)) => {
                warn!(session_id = %session_id, index, error = %e, "chunk upload failed");
                return Err(UploadError::Chunk {
                    session_id,
                    index,
                    completed_chunks: self.session.completed_count(),
                    total_chunks: self.session.total_chunks(),
                    bytes_transferred: self.session.bytes_transferred(),
                    source: e,
                });
            }
            Some(Ok(ack)) => ack,
        };

        if !resend && self.session.record_chunk(&range)? {
            self.digest.update(&range, &data);
            self.speed.record(self.session.bytes_transferred());
            self.report(index);
        }
        Ok(ack)
    }

    /// Sends every unacknowledged chunk in ascending order.
    ///
    /// Stops at the first failure; chunks after it are not attempted.
    pub async fn send_remaining(&mut self) -> Result<(), UploadError> {
        while let Some(index) = self.session.next_pending() {
            self.send_chunk(index).await?;
        }
        Ok(())
    }

    /// Commits the session once every chunk has been acknowledged.
    ///
    /// A retryable completion failure leaves the session `Completing`, so
    /// `finish` may be called again.
    pub async fn finish(&mut self) -> Result<UploadReport, UploadError> {
        match self.session.state() {
            SessionState::Uploading => self.session.begin_complete()?,
            SessionState::Completing => {}
            other => {
                return Err(TransferError::InvalidTransition {
                    from: other,
                    to: SessionState::Completing,
                }
                .into());
            }
        }
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        let session_id = self.session_id().to_string();
        let result = cancellable(&self.cancel, self.transport.complete(&session_id)).await;
        let artifact = match result {
            None => return Err(self.cancelled()),
            Some(Err(e)) => {
                let kind = CompleteFailure::classify(&e);
                if !kind.is_retryable() {
                    self.fail(&e.to_string());
                }
                warn!(session_id = %session_id, kind = %kind, error = %e, "complete failed");
                return Err(UploadError::Complete {
                    session_id,
                    kind,
                    source: e,
                });
            }
            Some(Ok(artifact)) => artifact,
        };

        let local_hash = match self.local_hash().await {
            Ok(hash) => hash,
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e);
            }
        };
        if let Some(remote) = artifact.content_hash.as_deref()
            && !remote.eq_ignore_ascii_case(&local_hash)
        {
            let err = UploadError::HashMismatch {
                local: local_hash,
                remote: remote.to_string(),
            };
            self.fail(&err.to_string());
            error!(session_id = %session_id, error = %err, "server digest differs from local file");
            return Err(err);
        }

        self.session.commit()?;
        let elapsed = self.session.elapsed();
        info!(
            session_id = %session_id,
            version = %artifact.version,
            platform = %artifact.platform,
            bytes = artifact.final_size,
            elapsed_ms = elapsed.as_millis() as u64,
            "upload committed"
        );

        Ok(UploadReport {
            artifact,
            session_id,
            file_name: self.session.file_name().to_string(),
            total_chunks: self.session.total_chunks(),
            bytes_transferred: self.session.bytes_transferred(),
            local_hash,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed,
        })
    }

    /// Abandons the session locally and releases the target.
    ///
    /// A committed session stays committed. Returns the final state.
    pub fn abort(mut self, reason: &str) -> SessionState {
        self.fail(reason);
        info!(session_id = self.session_id(), reason, "upload aborted");
        self.session.state()
    }

    fn fail(&mut self, reason: &str) {
        if !self.session.state().is_terminal() {
            let _ = self.session.fail(reason);
        }
    }

    fn cancelled(&mut self) -> UploadError {
        self.fail("cancelled");
        info!(session_id = self.session_id(), "upload cancelled");
        UploadError::Cancelled
    }

    fn report(&self, index: u32) {
        let total_bytes = self.session.total_size();
        let transferred = self.session.bytes_transferred();
        let progress = ChunkProgress {
            percentage: self.session.percentage(),
            chunk_index: index,
            total_chunks: self.session.total_chunks(),
            bytes_transferred: transferred,
            total_bytes,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(total_bytes.saturating_sub(transferred)),
        };
        notify_isolated(self.reporter.as_ref(), &progress);
    }

    async fn read(&self, range: ChunkRange) -> Result<Vec<u8>, UploadError> {
        let reader = Arc::clone(&self.reader);
        let data = tokio::task::spawn_blocking(move || {
            let mut reader = reader.lock().unwrap_or_else(|e| e.into_inner());
            reader.read_range(&range)
        })
        .await
        .map_err(join_error)??;
        Ok(data)
    }

    /// SHA-256 of the local file, from the running digest when every chunk
    /// was hashed in order.
    async fn local_hash(&self) -> Result<String, UploadError> {
        if self.digest.bytes_hashed() == self.session.total_size() {
            return Ok(self.digest.clone().finalize_hex());
        }
        let path = self.path.clone();
        let hash = tokio::task::spawn_blocking(move || calculate_file_checksum(&path))
            .await
            .map_err(join_error)??;
        Ok(hash)
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn join_error(e: tokio::task::JoinError) -> UploadError {
    UploadError::Transfer(TransferError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadPhase;
    use crate::retry::{RetryPolicy, RetryingTransport};
    use crate::transport::{TransportError, TransportFuture};
    use appvault_protocol::Platform;
    use appvault_transfer::{NoopReporter, checksum_bytes};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;
    use tokio::sync::Notify;

    const MIB: u64 = 1024 * 1024;

    /// Mock transport that stores chunks in memory and records every call.
    #[derive(Default)]
    struct MockTransport {
        start_status: Option<u16>,
        chunk_failures: Mutex<HashMap<u32, u32>>,
        complete_failures: Mutex<Vec<(u16, &'static str)>>,
        forced_hash: Option<String>,
        report_hash: bool,
        start_gate: Option<Arc<Notify>>,
        starts: Mutex<Vec<StartUpload>>,
        chunk_calls: Mutex<Vec<(u32, u64)>>,
        stored: Mutex<BTreeMap<u32, Vec<u8>>>,
        complete_calls: Mutex<u32>,
    }

    impl MockTransport {
        fn failing_chunk(index: u32, times: u32) -> Self {
            let mock = Self::default();
            mock.chunk_failures.lock().unwrap().insert(index, times);
            mock
        }

        fn start_count(&self) -> usize {
            self.starts.lock().unwrap().len()
        }

        fn chunk_calls(&self) -> Vec<(u32, u64)> {
            self.chunk_calls.lock().unwrap().clone()
        }

        fn complete_count(&self) -> u32 {
            *self.complete_calls.lock().unwrap()
        }
    }

    impl SessionTransport for MockTransport {
        fn start<'a>(&'a self, request: &'a StartUpload) -> TransportFuture<'a, String> {
            Box::pin(async move {
                self.starts.lock().unwrap().push(request.clone());
                if let Some(gate) = &self.start_gate {
                    gate.notified().await;
                }
                match self.start_status {
                    Some(status) => Err(TransportError::Api {
                        status,
                        detail: "start rejected".into(),
                    }),
                    None => Ok(format!("session-{}", self.start_count())),
                }
            })
        }

        fn upload_chunk<'a>(
            &'a self,
            _session_id: &'a str,
            index: u32,
            data: &'a [u8],
        ) -> TransportFuture<'a, ChunkAck> {
            Box::pin(async move {
                self.chunk_calls
                    .lock()
                    .unwrap()
                    .push((index, data.len() as u64));
                {
                    let mut failures = self.chunk_failures.lock().unwrap();
                    if let Some(left) = failures.get_mut(&index)
                        && *left > 0
                    {
                        *left -= 1;
                        return Err(TransportError::Api {
                            status: 503,
                            detail: "chunk store unavailable".into(),
                        });
                    }
                }
                self.stored.lock().unwrap().insert(index, data.to_vec());
                Ok(ChunkAck {
                    index,
                    bytes: data.len() as u64,
                })
            })
        }

        fn complete<'a>(&'a self, _session_id: &'a str) -> TransportFuture<'a, CommittedArtifact> {
            Box::pin(async move {
                *self.complete_calls.lock().unwrap() += 1;
                let failure = {
                    let mut f = self.complete_failures.lock().unwrap();
                    if f.is_empty() { None } else { Some(f.remove(0)) }
                };
                if let Some((status, detail)) = failure {
                    return Err(TransportError::Api {
                        status,
                        detail: detail.into(),
                    });
                }
                let bytes: Vec<u8> = self
                    .stored
                    .lock()
                    .unwrap()
                    .values()
                    .flatten()
                    .copied()
                    .collect();
                let content_hash = self
                    .forced_hash
                    .clone()
                    .or_else(|| self.report_hash.then(|| checksum_bytes(&bytes)));
                Ok(CommittedArtifact {
                    version: "1.2.3".into(),
                    platform: Platform::Android,
                    final_size: bytes.len() as u64,
                    content_hash,
                    download_url: Some("/api/v2/version/download/1".into()),
                    version_id: Some(1),
                })
            })
        }
    }

    fn metadata() -> UploadMetadata {
        UploadMetadata {
            app_identifier: "com.example.app".into(),
            version: "1.2.3".into(),
            version_code: 7,
            platform: Platform::Android,
            is_mandatory: false,
            changelog: vec!["Initial release".into()],
        }
    }

    fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    fn orchestrator(transport: Arc<dyn SessionTransport>, chunk_size: u64) -> UploadOrchestrator {
        UploadOrchestrator::new(transport, UploadRegistry::new()).with_options(UploadOptions {
            chunk_size,
            ..UploadOptions::default()
        })
    }

    fn collector() -> (
        Arc<Mutex<Vec<ChunkProgress>>>,
        impl ProgressReporter + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (seen, move |p: &ChunkProgress| s.lock().unwrap().push(p.clone()))
    }

    #[tokio::test]
    async fn twelve_mib_in_three_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", (12 * MIB) as usize);
        let mock = Arc::new(MockTransport {
            report_hash: true,
            ..MockTransport::default()
        });
        let orch = orchestrator(mock.clone(), 5 * MIB);
        let (seen, reporter) = collector();

        let report = orch
            .upload_with_report(&path, metadata(), reporter)
            .await
            .unwrap();

        assert_eq!(
            mock.chunk_calls(),
            vec![(0, 5 * MIB), (1, 5 * MIB), (2, 2 * MIB)]
        );
        assert_eq!(report.artifact.final_size, 12 * MIB);
        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.bytes_transferred, 12 * MIB);
        assert_eq!(report.local_hash, calculate_file_checksum(&path).unwrap());
        assert_eq!(mock.complete_count(), 1);

        let progress = seen.lock().unwrap();
        let percentages: Vec<f64> = progress.iter().map(|p| p.percentage).collect();
        assert_eq!(
            percentages,
            vec![1.0 / 3.0 * 100.0, 2.0 / 3.0 * 100.0, 100.0]
        );
        let indices: Vec<u32> = progress.iter().map(|p| p.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(progress[2].bytes_transferred, 12 * MIB);
        assert_eq!(progress[2].total_bytes, 12 * MIB);

        let starts = mock.starts.lock().unwrap();
        let start = &starts[0];
        assert_eq!(start.file_name, "app.apk");
        assert_eq!(start.file_size, 12 * MIB);
        assert_eq!(start.total_chunks, 3);
    }

    #[tokio::test]
    async fn progress_is_exact_chunk_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 70);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);
        let (seen, reporter) = collector();

        orch.upload(&path, metadata(), reporter).await.unwrap();

        let progress = seen.lock().unwrap();
        assert_eq!(progress.len(), 7);
        for (k, p) in progress.iter().enumerate() {
            assert_eq!(p.percentage, (k + 1) as f64 / 7.0 * 100.0);
            assert_eq!(p.total_chunks, 7);
        }
        assert!(progress[6].is_last());
    }

    #[tokio::test]
    async fn start_failure_sends_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport {
            start_status: Some(500),
            ..MockTransport::default()
        });
        let orch = orchestrator(mock.clone(), 10);
        let (seen, reporter) = collector();

        let err = orch.upload(&path, metadata(), reporter).await.unwrap_err();
        assert!(matches!(err, UploadError::SessionCreate(_)), "{err:?}");
        assert_eq!(err.phase(), UploadPhase::Start);
        assert!(mock.chunk_calls().is_empty());
        assert_eq!(mock.complete_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert!(!orch.registry().is_active(&metadata().target()));
    }

    #[tokio::test]
    async fn chunk_failure_stops_and_retry_from_scratch_commits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::failing_chunk(1, 1));
        let orch = orchestrator(mock.clone(), 10);

        let err = orch.upload(&path, metadata(), NoopReporter).await.unwrap_err();
        match &err {
            UploadError::Chunk {
                index,
                completed_chunks,
                total_chunks,
                bytes_transferred,
                ..
            } => {
                assert_eq!(*index, 1);
                assert_eq!(*completed_chunks, 1);
                assert_eq!(*total_chunks, 3);
                assert_eq!(*bytes_transferred, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.chunk_calls(), vec![(0, 10), (1, 10)]);
        assert_eq!(mock.complete_count(), 0);

        let artifact = orch.upload(&path, metadata(), NoopReporter).await.unwrap();
        assert_eq!(artifact.final_size, 30);
        assert_eq!(mock.start_count(), 2);

        let clean = Arc::new(MockTransport::default());
        let expected = orchestrator(clean, 10)
            .upload(&path, metadata(), NoopReporter)
            .await
            .unwrap();
        assert_eq!(artifact, expected);
    }

    #[tokio::test]
    async fn retry_wrapper_recovers_chunk_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport {
            report_hash: true,
            ..MockTransport::failing_chunk(1, 2)
        });
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        };
        let transport = Arc::new(RetryingTransport::new(Arc::clone(&mock), policy));
        let orch = orchestrator(transport, 10);

        let artifact = orch.upload(&path, metadata(), NoopReporter).await.unwrap();
        assert_eq!(artifact.final_size, 30);
        assert_eq!(
            artifact.content_hash.as_deref(),
            Some(calculate_file_checksum(&path).unwrap().as_str())
        );
        let indices: Vec<u32> = mock.chunk_calls().iter().map(|c| c.0).collect();
        assert_eq!(indices, vec![0, 1, 1, 1, 2]);
        assert_eq!(mock.start_count(), 1);

        let clean = Arc::new(MockTransport {
            report_hash: true,
            ..MockTransport::default()
        });
        let expected = orchestrator(clean, 10)
            .upload(&path, metadata(), NoopReporter)
            .await
            .unwrap();
        assert_eq!(artifact, expected);
    }

    async fn upload_then_release(
        orch: &UploadOrchestrator,
        path: &Path,
        gate: &Notify,
    ) -> Result<CommittedArtifact, UploadError> {
        let result = orch.upload(path, metadata(), NoopReporter).await;
        if result.is_err() {
            gate.notify_one();
        }
        result
    }

    #[tokio::test]
    async fn concurrent_upload_to_same_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let gate = Arc::new(Notify::new());
        let mock = Arc::new(MockTransport {
            start_gate: Some(Arc::clone(&gate)),
            ..MockTransport::default()
        });
        let orch = orchestrator(mock.clone(), 10);

        let (a, b) = tokio::join!(
            upload_then_release(&orch, &path, &gate),
            upload_then_release(&orch, &path, &gate),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(UploadError::ConcurrentUpload { .. })
        )));
        assert_eq!(mock.start_count(), 1);
        assert!(!orch.registry().is_active(&metadata().target()));
    }

    #[tokio::test]
    async fn shared_registry_spans_orchestrators() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let registry = UploadRegistry::new();
        let first = Arc::new(MockTransport::default());
        let second = Arc::new(MockTransport::default());
        let a = UploadOrchestrator::new(first.clone(), registry.clone());
        let b = UploadOrchestrator::new(second.clone(), registry.clone());

        let held = a.begin(&path, metadata(), NoopReporter).await.unwrap();
        let err = b.upload(&path, metadata(), NoopReporter).await.unwrap_err();
        assert!(matches!(err, UploadError::ConcurrentUpload { .. }));
        assert_eq!(second.start_count(), 0);

        let mut other = metadata();
        other.version = "1.2.4".into();
        assert!(b.upload(&path, other, NoopReporter).await.is_ok());

        drop(held);
        assert!(b.upload(&path, metadata(), NoopReporter).await.is_ok());
    }

    #[tokio::test]
    async fn validation_happens_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::default());
        let orch = UploadOrchestrator::new(mock.clone(), UploadRegistry::new()).with_options(
            UploadOptions {
                chunk_size: 10,
                max_file_size: 100,
            },
        );

        let empty = write_file(dir.path(), "empty.apk", 0);
        let err = orch.upload(&empty, metadata(), NoopReporter).await.unwrap_err();
        assert!(matches!(err, UploadError::Validation(ValidationError::EmptyFile)));

        let big = write_file(dir.path(), "big.apk", 101);
        let err = orch.upload(&big, metadata(), NoopReporter).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Validation(ValidationError::FileTooLarge { size: 101, max: 100 })
        ));

        let ipa = write_file(dir.path(), "app.ipa", 10);
        let err = orch.upload(&ipa, metadata(), NoopReporter).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Validation(ValidationError::ExtensionMismatch { .. })
        ));

        let mut bad = metadata();
        bad.version = "1.2".into();
        let ok_file = write_file(dir.path(), "app.apk", 10);
        let err = orch.upload(&ok_file, bad, NoopReporter).await.unwrap_err();
        assert_eq!(err.phase(), UploadPhase::Validate);

        assert_eq!(mock.start_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_local_error() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);

        let err = orch
            .upload(&dir.path().join("absent.apk"), metadata(), NoopReporter)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Transfer(TransferError::Io(_))));
        assert_eq!(mock.start_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_between_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_chunk(0).await.unwrap();
        active.cancel_token().cancel();

        let err = active.send_chunk(1).await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(active.session().state(), SessionState::Failed);
        assert_eq!(mock.chunk_calls().len(), 1);
        assert!(active.finish().await.is_err());
        assert_eq!(mock.complete_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_orchestrator_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);
        orch.cancel_token().cancel();

        let err = orch.upload(&path, metadata(), NoopReporter).await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(mock.start_count(), 0);
    }

    #[tokio::test]
    async fn cancel_after_commit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 25);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_remaining().await.unwrap();
        active.finish().await.unwrap();

        active.cancel_token().cancel();
        assert_eq!(active.session().state(), SessionState::Committed);
        assert_eq!(active.abort("late cancel"), SessionState::Committed);
    }

    #[tokio::test]
    async fn stepwise_retry_of_failed_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::failing_chunk(1, 1));
        let orch = orchestrator(mock.clone(), 10);
        let (seen, reporter) = collector();

        let mut active = orch.begin(&path, metadata(), reporter).await.unwrap();
        assert_eq!(active.session_id(), "session-1");
        active.send_chunk(0).await.unwrap();
        assert!(active.send_chunk(1).await.is_err());
        assert_eq!(active.session().state(), SessionState::Uploading);

        active.send_chunk(1).await.unwrap();
        active.send_chunk(2).await.unwrap();
        let report = active.finish().await.unwrap();

        assert_eq!(report.artifact.final_size, 30);
        assert_eq!(report.session_id, "session-1");
        assert_eq!(mock.start_count(), 1);
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn finish_requires_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_chunk(0).await.unwrap();
        let err = active.finish().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Transfer(TransferError::IncompleteSession {
                completed: 1,
                total: 3
            })
        ));
        assert_eq!(mock.complete_count(), 0);
    }

    #[tokio::test]
    async fn missing_chunks_completion_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        mock.complete_failures
            .lock()
            .unwrap()
            .push((409, "Missing chunks: [1]"));
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_remaining().await.unwrap();
        let err = active.finish().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Complete {
                kind: CompleteFailure::MissingChunks,
                ..
            }
        ));
        assert_eq!(active.session().state(), SessionState::Completing);

        active.send_chunk(1).await.unwrap();
        let report = active.finish().await.unwrap();
        assert_eq!(report.artifact.final_size, 30);
        assert_eq!(mock.complete_count(), 2);
        assert_eq!(mock.chunk_calls().len(), 4);
    }

    #[tokio::test]
    async fn corrupt_completion_fails_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        mock.complete_failures
            .lock()
            .unwrap()
            .push((422, "assembled file is corrupt"));
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_remaining().await.unwrap();
        let err = active.finish().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Complete {
                kind: CompleteFailure::Corrupt,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert_eq!(active.session().state(), SessionState::Failed);
        assert!(active.finish().await.is_err());
        assert_eq!(mock.complete_count(), 1);
    }

    #[tokio::test]
    async fn validation_list_on_complete_fails_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        mock.complete_failures.lock().unwrap().push((
            422,
            r#"[{"input":null,"loc":["path","upload_id"],"msg":"Field required","type":"missing"}]"#,
        ));
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_remaining().await.unwrap();
        let err = active.finish().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Complete {
                kind: CompleteFailure::Corrupt,
                ..
            }
        ));
        assert_eq!(active.session().state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn gateway_error_on_complete_fails_one_shot_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        mock.complete_failures
            .lock()
            .unwrap()
            .push((502, "bad gateway"));
        let orch = orchestrator(mock.clone(), 10);

        let err = orch.upload(&path, metadata(), NoopReporter).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Complete {
                kind: CompleteFailure::Transport,
                ..
            }
        ));
        assert_eq!(err.phase(), UploadPhase::Complete);
        assert!(!orch.registry().is_active(&metadata().target()));
    }

    #[tokio::test]
    async fn hash_mismatch_fails_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport {
            forced_hash: Some("deadbeef".into()),
            ..MockTransport::default()
        });
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_remaining().await.unwrap();
        let err = active.finish().await.unwrap_err();
        assert!(matches!(err, UploadError::HashMismatch { .. }));
        assert_eq!(err.phase(), UploadPhase::Verify);
        assert_eq!(active.session().state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn panicking_reporter_does_not_abort_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 30);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);

        let reporter = |p: &ChunkProgress| {
            if p.chunk_index == 1 {
                panic!("reporter bug");
            }
        };
        let artifact = orch.upload(&path, metadata(), reporter).await.unwrap();
        assert_eq!(artifact.final_size, 30);
        assert_eq!(mock.chunk_calls().len(), 3);
    }

    #[tokio::test]
    async fn send_after_terminal_state_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.apk", 10);
        let mock = Arc::new(MockTransport::default());
        let orch = orchestrator(mock.clone(), 10);

        let mut active = orch.begin(&path, metadata(), NoopReporter).await.unwrap();
        active.send_remaining().await.unwrap();
        active.finish().await.unwrap();

        let err = active.send_chunk(0).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Transfer(TransferError::InvalidTransition { .. })
        ));
        assert!(active.finish().await.is_err());
        assert_eq!(mock.complete_count(), 1);
    }
}

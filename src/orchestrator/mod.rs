//! Separation Orchestrator
//!
//! Owns the state machine of one separation request and drives the job
//! transport through it:
//!
//! ```text
//! idle -> uploading -> processing -> complete
//!                    \-> error
//! processing -> error
//! any state -> idle        (explicit cancel)
//! ```
//!
//! At most one job runs per orchestrator. Every transition is published to
//! subscribers. Results that arrive after a cancel or from a superseded job
//! are discarded before they can touch the current job.

mod cancel;
mod job;
mod normalize;
mod progress;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::{BackendConfig, BackendStyle};
use crate::error::{Result, StemError};
use crate::stem::StemDescriptor;
use crate::transport::{
    connect, validate_location, JobHandle, JobTransport, RemoteJobState, SeparationRequest,
    StemMap, Uploader,
};

pub use cancel::CancelFlag;
pub use job::{JobStage, SeparationJob};
pub use normalize::normalize_stems;
pub use progress::ProgressTracker;

/// Capacity of the job event channel
const EVENT_CAPACITY: usize = 64;

/// Audio a job starts from
#[derive(Debug, Clone)]
pub enum SourceAudio {
    /// Raw audio, uploaded before submission
    Bytes { file_name: String, bytes: Vec<u8> },
    /// Audio already hosted at a fetchable URL
    Url(String),
}

impl SourceAudio {
    pub fn bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        SourceAudio::Bytes {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        SourceAudio::Url(url.into())
    }
}

struct Inner {
    job: SeparationJob,
    /// Bumped by every start and cancel; in-flight work from an older
    /// generation never commits
    generation: u64,
    cancel: Arc<CancelFlag>,
}

/// Drives separation jobs against one backend.
///
/// Cheap to clone; clones share the same job, so one task can `cancel()`
/// while another is awaiting `start()`.
#[derive(Clone)]
pub struct SeparationOrchestrator {
    transport: Arc<dyn JobTransport>,
    uploader: Option<Arc<Uploader>>,
    config: BackendConfig,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SeparationJob>,
}

impl SeparationOrchestrator {
    pub fn new(transport: Arc<dyn JobTransport>, config: BackendConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            uploader: None,
            config,
            inner: Arc::new(Mutex::new(Inner {
                job: SeparationJob::default(),
                generation: 0,
                cancel: Arc::new(CancelFlag::new()),
            })),
            events,
        }
    }

    /// Orchestrator over the transport selected by `config`
    pub fn from_config(config: BackendConfig) -> Result<Self> {
        let transport = connect(&config)?;
        Ok(Self::new(transport, config))
    }

    /// Uploader used for [`SourceAudio::Bytes`] sources
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(Arc::new(uploader));
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current job state
    pub fn snapshot(&self) -> SeparationJob {
        self.lock().job.clone()
    }

    /// Receive every published job transition
    pub fn subscribe(&self) -> broadcast::Receiver<SeparationJob> {
        self.events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().job.is_active()
    }

    fn publish(&self, job: &SeparationJob) {
        // no subscribers is fine
        let _ = self.events.send(job.clone());
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run one separation job to completion.
    ///
    /// Rejected with `JobInProgress` while another job is uploading or
    /// processing. An empty `model_id` selects the configured default model.
    /// Returns `Err(Cancelled)` when the job was cancelled or superseded; the
    /// job state is then already idle and carries no error.
    pub async fn start(
        &self,
        source: SourceAudio,
        model_id: &str,
        requested_stems: Option<Vec<String>>,
    ) -> Result<Vec<StemDescriptor>> {
        let model_id = match model_id.trim() {
            "" => self.config.default_model.clone(),
            model => model.to_string(),
        };
        let requested_stems = requested_stems.filter(|stems| !stems.is_empty());

        let active = self.begin(&model_id, requested_stems.clone())?;
        tracing::info!(generation = active.generation, model = %model_id, "separation started");

        let result = self
            .run(active.generation, &active.cancel, source, model_id, requested_stems)
            .await;
        active.finish(result)
    }

    fn begin(
        &self,
        model_id: &str,
        requested_stems: Option<Vec<String>>,
    ) -> Result<ActiveJob<'_>> {
        let mut inner = self.lock();
        if inner.job.is_active() {
            return Err(StemError::JobInProgress {
                stage: inner.job.stage.to_string(),
            });
        }

        inner.generation += 1;
        inner.cancel = Arc::new(CancelFlag::new());
        inner.job = SeparationJob::started(model_id, requested_stems);
        self.publish(&inner.job);

        Ok(ActiveJob {
            orchestrator: self,
            generation: inner.generation,
            cancel: inner.cancel.clone(),
            settled: false,
        })
    }

    /// Apply `update` to the job if it still belongs to `generation`
    fn commit(
        &self,
        generation: u64,
        cancel: &CancelFlag,
        update: impl FnOnce(&mut SeparationJob),
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.generation != generation || cancel.is_cancelled() {
            return Err(StemError::Cancelled);
        }
        update(&mut inner.job);
        self.publish(&inner.job);
        Ok(())
    }

    async fn run(
        &self,
        generation: u64,
        cancel: &CancelFlag,
        source: SourceAudio,
        model_id: String,
        requested_stems: Option<Vec<String>>,
    ) -> Result<Vec<StemDescriptor>> {
        let mut progress = ProgressTracker::new();

        let source_url = self.obtain_source_url(cancel, source).await?;
        progress.uploaded();
        self.commit(generation, cancel, |job| {
            job.source_url = Some(source_url.clone());
            job.stage = JobStage::Processing;
            job.progress_percent = progress.percent();
        })?;
        tracing::debug!(generation, url = %source_url, "source ready, submitting");

        let mut request = SeparationRequest::new(source_url, model_id)
            .with_output_format(self.config.output_format);
        if let Some([single]) = requested_stems.as_deref() {
            request = request.with_stem(single.clone());
        }

        let output = match self.submit(generation, cancel, &request, &mut progress).await? {
            JobHandle::Completed(output) => output,
            JobHandle::Submitted { id } => {
                let job_id = id.clone();
                self.commit(generation, cancel, |job| job.id = Some(job_id))?;
                self.poll(generation, cancel, &id, &mut progress).await?
            }
        };

        let stems = normalize_stems(
            &output,
            requested_stems.as_deref(),
            self.config.output_format,
        );
        if stems.is_empty() {
            return Err(StemError::NoStemsProduced);
        }
        Ok(stems)
    }

    async fn obtain_source_url(&self, cancel: &CancelFlag, source: SourceAudio) -> Result<String> {
        match source {
            SourceAudio::Url(url) => {
                validate_location(&url)?;
                Ok(url.trim().to_string())
            }
            SourceAudio::Bytes { file_name, bytes } => {
                let uploader = self.uploader.as_ref().ok_or_else(|| {
                    StemError::configuration("no blob store configured for uploads")
                })?;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(StemError::Cancelled),
                    result = uploader.upload(&file_name, bytes) => result,
                }
            }
        }
    }

    /// Submit the request, bounded by the request timeout.
    ///
    /// While a synchronous call is outstanding the progress estimate ramps on
    /// every progress tick.
    async fn submit(
        &self,
        generation: u64,
        cancel: &CancelFlag,
        request: &SeparationRequest,
        progress: &mut ProgressTracker,
    ) -> Result<JobHandle> {
        let timeout = self.config.request_timeout();
        let submit = tokio::time::timeout(timeout, self.transport.submit(request));
        tokio::pin!(submit);

        let ramp = self.transport.style() == BackendStyle::SyncInvoke;
        let mut ticks = tokio::time::interval(self.config.progress_tick());
        ticks.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StemError::Cancelled),
                result = &mut submit => {
                    return result.map_err(|_| StemError::Timeout {
                        operation: "submit".to_string(),
                        elapsed_ms: timeout.as_millis() as u64,
                    })?;
                }
                _ = ticks.tick(), if ramp => {
                    if progress.ramp() {
                        let percent = progress.percent();
                        self.commit(generation, cancel, |job| job.progress_percent = percent)?;
                    }
                }
            }
        }
    }

    /// Poll a submitted job until it is terminal, cancelled, or out of budget
    async fn poll(
        &self,
        generation: u64,
        cancel: &CancelFlag,
        job_id: &str,
        progress: &mut ProgressTracker,
    ) -> Result<StemMap> {
        let result = self.poll_loop(generation, cancel, job_id, progress).await;

        if matches!(result, Err(StemError::Cancelled | StemError::Timeout { .. })) {
            if let Err(e) = self.transport.cancel_job(job_id).await {
                tracing::warn!(job_id, error = %e, "remote cancel failed");
            }
        }
        result
    }

    async fn poll_loop(
        &self,
        generation: u64,
        cancel: &CancelFlag,
        job_id: &str,
        progress: &mut ProgressTracker,
    ) -> Result<StemMap> {
        let started = tokio::time::Instant::now();
        let interval = self.config.poll_interval();
        let max_duration = self.config.max_poll_duration();

        for attempt in 1..=self.config.max_polls {
            if started.elapsed() >= max_duration {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StemError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            let remaining = max_duration.saturating_sub(started.elapsed());
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StemError::Cancelled),
                status = tokio::time::timeout(remaining, self.transport.fetch_status(job_id)) => {
                    match status {
                        Ok(status) => status?,
                        Err(_) => {
                            tracing::warn!(job_id, polls = attempt, "status request outlived the polling budget");
                            break;
                        }
                    }
                }
            };
            cancel.checkpoint()?;

            match status.state {
                RemoteJobState::Succeeded => {
                    tracing::info!(job_id, polls = attempt, "remote job succeeded");
                    return Ok(status.output.unwrap_or_default());
                }
                RemoteJobState::Failed => {
                    return Err(StemError::RemoteProcessing {
                        message: status
                            .error
                            .unwrap_or_else(|| "the separation service reported a failure".to_string()),
                        error_type: None,
                        details: status.details,
                    });
                }
                RemoteJobState::Canceled => {
                    return Err(StemError::RemoteProcessing {
                        message: "the separation service cancelled the job".to_string(),
                        error_type: None,
                        details: status.error,
                    });
                }
                state @ (RemoteJobState::Starting | RemoteJobState::Processing) => {
                    if progress.observe(state, status.progress, attempt) {
                        let percent = progress.percent();
                        self.commit(generation, cancel, |job| job.progress_percent = percent)?;
                    }
                }
            }
        }

        Err(StemError::Timeout {
            operation: "separation polling".to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn finish(
        &self,
        generation: u64,
        cancel: &CancelFlag,
        result: Result<Vec<StemDescriptor>>,
    ) -> Result<Vec<StemDescriptor>> {
        let mut inner = self.lock();
        let current = inner.generation == generation && !cancel.is_cancelled();

        match result {
            Ok(stems) if current => {
                let job = &mut inner.job;
                job.stage = JobStage::Complete;
                job.progress_percent = 100;
                job.result_stems = Some(stems.clone());
                job.finished_at = Some(Utc::now());
                self.publish(job);
                tracing::info!(generation, stems = stems.len(), "separation complete");
                Ok(stems)
            }
            Err(err) if current && err.is_user_visible() => {
                let job = &mut inner.job;
                job.stage = JobStage::Error;
                job.error_message = Some(err.friendly_message());
                job.error_kind = Some(err.kind());
                job.finished_at = Some(Utc::now());
                self.publish(job);
                tracing::warn!(generation, code = err.error_code(), error = %err, "separation failed");
                Err(err)
            }
            _ => {
                tracing::debug!(generation, "discarding result of cancelled job");
                Err(StemError::Cancelled)
            }
        }
    }

    /// Reset a job whose `start` future was dropped before it finished.
    ///
    /// Same end state as [`cancel`](Self::cancel). A remote job that was
    /// already submitted gets a best-effort cancel on the current runtime.
    fn abandon(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        let remote_id = inner.job.id.take();
        inner.cancel.cancel();
        inner.generation += 1;
        inner.job = SeparationJob::cancelled();
        self.publish(&inner.job);
        drop(inner);
        tracing::info!(generation, "separation dropped mid-flight, job cancelled");

        let Some(job_id) = remote_id else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = self.transport.clone();
                handle.spawn(async move {
                    if let Err(e) = transport.cancel_job(&job_id).await {
                        tracing::warn!(job_id = %job_id, error = %e, "remote cancel failed");
                    }
                });
            }
            Err(_) => tracing::warn!(job_id = %job_id, "no runtime for remote cancel"),
        }
    }

    /// Cancel whatever is running and reset to idle.
    ///
    /// Pending timers are woken and in-flight results discarded. The job is
    /// left idle with `cancelled` set and no error. Returns whether a job was
    /// active.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        let was_active = inner.job.is_active();

        inner.cancel.cancel();
        inner.generation += 1;
        inner.job = SeparationJob::cancelled();
        self.publish(&inner.job);

        if was_active {
            tracing::info!("separation cancelled");
        }
        was_active
    }
}

/// The job claimed by one `start` call.
///
/// Dropping it before [`finish`](Self::finish) cancels the job, so a `start`
/// future that is timed out or aborted never leaves the orchestrator busy.
struct ActiveJob<'a> {
    orchestrator: &'a SeparationOrchestrator,
    generation: u64,
    cancel: Arc<CancelFlag>,
    settled: bool,
}

impl ActiveJob<'_> {
    fn finish(mut self, result: Result<Vec<StemDescriptor>>) -> Result<Vec<StemDescriptor>> {
        self.settled = true;
        self.orchestrator.finish(self.generation, &self.cancel, result)
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.orchestrator.abandon(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::JobStatus;
    use async_trait::async_trait;
    use serde_json::json;

    struct InvokeOnce(serde_json::Value);

    #[async_trait]
    impl JobTransport for InvokeOnce {
        fn style(&self) -> BackendStyle {
            BackendStyle::SyncInvoke
        }

        async fn submit(&self, _request: &SeparationRequest) -> Result<JobHandle> {
            match self.0.clone() {
                serde_json::Value::Object(map) => Ok(JobHandle::Completed(map)),
                _ => Ok(JobHandle::Completed(StemMap::new())),
            }
        }

        async fn fetch_status(&self, _job_id: &str) -> Result<JobStatus> {
            unreachable!()
        }
    }

    fn orchestrator(output: serde_json::Value) -> SeparationOrchestrator {
        let config = BackendConfig::new(BackendStyle::SyncInvoke, "http://localhost/run");
        SeparationOrchestrator::new(Arc::new(InvokeOnce(output)), config)
    }

    #[tokio::test]
    async fn test_url_source_skips_upload() {
        let orchestrator = orchestrator(json!({"vocals": "https://cdn/v.mp3"}));
        let stems = orchestrator
            .start(SourceAudio::url("https://blob/song.mp3"), "", None)
            .await
            .unwrap();

        assert_eq!(stems.len(), 1);
        let job = orchestrator.snapshot();
        assert_eq!(job.stage, JobStage::Complete);
        assert_eq!(job.model_id, "htdemucs");
        assert_eq!(job.source_url.as_deref(), Some("https://blob/song.mp3"));
    }

    #[tokio::test]
    async fn test_bytes_without_uploader_is_configuration_error() {
        let orchestrator = orchestrator(json!({"vocals": "https://cdn/v.mp3"}));
        let err = orchestrator
            .start(SourceAudio::bytes("song.mp3", vec![1]), "htdemucs", None)
            .await
            .unwrap_err();

        assert!(matches!(err, StemError::Configuration { .. }));
        let job = orchestrator.snapshot();
        assert_eq!(job.stage, JobStage::Error);
        assert_eq!(job.error_kind, Some(crate::error::ErrorKind::Configuration));
    }

    #[tokio::test]
    async fn test_cancel_when_idle_marks_cancelled() {
        let orchestrator = orchestrator(json!({}));
        assert!(!orchestrator.cancel());
        let job = orchestrator.snapshot();
        assert_eq!(job.stage, JobStage::Idle);
        assert!(job.cancelled);
    }

    #[tokio::test]
    async fn test_retry_after_error_starts_fresh_job() {
        let orchestrator = orchestrator(json!({}));
        let err = orchestrator
            .start(SourceAudio::url("https://blob/a.mp3"), "m", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StemError::NoStemsProduced));

        let err = orchestrator
            .start(SourceAudio::url("https://blob/b.mp3"), "m", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StemError::NoStemsProduced));
        assert_eq!(
            orchestrator.snapshot().source_url.as_deref(),
            Some("https://blob/b.mp3")
        );
    }
}

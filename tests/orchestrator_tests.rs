//! Orchestrator Tests
//!
//! Separation job lifecycle against scripted transports.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use stemdeck::error::ErrorKind;
use stemdeck::orchestrator::{JobStage, SeparationOrchestrator, SourceAudio};
use stemdeck::store::{BlobStore, InMemoryBlobStore, UrlOptions};
use stemdeck::transport::{
    JobHandle, JobStatus, JobTransport, RemoteJobState, SeparationRequest, StemMap, Uploader,
};
use stemdeck::{BackendConfig, BackendStyle, Result, StemDescriptor, StemError};

fn stem_map(value: serde_json::Value) -> StemMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("stem map must be an object"),
    }
}

// ============================================================================
// Scripted transports
// ============================================================================

/// Synchronous backend answering after `delay`
struct ScriptedInvoke {
    output: serde_json::Value,
    delay: Duration,
    requests: Mutex<Vec<SeparationRequest>>,
}

impl ScriptedInvoke {
    fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn submitted(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl JobTransport for ScriptedInvoke {
    fn style(&self) -> BackendStyle {
        BackendStyle::SyncInvoke
    }

    async fn submit(&self, request: &SeparationRequest) -> Result<JobHandle> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        Ok(JobHandle::Completed(stem_map(self.output.clone())))
    }

    async fn fetch_status(&self, _job_id: &str) -> Result<JobStatus> {
        panic!("synchronous backend polled")
    }
}

/// Asynchronous backend replaying a list of statuses, then `processing` forever
struct ScriptedPolling {
    statuses: Mutex<VecDeque<JobStatus>>,
    polls: AtomicUsize,
    cancels: AtomicUsize,
}

impl ScriptedPolling {
    fn new(statuses: Vec<JobStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            polls: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobTransport for ScriptedPolling {
    fn style(&self) -> BackendStyle {
        BackendStyle::Polling
    }

    async fn submit(&self, _request: &SeparationRequest) -> Result<JobHandle> {
        Ok(JobHandle::Submitted {
            id: "job-1".to_string(),
        })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus> {
        assert_eq!(job_id, "job-1");
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| JobStatus::new(RemoteJobState::Processing)))
    }

    async fn cancel_job(&self, _job_id: &str) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Asynchronous backend whose status requests never answer
#[derive(Default)]
struct StalledPolling {
    polls: AtomicUsize,
    cancels: AtomicUsize,
}

#[async_trait]
impl JobTransport for StalledPolling {
    fn style(&self) -> BackendStyle {
        BackendStyle::Polling
    }

    async fn submit(&self, _request: &SeparationRequest) -> Result<JobHandle> {
        Ok(JobHandle::Submitted {
            id: "job-1".to_string(),
        })
    }

    async fn fetch_status(&self, _job_id: &str) -> Result<JobStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn cancel_job(&self, _job_id: &str) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Blob store that hands back a fixed URL
struct FixedUrlStore(String);

#[async_trait]
impl BlobStore for FixedUrlStore {
    async fn put_object(&self, _path: &str, _bytes: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn get_url(&self, _path: &str, _options: UrlOptions) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Blob store whose writes always fail
struct BrokenStore;

#[async_trait]
impl BlobStore for BrokenStore {
    async fn put_object(&self, _path: &str, _bytes: Vec<u8>) -> Result<()> {
        Err(StemError::Store {
            reason: "bucket is read-only".to_string(),
        })
    }

    async fn get_url(&self, _path: &str, _options: UrlOptions) -> Result<String> {
        unreachable!()
    }
}

fn sync_config() -> BackendConfig {
    BackendConfig::new(BackendStyle::SyncInvoke, "http://localhost/separate")
        .with_progress_tick(Duration::from_secs(1))
}

fn polling_config() -> BackendConfig {
    BackendConfig::new(BackendStyle::Polling, "http://localhost/jobs")
        .with_poll_interval(Duration::from_secs(2))
}

fn hosted() -> SourceAudio {
    SourceAudio::url("https://blob.example.com/u1/song.mp3")
}

// ============================================================================
// Synchronous backend
// ============================================================================

#[tokio::test]
async fn test_sync_success_yields_ordered_labelled_stems() {
    let transport = Arc::new(ScriptedInvoke::new(json!({"vocals": "url1", "drums": "url2"})));
    let orchestrator = SeparationOrchestrator::new(transport, sync_config());

    let stems = orchestrator.start(hosted(), "htdemucs", None).await.unwrap();

    assert_eq!(
        stems,
        vec![
            StemDescriptor {
                id: "vocals".to_string(),
                label: "Vocals".to_string(),
                url: "url1".to_string(),
            },
            StemDescriptor {
                id: "drums".to_string(),
                label: "Drums".to_string(),
                url: "url2".to_string(),
            },
        ]
    );

    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Complete);
    assert_eq!(job.progress_percent, 100);
    assert_eq!(job.result_stems, Some(stems));
    assert!(job.error_message.is_none());
    assert!(job.finished_at.is_some());
}

#[tokio::test]
async fn test_sync_empty_output_is_no_stems_produced() {
    let transport = Arc::new(ScriptedInvoke::new(json!({})));
    let orchestrator = SeparationOrchestrator::new(transport, sync_config());

    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();
    assert!(matches!(err, StemError::NoStemsProduced));

    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Error);
    assert_eq!(job.error_kind, Some(ErrorKind::NoStemsProduced));
    assert!(job.error_message.is_some());
    assert!(job.result_stems.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sync_progress_ramps_but_never_reaches_hundred_early() {
    let transport = Arc::new(
        ScriptedInvoke::new(json!({"vocals": "https://cdn/v.mp3"}))
            .with_delay(Duration::from_secs(30)),
    );
    let orchestrator = SeparationOrchestrator::new(transport, sync_config());
    let mut events = orchestrator.subscribe();

    orchestrator.start(hosted(), "htdemucs", None).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(job) = events.try_recv() {
        seen.push((job.stage, job.progress_percent));
    }

    let (last_stage, last_percent) = *seen.last().unwrap();
    assert_eq!(last_stage, JobStage::Complete);
    assert_eq!(last_percent, 100);

    let before_completion = &seen[..seen.len() - 1];
    assert!(before_completion.iter().all(|(_, p)| *p < 100));
    assert!(before_completion.windows(2).all(|w| w[0].1 <= w[1].1));
    // the ramp moved while the call was outstanding
    assert!(before_completion.iter().any(|(_, p)| *p > 10));
}

#[tokio::test]
async fn test_single_requested_stem_is_forwarded() {
    let transport = Arc::new(ScriptedInvoke::new(json!({
        "vocals": "https://cdn/v.mp3",
        "instrumental": "https://cdn/i.mp3"
    })));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), sync_config());

    let stems = orchestrator
        .start(hosted(), "htdemucs", Some(vec!["vocals".to_string()]))
        .await
        .unwrap();

    assert_eq!(stems, vec![StemDescriptor::new("vocals", "https://cdn/v.mp3")]);
    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests[0].stem.as_deref(), Some("vocals"));
    assert_eq!(requests[0].audio_url, "https://blob.example.com/u1/song.mp3");
}

#[tokio::test]
async fn test_empty_model_uses_configured_default() {
    let transport = Arc::new(ScriptedInvoke::new(json!({"bass": "https://cdn/b.mp3"})));
    let config = sync_config().with_default_model("mdx_extra");
    let orchestrator = SeparationOrchestrator::new(transport.clone(), config);

    orchestrator.start(hosted(), "  ", None).await.unwrap();
    assert_eq!(transport.requests.lock().unwrap()[0].model_id, "mdx_extra");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_sync_call_resets_to_idle() {
    let transport = Arc::new(
        ScriptedInvoke::new(json!({"vocals": "https://cdn/v.mp3"}))
            .with_delay(Duration::from_secs(60)),
    );
    let orchestrator = SeparationOrchestrator::new(transport, sync_config());

    let runner = orchestrator.clone();
    let task = tokio::spawn(async move { runner.start(hosted(), "htdemucs", None).await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(orchestrator.snapshot().stage, JobStage::Processing);
    assert!(orchestrator.cancel());

    let result = task.await.unwrap();
    assert!(matches!(result, Err(StemError::Cancelled)));

    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Idle);
    assert!(job.cancelled);
    assert!(job.error_message.is_none());
    assert!(job.result_stems.is_none());
}

// ============================================================================
// Asynchronous backend
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_polled_progress_is_monotonic_and_completes() {
    let transport = Arc::new(ScriptedPolling::new(vec![
        JobStatus::new(RemoteJobState::Starting),
        JobStatus::new(RemoteJobState::Processing),
        JobStatus::new(RemoteJobState::Processing),
        JobStatus::new(RemoteJobState::Succeeded).with_output(stem_map(json!({
            "vocals": "https://cdn/v.mp3",
            "drums": "https://cdn/d.mp3",
            "bass": "https://cdn/b.mp3",
            "other": "https://cdn/o.mp3"
        }))),
    ]));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), polling_config());
    let mut events = orchestrator.subscribe();

    let stems = orchestrator.start(hosted(), "htdemucs", None).await.unwrap();
    assert_eq!(stems.len(), 4);
    assert_eq!(transport.polls(), 4);

    let mut percents = Vec::new();
    while let Ok(job) = events.try_recv() {
        if job.stage == JobStage::Complete {
            assert_eq!(job.progress_percent, 100);
        } else {
            assert!(job.progress_percent < 100);
        }
        percents.push(job.progress_percent);
    }
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
    assert_eq!(orchestrator.snapshot().id.as_deref(), Some("job-1"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_processing_stops_polling() {
    let transport = Arc::new(ScriptedPolling::new(Vec::new()));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), polling_config());

    let runner = orchestrator.clone();
    let task = tokio::spawn(async move { runner.start(hosted(), "htdemucs", None).await });

    // two polls at 2 s and 4 s
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.polls(), 2);
    assert_eq!(orchestrator.snapshot().stage, JobStage::Processing);

    orchestrator.cancel();
    let result = task.await.unwrap();
    assert!(matches!(result, Err(StemError::Cancelled)));

    let polls_at_cancel = transport.polls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.polls(), polls_at_cancel);
    assert_eq!(transport.cancels(), 1);

    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Idle);
    assert!(job.cancelled);
    assert!(job.error_message.is_none());
    assert!(job.error_kind.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_rejected_while_processing() {
    let transport = Arc::new(ScriptedPolling::new(Vec::new()));
    let orchestrator = SeparationOrchestrator::new(transport, polling_config());

    let runner = orchestrator.clone();
    let task = tokio::spawn(async move { runner.start(hosted(), "htdemucs", None).await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();
    assert!(matches!(err, StemError::JobInProgress { .. }));
    assert_eq!(orchestrator.snapshot().stage, JobStage::Processing);

    orchestrator.cancel();
    assert!(matches!(task.await.unwrap(), Err(StemError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_poll_budget_exhaustion_is_timeout() {
    let transport = Arc::new(ScriptedPolling::new(Vec::new()));
    let config = polling_config().with_max_polls(3);
    let orchestrator = SeparationOrchestrator::new(transport.clone(), config);

    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();
    assert!(matches!(err, StemError::Timeout { .. }));
    assert_eq!(transport.polls(), 3);
    assert_eq!(transport.cancels(), 1);

    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Error);
    assert_eq!(job.error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_poll_duration_budget_is_timeout() {
    let transport = Arc::new(ScriptedPolling::new(Vec::new()));
    let mut config = polling_config();
    config.max_poll_duration_ms = 5_000;
    let orchestrator = SeparationOrchestrator::new(transport.clone(), config);

    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();
    assert!(matches!(err, StemError::Timeout { .. }));
    assert!(transport.polls() <= 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_status_request_is_bounded_by_poll_duration() {
    let transport = Arc::new(StalledPolling::default());
    let mut config = polling_config();
    config.max_poll_duration_ms = 5_000;
    let orchestrator = SeparationOrchestrator::new(transport.clone(), config);

    let started = tokio::time::Instant::now();
    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();

    assert!(matches!(err, StemError::Timeout { .. }));
    assert!(started.elapsed() <= Duration::from_secs(6));
    assert_eq!(transport.polls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.snapshot().error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_start_releases_the_job() {
    let transport = Arc::new(ScriptedPolling::new(Vec::new()));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), polling_config());

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.start(hosted(), "htdemucs", None),
    )
    .await;
    assert!(outcome.is_err());

    assert!(!orchestrator.is_busy());
    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Idle);
    assert!(job.cancelled);
    assert!(job.error_kind.is_none());

    // the remote job is cancelled in the background
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.cancels(), 1);
    let polls_after_drop = transport.polls();

    // a new job is accepted rather than rejected as in progress
    let retry = tokio::time::timeout(
        Duration::from_secs(1),
        orchestrator.start(hosted(), "htdemucs", None),
    )
    .await;
    assert!(retry.is_err());
    assert_eq!(transport.polls(), polls_after_drop);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_carries_service_message() {
    let transport = Arc::new(ScriptedPolling::new(vec![
        JobStatus::new(RemoteJobState::Processing),
        JobStatus::new(RemoteJobState::Failed).with_error("CUDA out of memory"),
    ]));
    let orchestrator = SeparationOrchestrator::new(transport, polling_config());

    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();
    match err {
        StemError::RemoteProcessing { message, .. } => assert_eq!(message, "CUDA out of memory"),
        other => panic!("unexpected error: {:?}", other),
    }

    let job = orchestrator.snapshot();
    assert_eq!(job.stage, JobStage::Error);
    assert!(job.error_message.unwrap().contains("CUDA out of memory"));
}

#[tokio::test(start_paused = true)]
async fn test_remote_cancellation_is_processing_error() {
    let transport = Arc::new(ScriptedPolling::new(vec![JobStatus::new(
        RemoteJobState::Canceled,
    )]));
    let orchestrator = SeparationOrchestrator::new(transport, polling_config());

    let err = orchestrator.start(hosted(), "htdemucs", None).await.unwrap_err();
    assert!(matches!(err, StemError::RemoteProcessing { .. }));
    assert_eq!(orchestrator.snapshot().error_kind, Some(ErrorKind::RemoteProcessing));
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_placeholder_upload_url_fails_before_submission() {
    let transport = Arc::new(ScriptedInvoke::new(json!({"vocals": "https://cdn/v.mp3"})));
    let store = Arc::new(FixedUrlStore(
        "https://host/path/undefined-file.mp3".to_string(),
    ));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), sync_config())
        .with_uploader(Uploader::new(store, "user-1"));

    let err = orchestrator
        .start(SourceAudio::bytes("file.mp3", vec![1, 2, 3]), "htdemucs", None)
        .await
        .unwrap_err();

    assert!(matches!(err, StemError::InvalidLocation { .. }));
    assert_eq!(transport.submitted(), 0);
    assert_eq!(
        orchestrator.snapshot().error_kind,
        Some(ErrorKind::InvalidLocation)
    );
}

#[tokio::test]
async fn test_store_failure_is_upload_error() {
    let transport = Arc::new(ScriptedInvoke::new(json!({"vocals": "https://cdn/v.mp3"})));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), sync_config())
        .with_uploader(Uploader::new(Arc::new(BrokenStore), "user-1"));

    let err = orchestrator
        .start(SourceAudio::bytes("file.mp3", vec![1]), "htdemucs", None)
        .await
        .unwrap_err();

    assert!(matches!(err, StemError::Upload { .. }));
    assert!(err.is_retryable());
    assert_eq!(transport.submitted(), 0);
}

#[tokio::test]
async fn test_uploaded_source_url_is_submitted() {
    let transport = Arc::new(ScriptedInvoke::new(json!({"vocals": "https://cdn/v.mp3"})));
    let store = Arc::new(InMemoryBlobStore::new("https://blob.example.com"));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), sync_config())
        .with_uploader(Uploader::new(store.clone(), "user-1"));

    orchestrator
        .start(SourceAudio::bytes("Song.mp3", vec![9, 9]), "htdemucs", None)
        .await
        .unwrap();

    assert_eq!(store.len(), 1);
    let submitted = transport.requests.lock().unwrap()[0].audio_url.clone();
    assert!(submitted.starts_with("https://blob.example.com/user-1/"));
    assert_eq!(orchestrator.snapshot().source_url, Some(submitted));
}

#[tokio::test]
async fn test_malformed_hosted_url_is_invalid_location() {
    let transport = Arc::new(ScriptedInvoke::new(json!({"vocals": "https://cdn/v.mp3"})));
    let orchestrator = SeparationOrchestrator::new(transport.clone(), sync_config());

    let err = orchestrator
        .start(SourceAudio::url("ftp://files/song.mp3"), "htdemucs", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StemError::InvalidLocation { .. }));
    assert_eq!(transport.submitted(), 0);
}

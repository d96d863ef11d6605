//! Store Tests
//!
//! Uploads into the filesystem blob store and project records following a
//! separation job.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use url::Url;

use stemdeck::store::{
    FsBlobStore, InMemoryRecordStore, NewProject, ProjectLibrary, ProjectStatus, UrlOptions,
};
use stemdeck::transport::Uploader;
use stemdeck::{BackendConfig, BackendStyle, JobStage, SeparationJob, StemDescriptor, StemError};

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_upload_writes_file_and_signs_url() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        FsBlobStore::new(dir.path(), "https://files.example.com/media")
            .unwrap()
            .with_signing_key("k3y"),
    );
    let config = BackendConfig::new(BackendStyle::Polling, "https://separator.example.com/jobs");
    let uploader = Uploader::from_config(store.clone(), "user 7", &config);

    let url = uploader
        .upload("My Song (final).mp3", vec![0xAB; 64])
        .await
        .unwrap();

    let parsed = Url::parse(&url).unwrap();
    let key = parsed
        .path()
        .strip_prefix("/media/")
        .unwrap()
        .to_string();
    assert!(key.starts_with("user_7/"));
    assert!(key.ends_with("-My_Song__final_.mp3"));
    assert_eq!(std::fs::read(dir.path().join(&key)).unwrap(), vec![0xAB; 64]);

    let query: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let expires: i64 = query.iter().find(|(k, _)| k == "expires").unwrap().1.parse().unwrap();
    let signature = &query.iter().find(|(k, _)| k == "signature").unwrap().1;
    assert!(store.verify_signature(&key, expires, signature));
}

#[tokio::test]
async fn test_public_url_when_signing_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsBlobStore::new(dir.path(), "https://files.example.com").unwrap());
    let uploader = Uploader::new(store, "owner").with_url_options(UrlOptions::public());

    let url = uploader.upload("take.wav", vec![1, 2, 3]).await.unwrap();
    assert!(url.starts_with("https://files.example.com/owner/"));
    assert!(!url.contains('?'));
}

// ============================================================================
// Project records
// ============================================================================

#[tokio::test]
async fn test_project_follows_job_lifecycle() {
    let library = ProjectLibrary::new(Arc::new(InMemoryRecordStore::new()));
    let project = library
        .create_project(NewProject::new("Demo").with_source_url("https://files.example.com/demo.mp3"))
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Uploaded);

    let mut job = SeparationJob::started("htdemucs", Some(vec!["vocals".to_string()]));
    job.stage = JobStage::Processing;
    library.record_job(&project.id, &job).await.unwrap();

    let stored = library.project(&project.id).await.unwrap();
    assert_eq!(stored.status, ProjectStatus::Processing);
    assert_eq!(
        stored.separation_config.unwrap().selected_stems,
        vec!["vocals".to_string()]
    );

    job.stage = JobStage::Complete;
    job.result_stems = Some(vec![StemDescriptor::new("vocals", "https://cdn/v.mp3")]);
    library.record_job(&project.id, &job).await.unwrap();

    let config = library.separation_config(&project.id).await.unwrap();
    assert_eq!(config.selected_stems, vec!["vocals".to_string()]);
    assert_eq!(config.stems[0].label, "Vocals");
}

#[tokio::test]
async fn test_cancelled_job_returns_project_to_configuring() {
    let library = ProjectLibrary::new(Arc::new(InMemoryRecordStore::new()));
    let project = library.create_project(NewProject::new("Demo")).await.unwrap();

    let mut job = SeparationJob::started("htdemucs", None);
    job.stage = JobStage::Uploading;
    library.record_job(&project.id, &job).await.unwrap();
    library
        .record_job(&project.id, &SeparationJob::cancelled())
        .await
        .unwrap();

    assert_eq!(
        library.project(&project.id).await.unwrap().status,
        ProjectStatus::Configuring
    );
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let library = ProjectLibrary::new(Arc::new(InMemoryRecordStore::new()));
    let err = library.load_mix("missing").await.unwrap_err();
    assert!(matches!(err, StemError::RecordNotFound { .. }));
}

//! In-memory store implementations
//!
//! Useful for embedding and tests. Nothing survives the process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::project::{NewProject, Project, ProjectFilter, ProjectPatch};
use super::{BlobStore, RecordStore, UrlOptions};
use crate::error::{Result, StemError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Blob store keeping objects in a map, served under a base URL.
pub struct InMemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Bytes stored under `path`, if any
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        lock(&self.objects).insert(path.to_string(), bytes);
        Ok(())
    }

    async fn get_url(&self, path: &str, options: UrlOptions) -> Result<String> {
        if !lock(&self.objects).contains_key(path) {
            return Err(StemError::Store {
                reason: format!("no object stored at '{}'", path),
            });
        }

        let url = format!("{}/{}", self.base_url, path);
        if options.signed {
            let ttl = options.ttl_seconds.unwrap_or(3_600) as i64;
            let expires = Utc::now().timestamp() + ttl;
            Ok(format!("{}?expires={}", url, expires))
        } else {
            Ok(url)
        }
    }
}

/// Record store keeping projects in a map.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<String, Project>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record: NewProject) -> Result<Project> {
        let project = record.into_project();
        lock(&self.records).insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn get(&self, id: &str) -> Result<Project> {
        lock(&self.records)
            .get(id)
            .cloned()
            .ok_or_else(|| StemError::RecordNotFound { id: id.to_string() })
    }

    async fn update(&self, id: &str, patch: ProjectPatch) -> Result<()> {
        let mut records = lock(&self.records);
        let project = records
            .get_mut(id)
            .ok_or_else(|| StemError::RecordNotFound { id: id.to_string() })?;
        patch.apply(project);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        lock(&self.records)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StemError::RecordNotFound { id: id.to_string() })
    }

    async fn list(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = lock(&self.records)
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        // Newest first
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProjectStatus;

    #[tokio::test]
    async fn test_blob_roundtrip_and_urls() {
        let store = InMemoryBlobStore::new("https://cdn.example.com/");
        store
            .put_object("user-1/abc-song.mp3", vec![1, 2, 3])
            .await
            .unwrap();

        assert_eq!(store.object("user-1/abc-song.mp3"), Some(vec![1, 2, 3]));

        let url = store
            .get_url("user-1/abc-song.mp3", UrlOptions::public())
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/user-1/abc-song.mp3");

        let signed = store
            .get_url("user-1/abc-song.mp3", UrlOptions::signed(60))
            .await
            .unwrap();
        assert!(signed.contains("?expires="));
    }

    #[tokio::test]
    async fn test_url_for_missing_object_fails() {
        let store = InMemoryBlobStore::new("https://cdn.example.com");
        assert!(store.get_url("nope", UrlOptions::public()).await.is_err());
    }

    #[tokio::test]
    async fn test_record_crud() {
        let store = InMemoryRecordStore::new();
        let created = store.create(NewProject::new("Song")).await.unwrap();

        store
            .update(&created.id, ProjectPatch::status(ProjectStatus::Configuring))
            .await
            .unwrap();
        let loaded = store.get(&created.id).await.unwrap();
        assert_eq!(loaded.status, ProjectStatus::Configuring);

        let listed = store.list(&ProjectFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);

        store.delete(&created.id).await.unwrap();
        assert!(matches!(
            store.get(&created.id).await,
            Err(StemError::RecordNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = InMemoryRecordStore::new();
        let result = store.update("missing", ProjectPatch::default()).await;
        assert!(matches!(result, Err(StemError::RecordNotFound { .. })));
    }
}

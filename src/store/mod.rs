//! Project/Library Store
//!
//! The persistence boundary. The core consumes two collaborators:
//! - `BlobStore`: put bytes under a path, hand back a fetchable URL
//! - `RecordStore`: CRUD over project records
//!
//! In-memory implementations of both, a filesystem-backed blob store, and a
//! `ProjectLibrary` facade that records separation and mix state.

pub mod fs;
pub mod library;
pub mod memory;
pub mod project;

use async_trait::async_trait;

use crate::error::Result;

pub use fs::FsBlobStore;
pub use library::ProjectLibrary;
pub use memory::{InMemoryBlobStore, InMemoryRecordStore};
pub use project::{NewProject, Project, ProjectFilter, ProjectPatch, ProjectStatus, SeparationConfig};

/// How a fetch URL should be issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UrlOptions {
    /// Issue a time-bounded signed URL instead of a public one
    pub signed: bool,
    /// Lifetime of a signed URL
    pub ttl_seconds: Option<u64>,
}

impl UrlOptions {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn signed(ttl_seconds: u64) -> Self {
        Self {
            signed: true,
            ttl_seconds: Some(ttl_seconds),
        }
    }
}

/// Object storage for uploaded audio
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `path`, replacing anything already there
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Get a URL from which `path` can be fetched
    async fn get_url(&self, path: &str, options: UrlOptions) -> Result<String>;
}

/// Record storage for project metadata
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: NewProject) -> Result<Project>;

    async fn get(&self, id: &str) -> Result<Project>;

    async fn update(&self, id: &str, patch: ProjectPatch) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn list(&self, filter: &ProjectFilter) -> Result<Vec<Project>>;
}

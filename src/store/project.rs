//! Project record schema
//!
//! Only the fields the core reads or writes. Anything else a record store
//! keeps is its own business.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mixer::MixSettings;
use crate::stem::StemDescriptor;

/// Lifecycle status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Uploaded,
    Configuring,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Uploaded => "uploaded",
            ProjectStatus::Configuring => "configuring",
            ProjectStatus::Processing => "processing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Serialized separation configuration stored on a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeparationConfig {
    /// Stems the user asked for
    #[serde(default)]
    pub selected_stems: Vec<String>,

    /// Stems the separation produced
    #[serde(default)]
    pub stems: Vec<StemDescriptor>,

    /// Last saved volume/mute/solo settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix: Option<MixSettings>,
}

/// A project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub artist: Option<String>,

    #[serde(default)]
    pub genre: Option<String>,

    #[serde(default)]
    pub bpm: Option<f32>,

    #[serde(default)]
    pub key: Option<String>,

    /// Duration of the source audio in seconds
    #[serde(default)]
    pub duration: Option<f64>,

    pub status: ProjectStatus,

    /// URL of the uploaded source audio
    #[serde(default)]
    pub source_url: Option<String>,

    #[serde(default)]
    pub separation_config: Option<SeparationConfig>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub title: String,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<f32>,
    pub key: Option<String>,
    pub duration: Option<f64>,
    pub source_url: Option<String>,
}

impl NewProject {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Materialize the record with a fresh id and timestamps.
    pub fn into_project(self) -> Project {
        let now = Utc::now();
        Project {
            id: uuid::Uuid::new_v4().to_string(),
            title: self.title,
            artist: self.artist,
            genre: self.genre,
            bpm: self.bpm,
            key: self.key,
            duration: self.duration,
            status: ProjectStatus::Uploaded,
            source_url: self.source_url,
            separation_config: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<f32>,
    pub key: Option<String>,
    pub duration: Option<f64>,
    pub status: Option<ProjectStatus>,
    pub source_url: Option<String>,
    pub separation_config: Option<SeparationConfig>,
}

impl ProjectPatch {
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_separation_config(mut self, config: SeparationConfig) -> Self {
        self.separation_config = Some(config);
        self
    }

    /// Apply this patch to a record, bumping `updated_at`.
    pub fn apply(self, project: &mut Project) {
        if let Some(title) = self.title {
            project.title = title;
        }
        if let Some(artist) = self.artist {
            project.artist = Some(artist);
        }
        if let Some(genre) = self.genre {
            project.genre = Some(genre);
        }
        if let Some(bpm) = self.bpm {
            project.bpm = Some(bpm);
        }
        if let Some(key) = self.key {
            project.key = Some(key);
        }
        if let Some(duration) = self.duration {
            project.duration = Some(duration);
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(source_url) = self.source_url {
            project.source_url = Some(source_url);
        }
        if let Some(config) = self.separation_config {
            project.separation_config = Some(config);
        }
        project.updated_at = Utc::now();
    }
}

/// Filter for listing projects.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    /// Case-insensitive substring match on the title
    pub title_contains: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(status) = self.status {
            if project.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.title_contains {
            if !project
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

//! Project library
//!
//! Facade over a [`RecordStore`] that writes the separation lifecycle and
//! mix settings back onto project records.

use std::sync::Arc;

use super::project::{NewProject, Project, ProjectPatch, ProjectStatus, SeparationConfig};
use super::RecordStore;
use crate::error::Result;
use crate::mixer::MixSettings;
use crate::orchestrator::{JobStage, SeparationJob};
use crate::stem::StemDescriptor;

pub struct ProjectLibrary {
    records: Arc<dyn RecordStore>,
}

impl ProjectLibrary {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn create_project(&self, project: NewProject) -> Result<Project> {
        let project = self.records.create(project).await?;
        tracing::info!(project = %project.id, title = %project.title, "project created");
        Ok(project)
    }

    pub async fn project(&self, id: &str) -> Result<Project> {
        self.records.get(id).await
    }

    /// Stored separation config, or an empty one
    pub async fn separation_config(&self, id: &str) -> Result<SeparationConfig> {
        Ok(self.records.get(id).await?.separation_config.unwrap_or_default())
    }

    async fn update(&self, id: &str, status: ProjectStatus, config: SeparationConfig) -> Result<()> {
        self.records
            .update(id, ProjectPatch::status(status).with_separation_config(config))
            .await?;
        tracing::debug!(project = id, %status, "project updated");
        Ok(())
    }

    /// A separation started: record the selection, clear earlier results
    pub async fn begin_separation(&self, id: &str, selected_stems: &[String]) -> Result<()> {
        let config = SeparationConfig {
            selected_stems: selected_stems.to_vec(),
            ..SeparationConfig::default()
        };
        self.update(id, ProjectStatus::Processing, config).await
    }

    pub async fn complete_separation(&self, id: &str, stems: &[StemDescriptor]) -> Result<()> {
        let mut config = self.separation_config(id).await?;
        config.stems = stems.to_vec();
        self.update(id, ProjectStatus::Completed, config).await
    }

    pub async fn fail_separation(&self, id: &str) -> Result<()> {
        let config = self.separation_config(id).await?;
        self.update(id, ProjectStatus::Error, config).await
    }

    /// Mirror a job snapshot onto the project
    pub async fn record_job(&self, id: &str, job: &SeparationJob) -> Result<()> {
        match job.stage {
            JobStage::Uploading | JobStage::Processing => {
                let selected = job.requested_stems.clone().unwrap_or_default();
                self.begin_separation(id, &selected).await
            }
            JobStage::Complete => {
                let stems = job.result_stems.as_deref().unwrap_or_default();
                self.complete_separation(id, stems).await
            }
            JobStage::Error => self.fail_separation(id).await,
            JobStage::Idle if job.cancelled => {
                let config = self.separation_config(id).await?;
                self.update(id, ProjectStatus::Configuring, config).await
            }
            JobStage::Idle => Ok(()),
        }
    }

    pub async fn save_mix(&self, id: &str, mix: &MixSettings) -> Result<()> {
        let mut config = self.separation_config(id).await?;
        config.mix = Some(mix.clone());
        self.records
            .update(id, ProjectPatch::default().with_separation_config(config))
            .await?;
        tracing::info!(project = id, tracks = mix.tracks.len(), "mix saved");
        Ok(())
    }

    pub async fn load_mix(&self, id: &str) -> Result<Option<MixSettings>> {
        Ok(self.separation_config(id).await?.mix)
    }
}

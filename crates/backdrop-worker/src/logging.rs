//! Structured script-job logging.

use tracing::{info, Span};

/// Logs script job lifecycle events with the job's identity attached.
#[derive(Debug, Clone)]
pub struct ScriptLogger {
    job_id: String,
    project_id: String,
}

impl ScriptLogger {
    pub fn new(job_id: &str, project_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn log_start(&self, scenes: usize) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            scenes,
            "Script job started"
        );
    }

    /// Log the decision made for one scene.
    pub fn log_scene(&self, scene_id: &str, order: u32, background_id: &str, inherited: bool) {
        info!(
            job_id = %self.job_id,
            scene_id,
            order,
            background_id,
            inherited,
            "Scene background decided"
        );
    }

    pub fn log_completion(&self, scenes: usize, backgrounds: usize, inherited: usize) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            scenes,
            backgrounds,
            inherited,
            "Script job completed"
        );
    }

    /// Span covering the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "script_job",
            job_id = %self.job_id,
            project_id = %self.project_id
        )
    }
}

//! Worker configuration.

use std::path::PathBuf;

use backdrop_continuity::ContinuityConfig;
use backdrop_llm_client::LlmClientConfig;

use crate::error::WorkerResult;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory storyboard reports are written to
    pub output_dir: PathBuf,
    /// Gateway client settings
    pub llm: LlmClientConfig,
    /// Continuity engine settings
    pub continuity: ContinuityConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/tmp/backdrop"),
            llm: LlmClientConfig::default(),
            continuity: ContinuityConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self {
            output_dir: std::env::var("BACKDROP_OUTPUT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp/backdrop")),
            llm: LlmClientConfig::from_env(),
            continuity: ContinuityConfig::from_env()?,
        })
    }
}

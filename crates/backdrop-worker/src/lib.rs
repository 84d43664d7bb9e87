//! Storyboard worker.
//!
//! This crate provides:
//! - Script job loading and validation
//! - Scene-by-scene background continuity decisions
//! - Per-job storyboard reports for the rendering pipeline

pub mod config;
pub mod error;
pub mod logging;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::ScriptLogger;
pub use processor::{ScenePlan, ScriptJob, ScriptProcessor, ScriptReport};

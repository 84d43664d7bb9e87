//! Script job processing.
//!
//! A job is one parsed script. Scenes are processed strictly in ascending
//! `order`: the library is extracted up front, then every scene gets an
//! inheritance decision against the committed background before the next
//! scene is looked at.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use backdrop_continuity::{
    validate_background_input, BackgroundComparator, BackgroundDescriber, BackgroundExtractor,
    BackgroundRegistry, SIMILARITY_THRESHOLD,
};
use backdrop_llm_client::LlmClient;
use backdrop_models::{BackgroundId, RegistrySnapshot, SceneInput};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ScriptLogger;

/// A parsed script submitted for background planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptJob {
    pub job_id: String,

    #[serde(default)]
    pub project_id: String,

    pub scenes: Vec<SceneInput>,
}

impl ScriptJob {
    /// Load a job from a JSON file.
    pub async fn from_path(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reject jobs that can't be processed deterministically.
    ///
    /// The job id must be usable as a file name; scene orders and scene ids
    /// must be unique; explicit backgrounds must pass input validation.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.job_id.is_empty()
            || !self
                .job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(WorkerError::invalid_job(format!(
                "job id must be non-empty and contain only letters, digits, '-' or '_': {:?}",
                self.job_id
            )));
        }

        let mut orders = HashSet::new();
        let mut scene_ids = HashSet::new();
        for scene in &self.scenes {
            if !orders.insert(scene.order) {
                return Err(WorkerError::invalid_job(format!(
                    "duplicate scene order {}",
                    scene.order
                )));
            }
            if !scene_ids.insert(scene.scene_key()) {
                return Err(WorkerError::invalid_job(format!(
                    "duplicate scene id {}",
                    scene.scene_key()
                )));
            }
            if let Some(background) = scene.background.as_deref().filter(|b| !b.trim().is_empty()) {
                validate_background_input(background).map_err(|source| WorkerError::InvalidScene {
                    order: scene.order,
                    source,
                })?;
            }
        }

        Ok(())
    }
}

/// Background decision for one scene, as handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePlan {
    pub scene_id: String,
    pub order: u32,
    pub background_id: BackgroundId,
    /// Description the background resolves to (the committed one when inherited)
    pub description: String,
    pub is_inherited: bool,
    /// Whether the asset already rendered for `background_id` should be reused
    pub reuse_asset: bool,
}

/// Outcome of one script job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReport {
    pub job_id: String,
    pub project_id: String,
    pub generated_at: DateTime<Utc>,
    pub scenes: Vec<ScenePlan>,
    pub snapshot: RegistrySnapshot,
}

impl ScriptReport {
    /// Distinct backgrounds the renderer has to produce.
    pub fn background_count(&self) -> usize {
        self.scenes
            .iter()
            .map(|plan| &plan.background_id)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn inherited_count(&self) -> usize {
        self.scenes.iter().filter(|plan| plan.is_inherited).count()
    }

    /// Write the report to `<dir>/<job_id>.json`, creating `dir` if needed.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> WorkerResult<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.json", self.job_id));
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

/// Runs script jobs through the continuity engine.
///
/// Owns its registry; one processor handles one job at a time.
pub struct ScriptProcessor {
    extractor: BackgroundExtractor,
    registry: BackgroundRegistry,
    threshold: f64,
}

impl ScriptProcessor {
    pub fn new(extractor: BackgroundExtractor, registry: BackgroundRegistry, threshold: f64) -> Self {
        Self {
            extractor,
            registry,
            threshold,
        }
    }

    /// Processor using only local heuristics and token overlap.
    pub fn offline() -> Self {
        Self::new(
            BackgroundExtractor::offline(),
            BackgroundRegistry::offline(),
            SIMILARITY_THRESHOLD,
        )
    }

    /// Processor backed by the gateway described in `config`.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let client = Arc::new(LlmClient::new(config.llm.clone())?);

        let comparator = BackgroundComparator::from_client(client.clone(), &config.continuity);
        let describer = client
            .config()
            .has_api_key()
            .then(|| client.clone() as Arc<dyn BackgroundDescriber>);

        info!(
            networked_tiers = comparator.tier_count(),
            describer = describer.is_some(),
            threshold = config.continuity.similarity_threshold,
            "Continuity engine configured"
        );

        Ok(Self::new(
            BackgroundExtractor::new(describer, config.continuity.extraction_timeout),
            BackgroundRegistry::new(Arc::new(comparator)),
            config.continuity.similarity_threshold,
        ))
    }

    /// Plan backgrounds for every scene of `job`.
    pub async fn process(&mut self, job: ScriptJob) -> WorkerResult<ScriptReport> {
        let logger = ScriptLogger::new(&job.job_id, &job.project_id);
        let span = logger.create_span();
        self.process_inner(job, &logger).instrument(span).await
    }

    async fn process_inner(&mut self, job: ScriptJob, logger: &ScriptLogger) -> WorkerResult<ScriptReport> {
        job.validate()?;

        let ScriptJob {
            job_id,
            project_id,
            mut scenes,
        } = job;
        scenes.sort_by_key(|scene| scene.order);
        logger.log_start(scenes.len());

        // Each job starts a fresh chain over a fresh library
        self.registry.clear();
        let library = self.extractor.extract_backgrounds(&scenes).await;

        // Every scene order is attributed to exactly one library entry, so
        // sorted by order this lines up with `scenes`.
        let mut attribution: Vec<(u32, BackgroundId, String)> = library
            .iter()
            .flat_map(|candidate| {
                candidate
                    .scene_indices
                    .iter()
                    .map(|&order| (order, candidate.id.clone(), candidate.description.clone()))
            })
            .collect();
        attribution.sort_by_key(|(order, _, _)| *order);
        self.registry.initialize_backgrounds(library);

        let mut plans = Vec::with_capacity(scenes.len());
        for (scene, (order, library_id, description)) in scenes.iter().zip(attribution) {
            debug_assert_eq!(scene.order, order);
            let scene_id = scene.scene_key();

            let metadata = self
                .registry
                .decide_inheritance(&description, self.threshold)
                .await;
            logger.log_scene(&scene_id, scene.order, metadata.id.as_str(), metadata.is_inherited);

            plans.push(ScenePlan {
                scene_id: scene_id.clone(),
                order: scene.order,
                background_id: metadata.id.clone(),
                description: metadata.description.clone(),
                is_inherited: metadata.is_inherited,
                reuse_asset: metadata.is_inherited,
            });

            self.registry
                .set_scene_background(scene_id, scene.order, Some(library_id), Some(metadata));
        }

        let report = ScriptReport {
            job_id,
            project_id,
            generated_at: Utc::now(),
            scenes: plans,
            snapshot: self.registry.export(),
        };

        logger.log_completion(
            report.scenes.len(),
            report.background_count(),
            report.inherited_count(),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(scenes: Vec<SceneInput>) -> ScriptJob {
        ScriptJob {
            job_id: "job-1".to_string(),
            project_id: "pilot".to_string(),
            scenes,
        }
    }

    #[test]
    fn test_job_deserializes_camel_case() {
        let json = r#"{
            "jobId": "ep-01",
            "scenes": [
                {"order": 2, "shotDescription": "Wide shot inside the barn"},
                {"order": 1, "sceneId": "intro", "background": "Farmhouse kitchen"}
            ]
        }"#;

        let job: ScriptJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.job_id, "ep-01");
        assert_eq!(job.project_id, "");
        assert_eq!(job.scenes.len(), 2);
        assert_eq!(job.scenes[1].scene_key(), "intro");
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unsafe_job_id() {
        let mut bad = job(vec![]);
        bad.job_id = "../escape".to_string();
        assert!(matches!(bad.validate(), Err(WorkerError::InvalidJob(_))));

        bad.job_id = String::new();
        assert!(matches!(bad.validate(), Err(WorkerError::InvalidJob(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_orders() {
        let bad = job(vec![
            SceneInput::new(1).with_scene_id("a"),
            SceneInput::new(1).with_scene_id("b"),
        ]);
        assert!(matches!(bad.validate(), Err(WorkerError::InvalidJob(_))));
    }

    #[test]
    fn test_validate_rejects_bad_explicit_background() {
        let bad = job(vec![
            SceneInput::new(1).with_background("Old mill by the river"),
            SceneInput::new(2).with_background("<script>"),
        ]);
        match bad.validate() {
            Err(WorkerError::InvalidScene { order, .. }) => assert_eq!(order, 2),
            other => panic!("expected invalid scene, got {:?}", other),
        }

        // Blank explicit backgrounds are treated as absent
        let ok = job(vec![SceneInput::new(1).with_background("   ")]);
        assert!(ok.validate().is_ok());
    }

    #[tokio::test]
    async fn test_process_sorts_scenes_by_order() {
        let mut processor = ScriptProcessor::offline();
        let report = processor
            .process(job(vec![
                SceneInput::new(3).with_background("Hospital corridor"),
                SceneInput::new(1).with_background("Quiet lake shore"),
                SceneInput::new(2).with_background("Quiet lake shore"),
            ]))
            .await
            .unwrap();

        let orders: Vec<u32> = report.scenes.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);

        let inherited: Vec<bool> = report.scenes.iter().map(|p| p.is_inherited).collect();
        assert_eq!(inherited, vec![false, true, false]);
        assert_eq!(report.background_count(), 2);
        assert_eq!(report.inherited_count(), 1);
    }

    #[tokio::test]
    async fn test_process_links_library_entries() {
        let mut processor = ScriptProcessor::offline();
        let report = processor
            .process(job(vec![
                SceneInput::new(1).with_background("Quiet lake shore"),
                SceneInput::new(2).with_background("quiet lake shore!"),
            ]))
            .await
            .unwrap();

        assert_eq!(report.snapshot.backgrounds.len(), 1);
        let library = &report.snapshot.backgrounds[0];
        assert_eq!(library.scene_indices, vec![1, 2]);

        for assignment in &report.snapshot.scene_backgrounds {
            assert_eq!(assignment.selected_background_id.as_ref(), Some(&library.id));
            assert_eq!(
                assignment.selected_background_description.as_deref(),
                Some("Quiet lake shore")
            );
            assert!(assignment.metadata.is_some());
        }
    }

    #[tokio::test]
    async fn test_each_job_starts_a_fresh_chain() {
        let mut processor = ScriptProcessor::offline();
        let first = processor
            .process(job(vec![SceneInput::new(1).with_background("Quiet lake shore")]))
            .await
            .unwrap();
        let second = processor
            .process(job(vec![SceneInput::new(1).with_background("Quiet lake shore")]))
            .await
            .unwrap();

        assert!(!second.scenes[0].is_inherited);
        assert_ne!(second.scenes[0].background_id, first.scenes[0].background_id);
        assert_eq!(second.snapshot.scene_backgrounds.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_job_produces_empty_report() {
        let mut processor = ScriptProcessor::offline();
        let report = processor.process(job(vec![])).await.unwrap();
        assert!(report.scenes.is_empty());
        assert!(report.snapshot.is_empty());
    }
}

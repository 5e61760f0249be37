//! Run an ordered list of stages, threading each stage's produced value into the next
//!
//! Execution is fail-fast: the first stage that doesn't succeed ends the pipeline and its
//! diagnostic becomes the work item's error. Side effects of stages that already ran (an upload,
//! a started run) are left as they are.

use async_trait::async_trait;
use log::{info, warn};

use crate::batch::WorkItemResult;

/// Upload, submit and retrieve stages backed by the platform
pub mod stages;

/// What one stage reports back to the executor
///
/// `produced_value` is the only thing passed on to the next stage, e.g. the run id assigned by
/// the submit stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage_name: String,
    pub succeeded: bool,
    pub produced_value: Option<String>,
    pub diagnostic: Option<String>,
}

impl StageResult {
    pub fn success(stage_name: &str, produced_value: impl Into<String>) -> Self {
        StageResult {
            stage_name: stage_name.to_string(),
            succeeded: true,
            produced_value: Some(produced_value.into()),
            diagnostic: None,
        }
    }

    pub fn failure(stage_name: &str, diagnostic: impl ToString) -> Self {
        StageResult {
            stage_name: stage_name.to_string(),
            succeeded: false,
            produced_value: None,
            diagnostic: Some(diagnostic.to_string()),
        }
    }
}

/// One discrete step with a single input and a single produced value
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// `input` is the previous stage's produced value, or the pipeline's initial input
    async fn run(&self, input: Option<String>) -> StageResult;
}

pub struct StagePipeline {
    stages: Vec<Box<dyn Stage>>,
}

/// A finished pipeline: the work item result plus the last value a stage produced
pub struct PipelineOutcome {
    pub result: WorkItemResult,
    pub final_value: Option<String>,
}

impl StagePipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        StagePipeline { stages }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage in order for one work item
    pub async fn run(&self, work_item_id: &str, initial: Option<String>) -> PipelineOutcome {
        let mut value = initial;
        let total = self.stages.len();

        for (i, stage) in self.stages.iter().enumerate() {
            info!("[{}] stage {}/{}: {}", work_item_id, i + 1, total, stage.name());
            let result = stage.run(value.take()).await;

            if !result.succeeded {
                let diagnostic = result.diagnostic
                    .unwrap_or_else(|| "stage reported failure without a diagnostic".to_string());
                warn!("[{}] stage {} failed, skipping {} remaining: {}", work_item_id, result.stage_name, total - i - 1, diagnostic);
                return PipelineOutcome {
                    result: WorkItemResult::failed(work_item_id, format!("{}: {}", result.stage_name, diagnostic)),
                    final_value: None,
                };
            }
            value = result.produced_value;
        }

        info!("[{}] all {} stages succeeded", work_item_id, total);
        PipelineOutcome { result: WorkItemResult::completed(work_item_id), final_value: value }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::batch::ItemStatus;

    /// Records the input it saw, then succeeds with a fixed value or fails
    struct Scripted {
        name: &'static str,
        outcome: Result<&'static str, &'static str>,
        seen: Arc<Mutex<Vec<(&'static str, Option<String>)>>>,
    }

    #[async_trait]
    impl Stage for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, input: Option<String>) -> StageResult {
            self.seen.lock().expect("lock").push((self.name, input));
            match self.outcome {
                Ok(value) => StageResult::success(self.name, value),
                Err(diagnostic) => StageResult::failure(self.name, diagnostic),
            }
        }
    }

    type Seen = Arc<Mutex<Vec<(&'static str, Option<String>)>>>;

    fn stage(name: &'static str, outcome: Result<&'static str, &'static str>, seen: &Seen) -> Box<dyn Stage> {
        Box::new(Scripted { name, outcome, seen: seen.clone() })
    }

    #[tokio::test]
    async fn test_values_are_threaded_between_stages() {
        let seen: Seen = Default::default();
        let pipeline = StagePipeline::new(vec![
            stage("upload", Ok("S1"), &seen),
            stage("submit", Ok("run-1"), &seen),
            stage("retrieve", Ok("/results/S1"), &seen),
        ]);

        let outcome = pipeline.run("S1", Some("/data/S1".to_string())).await;
        assert_eq!(outcome.result.status, ItemStatus::Completed);
        assert_eq!(outcome.final_value.as_deref(), Some("/results/S1"));
        assert_eq!(*seen.lock().expect("lock"), vec![
            ("upload", Some("/data/S1".to_string())),
            ("submit", Some("S1".to_string())),
            ("retrieve", Some("run-1".to_string())),
        ]);
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_stages() {
        let seen: Seen = Default::default();
        let pipeline = StagePipeline::new(vec![
            stage("A", Ok("x"), &seen),
            stage("B", Err("pipeline not found"), &seen),
            stage("C", Ok("never"), &seen),
        ]);

        let outcome = pipeline.run("S1", None).await;
        assert_eq!(outcome.result.status, ItemStatus::Failed);
        assert_eq!(outcome.result.error.as_deref(), Some("B: pipeline not found"));
        assert!(outcome.final_value.is_none());

        let names: Vec<&str> = seen.lock().expect("lock").iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes_with_initial_value() {
        let outcome = StagePipeline::new(vec![]).run("S1", Some("in".to_string())).await;
        assert!(outcome.result.is_completed());
        assert_eq!(outcome.final_value.as_deref(), Some("in"));
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchDispatcher, BatchOutcome, ItemRunner, WorkItem, WorkItemResult};
use crate::error::PlatformError;
use crate::params;
use crate::pipeline::stages::{RetrieveStage, SubmitStage, UploadStage};
use crate::pipeline::{Stage, StagePipeline};
use crate::platform::Platform;
use crate::poll::StatusPoller;

/// Per-item results land in `<results_root>/<sample_id>` unless told otherwise
pub static DEFAULT_RESULTS_ROOT: &str = "results";

/// Runs upload -> submit -> retrieve against the platform for each work item
pub struct PlatformItemRunner {
    pub platform: Arc<dyn Platform>,
    pub project_id: String,
    pub results_root: PathBuf,
    pub poller: StatusPoller,
}

impl PlatformItemRunner {
    pub fn stages_for(&self, item: &WorkItem) -> StagePipeline {
        let parameters = params::generate(item);
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(UploadStage {
                platform: self.platform.clone(),
                project_id: self.project_id.clone(),
                local_path: item.source_location.clone(),
                remote_name: item.id.clone(),
            }),
            Box::new(SubmitStage {
                platform: self.platform.clone(),
                project_id: self.project_id.clone(),
                pipeline_name: item.pipeline.clone(),
                parameters,
                analysis_name: Some(item.id.clone()),
            }),
            Box::new(RetrieveStage {
                platform: self.platform.clone(),
                project_id: self.project_id.clone(),
                poller: self.poller.clone(),
                output_dir: self.results_root.join(&item.id),
            }),
        ];
        StagePipeline::new(stages)
    }
}

#[async_trait]
impl ItemRunner for PlatformItemRunner {
    async fn run_item(&self, item: &WorkItem) -> WorkItemResult {
        info!("[{}] {} analysis of {} against {}", item.id, item.analysis_type, item.source_location.display(), item.reference_name);
        let pipeline = self.stages_for(item);
        pipeline.run(&item.id, None).await.result
    }
}

/// Everything a batch needs besides its items
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub project: String,
    pub results_root: PathBuf,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

impl BatchPlan {
    /// Resolve the project, then run every item against it
    ///
    /// A project that can't be resolved fails the whole batch before any item is dispatched.
    pub async fn run(&self, platform: Arc<dyn Platform>, items: Vec<WorkItem>, cancel: CancellationToken) -> Result<BatchOutcome, PlatformError> {
        let project_id = platform.resolve_project_id(&self.project).await?;
        info!("Running {} work items in project {} ({})", items.len(), self.project, project_id);

        let runner = PlatformItemRunner {
            platform: platform.clone(),
            project_id,
            results_root: self.results_root.clone(),
            poller: StatusPoller::new(platform, self.poll_interval, cancel.clone()).with_timeout(self.timeout),
        };
        Ok(BatchDispatcher::new(Arc::new(runner), self.concurrency, cancel).run_batch(items).await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::batch::{BatchDispatcher, ItemStatus};
    use crate::platform::fake::{completed, file, run, FakePlatform};
    use crate::platform::RunStatus;

    fn runner(fake: &Arc<FakePlatform>, results_root: PathBuf) -> PlatformItemRunner {
        PlatformItemRunner {
            platform: fake.clone(),
            project_id: "prj".to_string(),
            results_root,
            poller: StatusPoller::new(fake.clone(), Duration::from_secs(60), CancellationToken::new()),
        }
    }

    fn plan(project: &str, results_root: PathBuf) -> BatchPlan {
        BatchPlan {
            project: project.to_string(),
            results_root,
            concurrency: 2,
            poll_interval: Duration::from_secs(60),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_unknown_project_fails_before_dispatch() {
        let fake = Arc::new(FakePlatform::new());
        fake.missing_project("Ghost");
        let items = vec![WorkItem::new("S1", "/data/S1", "dragen-germline", "hg38")];

        let result = plan("Ghost", PathBuf::from("results")).run(fake.clone(), items, CancellationToken::new()).await;
        assert!(matches!(result, Err(PlatformError::NotFound { kind: "project", .. })));
        assert_eq!(fake.calls(), vec!["resolve_project Ghost"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_runs_items_in_resolved_project() {
        let fake = Arc::new(FakePlatform::new());
        fake.script_statuses("run-S1", vec![completed("run-S1", "out-S1")]);
        fake.add_folder("out-S1", vec![file("fil.1", "S1.bam")]);
        let dir = tempfile::tempdir().expect("tempdir");

        let items = vec![WorkItem::new("S1", "/data/S1", "dragen-germline", "hg38")];
        let outcome = plan("Exomes", dir.path().to_path_buf())
            .run(fake.clone(), items, CancellationToken::new())
            .await
            .expect("project resolves");
        assert_eq!(outcome.summary.completed_count, 1);
        assert_eq!(fake.calls()[0], "resolve_project Exomes");
    }

    #[test]
    fn test_stage_order() {
        let fake = Arc::new(FakePlatform::new());
        let item = WorkItem::new("S1", "/data/S1", "dragen-germline", "hg38");
        let pipeline = runner(&fake, PathBuf::from("results")).stages_for(&item);
        assert_eq!(pipeline.stage_names(), vec!["upload", "submit", "retrieve"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_runs_end_to_end() {
        let fake = Arc::new(FakePlatform::new());
        fake.script_statuses("run-S1", vec![run("run-S1", RunStatus::Running), completed("run-S1", "out-S1")]);
        fake.add_folder("out-S1", vec![file("fil.1", "S1.vcf.gz")]);
        let dir = tempfile::tempdir().expect("tempdir");

        let item = WorkItem::new("S1", "/data/S1", "dragen-germline", "hg38")
            .with_custom_parameter("enable-sort", json!(false));
        let result = runner(&fake, dir.path().to_path_buf()).run_item(&item).await;

        assert_eq!(result.status, ItemStatus::Completed, "{:?}", result.error);
        assert!(dir.path().join("S1/S1.vcf.gz").exists());

        let started = fake.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].1.get("enable-sort"), Some(&json!(false)));
        assert_eq!(started[0].1.get("sample-id"), Some(&json!("S1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_for_one_item_leaves_others_completed() {
        let fake = Arc::new(FakePlatform::new());
        for id in ["S0", "S1", "S2", "S3"] {
            let run_id = format!("run-{id}");
            let folder = format!("out-{id}");
            fake.script_statuses(&run_id, vec![completed(&run_id, &folder)]);
            fake.add_folder(&folder, vec![file(&format!("fil-{id}"), &format!("{id}.bam"))]);
        }
        fake.fail_start("S2");
        let dir = tempfile::tempdir().expect("tempdir");

        let items = ["S0", "S1", "S2", "S3"]
            .iter()
            .map(|id| WorkItem::new(*id, format!("/data/{id}"), "dragen-germline", "hg38"))
            .collect();
        let dispatcher = BatchDispatcher::new(Arc::new(runner(&fake, dir.path().to_path_buf())), 2, CancellationToken::new());
        let outcome = dispatcher.run_batch(items).await;

        assert_eq!(outcome.summary.completed_count, 3);
        assert_eq!(outcome.summary.failed_count, 1);
        let failed = outcome.results.iter().find(|r| r.status == ItemStatus::Failed).expect("one failure");
        assert_eq!(failed.work_item_id, "S2");
        assert!(failed.error.as_deref().unwrap_or_default().starts_with("submit:"));
        assert_eq!(fake.count_calls("upload"), 4);
    }
}

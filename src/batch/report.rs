use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Output directory for batch reports unless told otherwise
pub static DEFAULT_BATCH_OUTPUT_DIR: &str = "batch_results";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Failed,
}

/// Outcome of one work item's pipeline, created once when the pipeline ends
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkItemResult {
    #[serde(rename = "sample_id")]
    pub work_item_id: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkItemResult {
    pub fn completed(work_item_id: impl Into<String>) -> Self {
        WorkItemResult {
            work_item_id: work_item_id.into(),
            status: ItemStatus::Completed,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(work_item_id: impl Into<String>, error: impl Into<String>) -> Self {
        WorkItemResult {
            work_item_id: work_item_id.into(),
            status: ItemStatus::Failed,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ItemStatus::Completed
    }
}

/// Counts over a finished batch, always derived from its results
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchSummary {
    #[serde(rename = "total_samples")]
    pub total_count: usize,
    #[serde(rename = "completed")]
    pub completed_count: usize,
    #[serde(rename = "failed")]
    pub failed_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl BatchSummary {
    pub fn from_results(results: &[WorkItemResult]) -> Self {
        let completed_count = results.iter().filter(|r| r.is_completed()).count();
        BatchSummary {
            total_count: results.len(),
            completed_count,
            failed_count: results.len() - completed_count,
            timestamp: Utc::now(),
        }
    }
}

/// Where a batch report landed
pub struct ReportPaths {
    pub results: PathBuf,
    pub summary: PathBuf,
}

/// Write `results.json` and `summary.json` into `dir`
///
/// Each file is written to a temporary file in the same directory and renamed into place, so a
/// reader never sees a half-written report.
pub fn write_report(dir: &Path, results: &[WorkItemResult], summary: &BatchSummary) -> anyhow::Result<ReportPaths> {
    fs::create_dir_all(dir)?;
    let paths = ReportPaths {
        results: dir.join("results.json"),
        summary: dir.join("summary.json"),
    };

    info!("Writing {} results to {}", results.len(), paths.results.display());
    write_json_atomic(&paths.results, results)?;
    info!("Writing batch summary to {}", paths.summary.display());
    write_json_atomic(&paths.summary, summary)?;
    Ok(paths)
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.persist(path)?;
    Ok(())
}

//! The remote analysis platform, seen through the operations orchestration needs
//!
//! Every platform call goes through the [`Platform`] trait so stages, pollers and monitors can be
//! driven by the real CLI ([`cli::IcaCli`]) or by a scripted fake in tests.

use std::path::Path;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::params::ParameterSet;

/// Response types decoded from platform output
pub mod model;

/// Platform implementation that shells out to the `ica` command line tool
pub mod cli;

#[cfg(test)]
pub(crate) mod fake;

pub use model::{AnalysisRun, CostSummary, DataEntry, FileRef, RunStatus, StorageUsage};

#[async_trait]
pub trait Platform: Send + Sync {
    async fn resolve_project_id(&self, name: &str) -> Result<String, PlatformError>;

    async fn resolve_pipeline_id(&self, project_id: &str, name: &str) -> Result<String, PlatformError>;

    /// Find the id of an uploaded folder by its path (matched on the final component)
    async fn resolve_data_id(&self, project_id: &str, path: &str) -> Result<String, PlatformError>;

    async fn upload_folder(&self, project_id: &str, local_path: &Path, remote_name: &str) -> Result<(), PlatformError>;

    /// Start an analysis and return its run id
    async fn start_run(
        &self,
        project_id: &str,
        pipeline_id: &str,
        input_id: &str,
        parameters: &ParameterSet,
        name: Option<&str>,
    ) -> Result<String, PlatformError>;

    async fn get_run_status(&self, run_id: &str) -> Result<AnalysisRun, PlatformError>;

    async fn list_files_in_folder(&self, project_id: &str, folder_id: &str) -> Result<Vec<FileRef>, PlatformError>;

    async fn download_file(&self, project_id: &str, file_id: &str, local_path: &Path) -> Result<(), PlatformError>;

    async fn get_storage_usage(&self, project_id: &str) -> Result<StorageUsage, PlatformError>;

    async fn get_cost_summary(&self, project_id: &str) -> Result<CostSummary, PlatformError>;

    /// Top-level project data, optionally narrowed by a name pattern the platform understands
    async fn list_data(&self, project_id: &str, pattern: Option<&str>) -> Result<Vec<DataEntry>, PlatformError>;

    async fn delete_data(&self, project_id: &str, data_id: &str) -> Result<(), PlatformError>;

    async fn download_data(&self, project_id: &str, data_id: &str, local_path: &Path) -> Result<(), PlatformError>;
}

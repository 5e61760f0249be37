use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use crate::error::PlatformError;
use crate::params::ParameterSet;
use crate::pipeline::{Stage, StageResult};
use crate::platform::Platform;
use crate::poll::StatusPoller;

fn missing_input(stage: &str, what: &str) -> StageResult {
    StageResult::failure(stage, format!("no {what} produced by the previous stage"))
}

/// Upload a local folder; produces the remote folder name
pub struct UploadStage {
    pub platform: Arc<dyn Platform>,
    pub project_id: String,
    pub local_path: PathBuf,
    pub remote_name: String,
}

impl UploadStage {
    /// Remote name defaults to the local folder's final component
    pub fn remote_name_for(local_path: &Path, folder_name: Option<&str>) -> String {
        match folder_name {
            Some(name) => name.to_string(),
            None => local_path
                .components()
                .last()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .unwrap_or_else(|| local_path.display().to_string()),
        }
    }
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &str {
        "upload"
    }

    async fn run(&self, _input: Option<String>) -> StageResult {
        match self.platform.upload_folder(&self.project_id, &self.local_path, &self.remote_name).await {
            Ok(()) => StageResult::success(self.name(), &self.remote_name),
            Err(err) => StageResult::failure(self.name(), err),
        }
    }
}

/// Start a pipeline on an uploaded folder; takes the folder name, produces the run id
pub struct SubmitStage {
    pub platform: Arc<dyn Platform>,
    pub project_id: String,
    pub pipeline_name: String,
    pub parameters: ParameterSet,
    pub analysis_name: Option<String>,
}

impl SubmitStage {
    async fn submit(&self, folder: &str) -> Result<String, PlatformError> {
        let pipeline_id = self.platform.resolve_pipeline_id(&self.project_id, &self.pipeline_name).await?;
        let data_id = self.platform.resolve_data_id(&self.project_id, folder).await?;
        info!("Starting pipeline {} ({}) on folder {} ({})", self.pipeline_name, pipeline_id, folder, data_id);
        self.platform
            .start_run(&self.project_id, &pipeline_id, &data_id, &self.parameters, self.analysis_name.as_deref())
            .await
    }
}

#[async_trait]
impl Stage for SubmitStage {
    fn name(&self) -> &str {
        "submit"
    }

    async fn run(&self, input: Option<String>) -> StageResult {
        let Some(folder) = input else {
            return missing_input(self.name(), "uploaded folder");
        };
        match self.submit(&folder).await {
            Ok(run_id) => StageResult::success(self.name(), run_id),
            Err(err) => StageResult::failure(self.name(), err),
        }
    }
}

/// Wait for a run to finish and download its outputs; takes the run id, produces the output dir
pub struct RetrieveStage {
    pub platform: Arc<dyn Platform>,
    pub project_id: String,
    pub poller: StatusPoller,
    pub output_dir: PathBuf,
}

#[async_trait]
impl Stage for RetrieveStage {
    fn name(&self) -> &str {
        "retrieve"
    }

    async fn run(&self, input: Option<String>) -> StageResult {
        let Some(run_id) = input else {
            return missing_input(self.name(), "run id");
        };
        let folder_id = match self.poller.await_terminal(&run_id).await {
            Ok(folder_id) => folder_id,
            Err(err) => return StageResult::failure(self.name(), err),
        };
        match download_outputs(self.platform.as_ref(), &self.project_id, &folder_id, &self.output_dir).await {
            Ok(_) => StageResult::success(self.name(), self.output_dir.display().to_string()),
            Err(err) => StageResult::failure(self.name(), err),
        }
    }
}

/// Download every file in an output folder into `output_dir`, keeping relative paths
pub async fn download_outputs(
    platform: &dyn Platform,
    project_id: &str,
    folder_id: &str,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, PlatformError> {
    let files = platform.list_files_in_folder(project_id, folder_id).await?;
    info!("Downloading {} files from {} to {}", files.len(), folder_id, output_dir.display());

    let mut written = Vec::with_capacity(files.len());
    for file in files.iter().filter(|f| !f.is_folder()) {
        let target = output_dir.join(file.relative_path());
        info!("Downloading {} to {}", file.name, target.display());
        platform.download_file(project_id, &file.id, &target).await?;
        written.push(target);
    }
    Ok(written)
}

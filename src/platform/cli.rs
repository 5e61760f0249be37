use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::process::Command;

use crate::error::PlatformError;
use crate::params::ParameterSet;
use crate::platform::model::{AnalysisRun, CostSummary, DataEntry, FileRef, NamedEntry, RunRecord, StartedRun, StorageUsage};
use crate::platform::Platform;

/// Talks to the platform by running its command line tool
///
/// Each operation is one subprocess. A non-zero exit is a transport error carrying stderr; JSON
/// output is decoded into the types in [`crate::platform::model`]. Child processes are killed if
/// the awaiting future is dropped, so cancelling a poll doesn't leave them running.
#[derive(Debug, Clone)]
pub struct IcaCli {
    program: PathBuf,
}

impl IcaCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        IcaCli { program: program.into() }
    }

    /// Run `ica --version` and return the reported version
    pub async fn check_installed(&self) -> Result<String, PlatformError> {
        let version = self.run(&["--version"]).await?;
        let version = version.trim().to_string();
        info!("Using {} {}", self.program.display(), version);
        Ok(version)
    }

    async fn run(&self, args: &[&str]) -> Result<String, PlatformError> {
        let label = self.describe(args);
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {:?}", &cmd);

        let output = cmd.output().await.map_err(|err| {
            PlatformError::transport(&label, format!("can't execute {}: {err}", self.program.display()))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("{label} exited with {}", output.status);
            return Err(PlatformError::transport(label, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, PlatformError> {
        let stdout = self.run(args).await?;
        serde_json::from_str::<T>(&stdout).map_err(|err| PlatformError::parse(self.describe(args), err))
    }

    /// Short command name for diagnostics, e.g. "ica pipelines start"
    fn describe(&self, args: &[&str]) -> String {
        let program = self.program.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ica".to_string());
        let words: Vec<&str> = args.iter().take_while(|a| !a.starts_with('-')).take(2).copied().collect();
        match words.is_empty() {
            true => program,
            false => format!("{} {}", program, words.join(" ")),
        }
    }
}

fn path_arg(path: &Path) -> Result<&str, PlatformError> {
    path.to_str().ok_or_else(|| {
        PlatformError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path is not valid UTF-8: {}", path.display()),
        ))
    })
}

fn find_by_name(entries: Vec<NamedEntry>, name: &str) -> Option<String> {
    entries.into_iter()
        .find(|entry| entry.name.to_lowercase() == name.to_lowercase())
        .map(|entry| entry.id)
}

#[async_trait]
impl Platform for IcaCli {
    async fn resolve_project_id(&self, name: &str) -> Result<String, PlatformError> {
        let projects: Vec<NamedEntry> = self.run_json(&["projects", "list", "--output", "json"]).await?;
        find_by_name(projects, name).ok_or_else(|| PlatformError::not_found("project", name))
    }

    async fn resolve_pipeline_id(&self, project_id: &str, name: &str) -> Result<String, PlatformError> {
        let pipelines: Vec<NamedEntry> = self
            .run_json(&["pipelines", "list", "--project-id", project_id, "--output", "json"])
            .await?;
        find_by_name(pipelines, name).ok_or_else(|| PlatformError::not_found("pipeline", name))
    }

    async fn resolve_data_id(&self, project_id: &str, path: &str) -> Result<String, PlatformError> {
        let folder_name = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
        let files: Vec<FileRef> = self
            .run_json(&["files", "list", "--project-id", project_id, "--output", "json"])
            .await?;
        files.into_iter()
            .find(|file| file.name == folder_name && file.is_folder())
            .map(|file| file.id)
            .ok_or_else(|| PlatformError::not_found("folder", folder_name))
    }

    async fn upload_folder(&self, project_id: &str, local_path: &Path, remote_name: &str) -> Result<(), PlatformError> {
        let absolute = match tokio::fs::canonicalize(local_path).await {
            Ok(path) => path,
            Err(_) => return Err(PlatformError::not_found("local folder", local_path.display().to_string())),
        };
        if !tokio::fs::metadata(&absolute).await?.is_dir() {
            return Err(PlatformError::not_found("local folder", absolute.display().to_string()));
        }

        info!("Uploading folder {} as {}", absolute.display(), remote_name);
        self.run(&["files", "upload", "--project-id", project_id, "--recursive", path_arg(&absolute)?, remote_name])
            .await?;
        Ok(())
    }

    async fn start_run(
        &self,
        project_id: &str,
        pipeline_id: &str,
        input_id: &str,
        parameters: &ParameterSet,
        name: Option<&str>,
    ) -> Result<String, PlatformError> {
        // the params file must outlive the subprocess, it is removed when `params` drops
        let mut params = tempfile::Builder::new().prefix("params-").suffix(".json").tempfile()?;
        serde_json::to_writer_pretty(&mut params, parameters).map_err(std::io::Error::from)?;
        params.flush()?;

        let input = format!("folder_id={input_id}");
        let mut args = vec![
            "pipelines", "start",
            "--project-id", project_id,
            "--pipeline-id", pipeline_id,
            "--input", input.as_str(),
            "--params-file", path_arg(params.path())?,
        ];
        if let Some(name) = name {
            args.extend(["--name", name]);
        }

        let started: StartedRun = self.run_json(&args).await?;
        info!("Started analysis {}", started.id);
        Ok(started.id)
    }

    async fn get_run_status(&self, run_id: &str) -> Result<AnalysisRun, PlatformError> {
        let args = ["pipelines", "history", "--analysis-id", run_id, "--output", "json"];
        let record: RunRecord = self.run_json(&args).await?;
        AnalysisRun::from_record(run_id, record).map_err(|err| PlatformError::parse(self.describe(&args), err))
    }

    async fn list_files_in_folder(&self, project_id: &str, folder_id: &str) -> Result<Vec<FileRef>, PlatformError> {
        self.run_json(&["files", "list", "--project-id", project_id, "--parent-folder-id", folder_id, "--output", "json"])
            .await
    }

    async fn download_file(&self, project_id: &str, file_id: &str, local_path: &Path) -> Result<(), PlatformError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.run(&["files", "download", "--project-id", project_id, "--data-ids", file_id, "--output-file", path_arg(local_path)?])
            .await?;
        Ok(())
    }

    async fn get_storage_usage(&self, project_id: &str) -> Result<StorageUsage, PlatformError> {
        self.run_json(&["projects", "storage", project_id, "--output", "json"]).await
    }

    async fn get_cost_summary(&self, project_id: &str) -> Result<CostSummary, PlatformError> {
        self.run_json(&["projects", "costs", project_id, "--output", "json"]).await
    }

    async fn list_data(&self, project_id: &str, pattern: Option<&str>) -> Result<Vec<DataEntry>, PlatformError> {
        let mut args = vec!["projects", "data", "ls", project_id, "--output", "json"];
        if let Some(pattern) = pattern {
            args.extend(["--filter", pattern]);
        }
        self.run_json(&args).await
    }

    async fn delete_data(&self, project_id: &str, data_id: &str) -> Result<(), PlatformError> {
        info!("Deleting {data_id} from project {project_id}");
        self.run(&["projects", "data", "delete", project_id, data_id]).await?;
        Ok(())
    }

    async fn download_data(&self, project_id: &str, data_id: &str, local_path: &Path) -> Result<(), PlatformError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.run(&["projects", "data", "download", project_id, data_id, "--output-file", path_arg(local_path)?])
            .await?;
        Ok(())
    }
}

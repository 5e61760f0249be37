//! Scripted in-memory platform for tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PlatformError;
use crate::params::ParameterSet;
use crate::platform::{AnalysisRun, CostSummary, DataEntry, FileRef, Platform, RunStatus, StorageUsage};

type Scripted<T> = VecDeque<Result<T, String>>;

#[derive(Default)]
struct FakeState {
    statuses: HashMap<String, Scripted<AnalysisRun>>,
    storage: Scripted<StorageUsage>,
    costs: Scripted<CostSummary>,
    folders: HashMap<String, Vec<FileRef>>,
    data: Vec<DataEntry>,
    failing_data_downloads: HashSet<String>,
    deleted: Vec<String>,
    missing_projects: HashSet<String>,
    failing_uploads: HashSet<String>,
    failing_starts: HashSet<String>,
    calls: Vec<String>,
    started: Vec<(String, ParameterSet)>,
    uploads: Vec<(PathBuf, String)>,
    downloads: Vec<PathBuf>,
}

/// Runs started against input folder `X` get the id `run-X`, so tests can script their statuses
/// before the run exists.
#[derive(Default)]
pub(crate) struct FakePlatform {
    state: Mutex<FakeState>,
}

/// Pop the next scripted value, repeating the last one forever
fn next_or_last<T: Clone>(queue: &mut Scripted<T>) -> Option<Result<T, String>> {
    match queue.len() {
        0 => None,
        1 => queue.front().cloned(),
        _ => queue.pop_front(),
    }
}

pub(crate) fn run(id: &str, status: RunStatus) -> Result<AnalysisRun, String> {
    Ok(AnalysisRun::new(id, status, None))
}

pub(crate) fn completed(id: &str, folder: &str) -> Result<AnalysisRun, String> {
    Ok(AnalysisRun::new(id, RunStatus::Completed, Some(folder.to_string())))
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        FakePlatform::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().expect("fake platform lock");
        f(&mut state)
    }

    fn record(&self, call: String) {
        self.with_state(|s| s.calls.push(call));
    }

    pub(crate) fn script_statuses(&self, run_id: &str, statuses: Vec<Result<AnalysisRun, String>>) {
        self.with_state(|s| s.statuses.insert(run_id.to_string(), statuses.into()));
    }

    pub(crate) fn script_storage(&self, usage: Vec<Result<StorageUsage, String>>) {
        self.with_state(|s| s.storage = usage.into());
    }

    pub(crate) fn script_costs(&self, costs: Vec<Result<CostSummary, String>>) {
        self.with_state(|s| s.costs = costs.into());
    }

    pub(crate) fn add_folder(&self, folder_id: &str, files: Vec<FileRef>) {
        self.with_state(|s| s.folders.insert(folder_id.to_string(), files));
    }

    pub(crate) fn missing_project(&self, name: &str) {
        self.with_state(|s| s.missing_projects.insert(name.to_string()));
    }

    pub(crate) fn fail_upload(&self, remote_name: &str) {
        self.with_state(|s| s.failing_uploads.insert(remote_name.to_string()));
    }

    pub(crate) fn fail_start(&self, input_id: &str) {
        self.with_state(|s| s.failing_starts.insert(input_id.to_string()));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub(crate) fn count_calls(&self, prefix: &str) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    pub(crate) fn started(&self) -> Vec<(String, ParameterSet)> {
        self.with_state(|s| s.started.clone())
    }

    pub(crate) fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.with_state(|s| s.uploads.clone())
    }

    pub(crate) fn downloads(&self) -> Vec<PathBuf> {
        self.with_state(|s| s.downloads.clone())
    }

    pub(crate) fn add_data(&self, entry: DataEntry) {
        self.with_state(|s| s.data.push(entry));
    }

    pub(crate) fn fail_data_download(&self, data_id: &str) {
        self.with_state(|s| s.failing_data_downloads.insert(data_id.to_string()));
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.with_state(|s| s.deleted.clone())
    }
}

pub(crate) fn data(id: &str, name: &str, created_at: DateTime<Utc>) -> DataEntry {
    DataEntry {
        id: id.to_string(),
        name: name.to_string(),
        created_at,
        size: Some("1.0GB".to_string()),
        kind: Some("FOLDER".to_string()),
    }
}

pub(crate) fn file(id: &str, path: &str) -> FileRef {
    FileRef {
        id: id.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: Some(path.to_string()),
        kind: Some("FILE".to_string()),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn resolve_project_id(&self, name: &str) -> Result<String, PlatformError> {
        self.record(format!("resolve_project {name}"));
        match self.with_state(|s| s.missing_projects.contains(name)) {
            true => Err(PlatformError::not_found("project", name)),
            false => Ok(format!("prj-{name}")),
        }
    }

    async fn resolve_pipeline_id(&self, _project_id: &str, name: &str) -> Result<String, PlatformError> {
        self.record(format!("resolve_pipeline {name}"));
        Ok(format!("pipe-{name}"))
    }

    async fn resolve_data_id(&self, _project_id: &str, path: &str) -> Result<String, PlatformError> {
        self.record(format!("resolve_data {path}"));
        Ok(path.trim_end_matches('/').rsplit('/').next().unwrap_or(path).to_string())
    }

    async fn upload_folder(&self, _project_id: &str, local_path: &Path, remote_name: &str) -> Result<(), PlatformError> {
        self.record(format!("upload {remote_name}"));
        if self.with_state(|s| s.failing_uploads.contains(remote_name)) {
            return Err(PlatformError::transport("ica files upload", format!("upload of {remote_name} rejected")));
        }
        self.with_state(|s| s.uploads.push((local_path.to_path_buf(), remote_name.to_string())));
        Ok(())
    }

    async fn start_run(
        &self,
        _project_id: &str,
        pipeline_id: &str,
        input_id: &str,
        parameters: &ParameterSet,
        _name: Option<&str>,
    ) -> Result<String, PlatformError> {
        self.record(format!("start {pipeline_id} {input_id}"));
        if self.with_state(|s| s.failing_starts.contains(input_id)) {
            return Err(PlatformError::transport("ica pipelines start", format!("start for {input_id} rejected")));
        }
        let run_id = format!("run-{input_id}");
        self.with_state(|s| s.started.push((run_id.clone(), parameters.clone())));
        Ok(run_id)
    }

    async fn get_run_status(&self, run_id: &str) -> Result<AnalysisRun, PlatformError> {
        self.record(format!("status {run_id}"));
        let next = self.with_state(|s| s.statuses.get_mut(run_id).and_then(next_or_last));
        match next {
            Some(Ok(run)) => Ok(run),
            Some(Err(message)) => Err(PlatformError::transport("ica pipelines history", message)),
            None => Err(PlatformError::transport("ica pipelines history", format!("no status for {run_id}"))),
        }
    }

    async fn list_files_in_folder(&self, _project_id: &str, folder_id: &str) -> Result<Vec<FileRef>, PlatformError> {
        self.record(format!("list {folder_id}"));
        self.with_state(|s| s.folders.get(folder_id).cloned())
            .ok_or_else(|| PlatformError::not_found("folder", folder_id))
    }

    async fn download_file(&self, _project_id: &str, file_id: &str, local_path: &Path) -> Result<(), PlatformError> {
        self.record(format!("download {file_id}"));
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, file_id)?;
        self.with_state(|s| s.downloads.push(local_path.to_path_buf()));
        Ok(())
    }

    async fn get_storage_usage(&self, _project_id: &str) -> Result<StorageUsage, PlatformError> {
        self.record("storage".to_string());
        match self.with_state(|s| next_or_last(&mut s.storage)) {
            Some(Ok(usage)) => Ok(usage),
            Some(Err(message)) => Err(PlatformError::transport("ica projects storage", message)),
            None => Err(PlatformError::transport("ica projects storage", "no storage scripted")),
        }
    }

    async fn get_cost_summary(&self, _project_id: &str) -> Result<CostSummary, PlatformError> {
        self.record("costs".to_string());
        match self.with_state(|s| next_or_last(&mut s.costs)) {
            Some(Ok(cost)) => Ok(cost),
            Some(Err(message)) => Err(PlatformError::transport("ica projects costs", message)),
            None => Err(PlatformError::transport("ica projects costs", "no costs scripted")),
        }
    }

    async fn list_data(&self, _project_id: &str, pattern: Option<&str>) -> Result<Vec<DataEntry>, PlatformError> {
        self.record(format!("list_data {}", pattern.unwrap_or("*")));
        Ok(self.with_state(|s| {
            s.data.iter()
                .filter(|entry| pattern.map(|p| entry.name.contains(p)).unwrap_or(true))
                .cloned()
                .collect()
        }))
    }

    async fn delete_data(&self, _project_id: &str, data_id: &str) -> Result<(), PlatformError> {
        self.record(format!("delete_data {data_id}"));
        self.with_state(|s| {
            s.data.retain(|entry| entry.id != data_id);
            s.deleted.push(data_id.to_string());
        });
        Ok(())
    }

    async fn download_data(&self, _project_id: &str, data_id: &str, local_path: &Path) -> Result<(), PlatformError> {
        self.record(format!("download_data {data_id}"));
        if self.with_state(|s| s.failing_data_downloads.contains(data_id)) {
            return Err(PlatformError::transport("ica projects data", format!("download of {data_id} interrupted")));
        }
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local_path, data_id)?;
        Ok(())
    }
}

//! List, clean up and archive old project data
//!
//! Age is measured against a cutoff: an entry created before it is "old". Cleanup only reports
//! what it would delete unless told to execute. Archiving downloads each old entry first and
//! deletes it from the platform only once its local copy is written.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::error::PlatformError;
use crate::platform::{DataEntry, Platform};

/// The instant `days` days before `now`
pub fn cutoff(days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

/// What a cleanup or archive did with each selected entry
#[derive(Debug, Default, Serialize)]
pub struct HousekeepingReport {
    pub dry_run: bool,
    /// Names deleted, archived, or (in a dry run) selected for deletion
    pub processed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl HousekeepingReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ProjectData {
    platform: Arc<dyn Platform>,
    project_id: String,
}

impl ProjectData {
    pub fn new(platform: Arc<dyn Platform>, project_id: impl Into<String>) -> Self {
        ProjectData { platform, project_id: project_id.into() }
    }

    /// Resolve a project by name
    pub async fn open(platform: Arc<dyn Platform>, project: &str) -> Result<Self, PlatformError> {
        let project_id = platform.resolve_project_id(project).await?;
        Ok(ProjectData::new(platform, project_id))
    }

    /// Entries matching `pattern`, keeping only those created before `older_than` when given
    pub async fn list(&self, older_than: Option<DateTime<Utc>>, pattern: Option<&str>) -> Result<Vec<DataEntry>, PlatformError> {
        let entries = self.platform.list_data(&self.project_id, pattern).await?;
        let total = entries.len();
        let selected: Vec<DataEntry> = match older_than {
            Some(cutoff) => entries.into_iter().filter(|entry| entry.is_older_than(cutoff)).collect(),
            None => entries,
        };
        info!("Selected {} of {} data entries in {}", selected.len(), total, self.project_id);
        Ok(selected)
    }

    pub async fn cleanup(&self, older_than: DateTime<Utc>, dry_run: bool) -> Result<HousekeepingReport, PlatformError> {
        let mut report = HousekeepingReport { dry_run, ..Default::default() };
        for entry in self.list(Some(older_than), None).await? {
            if dry_run {
                info!("Would delete: {} ({})", entry.name, entry.size.as_deref().unwrap_or("unknown size"));
                report.processed.push(entry.name);
                continue;
            }
            match self.platform.delete_data(&self.project_id, &entry.id).await {
                Ok(()) => report.processed.push(entry.name),
                Err(err) => {
                    warn!("Failed to delete {}: {}", entry.name, err);
                    report.failed.push((entry.name, err.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Download every old entry into `archive_dir`, then delete it remotely
    pub async fn archive(&self, older_than: DateTime<Utc>, archive_dir: &Path) -> Result<HousekeepingReport, PlatformError> {
        tokio::fs::create_dir_all(archive_dir).await?;
        let mut report = HousekeepingReport::default();

        for entry in self.list(Some(older_than), None).await? {
            let target = archive_dir.join(entry.local_name());
            info!("Archiving {} to {}", entry.name, target.display());
            if let Err(err) = self.platform.download_data(&self.project_id, &entry.id, &target).await {
                warn!("Failed to archive {}, keeping it on the platform: {}", entry.name, err);
                report.failed.push((entry.name, err.to_string()));
                continue;
            }
            match self.platform.delete_data(&self.project_id, &entry.id).await {
                Ok(()) => report.processed.push(entry.name),
                Err(err) => {
                    warn!("Archived {} but couldn't delete it: {}", entry.name, err);
                    report.failed.push((entry.name, format!("archived to {} but not deleted: {err}", target.display())));
                }
            }
        }
        Ok(report)
    }
}

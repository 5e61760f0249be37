use std::fmt;
use std::path::{Component, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Remote state of an analysis run
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
    Terminated,
    Error,
}

impl RunStatus {
    /// No further transition happens from a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    /// Title case used in notification subjects, e.g. "Completed"
    pub fn title(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Aborted => "Aborted",
            RunStatus::Terminated => "Terminated",
            RunStatus::Error => "Error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title().to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown run status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    /// Case-insensitive, accepting the aliases different platform endpoints report
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "REQUESTED" | "QUEUED" | "INITIALIZING" | "AWAITING_INPUT" => Ok(RunStatus::Pending),
            // still doing work, an aborting run settles on ABORTED later
            "RUNNING" | "IN_PROGRESS" | "PREPARING_INPUTS" | "GENERATING_OUTPUTS" | "ABORTING" => Ok(RunStatus::Running),
            "COMPLETED" | "SUCCEEDED" => Ok(RunStatus::Completed),
            "FAILED" | "FAILED_FINAL" => Ok(RunStatus::Failed),
            "ABORTED" | "CANCELLED" => Ok(RunStatus::Aborted),
            "TERMINATED" => Ok(RunStatus::Terminated),
            "ERROR" => Ok(RunStatus::Error),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// An analysis run as last read from the platform
///
/// `output_location_id` is only ever populated when the status is COMPLETED.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRun {
    pub id: String,
    pub status: RunStatus,
    pub output_location_id: Option<String>,
}

impl AnalysisRun {
    pub fn new(id: impl Into<String>, status: RunStatus, output_location_id: Option<String>) -> Self {
        let output_location_id = match status {
            RunStatus::Completed => output_location_id,
            _ => None,
        };
        AnalysisRun { id: id.into(), status, output_location_id }
    }

    pub fn from_record(id: &str, record: RunRecord) -> Result<Self, UnknownStatus> {
        let status: RunStatus = record.status.parse()?;
        let folder_id = record.output.and_then(|o| o.folder).map(|f| f.id);
        Ok(AnalysisRun::new(id, status, folder_id))
    }
}

/// Raw run status response
#[derive(Debug, Deserialize)]
pub struct RunRecord {
    pub status: String,
    #[serde(default)]
    pub output: Option<RunOutput>,
}

#[derive(Debug, Deserialize)]
pub struct RunOutput {
    #[serde(default)]
    pub folder: Option<FolderRef>,
}

#[derive(Debug, Deserialize)]
pub struct FolderRef {
    pub id: String,
}

/// Response to a run start request
#[derive(Debug, Deserialize)]
pub struct StartedRun {
    pub id: String,
}

/// A project or pipeline listing entry
#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
    pub id: String,
    pub name: String,
}

/// A file or folder stored on the platform
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl FileRef {
    pub fn is_folder(&self) -> bool {
        self.kind.as_deref().map(|k| k.eq_ignore_ascii_case("FOLDER")).unwrap_or(false)
    }

    /// Path to write this file at, relative to a download directory
    pub fn relative_path(&self) -> PathBuf {
        safe_relative(self.path.as_deref().unwrap_or(&self.name), &self.id)
    }
}

/// Only plain path components survive, so a remote name can't escape a local directory
fn safe_relative(raw: &str, fallback: &str) -> PathBuf {
    let relative: PathBuf = PathBuf::from(raw)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if relative.as_os_str().is_empty() {
        PathBuf::from(fallback)
    } else {
        relative
    }
}

/// A top-level data entry of a project, as listed for housekeeping
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DataEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "created", deserialize_with = "date_or_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl DataEntry {
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }

    /// Where an archived copy goes, relative to the archive directory
    pub fn local_name(&self) -> PathBuf {
        safe_relative(&self.name, &self.id)
    }
}

/// RFC 3339 timestamps, or plain `YYYY-MM-DD` dates read as midnight UTC
fn date_or_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(serde::de::Error::custom)?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| serde::de::Error::custom(format!("no midnight on {date}")))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Aggregate project storage
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct StorageUsage {
    #[serde(deserialize_with = "number_or_string")]
    pub used_gb: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub total_gb: f64,
}

impl StorageUsage {
    /// `used / total * 100`, or None when the total is not positive
    pub fn usage_percent(&self) -> Option<f64> {
        if self.total_gb > 0.0 {
            Some(self.used_gb * 100.0 / self.total_gb)
        } else {
            None
        }
    }
}

/// Accumulated project cost
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CostSummary {
    #[serde(deserialize_with = "number_or_string")]
    pub total_cost: f64,
}

/// Accept `12.5` and `"12.5"` alike
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .trim_end_matches("GB")
            .trim_start_matches('$')
            .trim()
            .parse::<f64>()
            .map_err(serde::de::Error::custom),
    }
}

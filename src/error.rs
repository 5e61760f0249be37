//! Error taxonomy shared by the platform client, configuration, batch input, poller and notifiers

use std::path::PathBuf;
use std::time::Duration;

use crate::platform::RunStatus;

/// Failures talking to the remote analysis platform
///
/// None of these are retried by the caller of the failing operation: a stage or poll that sees
/// one stops and reports it.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// A named project, pipeline or data folder does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// The remote call failed or exited non-zero
    #[error("{command} failed: {message}")]
    Transport { command: String, message: String },

    /// The remote call succeeded but its output couldn't be understood
    #[error("could not parse output of {command}: {message}")]
    Parse { command: String, message: String },

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        PlatformError::NotFound { kind, name: name.into() }
    }

    pub fn transport(command: impl Into<String>, message: impl Into<String>) -> Self {
        PlatformError::Transport { command: command.into(), message: message.into() }
    }

    pub fn parse(command: impl Into<String>, message: impl ToString) -> Self {
        PlatformError::Parse { command: command.into(), message: message.to_string() }
    }
}

/// Malformed notification configuration, fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read config at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("can't decode config: {0}")]
    Decode(String),

    #[error("config fails schema validation: {0}")]
    Schema(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Malformed batch input, fatal before any work item runs
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("can't read sample sheet at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("can't decode sample sheet: {0}")]
    Decode(String),

    #[error("sample sheet row {row}: {message}")]
    Row { row: usize, message: String },

    #[error("duplicate sample_id '{0}' in sample sheet")]
    Duplicate(String),
}

/// Why a status poll didn't end with an output location
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The status query itself failed, distinct from the run failing
    #[error("status query for {run_id} failed: {source}")]
    Query { run_id: String, source: PlatformError },

    /// The run reached a terminal state other than COMPLETED
    #[error("run {run_id} finished with status {status}")]
    Terminal { run_id: String, status: RunStatus },

    /// COMPLETED without an output location
    #[error("run {run_id} is COMPLETED but reports no output location")]
    Inconsistent { run_id: String },

    #[error("polling run {run_id} was cancelled")]
    Cancelled { run_id: String },

    #[error("run {run_id} did not finish within {timeout:?}")]
    TimedOut { run_id: String, timeout: Duration },
}

/// A single notification channel failed to deliver
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid mail address '{address}': {message}")]
    Address { address: String, message: String },

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("chat webhook delivery failed: {0}")]
    Chat(String),

    #[error("can't render message template: {0}")]
    Template(String),
}

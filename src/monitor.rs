//! Long-running monitors for a run, project storage and project cost
//!
//! All three share one shape: query, evaluate, notify, sleep. The run monitor stops once the run
//! is terminal or its status can't be read. The storage and cost monitors keep going through
//! alerts and query errors alike and only stop when cancelled.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{NotifyError, PlatformError};
use crate::notify::message::{self, QueryKind};
use crate::notify::{Message, Notifier};
use crate::platform::{Platform, RunStatus};

/// Why a monitor loop returned
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorExit {
    /// The watched run reached a terminal state
    Finished(RunStatus),
    /// The run status couldn't be read
    QueryFailed(String),
    Cancelled,
}

pub struct Monitor {
    platform: Arc<dyn Platform>,
    project_name: String,
    project_id: String,
    notifier: Arc<Notifier>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Monitor {
    pub fn new(
        platform: Arc<dyn Platform>,
        project_name: impl Into<String>,
        project_id: impl Into<String>,
        notifier: Arc<Notifier>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Monitor {
            platform,
            project_name: project_name.into(),
            project_id: project_id.into(),
            notifier,
            interval,
            cancel,
        }
    }

    /// Resolve the project by name first; an unknown project is an error before anything is watched
    pub async fn for_project(
        platform: Arc<dyn Platform>,
        project_name: &str,
        notifier: Arc<Notifier>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, PlatformError> {
        let project_id = platform.resolve_project_id(project_name).await?;
        Ok(Monitor::new(platform, project_name, project_id, notifier, interval, cancel))
    }

    /// Watch one run until it's terminal; a failed status query is notified and ends the watch
    pub async fn watch_run(&self, run_id: &str) -> MonitorExit {
        info!("Starting monitoring of analysis {run_id}");
        loop {
            let status = tokio::select! {
                _ = self.cancel.cancelled() => return MonitorExit::Cancelled,
                status = self.platform.get_run_status(run_id) => status,
            };

            match status {
                Err(err) => {
                    let message = err.to_string();
                    error!("Failed to get analysis status for {run_id}: {message}");
                    let kind = QueryKind::AnalysisStatus;
                    self.alert(message::query_error(&self.project_name, kind, &message), kind.subject()).await;
                    return MonitorExit::QueryFailed(message);
                }
                Ok(run) if run.status.is_terminal() => {
                    info!("Pipeline {} {}", run_id, run.status.title().to_lowercase());
                    let subject = format!("Pipeline {}", run.status.title());
                    self.alert(message::run_finished(&self.project_name, run_id, run.status), &subject).await;
                    return MonitorExit::Finished(run.status);
                }
                Ok(run) => info!("Analysis {} is {}", run_id, run.status),
            }

            if !self.pause().await {
                return MonitorExit::Cancelled;
            }
        }
    }

    /// Alert whenever usage is at or above `threshold_percent`; runs until cancelled
    pub async fn watch_storage(&self, threshold_percent: f64) -> MonitorExit {
        info!("Starting storage monitoring of {} (threshold: {}%)", self.project_name, threshold_percent);
        loop {
            let usage = tokio::select! {
                _ = self.cancel.cancelled() => return MonitorExit::Cancelled,
                usage = self.platform.get_storage_usage(&self.project_id) => usage,
            };

            let checked = usage.map_err(|err| err.to_string()).and_then(|usage| {
                usage.usage_percent()
                    .map(|percent| (usage, percent))
                    .ok_or_else(|| format!("project reports a total of {}GB", usage.total_gb))
            });

            match checked {
                Err(message) => {
                    error!("Failed to get storage info: {message}");
                    let kind = QueryKind::StorageInfo;
                    self.alert(message::query_error(&self.project_name, kind, &message), kind.subject()).await;
                }
                Ok((usage, percent)) if percent >= threshold_percent => {
                    warn!("Storage usage alert: {:.1}% ({:.1}GB of {:.1}GB)", percent, usage.used_gb, usage.total_gb);
                    self.alert(message::storage_alert(&self.project_name, &usage, percent, threshold_percent), "Storage Usage Alert").await;
                }
                Ok((_, percent)) => info!("Storage usage {:.1}% is below {}%", percent, threshold_percent),
            }

            if !self.pause().await {
                return MonitorExit::Cancelled;
            }
        }
    }

    /// Alert whenever accumulated cost is at or above `budget_threshold`; runs until cancelled
    pub async fn watch_costs(&self, budget_threshold: f64) -> MonitorExit {
        info!("Starting cost monitoring of {} (threshold: ${})", self.project_name, budget_threshold);
        loop {
            let cost = tokio::select! {
                _ = self.cancel.cancelled() => return MonitorExit::Cancelled,
                cost = self.platform.get_cost_summary(&self.project_id) => cost,
            };

            match cost {
                Err(err) => {
                    let message = err.to_string();
                    error!("Failed to get cost info: {message}");
                    let kind = QueryKind::CostInfo;
                    self.alert(message::query_error(&self.project_name, kind, &message), kind.subject()).await;
                }
                Ok(cost) if cost.total_cost >= budget_threshold => {
                    warn!("Cost alert: current cost ${:.2} exceeds budget threshold ${:.2}", cost.total_cost, budget_threshold);
                    self.alert(message::cost_alert(&self.project_name, cost.total_cost, budget_threshold), "Cost Alert").await;
                }
                Ok(cost) => info!("Current cost ${:.2} is below ${:.2}", cost.total_cost, budget_threshold),
            }

            if !self.pause().await {
                return MonitorExit::Cancelled;
            }
        }
    }

    /// Sleep one interval; false when cancelled first
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(self.interval) => true,
        }
    }

    /// Send a rendered message, or just its subject if rendering failed
    ///
    /// Delivery is abandoned when the token fires; the next pause then ends the loop.
    async fn alert(&self, rendered: Result<Message, NotifyError>, fallback_subject: &str) {
        let message = match rendered {
            Ok(message) => message,
            Err(err) => {
                error!("{err}");
                Message { subject: fallback_subject.to_string(), body: fallback_subject.to_string() }
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => warn!("Cancelled while sending '{}'", message.subject),
            _ = self.notifier.send(&message) => {}
        }
    }
}

//! Wait for a remote analysis run to reach a terminal state
//!
//! The poller queries the run status once per iteration and sleeps between non-terminal answers.
//! A failed query stops polling straight away: it's reported as [`PollError::Query`], which callers
//! can tell apart from the run itself failing ([`PollError::Terminal`]). Every query and every sleep
//! is raced against a cancellation token and an optional deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::PollError;
use crate::platform::{Platform, RunStatus};

/// Seconds between status checks when nothing else is configured
pub static DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Clone)]
pub struct StatusPoller {
    platform: Arc<dyn Platform>,
    interval: Duration,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl StatusPoller {
    pub fn new(platform: Arc<dyn Platform>, interval: Duration, cancel: CancellationToken) -> Self {
        StatusPoller { platform, interval, timeout: None, cancel }
    }

    /// Give up with [`PollError::TimedOut`] once `timeout` has passed since polling started
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block until the run is terminal and return its output location id
    pub async fn await_terminal(&self, run_id: &str) -> Result<String, PollError> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        info!("Polling run {} every {:?}", run_id, self.interval);

        loop {
            let run = self
                .guarded(run_id, deadline, self.platform.get_run_status(run_id))
                .await?
                .map_err(|source| {
                    warn!("Status query for run {run_id} failed: {source}");
                    PollError::Query { run_id: run_id.to_string(), source }
                })?;

            match run.status {
                RunStatus::Pending | RunStatus::Running => {
                    info!("Run {} is {}, checking again in {:?}", run_id, run.status, self.interval);
                    self.guarded(run_id, deadline, sleep(self.interval)).await?;
                }
                RunStatus::Completed => {
                    return match run.output_location_id {
                        Some(folder_id) => {
                            info!("Run {run_id} completed, outputs in {folder_id}");
                            Ok(folder_id)
                        }
                        None => {
                            warn!("Run {run_id} completed without an output location");
                            Err(PollError::Inconsistent { run_id: run_id.to_string() })
                        }
                    };
                }
                status => {
                    warn!("Run {run_id} finished with status {status}");
                    return Err(PollError::Terminal { run_id: run_id.to_string(), status });
                }
            }
        }
    }

    /// Run `fut` unless the token fires or the deadline passes first
    async fn guarded<F: Future>(&self, run_id: &str, deadline: Option<Instant>, fut: F) -> Result<F::Output, PollError> {
        let expired = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!("Polling run {run_id} cancelled");
                Err(PollError::Cancelled { run_id: run_id.to_string() })
            }
            _ = expired => Err(PollError::TimedOut {
                run_id: run_id.to_string(),
                timeout: self.timeout.unwrap_or_default(),
            }),
            output = fut => Ok(output),
        }
    }
}

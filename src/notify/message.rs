use chrono::Utc;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::error::NotifyError;
use crate::platform::{RunStatus, StorageUsage};

/// A rendered notification
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// What a monitor was checking when its query failed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryKind {
    AnalysisStatus,
    StorageInfo,
    CostInfo,
}

impl QueryKind {
    pub fn subject(&self) -> &'static str {
        match self {
            QueryKind::AnalysisStatus => "Pipeline Monitoring Error",
            QueryKind::StorageInfo => "Storage Monitoring Error",
            QueryKind::CostInfo => "Cost Monitoring Error",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            QueryKind::AnalysisStatus => "analysis status",
            QueryKind::StorageInfo => "storage info",
            QueryKind::CostInfo => "cost info",
        }
    }
}

#[derive(Serialize)]
struct RunFinishedContext<'a> {
    project: &'a str,
    run_id: &'a str,
    status: String,
    checked_at: String,
}

#[derive(Serialize)]
struct QueryErrorContext<'a> {
    project: &'a str,
    subject_kind: &'static str,
    message: &'a str,
    checked_at: String,
}

#[derive(Serialize)]
struct StorageAlertContext<'a> {
    project: &'a str,
    usage_percent: String,
    used_gb: String,
    total_gb: String,
    threshold: String,
    checked_at: String,
}

#[derive(Serialize)]
struct CostAlertContext<'a> {
    project: &'a str,
    current_cost: String,
    threshold: String,
    checked_at: String,
}

fn checked_at() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Render one embedded template
///
/// Values are inserted unescaped: these are plain text messages and error output often contains
/// characters HTML escaping would mangle.
fn render<C: Serialize>(name: &str, template: &str, context: &C) -> Result<String, NotifyError> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template(name, template)
        .map_err(|err| NotifyError::Template(err.to_string()))?;
    tt.render(name, context)
        .map(|body| body.trim_end().to_string())
        .map_err(|err| NotifyError::Template(err.to_string()))
}

/// A watched run reached a terminal state
pub fn run_finished(project: &str, run_id: &str, status: RunStatus) -> Result<Message, NotifyError> {
    /// included run status template
    static RUN_FINISHED: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/run_finished.txt"));
    let context = RunFinishedContext {
        project,
        run_id,
        status: status.title().to_lowercase(),
        checked_at: checked_at(),
    };
    Ok(Message {
        subject: format!("Pipeline {}", status.title()),
        body: render("run_finished", RUN_FINISHED, &context)?,
    })
}

/// A monitor couldn't read the state it watches
pub fn query_error(project: &str, kind: QueryKind, message: &str) -> Result<Message, NotifyError> {
    /// included query error template
    static QUERY_ERROR: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/query_error.txt"));
    let context = QueryErrorContext {
        project,
        subject_kind: kind.description(),
        message,
        checked_at: checked_at(),
    };
    Ok(Message {
        subject: kind.subject().to_string(),
        body: render("query_error", QUERY_ERROR, &context)?,
    })
}

pub fn storage_alert(project: &str, usage: &StorageUsage, usage_percent: f64, threshold: f64) -> Result<Message, NotifyError> {
    /// included storage alert template
    static STORAGE_ALERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/storage_alert.txt"));
    let context = StorageAlertContext {
        project,
        usage_percent: format!("{usage_percent:.1}"),
        used_gb: format!("{:.1}", usage.used_gb),
        total_gb: format!("{:.1}", usage.total_gb),
        threshold: format!("{threshold:.1}"),
        checked_at: checked_at(),
    };
    Ok(Message {
        subject: "Storage Usage Alert".to_string(),
        body: render("storage_alert", STORAGE_ALERT, &context)?,
    })
}

pub fn cost_alert(project: &str, current_cost: f64, threshold: f64) -> Result<Message, NotifyError> {
    /// included cost alert template
    static COST_ALERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/cost_alert.txt"));
    let context = CostAlertContext {
        project,
        current_cost: format!("{current_cost:.2}"),
        threshold: format!("{threshold:.2}"),
        checked_at: checked_at(),
    };
    Ok(Message {
        subject: "Cost Alert".to_string(),
        body: render("cost_alert", COST_ALERT, &context)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_finished() {
        let message = run_finished("Exomes", "abc-123", RunStatus::Completed).expect("rendered");
        assert_eq!(message.subject, "Pipeline Completed");
        assert!(message.body.starts_with("Pipeline abc-123 completed"));
        assert!(message.body.contains("Project: Exomes"));
    }

    #[test]
    fn test_query_error_is_not_escaped() {
        let message = query_error("Exomes", QueryKind::StorageInfo, "HTTP 503 <Service Unavailable> & retry").expect("rendered");
        assert_eq!(message.subject, "Storage Monitoring Error");
        assert!(message.body.starts_with("Failed to get storage info: HTTP 503 <Service Unavailable> & retry"));
    }

    #[test]
    fn test_storage_alert_formatting() {
        let usage = StorageUsage { used_gb: 90.0, total_gb: 100.0 };
        let message = storage_alert("Exomes", &usage, 90.0, 90.0).expect("rendered");
        assert!(message.body.starts_with("Storage usage alert: 90.0% (90.0GB of 100.0GB)"));
        assert!(message.body.contains("Threshold: 90.0%"));
    }

    #[test]
    fn test_cost_alert_formatting() {
        let message = cost_alert("Exomes", 1234.5, 1000.0).expect("rendered");
        assert_eq!(message.subject, "Cost Alert");
        assert!(message.body.starts_with("Cost alert: Current cost $1234.50 exceeds budget threshold $1000.00"));
    }
}

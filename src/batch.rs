//! Process many work items through the stage pipeline under one concurrency bound

/// Work items and their analysis type
pub mod item;

/// Read sample sheets (CSV, YAML or JSON) into work items
pub mod sheet;

/// Bounded worker pool with per-item failure isolation
pub mod dispatch;

/// The upload, submit, retrieve pipeline for one work item
pub mod runner;

/// Per-item results, the derived summary, and writing both to disk
pub mod report;

pub use dispatch::{BatchDispatcher, BatchOutcome, ItemRunner};
pub use item::{AnalysisType, WorkItem};
pub use report::{BatchSummary, ItemStatus, WorkItemResult};

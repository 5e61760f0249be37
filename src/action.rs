use std::fmt;
use clap::ValueEnum;

/// What a monitor process watches
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum MonitorAction {
    Pipeline,
    Storage,
    Costs
}

impl MonitorAction {
    /// Default seconds between checks when `--check-interval` isn't given
    pub fn default_interval_secs(&self) -> u64 {
        match self {
            MonitorAction::Pipeline => 300,
            MonitorAction::Storage => 3600,
            MonitorAction::Costs => 86400
        }
    }
}

impl fmt::Display for MonitorAction {
      fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MonitorAction::Pipeline => write!(f, "pipeline"),
            MonitorAction::Storage => write!(f, "storage"),
            MonitorAction::Costs => write!(f, "costs")
        }
    }
}

/// What to do with a project's data
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum DataAction {
    List,
    Cleanup,
    Archive
}

impl fmt::Display for DataAction {
      fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataAction::List => write!(f, "list"),
            DataAction::Cleanup => write!(f, "cleanup"),
            DataAction::Archive => write!(f, "archive")
        }
    }
}

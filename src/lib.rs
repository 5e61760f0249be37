//! Orchestrate genomic analysis runs on a remote analysis platform
//!
//! Work items are uploaded, submitted and retrieved through a fail-fast [`pipeline`], many at a
//! time under the bounded [`batch`] dispatcher. Separately, [`monitor`] loops watch a run, project
//! storage or project cost and send alerts through [`notify`].

/// Typed errors for every layer
pub mod error;

/// What a monitor process watches, what to do with project data
pub mod action;

/// Notification configuration: parse, validate against a JSON schema, deserialise
pub mod config;

/// The remote platform as a trait, plus its command line implementation
pub mod platform;

/// Work item to run parameters
pub mod params;

/// Wait for a run to reach a terminal state
pub mod poll;

/// Sequential stages with a value threaded between them
pub mod pipeline;

/// Bounded-concurrency batch processing and reports
pub mod batch;

/// Mail and chat notification fan-out
pub mod notify;

/// Run, storage and cost monitor loops
pub mod monitor;

/// Project data listing, cleanup and archiving
pub mod housekeeping;

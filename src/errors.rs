// src/errors.rs

//! Crate-wide error types.
//!
//! - [`HiveError`] is what setup code (config, graph building, the CLI) returns.
//! - [`SchedulingError`] is scheduler-level and cheap to clone, because the
//!   controller keeps the first fatal one around and hands it to every later
//!   caller.
//! - [`ExecutionError`] stays local to the event whose algorithm failed.
//! - [`ResourceError`] comes out of the algorithm resource pool.

use thiserror::Error;

use crate::dag::ExecutionState;

#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An execution-state change that the state machine does not allow.
///
/// Seeing one of these means the scheduler itself is broken; it is never a
/// condition to retry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid execution state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ExecutionState,
    pub to: ExecutionState,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("no free event slot")]
    NoFreeSlot,

    #[error("scheduler stalled on event {event} in slot {slot}; pending algorithms: {pending:?}")]
    Stall {
        event: u64,
        slot: usize,
        pending: Vec<String>,
    },

    #[error("algorithm '{0}' is not known to the scheduler or the resource pool")]
    UnknownAlgorithm(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("completion of '{algorithm}' for event {event} does not match slot {slot}")]
    StaleCompletion {
        algorithm: String,
        event: u64,
        slot: usize,
    },

    #[error("invalid scheduler settings: {0}")]
    InvalidSettings(String),

    #[error("scheduler is no longer running")]
    SchedulerStopped,
}

impl SchedulingError {
    /// Fatal errors stop the scheduler from accepting new events.
    ///
    /// A stale completion only concerns an event that already left its
    /// slot; it is logged and dropped.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SchedulingError::NoFreeSlot | SchedulingError::StaleCompletion { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The algorithm panicked; the task guard turned it into an error.
    #[error("algorithm fault: {0}")]
    AlgorithmFault(String),

    /// The algorithm ran to completion but reported failure.
    #[error("algorithm reported failure: {0}")]
    AlgorithmReportedFailure(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("no free instance of algorithm '{algorithm}'")]
    AcquireBusy { algorithm: String },

    #[error("could not release instance of algorithm '{algorithm}': {reason}")]
    ReleaseFailed { algorithm: String, reason: String },

    #[error("algorithm '{algorithm}' is not registered in the pool")]
    NotRegistered { algorithm: String },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HiveError>;

// src/engine/mod.rs

//! Orchestration engine for hivesched.
//!
//! - [`core`] is the pure, synchronous scheduler state machine. It consumes
//!   [`Action`]s and tells the caller which algorithms to dispatch and which
//!   events finished.
//! - [`controller`] is the async shell around it: one task draining the
//!   action queue and submitting work to the thread pool.
//! - [`scheduler`] is the public handle ([`ForwardScheduler`]) used to push
//!   and pop events.
//! - [`slot`] holds per-slot records and the lock-free slot claim table.
//! - [`timeline`] and [`event_loop`] are the run-level helpers.

use std::time::Duration;

use crate::dag::AlgoIndex;
use crate::errors::{ExecutionError, ResourceError};
use crate::exec::Filter;

/// Identity of one event while it is processed.
///
/// An event gets a slot when the scheduler accepts it; contexts that were
/// never bound report `valid() == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventContext {
    evt: u64,
    slot: usize,
    valid: bool,
}

impl EventContext {
    pub fn new(evt: u64) -> Self {
        Self {
            evt,
            slot: 0,
            valid: false,
        }
    }

    /// The same event, bound to `slot`.
    pub fn bind(self, slot: usize) -> Self {
        Self {
            evt: self.evt,
            slot,
            valid: true,
        }
    }

    pub fn evt(&self) -> u64 {
        self.evt
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn valid(&self) -> bool {
        self.valid
    }
}

/// One state mutation, applied by the controller only.
///
/// Actions are plain data so tests can build and inspect them.
#[derive(Debug, Clone)]
pub enum Action {
    /// A context bound to a freshly claimed slot.
    NewEvent { ctx: EventContext },
    /// An execution task finished (successfully or not).
    AlgorithmExecuted {
        algo: AlgoIndex,
        ctx: EventContext,
        result: Result<Filter, ExecutionError>,
        elapsed: Duration,
        release_error: Option<ResourceError>,
    },
    /// Stop scheduling new algorithms for this event; let running ones drain.
    /// Ignored once the event left its slot.
    AbortEvent { ctx: EventContext },
    /// Stop the controller.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Success,
    /// An algorithm failed or the event was aborted.
    Failed,
    /// Nothing could move any more; see [`crate::errors::SchedulingError::Stall`].
    Stalled,
}

/// Where an algorithm ended up for a finished event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalState {
    Accepted,
    Rejected,
    Error,
    /// Never ran: pruned by the control flow or cut off by a failure.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedEvent {
    pub ctx: EventContext,
    pub status: EventStatus,
    /// Every algorithm in graph order.
    pub algorithms: Vec<(String, FinalState)>,
}

impl FinishedEvent {
    pub fn failed(&self) -> bool {
        self.status != EventStatus::Success
    }

    pub fn final_state(&self, name: &str) -> Option<FinalState> {
        self.algorithms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }
}

pub mod controller;
pub mod core;
pub mod event_loop;
pub mod scheduler;
pub mod slot;
pub mod timeline;

pub use self::core::{ScheduledAlgorithm, SchedulerCore, SchedulerSettings, SchedulerStep};
pub use event_loop::{EventLoop, RunSummary};
pub use scheduler::ForwardScheduler;
pub use slot::{EventSlot, SlotTable};
pub use timeline::{Timeline, TimelineEvent};

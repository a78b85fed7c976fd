// src/exec/algorithm.rs

//! The algorithm contract and the built-in `CpuCruncher`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::config::model::AlgorithmConfig;
use crate::engine::EventContext;
use crate::errors::ExecutionError;
use crate::exec::store::EventStore;

/// Filter decision of a successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Accept,
    Reject,
}

impl Filter {
    pub fn passed(self) -> bool {
        self == Filter::Accept
    }
}

/// A processing unit run by the scheduler.
///
/// `execute` is called on a worker thread with the event being processed
/// and the store of its slot. The scheduler guarantees that a `clone`
/// instance is used by one task at a time; `shared` instances must be
/// reentrant. Panics are caught and reported as
/// [`ExecutionError::AlgorithmFault`].
pub trait Algorithm: Send + Sync {
    fn execute(&self, ctx: &EventContext, store: &EventStore) -> Result<Filter, ExecutionError>;
}

/// Closures are algorithms too; handy in tests.
impl<F> Algorithm for F
where
    F: Fn(&EventContext, &EventStore) -> Result<Filter, ExecutionError> + Send + Sync,
{
    fn execute(&self, ctx: &EventContext, store: &EventStore) -> Result<Filter, ExecutionError> {
        self(ctx, store)
    }
}

/// Busy-work algorithm driven by its `[algorithm.<name>]` section.
///
/// Sleeps for `runtime_ms`, checks that its inputs are in the store, writes
/// its outputs (the event number), and fails or rejects deterministically
/// on events whose number is a multiple of `fail_every` / `reject_every`.
#[derive(Debug, Clone)]
pub struct CpuCruncher {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    runtime: Duration,
    fail_every: u64,
    reject_every: u64,
}

impl CpuCruncher {
    pub fn new(name: impl Into<String>, cfg: &AlgorithmConfig) -> Self {
        Self {
            name: name.into(),
            inputs: cfg.inputs.clone(),
            outputs: cfg.outputs.clone(),
            runtime: Duration::from_millis(cfg.runtime_ms),
            fail_every: cfg.fail_every,
            reject_every: cfg.reject_every,
        }
    }

    pub fn shared(name: impl Into<String>, cfg: &AlgorithmConfig) -> Arc<dyn Algorithm> {
        Arc::new(Self::new(name, cfg))
    }
}

fn hits(evt: u64, every: u64) -> bool {
    every != 0 && evt % every == 0
}

impl Algorithm for CpuCruncher {
    fn execute(&self, ctx: &EventContext, store: &EventStore) -> Result<Filter, ExecutionError> {
        trace!(algorithm = %self.name, evt = ctx.evt(), "crunching");

        if !self.runtime.is_zero() {
            thread::sleep(self.runtime);
        }

        if let Some(missing) = self.inputs.iter().find(|p| !store.contains(p)) {
            return Err(ExecutionError::AlgorithmReportedFailure(format!(
                "{}: input '{missing}' missing for event {}",
                self.name,
                ctx.evt()
            )));
        }

        if hits(ctx.evt(), self.fail_every) {
            return Err(ExecutionError::AlgorithmReportedFailure(format!(
                "{}: configured to fail on event {}",
                self.name,
                ctx.evt()
            )));
        }

        for product in self.outputs.iter() {
            store.put(product.clone(), Arc::new(ctx.evt()));
        }

        if hits(ctx.evt(), self.reject_every) {
            Ok(Filter::Reject)
        } else {
            Ok(Filter::Accept)
        }
    }
}

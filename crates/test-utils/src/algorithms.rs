//! Instrumented algorithms for scheduler tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use hivesched::engine::EventContext;
use hivesched::errors::ExecutionError;
use hivesched::exec::{EventStore, Filter};

/// Shared `(event, algorithm)` log, in execution order.
pub type ExecutionLog = Arc<Mutex<Vec<(u64, String)>>>;

pub fn new_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Names executed for `evt`, in order.
pub fn executed_for(log: &ExecutionLog, evt: u64) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(e, _)| *e == evt)
        .map(|(_, name)| name.clone())
        .collect()
}

/// Appends itself to an [`ExecutionLog`], writes its outputs and returns
/// a fixed filter decision.
#[derive(Clone)]
pub struct RecordingAlgorithm {
    name: String,
    outputs: Vec<String>,
    filter: Filter,
    delay: Duration,
    fail_on: HashSet<u64>,
    log: ExecutionLog,
}

impl RecordingAlgorithm {
    pub fn new(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            outputs: vec![],
            filter: Filter::Accept,
            delay: Duration::ZERO,
            fail_on: HashSet::new(),
            log: Arc::clone(log),
        }
    }

    pub fn output(mut self, product: &str) -> Self {
        self.outputs.push(product.to_string());
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.filter = Filter::Reject;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Return an error for event `evt`.
    pub fn failing_on(mut self, evt: u64) -> Self {
        self.fail_on.insert(evt);
        self
    }
}

impl hivesched::exec::Algorithm for RecordingAlgorithm {
    fn execute(&self, ctx: &EventContext, store: &EventStore) -> Result<Filter, ExecutionError> {
        self.log
            .lock()
            .unwrap()
            .push((ctx.evt(), self.name.clone()));

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        if self.fail_on.contains(&ctx.evt()) {
            return Err(ExecutionError::AlgorithmReportedFailure(format!(
                "{} failed on event {}",
                self.name,
                ctx.evt()
            )));
        }

        for product in self.outputs.iter() {
            store.put(product.clone(), Arc::new(ctx.evt()));
        }
        Ok(self.filter)
    }
}

/// Always panics.
#[derive(Debug, Clone)]
pub struct PanickingAlgorithm {
    message: String,
}

impl PanickingAlgorithm {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl hivesched::exec::Algorithm for PanickingAlgorithm {
    fn execute(&self, _ctx: &EventContext, _store: &EventStore) -> Result<Filter, ExecutionError> {
        panic!("{}", self.message);
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

/// Tracks how many executions overlap. Clones share their counters, so one
/// probe can back every instance of every algorithm in a pool.
#[derive(Debug, Clone)]
pub struct ConcurrencyProbe {
    state: Arc<ProbeState>,
    hold: Duration,
    outputs: Vec<String>,
}

impl ConcurrencyProbe {
    pub fn new(hold: Duration) -> Self {
        Self {
            state: Arc::new(ProbeState::default()),
            hold,
            outputs: vec![],
        }
    }

    /// Same counters, different outputs.
    pub fn with_outputs(&self, outputs: &[String]) -> Self {
        Self {
            state: Arc::clone(&self.state),
            hold: self.hold,
            outputs: outputs.to_vec(),
        }
    }

    /// Highest number of executions seen at once.
    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl hivesched::exec::Algorithm for ConcurrencyProbe {
    fn execute(&self, ctx: &EventContext, store: &EventStore) -> Result<Filter, ExecutionError> {
        let now = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(now, Ordering::SeqCst);
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        thread::sleep(self.hold);
        for product in self.outputs.iter() {
            store.put(product.clone(), Arc::new(ctx.evt()));
        }

        self.state.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Filter::Accept)
    }
}

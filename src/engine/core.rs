// src/engine/core.rs

//! Pure scheduler state machine.
//!
//! [`SchedulerCore`] consumes [`Action`]s one at a time and returns a
//! [`SchedulerStep`] telling the caller:
//! - which algorithm instances were acquired and must be executed
//! - which events finished
//! - whether the scheduler hit a fatal condition
//!
//! It owns every piece of per-slot state (execution states, control-flow
//! decisions, product availability) and has no channels, no Tokio types and
//! no threads. The async shell in `engine::controller` is the only caller in
//! production; tests drive it directly.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::config::model::SchedulerSection;
use crate::dag::{
    AlgoIndex, DataFlowTracker, ExecutionState, ExecutionStateTable, FlowGraph, Ranker, Ranking,
    TimingStats,
};
use crate::engine::slot::EventSlot;
use crate::engine::{Action, EventContext, EventStatus, FinalState, FinishedEvent};
use crate::errors::{ExecutionError, ResourceError, SchedulingError};
use crate::exec::algorithm::Filter;
use crate::exec::pool::{AlgResourcePool, AlgorithmHandle};
use crate::exec::store::Whiteboard;
use crate::types::OptimizationMode;

/// Knobs of the scheduler itself (the `[scheduler]` section minus the
/// thread-pool and timeline settings).
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_events_in_flight: usize,
    pub max_algos_in_flight: usize,
    pub optimization_mode: OptimizationMode,
    pub action_queue_capacity: usize,
    pub simulate_execution: bool,
}

impl SchedulerSettings {
    /// Every count must be at least one.
    pub fn validate(&self) -> Result<(), SchedulingError> {
        let counts = [
            ("max_events_in_flight", self.max_events_in_flight),
            ("max_algos_in_flight", self.max_algos_in_flight),
            ("action_queue_capacity", self.action_queue_capacity),
        ];
        match counts.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(SchedulingError::InvalidSettings(format!("{name} must be >= 1"))),
            None => Ok(()),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&SchedulerSection::default())
    }
}

impl From<&SchedulerSection> for SchedulerSettings {
    fn from(s: &SchedulerSection) -> Self {
        Self {
            max_events_in_flight: s.max_events_in_flight,
            max_algos_in_flight: s.max_algos_in_flight,
            optimization_mode: s.optimization_mode,
            action_queue_capacity: s.action_queue_capacity,
            simulate_execution: s.simulate_execution,
        }
    }
}

/// An algorithm that was promoted to SCHEDULED and must now be executed.
#[derive(Debug, Clone)]
pub struct ScheduledAlgorithm {
    pub algo: AlgoIndex,
    pub ctx: EventContext,
    pub handle: AlgorithmHandle,
}

/// Result of applying one [`Action`].
#[derive(Debug)]
pub struct SchedulerStep {
    pub dispatched: Vec<ScheduledAlgorithm>,
    pub finished: Vec<FinishedEvent>,
    /// Set when a slot stalled; the scheduler must stop taking events.
    pub fatal: Option<SchedulingError>,
    /// False once a `Shutdown` action was applied.
    pub keep_running: bool,
}

impl SchedulerStep {
    fn new() -> Self {
        Self {
            dispatched: Vec::new(),
            finished: Vec::new(),
            fatal: None,
            keep_running: true,
        }
    }
}

pub struct SchedulerCore {
    graph: Arc<FlowGraph>,
    states: ExecutionStateTable,
    data: DataFlowTracker,
    slots: Vec<EventSlot>,
    pool: Arc<dyn AlgResourcePool>,
    whiteboard: Arc<Whiteboard>,
    ranking: Ranking,
    timings: TimingStats,
    max_algos_in_flight: usize,
    algos_in_flight: usize,
}

impl std::fmt::Debug for SchedulerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerCore")
            .field("slots", &self.slots.len())
            .field("algorithms", &self.graph.len())
            .field("algos_in_flight", &self.algos_in_flight)
            .field("ranker", &self.ranking.ranker())
            .finish_non_exhaustive()
    }
}

impl SchedulerCore {
    /// Fails with `UnknownAlgorithm` if the pool cannot lend some algorithm
    /// of the graph, and with `InvalidSettings` on a zero count.
    pub fn new(
        settings: &SchedulerSettings,
        graph: Arc<FlowGraph>,
        pool: Arc<dyn AlgResourcePool>,
        whiteboard: Arc<Whiteboard>,
    ) -> Result<Self, SchedulingError> {
        settings.validate()?;
        if let Some(missing) = graph.algorithms().iter().find(|a| !pool.contains(&a.name)) {
            return Err(SchedulingError::UnknownAlgorithm(missing.name.clone()));
        }

        let slots = settings.max_events_in_flight;
        let cf_state = graph.control_flow().new_state();
        let ranking = Ranking::new(Ranker::from(settings.optimization_mode), &graph);

        Ok(Self {
            states: ExecutionStateTable::new(slots, graph.len()),
            data: DataFlowTracker::new(graph.data_flow(), slots),
            slots: (0..slots).map(|_| EventSlot::new(cf_state.clone())).collect(),
            timings: TimingStats::new(graph.len()),
            max_algos_in_flight: settings.max_algos_in_flight,
            algos_in_flight: 0,
            graph,
            pool,
            whiteboard,
            ranking,
        })
    }

    pub fn graph(&self) -> &Arc<FlowGraph> {
        &self.graph
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn state_of(&self, algo: AlgoIndex, slot: usize) -> ExecutionState {
        self.states.get(algo, slot)
    }

    pub fn slot(&self, slot: usize) -> &EventSlot {
        &self.slots[slot]
    }

    /// Algorithms SCHEDULED over all slots.
    pub fn algos_in_flight(&self) -> usize {
        self.algos_in_flight
    }

    pub fn timings(&self) -> &TimingStats {
        &self.timings
    }

    /// Apply one action.
    ///
    /// An `Err` means the action itself could not be applied (a stale slot
    /// or an algorithm unknown to the pool). A stall is not an `Err`: the
    /// stalled event is still reported in `finished` and the error is put
    /// in `fatal`.
    pub fn apply(&mut self, action: Action) -> Result<SchedulerStep, SchedulingError> {
        let mut step = SchedulerStep::new();

        match action {
            Action::NewEvent { ctx } => {
                self.accept_event(ctx)?;
                self.update_states(Some(ctx.slot()), &mut step)?;
            }
            Action::AlgorithmExecuted {
                algo,
                ctx,
                result,
                elapsed,
                release_error,
            } => {
                self.promote_to_executed(algo, ctx, result, elapsed, release_error)?;
                self.update_states(Some(ctx.slot()), &mut step)?;
            }
            Action::AbortEvent { ctx } => {
                self.abort(ctx);
                self.update_states(Some(ctx.slot()), &mut step)?;
            }
            Action::Shutdown => {
                info!(in_flight = self.algos_in_flight, "scheduler core shutting down");
                step.keep_running = false;
            }
        }

        Ok(step)
    }

    fn accept_event(&mut self, ctx: EventContext) -> Result<(), SchedulingError> {
        let slot = ctx.slot();
        if !ctx.valid() || slot >= self.slots.len() || self.slots[slot].is_occupied() {
            error!(evt = ctx.evt(), slot, "event pushed into a slot that is not free");
            return Err(SchedulingError::NoFreeSlot);
        }

        self.states.reset_slot(slot);
        self.data.reset_slot(slot);
        self.whiteboard.clear(slot);
        self.slots[slot].assign(ctx);

        info!(evt = ctx.evt(), slot, "event accepted");
        Ok(())
    }

    fn promote_to_executed(
        &mut self,
        algo: AlgoIndex,
        ctx: EventContext,
        result: Result<Filter, ExecutionError>,
        elapsed: std::time::Duration,
        release_error: Option<ResourceError>,
    ) -> Result<(), SchedulingError> {
        let slot = ctx.slot();
        let name = self.graph.name_of(algo).to_string();

        if self.slots.get(slot).and_then(|s| s.ctx) != Some(ctx) {
            error!(algorithm = %name, evt = ctx.evt(), slot, "completion for an event that is not in its slot");
            return Err(SchedulingError::StaleCompletion {
                algorithm: name,
                event: ctx.evt(),
                slot,
            });
        }

        self.algos_in_flight = self.algos_in_flight.saturating_sub(1);
        let record = &mut self.slots[slot];
        record.in_flight = record.in_flight.saturating_sub(1);
        self.timings.record(algo, elapsed);

        if let Some(err) = release_error {
            warn!(algorithm = %name, evt = ctx.evt(), %err, "algorithm instance release failed");
        }

        let cf = self.graph.control_flow();
        match result {
            Ok(filter) => {
                self.states.set(algo, slot, ExecutionState::Executed)?;
                self.data.mark_outputs(algo, slot);
                let terminal = match filter {
                    Filter::Accept => ExecutionState::EvtAccepted,
                    Filter::Reject => ExecutionState::EvtRejected,
                };
                self.states.set(algo, slot, terminal)?;
                cf.resolve_algorithm(algo, filter.passed(), &mut self.slots[slot].control_flow);
                debug!(algorithm = %name, evt = ctx.evt(), slot, state = %terminal, "algorithm executed");
            }
            Err(err) => {
                self.states.set(algo, slot, ExecutionState::Error)?;
                cf.resolve_algorithm(algo, false, &mut self.slots[slot].control_flow);
                self.slots[slot].failed = true;
                warn!(algorithm = %name, evt = ctx.evt(), slot, %err, "event marked as failed");
            }
        }

        Ok(())
    }

    fn abort(&mut self, ctx: EventContext) {
        let slot = ctx.slot();
        match self.slots.get_mut(slot) {
            Some(record) if record.ctx == Some(ctx) => {
                record.aborted = true;
                record.failed = true;
                info!(evt = ctx.evt(), slot, in_flight = record.in_flight, "event aborted");
            }
            _ => debug!(evt = ctx.evt(), slot, "abort for an event no longer in its slot ignored"),
        }
    }

    /// The readiness scan.
    ///
    /// Promotes pending algorithms, dispatches the best-ranked data-ready
    /// ones within the in-flight cap, then finishes completed and stalled
    /// slots. `first` is scanned before the other slots.
    fn update_states(
        &mut self,
        first: Option<usize>,
        step: &mut SchedulerStep,
    ) -> Result<(), SchedulingError> {
        let order = self.scan_order(first);

        for &slot in order.iter() {
            self.promote_slot(slot)?;
        }

        self.dispatch(&order, step)?;

        for &slot in order.iter() {
            if !self.slots[slot].is_occupied() {
                continue;
            }
            if self.is_complete(slot) {
                let status = if self.slots[slot].failed {
                    EventStatus::Failed
                } else {
                    EventStatus::Success
                };
                step.finished.push(self.finish_slot(slot, status));
            } else if self.is_stalled(slot) {
                let stall = self.stall_error(slot);
                error!(%stall, "scheduler stalled\n{}", self.dump_state(slot));
                step.finished.push(self.finish_slot(slot, EventStatus::Stalled));
                step.fatal.get_or_insert(stall);
            }
        }

        Ok(())
    }

    fn scan_order(&self, first: Option<usize>) -> Vec<usize> {
        let mut order: Vec<usize> = Vec::with_capacity(self.slots.len());
        if let Some(slot) = first.filter(|s| *s < self.slots.len()) {
            order.push(slot);
        }
        order.extend((0..self.slots.len()).filter(|s| Some(*s) != first));
        order
    }

    fn promote_slot(&mut self, slot: usize) -> Result<(), SchedulingError> {
        let record = &self.slots[slot];
        if !record.is_occupied() || record.is_closed() {
            return Ok(());
        }
        let cf = self.graph.control_flow();

        for algo in 0..self.graph.len() {
            let mut state = self.states.get(algo, slot);

            if state == ExecutionState::Initial && cf.is_control_ready(algo, &record.control_flow) {
                self.states.set(algo, slot, ExecutionState::ControlReady)?;
                state = ExecutionState::ControlReady;
                trace!(algorithm = self.graph.name_of(algo), slot, "control ready");
            }

            if state == ExecutionState::ControlReady && self.data.is_data_ready(algo, slot) {
                self.states.set(algo, slot, ExecutionState::DataReady)?;
                trace!(algorithm = self.graph.name_of(algo), slot, "data ready");
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, order: &[usize], step: &mut SchedulerStep) -> Result<(), SchedulingError> {
        if self.algos_in_flight >= self.max_algos_in_flight {
            return Ok(());
        }

        let cf = self.graph.control_flow();
        let mut candidates: Vec<(usize, AlgoIndex)> = Vec::new();
        for &slot in order.iter() {
            let record = &self.slots[slot];
            if !record.is_occupied() || record.is_closed() {
                continue;
            }
            candidates.extend(
                self.states
                    .algorithms_in(slot, ExecutionState::DataReady)
                    .into_iter()
                    // A decision may have closed the branch since promotion.
                    .filter(|algo| cf.is_control_ready(*algo, &record.control_flow))
                    .map(|algo| (slot, algo)),
            );
        }
        self.ranking.sort(&mut candidates, &self.timings);

        for (slot, algo) in candidates {
            if self.algos_in_flight >= self.max_algos_in_flight {
                break;
            }
            let Some(ctx) = self.slots[slot].ctx else {
                continue;
            };
            let name = self.graph.name_of(algo);
            let handle = match self.pool.acquire_algorithm(name) {
                Ok(handle) => handle,
                Err(ResourceError::AcquireBusy { .. }) => {
                    trace!(algorithm = name, slot, "no free instance; staying data ready");
                    continue;
                }
                Err(ResourceError::NotRegistered { algorithm }) => {
                    return Err(SchedulingError::UnknownAlgorithm(algorithm));
                }
                Err(err) => {
                    warn!(algorithm = name, slot, %err, "unexpected pool error; retrying later");
                    continue;
                }
            };

            self.states.set(algo, slot, ExecutionState::Scheduled)?;
            self.algos_in_flight += 1;
            self.slots[slot].in_flight += 1;

            debug!(algorithm = name, evt = ctx.evt(), slot, "algorithm scheduled");
            step.dispatched.push(ScheduledAlgorithm { algo, ctx, handle });
        }

        Ok(())
    }

    /// Pending algorithm that no decision can enable any more.
    fn is_pruned(&self, algo: AlgoIndex, slot: usize) -> bool {
        self.graph
            .control_flow()
            .is_skipped(algo, &self.slots[slot].control_flow)
    }

    fn is_complete(&self, slot: usize) -> bool {
        let record = &self.slots[slot];
        if record.in_flight > 0 {
            return false;
        }
        if record.is_closed() {
            return true;
        }
        (0..self.graph.len()).all(|algo| {
            self.states.get(algo, slot).is_terminal() || self.is_pruned(algo, slot)
        })
    }

    /// The slot still has unresolved work but nothing can move it forward.
    ///
    /// Only the slot's own completions change its decisions and products, so
    /// with nothing of the slot in flight and nothing data ready in it, the
    /// slot is dead even while other slots keep running.
    pub fn is_stalled(&self, slot: usize) -> bool {
        let record = &self.slots[slot];
        if !record.is_occupied() || record.in_flight > 0 || self.is_complete(slot) {
            return false;
        }
        let waiting = self
            .states
            .algorithms_in(slot, ExecutionState::DataReady)
            .into_iter()
            .any(|algo| !self.is_pruned(algo, slot));
        !waiting || self.algos_in_flight == 0
    }

    fn stall_error(&self, slot: usize) -> SchedulingError {
        let pending = (0..self.graph.len())
            .filter(|algo| {
                !self.states.get(*algo, slot).is_terminal() && !self.is_pruned(*algo, slot)
            })
            .map(|algo| self.graph.name_of(algo).to_string())
            .collect();

        SchedulingError::Stall {
            event: self.slots[slot].ctx.map(|c| c.evt()).unwrap_or_default(),
            slot,
            pending,
        }
    }

    fn finish_slot(&mut self, slot: usize, status: EventStatus) -> FinishedEvent {
        let algorithms = (0..self.graph.len())
            .map(|algo| {
                let state = match self.states.get(algo, slot) {
                    ExecutionState::EvtAccepted => FinalState::Accepted,
                    ExecutionState::EvtRejected => FinalState::Rejected,
                    ExecutionState::Error => FinalState::Error,
                    _ => FinalState::Skipped,
                };
                (self.graph.name_of(algo).to_string(), state)
            })
            .collect();

        let record = &mut self.slots[slot];
        let ctx = record.ctx.unwrap_or_else(|| EventContext::new(0).bind(slot));
        record.release();

        info!(evt = ctx.evt(), slot, ?status, "event finished");

        FinishedEvent {
            ctx,
            status,
            algorithms,
        }
    }

    /// Human-readable state of one slot; logged when the scheduler stalls.
    pub fn dump_state(&self, slot: usize) -> String {
        let mut out = String::new();
        let Some(record) = self.slots.get(slot) else {
            let _ = writeln!(out, "slot {slot}: out of range");
            return out;
        };

        match record.ctx {
            Some(ctx) => {
                let _ = writeln!(
                    out,
                    "slot {slot}: event {} in_flight={} failed={} aborted={} (global in flight {}/{})",
                    ctx.evt(),
                    record.in_flight,
                    record.failed,
                    record.aborted,
                    self.algos_in_flight,
                    self.max_algos_in_flight
                );
            }
            None => {
                let _ = writeln!(out, "slot {slot}: free");
                return out;
            }
        }

        let data_flow = self.graph.data_flow();
        for algo in 0..self.graph.len() {
            let state = self.states.get(algo, slot);
            let _ = write!(out, "  {:<24} {}", self.graph.name_of(algo), state);
            if !state.is_terminal() && self.is_pruned(algo, slot) {
                let _ = write!(out, " (skipped)");
            }
            let missing: Vec<&str> = self
                .data
                .missing_inputs(algo, slot)
                .into_iter()
                .map(|p| data_flow.product_name(p))
                .collect();
            if state.is_pending() && !missing.is_empty() {
                let _ = write!(out, " missing {missing:?}");
            }
            let _ = writeln!(out);
        }

        out
    }
}

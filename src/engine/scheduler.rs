// src/engine/scheduler.rs

//! Public scheduler handle.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::{FlowGraph, simulate};
use crate::engine::controller::{Controller, SchedulerShared};
use crate::engine::core::{SchedulerCore, SchedulerSettings};
use crate::engine::timeline::Timeline;
use crate::engine::{Action, EventContext, FinishedEvent};
use crate::errors::SchedulingError;
use crate::exec::pool::AlgResourcePool;
use crate::exec::store::Whiteboard;
use crate::exec::thread_pool::ThreadPool;

/// Handle to a running scheduler.
///
/// Cheap to share behind an `Arc`: every method takes `&self`, and several
/// tasks may push events at the same time. Dropping the handle lets the
/// controller finish once the tasks still running have reported back.
pub struct ForwardScheduler {
    actions: mpsc::Sender<Action>,
    finished: AsyncMutex<mpsc::UnboundedReceiver<FinishedEvent>>,
    shared: Arc<SchedulerShared>,
    controller: Mutex<Option<JoinHandle<()>>>,
    graph: Arc<FlowGraph>,
    whiteboard: Arc<Whiteboard>,
    timeline: Arc<Timeline>,
}

impl std::fmt::Debug for ForwardScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardScheduler")
            .field("slots", &self.shared.slots.len())
            .field("free_slots", &self.free_slots())
            .field("fatal", &self.shared.fatal())
            .finish_non_exhaustive()
    }
}

impl ForwardScheduler {
    /// Start a scheduler without timeline recording.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(
        settings: SchedulerSettings,
        graph: Arc<FlowGraph>,
        pool: Arc<dyn AlgResourcePool>,
        thread_pool: Arc<dyn ThreadPool>,
    ) -> Result<Self, SchedulingError> {
        Self::start_with_timeline(settings, graph, pool, thread_pool, Arc::new(Timeline::disabled()))
    }

    pub fn start_with_timeline(
        settings: SchedulerSettings,
        graph: Arc<FlowGraph>,
        pool: Arc<dyn AlgResourcePool>,
        thread_pool: Arc<dyn ThreadPool>,
        timeline: Arc<Timeline>,
    ) -> Result<Self, SchedulingError> {
        settings.validate()?;

        if settings.simulate_execution {
            let report = simulate(&graph)?;
            info!(
                executed = report.executed.len(),
                skipped = report.skipped.len(),
                "graph simulation passed"
            );
        }

        let whiteboard = Arc::new(Whiteboard::new(settings.max_events_in_flight));
        let core = SchedulerCore::new(
            &settings,
            Arc::clone(&graph),
            Arc::clone(&pool),
            Arc::clone(&whiteboard),
        )?;

        let (actions_tx, actions_rx) = mpsc::channel::<Action>(settings.action_queue_capacity);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel::<FinishedEvent>();
        let shared = Arc::new(SchedulerShared::new(settings.max_events_in_flight));

        let controller = Controller::new(
            core,
            actions_rx,
            actions_tx.downgrade(),
            finished_tx,
            thread_pool,
            pool,
            Arc::clone(&whiteboard),
            Arc::clone(&timeline),
            Arc::clone(&shared),
        );
        let handle = tokio::spawn(controller.run());

        info!(
            slots = settings.max_events_in_flight,
            max_algos_in_flight = settings.max_algos_in_flight,
            mode = ?settings.optimization_mode,
            "forward scheduler started"
        );

        Ok(Self {
            actions: actions_tx,
            finished: AsyncMutex::new(finished_rx),
            shared,
            controller: Mutex::new(Some(handle)),
            graph,
            whiteboard,
            timeline,
        })
    }

    /// Bind `ctx` to a free slot and queue it for scheduling.
    ///
    /// Returns the bound context. Fails with `NoFreeSlot` when every slot is
    /// taken, and with the recorded fatal error once the scheduler stalled.
    pub async fn push_new_event(&self, ctx: EventContext) -> Result<EventContext, SchedulingError> {
        if let Some(fatal) = self.shared.fatal() {
            return Err(fatal);
        }

        let slot = self
            .shared
            .slots
            .try_claim()
            .ok_or(SchedulingError::NoFreeSlot)?;
        let bound = ctx.bind(slot);

        if self.actions.send(Action::NewEvent { ctx: bound }).await.is_err() {
            self.shared.slots.release(slot);
            return Err(self.shared.fatal().unwrap_or(SchedulingError::SchedulerStopped));
        }

        debug!(evt = bound.evt(), slot, "event pushed");
        Ok(bound)
    }

    /// Push events in order until one is refused; returns how many went in.
    pub async fn push_new_events(&self, batch: Vec<EventContext>) -> usize {
        let mut pushed = 0;
        for ctx in batch {
            match self.push_new_event(ctx).await {
                Ok(_) => pushed += 1,
                Err(err) => {
                    debug!(%err, pushed, "batch push stopped");
                    break;
                }
            }
        }
        pushed
    }

    /// Wait for the next finished event.
    ///
    /// Once the controller stopped and everything was drained, returns the
    /// fatal error that stopped it (or `SchedulerStopped`).
    pub async fn pop_finished_event(&self) -> Result<FinishedEvent, SchedulingError> {
        let mut rx = self.finished.lock().await;
        match rx.recv().await {
            Some(event) => Ok(event),
            None => Err(self.stopped_error()),
        }
    }

    /// `Ok(None)` when nothing is ready right now.
    pub fn try_pop_finished_event(&self) -> Result<Option<FinishedEvent>, SchedulingError> {
        let Ok(mut rx) = self.finished.try_lock() else {
            // Someone else is waiting in `pop_finished_event`.
            return Ok(None);
        };
        match rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.stopped_error()),
        }
    }

    pub fn free_slots(&self) -> usize {
        self.shared.slots.free_slots()
    }

    pub fn slot_count(&self) -> usize {
        self.shared.slots.len()
    }

    /// Stop scheduling further algorithms of `ctx`, the context returned by
    /// [`push_new_event`](Self::push_new_event).
    ///
    /// Algorithms already running finish normally; the event is then
    /// reported with status `Failed`. If the event already finished and its
    /// slot holds another event, nothing happens.
    pub async fn abort_event(&self, ctx: EventContext) -> Result<(), SchedulingError> {
        self.actions
            .send(Action::AbortEvent { ctx })
            .await
            .map_err(|_| self.stopped_error())
    }

    /// Stop the controller and wait for it.
    ///
    /// Algorithms still running finish on their worker threads, but their
    /// results are dropped.
    pub async fn shutdown(&self) {
        if self.actions.send(Action::Shutdown).await.is_err() {
            debug!("controller already stopped");
        }

        let handle = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(%err, "controller task ended abnormally");
            }
        }
    }

    /// The error that made the scheduler stop taking events, if any.
    pub fn fatal_error(&self) -> Option<SchedulingError> {
        self.shared.fatal()
    }

    pub fn graph(&self) -> &Arc<FlowGraph> {
        &self.graph
    }

    pub fn whiteboard(&self) -> &Arc<Whiteboard> {
        &self.whiteboard
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    fn stopped_error(&self) -> SchedulingError {
        self.shared.fatal().unwrap_or(SchedulingError::SchedulerStopped)
    }
}

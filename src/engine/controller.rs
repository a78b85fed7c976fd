// src/engine/controller.rs

//! Async shell around [`SchedulerCore`].
//!
//! One Tokio task owns the core and drains the action queue. For each
//! action it feeds the core, turns dispatched algorithms into
//! [`ExecutionTask`]s for the thread pool and hands finished events to the
//! finished queue. All scheduler state is mutated here and nowhere else.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::core::{SchedulerCore, SchedulerStep};
use crate::engine::slot::SlotTable;
use crate::engine::timeline::Timeline;
use crate::engine::{Action, FinishedEvent};
use crate::errors::SchedulingError;
use crate::exec::pool::AlgResourcePool;
use crate::exec::store::Whiteboard;
use crate::exec::task::ExecutionTask;
use crate::exec::thread_pool::ThreadPool;

/// State shared between the controller and the public handle.
#[derive(Debug)]
pub struct SchedulerShared {
    pub slots: SlotTable,
    fatal: Mutex<Option<SchedulingError>>,
}

impl SchedulerShared {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: SlotTable::new(slots),
            fatal: Mutex::new(None),
        }
    }

    pub fn fatal(&self) -> Option<SchedulingError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keep the first fatal error; later ones are only logged.
    pub fn set_fatal(&self, err: SchedulingError) {
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(err);
        } else {
            debug!(%err, "additional fatal scheduling error");
        }
    }
}

pub struct Controller {
    core: SchedulerCore,
    actions_rx: mpsc::Receiver<Action>,
    /// Weak so that the queue closes once the handle and every running task
    /// are gone.
    actions_tx: mpsc::WeakSender<Action>,
    finished_tx: mpsc::UnboundedSender<FinishedEvent>,
    thread_pool: Arc<dyn ThreadPool>,
    pool: Arc<dyn AlgResourcePool>,
    whiteboard: Arc<Whiteboard>,
    timeline: Arc<Timeline>,
    shared: Arc<SchedulerShared>,
}

impl Controller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core: SchedulerCore,
        actions_rx: mpsc::Receiver<Action>,
        actions_tx: mpsc::WeakSender<Action>,
        finished_tx: mpsc::UnboundedSender<FinishedEvent>,
        thread_pool: Arc<dyn ThreadPool>,
        pool: Arc<dyn AlgResourcePool>,
        whiteboard: Arc<Whiteboard>,
        timeline: Arc<Timeline>,
        shared: Arc<SchedulerShared>,
    ) -> Self {
        Self {
            core,
            actions_rx,
            actions_tx,
            finished_tx,
            thread_pool,
            pool,
            whiteboard,
            timeline,
            shared,
        }
    }

    /// Main loop.
    ///
    /// Exits on `Shutdown`, when the action queue closes, on an action that
    /// cannot be applied, or once a stall was recorded and the last
    /// in-flight event drained.
    pub async fn run(mut self) {
        info!(
            slots = self.core.slot_count(),
            algorithms = self.core.graph().len(),
            "scheduler controller started"
        );

        while let Some(action) = self.actions_rx.recv().await {
            debug!(?action, "controller received action");

            let step = match self.core.apply(action) {
                Ok(step) => step,
                Err(err) if err.is_fatal() => {
                    error!(%err, "action could not be applied; stopping scheduler");
                    self.shared.set_fatal(err);
                    break;
                }
                Err(err) => {
                    warn!(%err, "action could not be applied");
                    continue;
                }
            };

            let keep_running = step.keep_running;
            if let Err(err) = self.execute_step(step) {
                error!(%err, "could not hand work to the thread pool; stopping scheduler");
                self.shared.set_fatal(err);
                break;
            }

            if !keep_running {
                break;
            }

            if self.shared.fatal().is_some() && self.shared.slots.free_slots() == self.shared.slots.len() {
                info!("scheduler stalled earlier and no event is left in flight; stopping");
                break;
            }
        }

        info!("scheduler controller exiting");
    }

    fn execute_step(&mut self, step: SchedulerStep) -> Result<(), SchedulingError> {
        if let Some(fatal) = step.fatal {
            self.shared.set_fatal(fatal);
        }

        for scheduled in step.dispatched {
            let Some(actions) = self.actions_tx.upgrade() else {
                return Err(SchedulingError::SchedulerStopped);
            };
            let task = ExecutionTask {
                algo: scheduled.algo,
                ctx: scheduled.ctx,
                handle: scheduled.handle,
                pool: Arc::clone(&self.pool),
                whiteboard: Arc::clone(&self.whiteboard),
                timeline: Arc::clone(&self.timeline),
                actions,
            };
            self.thread_pool.submit(task.into_job())?;
        }

        for event in step.finished {
            let slot = event.ctx.slot();
            // The slot is free before the event can be popped.
            self.shared.slots.release(slot);
            if self.finished_tx.send(event).is_err() {
                debug!(slot, "finished queue closed; event dropped");
            }
        }

        Ok(())
    }
}

// src/exec/task.rs

//! One algorithm execution for one event, run on a worker thread.
//!
//! The task never touches scheduler state. It runs the algorithm, gives the
//! instance back to the pool and reports the outcome to the controller as
//! an [`Action::AlgorithmExecuted`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dag::AlgoIndex;
use crate::engine::timeline::Timeline;
use crate::engine::{Action, EventContext};
use crate::errors::ExecutionError;
use crate::exec::pool::{AlgResourcePool, AlgorithmHandle};
use crate::exec::store::Whiteboard;
use crate::exec::thread_pool::{Job, WorkerId};

pub struct ExecutionTask {
    pub algo: AlgoIndex,
    pub ctx: EventContext,
    pub handle: AlgorithmHandle,
    pub pool: Arc<dyn AlgResourcePool>,
    pub whiteboard: Arc<Whiteboard>,
    pub timeline: Arc<Timeline>,
    pub actions: mpsc::Sender<Action>,
}

impl ExecutionTask {
    pub fn into_job(self) -> Job {
        Box::new(move |worker| self.run(worker))
    }

    pub fn run(self, worker: WorkerId) {
        let name = self.handle.name().to_string();
        let slot = if self.ctx.valid() { self.ctx.slot() } else { 0 };
        let store = self.whiteboard.select_store(slot);

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handle.instance().execute(&self.ctx, store)
        }));
        let end = Instant::now();

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(ExecutionError::AlgorithmFault(panic_message(payload.as_ref()))),
        };

        if let Err(err) = &result {
            warn!(algorithm = %name, evt = self.ctx.evt(), slot, %err, "algorithm execution failed");
        }

        let release_error = self.pool.release_algorithm(self.handle).err();
        if let Some(err) = &release_error {
            error!(
                algorithm = %name,
                evt = self.ctx.evt(),
                slot,
                %err,
                "instance could not be put back into the pool"
            );
        }

        self.timeline
            .record(worker, slot, self.ctx.evt(), &name, start, end);

        let action = Action::AlgorithmExecuted {
            algo: self.algo,
            ctx: self.ctx,
            result,
            elapsed: end - start,
            release_error,
        };
        if self.actions.blocking_send(action).is_err() {
            debug!(algorithm = %name, "controller gone; completion dropped");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::algorithm::{Algorithm, Filter};
    use crate::exec::pool::AlgorithmPool;
    use crate::exec::store::EventStore;
    use crate::types::ClonePolicy;

    fn task_for(
        algorithm: Arc<dyn Algorithm>,
        ctx: EventContext,
    ) -> (ExecutionTask, Arc<AlgorithmPool>, mpsc::Receiver<Action>) {
        let mut pool = AlgorithmPool::new();
        pool.register("X", ClonePolicy::Clone, 1, move || Arc::clone(&algorithm));
        let pool = Arc::new(pool);
        let handle = pool.acquire_algorithm("X").unwrap();
        let (tx, rx) = mpsc::channel(4);

        let task = ExecutionTask {
            algo: 0,
            ctx,
            handle,
            pool: pool.clone(),
            whiteboard: Arc::new(Whiteboard::new(2)),
            timeline: Arc::new(Timeline::new(true)),
            actions: tx,
        };
        (task, pool, rx)
    }

    #[test]
    fn reports_success_and_releases_instance() {
        let algo: Arc<dyn Algorithm> = Arc::new(|_: &EventContext, store: &EventStore| {
            store.put("x", Arc::new(1u8));
            Ok::<_, ExecutionError>(Filter::Reject)
        });
        let (task, pool, mut rx) = task_for(algo, EventContext::new(3).bind(1));
        let board = Arc::clone(&task.whiteboard);

        task.run(0);

        assert_eq!(pool.in_use("X"), 0);
        assert!(board.select_store(1).contains("x"));
        match rx.try_recv().unwrap() {
            Action::AlgorithmExecuted { result, release_error, ctx, .. } => {
                assert_eq!(result, Ok(Filter::Reject));
                assert!(release_error.is_none());
                assert_eq!(ctx.evt(), 3);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn panic_becomes_algorithm_fault() {
        let algo: Arc<dyn Algorithm> = Arc::new(|_: &EventContext, _: &EventStore| -> Result<Filter, ExecutionError> {
            panic!("boom")
        });
        let (task, pool, mut rx) = task_for(algo, EventContext::new(1).bind(0));

        task.run(0);

        assert_eq!(pool.in_use("X"), 0);
        match rx.try_recv().unwrap() {
            Action::AlgorithmExecuted { result, .. } => {
                assert_eq!(result, Err(ExecutionError::AlgorithmFault("boom".to_string())));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn unbound_context_uses_slot_zero() {
        let algo: Arc<dyn Algorithm> = Arc::new(|_: &EventContext, store: &EventStore| {
            store.put("seen", Arc::new(()));
            Ok::<_, ExecutionError>(Filter::Accept)
        });
        let (task, _pool, _rx) = task_for(algo, EventContext::new(9));
        let board = Arc::clone(&task.whiteboard);
        let timeline = Arc::clone(&task.timeline);

        task.run(1);

        assert!(board.select_store(0).contains("seen"));
        assert_eq!(timeline.events()[0].worker, 1);
    }
}

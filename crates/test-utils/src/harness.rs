//! A scheduler with real worker threads, ready for integration tests.

use std::sync::Arc;

use hivesched::config::ConfigFile;
use hivesched::dag::FlowGraph;
use hivesched::engine::{EventContext, FinishedEvent, ForwardScheduler, SchedulerSettings};
use hivesched::errors::SchedulingError;
use hivesched::exec::{AlgorithmPool, WorkerPool};

pub struct Harness {
    pub scheduler: Arc<ForwardScheduler>,
    pub workers: Arc<WorkerPool>,
    pub pool: Arc<AlgorithmPool>,
}

impl Harness {
    /// Must be called inside a Tokio runtime.
    pub fn start(
        settings: SchedulerSettings,
        graph: FlowGraph,
        pool: AlgorithmPool,
        threads: usize,
    ) -> Result<Self, SchedulingError> {
        let pool = Arc::new(pool);
        let workers = Arc::new(WorkerPool::new(threads, vec![]).expect("spawn workers"));
        let scheduler = ForwardScheduler::start(
            settings,
            Arc::new(graph),
            pool.clone(),
            workers.clone(),
        )?;
        Ok(Self {
            scheduler: Arc::new(scheduler),
            workers,
            pool,
        })
    }

    pub fn from_config(cfg: &ConfigFile, pool: AlgorithmPool) -> Self {
        Self::start(
            SchedulerSettings::from(&cfg.scheduler),
            FlowGraph::from_config(cfg),
            pool,
            cfg.scheduler.threads,
        )
        .expect("scheduler start")
    }

    /// Push events `1..=n` as slots free up and collect every finished event,
    /// sorted by event number.
    pub async fn run_events(&self, n: u64) -> Vec<FinishedEvent> {
        let mut next = 1;
        let mut in_flight = 0;
        let mut done = Vec::new();

        while next <= n || in_flight > 0 {
            while next <= n {
                match self.scheduler.push_new_event(EventContext::new(next)).await {
                    Ok(_) => {
                        next += 1;
                        in_flight += 1;
                    }
                    Err(SchedulingError::NoFreeSlot) => break,
                    Err(err) => panic!("push of event {next} failed: {err}"),
                }
            }
            let event = self
                .scheduler
                .pop_finished_event()
                .await
                .expect("finished event");
            in_flight -= 1;
            done.push(event);
        }

        done.sort_by_key(|e| e.ctx.evt());
        done
    }

    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.workers.shutdown();
    }
}

// src/engine/event_loop.rs

//! Event-loop driver: feeds a fixed number of events through a scheduler.

use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::scheduler::ForwardScheduler;
use crate::engine::{EventContext, EventStatus};
use crate::errors::SchedulingError;

/// Counters of one [`EventLoop::execute_run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub requested: u64,
    pub pushed: u64,
    pub finished: u64,
    pub failed: u64,
    pub stalled: u64,
    /// Stopped early by Ctrl-C.
    pub interrupted: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct EventLoop {
    scheduler: Arc<ForwardScheduler>,
    next_event: u64,
}

impl EventLoop {
    /// Events are numbered from 1.
    pub fn new(scheduler: Arc<ForwardScheduler>) -> Self {
        Self {
            scheduler,
            next_event: 1,
        }
    }

    pub fn starting_at(mut self, first_event: u64) -> Self {
        self.next_event = first_event;
        self
    }

    pub fn scheduler(&self) -> &Arc<ForwardScheduler> {
        &self.scheduler
    }

    /// Process `events` events, keeping every free slot busy.
    ///
    /// Ctrl-C stops the intake; events already in flight are drained. A
    /// fatal scheduling error (e.g. a stall) also stops the intake and is
    /// returned once the remaining events drained.
    pub async fn execute_run(&mut self, events: u64) -> Result<RunSummary, SchedulingError> {
        let start = Instant::now();
        let mut summary = RunSummary {
            requested: events,
            ..RunSummary::default()
        };
        let mut in_flight = 0u64;
        let mut fatal: Option<SchedulingError> = None;
        let mut ctrl_c = pin!(tokio::signal::ctrl_c());
        let mut listening = true;

        info!(events, slots = self.scheduler.slot_count(), "starting run");

        loop {
            while !summary.interrupted
                && fatal.is_none()
                && summary.pushed < events
                && self.scheduler.free_slots() > 0
            {
                match self
                    .scheduler
                    .push_new_event(EventContext::new(self.next_event))
                    .await
                {
                    Ok(ctx) => {
                        debug!(evt = ctx.evt(), slot = ctx.slot(), "event in flight");
                        self.next_event += 1;
                        summary.pushed += 1;
                        in_flight += 1;
                    }
                    Err(SchedulingError::NoFreeSlot) => break,
                    Err(err) => fatal = Some(err),
                }
            }

            if in_flight == 0 {
                break;
            }

            tokio::select! {
                popped = self.scheduler.pop_finished_event() => match popped {
                    Ok(event) => {
                        in_flight -= 1;
                        summary.finished += 1;
                        match event.status {
                            EventStatus::Success => {}
                            EventStatus::Failed => summary.failed += 1,
                            EventStatus::Stalled => summary.stalled += 1,
                        }
                    }
                    Err(err) => {
                        fatal.get_or_insert(err);
                        break;
                    }
                },
                signal = &mut ctrl_c, if listening => {
                    listening = false;
                    match signal {
                        Ok(()) => {
                            warn!(in_flight, "interrupted; draining events in flight");
                            summary.interrupted = true;
                        }
                        Err(err) => warn!(%err, "could not listen for Ctrl-C"),
                    }
                }
            }
        }

        summary.elapsed = start.elapsed();
        info!(
            pushed = summary.pushed,
            finished = summary.finished,
            failed = summary.failed,
            stalled = summary.stalled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );

        match fatal {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

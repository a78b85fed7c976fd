// src/engine/timeline.rs

//! Optional per-execution timeline, dumped as CSV after a run.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::exec::thread_pool::WorkerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub worker: WorkerId,
    pub slot: usize,
    pub evt: u64,
    pub algorithm: String,
    /// Offsets from the moment the timeline was created.
    pub start: Duration,
    pub end: Duration,
}

/// Append-only list of [`TimelineEvent`]s shared by all workers.
///
/// A disabled timeline drops everything it is given.
#[derive(Debug)]
pub struct Timeline {
    enabled: bool,
    origin: Instant,
    events: Mutex<Vec<TimelineEvent>>,
}

impl Timeline {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            origin: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(
        &self,
        worker: WorkerId,
        slot: usize,
        evt: u64,
        algorithm: &str,
        start: Instant,
        end: Instant,
    ) {
        if !self.enabled {
            return;
        }
        let event = TimelineEvent {
            worker,
            slot,
            evt,
            algorithm: algorithm.to_string(),
            start: start.saturating_duration_since(self.origin),
            end: end.saturating_duration_since(self.origin),
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Copy of everything recorded so far, ordered by start time.
    pub fn events(&self) -> Vec<TimelineEvent> {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        events.sort_by_key(|e| e.start);
        events
    }

    pub fn write_csv(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "#start_us,end_us,algorithm,worker,slot,event")?;
        for e in self.events() {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                e.start.as_micros(),
                e.end.as_micros(),
                e.algorithm,
                e.worker,
                e.slot,
                e.evt
            )?;
        }
        Ok(())
    }

    pub fn dump_csv(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        self.write_csv(&mut out)?;
        out.flush()?;
        info!(path = %path.display(), "timeline written");
        Ok(())
    }
}

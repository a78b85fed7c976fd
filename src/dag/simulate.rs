// src/dag/simulate.rs

//! Dry run of the graph for one event, assuming every algorithm accepts.
//!
//! Used at startup (`simulate_execution = true`) to catch graphs that can
//! never finish, e.g. an enabled algorithm whose input is only produced on a
//! branch that the control flow never takes.

use tracing::{debug, error};

use crate::dag::data_flow::DataFlowTracker;
use crate::dag::graph::FlowGraph;
use crate::dag::state::AlgoIndex;
use crate::errors::SchedulingError;

/// What a simulated event went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// Algorithms in the order they would run single-threaded.
    pub executed: Vec<AlgoIndex>,
    /// Algorithms pruned by the control flow.
    pub skipped: Vec<AlgoIndex>,
    /// Number of scan passes until nothing moved.
    pub passes: usize,
}

/// Walk the graph once for a single slot.
///
/// Returns `SchedulingError::Stall` (event 0, slot 0) naming the algorithms
/// that could neither run nor be pruned.
pub fn simulate(graph: &FlowGraph) -> Result<SimulationReport, SchedulingError> {
    let control_flow = graph.control_flow();
    let mut cf_state = control_flow.new_state();
    let mut data = DataFlowTracker::new(graph.data_flow(), 1);
    let mut done = vec![false; graph.len()];
    let mut executed = Vec::new();
    let mut passes = 0;

    loop {
        passes += 1;
        let mut progressed = false;

        for algo in 0..graph.len() {
            if done[algo]
                || !control_flow.is_control_ready(algo, &cf_state)
                || !data.is_data_ready(algo, 0)
            {
                continue;
            }
            data.mark_outputs(algo, 0);
            control_flow.resolve_algorithm(algo, true, &mut cf_state);
            done[algo] = true;
            executed.push(algo);
            progressed = true;
        }

        if !progressed {
            break;
        }
    }

    let skipped: Vec<AlgoIndex> = (0..graph.len())
        .filter(|algo| !done[*algo] && control_flow.is_skipped(*algo, &cf_state))
        .collect();

    if !control_flow.is_resolved(&cf_state) {
        let pending: Vec<String> = (0..graph.len())
            .filter(|algo| !done[*algo] && !skipped.contains(algo))
            .map(|algo| graph.name_of(algo).to_string())
            .collect();
        error!(?pending, "simulated event cannot complete");
        return Err(SchedulingError::Stall {
            event: 0,
            slot: 0,
            pending,
        });
    }

    debug!(
        executed = executed.len(),
        skipped = skipped.len(),
        passes,
        "simulation finished"
    );

    Ok(SimulationReport {
        executed,
        skipped,
        passes,
    })
}

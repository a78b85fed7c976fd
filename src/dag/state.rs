// src/dag/state.rs

//! Per-(slot, algorithm) execution state machine.

use std::fmt;

use crate::errors::InvalidTransition;

/// Index of an algorithm in the flow graph (declaration order).
pub type AlgoIndex = usize;

/// Execution state of one algorithm for the event in one slot.
///
/// The normal path is
/// `Initial -> ControlReady -> DataReady -> Scheduled -> Executed -> {EvtAccepted, EvtRejected}`;
/// `Error` can be entered from any non-terminal state and is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Initial,
    ControlReady,
    DataReady,
    Scheduled,
    Executed,
    EvtAccepted,
    EvtRejected,
    Error,
}

impl ExecutionState {
    pub const ALL: [ExecutionState; 8] = [
        ExecutionState::Initial,
        ExecutionState::ControlReady,
        ExecutionState::DataReady,
        ExecutionState::Scheduled,
        ExecutionState::Executed,
        ExecutionState::EvtAccepted,
        ExecutionState::EvtRejected,
        ExecutionState::Error,
    ];

    /// `EvtAccepted`, `EvtRejected` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::EvtAccepted | ExecutionState::EvtRejected | ExecutionState::Error
        )
    }

    /// States the scanner may still promote.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            ExecutionState::Initial | ExecutionState::ControlReady | ExecutionState::DataReady
        )
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;

        match (self, next) {
            (from, Error) => !from.is_terminal(),
            (Initial, ControlReady)
            | (ControlReady, DataReady)
            | (DataReady, Scheduled)
            | (Scheduled, Executed)
            | (Executed, EvtAccepted)
            | (Executed, EvtRejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Initial => "INITIAL",
            ExecutionState::ControlReady => "CONTROLREADY",
            ExecutionState::DataReady => "DATAREADY",
            ExecutionState::Scheduled => "SCHEDULED",
            ExecutionState::Executed => "EXECUTED",
            ExecutionState::EvtAccepted => "EVTACCEPTED",
            ExecutionState::EvtRejected => "EVTREJECTED",
            ExecutionState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Execution states for every algorithm in every slot.
///
/// Rows are slots, columns are algorithms. Only the controller mutates it.
#[derive(Debug, Clone)]
pub struct ExecutionStateTable {
    algorithms: usize,
    rows: Vec<Vec<ExecutionState>>,
}

impl ExecutionStateTable {
    pub fn new(slots: usize, algorithms: usize) -> Self {
        Self {
            algorithms,
            rows: vec![vec![ExecutionState::Initial; algorithms]; slots],
        }
    }

    pub fn slots(&self) -> usize {
        self.rows.len()
    }

    pub fn algorithms(&self) -> usize {
        self.algorithms
    }

    /// Panics if `slot` or `algo` is out of range; both come from the
    /// scheduler's own fixed-size tables.
    pub fn get(&self, algo: AlgoIndex, slot: usize) -> ExecutionState {
        self.rows[slot][algo]
    }

    pub fn set(
        &mut self,
        algo: AlgoIndex,
        slot: usize,
        next: ExecutionState,
    ) -> Result<(), InvalidTransition> {
        let current = &mut self.rows[slot][algo];
        if !current.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *current,
                to: next,
            });
        }
        *current = next;
        Ok(())
    }

    /// Put every algorithm of `slot` back to `Initial` for a fresh event.
    pub fn reset_slot(&mut self, slot: usize) {
        self.rows[slot].fill(ExecutionState::Initial);
    }

    /// Algorithms of `slot` currently in `state`.
    pub fn algorithms_in(&self, slot: usize, state: ExecutionState) -> Vec<AlgoIndex> {
        self.rows[slot]
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == state)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of algorithms in `state` summed over all slots.
    pub fn count_all(&self, state: ExecutionState) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|s| **s == state).count())
            .sum()
    }
}

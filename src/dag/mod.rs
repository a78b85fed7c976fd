// src/dag/mod.rs

//! The static graph and the per-slot bookkeeping built on top of it.
//!
//! - [`graph`] holds the immutable [`FlowGraph`] built once at setup.
//! - [`state`] is the per-(slot, algorithm) execution state machine.
//! - [`control_flow`] resolves which algorithms are enabled by decisions.
//! - [`data_flow`] tracks which products are available in which slot.
//! - [`ranking`] orders ready algorithms competing for the in-flight cap.
//! - [`simulate`] does a dry single-event pass at startup.

pub mod control_flow;
pub mod data_flow;
pub mod graph;
pub mod ranking;
pub mod simulate;
pub mod state;

pub use control_flow::{ControlFlowGraph, ControlFlowState, DecisionSpec};
pub use data_flow::{DataFlowGraph, DataFlowTracker, ProductIndex};
pub use graph::{AlgorithmNode, AlgorithmSpec, FlowGraph};
pub use ranking::{Ranker, Ranking, TimingStats};
pub use simulate::{SimulationReport, simulate};
pub use state::{AlgoIndex, ExecutionState, ExecutionStateTable};

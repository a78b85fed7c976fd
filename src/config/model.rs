// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{ClonePolicy, DecisionMode, OptimizationMode};

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// max_events_in_flight = 4
/// max_algos_in_flight = 8
/// threads = 4
///
/// [algorithm.Reco]
/// inputs = ["Raw"]
/// outputs = ["Tracks"]
///
/// [decision.Top]
/// mode = "and"
/// prompt = true
/// children = ["Reco"]
/// ```
///
/// All sections are optional at the syntax level; [`ConfigFile`] is the
/// validated form the rest of the crate consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Scheduler tuning from `[scheduler]`.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// All algorithms from `[algorithm.<name>]`.
    #[serde(default)]
    pub algorithm: BTreeMap<String, AlgorithmConfig>,

    /// All control-flow decision nodes from `[decision.<name>]`.
    #[serde(default)]
    pub decision: BTreeMap<String, DecisionConfig>,
}

/// A [`RawConfigFile`] that passed validation.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub algorithm: BTreeMap<String, AlgorithmConfig>,
    pub decision: BTreeMap<String, DecisionConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerSection,
        algorithm: BTreeMap<String, AlgorithmConfig>,
        decision: BTreeMap<String, DecisionConfig>,
    ) -> Self {
        Self {
            scheduler,
            algorithm,
            decision,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Number of event slots, i.e. events processed at the same time.
    #[serde(default = "default_max_events_in_flight")]
    pub max_events_in_flight: usize,

    /// Upper bound on algorithms in SCHEDULED state across all slots.
    #[serde(default = "default_max_algos_in_flight")]
    pub max_algos_in_flight: usize,

    /// Worker threads executing algorithm bodies.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Ranking used when ready algorithms compete for the in-flight cap.
    #[serde(default)]
    pub optimization_mode: OptimizationMode,

    /// Capacity of the bounded action queue feeding the controller.
    #[serde(default = "default_action_queue_capacity")]
    pub action_queue_capacity: usize,

    /// Walk the graph once at startup and refuse to run if it cannot finish.
    #[serde(default)]
    pub simulate_execution: bool,

    /// Record one timeline entry per algorithm execution.
    #[serde(default)]
    pub record_timeline: bool,

    /// Where the timeline CSV is written at the end of a run.
    #[serde(default = "default_timeline_file")]
    pub timeline_file: String,

    /// Name of the decision node at the top of the control flow.
    ///
    /// If `None`, an implicit concurrent AND adopts every parentless node.
    #[serde(default)]
    pub root: Option<String>,
}

fn default_max_events_in_flight() -> usize {
    1
}

fn default_max_algos_in_flight() -> usize {
    8
}

fn default_threads() -> usize {
    4
}

fn default_action_queue_capacity() -> usize {
    1024
}

fn default_timeline_file() -> String {
    "timeline.csv".to_string()
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_events_in_flight: default_max_events_in_flight(),
            max_algos_in_flight: default_max_algos_in_flight(),
            threads: default_threads(),
            optimization_mode: OptimizationMode::default(),
            action_queue_capacity: default_action_queue_capacity(),
            simulate_execution: false,
            record_timeline: false,
            timeline_file: default_timeline_file(),
            root: None,
        }
    }
}

/// `[algorithm.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmConfig {
    /// Products that must be available before the algorithm may run.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Products the algorithm makes available when it succeeds.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Private clones or one shared reentrant instance.
    #[serde(default)]
    pub policy: ClonePolicy,

    /// Number of clones when `policy = "clone"`; defaults to 1.
    #[serde(default)]
    pub instances: Option<usize>,

    /// Simulated work time of the built-in cruncher.
    #[serde(default)]
    pub runtime_ms: u64,

    /// Fail on events whose number is a multiple of this (0 disables).
    #[serde(default)]
    pub fail_every: u64,

    /// Reject (filter out) events whose number is a multiple of this
    /// (0 disables).
    #[serde(default)]
    pub reject_every: u64,
}

impl AlgorithmConfig {
    /// Effective clone count for the resource pool.
    pub fn effective_instances(&self) -> usize {
        match self.policy {
            ClonePolicy::Clone => self.instances.unwrap_or(1),
            ClonePolicy::Shared => 1,
        }
    }
}

/// `[decision.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    /// `"and"`, `"or"` or `"not"`.
    #[serde(default)]
    pub mode: DecisionMode,

    /// Decide as soon as the result cannot change any more.
    #[serde(default)]
    pub prompt: bool,

    /// Enable children one at a time, in list order.
    #[serde(default)]
    pub sequential: bool,

    /// Algorithm or decision names, in order.
    #[serde(default)]
    pub children: Vec<String>,
}

// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::graph::DiGraph;

use crate::config::model::ConfigFile;
use crate::dag::control_flow::{ControlFlowGraph, DecisionSpec};
use crate::dag::data_flow::DataFlowGraph;
use crate::dag::state::AlgoIndex;
use crate::types::ClonePolicy;

/// Setup-time description of one algorithm.
#[derive(Debug, Clone)]
pub struct AlgorithmSpec {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub policy: ClonePolicy,
    pub instances: usize,
}

/// Static identity of an algorithm inside the graph.
#[derive(Debug, Clone)]
pub struct AlgorithmNode {
    pub index: AlgoIndex,
    pub name: String,
    pub policy: ClonePolicy,
    pub instances: usize,
}

/// The immutable graph the scheduler works on: algorithms, their data
/// dependencies and the control flow above them.
///
/// Built once at setup from a validated [`ConfigFile`]; everything is
/// addressed by index afterwards.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    algorithms: Vec<AlgorithmNode>,
    by_name: HashMap<String, AlgoIndex>,
    data_flow: DataFlowGraph,
    control_flow: ControlFlowGraph,
}

impl FlowGraph {
    /// Build the graph from a validated [`ConfigFile`].
    ///
    /// Algorithm indices follow the (sorted) order of `[algorithm.<name>]`
    /// sections.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let specs: Vec<AlgorithmSpec> = cfg
            .algorithm
            .iter()
            .map(|(name, algo)| AlgorithmSpec {
                name: name.clone(),
                inputs: algo.inputs.clone(),
                outputs: algo.outputs.clone(),
                policy: algo.policy,
                instances: algo.effective_instances(),
            })
            .collect();

        let decisions: Vec<DecisionSpec> = cfg
            .decision
            .iter()
            .map(|(name, d)| DecisionSpec {
                name: name.clone(),
                mode: d.mode,
                prompt: d.prompt,
                sequential: d.sequential,
                children: d.children.clone(),
            })
            .collect();

        Self::new(specs, decisions, cfg.scheduler.root.as_deref())
    }

    /// Build the graph from already-checked specs.
    pub fn new(specs: Vec<AlgorithmSpec>, decisions: Vec<DecisionSpec>, root: Option<&str>) -> Self {
        let data_flow = DataFlowGraph::new(&specs);

        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let control_flow = ControlFlowGraph::new(&names, &decisions, root);

        let algorithms: Vec<AlgorithmNode> = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| AlgorithmNode {
                index,
                name: spec.name,
                policy: spec.policy,
                instances: spec.instances,
            })
            .collect();

        let by_name = algorithms
            .iter()
            .map(|a| (a.name.clone(), a.index))
            .collect();

        Self {
            algorithms,
            by_name,
            data_flow,
            control_flow,
        }
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    pub fn algorithms(&self) -> &[AlgorithmNode] {
        &self.algorithms
    }

    pub fn algorithm(&self, index: AlgoIndex) -> &AlgorithmNode {
        &self.algorithms[index]
    }

    pub fn index_of(&self, name: &str) -> Option<AlgoIndex> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, index: AlgoIndex) -> &str {
        &self.algorithms[index].name
    }

    pub fn data_flow(&self) -> &DataFlowGraph {
        &self.data_flow
    }

    pub fn control_flow(&self) -> &ControlFlowGraph {
        &self.control_flow
    }

    /// Producer -> consumer graph over algorithms.
    ///
    /// Node `i` of the returned graph carries algorithm index `i`.
    pub fn dependency_graph(&self) -> DiGraph<AlgoIndex, ()> {
        let mut graph = DiGraph::with_capacity(self.algorithms.len(), 0);
        let nodes: Vec<_> = self
            .algorithms
            .iter()
            .map(|a| graph.add_node(a.index))
            .collect();

        for algo in self.algorithms.iter() {
            for consumer in self.data_flow.direct_consumers(algo.index) {
                graph.add_edge(nodes[algo.index], nodes[consumer], ());
            }
        }

        graph
    }
}

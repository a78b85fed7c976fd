// src/dag/control_flow.rs

//! Control flow: a DAG of boolean decision nodes over algorithm nodes.
//!
//! Nodes live in one flat vector and refer to each other by index. Node `i`
//! for `i < algorithms` is the algorithm with index `i`; decision nodes
//! follow, and the implicit root (if any) comes last.
//!
//! Per-slot state is only the decision cache ([`ControlFlowState`]). When an
//! algorithm resolves, only the decision nodes above it are re-evaluated, and
//! a decision node only passes the change upwards if its own value changed.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::dag::state::AlgoIndex;
use crate::types::DecisionMode;

pub type NodeIndex = usize;

/// Name given to the implicit root decision.
pub const IMPLICIT_ROOT: &str = "<root>";

/// Setup-time description of a decision node; children are node names.
#[derive(Debug, Clone)]
pub struct DecisionSpec {
    pub name: String,
    pub mode: DecisionMode,
    pub prompt: bool,
    pub sequential: bool,
    pub children: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DecisionNode {
    pub mode: DecisionMode,
    /// Decide as soon as the outcome is final.
    pub prompt: bool,
    /// Children get their turn one after the other.
    pub sequential: bool,
    pub children: Vec<NodeIndex>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Algorithm(AlgoIndex),
    Decision(DecisionNode),
}

#[derive(Debug, Clone)]
pub struct ControlFlowNode {
    pub name: String,
    pub kind: NodeKind,
    pub parents: Vec<NodeIndex>,
}

/// Decision cache of one slot: `None` is undecided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowState {
    decisions: Vec<Option<bool>>,
}

impl ControlFlowState {
    pub fn decision(&self, node: NodeIndex) -> Option<bool> {
        self.decisions[node]
    }

    /// Forget every decision; used when the slot gets a new event.
    pub fn reset(&mut self) {
        self.decisions.fill(None);
    }
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    nodes: Vec<ControlFlowNode>,
    algorithms: usize,
    root: NodeIndex,
}

impl ControlFlowGraph {
    /// Build the arena.
    ///
    /// With `root = None`, a concurrent non-prompt AND named
    /// [`IMPLICIT_ROOT`] adopts every node that has no parent.
    pub fn new(algorithms: &[String], decisions: &[DecisionSpec], root: Option<&str>) -> Self {
        let mut nodes: Vec<ControlFlowNode> = algorithms
            .iter()
            .enumerate()
            .map(|(i, name)| ControlFlowNode {
                name: name.clone(),
                kind: NodeKind::Algorithm(i),
                parents: Vec::new(),
            })
            .collect();

        let mut index: HashMap<String, NodeIndex> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();

        for spec in decisions.iter() {
            index.insert(spec.name.clone(), nodes.len());
            nodes.push(ControlFlowNode {
                name: spec.name.clone(),
                kind: NodeKind::Decision(DecisionNode {
                    mode: spec.mode,
                    prompt: spec.prompt,
                    sequential: spec.sequential,
                    children: Vec::new(),
                }),
                parents: Vec::new(),
            });
        }

        // Second pass: wire children and parents by index.
        for spec in decisions.iter() {
            let parent = index[&spec.name];
            for child_name in spec.children.iter() {
                let Some(&child) = index.get(child_name) else {
                    warn!(decision = %spec.name, child = %child_name, "unknown control-flow child; ignoring");
                    continue;
                };
                if let NodeKind::Decision(d) = &mut nodes[parent].kind {
                    d.children.push(child);
                }
                nodes[child].parents.push(parent);
            }
        }

        let root = match root.and_then(|name| index.get(name).copied()) {
            Some(root) => root,
            None => {
                let root = nodes.len();
                let orphans: Vec<NodeIndex> = (0..nodes.len())
                    .filter(|i| nodes[*i].parents.is_empty())
                    .collect();
                for orphan in orphans.iter() {
                    nodes[*orphan].parents.push(root);
                }
                nodes.push(ControlFlowNode {
                    name: IMPLICIT_ROOT.to_string(),
                    kind: NodeKind::Decision(DecisionNode {
                        mode: DecisionMode::And,
                        prompt: false,
                        sequential: false,
                        children: orphans,
                    }),
                    parents: Vec::new(),
                });
                root
            }
        };

        Self {
            nodes,
            algorithms: algorithms.len(),
            root,
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn nodes(&self) -> &[ControlFlowNode] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> &ControlFlowNode {
        &self.nodes[index]
    }

    /// Node index of an algorithm.
    pub fn algorithm_node(&self, algo: AlgoIndex) -> NodeIndex {
        debug_assert!(algo < self.algorithms);
        algo
    }

    pub fn new_state(&self) -> ControlFlowState {
        ControlFlowState {
            decisions: vec![None; self.nodes.len()],
        }
    }

    /// Record the outcome of an algorithm and re-evaluate the decisions above
    /// it.
    ///
    /// Returns the decision nodes that became decided, bottom-up.
    pub fn resolve_algorithm(
        &self,
        algo: AlgoIndex,
        passed: bool,
        state: &mut ControlFlowState,
    ) -> Vec<NodeIndex> {
        let node = self.algorithm_node(algo);
        if state.decisions[node].is_some() {
            return Vec::new();
        }
        state.decisions[node] = Some(passed);

        let mut decided = Vec::new();
        let mut dirty: Vec<NodeIndex> = self.nodes[node].parents.clone();

        while let Some(current) = dirty.pop() {
            if state.decisions[current].is_some() {
                continue;
            }
            let NodeKind::Decision(decision) = &self.nodes[current].kind else {
                continue;
            };
            if let Some(value) = evaluate(decision, state) {
                trace!(node = %self.nodes[current].name, value, "decision resolved");
                state.decisions[current] = Some(value);
                decided.push(current);
                dirty.extend(self.nodes[current].parents.iter().copied());
            }
        }

        decided
    }

    /// True iff the algorithm's branch is currently enabled.
    pub fn is_control_ready(&self, algo: AlgoIndex, state: &ControlFlowState) -> bool {
        let node = self.algorithm_node(algo);
        state.decisions[node].is_none() && self.is_enabled(node, state)
    }

    /// True iff the algorithm has not run and no undecided ancestor can
    /// enable it any more.
    pub fn is_skipped(&self, algo: AlgoIndex, state: &ControlFlowState) -> bool {
        let node = self.algorithm_node(algo);
        state.decisions[node].is_none() && !self.is_reachable(node, state)
    }

    /// True once the root decision is known.
    pub fn is_resolved(&self, state: &ControlFlowState) -> bool {
        state.decisions[self.root].is_some()
    }

    fn is_enabled(&self, node: NodeIndex, state: &ControlFlowState) -> bool {
        if node == self.root {
            return state.decisions[node].is_none();
        }
        self.nodes[node].parents.iter().any(|&parent| {
            state.decisions[parent].is_none()
                && self.has_turn(parent, node, state)
                && self.is_enabled(parent, state)
        })
    }

    fn is_reachable(&self, node: NodeIndex, state: &ControlFlowState) -> bool {
        if node == self.root {
            return state.decisions[node].is_none();
        }
        self.nodes[node]
            .parents
            .iter()
            .any(|&parent| state.decisions[parent].is_none() && self.is_reachable(parent, state))
    }

    fn has_turn(&self, parent: NodeIndex, child: NodeIndex, state: &ControlFlowState) -> bool {
        let NodeKind::Decision(decision) = &self.nodes[parent].kind else {
            return false;
        };
        if !decision.sequential {
            return true;
        }
        decision
            .children
            .iter()
            .take_while(|&&c| c != child)
            .all(|&c| state.decisions[c].is_some())
    }
}

/// Value of a decision node given its children, if already final.
fn evaluate(decision: &DecisionNode, state: &ControlFlowState) -> Option<bool> {
    let values = decision.children.iter().map(|c| state.decisions[*c]);

    match decision.mode {
        DecisionMode::And => combine(values, false, decision.prompt),
        DecisionMode::Or => combine(values, true, decision.prompt),
        DecisionMode::Not => decision
            .children
            .first()
            .and_then(|c| state.decisions[*c])
            .map(|v| !v),
    }
}

/// Shared AND/OR logic: `dominant` is the child value that fixes the result
/// (false for AND, true for OR).
fn combine(
    values: impl Iterator<Item = Option<bool>>,
    dominant: bool,
    prompt: bool,
) -> Option<bool> {
    let mut all_decided = true;
    let mut seen_dominant = false;

    for value in values {
        match value {
            Some(v) if v == dominant => {
                if prompt {
                    return Some(dominant);
                }
                seen_dominant = true;
            }
            Some(_) => {}
            None => all_decided = false,
        }
    }

    all_decided.then_some(if seen_dominant { dominant } else { !dominant })
}

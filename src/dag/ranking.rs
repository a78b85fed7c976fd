// src/dag/ranking.rs

//! Ranking of data-ready algorithms competing for the in-flight cap.
//!
//! Every strategy answers the same question through [`Ranker::visit`]: how
//! urgent is it to run this algorithm? Higher scores are dispatched first.
//! Ties keep scan order.

use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::visit::Dfs;
use tracing::warn;

use crate::dag::graph::FlowGraph;
use crate::dag::state::AlgoIndex;
use crate::types::OptimizationMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranker {
    /// Everything scores the same; dispatch in scan order.
    Declaration,
    /// Number of algorithms directly consuming one of the outputs.
    ProductConsumption,
    /// Number of algorithms transitively downstream in the data flow.
    BranchPotential,
    /// Length of the longest data-flow path starting at the algorithm.
    Eccentricity,
    /// Mean observed runtime; slow algorithms start first.
    Timing,
}

impl From<OptimizationMode> for Ranker {
    fn from(mode: OptimizationMode) -> Self {
        match mode {
            OptimizationMode::None => Ranker::Declaration,
            OptimizationMode::ProductConsumption => Ranker::ProductConsumption,
            OptimizationMode::BranchPotential => Ranker::BranchPotential,
            OptimizationMode::Eccentricity => Ranker::Eccentricity,
            OptimizationMode::Timing => Ranker::Timing,
        }
    }
}

impl Ranker {
    /// Score one algorithm.
    pub fn visit(&self, algo: AlgoIndex, graph: &FlowGraph, timings: &TimingStats) -> f64 {
        match self {
            Ranker::Declaration => 0.0,
            Ranker::ProductConsumption => graph.data_flow().direct_consumers(algo).len() as f64,
            Ranker::BranchPotential => {
                let deps = graph.dependency_graph();
                let mut dfs = Dfs::new(&deps, NodeIndex::new(algo));
                let mut reached = 0usize;
                while dfs.next(&deps).is_some() {
                    reached += 1;
                }
                // The start node itself is not downstream.
                reached.saturating_sub(1) as f64
            }
            Ranker::Eccentricity => longest_paths(graph)[algo] as f64,
            Ranker::Timing => timings
                .mean(algo)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    /// Whether the score only depends on the graph.
    pub fn is_static(&self) -> bool {
        !matches!(self, Ranker::Timing)
    }
}

/// Length (in edges) of the longest downstream path of every algorithm.
fn longest_paths(graph: &FlowGraph) -> Vec<usize> {
    let deps = graph.dependency_graph();
    let mut longest = vec![0usize; graph.len()];

    let order = match toposort(&deps, None) {
        Ok(order) => order,
        Err(cycle) => {
            // Validated configs never get here.
            warn!(node = cycle.node_id().index(), "data-flow cycle while ranking; using flat scores");
            return longest;
        }
    };

    for node in order.into_iter().rev() {
        let best = deps
            .neighbors(node)
            .map(|n| longest[deps[n]] + 1)
            .max()
            .unwrap_or(0);
        longest[deps[node]] = best;
    }

    longest
}

/// Running per-algorithm execution time.
#[derive(Debug, Clone, Default)]
pub struct TimingStats {
    total: Vec<Duration>,
    count: Vec<u32>,
}

impl TimingStats {
    pub fn new(algorithms: usize) -> Self {
        Self {
            total: vec![Duration::ZERO; algorithms],
            count: vec![0; algorithms],
        }
    }

    pub fn record(&mut self, algo: AlgoIndex, elapsed: Duration) {
        self.total[algo] += elapsed;
        self.count[algo] += 1;
    }

    pub fn mean(&self, algo: AlgoIndex) -> Option<Duration> {
        match self.count[algo] {
            0 => None,
            n => Some(self.total[algo] / n),
        }
    }
}

/// A ranker together with the static scores it produced for one graph.
#[derive(Debug, Clone)]
pub struct Ranking {
    ranker: Ranker,
    scores: Vec<f64>,
}

impl Ranking {
    pub fn new(ranker: Ranker, graph: &FlowGraph) -> Self {
        let empty = TimingStats::new(graph.len());
        let scores = match ranker {
            Ranker::Eccentricity => longest_paths(graph).into_iter().map(|l| l as f64).collect(),
            _ => (0..graph.len())
                .map(|algo| ranker.visit(algo, graph, &empty))
                .collect(),
        };
        Self { ranker, scores }
    }

    pub fn ranker(&self) -> Ranker {
        self.ranker
    }

    pub fn score(&self, algo: AlgoIndex, timings: &TimingStats) -> f64 {
        if self.ranker.is_static() {
            self.scores[algo]
        } else {
            timings.mean(algo).map(|d| d.as_secs_f64()).unwrap_or(0.0)
        }
    }

    /// Stable sort of `(slot, algo)` candidates, best first.
    pub fn sort(&self, candidates: &mut [(usize, AlgoIndex)], timings: &TimingStats) {
        if self.ranker == Ranker::Declaration {
            return;
        }
        candidates.sort_by(|a, b| {
            self.score(b.1, timings)
                .total_cmp(&self.score(a.1, timings))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::graph::AlgorithmSpec;
    use crate::types::ClonePolicy;

    fn spec(name: &str, inputs: &[&str], outputs: &[&str]) -> AlgorithmSpec {
        AlgorithmSpec {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            policy: ClonePolicy::Clone,
            instances: 1,
        }
    }

    /// A -> B -> C, A -> D, and a lonely E.
    fn graph() -> FlowGraph {
        FlowGraph::new(
            vec![
                spec("A", &[], &["a"]),
                spec("B", &["a"], &["b"]),
                spec("C", &["b"], &[]),
                spec("D", &["a"], &[]),
                spec("E", &[], &[]),
            ],
            vec![],
            None,
        )
    }

    #[test]
    fn product_consumption_counts_direct_readers() {
        let g = graph();
        let ranking = Ranking::new(Ranker::ProductConsumption, &g);
        let t = TimingStats::new(g.len());
        assert_eq!(ranking.score(0, &t), 2.0);
        assert_eq!(ranking.score(1, &t), 1.0);
        assert_eq!(ranking.score(4, &t), 0.0);
    }

    #[test]
    fn branch_potential_counts_everything_downstream() {
        let g = graph();
        let ranking = Ranking::new(Ranker::BranchPotential, &g);
        let t = TimingStats::new(g.len());
        assert_eq!(ranking.score(0, &t), 3.0);
        assert_eq!(ranking.score(1, &t), 1.0);
        assert_eq!(ranking.score(2, &t), 0.0);
    }

    #[test]
    fn eccentricity_is_longest_chain() {
        let g = graph();
        let ranking = Ranking::new(Ranker::Eccentricity, &g);
        let t = TimingStats::new(g.len());
        assert_eq!(ranking.score(0, &t), 2.0);
        assert_eq!(ranking.score(3, &t), 0.0);
    }

    #[test]
    fn timing_prefers_slow_algorithms() {
        let g = graph();
        let ranking = Ranking::new(Ranker::Timing, &g);
        let mut t = TimingStats::new(g.len());
        t.record(4, Duration::from_millis(30));
        t.record(4, Duration::from_millis(10));
        t.record(2, Duration::from_millis(5));

        assert_eq!(t.mean(4), Some(Duration::from_millis(20)));

        let mut candidates = vec![(0, 2), (0, 3), (0, 4)];
        ranking.sort(&mut candidates, &t);
        assert_eq!(candidates, vec![(0, 4), (0, 2), (0, 3)]);
    }

    #[test]
    fn declaration_order_keeps_scan_order() {
        let g = graph();
        let ranking = Ranking::new(Ranker::Declaration, &g);
        let mut candidates = vec![(1, 4), (0, 0), (0, 3)];
        ranking.sort(&mut candidates, &TimingStats::new(g.len()));
        assert_eq!(candidates, vec![(1, 4), (0, 0), (0, 3)]);
    }

    #[test]
    fn sort_puts_unlocking_algorithms_first() {
        let g = graph();
        let ranking = Ranking::new(Ranker::BranchPotential, &g);
        let mut candidates = vec![(0, 4), (0, 3), (0, 0)];
        ranking.sort(&mut candidates, &TimingStats::new(g.len()));
        assert_eq!(candidates[0], (0, 0));
    }
}

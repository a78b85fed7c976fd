// src/dag/data_flow.rs

//! Data-flow bookkeeping: who produces and consumes which product, and per
//! slot which products are already available.

use std::collections::HashMap;

use crate::dag::graph::AlgorithmSpec;
use crate::dag::state::AlgoIndex;

pub type ProductIndex = usize;

/// Static product wiring between algorithms.
#[derive(Debug, Clone)]
pub struct DataFlowGraph {
    products: Vec<String>,
    by_name: HashMap<String, ProductIndex>,
    producer: Vec<Option<AlgoIndex>>,
    consumers: Vec<Vec<AlgoIndex>>,
    inputs: Vec<Vec<ProductIndex>>,
    outputs: Vec<Vec<ProductIndex>>,
}

impl DataFlowGraph {
    pub fn new(specs: &[AlgorithmSpec]) -> Self {
        let mut graph = Self {
            products: Vec::new(),
            by_name: HashMap::new(),
            producer: Vec::new(),
            consumers: Vec::new(),
            inputs: Vec::with_capacity(specs.len()),
            outputs: Vec::with_capacity(specs.len()),
        };

        for (algo, spec) in specs.iter().enumerate() {
            let outputs = spec
                .outputs
                .iter()
                .map(|p| {
                    let idx = graph.intern(p);
                    graph.producer[idx] = Some(algo);
                    idx
                })
                .collect();
            graph.outputs.push(outputs);
        }

        for (algo, spec) in specs.iter().enumerate() {
            let inputs = spec
                .inputs
                .iter()
                .map(|p| {
                    let idx = graph.intern(p);
                    graph.consumers[idx].push(algo);
                    idx
                })
                .collect();
            graph.inputs.push(inputs);
        }

        graph
    }

    fn intern(&mut self, product: &str) -> ProductIndex {
        if let Some(idx) = self.by_name.get(product) {
            return *idx;
        }
        let idx = self.products.len();
        self.products.push(product.to_string());
        self.by_name.insert(product.to_string(), idx);
        self.producer.push(None);
        self.consumers.push(Vec::new());
        idx
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn product_index(&self, name: &str) -> Option<ProductIndex> {
        self.by_name.get(name).copied()
    }

    pub fn product_name(&self, product: ProductIndex) -> &str {
        &self.products[product]
    }

    pub fn inputs_of(&self, algo: AlgoIndex) -> &[ProductIndex] {
        &self.inputs[algo]
    }

    pub fn outputs_of(&self, algo: AlgoIndex) -> &[ProductIndex] {
        &self.outputs[algo]
    }

    pub fn producer_of(&self, product: ProductIndex) -> Option<AlgoIndex> {
        self.producer[product]
    }

    pub fn consumers_of(&self, product: ProductIndex) -> &[AlgoIndex] {
        &self.consumers[product]
    }

    /// Algorithms reading at least one output of `algo`, each listed once.
    pub fn direct_consumers(&self, algo: AlgoIndex) -> Vec<AlgoIndex> {
        let mut out: Vec<AlgoIndex> = self.outputs[algo]
            .iter()
            .flat_map(|p| self.consumers[*p].iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Per-slot product availability.
///
/// Availability only grows while an event occupies the slot; it is wiped in
/// one go when the slot is recycled.
#[derive(Debug, Clone)]
pub struct DataFlowTracker {
    inputs: Vec<Vec<ProductIndex>>,
    outputs: Vec<Vec<ProductIndex>>,
    available: Vec<Vec<bool>>,
}

impl DataFlowTracker {
    pub fn new(graph: &DataFlowGraph, slots: usize) -> Self {
        Self {
            inputs: graph.inputs.clone(),
            outputs: graph.outputs.clone(),
            available: vec![vec![false; graph.product_count()]; slots],
        }
    }

    pub fn mark_available(&mut self, product: ProductIndex, slot: usize) {
        self.available[slot][product] = true;
    }

    /// Mark every declared output of `algo` as available in `slot`.
    pub fn mark_outputs(&mut self, algo: AlgoIndex, slot: usize) {
        for product in self.outputs[algo].iter() {
            self.available[slot][*product] = true;
        }
    }

    pub fn is_available(&self, product: ProductIndex, slot: usize) -> bool {
        self.available[slot][product]
    }

    pub fn is_data_ready(&self, algo: AlgoIndex, slot: usize) -> bool {
        self.inputs[algo]
            .iter()
            .all(|product| self.available[slot][*product])
    }

    /// Inputs of `algo` not yet available in `slot`.
    pub fn missing_inputs(&self, algo: AlgoIndex, slot: usize) -> Vec<ProductIndex> {
        self.inputs[algo]
            .iter()
            .copied()
            .filter(|product| !self.available[slot][*product])
            .collect()
    }

    pub fn reset_slot(&mut self, slot: usize) {
        self.available[slot].fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn chain() -> DataFlowGraph {
        DataFlowGraph::new(&[
            spec("A", &[], &["a"]),
            spec("B", &["a"], &["b"]),
            spec("C", &["a", "b"], &[]),
        ])
    }

    #[test]
    fn wires_producers_and_consumers() {
        let graph = chain();
        let a = graph.product_index("a").unwrap();

        assert_eq!(graph.producer_of(a), Some(0));
        assert_eq!(graph.consumers_of(a), &[1, 2]);
        assert_eq!(graph.direct_consumers(0), vec![1, 2]);
        assert_eq!(graph.direct_consumers(2), Vec::<AlgoIndex>::new());
    }

    #[test]
    fn readiness_follows_declared_inputs() {
        let graph = chain();
        let mut tracker = DataFlowTracker::new(&graph, 2);

        assert!(tracker.is_data_ready(0, 0));
        assert!(!tracker.is_data_ready(1, 0));

        tracker.mark_outputs(0, 0);
        assert!(tracker.is_data_ready(1, 0));
        assert!(!tracker.is_data_ready(2, 0));
        assert_eq!(tracker.missing_inputs(2, 0), vec![graph.product_index("b").unwrap()]);

        // Other slot is untouched.
        assert!(!tracker.is_data_ready(1, 1));
    }

    #[test]
    fn availability_is_monotonic_until_reset() {
        let graph = chain();
        let mut tracker = DataFlowTracker::new(&graph, 1);
        let a = graph.product_index("a").unwrap();

        tracker.mark_available(a, 0);
        tracker.mark_outputs(1, 0);
        tracker.mark_available(a, 0);
        assert!(tracker.is_available(a, 0));
        assert!(tracker.is_data_ready(2, 0));

        tracker.reset_slot(0);
        assert!(!tracker.is_available(a, 0));
        assert!(!tracker.is_data_ready(2, 0));
    }
}

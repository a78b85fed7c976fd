// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{HiveError, Result};
use crate::types::DecisionMode;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HiveError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.scheduler,
            raw.algorithm,
            raw.decision,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_algorithms(cfg)?;
    validate_scheduler_section(cfg)?;
    validate_names(cfg)?;
    validate_decisions(cfg)?;
    validate_products(cfg)?;
    validate_data_flow(cfg)?;
    validate_control_flow(cfg)?;
    validate_root(cfg)?;
    Ok(())
}

fn ensure_has_algorithms(cfg: &RawConfigFile) -> Result<()> {
    if cfg.algorithm.is_empty() {
        return Err(HiveError::ConfigError(
            "config must contain at least one [algorithm.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler_section(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    let limits = [
        ("max_events_in_flight", s.max_events_in_flight),
        ("max_algos_in_flight", s.max_algos_in_flight),
        ("threads", s.threads),
        ("action_queue_capacity", s.action_queue_capacity),
    ];

    for (field, value) in limits {
        if value == 0 {
            return Err(HiveError::ConfigError(format!(
                "[scheduler].{field} must be >= 1 (got 0)"
            )));
        }
    }

    for (name, algo) in cfg.algorithm.iter() {
        if algo.instances == Some(0) {
            return Err(HiveError::ConfigError(format!(
                "algorithm '{name}' must have instances >= 1"
            )));
        }
    }

    Ok(())
}

fn validate_names(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.decision.keys() {
        if cfg.algorithm.contains_key(name) {
            return Err(HiveError::ConfigError(format!(
                "'{name}' is declared both as an algorithm and as a decision"
            )));
        }
    }
    Ok(())
}

fn validate_decisions(cfg: &RawConfigFile) -> Result<()> {
    for (name, decision) in cfg.decision.iter() {
        if decision.children.is_empty() {
            return Err(HiveError::ConfigError(format!(
                "decision '{name}' has no children"
            )));
        }

        if decision.mode == DecisionMode::Not && decision.children.len() != 1 {
            return Err(HiveError::ConfigError(format!(
                "decision '{name}' has mode \"not\" and must have exactly one child (got {})",
                decision.children.len()
            )));
        }

        let mut seen = HashSet::new();
        for child in decision.children.iter() {
            if !cfg.algorithm.contains_key(child) && !cfg.decision.contains_key(child) {
                return Err(HiveError::ConfigError(format!(
                    "decision '{name}' has unknown child '{child}'"
                )));
            }
            if !seen.insert(child.as_str()) {
                return Err(HiveError::ConfigError(format!(
                    "decision '{name}' lists child '{child}' more than once"
                )));
            }
        }
    }
    Ok(())
}

fn validate_products(cfg: &RawConfigFile) -> Result<()> {
    let mut producers: HashMap<&str, &str> = HashMap::new();

    for (name, algo) in cfg.algorithm.iter() {
        for product in algo.outputs.iter() {
            if let Some(other) = producers.insert(product.as_str(), name.as_str()) {
                return Err(HiveError::ConfigError(format!(
                    "product '{product}' is produced by both '{other}' and '{name}'"
                )));
            }
        }
    }

    for (name, algo) in cfg.algorithm.iter() {
        for product in algo.inputs.iter() {
            if !producers.contains_key(product.as_str()) {
                return Err(HiveError::ConfigError(format!(
                    "algorithm '{name}' reads product '{product}' that no algorithm produces"
                )));
            }
        }
    }

    Ok(())
}

fn validate_data_flow(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: producer -> consumer.
    let mut producers: HashMap<&str, &str> = HashMap::new();
    for (name, algo) in cfg.algorithm.iter() {
        for product in algo.outputs.iter() {
            producers.insert(product.as_str(), name.as_str());
        }
    }

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.algorithm.keys() {
        graph.add_node(name.as_str());
    }
    for (name, algo) in cfg.algorithm.iter() {
        for product in algo.inputs.iter() {
            if let Some(producer) = producers.get(product.as_str()) {
                graph.add_edge(producer, name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(HiveError::DagCycle(format!(
            "data-flow cycle involving algorithm '{}'",
            cycle.node_id()
        ))),
    }
}

fn validate_control_flow(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: decision -> child.
    let graph = control_flow_graph(cfg);

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(HiveError::DagCycle(format!(
            "control-flow cycle involving node '{}'",
            cycle.node_id()
        ))),
    }
}

fn validate_root(cfg: &RawConfigFile) -> Result<()> {
    let Some(root) = cfg.scheduler.root.as_deref() else {
        return Ok(());
    };

    if !cfg.decision.contains_key(root) {
        return Err(HiveError::ConfigError(format!(
            "[scheduler].root '{root}' is not a decision node"
        )));
    }

    let graph = control_flow_graph(cfg);
    let mut reachable = HashSet::new();
    let mut dfs = Dfs::new(&graph, root);
    while let Some(node) = dfs.next(&graph) {
        reachable.insert(node);
    }

    for name in cfg.algorithm.keys().chain(cfg.decision.keys()) {
        if !reachable.contains(name.as_str()) {
            return Err(HiveError::ConfigError(format!(
                "'{name}' is not reachable from control-flow root '{root}'"
            )));
        }
    }

    Ok(())
}

fn control_flow_graph(cfg: &RawConfigFile) -> DiGraphMap<&str, ()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.algorithm.keys().chain(cfg.decision.keys()) {
        graph.add_node(name.as_str());
    }
    for (name, decision) in cfg.decision.iter() {
        for child in decision.children.iter() {
            graph.add_edge(name.as_str(), child.as_str(), ());
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::model::{AlgorithmConfig, DecisionConfig, SchedulerSection};
    use crate::types::ClonePolicy;

    fn algo(inputs: &[&str], outputs: &[&str]) -> AlgorithmConfig {
        AlgorithmConfig {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            policy: ClonePolicy::Clone,
            instances: None,
            runtime_ms: 0,
            fail_every: 0,
            reject_every: 0,
        }
    }

    fn decision(mode: DecisionMode, children: &[&str]) -> DecisionConfig {
        DecisionConfig {
            mode,
            prompt: false,
            sequential: false,
            children: children.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn raw(
        algorithms: Vec<(&str, AlgorithmConfig)>,
        decisions: Vec<(&str, DecisionConfig)>,
    ) -> RawConfigFile {
        RawConfigFile {
            scheduler: SchedulerSection::default(),
            algorithm: algorithms
                .into_iter()
                .map(|(n, a)| (n.to_string(), a))
                .collect::<BTreeMap<_, _>>(),
            decision: decisions
                .into_iter()
                .map(|(n, d)| (n.to_string(), d))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn rejects_empty_config() {
        let err = ConfigFile::try_from(raw(vec![], vec![])).unwrap_err();
        assert!(matches!(err, HiveError::ConfigError(_)));
    }

    #[test]
    fn rejects_zero_slots() {
        let mut cfg = raw(vec![("A", algo(&[], &[]))], vec![]);
        cfg.scheduler.max_events_in_flight = 0;
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(err.to_string().contains("max_events_in_flight"));
    }

    #[test]
    fn rejects_unproduced_input() {
        let cfg = raw(vec![("A", algo(&["ghost"], &[]))], vec![]);
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn rejects_duplicate_producer() {
        let cfg = raw(
            vec![("A", algo(&[], &["x"])), ("B", algo(&[], &["x"]))],
            vec![],
        );
        assert!(ConfigFile::try_from(cfg).is_err());
    }

    #[test]
    fn rejects_data_flow_cycle() {
        let cfg = raw(
            vec![("A", algo(&["b"], &["a"])), ("B", algo(&["a"], &["b"]))],
            vec![],
        );
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(matches!(err, HiveError::DagCycle(_)));
    }

    #[test]
    fn rejects_control_flow_cycle() {
        let cfg = raw(
            vec![("A", algo(&[], &[]))],
            vec![
                ("X", decision(DecisionMode::And, &["Y", "A"])),
                ("Y", decision(DecisionMode::Or, &["X"])),
            ],
        );
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(matches!(err, HiveError::DagCycle(_)));
    }

    #[test]
    fn rejects_not_with_two_children() {
        let cfg = raw(
            vec![("A", algo(&[], &[])), ("B", algo(&[], &[]))],
            vec![("N", decision(DecisionMode::Not, &["A", "B"]))],
        );
        assert!(ConfigFile::try_from(cfg).is_err());
    }

    #[test]
    fn rejects_unreachable_node_under_explicit_root() {
        let mut cfg = raw(
            vec![("A", algo(&[], &[])), ("B", algo(&[], &[]))],
            vec![("Top", decision(DecisionMode::And, &["A"]))],
        );
        cfg.scheduler.root = Some("Top".to_string());
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(err.to_string().contains("'B'"));
    }

    #[test]
    fn accepts_valid_graph() {
        let mut cfg = raw(
            vec![("A", algo(&[], &["a"])), ("B", algo(&["a"], &[]))],
            vec![("Top", decision(DecisionMode::And, &["A", "B"]))],
        );
        cfg.scheduler.root = Some("Top".to_string());
        assert!(ConfigFile::try_from(cfg).is_ok());
    }
}

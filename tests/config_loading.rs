// tests/config_loading.rs

use std::error::Error;
use std::io::Write;

use hivesched::config::load_and_validate;
use hivesched::dag::{FlowGraph, simulate};
use hivesched::errors::HiveError;
use hivesched::types::{ClonePolicy, DecisionMode, OptimizationMode};
use hivesched_test_utils::builders::{
    AlgorithmConfigBuilder, ConfigFileBuilder, DecisionConfigBuilder,
};

type TestResult = Result<(), Box<dyn Error>>;

const HIVE_TOML: &str = r#"
[scheduler]
max_events_in_flight = 3
max_algos_in_flight = 6
threads = 2
optimization_mode = "eccentricity"
simulate_execution = true
root = "Reconstruction"

[algorithm.Input]
outputs = ["raw"]
policy = "shared"

[algorithm.Tracking]
inputs = ["raw"]
outputs = ["tracks"]
instances = 2
runtime_ms = 3

[algorithm.Vertexing]
inputs = ["tracks"]
outputs = ["vertices"]

[algorithm.Calo]
inputs = ["raw"]
outputs = ["clusters"]

[algorithm.Prescale]
reject_every = 2

[decision.Reconstruction]
mode = "and"
prompt = true
sequential = true
children = ["Input", "Prescale", "Physics"]

[decision.Physics]
mode = "and"
children = ["Tracking", "Vertexing", "Calo"]
"#;

#[test]
fn full_config_loads_and_simulates() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(HIVE_TOML.as_bytes())?;

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.scheduler.max_events_in_flight, 3);
    assert_eq!(cfg.scheduler.optimization_mode, OptimizationMode::Eccentricity);
    assert_eq!(cfg.scheduler.root.as_deref(), Some("Reconstruction"));
    assert_eq!(cfg.algorithm["Input"].policy, ClonePolicy::Shared);
    assert_eq!(cfg.algorithm["Tracking"].effective_instances(), 2);
    assert_eq!(cfg.decision["Physics"].mode, DecisionMode::And);
    assert!(cfg.decision["Reconstruction"].sequential);

    let graph = FlowGraph::from_config(&cfg);
    assert_eq!(graph.len(), 5);

    let report = simulate(&graph)?;
    assert_eq!(report.executed.len(), 5);
    assert!(report.skipped.is_empty());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("Hive.toml")).unwrap_err();
    assert!(matches!(err, HiveError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(b"[scheduler\nthreads = ")?;

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, HiveError::TomlError(_)));
    Ok(())
}

#[test]
fn builder_rejects_a_data_flow_cycle() {
    let err = ConfigFileBuilder::new()
        .with_algorithm("A", AlgorithmConfigBuilder::new().input("b").output("a").build())
        .with_algorithm("B", AlgorithmConfigBuilder::new().input("a").output("b").build())
        .try_build()
        .unwrap_err();

    assert!(err.to_string().to_lowercase().contains("cycle"), "got: {err}");
}

#[test]
fn builder_rejects_a_not_with_two_children() {
    let result = ConfigFileBuilder::new()
        .with_algorithm("A", AlgorithmConfigBuilder::new().build())
        .with_algorithm("B", AlgorithmConfigBuilder::new().build())
        .with_decision("Veto", DecisionConfigBuilder::not().child("A").child("B").build())
        .try_build();

    assert!(result.is_err());
}

#![allow(dead_code)]

use std::collections::BTreeMap;

use hivesched::config::{
    AlgorithmConfig, ConfigFile, DecisionConfig, RawConfigFile, SchedulerSection,
};
use hivesched::types::{ClonePolicy, DecisionMode, OptimizationMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                scheduler: SchedulerSection::default(),
                algorithm: BTreeMap::new(),
                decision: BTreeMap::new(),
            },
        }
    }

    pub fn slots(mut self, n: usize) -> Self {
        self.config.scheduler.max_events_in_flight = n;
        self
    }

    pub fn max_algos_in_flight(mut self, n: usize) -> Self {
        self.config.scheduler.max_algos_in_flight = n;
        self
    }

    pub fn threads(mut self, n: usize) -> Self {
        self.config.scheduler.threads = n;
        self
    }

    pub fn optimization_mode(mut self, mode: OptimizationMode) -> Self {
        self.config.scheduler.optimization_mode = mode;
        self
    }

    pub fn root(mut self, name: &str) -> Self {
        self.config.scheduler.root = Some(name.to_string());
        self
    }

    pub fn simulate(mut self) -> Self {
        self.config.scheduler.simulate_execution = true;
        self
    }

    pub fn with_algorithm(mut self, name: &str, alg: AlgorithmConfig) -> Self {
        self.config.algorithm.insert(name.to_string(), alg);
        self
    }

    pub fn with_decision(mut self, name: &str, decision: DecisionConfig) -> Self {
        self.config.decision.insert(name.to_string(), decision);
        self
    }

    /// The unvalidated form, for tests that expect validation to fail.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> anyhow::Result<ConfigFile> {
        Ok(ConfigFile::try_from(self.config)?)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `AlgorithmConfig`.
pub struct AlgorithmConfigBuilder {
    alg: AlgorithmConfig,
}

impl AlgorithmConfigBuilder {
    pub fn new() -> Self {
        Self {
            alg: AlgorithmConfig {
                inputs: vec![],
                outputs: vec![],
                policy: ClonePolicy::Clone,
                instances: None,
                runtime_ms: 0,
                fail_every: 0,
                reject_every: 0,
            },
        }
    }

    pub fn input(mut self, product: &str) -> Self {
        self.alg.inputs.push(product.to_string());
        self
    }

    pub fn output(mut self, product: &str) -> Self {
        self.alg.outputs.push(product.to_string());
        self
    }

    pub fn shared(mut self) -> Self {
        self.alg.policy = ClonePolicy::Shared;
        self
    }

    pub fn instances(mut self, n: usize) -> Self {
        self.alg.policy = ClonePolicy::Clone;
        self.alg.instances = Some(n);
        self
    }

    pub fn runtime_ms(mut self, ms: u64) -> Self {
        self.alg.runtime_ms = ms;
        self
    }

    pub fn fail_every(mut self, n: u64) -> Self {
        self.alg.fail_every = n;
        self
    }

    pub fn reject_every(mut self, n: u64) -> Self {
        self.alg.reject_every = n;
        self
    }

    pub fn build(self) -> AlgorithmConfig {
        self.alg
    }
}

impl Default for AlgorithmConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `DecisionConfig`.
pub struct DecisionConfigBuilder {
    decision: DecisionConfig,
}

impl DecisionConfigBuilder {
    pub fn new(mode: DecisionMode) -> Self {
        Self {
            decision: DecisionConfig {
                mode,
                prompt: false,
                sequential: false,
                children: vec![],
            },
        }
    }

    pub fn and() -> Self {
        Self::new(DecisionMode::And)
    }

    pub fn or() -> Self {
        Self::new(DecisionMode::Or)
    }

    pub fn not() -> Self {
        Self::new(DecisionMode::Not)
    }

    pub fn prompt(mut self) -> Self {
        self.decision.prompt = true;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.decision.sequential = true;
        self
    }

    pub fn child(mut self, name: &str) -> Self {
        self.decision.children.push(name.to_string());
        self
    }

    pub fn build(self) -> DecisionConfig {
        self.decision
    }
}

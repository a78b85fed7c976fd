// src/config/mod.rs

//! Configuration loading and validation for hivesched.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate field ranges and graph structure (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    AlgorithmConfig, ConfigFile, DecisionConfig, RawConfigFile, SchedulerSection,
};

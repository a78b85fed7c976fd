// src/exec/mod.rs

//! Execution layer.
//!
//! - [`algorithm`] defines the [`Algorithm`] contract and the configurable
//!   [`CpuCruncher`].
//! - [`pool`] lends algorithm instances out and takes them back.
//! - [`store`] holds the per-slot data stores.
//! - [`task`] is the unit of work submitted to the thread pool.
//! - [`thread_pool`] provides the worker threads and their one-time init.

pub mod algorithm;
pub mod pool;
pub mod store;
pub mod task;
pub mod thread_pool;

pub use algorithm::{Algorithm, CpuCruncher, Filter};
pub use pool::{AlgResourcePool, AlgorithmHandle, AlgorithmPool};
pub use store::{EventStore, Whiteboard};
pub use task::ExecutionTask;
pub use thread_pool::{Job, ThreadInitHook, ThreadPool, WorkerId, WorkerInitTable, WorkerPool};

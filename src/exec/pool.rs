// src/exec/pool.rs

//! Algorithm resource pool.
//!
//! The scheduler borrows an instance before dispatching an algorithm and
//! the execution task hands it back when done. Acquiring never blocks:
//! when every instance is lent out the pool answers
//! [`ResourceError::AcquireBusy`] and the scheduler tries again on a later
//! scan.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::model::ConfigFile;
use crate::errors::ResourceError;
use crate::exec::algorithm::{Algorithm, CpuCruncher};
use crate::types::ClonePolicy;

/// A borrowed algorithm instance.
#[derive(Clone)]
pub struct AlgorithmHandle {
    name: String,
    id: usize,
    instance: Arc<dyn Algorithm>,
}

impl fmt::Debug for AlgorithmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl AlgorithmHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance number within its algorithm (always 0 for shared ones).
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn instance(&self) -> &Arc<dyn Algorithm> {
        &self.instance
    }
}

/// What the scheduler needs from a resource pool.
pub trait AlgResourcePool: Send + Sync {
    fn acquire_algorithm(&self, name: &str) -> Result<AlgorithmHandle, ResourceError>;

    fn release_algorithm(&self, handle: AlgorithmHandle) -> Result<(), ResourceError>;

    fn contains(&self, name: &str) -> bool;
}

enum Slot {
    /// Private clones; `free` holds the ids not lent out.
    Cloned {
        instances: Vec<Arc<dyn Algorithm>>,
        free: Vec<usize>,
    },
    /// One reentrant instance, lent any number of times.
    Shared {
        instance: Arc<dyn Algorithm>,
        lent: usize,
    },
}

/// In-memory pool keyed by algorithm name.
#[derive(Default)]
pub struct AlgorithmPool {
    slots: HashMap<String, Mutex<Slot>>,
}

impl fmt::Debug for AlgorithmPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.slots.keys().collect();
        names.sort();
        f.debug_struct("AlgorithmPool")
            .field("algorithms", &names)
            .finish()
    }
}

impl AlgorithmPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `count` clones built by `factory` (`count` is ignored and
    /// one instance is built for `ClonePolicy::Shared`).
    pub fn register<F>(&mut self, name: impl Into<String>, policy: ClonePolicy, count: usize, factory: F)
    where
        F: Fn() -> Arc<dyn Algorithm>,
    {
        let slot = match policy {
            ClonePolicy::Clone => {
                let instances: Vec<_> = (0..count.max(1)).map(|_| factory()).collect();
                // Pop from the back, hand out id 0 first.
                let free = (0..instances.len()).rev().collect();
                Slot::Cloned { instances, free }
            }
            ClonePolicy::Shared => Slot::Shared {
                instance: factory(),
                lent: 0,
            },
        };
        self.slots.insert(name.into(), Mutex::new(slot));
    }

    /// One `CpuCruncher` per configured instance for every algorithm.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut pool = Self::new();
        for (name, algo) in cfg.algorithm.iter() {
            pool.register(name.clone(), algo.policy, algo.effective_instances(), || {
                CpuCruncher::shared(name.clone(), algo)
            });
        }
        pool
    }

    /// Instances currently lent out for `name`.
    pub fn in_use(&self, name: &str) -> usize {
        let Some(slot) = self.slots.get(name) else {
            return 0;
        };
        match &*slot.lock().unwrap_or_else(PoisonError::into_inner) {
            Slot::Cloned { instances, free } => instances.len() - free.len(),
            Slot::Shared { lent, .. } => *lent,
        }
    }
}

impl AlgResourcePool for AlgorithmPool {
    fn acquire_algorithm(&self, name: &str) -> Result<AlgorithmHandle, ResourceError> {
        let slot = self.slots.get(name).ok_or_else(|| ResourceError::NotRegistered {
            algorithm: name.to_string(),
        })?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        match &mut *slot {
            Slot::Cloned { instances, free } => {
                let id = free.pop().ok_or_else(|| ResourceError::AcquireBusy {
                    algorithm: name.to_string(),
                })?;
                debug!(algorithm = name, id, "instance acquired");
                Ok(AlgorithmHandle {
                    name: name.to_string(),
                    id,
                    instance: Arc::clone(&instances[id]),
                })
            }
            Slot::Shared { instance, lent } => {
                *lent += 1;
                Ok(AlgorithmHandle {
                    name: name.to_string(),
                    id: 0,
                    instance: Arc::clone(instance),
                })
            }
        }
    }

    fn release_algorithm(&self, handle: AlgorithmHandle) -> Result<(), ResourceError> {
        let failed = |reason: &str| ResourceError::ReleaseFailed {
            algorithm: handle.name.clone(),
            reason: reason.to_string(),
        };

        let slot = self
            .slots
            .get(&handle.name)
            .ok_or_else(|| failed("algorithm not registered"))?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        match &mut *slot {
            Slot::Cloned { instances, free } => {
                let owned = instances
                    .get(handle.id)
                    .is_some_and(|i| Arc::ptr_eq(i, &handle.instance));
                if !owned {
                    return Err(failed("instance does not belong to this pool"));
                }
                if free.contains(&handle.id) {
                    return Err(failed("instance was not lent out"));
                }
                free.push(handle.id);
                debug!(algorithm = %handle.name, id = handle.id, "instance released");
                Ok(())
            }
            Slot::Shared { lent, .. } => {
                if *lent == 0 {
                    return Err(failed("shared instance was not lent out"));
                }
                *lent -= 1;
                Ok(())
            }
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventContext;
    use crate::errors::ExecutionError;
    use crate::exec::algorithm::Filter;
    use crate::exec::store::EventStore;

    fn noop() -> Arc<dyn Algorithm> {
        Arc::new(|_: &EventContext, _: &EventStore| Ok::<_, ExecutionError>(Filter::Accept))
    }

    #[test]
    fn clone_policy_lends_each_instance_once() {
        let mut pool = AlgorithmPool::new();
        pool.register("G", ClonePolicy::Clone, 1, noop);

        let first = pool.acquire_algorithm("G").unwrap();
        let busy = pool.acquire_algorithm("G").unwrap_err();
        assert!(matches!(busy, ResourceError::AcquireBusy { .. }));

        pool.release_algorithm(first).unwrap();
        assert!(pool.acquire_algorithm("G").is_ok());
    }

    #[test]
    fn clones_get_distinct_ids() {
        let mut pool = AlgorithmPool::new();
        pool.register("G", ClonePolicy::Clone, 2, noop);

        let a = pool.acquire_algorithm("G").unwrap();
        let b = pool.acquire_algorithm("G").unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.in_use("G"), 2);
    }

    #[test]
    fn shared_policy_never_busy() {
        let mut pool = AlgorithmPool::new();
        pool.register("S", ClonePolicy::Shared, 5, noop);

        let handles: Vec<_> = (0..3).map(|_| pool.acquire_algorithm("S").unwrap()).collect();
        assert_eq!(pool.in_use("S"), 3);
        for h in handles {
            pool.release_algorithm(h).unwrap();
        }
        assert_eq!(pool.in_use("S"), 0);
    }

    #[test]
    fn double_release_fails() {
        let mut pool = AlgorithmPool::new();
        pool.register("G", ClonePolicy::Clone, 1, noop);

        let h = pool.acquire_algorithm("G").unwrap();
        pool.release_algorithm(h.clone()).unwrap();
        let err = pool.release_algorithm(h).unwrap_err();
        assert!(matches!(err, ResourceError::ReleaseFailed { .. }));
    }

    #[test]
    fn unknown_algorithm_is_not_registered() {
        let pool = AlgorithmPool::new();
        let err = pool.acquire_algorithm("nope").unwrap_err();
        assert!(matches!(err, ResourceError::NotRegistered { .. }));
        assert!(!pool.contains("nope"));
    }
}

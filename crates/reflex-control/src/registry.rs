// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named registry of the object pools the resource manager can drain.

use reflex_core::telemetry::PoolCounts;
use reflex_core::{ResourceError, ResourceResult};
use reflex_data::ManagedPool;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A pool shared between its owner and the registry.
pub type RegisteredPool = Arc<Mutex<dyn ManagedPool>>;

struct PoolEntry {
    name: String,
    pool: RegisteredPool,
}

/// Registry of object pools, kept in registration order.
///
/// Pool names are unique. Memory cleanup visits the pools in the order they
/// were registered.
pub struct PoolRegistry {
    entries: Vec<PoolEntry>,
}

impl PoolRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a pool under its own name.
    ///
    /// Fails with [`ResourceError::DuplicatePool`] if the name is taken.
    pub fn register(&mut self, pool: RegisteredPool) -> ResourceResult<()> {
        let name = pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .to_owned();
        if self.contains(&name) {
            log::warn!("PoolRegistry: rejected duplicate pool '{}'.", name);
            return Err(ResourceError::DuplicatePool { name });
        }

        log::info!("PoolRegistry: registered pool '{}'.", name);
        self.entries.push(PoolEntry { name, pool });
        Ok(())
    }

    /// Removes the pool registered under `name`, returning it.
    pub fn unregister(&mut self, name: &str) -> Option<RegisteredPool> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        log::info!("PoolRegistry: unregistered pool '{}'.", name);
        Some(self.entries.remove(index).pool)
    }

    /// Returns `true` if a pool is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Returns the pool registered under `name`.
    pub fn get(&self, name: &str) -> Option<RegisteredPool> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.pool))
    }

    /// Returns the number of registered pools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no pools are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Free and active counts per pool.
    pub fn counts(&self) -> BTreeMap<String, PoolCounts> {
        self.entries
            .iter()
            .map(|e| {
                let counts = e.pool.lock().unwrap_or_else(PoisonError::into_inner).counts();
                (e.name.clone(), counts)
            })
            .collect()
    }

    /// Drops the idle objects of one pool.
    pub fn release_inactive_in(pool: &RegisteredPool) -> usize {
        pool.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release_inactive()
    }

    /// Empties one pool.
    pub fn release_all_in(pool: &RegisteredPool) -> usize {
        pool.lock().unwrap_or_else(PoisonError::into_inner).release_all()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

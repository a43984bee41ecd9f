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

//! Bounded reuse pools.
//!
//! An [`ObjectPool`] owns its idle objects. Acquiring one moves it out to the
//! caller wrapped in a [`PooledObject`]; releasing it moves it back. Because
//! release consumes the wrapper, an object can never be released twice, and
//! [`ObjectPool::release_all`] can only forget bookkeeping, never invalidate an
//! object someone still holds.

use reflex_core::telemetry::PoolCounts;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// A pool shared between the resource manager and the code that borrows from it.
pub type SharedPool<T> = Arc<Mutex<ObjectPool<T>>>;

/// Identity of an object issued by a pool.
///
/// The `generation` is bumped by every [`ObjectPool::release_all`]; objects
/// from an older generation are no longer tracked by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolObjectId {
    pool: u32,
    generation: u32,
    serial: u64,
}

/// An object on loan from an [`ObjectPool`].
#[derive(Debug)]
pub struct PooledObject<T> {
    id: PoolObjectId,
    object: T,
    last_used: Instant,
}

impl<T> PooledObject<T> {
    /// The identity assigned by the issuing pool.
    pub fn id(&self) -> PoolObjectId {
        self.id
    }

    /// When the object last changed hands.
    pub fn last_used(&self) -> Instant {
        self.last_used
    }
}

impl<T> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

/// Counters describing a pool's occupancy and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Idle objects ready for reuse.
    pub free: usize,
    /// Objects currently handed out.
    pub active: usize,
    /// Objects ever built by the factory.
    pub created: u64,
    /// Acquisitions served from the free list.
    pub reused: u64,
    /// Upper bound on the free list.
    pub max_size: usize,
}

/// A bounded store of reusable objects of one type.
pub struct ObjectPool<T> {
    name: String,
    pool_id: u32,
    generation: u32,
    next_serial: u64,
    max_size: usize,
    free: Vec<PooledObject<T>>,
    active: HashSet<u64>,
    factory: Box<dyn Fn() -> T + Send>,
    reset: Option<Box<dyn Fn(&mut T) + Send>>,
    created: u64,
    reused: u64,
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool that keeps at most `max_size` idle objects.
    pub fn new(
        name: impl Into<String>,
        max_size: usize,
        factory: impl Fn() -> T + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            pool_id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            next_serial: 0,
            max_size,
            free: Vec::new(),
            active: HashSet::new(),
            factory: Box::new(factory),
            reset: None,
            created: 0,
            reused: 0,
        }
    }

    /// Installs a hook run on every object before it re-enters the free list.
    pub fn with_reset(mut self, reset: impl Fn(&mut T) + Send + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Wraps the pool for sharing with the resource manager.
    pub fn into_shared(self) -> SharedPool<T> {
        Arc::new(Mutex::new(self))
    }

    /// The pool's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hands out an idle object, building a new one if none is available.
    pub fn acquire(&mut self) -> PooledObject<T> {
        let mut pooled = match self.free.pop() {
            Some(pooled) => {
                self.reused += 1;
                pooled
            }
            None => {
                let id = PoolObjectId {
                    pool: self.pool_id,
                    generation: self.generation,
                    serial: self.next_serial,
                };
                self.next_serial += 1;
                self.created += 1;
                log::trace!("Pool '{}': constructing object #{}.", self.name, id.serial);
                PooledObject {
                    id,
                    object: (self.factory)(),
                    last_used: Instant::now(),
                }
            }
        };
        pooled.last_used = Instant::now();
        self.active.insert(pooled.id.serial);
        pooled
    }

    /// Takes an object back.
    ///
    /// The object is kept for reuse while the free list has room, and dropped
    /// otherwise. Objects issued before the last [`release_all`](Self::release_all)
    /// are dropped without complaint. Releasing an object this pool never
    /// issued panics in debug builds and is ignored in release builds.
    pub fn release(&mut self, mut pooled: PooledObject<T>) {
        if pooled.id.pool != self.pool_id {
            self.reject_foreign_release();
            return;
        }

        if pooled.id.generation != self.generation {
            log::trace!(
                "Pool '{}': dropping object from retired generation {}.",
                self.name,
                pooled.id.generation
            );
            return;
        }

        if !self.active.remove(&pooled.id.serial) {
            self.reject_foreign_release();
            return;
        }

        if self.free.len() < self.max_size {
            if let Some(reset) = &self.reset {
                reset(&mut pooled.object);
            }
            pooled.last_used = Instant::now();
            self.free.push(pooled);
        }
    }

    /// Fails fast in debug builds, logs and carries on in release builds.
    fn reject_foreign_release(&self) {
        if cfg!(debug_assertions) {
            panic!("pool '{}' was handed an object it never issued", self.name);
        }
        log::error!(
            "Pool '{}': ignoring release of an object it never issued.",
            self.name
        );
    }

    /// Drops every idle object. Objects on loan are untouched.
    ///
    /// Returns the number of objects dropped.
    pub fn release_inactive(&mut self) -> usize {
        let dropped = self.free.len();
        self.free.clear();
        if dropped > 0 {
            log::debug!("Pool '{}': released {} idle objects.", self.name, dropped);
        }
        dropped
    }

    /// Drops every idle object and forgets every loan.
    ///
    /// Objects still held by callers stay valid; releasing them later is a
    /// no-op. Returns the number of idle objects dropped plus loans forgotten.
    pub fn release_all(&mut self) -> usize {
        let forgotten = self.free.len() + self.active.len();
        self.free.clear();
        self.active.clear();
        self.generation = self.generation.wrapping_add(1);
        log::debug!(
            "Pool '{}': released all ({} objects), now at generation {}.",
            self.name,
            forgotten,
            self.generation
        );
        forgotten
    }

    /// Number of idle objects.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of objects on loan.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns the pool's counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            free: self.free.len(),
            active: self.active.len(),
            created: self.created,
            reused: self.reused,
            max_size: self.max_size,
        }
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("stats", &self.stats())
            .finish()
    }
}

/// The type-erased face of a pool, used by the manager to trim pools of any type.
pub trait ManagedPool: Send {
    /// The pool's name.
    fn name(&self) -> &str;

    /// Current occupancy.
    fn counts(&self) -> PoolCounts;

    /// Soft reclaim: drop idle objects only.
    fn release_inactive(&mut self) -> usize;

    /// Hard reclaim: drop idle objects and forget every loan.
    fn release_all(&mut self) -> usize;
}

impl<T: Send + 'static> ManagedPool for ObjectPool<T> {
    fn name(&self) -> &str {
        ObjectPool::name(self)
    }

    fn counts(&self) -> PoolCounts {
        PoolCounts {
            free: self.free_count(),
            active: self.active_count(),
        }
    }

    fn release_inactive(&mut self) -> usize {
        ObjectPool::release_inactive(self)
    }

    fn release_all(&mut self) -> usize {
        ObjectPool::release_all(self)
    }
}

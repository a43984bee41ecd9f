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

//! Memory cleanup passes.
//!
//! A pass is planned as a queue of [`CleanupStep`]s for one warning level and
//! executed inside a background-execution grant, one step at a time. When the
//! grant runs out the remaining steps stay queued and the next call to
//! [`CleanupCoordinator::run`] picks them up. Every step leaves the cache and
//! the pools consistent, so stopping between any two of them is safe.
//!
//! The critical plan ends with an allocator relief loop on a worker thread.
//! The worker reports back over a channel that the owner polls.

use crate::registry::PoolRegistry;
use crossbeam_channel::{Receiver, Sender};
use reflex_core::control::WarningLevel;
use reflex_core::platform::BackgroundExecution;
use reflex_core::{Clock, ResourceError};
use reflex_data::SharedImageCache;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::Duration;

const CLEANUP_TASK_NAME: &str = "memory-cleanup";

/// Shape of the allocator relief loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliefConfig {
    /// Number of allocate/discard rounds. Zero disables relief.
    pub rounds: usize,
    /// Allocations per round.
    pub batch: usize,
    /// Size of each allocation, in bytes.
    pub block_bytes: usize,
}

impl Default for ReliefConfig {
    fn default() -> Self {
        Self {
            rounds: 8,
            batch: 64,
            block_bytes: 4096,
        }
    }
}

/// Churns the allocator with short-lived batches so it can return freed
/// pages to the OS. Yields between rounds. Returns the bytes allocated.
pub fn relieve_allocator(config: ReliefConfig) -> usize {
    let mut churned = 0;
    for _ in 0..config.rounds {
        let batch: Vec<Vec<u8>> = (0..config.batch)
            .map(|_| vec![0u8; config.block_bytes])
            .collect();
        churned += batch.iter().map(Vec::len).sum::<usize>();
        drop(std::hint::black_box(batch));
        thread::yield_now();
    }
    churned
}

/// One unit of cleanup work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    /// Evict every low-priority image.
    ClearLowPriorityImages,
    /// Drop the idle objects of the named pool.
    ReleaseInactive(String),
    /// Evict every image.
    ClearAllImages,
    /// Empty the named pool.
    ReleaseAll(String),
    /// Start the allocator relief worker.
    RelieveAllocator,
}

impl CleanupStep {
    /// Plans the steps for `level` over the given pools.
    ///
    /// | Level | Cache | Pools | Relief |
    /// |---|---|---|---|
    /// | normal | - | - | - |
    /// | warning | low-priority images | idle objects | - |
    /// | critical | all images | everything | if enabled |
    pub fn plan(level: WarningLevel, pools: &[String], relief: bool) -> Vec<CleanupStep> {
        match level {
            WarningLevel::Normal => Vec::new(),
            WarningLevel::Warning => std::iter::once(CleanupStep::ClearLowPriorityImages)
                .chain(pools.iter().cloned().map(CleanupStep::ReleaseInactive))
                .collect(),
            WarningLevel::Critical => std::iter::once(CleanupStep::ClearAllImages)
                .chain(pools.iter().cloned().map(CleanupStep::ReleaseAll))
                .chain(relief.then_some(CleanupStep::RelieveAllocator))
                .collect(),
        }
    }
}

/// Outcome of a call to [`CleanupCoordinator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupProgress {
    /// No pass is in flight.
    Idle,
    /// The pass finished.
    Completed(WarningLevel),
    /// The grant expired with steps left.
    Suspended {
        /// Steps still queued.
        remaining: usize,
    },
    /// All steps ran; the relief worker has not reported back yet.
    AwaitingRelief,
}

#[derive(Debug)]
struct ReliefReport {
    level: WarningLevel,
    churned_bytes: usize,
}

/// Runs at most one cleanup pass at a time.
pub struct CleanupCoordinator {
    relief: ReliefConfig,
    background: Arc<dyn BackgroundExecution>,
    clock: Arc<dyn Clock>,
    pending: VecDeque<CleanupStep>,
    level: Option<WarningLevel>,
    awaiting_relief: bool,
    done_tx: Sender<ReliefReport>,
    done_rx: Receiver<ReliefReport>,
}

impl CleanupCoordinator {
    /// Creates an idle coordinator.
    pub fn new(
        relief: ReliefConfig,
        background: Arc<dyn BackgroundExecution>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        Self {
            relief,
            background,
            clock,
            pending: VecDeque::new(),
            level: None,
            awaiting_relief: false,
            done_tx,
            done_rx,
        }
    }

    /// Queues a pass for `level`.
    ///
    /// A request above the level of a pass still in its step queue replaces
    /// that pass's remaining steps. Requests at or below the in-flight level
    /// are coalesced. Returns `false` if the request was coalesced or there
    /// is nothing to do.
    pub fn begin(&mut self, level: WarningLevel, pools: &[String]) -> bool {
        if let Some(current) = self.level {
            if level <= current || self.awaiting_relief {
                log::debug!(
                    "CleanupCoordinator: {} pass in flight, coalescing {} request.",
                    current,
                    level
                );
                return false;
            }
        }

        let steps = CleanupStep::plan(level, pools, self.relief.rounds > 0);
        if steps.is_empty() {
            return false;
        }

        match self.level {
            Some(current) => log::warn!(
                "CleanupCoordinator: escalating {} pass to {} ({} steps dropped, {} queued).",
                current,
                level,
                self.pending.len(),
                steps.len()
            ),
            None => log::info!(
                "CleanupCoordinator: starting {} pass ({} steps).",
                level,
                steps.len()
            ),
        }
        self.pending = steps.into();
        self.level = Some(level);
        true
    }

    /// Executes queued steps until the queue is empty or the grant expires.
    pub fn run(&mut self, cache: &SharedImageCache, pools: &PoolRegistry) -> CleanupProgress {
        let Some(level) = self.level else {
            return CleanupProgress::Idle;
        };

        if !self.pending.is_empty() {
            let grant = self.background.begin(CLEANUP_TASK_NAME);
            while !grant.is_expired(self.clock.now()) {
                let Some(step) = self.pending.pop_front() else {
                    break;
                };
                self.execute(step, level, cache, pools);
            }
            self.background.end(grant);
        }

        if !self.pending.is_empty() {
            log::warn!(
                "CleanupCoordinator: grant expired, {} steps deferred.",
                self.pending.len()
            );
            return CleanupProgress::Suspended {
                remaining: self.pending.len(),
            };
        }

        if self.awaiting_relief {
            return CleanupProgress::AwaitingRelief;
        }

        self.level = None;
        log::info!("CleanupCoordinator: {} pass completed.", level);
        CleanupProgress::Completed(level)
    }

    /// Picks up a relief report without blocking.
    ///
    /// Returns the level of the pass if this report completed it.
    pub fn poll(&mut self) -> Option<WarningLevel> {
        if !self.awaiting_relief {
            return None;
        }
        let report = self.done_rx.try_recv().ok()?;
        self.finish_relief(report)
    }

    /// Blocks up to `timeout` for a relief report.
    pub fn wait(&mut self, timeout: Duration) -> Option<WarningLevel> {
        if !self.awaiting_relief {
            return None;
        }
        let report = self.done_rx.recv_timeout(timeout).ok()?;
        self.finish_relief(report)
    }

    /// `true` while a pass is queued, running, suspended or awaiting relief.
    pub fn is_busy(&self) -> bool {
        self.level.is_some()
    }

    /// `true` if a grant expired with steps left.
    pub fn is_suspended(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Steps still queued.
    pub fn pending_steps(&self) -> usize {
        self.pending.len()
    }

    fn execute(
        &mut self,
        step: CleanupStep,
        level: WarningLevel,
        cache: &SharedImageCache,
        pools: &PoolRegistry,
    ) {
        log::trace!("CleanupCoordinator: {:?}.", step);
        match step {
            CleanupStep::ClearLowPriorityImages => {
                let evicted = cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear_low_priority_images();
                log::debug!("CleanupCoordinator: evicted {} low-priority images.", evicted);
            }
            CleanupStep::ClearAllImages => {
                let evicted = cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear_all();
                log::debug!("CleanupCoordinator: evicted {} images.", evicted);
            }
            CleanupStep::ReleaseInactive(name) => match pools.get(&name) {
                Some(pool) => {
                    PoolRegistry::release_inactive_in(&pool);
                }
                None => log::debug!("CleanupCoordinator: pool '{}' is gone.", name),
            },
            CleanupStep::ReleaseAll(name) => match pools.get(&name) {
                Some(pool) => {
                    PoolRegistry::release_all_in(&pool);
                }
                None => log::debug!("CleanupCoordinator: pool '{}' is gone.", name),
            },
            CleanupStep::RelieveAllocator => self.spawn_relief(level),
        }
    }

    fn spawn_relief(&mut self, level: WarningLevel) {
        let config = self.relief;
        let tx = self.done_tx.clone();
        self.awaiting_relief = true;

        let spawned = thread::Builder::new()
            .name("reflex-relief".to_string())
            .spawn(move || {
                let churned_bytes = relieve_allocator(config);
                // The coordinator may be gone by now.
                let _ = tx.send(ReliefReport {
                    level,
                    churned_bytes,
                });
            });

        if let Err(e) = spawned {
            let error = ResourceError::WorkerSpawn {
                reason: e.to_string(),
            };
            log::warn!("CleanupCoordinator: {}. Relieving inline.", error);
            let churned_bytes = relieve_allocator(config);
            let _ = self.done_tx.send(ReliefReport {
                level,
                churned_bytes,
            });
        }
    }

    fn finish_relief(&mut self, report: ReliefReport) -> Option<WarningLevel> {
        log::debug!(
            "CleanupCoordinator: allocator relief churned {} KiB.",
            report.churned_bytes / 1024
        );
        self.awaiting_relief = false;
        if !self.pending.is_empty() {
            return None;
        }
        let level = self.level.take();
        if let Some(level) = level {
            debug_assert_eq!(level, report.level);
            log::info!("CleanupCoordinator: {} pass completed.", level);
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use reflex_core::platform::BackgroundGrant;
    use reflex_core::ManualClock;
    use reflex_data::{ImageCache, ImagePriority, ObjectPool};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Hands out queued grants first, then unbounded ones.
    #[derive(Default)]
    struct ScriptedBackground {
        grants: Mutex<VecDeque<BackgroundGrant>>,
        begun: AtomicUsize,
        ended: AtomicUsize,
    }

    impl BackgroundExecution for ScriptedBackground {
        fn begin(&self, _task_name: &str) -> BackgroundGrant {
            self.begun.fetch_add(1, Ordering::SeqCst);
            self.grants
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(BackgroundGrant::unbounded)
        }

        fn end(&self, _grant: BackgroundGrant) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        background: Arc<ScriptedBackground>,
        cache: SharedImageCache,
        pools: PoolRegistry,
        buffers: reflex_data::SharedPool<Vec<u8>>,
    }

    fn fixture() -> Fixture {
        let cache = ImageCache::default().into_shared();
        {
            let mut cache = cache.lock().unwrap();
            cache.cache_image("thumb", DynamicImage::new_luma8(100, 1), ImagePriority::Low);
            cache.cache_image("hero", DynamicImage::new_luma8(200, 1), ImagePriority::High);
        }

        let buffers = ObjectPool::new("buffers", 8, || vec![0u8; 16]).into_shared();
        {
            let mut pool = buffers.lock().unwrap();
            let a = pool.acquire();
            let b = pool.acquire();
            pool.release(a);
            pool.release(b);
        }
        let mut pools = PoolRegistry::new();
        pools.register(buffers.clone()).unwrap();

        Fixture {
            clock: Arc::new(ManualClock::new()),
            background: Arc::new(ScriptedBackground::default()),
            cache,
            pools,
            buffers,
        }
    }

    fn coordinator(f: &Fixture, relief: ReliefConfig) -> CleanupCoordinator {
        CleanupCoordinator::new(relief, f.background.clone(), f.clock.clone())
    }

    fn no_relief() -> ReliefConfig {
        ReliefConfig {
            rounds: 0,
            ..ReliefConfig::default()
        }
    }

    #[test]
    fn test_plan_per_level() {
        let pools = vec!["a".to_string(), "b".to_string()];
        assert!(CleanupStep::plan(WarningLevel::Normal, &pools, true).is_empty());
        assert_eq!(
            CleanupStep::plan(WarningLevel::Warning, &pools, true),
            vec![
                CleanupStep::ClearLowPriorityImages,
                CleanupStep::ReleaseInactive("a".to_string()),
                CleanupStep::ReleaseInactive("b".to_string()),
            ]
        );
        assert_eq!(
            CleanupStep::plan(WarningLevel::Critical, &pools, true),
            vec![
                CleanupStep::ClearAllImages,
                CleanupStep::ReleaseAll("a".to_string()),
                CleanupStep::ReleaseAll("b".to_string()),
                CleanupStep::RelieveAllocator,
            ]
        );
        assert_eq!(
            CleanupStep::plan(WarningLevel::Critical, &[], false),
            vec![CleanupStep::ClearAllImages]
        );
    }

    #[test]
    fn test_warning_pass_trims_softly() {
        let f = fixture();
        let mut coordinator = coordinator(&f, ReliefConfig::default());
        assert!(coordinator.begin(WarningLevel::Warning, &f.pools.names()));
        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::Completed(WarningLevel::Warning)
        );

        let cache = f.cache.lock().unwrap();
        assert!(!cache.contains("thumb"));
        assert!(cache.contains("hero"));
        assert_eq!(f.buffers.lock().unwrap().free_count(), 0);
        assert!(!coordinator.is_busy());
        assert_eq!(f.background.begun.load(Ordering::SeqCst), 1);
        assert_eq!(f.background.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_critical_pass_waits_for_relief() {
        let f = fixture();
        let held = f.buffers.lock().unwrap().acquire();
        let mut coordinator = coordinator(
            &f,
            ReliefConfig {
                rounds: 2,
                batch: 4,
                block_bytes: 256,
            },
        );

        assert!(coordinator.begin(WarningLevel::Critical, &f.pools.names()));
        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::AwaitingRelief
        );
        assert!(f.cache.lock().unwrap().is_empty());
        assert_eq!(f.buffers.lock().unwrap().active_count(), 0);
        assert!(coordinator.is_busy());

        assert_eq!(
            coordinator.wait(Duration::from_secs(5)),
            Some(WarningLevel::Critical)
        );
        assert!(!coordinator.is_busy());
        assert_eq!(coordinator.poll(), None);

        // Held objects outlive release_all; handing them back is a no-op.
        f.buffers.lock().unwrap().release(held);
        assert_eq!(f.buffers.lock().unwrap().free_count(), 0);
    }

    #[test]
    fn test_expired_grant_suspends_and_resumes() {
        let f = fixture();
        f.background
            .grants
            .lock()
            .unwrap()
            .push_back(BackgroundGrant::until(f.clock.now()));
        let mut coordinator = coordinator(&f, no_relief());

        assert!(coordinator.begin(WarningLevel::Warning, &f.pools.names()));
        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::Suspended { remaining: 2 }
        );
        assert!(coordinator.is_suspended());
        assert!(f.cache.lock().unwrap().contains("thumb"));
        assert_eq!(f.background.ended.load(Ordering::SeqCst), 1);

        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::Completed(WarningLevel::Warning)
        );
        assert!(!f.cache.lock().unwrap().contains("thumb"));
        assert_eq!(f.background.begun.load(Ordering::SeqCst), 2);
        assert_eq!(f.background.ended.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_requests_at_or_below_in_flight_level_are_coalesced() {
        let f = fixture();
        f.background
            .grants
            .lock()
            .unwrap()
            .push_back(BackgroundGrant::until(f.clock.now()));
        let mut coordinator = coordinator(&f, no_relief());

        assert!(coordinator.begin(WarningLevel::Warning, &f.pools.names()));
        coordinator.run(&f.cache, &f.pools);
        assert!(!coordinator.begin(WarningLevel::Warning, &f.pools.names()));
        assert!(!coordinator.begin(WarningLevel::Normal, &f.pools.names()));
        assert_eq!(coordinator.pending_steps(), 2);
    }

    #[test]
    fn test_critical_request_escalates_suspended_warning_pass() {
        let f = fixture();
        f.background
            .grants
            .lock()
            .unwrap()
            .push_back(BackgroundGrant::until(f.clock.now()));
        let mut coordinator = coordinator(&f, no_relief());

        assert!(coordinator.begin(WarningLevel::Warning, &f.pools.names()));
        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::Suspended { remaining: 2 }
        );

        assert!(coordinator.begin(WarningLevel::Critical, &f.pools.names()));
        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::Completed(WarningLevel::Critical)
        );
        assert!(f.cache.lock().unwrap().is_empty());
        assert_eq!(f.buffers.lock().unwrap().free_count(), 0);
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn test_critical_pass_awaiting_relief_coalesces_everything() {
        let f = fixture();
        let mut coordinator = coordinator(
            &f,
            ReliefConfig {
                rounds: 1,
                batch: 1,
                block_bytes: 64,
            },
        );

        assert!(coordinator.begin(WarningLevel::Critical, &f.pools.names()));
        assert_eq!(
            coordinator.run(&f.cache, &f.pools),
            CleanupProgress::AwaitingRelief
        );
        assert!(!coordinator.begin(WarningLevel::Critical, &f.pools.names()));
        assert_eq!(
            coordinator.wait(Duration::from_secs(5)),
            Some(WarningLevel::Critical)
        );
    }

    #[test]
    fn test_normal_level_is_a_no_op() {
        let f = fixture();
        let mut coordinator = coordinator(&f, ReliefConfig::default());
        assert!(!coordinator.begin(WarningLevel::Normal, &f.pools.names()));
        assert_eq!(coordinator.run(&f.cache, &f.pools), CleanupProgress::Idle);
        assert_eq!(f.cache.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_relieve_allocator_counts_bytes() {
        let config = ReliefConfig {
            rounds: 3,
            batch: 5,
            block_bytes: 128,
        };
        assert_eq!(relieve_allocator(config), 3 * 5 * 128);
        assert_eq!(
            relieve_allocator(ReliefConfig {
                rounds: 0,
                ..config
            }),
            0
        );
    }
}

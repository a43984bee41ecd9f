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

//! Central service for adaptive resource management.

use crate::analysis::{self, TrendConfig};
use crate::cleanup::{CleanupCoordinator, CleanupProgress, ReliefConfig};
use crate::metrics::RingBuffer;
use crate::monitor::{MonitorConfig, PerformanceMonitor};
use crate::registry::PoolRegistry;
use reflex_core::control::{Profile, WarningLevel};
use reflex_core::event::EventBus;
use reflex_core::platform::{
    BackgroundExecution, DeviceCapabilities, ForegroundExecution, PlatformSignal, SystemProbe,
    SystemSample,
};
use reflex_core::telemetry::{MemoryMetrics, PerformanceMetrics, ResourceEvent, Snapshot};
use reflex_core::{Clock, ResourceResult, SystemClock};
use reflex_data::{CacheConfig, ImageCache, ObjectPool, SharedImageCache, SharedPool};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

/// Number of memory snapshots retained by the manager.
pub const MEMORY_HISTORY_CAPACITY: usize = 100;

/// Configuration for the [`ResourceManager`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Cadence of memory sampling.
    pub sample_interval: Duration,
    /// Usage at or above which the level is `warning`, in MB.
    pub warning_threshold_mb: f64,
    /// Usage at or above which the level is `critical`, in MB.
    pub critical_threshold_mb: f64,
    /// Cadence of the routine cache trim.
    pub routine_cleanup_interval: Duration,
    /// Parameters of the memory trend.
    pub memory_trend: TrendConfig,
    /// Shape of the allocator relief loop run after critical cleanup.
    pub relief: ReliefConfig,
    /// Budget of the image cache.
    pub cache: CacheConfig,
    /// Configuration of the performance monitor.
    pub monitor: MonitorConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(2),
            warning_threshold_mb: 500.0,
            critical_threshold_mb: 800.0,
            routine_cleanup_interval: Duration::from_secs(30),
            memory_trend: TrendConfig::MEMORY,
            relief: ReliefConfig::default(),
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// The platform-facing dependencies of the manager.
pub struct ManagerPorts {
    /// Source of memory, CPU and battery gauges.
    pub probe: Arc<dyn SystemProbe>,
    /// Grants windows for cleanup work.
    pub background: Arc<dyn BackgroundExecution>,
    /// Time source for every cadence.
    pub clock: Arc<dyn Clock>,
}

impl ManagerPorts {
    /// Ports for a foreground process on the wall clock.
    pub fn new(probe: Arc<dyn SystemProbe>) -> Self {
        Self {
            probe,
            background: Arc::new(ForegroundExecution),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Owns the image cache, the object pools and the performance monitor, and
/// reacts to memory pressure.
///
/// All state changes happen through `&mut self` on the owner's thread. Call
/// [`tick`](Self::tick) regularly: it drains platform signals, picks up
/// finished background work, samples memory on its cadence and runs the
/// routine cache trim. Frames are reported separately through
/// [`on_frame`](Self::on_frame).
pub struct ResourceManager {
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn SystemProbe>,
    events: EventBus<ResourceEvent>,
    monitor: PerformanceMonitor,
    cache: SharedImageCache,
    pools: PoolRegistry,
    coordinator: CleanupCoordinator,
    signal_tx: flume::Sender<PlatformSignal>,
    signal_rx: flume::Receiver<PlatformSignal>,
    history: RingBuffer<Snapshot, MEMORY_HISTORY_CAPACITY>,
    warning_level: WarningLevel,
    usage_mb: f64,
    last_sample: Option<Instant>,
    last_routine: Instant,
}

impl ResourceManager {
    /// Creates a manager for the described device.
    pub fn new(config: ManagerConfig, capabilities: DeviceCapabilities, ports: ManagerPorts) -> Self {
        let ManagerPorts {
            probe,
            background,
            clock,
        } = ports;
        let events = EventBus::new();
        let monitor =
            PerformanceMonitor::new(config.monitor, capabilities, clock.clone(), events.clone());
        let coordinator = CleanupCoordinator::new(config.relief, background, clock.clone());
        let (signal_tx, signal_rx) = flume::unbounded();
        let last_routine = clock.now();

        log::info!(
            "ResourceManager: thresholds {:.0}/{:.0} MB, sampling every {:?}.",
            config.warning_threshold_mb,
            config.critical_threshold_mb,
            config.sample_interval
        );

        Self {
            config,
            clock,
            probe,
            events,
            monitor,
            cache: ImageCache::new(config.cache).into_shared(),
            pools: PoolRegistry::new(),
            coordinator,
            signal_tx,
            signal_rx,
            history: RingBuffer::new(),
            warning_level: WarningLevel::Normal,
            usage_mb: 0.0,
            last_sample: None,
            last_routine,
        }
    }

    /// Runs one iteration of the management loop.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        let signals: Vec<PlatformSignal> = self.signal_rx.try_iter().collect();
        for signal in signals {
            self.handle_signal(signal);
        }

        if let Some(level) = self.coordinator.poll() {
            self.publish_completed(level);
        }
        if self.coordinator.is_suspended() {
            log::debug!("ResourceManager: resuming deferred cleanup.");
            self.run_cleanup();
        }

        let sample_due = self
            .last_sample
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.sample_interval);
        if sample_due {
            self.sample_now();
        }

        if now.saturating_duration_since(self.last_routine) >= self.config.routine_cleanup_interval {
            self.routine_cleanup(now);
        }
    }

    /// Counts a presented frame.
    pub fn on_frame(&mut self) -> Option<f64> {
        self.monitor.tick()
    }

    /// Reads the probe and records the sample.
    pub fn sample_now(&mut self) -> WarningLevel {
        let sample = self.probe.sample();
        self.record_sample(sample)
    }

    /// Records a memory sample and reacts to a change of warning level.
    ///
    /// Only a level change publishes `MemoryWarningChanged` and starts cleanup.
    pub fn record_sample(&mut self, sample: SystemSample) -> WarningLevel {
        self.last_sample = Some(self.clock.now());
        let snapshot = self.monitor.record_system_sample(sample);
        self.history.push(snapshot);
        self.usage_mb = sample.memory_usage_mb;

        let level = WarningLevel::from_usage(
            sample.memory_usage_mb,
            self.config.warning_threshold_mb,
            self.config.critical_threshold_mb,
        );
        self.transition_to(level);
        level
    }

    /// Reacts to a platform signal.
    pub fn handle_signal(&mut self, signal: PlatformSignal) {
        log::debug!("ResourceManager: signal {:?}.", signal);
        match signal {
            PlatformSignal::ThermalStateChanged(state) => self.monitor.on_thermal_changed(state),
            PlatformSignal::LowPowerModeChanged(enabled) => {
                self.monitor.on_power_state_changed(enabled)
            }
            PlatformSignal::LowMemory => {
                log::warn!("ResourceManager: OS reported low memory.");
                if self.warning_level == WarningLevel::Critical {
                    self.cleanup(WarningLevel::Critical);
                } else {
                    self.transition_to(WarningLevel::Critical);
                }
            }
        }
    }

    /// Returns a sender that feeds platform signals into the next tick.
    ///
    /// The sender can be moved to any thread.
    pub fn signal_sender(&self) -> flume::Sender<PlatformSignal> {
        self.signal_tx.clone()
    }

    /// Starts a cleanup pass for `level`.
    ///
    /// Ignored while another pass is in flight. A `normal` level does nothing.
    pub fn cleanup(&mut self, level: WarningLevel) {
        if self.coordinator.begin(level, &self.pools.names()) {
            self.run_cleanup();
        }
    }

    /// Blocks up to `timeout` for the in-flight pass to finish its relief loop.
    ///
    /// Returns the level of the pass if it completed.
    pub fn wait_for_cleanup(&mut self, timeout: Duration) -> Option<WarningLevel> {
        let level = self.coordinator.wait(timeout)?;
        self.publish_completed(level);
        Some(level)
    }

    /// `true` while a cleanup pass is in flight.
    pub fn is_cleaning_up(&self) -> bool {
        self.coordinator.is_busy()
    }

    /// Subscribes to resource events.
    pub fn subscribe(&self) -> flume::Receiver<ResourceEvent> {
        self.events.subscribe()
    }

    /// Creates a pool owned by the manager and returns the caller's handle.
    ///
    /// Fails if a pool with the same name is already registered.
    pub fn register_pool<T: Send + 'static>(
        &mut self,
        pool: ObjectPool<T>,
    ) -> ResourceResult<SharedPool<T>> {
        let shared = pool.into_shared();
        self.pools.register(shared.clone())?;
        Ok(shared)
    }

    /// Stops trimming the named pool.
    pub fn unregister_pool(&mut self, name: &str) -> bool {
        self.pools.unregister(name).is_some()
    }

    /// The pools under management.
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// A handle to the shared image cache.
    pub fn image_cache(&self) -> SharedImageCache {
        Arc::clone(&self.cache)
    }

    /// The current memory warning level.
    pub fn warning_level(&self) -> WarningLevel {
        self.warning_level
    }

    /// Tracks a mounted visual effect.
    pub fn register_effect(&mut self, id: impl Into<String>) {
        self.monitor.register_effect(id);
    }

    /// Stops tracking an unmounted visual effect.
    pub fn unregister_effect(&mut self, id: &str) {
        self.monitor.unregister_effect(id);
    }

    /// Explicitly selects a profile.
    pub fn set_profile(&mut self, profile: Profile) {
        self.monitor.set_profile(profile);
    }

    /// The performance monitor.
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Mutable access to the performance monitor.
    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        &mut self.monitor
    }

    /// Returns the polled performance view.
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.monitor.metrics()
    }

    /// Returns the polled memory view.
    pub fn memory_metrics(&self) -> MemoryMetrics {
        MemoryMetrics {
            current_usage_mb: self.usage_mb,
            warning_level: self.warning_level,
            pooled_counts: self.pools.counts(),
            cache_size_bytes: self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current_size_bytes(),
            trend: analysis::memory_trend(&self.history, self.config.memory_trend, |s| {
                s.memory_usage_mb
            }),
        }
    }

    fn transition_to(&mut self, level: WarningLevel) {
        if level == self.warning_level {
            return;
        }

        if level > self.warning_level {
            log::warn!(
                "ResourceManager: memory {} -> {} at {:.1} MB.",
                self.warning_level,
                level,
                self.usage_mb
            );
        } else {
            log::info!(
                "ResourceManager: memory {} -> {} at {:.1} MB.",
                self.warning_level,
                level,
                self.usage_mb
            );
        }

        self.warning_level = level;
        self.events.publish(ResourceEvent::MemoryWarningChanged {
            level,
            usage_mb: self.usage_mb,
        });
        self.cleanup(level);
    }

    fn run_cleanup(&mut self) {
        match self.coordinator.run(&self.cache, &self.pools) {
            CleanupProgress::Completed(level) => self.publish_completed(level),
            CleanupProgress::Suspended { remaining } => {
                log::debug!("ResourceManager: cleanup deferred with {} steps left.", remaining);
            }
            CleanupProgress::AwaitingRelief | CleanupProgress::Idle => {}
        }
    }

    fn publish_completed(&self, level: WarningLevel) {
        self.events
            .publish(ResourceEvent::MemoryCleanupCompleted { level });
    }

    fn routine_cleanup(&mut self, now: Instant) {
        self.last_routine = now;
        self.events.publish(ResourceEvent::RoutineCleanupTick);
        let evicted = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cleanup_if_needed();
        log::debug!("ResourceManager: routine cleanup evicted {} images.", evicted);
    }
}

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

//! Frame-cadence and device-health monitor.
//!
//! The `PerformanceMonitor` counts frames into one-second windows, keeps the
//! latest system gauges, and evaluates them against the active profile's
//! thresholds. Crossing into pressure publishes a single
//! [`ResourceEvent::OptimizeEffects`]; a cooldown then suppresses further
//! notifications so a sustained condition produces one event, not one per sample.

use crate::analysis::{self, TrendConfig};
use crate::context::DeviceContext;
use crate::metrics::RingBuffer;
use crate::thresholds::ThresholdTable;
use reflex_core::control::{Profile, Thresholds};
use reflex_core::event::EventBus;
use reflex_core::platform::{DeviceCapabilities, SystemSample, ThermalState};
use reflex_core::telemetry::{PerformanceMetrics, ResourceEvent, Snapshot};
use reflex_core::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of snapshots retained by the monitor.
pub const MONITOR_HISTORY_CAPACITY: usize = 60;

/// Configuration for the [`PerformanceMonitor`].
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Length of a frame-rate measurement window.
    pub frame_window: Duration,
    /// How long `OptimizeEffects` stays suppressed after firing.
    pub optimize_cooldown: Duration,
    /// Parameters of the frame-rate trend.
    pub trend: TrendConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            frame_window: Duration::from_secs(1),
            optimize_cooldown: Duration::from_secs(2),
            trend: TrendConfig::FRAME_RATE,
        }
    }
}

/// Samples frame cadence and system gauges and enforces the active profile.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    thresholds: ThresholdTable,
    context: DeviceContext,
    clock: Arc<dyn Clock>,
    events: EventBus<ResourceEvent>,
    effects: HashSet<String>,
    frame_count: u32,
    window_start: Option<Instant>,
    frame_rate: f64,
    target_frame_rate: f64,
    latest: SystemSample,
    should_warn: bool,
    optimizing_since: Option<Instant>,
    history: RingBuffer<Snapshot, MONITOR_HISTORY_CAPACITY>,
}

impl PerformanceMonitor {
    /// Creates a monitor for the given device.
    ///
    /// Until the first window completes, the frame rate is assumed to be the
    /// display's maximum refresh rate.
    pub fn new(
        config: MonitorConfig,
        capabilities: DeviceCapabilities,
        clock: Arc<dyn Clock>,
        events: EventBus<ResourceEvent>,
    ) -> Self {
        let context = DeviceContext::new(capabilities);
        let frame_rate = context.max_refresh_rate();
        let target_frame_rate = Self::target_for(&context, frame_rate);
        log::info!(
            "PerformanceMonitor: starting with profile {} (target {:.0} Hz).",
            context.profile,
            target_frame_rate
        );
        Self {
            config,
            thresholds: ThresholdTable::new(),
            context,
            clock,
            events,
            effects: HashSet::new(),
            frame_count: 0,
            window_start: None,
            frame_rate,
            target_frame_rate,
            latest: SystemSample::default(),
            should_warn: false,
            optimizing_since: None,
            history: RingBuffer::new(),
        }
    }

    /// Counts a frame at the clock's current time. See [`tick_at`](Self::tick_at).
    pub fn tick(&mut self) -> Option<f64> {
        let now = self.clock.now();
        self.tick_at(now)
    }

    /// Counts a frame presented at `now`.
    ///
    /// When a full window has elapsed, computes the frame rate, resets the
    /// window, adapts the target refresh rate and re-evaluates. Returns the
    /// new frame rate when a window closes.
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };

        self.frame_count += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.config.frame_window {
            return None;
        }

        self.frame_rate = f64::from(self.frame_count) / elapsed.as_secs_f64();
        self.frame_count = 0;
        self.window_start = Some(now);
        log::trace!("PerformanceMonitor: {:.1} fps.", self.frame_rate);

        self.adapt_frame_rate();
        self.evaluate_at(now);
        Some(self.frame_rate)
    }

    /// Tracks a mounted visual effect. Registering the same id twice counts once.
    pub fn register_effect(&mut self, id: impl Into<String>) {
        self.effects.insert(id.into());
        self.evaluate();
    }

    /// Tracks several effects mounted together, evaluating once.
    pub fn register_effects<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.effects.extend(ids.into_iter().map(Into::into));
        self.evaluate();
    }

    /// Stops tracking an unmounted visual effect.
    pub fn unregister_effect(&mut self, id: &str) {
        self.effects.remove(id);
        self.evaluate();
    }

    /// Stores the latest system gauges, records a snapshot and re-evaluates.
    pub fn record_system_sample(&mut self, sample: SystemSample) -> Snapshot {
        let now = self.clock.now();
        self.latest = sample;
        let snapshot = self.snapshot_at(now);
        self.history.push(snapshot);
        self.evaluate_at(now);
        snapshot
    }

    /// Reacts to an OS thermal notification.
    pub fn on_thermal_changed(&mut self, state: ThermalState) {
        if let Some(profile) = self.context.apply_thermal(state) {
            log::warn!("PerformanceMonitor: thermal state {state:?}, downgrading to {profile}.");
            self.adapt_frame_rate();
        } else {
            log::debug!("PerformanceMonitor: thermal state {state:?}.");
        }
        self.evaluate();
    }

    /// Reacts to an OS low-power-mode notification.
    pub fn on_power_state_changed(&mut self, low_power: bool) {
        if let Some(profile) = self.context.apply_low_power(low_power) {
            log::warn!("PerformanceMonitor: low-power mode on, downgrading to {profile}.");
            self.adapt_frame_rate();
        } else {
            log::debug!("PerformanceMonitor: low-power mode {low_power}.");
        }
        self.evaluate();
    }

    /// Explicitly selects a profile. This is the only path that upgrades.
    pub fn set_profile(&mut self, profile: Profile) {
        if self.context.profile != profile {
            log::info!(
                "PerformanceMonitor: profile {} -> {}.",
                self.context.profile,
                profile
            );
            self.context.profile = profile;
        }
        self.adapt_frame_rate();
        self.evaluate();
    }

    /// Re-targets the display refresh rate for the active profile.
    ///
    /// A new target is applied only when it differs from the current one by
    /// more than 1 Hz. Returns `true` if the target changed.
    pub fn adapt_frame_rate(&mut self) -> bool {
        let target = Self::target_for(&self.context, self.frame_rate);
        if (self.target_frame_rate - target).abs() > 1.0 {
            log::info!(
                "PerformanceMonitor: target refresh {:.0} Hz -> {:.0} Hz.",
                self.target_frame_rate,
                target
            );
            self.target_frame_rate = target;
            true
        } else {
            false
        }
    }

    /// Evaluates the gauges against the active profile at the clock's current time.
    pub fn evaluate(&mut self) -> bool {
        let now = self.clock.now();
        self.evaluate_at(now)
    }

    /// Returns `true` if any gauge breaches the active profile's thresholds.
    ///
    /// Publishes `OptimizeEffects` on a false → true edge unless a previous
    /// notification is still cooling down.
    pub fn evaluate_at(&mut self, now: Instant) -> bool {
        if let Some(since) = self.optimizing_since {
            if now.saturating_duration_since(since) >= self.config.optimize_cooldown {
                log::debug!("PerformanceMonitor: optimize cooldown elapsed.");
                self.optimizing_since = None;
            }
        }

        let should_warn = self.breaches(&self.thresholds.get(self.context.profile));

        if should_warn && !self.should_warn && self.optimizing_since.is_none() {
            let effect_count = self.effect_count();
            log::warn!(
                "PerformanceMonitor: pressure detected ({} effects, {:.1} fps, {:.0} MB, {:.0}% CPU, {:?}).",
                effect_count,
                self.frame_rate,
                self.latest.memory_usage_mb,
                self.latest.cpu_percent,
                self.context.thermal
            );
            self.optimizing_since = Some(now);
            self.events.publish(ResourceEvent::OptimizeEffects {
                effect_count,
                frame_rate: self.frame_rate,
            });
        }

        self.should_warn = should_warn;
        should_warn
    }

    /// Returns the polled metrics view.
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            frame_rate: self.frame_rate,
            effect_count: self.effect_count(),
            memory_usage_mb: self.latest.memory_usage_mb,
            cpu_percent: self.latest.cpu_percent,
            thermal_state: self.context.thermal,
            battery_level: self.latest.battery_level,
            is_performant: !self.should_warn,
            profile: self.context.profile,
            trend: analysis::performance_trend(&self.history, self.config.trend),
        }
    }

    /// Frame rate over the last completed window, in Hz.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// The refresh rate currently requested from the display, in Hz.
    pub fn target_frame_rate(&self) -> f64 {
        self.target_frame_rate
    }

    /// Number of mounted visual effects.
    pub fn effect_count(&self) -> u32 {
        u32::try_from(self.effects.len()).unwrap_or(u32::MAX)
    }

    /// The active profile.
    pub fn profile(&self) -> Profile {
        self.context.profile
    }

    /// The device context (thermal, power, capabilities).
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// `true` while a recent `OptimizeEffects` notification is cooling down.
    pub fn is_optimizing(&self) -> bool {
        let now = self.clock.now();
        self.optimizing_since
            .is_some_and(|since| now.saturating_duration_since(since) < self.config.optimize_cooldown)
    }

    /// Recorded snapshots, oldest first.
    pub fn history(&self) -> &RingBuffer<Snapshot, MONITOR_HISTORY_CAPACITY> {
        &self.history
    }

    fn snapshot_at(&self, now: Instant) -> Snapshot {
        Snapshot {
            timestamp: now,
            frame_rate: self.frame_rate,
            effect_count: self.effect_count(),
            memory_usage_mb: self.latest.memory_usage_mb,
            cpu_percent: self.latest.cpu_percent,
            thermal_state: self.context.thermal,
            battery_level: self.latest.battery_level,
        }
    }

    fn breaches(&self, t: &Thresholds) -> bool {
        self.effect_count() > t.max_effect_count
            || self.frame_rate < t.min_frame_rate
            || self.latest.memory_usage_mb > t.max_memory_usage_mb
            || self.latest.cpu_percent > t.max_cpu_percent
            || self.context.thermal == ThermalState::Critical
    }

    fn target_for(context: &DeviceContext, frame_rate: f64) -> f64 {
        let target: f64 = match context.profile {
            Profile::Performance => 120.0,
            Profile::Balanced if frame_rate < 90.0 => 60.0,
            Profile::Balanced => 120.0,
            Profile::Efficiency => 60.0,
        };
        target.min(context.max_refresh_rate())
    }
}

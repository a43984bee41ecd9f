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

//! Provides abstractions over platform-specific functionalities.
//!
//! The core never talks to the operating system directly. Production wiring
//! binds real OS notifications and sensors to the ports defined here, and tests
//! inject synthetic values through the same ports.

use crate::control::Profile;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Represents the thermal state of the device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum ThermalState {
    /// Device is within normal operating temperature.
    #[default]
    Nominal,
    /// Device is warm but not yet impacting performance.
    Fair,
    /// Device is hot; the system is reducing performance to shed heat.
    Serious,
    /// Device is at critical temperature, emergency measures required.
    Critical,
}

/// A signal raised by the host platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlatformSignal {
    /// The OS reported a new thermal state.
    ThermalStateChanged(ThermalState),
    /// Low-power mode was switched on (`true`) or off (`false`).
    LowPowerModeChanged(bool),
    /// The OS reported that the process is running low on memory.
    LowMemory,
}

/// One reading of the system-level gauges the monitor cannot derive itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemSample {
    /// Process memory footprint, in megabytes.
    pub memory_usage_mb: f64,
    /// Process CPU usage, in percent.
    pub cpu_percent: f64,
    /// Battery charge from 0.0 to 1.0.
    pub battery_level: f32,
}

impl Default for SystemSample {
    fn default() -> Self {
        Self {
            memory_usage_mb: 0.0,
            cpu_percent: 0.0,
            battery_level: 1.0,
        }
    }
}

/// Trait for observing the physical state of the host platform.
pub trait SystemProbe: Send + Sync {
    /// Reads the current memory, CPU and battery gauges.
    fn sample(&self) -> SystemSample;

    /// Returns the current thermal state, for platforms that poll rather than notify.
    fn thermal_state(&self) -> ThermalState {
        ThermalState::Nominal
    }
}

/// Coarse performance class of the device's SoC/GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    /// Older or entry-level hardware.
    Low,
    /// Mainstream hardware.
    #[default]
    Mid,
    /// Flagship hardware.
    High,
}

/// Static description of the device, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// The highest refresh rate the display can negotiate, in Hz.
    pub max_refresh_rate: u32,
    /// Performance class of the SoC/GPU.
    pub tier: DeviceTier,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_refresh_rate: 60,
            tier: DeviceTier::Mid,
        }
    }
}

impl DeviceCapabilities {
    /// Selects the profile the application should start with.
    ///
    /// | Device | Profile |
    /// |---|---|
    /// | High tier, ≥ 120 Hz panel | performance |
    /// | Low tier | efficiency |
    /// | Anything else | balanced |
    pub fn initial_profile(&self) -> Profile {
        match self.tier {
            DeviceTier::High if self.max_refresh_rate >= 120 => Profile::Performance,
            DeviceTier::Low => Profile::Efficiency,
            _ => Profile::Balanced,
        }
    }
}

/// A bounded window during which work may continue while the app is backgrounded.
#[derive(Debug, PartialEq, Eq)]
pub struct BackgroundGrant {
    id: u64,
    deadline: Option<Instant>,
}

static NEXT_GRANT_ID: AtomicU64 = AtomicU64::new(1);

impl BackgroundGrant {
    /// A grant that never expires.
    pub fn unbounded() -> Self {
        Self {
            id: NEXT_GRANT_ID.fetch_add(1, Ordering::Relaxed),
            deadline: None,
        }
    }

    /// A grant that expires at `deadline`.
    pub fn until(deadline: Instant) -> Self {
        Self {
            id: NEXT_GRANT_ID.fetch_add(1, Ordering::Relaxed),
            deadline: Some(deadline),
        }
    }

    /// Unique identifier of this grant.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The instant at which the platform will reclaim the window, if bounded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once `now` has reached the deadline.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Port through which cleanup work requests background-execution time.
pub trait BackgroundExecution: Send + Sync {
    /// Requests a window for the named task.
    fn begin(&self, task_name: &str) -> BackgroundGrant;

    /// Returns a window to the platform. Called even after expiry.
    fn end(&self, grant: BackgroundGrant);
}

/// A [`BackgroundExecution`] for processes that are always in the foreground.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForegroundExecution;

impl BackgroundExecution for ForegroundExecution {
    fn begin(&self, task_name: &str) -> BackgroundGrant {
        log::trace!("Foreground grant for '{task_name}'.");
        BackgroundGrant::unbounded()
    }

    fn end(&self, _grant: BackgroundGrant) {}
}

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

//! Snapshots, trends and the polled metrics surfaces.

use crate::control::{Profile, WarningLevel};
use crate::platform::ThermalState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// A point-in-time record of performance and memory gauges.
///
/// Snapshots are immutable once recorded and expire by ring-buffer overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    /// When the snapshot was taken. Not serialized; instants are process-local.
    #[serde(skip)]
    pub timestamp: Instant,
    /// Frame rate over the last completed measurement window, in Hz.
    pub frame_rate: f64,
    /// Number of mounted visual effects.
    pub effect_count: u32,
    /// Process memory footprint, in megabytes.
    pub memory_usage_mb: f64,
    /// Process CPU usage, in percent.
    pub cpu_percent: f64,
    /// Device thermal state.
    pub thermal_state: ThermalState,
    /// Battery charge from 0.0 to 1.0.
    pub battery_level: f32,
}

/// Direction of frame-rate health over recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    /// Frame rate is rising.
    Improving,
    /// No significant change.
    #[default]
    Stable,
    /// Frame rate is falling.
    Declining,
}

/// Direction of memory usage over recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    /// Usage is growing.
    Increasing,
    /// No significant change.
    #[default]
    Stable,
    /// Usage is shrinking.
    Decreasing,
}

/// Polled view of the performance monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Frame rate over the last completed window, in Hz.
    pub frame_rate: f64,
    /// Number of mounted visual effects.
    pub effect_count: u32,
    /// Process memory footprint, in megabytes.
    pub memory_usage_mb: f64,
    /// Process CPU usage, in percent.
    pub cpu_percent: f64,
    /// Device thermal state.
    pub thermal_state: ThermalState,
    /// Battery charge from 0.0 to 1.0.
    pub battery_level: f32,
    /// `true` if the last evaluation found every gauge within the profile's limits.
    pub is_performant: bool,
    /// The active profile.
    pub profile: Profile,
    /// Frame-rate trend over recent snapshots.
    pub trend: PerformanceTrend,
}

/// Occupancy of one managed object pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolCounts {
    /// Idle objects ready for reuse.
    pub free: usize,
    /// Objects currently handed out.
    pub active: usize,
}

/// Polled view of the resource manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMetrics {
    /// Latest memory reading, in megabytes.
    pub current_usage_mb: f64,
    /// Current whole-app warning level.
    pub warning_level: WarningLevel,
    /// Occupancy of every managed pool, keyed by pool name.
    pub pooled_counts: BTreeMap<String, PoolCounts>,
    /// Bytes held by the image cache.
    pub cache_size_bytes: usize,
    /// Memory trend over recent samples.
    pub trend: MemoryTrend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_metrics_serialize_with_lowercase_enums() {
        let mut pooled_counts = BTreeMap::new();
        pooled_counts.insert("particles".to_string(), PoolCounts { free: 3, active: 1 });
        let metrics = MemoryMetrics {
            current_usage_mb: 512.0,
            warning_level: WarningLevel::Warning,
            pooled_counts,
            cache_size_bytes: 1024,
            trend: MemoryTrend::Increasing,
        };

        let json = serde_json::to_value(&metrics).expect("metrics should serialize");
        assert_eq!(json["warning_level"], "warning");
        assert_eq!(json["trend"], "increasing");
        assert_eq!(json["pooled_counts"]["particles"]["free"], 3);
    }

    #[test]
    fn test_snapshot_serialization_skips_timestamp() {
        let snapshot = Snapshot {
            timestamp: Instant::now(),
            frame_rate: 60.0,
            effect_count: 4,
            memory_usage_mb: 100.0,
            cpu_percent: 12.5,
            thermal_state: ThermalState::Fair,
            battery_level: 0.5,
        };
        let json = serde_json::to_value(snapshot).expect("snapshot should serialize");
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["thermal_state"], "fair");
    }
}

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

//! Trend analysis over snapshot history.
//!
//! Trends are never stored: they are recomputed on demand by comparing the
//! mean of the newest window of samples against the mean of the oldest window.

use crate::metrics::RingBuffer;
use reflex_core::telemetry::{MemoryTrend, PerformanceTrend, Snapshot};

/// Number of samples averaged at each end of the history.
pub const TREND_WINDOW: usize = 10;
/// Memory shift (MB) beyond which usage is considered to be moving.
pub const MEMORY_TREND_DELTA_MB: f64 = 50.0;
/// Frame-rate shift (Hz) beyond which performance is considered to be moving.
pub const FRAME_RATE_TREND_DELTA: f64 = 5.0;

/// Parameters for a mean-shift trend classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    /// Samples averaged at each end.
    pub window: usize,
    /// Absolute shift required to leave `Stable`.
    pub delta: f64,
}

impl TrendConfig {
    /// The standard memory trend parameters (10 samples, 50 MB).
    pub const MEMORY: TrendConfig = TrendConfig {
        window: TREND_WINDOW,
        delta: MEMORY_TREND_DELTA_MB,
    };

    /// The standard frame-rate trend parameters (10 samples, 5 Hz).
    pub const FRAME_RATE: TrendConfig = TrendConfig {
        window: TREND_WINDOW,
        delta: FRAME_RATE_TREND_DELTA,
    };
}

/// Classifies memory usage history.
pub fn memory_trend<T: Copy, const N: usize>(
    history: &RingBuffer<T, N>,
    config: TrendConfig,
    usage_mb: impl Fn(&T) -> f64,
) -> MemoryTrend {
    let shift = history.window_shift(config.window, usage_mb);
    if shift >= config.delta {
        MemoryTrend::Increasing
    } else if shift <= -config.delta {
        MemoryTrend::Decreasing
    } else {
        MemoryTrend::Stable
    }
}

/// Classifies frame-rate history. A rising frame rate is an improvement.
pub fn performance_trend<const N: usize>(
    history: &RingBuffer<Snapshot, N>,
    config: TrendConfig,
) -> PerformanceTrend {
    let shift = history.window_shift(config.window, |snapshot| snapshot.frame_rate);
    if shift >= config.delta {
        PerformanceTrend::Improving
    } else if shift <= -config.delta {
        PerformanceTrend::Declining
    } else {
        PerformanceTrend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_core::platform::ThermalState;
    use std::time::Instant;

    fn usage_history(values: impl IntoIterator<Item = f64>) -> RingBuffer<f64, 100> {
        let mut history = RingBuffer::new();
        for v in values {
            history.push(v);
        }
        history
    }

    fn frame_history(rates: impl IntoIterator<Item = f64>) -> RingBuffer<Snapshot, 60> {
        let now = Instant::now();
        let mut history = RingBuffer::new();
        for frame_rate in rates {
            history.push(Snapshot {
                timestamp: now,
                frame_rate,
                effect_count: 0,
                memory_usage_mb: 0.0,
                cpu_percent: 0.0,
                thermal_state: ThermalState::Nominal,
                battery_level: 1.0,
            });
        }
        history
    }

    #[test]
    fn test_memory_trend_decreasing() {
        let values = (0..10).map(|_| 700.0).chain((0..10).map(|_| 640.0));
        let trend = memory_trend(&usage_history(values), TrendConfig::MEMORY, |v| *v);
        assert_eq!(trend, MemoryTrend::Decreasing);
    }

    #[test]
    fn test_memory_trend_increasing() {
        let values = (0..10).map(|_| 300.0).chain((0..10).map(|_| 360.0));
        let trend = memory_trend(&usage_history(values), TrendConfig::MEMORY, |v| *v);
        assert_eq!(trend, MemoryTrend::Increasing);
    }

    #[test]
    fn test_memory_trend_flat_and_small_moves_are_stable() {
        let flat = usage_history((0..30).map(|_| 420.0));
        assert_eq!(
            memory_trend(&flat, TrendConfig::MEMORY, |v| *v),
            MemoryTrend::Stable
        );

        let drift = (0..10).map(|_| 400.0).chain((0..10).map(|_| 449.0));
        assert_eq!(
            memory_trend(&usage_history(drift), TrendConfig::MEMORY, |v| *v),
            MemoryTrend::Stable
        );
    }

    #[test]
    fn test_memory_trend_empty_history_is_stable() {
        let empty = usage_history(std::iter::empty());
        assert_eq!(
            memory_trend(&empty, TrendConfig::MEMORY, |v| *v),
            MemoryTrend::Stable
        );
    }

    #[test]
    fn test_performance_trend_directions() {
        let declining = (0..10).map(|_| 120.0).chain((0..10).map(|_| 60.0));
        assert_eq!(
            performance_trend(&frame_history(declining), TrendConfig::FRAME_RATE),
            PerformanceTrend::Declining
        );

        let improving = (0..10).map(|_| 30.0).chain((0..10).map(|_| 60.0));
        assert_eq!(
            performance_trend(&frame_history(improving), TrendConfig::FRAME_RATE),
            PerformanceTrend::Improving
        );

        let steady = (0..20).map(|_| 60.0);
        assert_eq!(
            performance_trend(&frame_history(steady), TrendConfig::FRAME_RATE),
            PerformanceTrend::Stable
        );
    }

    #[test]
    fn test_memory_trend_at_exact_delta() {
        let falling = (0..10).map(|_| 600.0).chain((0..10).map(|_| 550.0));
        assert_eq!(
            memory_trend(&usage_history(falling), TrendConfig::MEMORY, |v| *v),
            MemoryTrend::Decreasing
        );

        let rising = (0..10).map(|_| 550.0).chain((0..10).map(|_| 600.0));
        assert_eq!(
            memory_trend(&usage_history(rising), TrendConfig::MEMORY, |v| *v),
            MemoryTrend::Increasing
        );
    }

    #[test]
    fn test_performance_trend_at_exact_delta() {
        let slower = (0..10).map(|_| 60.0).chain((0..10).map(|_| 55.0));
        assert_eq!(
            performance_trend(&frame_history(slower), TrendConfig::FRAME_RATE),
            PerformanceTrend::Declining
        );

        let faster = (0..10).map(|_| 55.0).chain((0..10).map(|_| 60.0));
        assert_eq!(
            performance_trend(&frame_history(faster), TrendConfig::FRAME_RATE),
            PerformanceTrend::Improving
        );
    }
}

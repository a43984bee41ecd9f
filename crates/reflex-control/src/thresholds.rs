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

//! Profile → threshold lookup.

use reflex_core::control::{Profile, Thresholds};

/// Pure mapping from [`Profile`] to its fixed [`Thresholds`].
///
/// | Profile | max effects | min FPS | max memory (MB) | max CPU (%) |
/// |---|---|---|---|---|
/// | performance | 50 | 90 | 800 | 80 |
/// | balanced | 30 | 60 | 500 | 60 |
/// | efficiency | 15 | 30 | 300 | 40 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdTable {
    performance: Thresholds,
    balanced: Thresholds,
    efficiency: Thresholds,
}

impl ThresholdTable {
    /// Builds the table with the standard tuples.
    pub const fn new() -> Self {
        Self {
            performance: Thresholds {
                max_effect_count: 50,
                min_frame_rate: 90.0,
                max_memory_usage_mb: 800.0,
                max_cpu_percent: 80.0,
            },
            balanced: Thresholds {
                max_effect_count: 30,
                min_frame_rate: 60.0,
                max_memory_usage_mb: 500.0,
                max_cpu_percent: 60.0,
            },
            efficiency: Thresholds {
                max_effect_count: 15,
                min_frame_rate: 30.0,
                max_memory_usage_mb: 300.0,
                max_cpu_percent: 40.0,
            },
        }
    }

    /// Returns the thresholds for `profile`.
    pub fn get(&self, profile: Profile) -> Thresholds {
        match profile {
            Profile::Performance => self.performance,
            Profile::Balanced => self.balanced,
            Profile::Efficiency => self.efficiency,
        }
    }

    /// Looks a profile up by name, falling back to `balanced` for unknown names.
    pub fn get_by_name(&self, name: &str) -> Thresholds {
        let profile = Profile::from_name(name).unwrap_or_else(|| {
            log::warn!("Unknown profile '{name}', falling back to balanced thresholds.");
            Profile::Balanced
        });
        self.get(profile)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(t: Thresholds) -> (u32, f64, f64, f64) {
        (
            t.max_effect_count,
            t.min_frame_rate,
            t.max_memory_usage_mb,
            t.max_cpu_percent,
        )
    }

    #[test]
    fn test_table_matches_reference_tuples() {
        let table = ThresholdTable::new();
        assert_eq!(tuple(table.get(Profile::Performance)), (50, 90.0, 800.0, 80.0));
        assert_eq!(tuple(table.get(Profile::Balanced)), (30, 60.0, 500.0, 60.0));
        assert_eq!(tuple(table.get(Profile::Efficiency)), (15, 30.0, 300.0, 40.0));
    }

    #[test]
    fn test_lookup_by_name() {
        let table = ThresholdTable::default();
        assert_eq!(table.get_by_name("efficiency"), table.get(Profile::Efficiency));
        assert_eq!(table.get_by_name("PERFORMANCE"), table.get(Profile::Performance));
    }

    #[test]
    fn test_unknown_profile_falls_back_to_balanced() {
        let table = ThresholdTable::default();
        assert_eq!(table.get_by_name("turbo"), table.get(Profile::Balanced));
        assert_eq!(table.get_by_name(""), table.get(Profile::Balanced));
    }
}

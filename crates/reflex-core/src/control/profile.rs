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

//! Performance profiles, their threshold tuples, and the memory warning ladder.

use serde::{Deserialize, Serialize};

/// A named bundle of performance thresholds.
///
/// Exactly one profile is active at a time. The variant order runs from the
/// most demanding to the most conservative profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Full visual fidelity, high refresh rate.
    Performance,
    /// The default trade-off between fidelity and power.
    #[default]
    Balanced,
    /// Minimum effect density and refresh rate.
    Efficiency,
}

impl Profile {
    /// All profiles, from most demanding to most conservative.
    pub const ALL: [Profile; 3] = [Profile::Performance, Profile::Balanced, Profile::Efficiency];

    /// Parses a profile from its lowercase name. Case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "performance" => Some(Profile::Performance),
            "balanced" => Some(Profile::Balanced),
            "efficiency" => Some(Profile::Efficiency),
            _ => None,
        }
    }

    /// Returns the lowercase name of the profile.
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Performance => "performance",
            Profile::Balanced => "balanced",
            Profile::Efficiency => "efficiency",
        }
    }

    /// Returns `true` if `self` consumes strictly fewer resources than `other`.
    pub fn is_more_conservative_than(self, other: Profile) -> bool {
        self > other
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric limits associated with a [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Maximum number of simultaneously mounted visual effects.
    pub max_effect_count: u32,
    /// Minimum acceptable frame rate, in Hz.
    pub min_frame_rate: f64,
    /// Maximum process memory footprint, in megabytes.
    pub max_memory_usage_mb: f64,
    /// Maximum CPU usage, in percent.
    pub max_cpu_percent: f64,
}

/// Tri-state whole-application memory pressure indicator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    /// Usage below the warning threshold.
    #[default]
    Normal = 0,
    /// Usage at or above the warning threshold.
    Warning = 1,
    /// Usage at or above the critical threshold.
    Critical = 2,
}

impl WarningLevel {
    /// Classifies a memory figure against absolute warning and critical bounds.
    ///
    /// Both bounds are inclusive: a usage exactly equal to `critical_mb` is
    /// `Critical`.
    pub fn from_usage(usage_mb: f64, warning_mb: f64, critical_mb: f64) -> Self {
        if usage_mb >= critical_mb {
            WarningLevel::Critical
        } else if usage_mb >= warning_mb {
            WarningLevel::Warning
        } else {
            WarningLevel::Normal
        }
    }
}

impl std::fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WarningLevel::Normal => "normal",
            WarningLevel::Warning => "warning",
            WarningLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names_round_trip() {
        for profile in Profile::ALL {
            assert_eq!(Profile::from_name(profile.name()), Some(profile));
        }
        assert_eq!(Profile::from_name("  Efficiency "), Some(Profile::Efficiency));
        assert_eq!(Profile::from_name("turbo"), None);
    }

    #[test]
    fn test_profile_conservativeness_ordering() {
        assert!(Profile::Efficiency.is_more_conservative_than(Profile::Balanced));
        assert!(Profile::Balanced.is_more_conservative_than(Profile::Performance));
        assert!(!Profile::Balanced.is_more_conservative_than(Profile::Balanced));
        assert!(!Profile::Performance.is_more_conservative_than(Profile::Efficiency));
    }

    #[test]
    fn test_warning_level_boundaries() {
        let level = |mb| WarningLevel::from_usage(mb, 500.0, 800.0);
        assert_eq!(level(499.9), WarningLevel::Normal);
        assert_eq!(level(500.0), WarningLevel::Warning);
        assert_eq!(level(799.9), WarningLevel::Warning);
        assert_eq!(level(800.0), WarningLevel::Critical);
    }

    #[test]
    fn test_warning_level_is_totally_ordered() {
        assert!(WarningLevel::Normal < WarningLevel::Warning);
        assert!(WarningLevel::Warning < WarningLevel::Critical);
        assert_eq!(WarningLevel::Critical as u8, 2);
    }
}

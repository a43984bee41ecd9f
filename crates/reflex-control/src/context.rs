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

//! Device context observed by the performance monitor.

use reflex_core::control::Profile;
use reflex_core::platform::{DeviceCapabilities, ThermalState};

/// The device-level state that drives profile selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceContext {
    /// Static description of the device.
    pub capabilities: DeviceCapabilities,
    /// Last reported thermal state.
    pub thermal: ThermalState,
    /// Whether the OS low-power mode is on.
    pub low_power: bool,
    /// The active profile.
    pub profile: Profile,
}

impl DeviceContext {
    /// Creates a context whose profile is chosen from the device's capabilities.
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            thermal: ThermalState::Nominal,
            low_power: false,
            profile: capabilities.initial_profile(),
        }
    }

    /// Records a thermal change and returns the profile it forced, if any.
    ///
    /// Downgrades are one-directional: a cooler device never upgrades the profile.
    ///
    /// | Thermal | Profile floor |
    /// |---|---|
    /// | nominal, fair | none |
    /// | serious | balanced |
    /// | critical | efficiency |
    pub fn apply_thermal(&mut self, state: ThermalState) -> Option<Profile> {
        self.thermal = state;
        let floor = match state {
            ThermalState::Critical => Profile::Efficiency,
            ThermalState::Serious => Profile::Balanced,
            ThermalState::Nominal | ThermalState::Fair => return None,
        };
        self.downgrade_to(floor)
    }

    /// Records a low-power mode change and returns the profile it forced, if any.
    pub fn apply_low_power(&mut self, enabled: bool) -> Option<Profile> {
        self.low_power = enabled;
        if enabled {
            self.downgrade_to(Profile::Efficiency)
        } else {
            None
        }
    }

    /// The highest refresh rate the display supports, in Hz.
    pub fn max_refresh_rate(&self) -> f64 {
        f64::from(self.capabilities.max_refresh_rate)
    }

    fn downgrade_to(&mut self, floor: Profile) -> Option<Profile> {
        if floor.is_more_conservative_than(self.profile) {
            self.profile = floor;
            Some(floor)
        } else {
            None
        }
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new(DeviceCapabilities::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_core::platform::DeviceTier;

    fn flagship() -> DeviceContext {
        DeviceContext::new(DeviceCapabilities {
            max_refresh_rate: 120,
            tier: DeviceTier::High,
        })
    }

    #[test]
    fn test_initial_profile_from_device() {
        assert_eq!(flagship().profile, Profile::Performance);
        assert_eq!(DeviceContext::default().profile, Profile::Balanced);
    }

    #[test]
    fn test_serious_thermal_downgrades_to_balanced() {
        let mut ctx = flagship();
        assert_eq!(ctx.apply_thermal(ThermalState::Serious), Some(Profile::Balanced));
        assert_eq!(ctx.profile, Profile::Balanced);
    }

    #[test]
    fn test_critical_thermal_downgrades_to_efficiency() {
        let mut ctx = flagship();
        assert_eq!(
            ctx.apply_thermal(ThermalState::Critical),
            Some(Profile::Efficiency)
        );
        assert_eq!(ctx.thermal, ThermalState::Critical);
    }

    #[test]
    fn test_serious_never_raises_an_efficiency_profile() {
        let mut ctx = flagship();
        ctx.apply_low_power(true);
        assert_eq!(ctx.apply_thermal(ThermalState::Serious), None);
        assert_eq!(ctx.profile, Profile::Efficiency);
    }

    #[test]
    fn test_cooling_down_does_not_upgrade() {
        let mut ctx = flagship();
        ctx.apply_thermal(ThermalState::Critical);
        assert_eq!(ctx.apply_thermal(ThermalState::Nominal), None);
        assert_eq!(ctx.profile, Profile::Efficiency);
    }

    #[test]
    fn test_low_power_toggle() {
        let mut ctx = flagship();
        assert_eq!(ctx.apply_low_power(true), Some(Profile::Efficiency));
        assert_eq!(ctx.apply_low_power(false), None);
        assert!(!ctx.low_power);
        assert_eq!(ctx.profile, Profile::Efficiency);
    }
}

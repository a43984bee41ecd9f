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

//! sysinfo-based implementation of the SystemProbe trait.

use reflex_core::platform::{SystemProbe, SystemSample, ThermalState};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Components, Pid, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A system probe that uses the `sysinfo` crate.
///
/// Memory is the resident size of the current process. Battery level is not
/// exposed by sysinfo and is always reported as full.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    /// Creates a new SysinfoProbe for the current process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("SysinfoProbe: cannot resolve own pid ({e}), memory reads as 0.");
                None
            }
        };

        let mut system = System::new();
        // CPU usage is a delta between two refreshes.
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
            pid,
        }
    }
}

impl SystemProbe for SysinfoProbe {
    fn sample(&self) -> SystemSample {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();

        let memory_usage_mb = match self.pid {
            Some(pid) => {
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                system
                    .process(pid)
                    .map_or(0.0, |process| process.memory() as f64 / BYTES_PER_MB)
            }
            None => 0.0,
        };

        SystemSample {
            memory_usage_mb,
            cpu_percent: f64::from(system.global_cpu_usage()),
            battery_level: 1.0,
        }
    }

    fn thermal_state(&self) -> ThermalState {
        let components = Components::new_with_refreshed_list();
        let mut hottest: Option<f32> = None;

        for component in &components {
            let label = component.label().to_lowercase();
            if label.contains("cpu") || label.contains("core") {
                if let Some(temp) = component.temperature() {
                    hottest = Some(hottest.map_or(temp, |max| max.max(temp)));
                }
            }
        }

        classify_temperature(hottest)
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps the hottest CPU sensor reading to a thermal state.
///
/// No reading means no sensor is exposed, which is treated as nominal.
pub fn classify_temperature(celsius: Option<f32>) -> ThermalState {
    match celsius {
        Some(t) if t > 90.0 => ThermalState::Critical,
        Some(t) if t > 80.0 => ThermalState::Serious,
        Some(t) if t > 60.0 => ThermalState::Fair,
        _ => ThermalState::Nominal,
    }
}

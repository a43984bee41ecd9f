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

//! The typed event catalog published by the resource core.

use crate::control::WarningLevel;
use serde::Serialize;

/// A notification emitted by the monitor or the resource manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceEvent {
    /// Effect density or device pressure exceeded the active profile's limits.
    OptimizeEffects {
        /// Number of visual effects mounted when pressure was detected.
        effect_count: u32,
        /// Frame rate measured when pressure was detected.
        frame_rate: f64,
    },
    /// The whole-app memory warning level changed.
    MemoryWarningChanged {
        /// The new level.
        level: WarningLevel,
        /// Memory usage that produced the new level, in megabytes.
        usage_mb: f64,
    },
    /// A cleanup pass for the given level finished.
    MemoryCleanupCompleted {
        /// The level the pass was run for.
        level: WarningLevel,
    },
    /// Periodic hook for external subsystems to flush their own soft state.
    RoutineCleanupTick,
}

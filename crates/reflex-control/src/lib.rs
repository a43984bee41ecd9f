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

//! # Reflex Control
//!
//! The control loop of the resource core: the performance monitor, the
//! profile threshold table, trend analysis over snapshot history, memory
//! cleanup coordination and the [`ResourceManager`] that ties them together.

#![warn(missing_docs)]

pub mod analysis;
pub mod cleanup;
pub mod context;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod service;
pub mod thresholds;

pub use cleanup::{CleanupCoordinator, CleanupProgress, CleanupStep, ReliefConfig};
pub use context::DeviceContext;
pub use metrics::RingBuffer;
pub use monitor::{MonitorConfig, PerformanceMonitor};
pub use registry::PoolRegistry;
pub use service::{ManagerConfig, ManagerPorts, ResourceManager};
pub use thresholds::ThresholdTable;

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

//! Provides the foundational data structures for resource telemetry.
//!
//! This module defines the "common language" the core uses to describe what it
//! measured and what it decided. `reflex-control` produces these values, and
//! the view layer or a telemetry sink consumes them.

pub mod event;
pub mod metrics;

pub use self::event::ResourceEvent;
pub use self::metrics::{
    MemoryMetrics, MemoryTrend, PerformanceMetrics, PerformanceTrend, PoolCounts, Snapshot,
};

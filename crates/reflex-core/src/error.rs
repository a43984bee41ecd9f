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

//! Error types for the resource core.

use std::fmt;

/// An error raised while wiring up or operating the resource core.
///
/// Runtime pressure is never an error; these cover setup mistakes and
/// platform failures only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A pool with the same name is already registered.
    DuplicatePool {
        /// The conflicting pool name.
        name: String,
    },
    /// A background worker thread could not be started.
    WorkerSpawn {
        /// The OS-level reason.
        reason: String,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::DuplicatePool { name } => {
                write!(f, "An object pool named '{name}' is already registered")
            }
            ResourceError::WorkerSpawn { reason } => {
                write!(f, "Failed to spawn background worker: {reason}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// A convenience alias for results produced by the resource core.
pub type ResourceResult<T> = Result<T, ResourceError>;

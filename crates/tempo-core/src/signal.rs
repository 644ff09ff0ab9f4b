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

//! External signals pushed into the engine by the host.

use serde::{Deserialize, Serialize};

/// A periodic memory pressure observation.
///
/// Deltas are measured since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PressureSample {
    /// Used heap divided by maximum heap, in `[0, 1]`.
    pub heap_ratio: f64,
    /// Time spent collecting since the last sample, in milliseconds.
    pub gc_time_delta_ms: f64,
    /// Number of collections since the last sample.
    pub gc_count_delta: u64,
}

impl PressureSample {
    /// Creates a sample.
    pub fn new(heap_ratio: f64, gc_time_delta_ms: f64, gc_count_delta: u64) -> Self {
        Self {
            heap_ratio,
            gc_time_delta_ms,
            gc_count_delta,
        }
    }

    /// Whether at least one collection happened since the last sample.
    pub fn gc_occurred(&self) -> bool {
        self.gc_count_delta > 0
    }
}

/// What a save event is persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveKind {
    /// A full world save.
    World,
    /// Player data only.
    Player,
    /// Anything else the host wants to announce.
    Other,
}

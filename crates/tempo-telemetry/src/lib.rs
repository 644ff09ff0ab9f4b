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

//! # Tempo Telemetry
//!
//! Counters written by the tick thread and read, without locking, by any
//! reporting thread. Everything here is `Relaxed` atomics: the numbers are
//! for humans and dashboards, never for control decisions.

#![warn(missing_docs)]

pub mod counters;
pub mod histogram;
pub mod logging;
pub mod reasons;
pub mod service;

pub use counters::{GovernanceCounters, TelemetrySnapshot};
pub use histogram::TickHistogram;
pub use logging::init_logging;
pub use reasons::ReasonStats;
pub use service::TelemetryService;

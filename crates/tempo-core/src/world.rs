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

//! The capability interface through which the engine looks at the host world.
//!
//! The governance core never touches concrete host types. The integration
//! layer implements [`WorldQuery`] and hands it to the orchestrator.

use thiserror::Error;

/// Opaque identifier of a host object subject to elastic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Combat engagement flags of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Engagement {
    /// The object is attacking right now.
    pub attacking: bool,
    /// The object has a current target.
    pub has_target: bool,
    /// The object fought recently.
    pub recently_engaged: bool,
}

impl Engagement {
    /// Not engaged at all.
    pub const IDLE: Engagement = Engagement {
        attacking: false,
        has_target: false,
        recently_engaged: false,
    };

    /// Whether any engagement flag is set. Engaged objects always run at full rate.
    pub fn is_engaged(&self) -> bool {
        self.attacking || self.has_target || self.recently_engaged
    }
}

/// A failed host query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("world query failed for {what}: {message}")]
pub struct QueryError {
    /// Which query failed.
    pub what: &'static str,
    /// Host-provided detail.
    pub message: String,
}

impl QueryError {
    /// Creates a query error.
    pub fn new(what: &'static str, message: impl Into<String>) -> Self {
        Self {
            what,
            message: message.into(),
        }
    }
}

/// Host-provided view of the world.
pub trait WorldQuery: Send {
    /// Squared distance from `object` to the nearest actor that matters
    /// (usually a player).
    fn distance_squared_to_nearest_actor(&self, object: ObjectId) -> Result<f64, QueryError>;

    /// Combat engagement flags of `object`.
    fn engagement(&self, object: ObjectId) -> Result<Engagement, QueryError>;

    /// Speed of the fastest observer, in world units per second.
    ///
    /// Used by the streaming guard. Hosts without streaming keep the default.
    fn observer_speed(&self) -> Result<f64, QueryError> {
        Ok(0.0)
    }

    /// Speed in km/h of the vehicle the observer rides, or `None` when the
    /// observer is not seated in one.
    ///
    /// Used by the vehicle guard. Hosts without vehicles keep the default.
    fn observer_vehicle_speed_kmh(&self) -> Result<Option<f64>, QueryError> {
        Ok(None)
    }
}

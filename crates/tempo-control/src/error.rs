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

//! Internal faults of governance evaluators.
//!
//! These never leave the crate through the orchestrator: each one is counted
//! against an error budget and converted into "do not intervene".

use tempo_core::QueryError;
use thiserror::Error;

/// A fault inside a governance component.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GovernanceError {
    /// An input sample was non-finite or out of range.
    #[error("invalid {what} sample: {value}")]
    InvalidSample {
        /// Which input.
        what: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// A host world query failed.
    #[error(transparent)]
    WorldQuery(#[from] QueryError),
    /// A component reached a state it cannot be in.
    #[error("{component}: invalid state: {detail}")]
    InvalidState {
        /// Component name.
        component: &'static str,
        /// What broke.
        detail: String,
    },
    /// A fault injected by the host, typically from a test harness.
    #[error("injected fault: {0}")]
    Injected(String),
}

/// Shorthand for results of governance evaluators.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Rejects non-finite and negative values.
pub(crate) fn check_non_negative(what: &'static str, value: f64) -> GovernanceResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(GovernanceError::InvalidSample { what, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_non_negative() {
        assert_eq!(check_non_negative("duration", 3.5), Ok(3.5));
        assert!(check_non_negative("duration", -1.0).is_err());
        assert!(check_non_negative("duration", f64::NAN).is_err());
        assert!(check_non_negative("duration", f64::INFINITY).is_err());
    }

    #[test]
    fn test_query_error_is_transparent() {
        let err: GovernanceError = QueryError::new("distance", "entity unloaded").into();
        assert_eq!(
            err.to_string(),
            "world query failed for distance: entity unloaded"
        );
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::SegError;

/// Per-trajectory resource budgets.
///
/// All limits are optional; `None` means unbounded.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Wall-clock budget for the whole pipeline of one trajectory.
    pub time_budget_ms: Option<u64>,
    /// Upper bound on the bytes held by the cost matrix and DP tables.
    pub memory_budget_bytes: Option<usize>,
    /// Trajectories longer than this are rejected up front.
    pub max_points: Option<usize>,
}

impl Constraints {
    pub fn validate(&self) -> Result<(), SegError> {
        if self.time_budget_ms == Some(0) {
            return Err(SegError::invalid_input(
                "constraints.time_budget_ms must be >= 1 when set",
            ));
        }
        if self.memory_budget_bytes == Some(0) {
            return Err(SegError::invalid_input(
                "constraints.memory_budget_bytes must be >= 1 when set",
            ));
        }
        if let Some(max_points) = self.max_points
            && max_points < crate::MIN_SEGMENT_LEN
        {
            return Err(SegError::invalid_input(format!(
                "constraints.max_points must be >= {}; got {max_points}",
                crate::MIN_SEGMENT_LEN
            )));
        }
        Ok(())
    }

    /// Rejects trajectories larger than `max_points`.
    pub fn check_size(&self, n: usize) -> Result<(), SegError> {
        if let Some(limit) = self.max_points
            && n > limit
        {
            return Err(SegError::resource_limit(format!(
                "constraints.max_points exceeded: n={n}, limit={limit}"
            )));
        }
        Ok(())
    }

    /// Rejects an allocation plan larger than `memory_budget_bytes`.
    pub fn check_memory(&self, what: &str, required_bytes: usize) -> Result<(), SegError> {
        if let Some(limit_bytes) = self.memory_budget_bytes
            && required_bytes > limit_bytes
        {
            return Err(SegError::resource_limit(format!(
                "constraints.memory_budget_bytes exceeded for {what}: required_bytes={required_bytes}, limit_bytes={limit_bytes}"
            )));
        }
        Ok(())
    }
}

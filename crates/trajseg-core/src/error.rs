// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors produced while validating or segmenting a trajectory.
///
/// Every failure is scoped to the trajectory being processed; callers running a
/// batch keep going with the remaining trajectories.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum SegError {
    /// Structurally invalid trajectory or configuration.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Not enough points to evaluate any segmentation.
    #[error("insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },
    /// A non-finite value showed up where a finite objective was required.
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    /// A per-trajectory time, memory, or size budget was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
    #[error("cancelled")]
    Cancelled,
}

impl SegError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn insufficient_data(needed: usize, got: usize) -> Self {
        Self::InsufficientData { needed, got }
    }

    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Stable snake_case identifier used in machine-readable reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::NumericalIssue(_) => "numerical_issue",
            Self::ResourceLimit(_) => "resource_limit",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SegError;

    #[test]
    fn display_messages_carry_context() {
        assert_eq!(
            SegError::invalid_input("empty trajectory").to_string(),
            "invalid input: empty trajectory"
        );
        assert_eq!(
            SegError::insufficient_data(2, 1).to_string(),
            "insufficient data: need at least 2 points, got 1"
        );
        assert_eq!(
            SegError::resource_limit("time_budget_ms exceeded").to_string(),
            "resource limit exceeded: time_budget_ms exceeded"
        );
        assert_eq!(SegError::cancelled().to_string(), "cancelled");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SegError::invalid_input("x").code(), "invalid_input");
        assert_eq!(SegError::insufficient_data(2, 0).code(), "insufficient_data");
        assert_eq!(SegError::numerical_issue("x").code(), "numerical_issue");
        assert_eq!(SegError::resource_limit("x").code(), "resource_limit");
        assert_eq!(SegError::Cancelled.code(), "cancelled");
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Span costs for trajectory segmentation.
//!
//! Cost models use half-open intervals `[start, end)`. The [`SpanCost`] view
//! consumed by the optimizer uses inclusive spans `[first, last]`, matching
//! the `cost[i][j]` convention of the cost matrix.

pub mod matrix;
pub mod model;
pub mod normal;

pub use matrix::CostMatrix;
pub use model::{CachedCost, CostModel, SpanCost};
pub use normal::{CostNormalMeanVar, NormalCache, SpanStats, gaussian_log_likelihood};

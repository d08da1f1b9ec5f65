// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Core shared types and execution controls for trajseg.

pub mod constraints;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod numerics;
pub mod observability;
pub mod repro;
pub mod trajectory;

pub use constraints::Constraints;
pub use control::{BudgetMode, BudgetStatus, CancelToken};
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics, MdlTrace};
pub use error::SegError;
pub use execution_context::ExecutionContext;
pub use numerics::{prefix_sums, prefix_sums_kahan, prefix_sums_of_squares};
pub use observability::{ProgressSink, TelemetrySink};
pub use repro::ReproMode;
pub use trajectory::{RecordRun, SignalRecord, Trajectory, TrajectoryPoint, group_records};

/// Minimum number of points a single segment may contain.
pub const MIN_SEGMENT_LEN: usize = 2;

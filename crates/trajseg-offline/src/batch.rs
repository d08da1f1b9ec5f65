// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::assembler::SegmentedTrajectory;
use crate::segmenter::Segmenter;
use trajseg_core::{ExecutionContext, SegError, Trajectory};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

fn segment_one(
    segmenter: &Segmenter,
    trajectory: &Trajectory,
    ctx: &ExecutionContext<'_>,
) -> Result<SegmentedTrajectory, SegError> {
    let result = segmenter.segment(trajectory, ctx);
    match &result {
        Ok(segmented) => tracing::info!(
            trajectory = trajectory.id(),
            n = trajectory.len(),
            selected_k = segmented.diagnostics.selected_segments,
            runtime_ms = segmented.diagnostics.runtime_ms.unwrap_or(0),
            "trajectory segmented"
        ),
        Err(err) => tracing::warn!(
            trajectory = trajectory.id(),
            n = trajectory.len(),
            code = err.code(),
            error = %err,
            "trajectory failed"
        ),
    }
    result
}

/// Segments independent trajectories, one result per input in input order.
///
/// A failure is confined to its own trajectory. With `parallel` set (and the
/// `rayon` feature enabled) trajectories run on the current rayon pool.
pub fn segment_batch(
    segmenter: &Segmenter,
    trajectories: &[Trajectory],
    ctx: &ExecutionContext<'_>,
    parallel: bool,
) -> Vec<Result<SegmentedTrajectory, SegError>> {
    #[cfg(feature = "rayon")]
    if parallel {
        return trajectories
            .par_iter()
            .map(|trajectory| segment_one(segmenter, trajectory, ctx))
            .collect();
    }
    #[cfg(not(feature = "rayon"))]
    let _ = parallel;

    trajectories
        .iter()
        .map(|trajectory| segment_one(segmenter, trajectory, ctx))
        .collect()
}

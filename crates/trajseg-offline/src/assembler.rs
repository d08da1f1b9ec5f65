// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::segmentation::Segmentation;
use trajseg_core::{Diagnostics, SegError, Trajectory, TrajectoryPoint};

/// One output point: the input point plus its segment-start flag.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentedPoint {
    pub point: TrajectoryPoint,
    pub segment_start: bool,
}

/// A trajectory annotated with its selected segmentation.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentedTrajectory {
    pub id: String,
    pub points: Vec<SegmentedPoint>,
    pub segmentation: Segmentation,
    pub diagnostics: Diagnostics,
}

impl SegmentedTrajectory {
    pub fn segment_start_flags(&self) -> Vec<bool> {
        self.points.iter().map(|point| point.segment_start).collect()
    }
}

/// Annotates every point of `trajectory` in time order.
///
/// A point is flagged when it starts a segment other than the first; index 0
/// is never flagged.
pub fn assemble(
    trajectory: &Trajectory,
    segmentation: Segmentation,
    diagnostics: Diagnostics,
) -> Result<SegmentedTrajectory, SegError> {
    if trajectory.len() != segmentation.n() {
        return Err(SegError::invalid_input(format!(
            "segmentation covers n={} points but trajectory '{}' has {}",
            segmentation.n(),
            trajectory.id(),
            trajectory.len()
        )));
    }

    let points = trajectory
        .points()
        .iter()
        .enumerate()
        .map(|(idx, point)| SegmentedPoint {
            point: *point,
            segment_start: idx != 0 && segmentation.is_segment_start(idx),
        })
        .collect();

    Ok(SegmentedTrajectory {
        id: trajectory.id().to_string(),
        points,
        segmentation,
        diagnostics,
    })
}

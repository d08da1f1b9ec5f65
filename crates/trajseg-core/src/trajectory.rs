// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::SegError;
use std::collections::HashSet;

/// One time step of a trajectory.
///
/// `signal` is the dissimilarity value that drives segmentation; the
/// positional and kinematic fields are carried through untouched.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectoryPoint {
    pub time_step: i64,
    pub signal: f64,
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    pub acceleration: f64,
    pub heading: f64,
}

impl TrajectoryPoint {
    /// A point with only a time step and signal; kinematics are zero.
    pub fn from_signal(time_step: i64, signal: f64) -> Self {
        Self {
            time_step,
            signal,
            lat: 0.0,
            lng: 0.0,
            speed: 0.0,
            acceleration: 0.0,
            heading: 0.0,
        }
    }
}

/// A validated, immutable trajectory.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    id: String,
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    /// Validates and builds a trajectory.
    ///
    /// Points must be non-empty, strictly increasing by time step, and carry a
    /// finite, non-negative signal.
    pub fn new(id: impl Into<String>, points: Vec<TrajectoryPoint>) -> Result<Self, SegError> {
        let id = id.into();
        if points.is_empty() {
            return Err(SegError::invalid_input(format!(
                "trajectory '{id}' has no points"
            )));
        }

        for (idx, point) in points.iter().enumerate() {
            if !point.signal.is_finite() || point.signal < 0.0 {
                return Err(SegError::invalid_input(format!(
                    "trajectory '{id}' point {idx} has signal={}; expected finite value >= 0",
                    point.signal
                )));
            }
        }

        if let Some(idx) = points
            .windows(2)
            .position(|pair| pair[1].time_step <= pair[0].time_step)
        {
            return Err(SegError::invalid_input(format!(
                "trajectory '{id}' time steps must be strictly increasing: time_step[{}]={} follows time_step[{idx}]={}",
                idx + 1,
                points[idx + 1].time_step,
                points[idx].time_step
            )));
        }

        Ok(Self { id, points })
    }

    /// Builds a trajectory whose time steps are the sample indices.
    pub fn from_signal(id: impl Into<String>, signal: &[f64]) -> Result<Self, SegError> {
        let points = signal
            .iter()
            .enumerate()
            .map(|(idx, &value)| TrajectoryPoint::from_signal(idx as i64, value))
            .collect();
        Self::new(id, points)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The signal sequence in time order.
    pub fn signal(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.signal).collect()
    }
}

/// One input tuple as delivered by the signal-derivation stage.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SignalRecord {
    pub trajectory_id: String,
    pub point: TrajectoryPoint,
}

/// The contiguous records of one trajectory id, not yet validated.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordRun {
    pub trajectory_id: String,
    pub points: Vec<TrajectoryPoint>,
}

impl RecordRun {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Validates the run into a [`Trajectory`].
    pub fn into_trajectory(self) -> Result<Trajectory, SegError> {
        Trajectory::new(self.trajectory_id, self.points)
    }
}

/// Groups an ordered record stream into per-trajectory runs.
///
/// Records of one trajectory must be contiguous; an id that reappears after a
/// different id is rejected rather than silently starting a second trajectory.
/// Point-level validation is left to [`RecordRun::into_trajectory`] so a bad
/// trajectory does not take the rest of the stream down with it.
pub fn group_records<I>(records: I) -> Result<Vec<RecordRun>, SegError>
where
    I: IntoIterator<Item = SignalRecord>,
{
    let mut runs = Vec::new();
    let mut seen = HashSet::new();
    let mut current_id: Option<String> = None;
    let mut current_points = Vec::new();

    for record in records {
        if current_id.as_deref() != Some(record.trajectory_id.as_str()) {
            if let Some(trajectory_id) = current_id.take() {
                runs.push(RecordRun {
                    trajectory_id,
                    points: std::mem::take(&mut current_points),
                });
            }
            if !seen.insert(record.trajectory_id.clone()) {
                return Err(SegError::invalid_input(format!(
                    "trajectory '{}' appears in non-contiguous runs; input must be grouped by trajectory",
                    record.trajectory_id
                )));
            }
            current_id = Some(record.trajectory_id);
        }
        current_points.push(record.point);
    }

    if let Some(trajectory_id) = current_id {
        runs.push(RecordRun {
            trajectory_id,
            points: current_points,
        });
    }

    Ok(runs)
}

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::optimizer::DpTables;
use crate::segmentation::Segmentation;
use trajseg_core::{MIN_SEGMENT_LEN, MdlTrace, SegError};
use trajseg_costs::gaussian_log_likelihood;

/// Parameters encoded per segment: mean and standard deviation.
const PARAMS_PER_SEGMENT: usize = 2;

/// Outcome of MDL model-order selection.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSelection {
    /// Selected segment count k*.
    pub selected: usize,
    /// One score per evaluated segment count, ascending.
    pub scores: Vec<MdlTrace>,
    /// Optimal partition at k*.
    pub segmentation: Segmentation,
}

impl ModelSelection {
    pub fn selected_score(&self) -> Option<&MdlTrace> {
        self.scores
            .iter()
            .find(|score| score.segment_count == self.selected)
    }
}

/// Scores `segmentation` of `signal` with the minimum-description-length
/// criterion.
///
/// Each segment's mean and standard deviation are refitted from its own
/// points. The penalty charges two parameters per segment plus one per
/// boundary: `r = 3k - 1`, scaled by `ln(N) / 2`.
pub fn mdl_score(signal: &[f64], segmentation: &Segmentation) -> Result<MdlTrace, SegError> {
    if signal.len() != segmentation.n() {
        return Err(SegError::invalid_input(format!(
            "segmentation covers n={} points but the signal has {}",
            segmentation.n(),
            signal.len()
        )));
    }

    let log_likelihood: f64 = segmentation
        .segments()
        .map(|range| gaussian_log_likelihood(&signal[range]))
        .sum();
    let negative_log_likelihood = -log_likelihood;

    let k = segmentation.segment_count();
    let r = PARAMS_PER_SEGMENT * k + (k - 1);
    let penalty = 0.5 * r as f64 * (signal.len() as f64).ln();
    let mdl = negative_log_likelihood + penalty;
    if !mdl.is_finite() {
        return Err(SegError::numerical_issue(format!(
            "non-finite MDL for k={k}: negative_log_likelihood={negative_log_likelihood}, penalty={penalty}"
        )));
    }

    Ok(MdlTrace {
        segment_count: k,
        negative_log_likelihood,
        penalty,
        mdl,
    })
}

/// Picks the segment count with the lowest MDL.
///
/// Counts are scanned in ascending order and only a strict improvement
/// replaces the incumbent, so ties go to the smaller count. Counts with no
/// feasible partition are not evaluated.
pub fn select_segment_count(signal: &[f64], tables: &DpTables) -> Result<ModelSelection, SegError> {
    let n = signal.len();
    if n < MIN_SEGMENT_LEN {
        return Err(SegError::insufficient_data(MIN_SEGMENT_LEN, n));
    }
    if tables.n() != n {
        return Err(SegError::invalid_input(format!(
            "dp tables were built for n={} but the signal has {n} points",
            tables.n()
        )));
    }
    let evaluable = tables.feasible_segments();
    if evaluable == 0 {
        return Err(SegError::insufficient_data(MIN_SEGMENT_LEN, n));
    }

    let mut scores = Vec::with_capacity(evaluable);
    let mut best: Option<(MdlTrace, Segmentation)> = None;
    for segment_count in 1..=evaluable {
        let segmentation = tables.backtrack(segment_count)?;
        let score = mdl_score(signal, &segmentation)?;
        tracing::trace!(
            segment_count,
            mdl = score.mdl,
            negative_log_likelihood = score.negative_log_likelihood,
            "scored segment count"
        );
        scores.push(score);

        let improves = best
            .as_ref()
            .is_none_or(|(incumbent, _)| score.mdl < incumbent.mdl);
        if improves {
            best = Some((score, segmentation));
        }
    }

    let (best_score, segmentation) = best.ok_or_else(|| {
        SegError::insufficient_data(MIN_SEGMENT_LEN, n)
    })?;

    Ok(ModelSelection {
        selected: best_score.segment_count,
        scores,
        segmentation,
    })
}

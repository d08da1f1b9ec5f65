// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::segmentation::Segmentation;
use std::mem::size_of;
use std::time::Instant;
use trajseg_core::{BudgetStatus, ExecutionContext, MIN_SEGMENT_LEN, SegError};
use trajseg_costs::SpanCost;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Minimal-cost tables for every feasible segment count.
///
/// Row `segment_count` (1-based) holds, for every inclusive endpoint `last`,
/// the minimal total cost of covering `0..=last` with exactly that many
/// segments, and the start of the final segment achieving it. Only rows with
/// `2 * segment_count <= n` are stored; every other cell reads as infeasible.
#[derive(Clone, Debug, PartialEq)]
pub struct DpTables {
    n: usize,
    max_segments: usize,
    rows: usize,
    objective: Vec<f64>,
    last_start: Vec<usize>,
    dp_cells: usize,
    soft_budget_exceeded: bool,
}

impl DpTables {
    pub fn n(&self) -> usize {
        self.n
    }

    /// K as requested by the caller.
    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Largest segment count with a feasible partition, `min(K, n / 2)`.
    pub fn feasible_segments(&self) -> usize {
        self.rows
    }

    /// Candidate splits evaluated while filling the tables.
    pub fn dp_cells(&self) -> usize {
        self.dp_cells
    }

    pub fn soft_budget_exceeded(&self) -> bool {
        self.soft_budget_exceeded
    }

    fn cell(&self, segment_count: usize, last: usize) -> Option<usize> {
        if segment_count == 0 || segment_count > self.rows || last >= self.n {
            return None;
        }
        Some((segment_count - 1) * self.n + last)
    }

    /// Minimal cost of `0..=last` in exactly `segment_count` segments;
    /// `f64::INFINITY` when no such partition exists.
    pub fn objective(&self, segment_count: usize, last: usize) -> f64 {
        self.cell(segment_count, last)
            .map_or(f64::INFINITY, |idx| self.objective[idx])
    }

    /// Start of the final segment in the optimal partition of `0..=last`.
    pub fn last_segment_start(&self, segment_count: usize, last: usize) -> Option<usize> {
        self.cell(segment_count, last)
            .map(|idx| self.last_start[idx])
            .filter(|&start| start != usize::MAX)
    }

    /// Minimal cost of the whole signal in exactly `segment_count` segments.
    pub fn total_cost(&self, segment_count: usize) -> f64 {
        self.objective(segment_count, self.n.saturating_sub(1))
    }

    /// Recovers the optimal partition into exactly `segment_count` segments.
    pub fn backtrack(&self, segment_count: usize) -> Result<Segmentation, SegError> {
        if segment_count == 0 || segment_count > self.rows {
            return Err(SegError::invalid_input(format!(
                "segment_count={segment_count} is not feasible for n={}; feasible range is 1..={}",
                self.n, self.rows
            )));
        }

        let mut starts = Vec::with_capacity(segment_count);
        let mut last = self.n - 1;
        for current in (2..=segment_count).rev() {
            let start = self.last_segment_start(current, last).ok_or_else(|| {
                SegError::invalid_input(format!(
                    "backtracking failed at segment_count={current}, last={last}"
                ))
            })?;
            if start == 0 || start > last {
                return Err(SegError::invalid_input(format!(
                    "invalid segment start during backtracking: start={start}, last={last}"
                )));
            }
            starts.push(start);
            last = start - 1;
        }
        starts.push(0);
        starts.reverse();

        Segmentation::new(self.n, starts)
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct RuntimeStats {
    iteration: usize,
    soft_budget_exceeded: bool,
}

#[derive(Clone, Copy, Debug)]
struct BestSplit {
    objective: f64,
    start: usize,
    candidates: usize,
}

fn checked_counter_increment(counter: &mut usize, name: &str) -> Result<(), SegError> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| SegError::resource_limit(format!("{name} counter overflow")))?;
    Ok(())
}

fn checked_usize_mul(lhs: usize, rhs: usize, context: &str) -> Result<usize, SegError> {
    lhs.checked_mul(rhs)
        .ok_or_else(|| SegError::resource_limit(format!("{context} overflow")))
}

fn estimate_table_bytes(rows: usize, n: usize) -> Result<usize, SegError> {
    let cells = checked_usize_mul(rows, n, "dp cell count")?;
    checked_usize_mul(
        cells,
        size_of::<f64>() + size_of::<usize>(),
        "dp table bytes",
    )
}

/// Best start for the final segment ending at `last`, scanning starts in
/// ascending order and keeping only strict improvements.
fn best_last_segment<S, P>(
    costs: &S,
    prev_row: &[f64],
    first_start: usize,
    last: usize,
    mut poll: P,
) -> Result<BestSplit, SegError>
where
    S: SpanCost + ?Sized,
    P: FnMut() -> Result<(), SegError>,
{
    let mut best = BestSplit {
        objective: f64::INFINITY,
        start: usize::MAX,
        candidates: 0,
    };

    for start in first_start..last {
        poll()?;
        checked_counter_increment(&mut best.candidates, "dp candidate")?;

        let head = prev_row[start - 1];
        if !head.is_finite() {
            continue;
        }
        let tail = costs.span_cost(start, last);
        if !tail.is_finite() {
            return Err(SegError::numerical_issue(format!(
                "non-finite span cost at [{start}, {last}]: {tail}"
            )));
        }

        let objective = head + tail;
        if !objective.is_finite() {
            return Err(SegError::numerical_issue(format!(
                "non-finite dp objective at start={start}, last={last}: head={head}, tail={tail}"
            )));
        }
        if objective < best.objective {
            best.objective = objective;
            best.start = start;
        }
    }

    Ok(best)
}

#[cfg(feature = "rayon")]
fn fill_row_parallel<S>(
    costs: &S,
    prev_row: &[f64],
    first_start: usize,
    min_last: usize,
) -> Result<Vec<BestSplit>, SegError>
where
    S: SpanCost + Sync + ?Sized,
{
    (min_last..costs.len())
        .into_par_iter()
        .map(|last| best_last_segment(costs, prev_row, first_start, last, || Ok(())))
        .collect()
}

fn check_runtime_controls(
    cancel_check_every: usize,
    ctx: &ExecutionContext<'_>,
    started_at: Instant,
    runtime: &mut RuntimeStats,
) -> Result<(), SegError> {
    checked_counter_increment(&mut runtime.iteration, "iteration")?;
    if runtime.iteration.is_multiple_of(cancel_check_every) {
        ctx.check_cancelled()?;
        match ctx.check_time_budget(started_at)? {
            BudgetStatus::WithinBudget => {}
            BudgetStatus::ExceededSoftDegrade => {
                runtime.soft_budget_exceeded = true;
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn fill_row_serial<S>(
    costs: &S,
    prev_row: &[f64],
    first_start: usize,
    min_last: usize,
    cancel_check_every: usize,
    ctx: &ExecutionContext<'_>,
    started_at: Instant,
    runtime: &mut RuntimeStats,
) -> Result<Vec<BestSplit>, SegError>
where
    S: SpanCost + ?Sized,
{
    (min_last..costs.len())
        .map(|last| {
            best_last_segment(costs, prev_row, first_start, last, || {
                check_runtime_controls(cancel_check_every, ctx, started_at, runtime)
            })
        })
        .collect()
}

/// Fills the segment-count tables for `1..=max_segments` segments.
///
/// Cancellation and the time budget are polled every `cancel_check_every`
/// candidate evaluations. Rows are filled in parallel only when the context
/// has nothing to poll.
pub fn optimize<S>(
    costs: &S,
    max_segments: usize,
    ctx: &ExecutionContext<'_>,
    cancel_check_every: usize,
    started_at: Instant,
) -> Result<DpTables, SegError>
where
    S: SpanCost + Sync + ?Sized,
{
    if max_segments == 0 {
        return Err(SegError::invalid_input(
            "max_segments must be >= 1; got 0",
        ));
    }
    let n = costs.len();
    if n < MIN_SEGMENT_LEN {
        return Err(SegError::insufficient_data(MIN_SEGMENT_LEN, n));
    }

    let rows = max_segments.min(n / MIN_SEGMENT_LEN);
    let required_bytes = estimate_table_bytes(rows, n)?;
    ctx.constraints.check_memory("dp tables", required_bytes)?;
    tracing::debug!(n, max_segments, rows, required_bytes, "allocating dp tables");

    let cancel_check_every = cancel_check_every.max(1);
    let mut objective = vec![f64::INFINITY; rows * n];
    let mut last_start = vec![usize::MAX; rows * n];
    let mut dp_cells = 0usize;
    let mut runtime = RuntimeStats::default();

    for last in 1..n {
        let cost = costs.span_cost(0, last);
        if !cost.is_finite() {
            return Err(SegError::numerical_issue(format!(
                "non-finite span cost at [0, {last}]: {cost}"
            )));
        }
        objective[last] = cost;
        last_start[last] = 0;
        checked_counter_increment(&mut dp_cells, "dp_cells")?;
    }
    ctx.report_progress(1.0 / rows as f32);

    for segment_count in 2..=rows {
        let (done, pending) = objective.split_at_mut((segment_count - 1) * n);
        let prev_row = &done[(segment_count - 2) * n..];
        let curr_row = &mut pending[..n];
        let start_row = &mut last_start[(segment_count - 1) * n..segment_count * n];

        // The final segment may start no earlier than index 2 * (segment_count - 1).
        let first_start = MIN_SEGMENT_LEN * (segment_count - 1);
        let min_last = MIN_SEGMENT_LEN * segment_count - 1;

        #[cfg(feature = "rayon")]
        let best_splits = if ctx.allows_parallel() {
            fill_row_parallel(costs, prev_row, first_start, min_last)?
        } else {
            fill_row_serial(
                costs,
                prev_row,
                first_start,
                min_last,
                cancel_check_every,
                ctx,
                started_at,
                &mut runtime,
            )?
        };
        #[cfg(not(feature = "rayon"))]
        let best_splits = fill_row_serial(
            costs,
            prev_row,
            first_start,
            min_last,
            cancel_check_every,
            ctx,
            started_at,
            &mut runtime,
        )?;

        for (offset, best) in best_splits.into_iter().enumerate() {
            dp_cells = dp_cells
                .checked_add(best.candidates)
                .ok_or_else(|| SegError::resource_limit("dp_cells counter overflow"))?;
            if best.start != usize::MAX {
                curr_row[min_last + offset] = best.objective;
                start_row[min_last + offset] = best.start;
            }
        }

        ctx.report_progress(segment_count as f32 / rows as f32);
    }

    Ok(DpTables {
        n,
        max_segments,
        rows,
        objective,
        last_start,
        dp_cells,
        soft_budget_exceeded: runtime.soft_budget_exceeded,
    })
}

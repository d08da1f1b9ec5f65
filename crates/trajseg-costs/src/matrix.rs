// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::model::{CostModel, SpanCost};
use crate::normal::CostNormalMeanVar;
use std::mem::size_of;
use std::time::Instant;
use trajseg_core::{Constraints, ExecutionContext, MIN_SEGMENT_LEN, SegError};

/// Dense upper-triangular table of span costs, `cost[i][j]` for
/// `0 <= i <= j < n`.
///
/// Rows are stored back to back; row `i` holds columns `i..n`. Diagonal cells
/// (single-point spans) hold `f64::INFINITY`.
#[derive(Clone, Debug, PartialEq)]
pub struct CostMatrix {
    n: usize,
    cells: Vec<f64>,
    cost_model: &'static str,
}

fn row_offset(n: usize, i: usize) -> usize {
    // sum of row lengths n, n-1, ..., n-i+1
    i * n - i * (i.saturating_sub(1)) / 2
}

impl CostMatrix {
    /// Cell count for a signal of length `n`, `None` on overflow.
    pub fn cell_count(n: usize) -> Option<usize> {
        n.checked_add(1)
            .and_then(|next| n.checked_mul(next))
            .map(|product| product / 2)
    }

    /// Bytes needed to materialize the matrix, `None` on overflow.
    pub fn required_bytes(n: usize) -> Option<usize> {
        Self::cell_count(n).and_then(|cells| cells.checked_mul(size_of::<f64>()))
    }

    /// Builds the matrix under the default normal cost model with no budgets.
    pub fn build(signal: &[f64]) -> Result<Self, SegError> {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        Self::from_model(
            &CostNormalMeanVar::new(ctx.repro_mode),
            signal,
            &ctx,
            Instant::now(),
        )
    }

    /// Builds the matrix for any cost model, honoring the context's memory and
    /// time budgets and cancellation. `started_at` marks the start of the
    /// trajectory's pipeline, which the time budget is measured from.
    pub fn from_model<C: CostModel>(
        model: &C,
        signal: &[f64],
        ctx: &ExecutionContext<'_>,
        started_at: Instant,
    ) -> Result<Self, SegError> {
        model.validate(signal)?;
        let n = signal.len();

        let matrix_bytes = Self::required_bytes(n).ok_or_else(|| {
            SegError::resource_limit(format!("cost matrix size overflow for n={n}"))
        })?;
        let required = matrix_bytes
            .checked_add(model.worst_case_cache_bytes(n))
            .unwrap_or(usize::MAX);
        ctx.constraints.check_memory("cost matrix", required)?;

        let cache = model.precompute(signal)?;
        let cell_count = Self::cell_count(n).unwrap_or(0);
        let mut cells = Vec::with_capacity(cell_count);

        for first in 0..n {
            ctx.check_cancelled()?;
            // Soft overruns are reported by the caller once the pipeline finishes.
            ctx.check_time_budget(started_at)?;

            cells.push(f64::INFINITY);
            for last in (first + 1)..n {
                let cost = model.segment_cost(&cache, first, last + 1);
                if cost.is_nan() {
                    return Err(SegError::numerical_issue(format!(
                        "NaN span cost at [{first}, {last}]"
                    )));
                }
                cells.push(cost);
            }
        }

        debug_assert_eq!(cells.len(), cell_count);
        tracing::debug!(
            n,
            cells = cells.len(),
            bytes = matrix_bytes,
            cost_model = model.name(),
            "built cost matrix"
        );

        Ok(Self {
            n,
            cells,
            cost_model: model.name(),
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn cost_model(&self) -> &'static str {
        self.cost_model
    }

    /// Cost of span `[i, j]`; `f64::INFINITY` when `j < i + 1` or out of range.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if j >= self.n || j < i || j - i + 1 < MIN_SEGMENT_LEN {
            return f64::INFINITY;
        }
        self.cells[row_offset(self.n, i) + (j - i)]
    }

    /// Row `i` as a slice covering columns `i..n`.
    pub fn row(&self, i: usize) -> &[f64] {
        if i >= self.n {
            return &[];
        }
        let start = row_offset(self.n, i);
        &self.cells[start..start + (self.n - i)]
    }
}

impl SpanCost for CostMatrix {
    fn len(&self) -> usize {
        self.n
    }

    fn span_cost(&self, first: usize, last: usize) -> f64 {
        self.get(first, last)
    }
}

#[cfg(test)]
mod tests {
    use super::{CostMatrix, row_offset};
    use crate::model::{CachedCost, SpanCost};
    use crate::normal::CostNormalMeanVar;
    use std::time::Instant;
    use trajseg_core::{CancelToken, Constraints, ExecutionContext, ReproMode};

    #[test]
    fn row_offsets_pack_the_upper_triangle() {
        assert_eq!(row_offset(4, 0), 0);
        assert_eq!(row_offset(4, 1), 4);
        assert_eq!(row_offset(4, 2), 7);
        assert_eq!(row_offset(4, 3), 9);
        assert_eq!(CostMatrix::cell_count(4), Some(10));
        assert_eq!(CostMatrix::required_bytes(4), Some(80));
        assert_eq!(CostMatrix::cell_count(usize::MAX), None);
    }

    #[test]
    fn build_matches_on_demand_costs() {
        let signal = [0.4, 0.9, 0.1, 3.2, 3.0, 3.3, 0.2];
        let matrix = CostMatrix::build(&signal).expect("matrix should build");
        let on_demand = CachedCost::new(CostNormalMeanVar::new(ReproMode::Balanced), &signal)
            .expect("cached cost should build");

        assert_eq!(matrix.n(), signal.len());
        assert_eq!(matrix.cost_model(), "normal_mean_var");
        for i in 0..signal.len() {
            assert_eq!(matrix.row(i).len(), signal.len() - i);
            for j in 0..signal.len() {
                assert_eq!(
                    matrix.get(i, j).to_bits(),
                    on_demand.span_cost(i, j).to_bits(),
                    "cell [{i}, {j}]"
                );
            }
        }
    }

    #[test]
    fn short_and_reversed_spans_are_infinite() {
        let matrix = CostMatrix::build(&[1.0, 2.0, 4.0]).expect("matrix should build");
        for i in 0..3 {
            assert_eq!(matrix.get(i, i), f64::INFINITY);
        }
        assert_eq!(matrix.get(2, 1), f64::INFINITY);
        assert_eq!(matrix.get(0, 3), f64::INFINITY);
        assert!(matrix.get(0, 1).is_finite());
        assert!(matrix.row(3).is_empty());
    }

    #[test]
    fn constant_signal_has_zero_cost_everywhere_admissible() {
        let matrix = CostMatrix::build(&[1.0, 1.0, 1.0, 1.0]).expect("matrix should build");
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_eq!(matrix.get(i, j), 0.0);
            }
        }
    }

    #[test]
    fn build_rejects_signal_shorter_than_two() {
        let err = CostMatrix::build(&[0.5]).expect_err("n=1 should fail");
        assert_eq!(err.code(), "insufficient_data");
        let err = CostMatrix::build(&[]).expect_err("n=0 should fail");
        assert_eq!(err.code(), "insufficient_data");
    }

    #[test]
    fn memory_budget_is_enforced() {
        let constraints = Constraints {
            memory_budget_bytes: Some(64),
            ..Constraints::default()
        };
        let ctx = ExecutionContext::new(&constraints);
        let err = CostMatrix::from_model(
            &CostNormalMeanVar::default(),
            &[0.0; 16],
            &ctx,
            Instant::now(),
        )
        .expect_err("budget too small should fail");
        let message = err.to_string();
        assert!(message.contains("memory_budget_bytes"));
        assert!(message.contains("cost matrix"));
    }

    #[test]
    fn cancelled_context_stops_build() {
        let constraints = Constraints::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ExecutionContext::new(&constraints).with_cancel(&cancel);
        let err = CostMatrix::from_model(
            &CostNormalMeanVar::default(),
            &[0.0, 1.0, 2.0],
            &ctx,
            Instant::now(),
        )
        .expect_err("cancelled token must stop the build");
        assert_eq!(err.to_string(), "cancelled");
    }
}

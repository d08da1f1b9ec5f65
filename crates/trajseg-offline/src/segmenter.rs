// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::assembler::{SegmentedTrajectory, assemble};
use crate::optimizer::{DpTables, optimize};
use crate::selector::{ModelSelection, select_segment_count};
use std::borrow::Cow;
use std::time::Instant;
use trajseg_core::{
    BudgetStatus, Diagnostics, ExecutionContext, MIN_SEGMENT_LEN, SegError, Trajectory,
};
use trajseg_costs::{CachedCost, CostMatrix, CostModel, CostNormalMeanVar, SpanCost};

const DEFAULT_MAX_SEGMENTS: usize = 50;
const DEFAULT_CANCEL_CHECK_EVERY: usize = 1000;

/// How span costs are held while the dp tables are filled.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CostStorage {
    /// Materialize every span cost up front; O(N^2) memory.
    #[default]
    Dense,
    /// Evaluate spans from prefix statistics as the dp asks for them; O(N) memory.
    OnDemand,
}

impl CostStorage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::OnDemand => "on_demand",
        }
    }
}

/// Configuration for [`Segmenter`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct SegmenterConfig {
    /// Largest segment count K considered by model selection.
    pub max_segments: usize,
    pub cancel_check_every: usize,
    pub cost_storage: CostStorage,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segments: DEFAULT_MAX_SEGMENTS,
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
            cost_storage: CostStorage::Dense,
        }
    }
}

impl SegmenterConfig {
    fn validate(&self) -> Result<(), SegError> {
        if self.max_segments == 0 {
            return Err(SegError::invalid_input(
                "max_segments must be >= 1; got 0",
            ));
        }
        Ok(())
    }

    fn normalized_cancel_check_every(&self) -> usize {
        self.cancel_check_every.max(1)
    }
}

/// Selected segmentation of a bare signal plus run diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalSegmentation {
    pub selection: ModelSelection,
    pub diagnostics: Diagnostics,
}

/// Per-trajectory pipeline: span costs, dp tables, MDL selection, assembly.
///
/// Holds no state between calls; every working structure lives for one
/// trajectory only.
#[derive(Clone, Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self, SegError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segments one trajectory and flags segment starts on its points.
    pub fn segment(
        &self,
        trajectory: &Trajectory,
        ctx: &ExecutionContext<'_>,
    ) -> Result<SegmentedTrajectory, SegError> {
        let span = tracing::debug_span!("segment", trajectory = trajectory.id(), n = trajectory.len());
        let _guard = span.enter();

        let signal = trajectory.signal();
        let SignalSegmentation {
            selection,
            diagnostics,
        } = self.segment_signal(&signal, ctx)?;
        assemble(trajectory, selection.segmentation, diagnostics)
    }

    /// Runs the pipeline on a bare signal.
    pub fn segment_signal(
        &self,
        signal: &[f64],
        ctx: &ExecutionContext<'_>,
    ) -> Result<SignalSegmentation, SegError> {
        self.config.validate()?;
        ctx.constraints.validate()?;

        let started_at = Instant::now();
        let n = signal.len();
        ctx.constraints.check_size(n)?;

        let model = CostNormalMeanVar::new(ctx.repro_mode);
        model.validate(signal)?;

        let max_segments = self.config.max_segments;
        let cancel_check_every = self.config.normalized_cancel_check_every();
        let mut notes = vec![];
        let mut warnings = vec![];

        let half = n / MIN_SEGMENT_LEN;
        if max_segments > half {
            tracing::warn!(
                n,
                max_segments,
                evaluated = half,
                "max_segments exceeds n / 2; larger segment counts have no feasible partition"
            );
            warnings.push(format!(
                "max_segments={max_segments} exceeds n/2={half}; segment counts above {half} were not evaluated"
            ));
        }

        let tables = match self.config.cost_storage {
            CostStorage::Dense => {
                let matrix = CostMatrix::from_model(&model, signal, ctx, started_at)?;
                self.fill_tables(&matrix, ctx, cancel_check_every, started_at)?
            }
            CostStorage::OnDemand => {
                ctx.constraints
                    .check_memory("cost cache", model.worst_case_cache_bytes(n))?;
                let costs = CachedCost::new(model, signal)?;
                self.fill_tables(&costs, ctx, cancel_check_every, started_at)?
            }
        };

        let selection = select_segment_count(signal, &tables)?;

        let soft_overrun = match ctx.check_time_budget(started_at)? {
            BudgetStatus::WithinBudget => tables.soft_budget_exceeded(),
            BudgetStatus::ExceededSoftDegrade => true,
        };
        if soft_overrun {
            warnings.push(
                "time budget exceeded under SoftDegrade mode; run completed without fallback"
                    .to_string(),
            );
        }

        let runtime_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        ctx.record_scalar("segment.dp_cells", tables.dp_cells() as f64);
        ctx.record_scalar("segment.selected_k", selection.selected as f64);
        ctx.record_scalar("segment.runtime_ms", runtime_ms as f64);
        ctx.report_progress(1.0);

        notes.push(format!("cost_storage={}", self.config.cost_storage.as_str()));
        if let Some(score) = selection.selected_score() {
            notes.push(format!(
                "selected_k={}, mdl={}, negative_log_likelihood={}, penalty={}",
                score.segment_count, score.mdl, score.negative_log_likelihood, score.penalty
            ));
        }

        tracing::debug!(
            n,
            selected_k = selection.selected,
            evaluated = tables.feasible_segments(),
            dp_cells = tables.dp_cells(),
            runtime_ms,
            "segmentation selected"
        );

        let diagnostics = Diagnostics {
            n,
            runtime_ms: Some(runtime_ms),
            notes,
            warnings,
            cost_model: Cow::Borrowed(model.name()),
            repro_mode: ctx.repro_mode,
            max_segments,
            evaluated_segments: tables.feasible_segments(),
            selected_segments: selection.selected,
            mdl_trace: selection.scores.clone(),
            dp_cells: tables.dp_cells(),
            ..Diagnostics::default()
        };

        Ok(SignalSegmentation {
            selection,
            diagnostics,
        })
    }

    fn fill_tables<S>(
        &self,
        costs: &S,
        ctx: &ExecutionContext<'_>,
        cancel_check_every: usize,
        started_at: Instant,
    ) -> Result<DpTables, SegError>
    where
        S: SpanCost + Sync,
    {
        let cost_ready_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        ctx.record_scalar("segment.cost_matrix_ms", cost_ready_ms);
        optimize(
            costs,
            self.config.max_segments,
            ctx,
            cancel_check_every,
            started_at,
        )
    }
}

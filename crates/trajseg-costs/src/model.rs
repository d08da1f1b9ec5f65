// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use trajseg_core::{MIN_SEGMENT_LEN, SegError};

/// A per-span cost under some segment model.
pub trait CostModel {
    type Cache;

    fn name(&self) -> &'static str;

    /// Rejects signals the model cannot score.
    fn validate(&self, signal: &[f64]) -> Result<(), SegError>;

    /// Builds the cache that makes [`CostModel::segment_cost`] O(1).
    fn precompute(&self, signal: &[f64]) -> Result<Self::Cache, SegError>;

    /// Upper bound on cache size in bytes; `usize::MAX` on overflow.
    fn worst_case_cache_bytes(&self, n: usize) -> usize;

    /// Fitted parameters per segment.
    fn params_per_segment(&self) -> usize;

    /// Cost of `[start, end)`. Spans shorter than
    /// [`MIN_SEGMENT_LEN`] cost `f64::INFINITY`.
    fn segment_cost(&self, cache: &Self::Cache, start: usize, end: usize) -> f64;
}

/// Inclusive-span cost lookup consumed by the segment optimizer.
pub trait SpanCost {
    /// Number of points in the underlying signal.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cost of treating points `first..=last` as one segment.
    ///
    /// Returns `f64::INFINITY` for spans with fewer than two points and for
    /// indices out of range.
    fn span_cost(&self, first: usize, last: usize) -> f64;
}

/// A cost model bundled with its precomputed cache; evaluates spans on demand
/// instead of materializing the full matrix.
#[derive(Clone, Debug)]
pub struct CachedCost<C: CostModel> {
    model: C,
    cache: C::Cache,
    n: usize,
}

impl<C: CostModel> CachedCost<C> {
    pub fn new(model: C, signal: &[f64]) -> Result<Self, SegError> {
        model.validate(signal)?;
        let cache = model.precompute(signal)?;
        Ok(Self {
            model,
            cache,
            n: signal.len(),
        })
    }

    pub fn model(&self) -> &C {
        &self.model
    }

    pub fn cache(&self) -> &C::Cache {
        &self.cache
    }
}

impl<C: CostModel> SpanCost for CachedCost<C> {
    fn len(&self) -> usize {
        self.n
    }

    fn span_cost(&self, first: usize, last: usize) -> f64 {
        if last >= self.n || last < first || last - first + 1 < MIN_SEGMENT_LEN {
            return f64::INFINITY;
        }
        self.model.segment_cost(&self.cache, first, last + 1)
    }
}

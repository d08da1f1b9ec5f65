// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::model::CostModel;
use std::mem::size_of;
use trajseg_core::{
    MIN_SEGMENT_LEN, ReproMode, SegError, prefix_sums, prefix_sums_kahan, prefix_sums_of_squares,
};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Prefix variances at or below this fraction of the span's second moment are
/// recomputed from the raw values.
const CANCELLATION_TOLERANCE: f64 = 1e-9;

/// Independent-normal segment cost: the negative log-likelihood of a span under
/// its own MLE mean and population standard deviation.
///
/// For a span of `m` points with variance `s2 > 0` this is
/// `m / 2 * (ln s2 + ln 2pi + 1)`. A span whose values are all identical costs
/// exactly `0.0`; it is treated as perfectly homogeneous rather than as an
/// infinitely likely fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostNormalMeanVar {
    pub repro_mode: ReproMode,
}

impl CostNormalMeanVar {
    pub const fn new(repro_mode: ReproMode) -> Self {
        Self { repro_mode }
    }
}

impl Default for CostNormalMeanVar {
    fn default() -> Self {
        Self::new(ReproMode::Balanced)
    }
}

/// Sample mean and population standard deviation of a span.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpanStats {
    pub len: usize,
    pub mean: f64,
    pub std: f64,
}

impl SpanStats {
    /// Two-pass statistics straight from the values.
    pub fn from_values(values: &[f64]) -> Self {
        let len = values.len();
        if len == 0 {
            return Self {
                len,
                mean: 0.0,
                std: 0.0,
            };
        }
        let m = len as f64;
        let mean = values.iter().sum::<f64>() / m;
        let sum_sq_dev = values
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f64>();
        Self {
            len,
            mean,
            std: (sum_sq_dev / m).sqrt(),
        }
    }
}

/// Log-likelihood of `values` under a normal fitted to those same values.
///
/// Input whose values are all identical scores `0.0`, mirroring the zero cost
/// such spans get in the cost matrix. Constancy is tested on the values
/// themselves; a two-pass mean of `[0.1, 0.1, 0.1]` is not exactly `0.1`.
pub fn gaussian_log_likelihood(values: &[f64]) -> f64 {
    if values.windows(2).all(|pair| pair[0] == pair[1]) {
        return 0.0;
    }
    let stats = SpanStats::from_values(values);
    if stats.std == 0.0 {
        return 0.0;
    }
    let ln_norm = (stats.std * (2.0 * std::f64::consts::PI).sqrt()).ln();
    let two_var = 2.0 * stats.std * stats.std;
    values
        .iter()
        .map(|&x| -(ln_norm + (x - stats.mean).powi(2) / two_var))
        .sum()
}

/// Prefix-stat cache for O(1) span statistics.
///
/// Values are centered on the signal mean before accumulation to limit
/// cancellation in `sum_sq / m - mean^2`. `run_start[t]` is the first index of
/// the run of identical values ending at `t`, so constant spans are detected
/// exactly. Spans whose prefix variance is lost to cancellation are recomputed
/// from `values`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalCache {
    values: Vec<f64>,
    shift: f64,
    prefix_sum: Vec<f64>,
    prefix_sum_sq: Vec<f64>,
    run_start: Vec<usize>,
    n: usize,
}

impl NormalCache {
    pub fn n(&self) -> usize {
        self.n
    }

    fn is_constant(&self, start: usize, end: usize) -> bool {
        self.run_start[end - 1] <= start
    }

    /// Statistics of `[start, end)`; requires `start < end <= n`.
    pub fn span_stats(&self, start: usize, end: usize) -> SpanStats {
        assert!(
            start < end && end <= self.n,
            "span_stats requires start < end <= n; got start={start}, end={end}, n={}",
            self.n
        );

        let m = (end - start) as f64;
        let sum = self.prefix_sum[end] - self.prefix_sum[start];
        let centered_mean = sum / m;
        if self.is_constant(start, end) {
            return SpanStats {
                len: end - start,
                mean: centered_mean + self.shift,
                std: 0.0,
            };
        }

        let sum_sq = self.prefix_sum_sq[end] - self.prefix_sum_sq[start];
        let second_moment = sum_sq / m;
        let variance = second_moment - centered_mean * centered_mean;
        let scale = self.prefix_sum_sq[end] / m + centered_mean * centered_mean;
        if variance <= CANCELLATION_TOLERANCE * scale {
            return SpanStats::from_values(&self.values[start..end]);
        }

        SpanStats {
            len: end - start,
            mean: centered_mean + self.shift,
            std: variance.sqrt(),
        }
    }
}

impl CostModel for CostNormalMeanVar {
    type Cache = NormalCache;

    fn name(&self) -> &'static str {
        "normal_mean_var"
    }

    fn validate(&self, signal: &[f64]) -> Result<(), SegError> {
        if signal.len() < MIN_SEGMENT_LEN {
            return Err(SegError::insufficient_data(MIN_SEGMENT_LEN, signal.len()));
        }
        if let Some((idx, value)) = signal
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(SegError::invalid_input(format!(
                "CostNormalMeanVar requires finite values; got value={value} at t={idx}"
            )));
        }
        Ok(())
    }

    fn precompute(&self, signal: &[f64]) -> Result<Self::Cache, SegError> {
        self.validate(signal)?;

        let n = signal.len();
        let shift = signal.iter().sum::<f64>() / n as f64;
        let centered: Vec<f64> = signal.iter().map(|value| value - shift).collect();
        let strict = matches!(self.repro_mode, ReproMode::Strict);

        let prefix_sum = if strict {
            prefix_sums_kahan(&centered)
        } else {
            prefix_sums(&centered)
        };
        let prefix_sum_sq = prefix_sums_of_squares(&centered, strict);

        let mut run_start = Vec::with_capacity(n);
        for (t, value) in signal.iter().enumerate() {
            let start = match t {
                0 => 0,
                _ if *value == signal[t - 1] => run_start[t - 1],
                _ => t,
            };
            run_start.push(start);
        }

        Ok(NormalCache {
            values: signal.to_vec(),
            shift,
            prefix_sum,
            prefix_sum_sq,
            run_start,
            n,
        })
    }

    fn worst_case_cache_bytes(&self, n: usize) -> usize {
        let prefix = n
            .checked_add(1)
            .and_then(|len| len.checked_mul(2))
            .and_then(|len| len.checked_mul(size_of::<f64>()));
        let values = n.checked_mul(size_of::<f64>());
        let runs = n.checked_mul(size_of::<usize>());
        match (prefix, values, runs) {
            (Some(prefix), Some(values), Some(runs)) => prefix
                .checked_add(values)
                .and_then(|total| total.checked_add(runs))
                .unwrap_or(usize::MAX),
            _ => usize::MAX,
        }
    }

    fn params_per_segment(&self) -> usize {
        2
    }

    fn segment_cost(&self, cache: &Self::Cache, start: usize, end: usize) -> f64 {
        if end <= start || end - start < MIN_SEGMENT_LEN || end > cache.n {
            return f64::INFINITY;
        }

        let stats = cache.span_stats(start, end);
        if stats.std == 0.0 {
            return 0.0;
        }
        let m = stats.len as f64;
        0.5 * m * ((stats.std * stats.std).ln() + LN_2PI + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{CostNormalMeanVar, SpanStats, gaussian_log_likelihood};
    use crate::model::CostModel;
    use trajseg_core::ReproMode;

    fn naive_cost(values: &[f64]) -> f64 {
        let stats = SpanStats::from_values(values);
        if stats.std == 0.0 {
            return 0.0;
        }
        let ln_norm = (stats.std * (2.0 * std::f64::consts::PI).sqrt()).ln();
        values
            .iter()
            .map(|x| ln_norm + (x - stats.mean).powi(2) / (2.0 * stats.std * stats.std))
            .sum()
    }

    #[test]
    fn span_stats_are_population_statistics() {
        let stats = SpanStats::from_values(&[0.0, 0.0, 0.0, 5.0, 5.0, 5.0]);
        assert_eq!(stats.len, 6);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!((stats.std - 2.5).abs() < 1e-12);
    }

    #[test]
    fn segment_cost_matches_naive_sum() {
        let signal = [0.3, 1.7, 0.2, 4.4, 4.1, 3.9, 0.05, 2.2];
        for mode in [ReproMode::Strict, ReproMode::Balanced] {
            let model = CostNormalMeanVar::new(mode);
            let cache = model.precompute(&signal).expect("precompute should succeed");
            for start in 0..signal.len() {
                for end in (start + 2)..=signal.len() {
                    let got = model.segment_cost(&cache, start, end);
                    let expected = naive_cost(&signal[start..end]);
                    assert!(
                        (got - expected).abs() <= 1e-9 * (1.0 + expected.abs()),
                        "[{start}, {end}) mode={mode:?}: got={got}, expected={expected}"
                    );
                }
            }
        }
    }

    #[test]
    fn constant_spans_cost_exactly_zero_even_for_inexact_values() {
        let signal = [0.1, 0.1, 0.1, 0.7, 0.7, 0.1];
        let model = CostNormalMeanVar::default();
        let cache = model.precompute(&signal).expect("precompute should succeed");
        assert_eq!(model.segment_cost(&cache, 0, 3), 0.0);
        assert_eq!(model.segment_cost(&cache, 3, 5), 0.0);
        assert!(model.segment_cost(&cache, 2, 4) != 0.0);
    }

    #[test]
    fn short_spans_are_infinite() {
        let signal = [1.0, 2.0, 3.0];
        let model = CostNormalMeanVar::default();
        let cache = model.precompute(&signal).expect("precompute should succeed");
        assert_eq!(model.segment_cost(&cache, 1, 2), f64::INFINITY);
        assert_eq!(model.segment_cost(&cache, 2, 2), f64::INFINITY);
        assert_eq!(model.segment_cost(&cache, 1, 4), f64::INFINITY);
    }

    #[test]
    fn validate_rejects_short_and_non_finite_signals() {
        let model = CostNormalMeanVar::default();
        let err = model.validate(&[1.0]).expect_err("one point is not enough");
        assert_eq!(err.to_string(), "insufficient data: need at least 2 points, got 1");

        let err = model
            .validate(&[1.0, f64::INFINITY])
            .expect_err("infinite values must fail");
        assert!(err.to_string().contains("t=1"));
    }

    #[test]
    fn log_likelihood_is_negated_cost() {
        let values = [0.0, 0.0, 0.0, 5.0, 5.0, 5.0];
        let ll = gaussian_log_likelihood(&values);
        assert!((ll + naive_cost(&values)).abs() < 1e-12);
        assert_eq!(gaussian_log_likelihood(&[2.0, 2.0, 2.0]), 0.0);
    }

    #[test]
    fn log_likelihood_of_inexact_constant_values_is_zero() {
        assert_eq!(gaussian_log_likelihood(&[0.1, 0.1, 0.1]), 0.0);
        assert_eq!(gaussian_log_likelihood(&[0.7; 5]), 0.0);
        assert_eq!(gaussian_log_likelihood(&[0.3; 2]), 0.0);
        assert!(gaussian_log_likelihood(&[0.1, 0.1, 0.7]) < 0.0);
    }

    #[test]
    fn near_constant_spans_keep_their_variance() {
        let signal = [
            0.0,
            0.2,
            0.0,
            0.2,
            1.0,
            1.0 + 1e-12,
            1.0,
            1.0 + 1e-12,
            1000.0,
            1000.0 + 1e-9,
            1000.0,
            1000.0 + 1e-9,
        ];
        for mode in [ReproMode::Strict, ReproMode::Balanced] {
            let model = CostNormalMeanVar::new(mode);
            let cache = model.precompute(&signal).expect("precompute should succeed");
            for (start, end) in [(4, 8), (4, 6), (8, 12), (9, 11)] {
                let got = model.segment_cost(&cache, start, end);
                let expected = naive_cost(&signal[start..end]);
                assert!(got < 0.0, "[{start}, {end}) mode={mode:?}: got={got}");
                assert!(
                    (got - expected).abs() <= 1e-9 * (1.0 + expected.abs()),
                    "[{start}, {end}) mode={mode:?}: got={got}, expected={expected}"
                );
            }
        }
    }

    #[test]
    fn worst_case_cache_bytes_saturates_on_overflow() {
        let model = CostNormalMeanVar::default();
        assert_eq!(model.worst_case_cache_bytes(usize::MAX), usize::MAX);
        assert_eq!(model.worst_case_cache_bytes(3), 4 * 2 * 8 + 3 * 8 + 3 * 8);
    }
}

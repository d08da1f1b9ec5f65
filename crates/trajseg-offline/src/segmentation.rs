// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::ops::Range;
use trajseg_core::{MIN_SEGMENT_LEN, SegError};

/// A partition of `0..n` into contiguous segments of at least
/// [`MIN_SEGMENT_LEN`] points.
///
/// Stored as the start index of every segment; the first start is always `0`.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segmentation {
    n: usize,
    starts: Vec<usize>,
}

impl Segmentation {
    pub fn new(n: usize, starts: Vec<usize>) -> Result<Self, SegError> {
        if n < MIN_SEGMENT_LEN {
            return Err(SegError::insufficient_data(MIN_SEGMENT_LEN, n));
        }
        if starts.first().copied() != Some(0) {
            return Err(SegError::invalid_input(format!(
                "segmentation must start at index 0; got starts={starts:?}"
            )));
        }

        let mut ends = starts.iter().skip(1).copied().chain(std::iter::once(n));
        for &start in &starts {
            let end = ends.next().unwrap_or(n);
            if end <= start {
                return Err(SegError::invalid_input(format!(
                    "segment starts must be strictly increasing and < n={n}; got starts={starts:?}"
                )));
            }
            if end - start < MIN_SEGMENT_LEN {
                return Err(SegError::invalid_input(format!(
                    "segment [{start}, {end}) has {} point(s); every segment needs at least {MIN_SEGMENT_LEN}",
                    end - start
                )));
            }
        }

        Ok(Self { n, starts })
    }

    /// The single segment covering every point.
    pub fn whole(n: usize) -> Result<Self, SegError> {
        Self::new(n, vec![0])
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn segment_count(&self) -> usize {
        self.starts.len()
    }

    /// Start index of every segment, including the leading `0`.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Start index of every segment after the first.
    pub fn breakpoints(&self) -> &[usize] {
        &self.starts[1..]
    }

    /// Half-open index ranges in order.
    pub fn segments(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.starts.iter().enumerate().map(|(idx, &start)| {
            let end = self.starts.get(idx + 1).copied().unwrap_or(self.n);
            start..end
        })
    }

    pub fn is_segment_start(&self, index: usize) -> bool {
        self.starts.binary_search(&index).is_ok()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use trajseg_core::{BudgetMode, Constraints, ExecutionContext, ReproMode, Trajectory};
use trajseg_offline::{CostStorage, Segmenter, SegmenterConfig};

const MAX_POINTS: usize = 96;

struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_u8(&mut self) -> u8 {
        let value = self.data.get(self.pos).copied().unwrap_or(0);
        self.pos = self.pos.saturating_add(1);
        value
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        for byte in &mut bytes {
            *byte = self.next_u8();
        }
        u64::from_le_bytes(bytes)
    }
}

fn build_value(cursor: &mut ByteCursor<'_>) -> f64 {
    match cursor.next_u8() % 8 {
        0 => f64::from_bits(cursor.next_u64()),
        1 => 0.0,
        2 => f64::from(cursor.next_u8() % 4),
        3 => f64::from(cursor.next_u8()) * 1e-12,
        4 => f64::from(cursor.next_u8()) * 1e12,
        5 => -f64::from(cursor.next_u8()),
        _ => f64::from(cursor.next_u8()) / 16.0,
    }
}

fuzz_target!(|data: &[u8]| {
    let mut cursor = ByteCursor::new(data);

    let config = SegmenterConfig {
        max_segments: usize::from(cursor.next_u8() % 12),
        cancel_check_every: usize::from(cursor.next_u8()),
        cost_storage: if cursor.next_u8() & 1 == 0 {
            CostStorage::Dense
        } else {
            CostStorage::OnDemand
        },
    };
    let Ok(segmenter) = Segmenter::new(config) else {
        return;
    };

    let repro_mode = match cursor.next_u8() % 3 {
        0 => ReproMode::Strict,
        1 => ReproMode::Balanced,
        _ => ReproMode::Fast,
    };
    let constraints = Constraints {
        max_points: match cursor.next_u8() % 4 {
            0 => Some(usize::from(cursor.next_u8())),
            _ => None,
        },
        memory_budget_bytes: match cursor.next_u8() % 4 {
            0 => Some(usize::from(cursor.next_u8()) * 64),
            _ => None,
        },
        ..Constraints::default()
    };
    let ctx = ExecutionContext::new(&constraints)
        .with_repro_mode(repro_mode)
        .with_budget_mode(BudgetMode::SoftDegrade);

    let n = usize::from(cursor.next_u8()) % (MAX_POINTS + 1);
    let signal: Vec<f64> = (0..n).map(|_| build_value(&mut cursor)).collect();

    if let Ok(outcome) = segmenter.segment_signal(&signal, &ctx) {
        let segmentation = &outcome.selection.segmentation;
        assert_eq!(segmentation.n(), signal.len());
        assert!(segmentation.segment_count() >= 1);
        assert!(outcome.selection.selected <= outcome.diagnostics.evaluated_segments);
    }

    if let Ok(trajectory) = Trajectory::from_signal("fuzz", &signal) {
        if let Ok(segmented) = segmenter.segment(&trajectory, &ctx) {
            assert_eq!(segmented.points.len(), signal.len());
            assert!(!segmented.points.first().is_some_and(|point| point.segment_start));
        }
    }
});

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Exact dynamic-programming segmentation with MDL model selection.

pub mod assembler;
pub mod batch;
pub mod optimizer;
pub mod segmentation;
pub mod segmenter;
pub mod selector;

pub use assembler::{SegmentedPoint, SegmentedTrajectory, assemble};
pub use batch::segment_batch;
pub use optimizer::{DpTables, optimize};
pub use segmentation::Segmentation;
pub use segmenter::{CostStorage, Segmenter, SegmenterConfig, SignalSegmentation};
pub use selector::{ModelSelection, mdl_score, select_segment_count};

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::repro::ReproMode;
use std::borrow::Cow;

/// Diagnostics schema version for segmentation run metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// MDL score of one evaluated segment count.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MdlTrace {
    pub segment_count: usize,
    pub negative_log_likelihood: f64,
    pub penalty: f64,
    pub mdl: f64,
}

/// Structured diagnostics captured from one trajectory's segmentation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub n: usize,
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub cost_model: Cow<'static, str>,
    pub repro_mode: ReproMode,
    /// K as configured.
    pub max_segments: usize,
    /// Largest k actually evaluated, `min(K, N / 2)`.
    pub evaluated_segments: usize,
    pub selected_segments: usize,
    pub mdl_trace: Vec<MdlTrace>,
    pub dp_cells: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            n: 0,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            cost_model: Cow::Borrowed(""),
            repro_mode: ReproMode::Balanced,
            max_segments: 0,
            evaluated_segments: 0,
            selected_segments: 0,
            mdl_trace: vec![],
            dp_cells: 0,
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Controls how span statistics are accumulated and whether DP rows may be
/// filled in parallel.
///
/// - `Strict`: Kahan-compensated prefix sums, sequential sweep.
/// - `Balanced`: plain prefix sums, sequential sweep.
/// - `Fast`: plain prefix sums; rows may be filled on the rayon pool when no
///   cancellation token or time budget needs polling.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReproMode {
    Strict,
    #[default]
    Balanced,
    Fast,
}

impl ReproMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Fast => "fast",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReproMode;

    #[test]
    fn repro_mode_default_is_balanced() {
        assert_eq!(ReproMode::default(), ReproMode::Balanced);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn repro_mode_serializes_as_snake_case() {
        for mode in [ReproMode::Strict, ReproMode::Balanced, ReproMode::Fast] {
            let encoded = serde_json::to_string(&mode).expect("repro mode should serialize");
            assert_eq!(encoded, format!("\"{}\"", mode.as_str()));
            let decoded: ReproMode =
                serde_json::from_str(&encoded).expect("repro mode should deserialize");
            assert_eq!(decoded, mode);
        }
    }
}

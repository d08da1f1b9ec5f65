// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Prefix sums with a leading zero: `out[i] = values[..i].sum()`.
pub fn prefix_sums(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() + 1);
    let mut acc = 0.0;
    out.push(acc);
    for &value in values {
        acc += value;
        out.push(acc);
    }
    out
}

/// Kahan-compensated variant of [`prefix_sums`].
pub fn prefix_sums_kahan(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len() + 1);
    let mut sum = 0.0;
    let mut compensation = 0.0;
    out.push(sum);
    for &value in values {
        let y = value - compensation;
        let t = sum + y;
        compensation = (t - sum) - y;
        sum = t;
        out.push(sum);
    }
    out
}

/// Prefix sums of squared values, optionally Kahan-compensated.
pub fn prefix_sums_of_squares(values: &[f64], compensated: bool) -> Vec<f64> {
    let squares: Vec<f64> = values.iter().map(|value| value * value).collect();
    if compensated {
        prefix_sums_kahan(&squares)
    } else {
        prefix_sums(&squares)
    }
}

#[cfg(test)]
mod tests {
    use super::{prefix_sums, prefix_sums_kahan, prefix_sums_of_squares};

    #[test]
    fn prefix_sums_have_leading_zero() {
        assert_eq!(prefix_sums(&[]), vec![0.0]);
        assert_eq!(prefix_sums(&[1.0, 2.0, 3.0]), vec![0.0, 1.0, 3.0, 6.0]);
        assert_eq!(
            prefix_sums_of_squares(&[1.0, 2.0, 3.0], false),
            vec![0.0, 1.0, 5.0, 14.0]
        );
    }

    #[test]
    fn kahan_recovers_small_terms_lost_by_naive_sum() {
        let mut values = vec![1.0e16];
        values.extend(std::iter::repeat_n(1.0, 1_000));
        values.push(-1.0e16);

        let naive = prefix_sums(&values);
        let kahan = prefix_sums_kahan(&values);
        assert_eq!(kahan.last().copied(), Some(1_000.0));
        assert_ne!(naive.last().copied(), Some(1_000.0));
    }
}

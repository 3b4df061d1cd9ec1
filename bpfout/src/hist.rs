//! Histogram bucketing for log2 and linear histograms
//!
//! Both renderers share these helpers to find the printed range of a
//! histogram, the bounds of each bucket and the scale of the bars. The slot
//! arithmetic itself lives in `bpfout_common` so the kernel side agrees.
//!
//! # Layouts
//!
//! ```text
//! log2:    [0] [1] [2, 4) [4, 8) ... [2^63, 2^64)
//!  slot:    0   1    2      3          64
//!
//! log2, k=1: [0] [1] [2] [3] [4, 6) [6, 8) ... [3*2^62, 2^64)
//!  slot:      0   1   2   3    4      5            127
//!
//! linear:  (..., min) [min, min+step) ... [.., max) [max, ...)
//!  slot:       0            1               n         n+1
//! ```

// Bucket arithmetic works on u64 counts and i64 bounds from the collector
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use bpfout_common::{linear_bucket_count, linear_params_degenerate, log2_bucket_count, LOG2_MAX_K};
use log::debug;

/// Width of a full-scale bar in text output
pub const BAR_WIDTH: usize = 52;

/// Printed range of a log2 histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Log2Range {
    /// First non-empty bucket
    pub min_index: usize,
    /// Last non-empty bucket
    pub max_index: usize,
    /// Largest single bucket count, the bar scale
    pub max_value: u64,
}

/// The slots of `values` a log2 histogram with `2^k` sub-buckets can address
///
/// A `u64` sample never lands past `log2_bucket_count(k)`, so longer slices
/// are cut there.
pub fn log2_slots(values: &[u64], k: u32) -> &[u64] {
    let count = log2_bucket_count(k);
    if values.len() > count {
        debug!("log2 histogram has {} slots, ignoring all past {count}", values.len());
    }
    &values[..values.len().min(count)]
}

/// Find the first and last non-empty bucket and the largest count
///
/// Returns `None` for an all-zero histogram, which prints nothing.
pub fn hist_prepare(values: &[u64], k: u32) -> Option<Log2Range> {
    let slots = log2_slots(values, k);
    let min_index = slots.iter().position(|&v| v > 0)?;
    let max_index = slots.iter().rposition(|&v| v > 0)?;
    let max_value = slots.iter().copied().max().unwrap_or(0);
    Some(Log2Range { min_index, max_index, max_value })
}

/// Inclusive `(low, high)` value bounds of log2 slot `index`
///
/// Values below `2^k` have a slot each; every power of two above is split
/// into `2^k` equal slots. `None` past the last slot.
pub fn log2_bucket_bounds(index: usize, k: u32) -> Option<(u64, u64)> {
    if index >= log2_bucket_count(k) {
        return None;
    }
    let k = k.min(LOG2_MAX_K);
    let sub = 1usize << k;
    if index < sub {
        return Some((index as u64, index as u64));
    }
    let rest = index - sub;
    let power = k + (rest >> k) as u32;
    let width = 1u64 << (power - k);
    let low = (1u64 << power) + (rest & (sub - 1)) as u64 * width;
    Some((low, low + (width - 1)))
}

/// `number` with a binary unit suffix when it is a multiple of one, e.g.
/// `1K`, `16M`, `8E`
pub fn hist_index_label(number: u128) -> String {
    const SUFFIXES: [(u32, char); 6] =
        [(60, 'E'), (50, 'P'), (40, 'T'), (30, 'G'), (20, 'M'), (10, 'K')];

    for (shift, suffix) in SUFFIXES {
        let unit = 1u128 << shift;
        if number >= unit && number % unit == 0 {
            return format!("{}{suffix}", number / unit);
        }
    }
    number.to_string()
}

/// Text label of a log2 slot with inclusive bounds: `[0]`, `[2, 4)`, `[1K, 2K)`
pub fn log2_bucket_label(low: u64, high: u64) -> String {
    if low == high {
        return format!("[{}]", hist_index_label(u128::from(low)));
    }
    format!(
        "[{}, {})",
        hist_index_label(u128::from(low)),
        hist_index_label(u128::from(high) + 1)
    )
}

/// Printed range of a linear histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRange {
    /// Interior buckets, excluding underflow and overflow
    pub buckets: usize,
    /// Last non-empty slot
    pub max_index: usize,
    /// Largest single bucket count, the bar scale
    pub max_value: u64,
    /// First non-empty slot
    pub start_index: usize,
    /// Lower printed bound of the first non-empty slot
    pub start_value: i64,
    /// Upper printed bound of the last non-empty slot
    pub end_value: i64,
}

/// Bounds of one linear histogram slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearBucket {
    /// Values below `min`
    Underflow { max: i64 },
    /// Values in `[low, high)`
    Interior { low: i64, high: i64 },
    /// Values at or above `max`
    Overflow { min: i64 },
}

impl LinearBucket {
    fn low(self) -> i64 {
        match self {
            Self::Underflow { max } => max,
            Self::Interior { low, .. } => low,
            Self::Overflow { min } => min,
        }
    }

    fn high(self) -> i64 {
        match self {
            Self::Underflow { max } => max,
            Self::Interior { high, .. } => high,
            Self::Overflow { min } => min,
        }
    }
}

/// Bounds of linear histogram slot `index`
///
/// Interior buckets tile `[min, max)` in `step` pieces, the last one is cut
/// short at `max` when the range is not a multiple of `step`.
pub fn linear_bucket_bounds(index: usize, min: i64, max: i64, step: i64) -> LinearBucket {
    let buckets = linear_bucket_count(min, max, step);
    if index == 0 {
        return LinearBucket::Underflow { max: min };
    }
    if index > buckets {
        return LinearBucket::Overflow { min: max };
    }
    if linear_params_degenerate(min, max, step) {
        return LinearBucket::Interior { low: min, high: max };
    }
    let low = min.saturating_add(step.saturating_mul((index as i64).saturating_sub(1)));
    let high = low.saturating_add(step).min(max);
    LinearBucket::Interior { low, high }
}

/// Find the populated slots of a linear histogram
///
/// `values` holds the underflow slot, the interior slots and the overflow
/// slot. Returns `None` when every slot is empty.
pub fn lhist_prepare(values: &[u64], min: i64, max: i64, step: i64) -> Option<LinearRange> {
    if linear_params_degenerate(min, max, step) {
        debug!("linear histogram min={min} max={max} step={step} degenerates to one bucket");
    }
    let buckets = linear_bucket_count(min, max, step);
    let slots = &values[..values.len().min(buckets.saturating_add(2))];

    let start_index = slots.iter().position(|&v| v > 0)?;
    let max_index = slots.iter().rposition(|&v| v > 0)?;
    let max_value = slots.iter().copied().max().unwrap_or(0);

    Some(LinearRange {
        buckets,
        max_index,
        max_value,
        start_index,
        start_value: linear_bucket_bounds(start_index, min, max, step).low(),
        end_value: linear_bucket_bounds(max_index, min, max, step).high(),
    })
}

/// Bound label for linear histograms, with K/M suffixes for 1024-multiple steps
pub fn lhist_index_label(number: i64, step: i64) -> String {
    const KILO: i64 = 1024;
    const MEGA: i64 = 1024 * 1024;

    if step % KILO != 0 || number == 0 {
        return number.to_string();
    }
    if number % MEGA == 0 {
        format!("{}M", number / MEGA)
    } else if number % KILO == 0 {
        format!("{}K", number / KILO)
    } else {
        number.to_string()
    }
}

/// Text label of a linear slot: `(..., 0)`, `[0, 10)`, `[100, ...)`
pub fn linear_bucket_label(bucket: LinearBucket, step: i64) -> String {
    match bucket {
        LinearBucket::Underflow { max } => format!("(..., {})", lhist_index_label(max, step)),
        LinearBucket::Interior { low, high } => {
            format!("[{}, {})", lhist_index_label(low, step), lhist_index_label(high, step))
        }
        LinearBucket::Overflow { min } => format!("[{}, ...)", lhist_index_label(min, step)),
    }
}

/// Bar length for `count` when `max_value` fills `width` columns
pub fn bar_len(count: u64, max_value: u64, width: usize) -> usize {
    if max_value == 0 {
        return 0;
    }
    (u128::from(count) * width as u128 / u128::from(max_value)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpfout_common::{linear_bucket, log2_bucket, log2_bucket_k, LOG2_BUCKETS};

    fn log2_hist(samples: &[u64]) -> Vec<u64> {
        let mut buckets = vec![0; LOG2_BUCKETS];
        for &s in samples {
            buckets[log2_bucket(s)] += 1;
        }
        buckets
    }

    #[test]
    fn test_empty_histogram_prints_nothing() {
        assert_eq!(hist_prepare(&[0; LOG2_BUCKETS], 0), None);
        assert_eq!(hist_prepare(&[], 0), None);
    }

    #[test]
    fn test_prepare_range_sums_to_total() {
        let samples = [0, 1, 3, 3, 7, 100, 1000];
        let values = log2_hist(&samples);
        let range = hist_prepare(&values, 0).unwrap();

        assert_eq!(range.min_index, 0);
        assert_eq!(range.max_index, log2_bucket(1000));
        assert_eq!(range.max_value, 2);
        let printed: u64 = values[range.min_index..=range.max_index].iter().sum();
        assert_eq!(printed, samples.len() as u64);
    }

    #[test]
    fn test_log2_bounds_tile_without_gaps() {
        assert_eq!(log2_bucket_bounds(0, 0), Some((0, 0)));
        assert_eq!(log2_bucket_bounds(1, 0), Some((1, 1)));
        assert_eq!(log2_bucket_bounds(2, 0), Some((2, 3)));
        for k in 0..=LOG2_MAX_K {
            let count = log2_bucket_count(k);
            let mut next_low = 0u64;
            for index in 0..count {
                let (low, high) = log2_bucket_bounds(index, k).unwrap();
                assert_eq!(low, next_low, "gap or overlap before slot {index} (k={k})");
                assert!(high >= low);
                assert_eq!(log2_bucket_k(low, k), index);
                assert_eq!(log2_bucket_k(high, k), index);
                next_low = high.wrapping_add(1);
            }
            assert_eq!(log2_bucket_bounds(count - 1, k).unwrap().1, u64::MAX);
            assert_eq!(log2_bucket_bounds(count, k), None);
        }
    }

    #[test]
    fn test_prepare_ignores_slots_past_last_bucket() {
        let mut values = vec![0u64; 130];
        values[3] = 2;
        values[129] = 1;
        let range = hist_prepare(&values, 0).unwrap();
        assert_eq!(range.max_index, 3);
        assert_eq!(range.max_value, 2);
        // the same slice is fully addressable with k=2
        assert_eq!(hist_prepare(&values, 2).unwrap().max_index, 129);
    }

    #[test]
    fn test_log2_labels() {
        let label = |index, k| {
            let (low, high) = log2_bucket_bounds(index, k).unwrap();
            log2_bucket_label(low, high)
        };
        assert_eq!(label(0, 0), "[0]");
        assert_eq!(label(1, 0), "[1]");
        assert_eq!(label(2, 0), "[2, 4)");
        assert_eq!(label(10, 0), "[512, 1K)");
        assert_eq!(label(11, 0), "[1K, 2K)");
        assert_eq!(label(21, 0), "[1M, 2M)");
        assert_eq!(label(64, 0), "[8E, 16E)");
        assert_eq!(label(3, 1), "[3]");
        assert_eq!(label(4, 1), "[4, 6)");
        assert_eq!(label(log2_bucket_k(1536, 1), 1), "[1536, 2K)");
        assert_eq!(hist_index_label(1 << 64), "16E");
        assert_eq!(hist_index_label(1000), "1000");
    }

    #[test]
    fn test_lhist_extreme_range_does_not_overflow() {
        let range = lhist_prepare(&[0, 1, 0], i64::MIN, i64::MAX, 1).unwrap();
        assert_eq!(range.start_index, 1);
        assert_eq!(range.start_value, i64::MIN);
        assert_eq!(range.end_value, i64::MIN + 1);
    }

    #[test]
    fn test_linear_bounds_tile_range() {
        let (min, max, step) = (0, 10, 3);
        let buckets = linear_bucket_count(min, max, step);
        let mut expected_low = min;
        for i in 1..=buckets {
            let LinearBucket::Interior { low, high } = linear_bucket_bounds(i, min, max, step)
            else {
                panic!("slot {i} should be interior");
            };
            assert_eq!(low, expected_low);
            assert!(high > low);
            assert_eq!(linear_bucket(low, min, max, step), i);
            assert_eq!(linear_bucket(high - 1, min, max, step), i);
            expected_low = high;
        }
        assert_eq!(expected_low, max);
        assert_eq!(linear_bucket_bounds(0, min, max, step), LinearBucket::Underflow { max: 0 });
        assert_eq!(
            linear_bucket_bounds(buckets + 1, min, max, step),
            LinearBucket::Overflow { min: 10 }
        );
    }

    #[test]
    fn test_lhist_prepare_trims_empty_slots() {
        // underflow, [0,10), [10,20), [20,30), overflow
        let values = [0, 0, 4, 1, 0];
        let range = lhist_prepare(&values, 0, 30, 10).unwrap();
        assert_eq!(range.buckets, 3);
        assert_eq!(range.start_index, 2);
        assert_eq!(range.max_index, 3);
        assert_eq!(range.max_value, 4);
        assert_eq!(range.start_value, 10);
        assert_eq!(range.end_value, 30);

        assert_eq!(lhist_prepare(&[0; 5], 0, 30, 10), None);
    }

    #[test]
    fn test_lhist_degenerate_params_single_bucket() {
        let range = lhist_prepare(&[1, 2, 3], 0, 100, 0).unwrap();
        assert_eq!(range.buckets, 1);
        assert_eq!(
            linear_bucket_bounds(1, 0, 100, 0),
            LinearBucket::Interior { low: 0, high: 100 }
        );
        assert!(lhist_prepare(&[0, 5, 0], 50, 10, 5).is_some());
    }

    #[test]
    fn test_lhist_labels() {
        assert_eq!(lhist_index_label(2048, 1024), "2K");
        assert_eq!(lhist_index_label(3 * 1024 * 1024, 1024), "3M");
        assert_eq!(lhist_index_label(2048, 1000), "2048");
        assert_eq!(lhist_index_label(0, 1024), "0");
        assert_eq!(linear_bucket_label(LinearBucket::Underflow { max: 0 }, 10), "(..., 0)");
        assert_eq!(linear_bucket_label(LinearBucket::Overflow { min: 100 }, 10), "[100, ...)");
    }

    #[test]
    fn test_bar_len_scales() {
        assert_eq!(bar_len(10, 10, BAR_WIDTH), BAR_WIDTH);
        assert_eq!(bar_len(5, 10, BAR_WIDTH), 26);
        assert_eq!(bar_len(0, 10, BAR_WIDTH), 0);
        assert_eq!(bar_len(3, 0, BAR_WIDTH), 0);
    }
}

//! Time-series windowing
//!
//! Places the sparse samples of one key onto a fixed-width window of
//! `num_intervals` epochs ending at the key's latest epoch, so every rendered
//! series has the same length no matter how many samples were collected.

use crate::domain::{Epoch, TimeSeries};

/// One position of a rendered window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSlot {
    /// `None` for positions before epoch 0
    pub epoch: Option<Epoch>,
    /// `None` when nothing was collected for this epoch
    pub value: Option<i64>,
}

/// Window of exactly `num_intervals` slots ending at `last_epoch`, oldest first
///
/// Values are divided by `div` (0 is treated as 1).
pub fn window(series: &TimeSeries, last_epoch: Epoch, num_intervals: u64, div: u64) -> Vec<WindowSlot> {
    let div = i64::try_from(div.max(1)).unwrap_or(i64::MAX);
    (0..num_intervals)
        .rev()
        .map(|offset| {
            let epoch = last_epoch.0.checked_sub(offset).map(Epoch);
            let value = epoch.and_then(|e| series.get(&e)).map(|v| v / div);
            WindowSlot { epoch, value }
        })
        .collect()
}

/// Smallest and largest value present in a window
pub fn window_bounds(slots: &[WindowSlot]) -> Option<(i64, i64)> {
    let mut values = slots.iter().filter_map(|s| s.value);
    let first = values.next()?;
    Some(values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// Wall-clock style `hh:mm:ss` label of an epoch's start time
pub fn epoch_label(epoch: Epoch, interval_ns: u64) -> String {
    let secs = epoch.0.saturating_mul(interval_ns) / 1_000_000_000;
    format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
}

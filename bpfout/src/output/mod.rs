//! Output format abstraction layer
//!
//! The [`Output`] trait is the renderer interface: one method per artifact
//! (map dump, histogram, time series, statistics, scalar value and the
//! various status messages). Implementations only provide leaf formatting
//! and delimiters; the default `*_contents` methods do the shared work of
//! walking the key-ordered entries, applying `top`, decoding keys and values
//! and joining the results.
//!
//! # Design
//!
//! - [`text::TextOutput`]: aligned, human-first output with ASCII bars
//! - [`json::JsonOutput`]: one self-describing JSON record per call
//!
//! Both borrow their output and error streams for their whole lifetime, so
//! tests can render into a `Vec<u8>` and several renderers can coexist.
//! Every writing method returns `Err` on a short buffer or a failed write;
//! callers treat either as fatal.

pub mod escape;
pub mod json;
pub mod text;

pub use json::JsonOutput;
pub use text::TextOutput;

use crate::decode::{self, RenderContext, ValueFormatter};
use crate::domain::{
    Epoch, HelperErrorInfo, MapDescriptor, MapValueKind, MessageKind, RawKeyValue, RenderError,
    TimeSeries, TimeSeriesMap, TypeDescriptor,
};
use std::collections::{BTreeMap, HashMap};

pub type Result<T> = std::result::Result<T, RenderError>;

/// Log2 buckets of every key, looked up by raw key bytes
pub type HistMap = HashMap<Vec<u8>, Vec<u64>>;

/// The first `top` entries in supplied order, or all of them when `top == 0`
pub fn take_top<T>(entries: &[T], top: usize) -> &[T] {
    if top == 0 {
        entries
    } else {
        &entries[..top.min(entries.len())]
    }
}

/// Renderer interface shared by text and JSON output
pub trait Output: ValueFormatter {
    /// Per-CPU slot count and other collector facts
    fn context(&self) -> RenderContext;

    // Artifacts

    /// Write a plain map dump
    fn map(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()>;

    /// Write a histogram map; entries follow `total_counts_by_key` order
    fn map_hist(
        &mut self,
        map: &MapDescriptor,
        top: usize,
        div: u64,
        values_by_key: &HistMap,
        total_counts_by_key: &[(Vec<u8>, u64)],
    ) -> Result<()>;

    /// Write a time-series map; entries follow `latest_epoch_by_key` order
    fn map_tseries(
        &mut self,
        map: &MapDescriptor,
        div: u64,
        values_by_key: &TimeSeriesMap,
        latest_epoch_by_key: &[(Vec<u8>, Epoch)],
    ) -> Result<()>;

    /// Write count/average/total of a stats map
    fn map_stats(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()>;

    /// Write a single non-map value
    fn value(&mut self, ty: &TypeDescriptor, value: &[u8]) -> Result<()>;

    /// Write a free-text event
    fn message(&mut self, kind: MessageKind, msg: &str, nl: bool) -> Result<()>;

    fn lost_events(&mut self, lost: u64) -> Result<()>;

    fn attached_probes(&mut self, num_probes: u64) -> Result<()>;

    /// Describe a failed in-kernel helper call
    fn helper_error(&mut self, retcode: i32, info: &HelperErrorInfo) -> Result<()>;

    fn benchmark_results(&mut self, results: &BTreeMap<String, u32>) -> Result<()>;

    // Leaf formatting

    /// Format a log2 histogram with `2^k` sub-buckets, counts divided by `div`
    fn hist_to_str(&self, values: &[u64], div: u64, k: u32) -> String;

    /// Format a linear histogram with underflow and overflow slots
    fn lhist_to_str(&self, values: &[u64], min: i64, max: i64, step: i64) -> String;

    /// Format one key's series over the window ending at `last_epoch`
    fn tseries_to_str(
        &self,
        values: &TimeSeries,
        last_epoch: Epoch,
        interval_ns: u64,
        num_intervals: u64,
        div: u64,
    ) -> String;

    /// Format the key of one map entry
    fn map_key_to_str(&self, map: &MapDescriptor, key: &[u8]) -> Result<String>;

    /// Write one entry
    fn map_key_val(&mut self, map: &MapDescriptor, key: &str, val: &str) -> Result<()>;

    /// Write the separator between two entries
    fn map_elem_delim(&mut self, map: &MapDescriptor) -> Result<()>;

    /// Format count/average/total style pairs
    fn key_value_pairs_to_str(&self, pairs: &[(&str, String)]) -> String;

    // Default composition

    /// Decode a value against `ty`
    fn value_to_str(&self, ty: &TypeDescriptor, value: &[u8], div: u64, is_map_key: bool) -> Result<String> {
        decode::value_to_str(self, &self.context(), ty, value, div, is_map_key)
    }

    /// Decode a map key against the map's key type
    fn map_key_str(&self, map: &MapDescriptor, key: &[u8]) -> Result<String> {
        decode::key_to_str(self, &self.context(), &map.key, key)
    }

    /// Write up to `top` plain entries
    fn map_contents(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()> {
        let ctx = self.context().for_map(map);
        let value_type = map.value.value_type(map.per_cpu)?;

        for (i, (key, value)) in take_top(values_by_key, top).iter().enumerate() {
            if i > 0 {
                self.map_elem_delim(map)?;
            }
            let key_str = self.map_key_to_str(map, key)?;
            let value_str = decode::value_to_str(&*self, &ctx, &value_type, value, div, false)?;
            self.map_key_val(map, &key_str, &value_str)?;
        }
        Ok(())
    }

    /// Write up to `top` histogram entries
    fn map_hist_contents(
        &mut self,
        map: &MapDescriptor,
        top: usize,
        div: u64,
        values_by_key: &HistMap,
        total_counts_by_key: &[(Vec<u8>, u64)],
    ) -> Result<()> {
        // rejects exponents and ranges no histogram map could hold
        map.value.hist_slots()?;

        for (i, (key, _total)) in take_top(total_counts_by_key, top).iter().enumerate() {
            let key_str = self.map_key_to_str(map, key)?;
            let values = values_by_key
                .get(key)
                .ok_or_else(|| RenderError::MissingKey(key_str.clone()))?;

            let value_str = match map.value {
                MapValueKind::Hist { k } => self.hist_to_str(values, div, k),
                MapValueKind::LinearHist { min, max, step } => self.lhist_to_str(values, min, max, step),
                ref other => {
                    return Err(RenderError::InvalidDescriptor(format!(
                        "{} is not a histogram ({other:?})",
                        map.name
                    )))
                }
            };
            if i > 0 {
                self.map_elem_delim(map)?;
            }
            self.map_key_val(map, &key_str, &value_str)?;
        }
        Ok(())
    }

    /// Write every time-series entry
    fn map_tseries_contents(
        &mut self,
        map: &MapDescriptor,
        div: u64,
        values_by_key: &TimeSeriesMap,
        latest_epoch_by_key: &[(Vec<u8>, Epoch)],
    ) -> Result<()> {
        let MapValueKind::TimeSeries { interval_ns, num_intervals } = map.value else {
            return Err(RenderError::InvalidDescriptor(format!("{} is not a time series", map.name)));
        };
        let empty = TimeSeries::new();

        for (i, (key, last_epoch)) in latest_epoch_by_key.iter().enumerate() {
            if i > 0 {
                self.map_elem_delim(map)?;
            }
            let key_str = self.map_key_to_str(map, key)?;
            let series = values_by_key.get(key).unwrap_or(&empty);
            let value_str = self.tseries_to_str(series, *last_epoch, interval_ns, num_intervals, div);
            self.map_key_val(map, &key_str, &value_str)?;
        }
        Ok(())
    }

    /// Write up to `top` stats entries
    fn map_stats_contents(
        &mut self,
        map: &MapDescriptor,
        top: usize,
        div: u64,
        values_by_key: &[RawKeyValue],
    ) -> Result<()> {
        let ctx = self.context().for_map(map);
        let value_type = map.value.value_type(map.per_cpu)?;
        let div = i128::from(div.max(1));

        for (i, (key, value)) in take_top(values_by_key, top).iter().enumerate() {
            if i > 0 {
                self.map_elem_delim(map)?;
            }
            let key_str = self.map_key_to_str(map, key)?;
            let stats = decode::read_stats(&ctx, &value_type, value)?;
            let pairs = [
                ("count", stats.count.to_string()),
                ("average", (stats.average() / div).to_string()),
                ("total", (stats.total / div).to_string()),
            ];
            let value_str = self.key_value_pairs_to_str(&pairs);
            self.map_key_val(map, &key_str, &value_str)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_top_keeps_supplied_order() {
        let entries = [1, 2, 3, 4, 5];
        assert_eq!(take_top(&entries, 2), &[1, 2]);
        assert_eq!(take_top(&entries, 0), &entries);
        assert_eq!(take_top(&entries, 10), &entries);
        assert!(take_top::<u8>(&[], 3).is_empty());
    }
}

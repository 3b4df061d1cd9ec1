//! Human-readable output
//!
//! ```text
//! @bytes[sshd]: 1024
//! @bytes[bash]: 96
//!
//! @latency:
//! [0]                    3 |@@@@@@@@@@@@@@@@@@@@@@@@@@                          |
//! [1]                    6 |@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@@|
//! [2, 4)                 1 |@@@@@@@@                                            |
//! ```

// Plot positions are small and bounded by PLOT_WIDTH
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use super::{HistMap, Output, Result};
use crate::decode::{RenderContext, ValueFormatter};
use crate::domain::{
    Epoch, HelperErrorInfo, MapDescriptor, MessageKind, RawKeyValue, TimeSeries, TimeSeriesMap,
    TypeDescriptor,
};
use crate::helpers::{helper_error_msg, helper_label};
use crate::hist::{
    bar_len, hist_prepare, lhist_prepare, linear_bucket_bounds, linear_bucket_label,
    log2_bucket_bounds, log2_bucket_label, BAR_WIDTH,
};
use crate::tseries::{epoch_label, window, window_bounds};
use log::debug;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;

/// Columns between the frame of a time-series plot
const PLOT_WIDTH: usize = 50;

/// Width of the time label column of a time-series plot
const LABEL_WIDTH: usize = 10;

/// Tabular, human-first renderer
pub struct TextOutput<'a> {
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
    ctx: RenderContext,
}

impl<'a> TextOutput<'a> {
    /// Create a renderer writing results to `out` and warnings to `err`
    pub fn new(out: &'a mut dyn Write, err: &'a mut dyn Write, ctx: RenderContext) -> Self {
        Self { out, err, ctx }
    }

    fn histogram_row(res: &mut String, label: &str, count: u64, shown: u64, max_value: u64) {
        let bar = "@".repeat(bar_len(count, max_value, BAR_WIDTH));
        let _ = writeln!(res, "{label:<16}{shown:>8} |{bar:<BAR_WIDTH$}|");
    }
}

impl ValueFormatter for TextOutput<'_> {
    fn field_to_str(&self, name: &str, value: &str, _is_map_key: bool) -> String {
        format!(".{name} = {value}")
    }

    fn tuple_to_str(&self, elems: &[String], is_map_key: bool) -> String {
        if is_map_key {
            elems.join(", ")
        } else {
            format!("({})", elems.join(", "))
        }
    }

    fn string_to_str(&self, bytes: &[u8], _is_map_key: bool) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl Output for TextOutput<'_> {
    fn context(&self) -> RenderContext {
        self.ctx
    }

    fn map(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()> {
        if values_by_key.is_empty() {
            debug!("{} is empty, nothing to print", map.name);
            return Ok(());
        }
        self.map_contents(map, top, div, values_by_key)?;
        writeln!(self.out)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn map_hist(
        &mut self,
        map: &MapDescriptor,
        top: usize,
        div: u64,
        values_by_key: &HistMap,
        total_counts_by_key: &[(Vec<u8>, u64)],
    ) -> Result<()> {
        if total_counts_by_key.is_empty() {
            debug!("{} is empty, nothing to print", map.name);
            return Ok(());
        }
        self.map_hist_contents(map, top, div, values_by_key, total_counts_by_key)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn map_tseries(
        &mut self,
        map: &MapDescriptor,
        div: u64,
        values_by_key: &TimeSeriesMap,
        latest_epoch_by_key: &[(Vec<u8>, Epoch)],
    ) -> Result<()> {
        if latest_epoch_by_key.is_empty() {
            debug!("{} is empty, nothing to print", map.name);
            return Ok(());
        }
        self.map_tseries_contents(map, div, values_by_key, latest_epoch_by_key)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn map_stats(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()> {
        if values_by_key.is_empty() {
            debug!("{} is empty, nothing to print", map.name);
            return Ok(());
        }
        self.map_stats_contents(map, top, div, values_by_key)?;
        writeln!(self.out)?;
        writeln!(self.out)?;
        Ok(())
    }

    fn value(&mut self, ty: &TypeDescriptor, value: &[u8]) -> Result<()> {
        let value = self.value_to_str(ty, value, 1, false)?;
        writeln!(self.out, "{value}")?;
        Ok(())
    }

    fn message(&mut self, _kind: MessageKind, msg: &str, nl: bool) -> Result<()> {
        write!(self.out, "{msg}")?;
        if nl {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn lost_events(&mut self, lost: u64) -> Result<()> {
        writeln!(self.out, "Lost {lost} events")?;
        Ok(())
    }

    fn attached_probes(&mut self, num_probes: u64) -> Result<()> {
        let noun = if num_probes == 1 { "probe" } else { "probes" };
        writeln!(self.out, "Attaching {num_probes} {noun}...")?;
        Ok(())
    }

    fn helper_error(&mut self, retcode: i32, info: &HelperErrorInfo) -> Result<()> {
        if let Some(loc) = &info.location {
            write!(self.err, "{}:{}:{}: ", loc.filename, loc.line, loc.column)?;
        }
        writeln!(self.err, "WARNING: {}", helper_error_msg(info.func_id, retcode))?;
        writeln!(
            self.err,
            "Additional Info - helper: {}, retcode: {retcode}",
            helper_label(info.func_id)
        )?;
        Ok(())
    }

    fn benchmark_results(&mut self, results: &BTreeMap<String, u32>) -> Result<()> {
        let name_width = results.keys().map(String::len).chain(["BENCHMARK".len()]).max().unwrap_or(0);
        let count_width = results.values().map(|c| c.to_string().len()).chain(["COUNT".len()]).max().unwrap_or(0);
        let border = format!("+-{}-+-{}-+", "-".repeat(name_width), "-".repeat(count_width));

        writeln!(self.out, "{border}")?;
        writeln!(self.out, "| {:<name_width$} | {:<count_width$} |", "BENCHMARK", "COUNT")?;
        writeln!(self.out, "{border}")?;
        for (name, count) in results {
            writeln!(self.out, "| {name:<name_width$} | {count:>count_width$} |")?;
        }
        writeln!(self.out, "{border}")?;
        Ok(())
    }

    fn hist_to_str(&self, values: &[u64], div: u64, k: u32) -> String {
        let Some(range) = hist_prepare(values, k) else {
            return String::new();
        };
        let mut res = String::new();
        for (i, &count) in values.iter().enumerate().take(range.max_index + 1).skip(range.min_index) {
            let Some((low, high)) = log2_bucket_bounds(i, k) else {
                break;
            };
            let label = log2_bucket_label(low, high);
            Self::histogram_row(&mut res, &label, count, count / div.max(1), range.max_value);
        }
        res
    }

    fn lhist_to_str(&self, values: &[u64], min: i64, max: i64, step: i64) -> String {
        let Some(range) = lhist_prepare(values, min, max, step) else {
            return String::new();
        };
        let mut res = String::new();
        for (i, &count) in values.iter().enumerate().take(range.max_index + 1).skip(range.start_index) {
            let label = linear_bucket_label(linear_bucket_bounds(i, min, max, step), step);
            Self::histogram_row(&mut res, &label, count, count, range.max_value);
        }
        res
    }

    fn tseries_to_str(
        &self,
        values: &TimeSeries,
        last_epoch: Epoch,
        interval_ns: u64,
        num_intervals: u64,
        div: u64,
    ) -> String {
        let slots = window(values, last_epoch, num_intervals, div);
        let bounds = window_bounds(&slots);
        let half = PLOT_WIDTH / 2;
        let mut res = String::new();

        if let Some((lo, hi)) = bounds {
            let _ = writeln!(res, "{:LABEL_WIDTH$} {lo:<half$}{hi:>half$}", "");
        }
        for slot in &slots {
            let label = slot.epoch.map(|e| epoch_label(e, interval_ns)).unwrap_or_default();
            match (slot.value, bounds) {
                (Some(v), Some((lo, hi))) => {
                    let pos = if hi == lo {
                        0
                    } else {
                        ((i128::from(v) - i128::from(lo)) * (PLOT_WIDTH as i128 - 1)
                            / (i128::from(hi) - i128::from(lo))) as usize
                    };
                    let plot = format!("{:pos$}*{:rest$}", "", "", rest = PLOT_WIDTH - pos - 1);
                    let _ = writeln!(res, "{label:<LABEL_WIDTH$}|{plot}| {v}");
                }
                _ => {
                    let _ = writeln!(res, "{label:<LABEL_WIDTH$}|{:PLOT_WIDTH$}|", "");
                }
            }
        }
        res
    }

    fn map_key_to_str(&self, map: &MapDescriptor, key: &[u8]) -> Result<String> {
        if map.key.is_none() {
            return Ok(map.name.clone());
        }
        Ok(format!("{}[{}]", map.name, self.map_key_str(map, key)?))
    }

    fn map_key_val(&mut self, map: &MapDescriptor, key: &str, val: &str) -> Result<()> {
        if map.value.is_multiline() {
            writeln!(self.out, "{key}:")?;
        } else {
            write!(self.out, "{key}: ")?;
        }
        write!(self.out, "{val}")?;
        Ok(())
    }

    fn map_elem_delim(&mut self, _map: &MapDescriptor) -> Result<()> {
        writeln!(self.out)?;
        Ok(())
    }

    fn key_value_pairs_to_str(&self, pairs: &[(&str, String)]) -> String {
        pairs.iter().map(|(k, v)| format!("{k} {v}")).collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MapValueKind;
    use bpfout_common::{log2_bucket, log2_bucket_k, LOG2_BUCKETS};

    fn render(f: impl FnOnce(&mut TextOutput<'_>) -> Result<()>) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        {
            let mut text = TextOutput::new(&mut out, &mut err, RenderContext::new(2));
            f(&mut text).unwrap();
        }
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn test_array_and_struct_defaults() {
        render(|t| {
            assert_eq!(t.array_to_str(&[]), "[]");
            assert_eq!(t.array_to_str(&["a".to_string(), "b".to_string()]), "[a, b]");
            assert_eq!(t.struct_to_str(&[]), "{}");
            Ok(())
        });
    }

    #[test]
    fn test_map_with_keys() {
        let map = MapDescriptor::new("@bytes", TypeDescriptor::uint(4), MapValueKind::Sum { signed: false });
        let values = vec![
            (7u32.to_le_bytes().to_vec(), 100u64.to_le_bytes().to_vec()),
            (9u32.to_le_bytes().to_vec(), 20u64.to_le_bytes().to_vec()),
        ];
        let (out, _) = render(|t| t.map(&map, 0, 1, &values));
        assert_eq!(out, "@bytes[7]: 100\n@bytes[9]: 20\n\n");
    }

    #[test]
    fn test_keyless_map() {
        let map = MapDescriptor::new("@", TypeDescriptor::None, MapValueKind::Count);
        let values = vec![(Vec::new(), 42u64.to_le_bytes().to_vec())];
        let (out, _) = render(|t| t.map(&map, 0, 1, &values));
        assert_eq!(out, "@: 42\n\n");
    }

    #[test]
    fn test_per_cpu_count_is_summed() {
        let map = MapDescriptor::new("@c", TypeDescriptor::None, MapValueKind::Count).per_cpu();
        let mut value = 3u64.to_le_bytes().to_vec();
        value.extend_from_slice(&4u64.to_le_bytes());
        let (out, _) = render(|t| t.map(&map, 0, 1, &[(Vec::new(), value)]));
        assert_eq!(out, "@c: 7\n\n");
    }

    #[test]
    fn test_hist_rows() {
        let map = MapDescriptor::new("@lat", TypeDescriptor::None, MapValueKind::Hist { k: 0 });
        let mut buckets = vec![0u64; LOG2_BUCKETS];
        buckets[log2_bucket(1)] = 2;
        buckets[log2_bucket(5)] = 1;
        let hists = HistMap::from([(Vec::new(), buckets)]);
        let (out, _) = render(|t| t.map_hist(&map, 0, 1, &hists, &[(Vec::new(), 3)]));

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "@lat:");
        assert_eq!(lines[1], format!("{:<16}{:>8} |{}|", "[1]", 2, "@".repeat(52)));
        assert_eq!(lines[2], format!("{:<16}{:>8} |{:<52}|", "[2, 4)", 0, ""));
        assert_eq!(lines[3], format!("{:<16}{:>8} |{:<52}|", "[4, 8)", 1, "@".repeat(26)));
        assert_eq!(lines[4], "");
    }

    #[test]
    fn test_hist_slots_past_last_bucket_are_ignored() {
        let map = MapDescriptor::new("@lat", TypeDescriptor::None, MapValueKind::Hist { k: 0 });
        let mut buckets = vec![0u64; 130];
        buckets[log2_bucket(2)] = 1;
        buckets[129] = 1;
        let hists = HistMap::from([(Vec::new(), buckets)]);
        let (out, _) = render(|t| t.map_hist(&map, 0, 1, &hists, &[(Vec::new(), 2)]));
        assert_eq!(out, format!("@lat:\n{:<16}{:>8} |{}|\n\n", "[2, 4)", 1, "@".repeat(52)));
    }

    #[test]
    fn test_hist_sub_bucket_rows() {
        let map = MapDescriptor::new("@lat", TypeDescriptor::None, MapValueKind::Hist { k: 1 });
        let mut buckets = vec![0u64; bpfout_common::log2_bucket_count(1)];
        buckets[log2_bucket_k(4, 1)] = 2;
        buckets[log2_bucket_k(7, 1)] = 1;
        let hists = HistMap::from([(Vec::new(), buckets)]);
        let (out, _) = render(|t| t.map_hist(&map, 0, 1, &hists, &[(Vec::new(), 3)]));

        let labels: Vec<&str> = out.lines().skip(1).filter_map(|l| l.split_whitespace().next()).collect();
        assert_eq!(labels, vec!["[4,", "[6,"]);
        assert!(out.contains("[4, 6)"));
        assert!(out.contains("[6, 8)"));
    }

    #[test]
    fn test_lhist_labels_in_output() {
        let map = MapDescriptor::new("@l", TypeDescriptor::None, MapValueKind::LinearHist { min: 0, max: 20, step: 10 });
        let hists = HistMap::from([(Vec::new(), vec![1, 0, 2, 1])]);
        let (out, _) = render(|t| t.map_hist(&map, 0, 1, &hists, &[(Vec::new(), 4)]));
        assert!(out.contains("(..., 0)"));
        assert!(out.contains("[0, 10)"));
        assert!(out.contains("[10, 20)"));
        assert!(out.contains("[20, ...)"));
    }

    #[test]
    fn test_stats_pairs() {
        let map = MapDescriptor::new("@s", TypeDescriptor::uint(4), MapValueKind::Stats { signed: false });
        let mut value = 30u64.to_le_bytes().to_vec();
        value.extend_from_slice(&3u64.to_le_bytes());
        let (out, _) = render(|t| t.map_stats(&map, 0, 1, &[(1u32.to_le_bytes().to_vec(), value)]));
        assert_eq!(out, "@s[1]: count 3, average 10, total 30\n\n");
    }

    #[test]
    fn test_tseries_rows_have_fixed_count() {
        let map = MapDescriptor::new(
            "@ts",
            TypeDescriptor::None,
            MapValueKind::TimeSeries { interval_ns: 1_000_000_000, num_intervals: 5 },
        );
        let series = TimeSeries::from([(Epoch(10), 1), (Epoch(12), 5)]);
        let values = TimeSeriesMap::from([(Vec::new(), series)]);
        let (out, _) = render(|t| t.map_tseries(&map, 1, &values, &[(Vec::new(), Epoch(12))]));

        let rows: Vec<&str> = out.lines().filter(|l| l.contains('|')).collect();
        assert_eq!(rows.len(), 5);
        assert!(rows[2].starts_with("00:00:10"));
        assert!(rows[2].ends_with("| 1"));
        assert!(rows[2].contains("|*"));
        assert!(rows[4].ends_with("*| 5"));
        assert!(rows[3].ends_with(&format!("|{}|", " ".repeat(PLOT_WIDTH))));
    }

    #[test]
    fn test_status_messages() {
        let (out, _) = render(|t| {
            t.attached_probes(1)?;
            t.attached_probes(3)?;
            t.lost_events(12)?;
            t.message(MessageKind::Printf, "hello", false)?;
            t.message(MessageKind::Printf, " world", true)
        });
        assert_eq!(out, "Attaching 1 probe...\nAttaching 3 probes...\nLost 12 events\nhello world\n");
    }

    #[test]
    fn test_helper_error_goes_to_err() {
        let info = HelperErrorInfo {
            func_id: bpfout_common::BPF_FUNC_MAP_UPDATE_ELEM,
            location: Some(crate::domain::SourceLocation { filename: "prog.bt".to_string(), line: 3, column: 7 }),
        };
        let (out, err) = render(|t| t.helper_error(-libc::E2BIG, &info));
        assert!(out.is_empty());
        assert!(err.starts_with("prog.bt:3:7: WARNING: Map full"));
        assert!(err.contains("helper: map_update_elem, retcode: -7"));
    }

    #[test]
    fn test_benchmark_table() {
        let results = BTreeMap::from([("loop".to_string(), 1200), ("a".to_string(), 5)]);
        let (out, _) = render(|t| t.benchmark_results(&results));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+-----------+-------+");
        assert_eq!(lines[1], "| BENCHMARK | COUNT |");
        assert_eq!(lines[3], "| a         |     5 |");
        assert_eq!(lines[4], "| loop      |  1200 |");
    }
}

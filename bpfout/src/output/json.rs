//! Machine-readable output
//!
//! Every artifact becomes one JSON object on its own line:
//!
//! ```text
//! {"type":"map","data":{"@bytes":{"sshd":1024,"bash":96}}}
//! {"type":"hist","data":{"@latency":[{"min":1,"max":1,"count":6}]}}
//! {"type":"lost_events","data":{"events":3}}
//! ```
//!
//! Fixed-shape records are built as [`serde_json::Value`] and serialized
//! directly. Map records are streamed: the envelope is opened, each entry is
//! written as it is decoded and the envelope is closed.
//!
//! Map keys are built in key context (strings unquoted, tuples joined with
//! `,`) and serialized once as a whole, so any key is a valid JSON string.
//! Strings in values keep every raw byte through [`escape`].

use super::escape::escape;
use super::{take_top, HistMap, Output, Result};
use crate::decode::{hex, RenderContext, ValueFormatter};
use crate::domain::{
    Epoch, HelperErrorInfo, MapDescriptor, MapValueKind, MessageKind, RawKeyValue, TimeSeries,
    TimeSeriesMap, TypeDescriptor,
};
use crate::helpers::{helper_error_msg, helper_label};
use crate::hist::{hist_prepare, lhist_prepare, linear_bucket_bounds, log2_bucket_bounds, LinearBucket};
use crate::tseries::window;
use log::{debug, warn};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;

/// One-record-per-line JSON renderer
pub struct JsonOutput<'a> {
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
    ctx: RenderContext,
}

impl<'a> JsonOutput<'a> {
    /// Create a renderer writing records to `out`
    ///
    /// `err` only receives problems with the output itself; helper errors
    /// are records like everything else and go to `out`.
    pub fn new(out: &'a mut dyn Write, err: &'a mut dyn Write, ctx: RenderContext) -> Self {
        Self { out, err, ctx }
    }

    /// Serialize one complete record on its own line
    fn write_record(&mut self, record: &Value) -> Result<()> {
        serde_json::to_writer(&mut *self.out, record)?;
        writeln!(self.out)?;
        Ok(())
    }

    /// Write `{"type":kind,"data":{"name":...}}` around `body`
    fn map_record(
        &mut self,
        kind: MessageKind,
        map: &MapDescriptor,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let keyed = !map.key.is_none();
        write!(self.out, r#"{{"type":{},"data":{{{}:"#, Value::from(kind.as_str()), Value::from(map.name.as_str()))?;
        if keyed {
            write!(self.out, "{{")?;
        }
        body(self)?;
        if keyed {
            write!(self.out, "}}")?;
        }
        writeln!(self.out, "}}}}")?;
        Ok(())
    }

    /// Entries to render; a map without keys is a single JSON value, so only
    /// its first entry can be shown
    fn entry_limit(map: &MapDescriptor, entries: usize, top: usize) -> usize {
        if !map.key.is_none() {
            return top;
        }
        if entries > 1 {
            warn!("{} has no key but {entries} entries, rendering only the first", map.name);
        }
        1
    }

    fn hist_kind(map: &MapDescriptor) -> MessageKind {
        match map.value {
            MapValueKind::LinearHist { .. } => MessageKind::Lhist,
            _ => MessageKind::Hist,
        }
    }
}

impl ValueFormatter for JsonOutput<'_> {
    fn field_to_str(&self, name: &str, value: &str, is_map_key: bool) -> String {
        if is_map_key {
            // the whole key is serialized once later
            format!(r#""{name}": {value}"#)
        } else {
            format!("{}: {value}", Value::from(name))
        }
    }

    fn tuple_to_str(&self, elems: &[String], is_map_key: bool) -> String {
        if is_map_key {
            elems.join(",")
        } else {
            format!("[{}]", elems.join(", "))
        }
    }

    fn string_to_str(&self, bytes: &[u8], is_map_key: bool) -> String {
        if is_map_key {
            String::from_utf8_lossy(bytes).into_owned()
        } else {
            format!("\"{}\"", escape(bytes))
        }
    }

    fn pointer_to_str(&self, addr: u64, is_map_key: bool) -> String {
        let addr = format!("0x{addr:016x}");
        if is_map_key {
            addr
        } else {
            Value::from(addr).to_string()
        }
    }

    fn buffer_to_str(&self, bytes: &[u8], is_map_key: bool) -> String {
        if is_map_key {
            hex(bytes)
        } else {
            Value::from(hex(bytes)).to_string()
        }
    }
}

impl Output for JsonOutput<'_> {
    fn context(&self) -> RenderContext {
        self.ctx
    }

    fn map(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()> {
        if values_by_key.is_empty() {
            debug!("{} is empty, skipping record", map.name);
            return Ok(());
        }
        let top = Self::entry_limit(map, values_by_key.len(), top);
        self.map_record(MessageKind::Map, map, |json| json.map_contents(map, top, div, values_by_key))
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
            debug!("{} is empty, skipping record", map.name);
            return Ok(());
        }
        let top = Self::entry_limit(map, total_counts_by_key.len(), top);
        self.map_record(Self::hist_kind(map), map, |json| {
            json.map_hist_contents(map, top, div, values_by_key, total_counts_by_key)
        })
    }

    fn map_tseries(
        &mut self,
        map: &MapDescriptor,
        div: u64,
        values_by_key: &TimeSeriesMap,
        latest_epoch_by_key: &[(Vec<u8>, Epoch)],
    ) -> Result<()> {
        if latest_epoch_by_key.is_empty() {
            debug!("{} is empty, skipping record", map.name);
            return Ok(());
        }
        let latest = take_top(latest_epoch_by_key, Self::entry_limit(map, latest_epoch_by_key.len(), 0));
        self.map_record(MessageKind::Tseries, map, |json| {
            json.map_tseries_contents(map, div, values_by_key, latest)
        })
    }

    fn map_stats(&mut self, map: &MapDescriptor, top: usize, div: u64, values_by_key: &[RawKeyValue]) -> Result<()> {
        if values_by_key.is_empty() {
            debug!("{} is empty, skipping record", map.name);
            return Ok(());
        }
        let top = Self::entry_limit(map, values_by_key.len(), top);
        self.map_record(MessageKind::Stats, map, |json| json.map_stats_contents(map, top, div, values_by_key))
    }

    fn value(&mut self, ty: &TypeDescriptor, value: &[u8]) -> Result<()> {
        let mut data = self.value_to_str(ty, value, 1, false)?;
        if data.is_empty() {
            data = Value::Null.to_string();
        }
        writeln!(self.out, r#"{{"type":{},"data":{data}}}"#, Value::from(MessageKind::Value.as_str()))?;
        Ok(())
    }

    fn message(&mut self, kind: MessageKind, msg: &str, _nl: bool) -> Result<()> {
        self.write_record(&json!({"type": kind, "data": msg}))
    }

    fn lost_events(&mut self, lost: u64) -> Result<()> {
        self.write_record(&json!({"type": MessageKind::LostEvents, "data": {"events": lost}}))
    }

    fn attached_probes(&mut self, num_probes: u64) -> Result<()> {
        self.write_record(&json!({"type": MessageKind::AttachedProbes, "data": {"probes": num_probes}}))
    }

    fn helper_error(&mut self, retcode: i32, info: &HelperErrorInfo) -> Result<()> {
        let mut record = json!({
            "type": MessageKind::HelperError,
            "msg": helper_error_msg(info.func_id, retcode),
            "helper": helper_label(info.func_id),
            "retcode": retcode,
        });
        if let Some(loc) = &info.location {
            record["filename"] = json!(loc.filename);
            record["line"] = json!(loc.line);
            record["col"] = json!(loc.column);
        }
        self.write_record(&record)
    }

    fn benchmark_results(&mut self, results: &BTreeMap<String, u32>) -> Result<()> {
        self.write_record(&json!({"type": MessageKind::BenchmarkResults, "data": results}))
    }

    fn hist_to_str(&self, values: &[u64], div: u64, k: u32) -> String {
        let Some(range) = hist_prepare(values, k) else {
            return json!([]).to_string();
        };
        let buckets: Vec<Value> = values
            .iter()
            .enumerate()
            .take(range.max_index + 1)
            .skip(range.min_index)
            .filter_map(|(i, count)| {
                let (low, high) = log2_bucket_bounds(i, k)?;
                Some(json!({"min": low, "max": high, "count": count / div.max(1)}))
            })
            .collect();
        Value::Array(buckets).to_string()
    }

    fn lhist_to_str(&self, values: &[u64], min: i64, max: i64, step: i64) -> String {
        let Some(range) = lhist_prepare(values, min, max, step) else {
            return json!([]).to_string();
        };
        let buckets: Vec<Value> = values
            .iter()
            .enumerate()
            .take(range.max_index + 1)
            .skip(range.start_index)
            .map(|(i, count)| match linear_bucket_bounds(i, min, max, step) {
                LinearBucket::Underflow { max } => json!({"max": max.saturating_sub(1), "count": count}),
                LinearBucket::Interior { low, high } => {
                    json!({"min": low, "max": high.saturating_sub(1).max(low), "count": count})
                }
                LinearBucket::Overflow { min } => json!({"min": min, "count": count}),
            })
            .collect();
        Value::Array(buckets).to_string()
    }

    fn tseries_to_str(
        &self,
        values: &TimeSeries,
        last_epoch: Epoch,
        interval_ns: u64,
        num_intervals: u64,
        div: u64,
    ) -> String {
        let slots: Vec<Option<i64>> =
            window(values, last_epoch, num_intervals, div).iter().map(|slot| slot.value).collect();
        json!({"interval_ns": interval_ns, "last_epoch": last_epoch, "values": slots}).to_string()
    }

    fn map_key_to_str(&self, map: &MapDescriptor, key: &[u8]) -> Result<String> {
        if map.key.is_none() {
            return Ok(String::new());
        }
        Ok(Value::from(self.map_key_str(map, key)?).to_string())
    }

    fn map_key_val(&mut self, map: &MapDescriptor, key: &str, val: &str) -> Result<()> {
        if map.key.is_none() {
            write!(self.out, "{val}")?;
        } else {
            write!(self.out, "{key}:{val}")?;
        }
        Ok(())
    }

    fn map_elem_delim(&mut self, _map: &MapDescriptor) -> Result<()> {
        write!(self.out, ",")?;
        Ok(())
    }

    fn key_value_pairs_to_str(&self, pairs: &[(&str, String)]) -> String {
        let fields: serde_json::Map<String, Value> = pairs
            .iter()
            .map(|(name, value)| {
                let value = serde_json::from_str::<serde_json::Number>(value)
                    .map_or_else(|_| Value::from(value.as_str()), Value::Number);
                ((*name).to_string(), value)
            })
            .collect();
        Value::Object(fields).to_string()
    }
}

impl Drop for JsonOutput<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            let _ = writeln!(self.err, "failed to flush JSON output: {e}");
        }
    }
}

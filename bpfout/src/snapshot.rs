//! Replayable snapshots of collected data
//!
//! A snapshot is a JSON document holding everything a tracing session would
//! hand to a renderer: map descriptors with their raw key/value bytes,
//! histogram buckets, time-series samples, status messages and helper
//! errors. Helper errors come either already resolved or as the raw event
//! the kernel emitted, looked up in `helper_errors` by `error_id`.
//! Replaying a snapshot through an [`Output`] produces exactly what the live
//! session would have printed.
//!
//! ```json
//! {
//!   "ncpus": 4,
//!   "attached_probes": 1,
//!   "items": [
//!     {"item": "map",
//!      "map": {"name": "@c", "key": {"kind": "integer", "width": 4, "signed": false},
//!              "value": {"kind": "count"}},
//!      "entries": [{"key": [1, 0, 0, 0], "value": [3, 0, 0, 0, 0, 0, 0, 0]}]}
//!   ]
//! }
//! ```
//!
//! Byte buffers are arrays of byte values, in the collector's native
//! (little-endian) layout.

use crate::domain::{
    Epoch, HelperErrorInfo, MapDescriptor, MapValueKind, MessageKind, RawKeyValue, RenderError,
    SnapshotError, TimeSeries, TimeSeriesMap, TypeDescriptor,
};
use crate::helpers::{read_helper_error_event, resolve_helper_error, HelperErrorTable};
use crate::output::{HistMap, Output};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One key/value pair of a map, as raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    #[serde(default)]
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Buckets of one histogram key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistEntry {
    #[serde(default)]
    pub key: Vec<u8>,
    pub buckets: Vec<u64>,
}

/// `(epoch, value)` samples of one time-series key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesEntry {
    #[serde(default)]
    pub key: Vec<u8>,
    pub samples: Vec<(u64, i64)>,
}

fn default_nl() -> bool {
    true
}

/// One renderer call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum SnapshotItem {
    Map { map: MapDescriptor, entries: Vec<MapEntry> },
    Hist { map: MapDescriptor, entries: Vec<HistEntry> },
    Tseries { map: MapDescriptor, entries: Vec<SeriesEntry> },
    Stats { map: MapDescriptor, entries: Vec<MapEntry> },
    Value {
        #[serde(rename = "type")]
        ty: TypeDescriptor,
        value: Vec<u8>,
    },
    Message {
        kind: MessageKind,
        msg: String,
        #[serde(default = "default_nl")]
        nl: bool,
    },
    HelperError { retcode: i32, info: HelperErrorInfo },
    /// Raw `HelperErrorEvent` bytes
    HelperErrorEvent { event: Vec<u8> },
    Benchmark { results: BTreeMap<String, u32> },
}

impl SnapshotItem {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Map { .. } => "map",
            Self::Hist { .. } => "hist",
            Self::Tseries { .. } => "tseries",
            Self::Stats { .. } => "stats",
            Self::Value { .. } => "value",
            Self::Message { .. } => "message",
            Self::HelperError { .. } => "helper_error",
            Self::HelperErrorEvent { .. } => "helper_error_event",
            Self::Benchmark { .. } => "benchmark",
        }
    }

    /// Reject items whose map descriptor cannot render their entries
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Hist { map, entries } => {
                if !matches!(map.value, MapValueKind::Hist { .. } | MapValueKind::LinearHist { .. }) {
                    return Err(format!("{} is not a histogram map", map.name));
                }
                let expected = map.value.hist_slots().map_err(|e| format!("{}: {e}", map.name))?;
                if let Some(bad) = entries.iter().find(|e| e.buckets.len() != expected) {
                    return Err(format!(
                        "{} has {} buckets for a key, expected {expected}",
                        map.name,
                        bad.buckets.len()
                    ));
                }
                Ok(())
            }
            Self::Tseries { map, .. } if !matches!(map.value, MapValueKind::TimeSeries { .. }) => {
                Err(format!("{} is not a time-series map", map.name))
            }
            Self::Stats { map, .. } if !matches!(map.value, MapValueKind::Avg { .. } | MapValueKind::Stats { .. }) => {
                Err(format!("{} is not a stats map", map.name))
            }
            _ => Ok(()),
        }
    }
}

/// Everything one session rendered, in order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Possible CPUs on the collecting host; `None` means this host's
    #[serde(default)]
    pub ncpus: Option<usize>,
    #[serde(default)]
    pub attached_probes: Option<u64>,
    #[serde(default)]
    pub lost_events: u64,
    /// Call sites of helper errors by `error_id`
    #[serde(default)]
    pub helper_errors: HelperErrorTable,
    #[serde(default)]
    pub items: Vec<SnapshotItem>,
}

impl Snapshot {
    /// Parse and validate a snapshot
    pub fn from_reader(reader: impl Read) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_reader(reader)?;
        for (index, item) in snapshot.items.iter().enumerate() {
            item.validate()
                .map_err(|e| SnapshotError::ParseFailed(format!("item {index}: {e}")))?;
        }
        debug!("Loaded snapshot with {} items", snapshot.items.len());
        Ok(snapshot)
    }

    pub fn from_path(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        info!("Reading snapshot from {}", path.display());
        Self::from_reader(BufReader::new(file))
    }

    /// Replay every item through `out`
    ///
    /// The attached-probe count comes first and lost events last, the way a
    /// live session reports them.
    pub fn render(&self, out: &mut dyn Output, top: usize, div: u64) -> Result<(), SnapshotError> {
        let fail = |index: usize, item: &'static str| {
            move |source: RenderError| SnapshotError::RenderFailed { index, item, source }
        };

        if let Some(probes) = self.attached_probes {
            out.attached_probes(probes).map_err(fail(0, "attached_probes"))?;
        }
        for (index, item) in self.items.iter().enumerate() {
            self.render_item(out, item, top, div).map_err(fail(index, item.name()))?;
        }
        if self.lost_events > 0 {
            out.lost_events(self.lost_events)
                .map_err(fail(self.items.len(), "lost_events"))?;
        }
        Ok(())
    }

    fn render_item(&self, out: &mut dyn Output, item: &SnapshotItem, top: usize, div: u64) -> crate::output::Result<()> {
        match item {
            SnapshotItem::Map { map, entries } => out.map(map, top, div, &raw_pairs(entries)),
            SnapshotItem::Stats { map, entries } => out.map_stats(map, top, div, &raw_pairs(entries)),
            SnapshotItem::Hist { map, entries } => {
                let totals: Vec<(Vec<u8>, u64)> =
                    entries.iter().map(|e| (e.key.clone(), e.buckets.iter().sum())).collect();
                let buckets: HistMap = entries.iter().map(|e| (e.key.clone(), e.buckets.clone())).collect();
                out.map_hist(map, top, div, &buckets, &totals)
            }
            SnapshotItem::Tseries { map, entries } => {
                let latest: Vec<(Vec<u8>, Epoch)> = entries
                    .iter()
                    .map(|e| {
                        let last = e.samples.iter().map(|&(epoch, _)| epoch).max().unwrap_or(0);
                        (e.key.clone(), Epoch(last))
                    })
                    .collect();
                let series: TimeSeriesMap = entries
                    .iter()
                    .map(|e| {
                        let samples: TimeSeries = e.samples.iter().map(|&(epoch, v)| (Epoch(epoch), v)).collect();
                        (e.key.clone(), samples)
                    })
                    .collect();
                out.map_tseries(map, div, &series, &latest)
            }
            SnapshotItem::Value { ty, value } => out.value(ty, value),
            SnapshotItem::Message { kind, msg, nl } => out.message(*kind, msg, *nl),
            SnapshotItem::HelperError { retcode, info } => out.helper_error(*retcode, info),
            SnapshotItem::HelperErrorEvent { event } => {
                let event = read_helper_error_event(event)?;
                let info = resolve_helper_error(&self.helper_errors, &event)?;
                out.helper_error(event.return_value, info)
            }
            SnapshotItem::Benchmark { results } => out.benchmark_results(results),
        }
    }
}

fn raw_pairs(entries: &[MapEntry]) -> Vec<RawKeyValue> {
    entries.iter().map(|e| (e.key.clone(), e.value.clone())).collect()
}

//! Domain types describing the shape of collected data
//!
//! A [`TypeDescriptor`] tells the decoder how to read a raw byte buffer, a
//! [`MapDescriptor`] ties a map's key and value shapes together with its
//! aggregation semantics, and [`MessageKind`] tags every rendered record.

use super::RenderError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Time-series step (one `interval_ns` wide), monotonically increasing per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw `(key, value)` pair as handed over by the map iteration layer
pub type RawKeyValue = (Vec<u8>, Vec<u8>);

/// Samples of one key, ordered by epoch
pub type TimeSeries = BTreeMap<Epoch, i64>;

/// Time series of every key of a map, keyed by the raw key bytes
pub type TimeSeriesMap = HashMap<Vec<u8>, TimeSeries>;

/// How the per-core slots of a per-CPU value collapse into one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuReduce {
    /// Add up all slots (counts, sums)
    Sum,
    /// Smallest slot
    Min,
    /// Largest slot
    Max,
    /// Slots are `(total, count)` pairs; total of totals over total of counts
    Average,
    /// Keep every slot, rendered as an ordered per-core array
    List,
}

/// Named member of a struct, at a fixed byte offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub offset: usize,
}

/// Runtime description of a value's binary shape
///
/// Integers are little-endian. Tuple and map-key elements are laid out like
/// the members of a C struct; struct fields carry explicit offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    /// Zero-sized, used as the key of a map without keys
    None,
    Integer {
        width: usize,
        signed: bool,
    },
    Bool,
    String {
        max_len: usize,
    },
    Buffer {
        len: usize,
    },
    Pointer,
    Array {
        elem: Box<TypeDescriptor>,
        count: usize,
    },
    Struct {
        fields: Vec<Field>,
        size: usize,
    },
    Tuple {
        elems: Vec<TypeDescriptor>,
    },
    MapKey {
        elems: Vec<TypeDescriptor>,
    },
    /// One `inner` slot per possible CPU
    PerCpu {
        inner: Box<TypeDescriptor>,
        reduce: CpuReduce,
    },
}

impl TypeDescriptor {
    pub fn uint(width: usize) -> Self {
        Self::Integer { width, signed: false }
    }

    pub fn int(width: usize) -> Self {
        Self::Integer { width, signed: true }
    }

    pub fn string(max_len: usize) -> Self {
        Self::String { max_len }
    }

    pub fn array(elem: TypeDescriptor, count: usize) -> Self {
        Self::Array { elem: Box::new(elem), count }
    }

    pub fn tuple(elems: Vec<TypeDescriptor>) -> Self {
        Self::Tuple { elems }
    }

    pub fn map_key(elems: Vec<TypeDescriptor>) -> Self {
        Self::MapKey { elems }
    }

    pub fn per_cpu(inner: TypeDescriptor, reduce: CpuReduce) -> Self {
        Self::PerCpu { inner: Box::new(inner), reduce }
    }

    /// Build a struct with C layout from `(name, type)` members
    pub fn record<N: Into<String>>(members: Vec<(N, TypeDescriptor)>) -> Self {
        let types: Vec<&TypeDescriptor> = members.iter().map(|(_, ty)| ty).collect();
        let (offsets, size) = c_layout(types.into_iter());
        let fields = members
            .into_iter()
            .zip(offsets)
            .map(|((name, ty), offset)| Field { name: name.into(), ty, offset })
            .collect();
        Self::Struct { fields, size }
    }

    /// Declared size in bytes; for `PerCpu` the size of a single slot
    ///
    /// Saturates at `usize::MAX` for absurd descriptors, which no buffer can
    /// satisfy.
    pub fn size(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Integer { width, .. } => *width,
            Self::Bool => 1,
            Self::String { max_len } => *max_len,
            Self::Buffer { len } => *len,
            Self::Pointer => 8,
            Self::Array { elem, count } => elem.size().saturating_mul(*count),
            Self::Struct { size, .. } => *size,
            Self::Tuple { elems } | Self::MapKey { elems } => c_layout(elems.iter()).1,
            Self::PerCpu { inner, .. } => inner.size(),
        }
    }

    /// Natural alignment in bytes
    pub fn align(&self) -> usize {
        match self {
            Self::None | Self::Bool | Self::String { .. } | Self::Buffer { .. } => 1,
            Self::Integer { width, .. } => (*width).max(1),
            Self::Pointer => 8,
            Self::Array { elem, .. } => elem.align(),
            Self::Struct { fields, .. } => {
                fields.iter().map(|f| f.ty.align()).max().unwrap_or(1)
            }
            Self::Tuple { elems } | Self::MapKey { elems } => {
                elems.iter().map(TypeDescriptor::align).max().unwrap_or(1)
            }
            Self::PerCpu { inner, .. } => inner.align(),
        }
    }

    /// Byte offsets of tuple or map-key elements
    pub fn element_offsets(elems: &[TypeDescriptor]) -> Vec<usize> {
        c_layout(elems.iter()).0
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Offsets of each member and the padded total size, C struct rules
fn c_layout<'a>(members: impl Iterator<Item = &'a TypeDescriptor>) -> (Vec<usize>, usize) {
    let mut offsets = Vec::new();
    let mut cursor: usize = 0;
    let mut max_align: usize = 1;
    for ty in members {
        let align = ty.align();
        max_align = max_align.max(align);
        cursor = align_up(cursor, align);
        offsets.push(cursor);
        cursor = cursor.saturating_add(ty.size());
    }
    (offsets, align_up(cursor, max_align))
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.checked_next_multiple_of(align).unwrap_or(usize::MAX)
}

/// What a map's values mean, which decides how they are rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapValueKind {
    /// Value stored by plain assignment
    Plain {
        #[serde(rename = "type")]
        ty: TypeDescriptor,
    },
    Count,
    Sum {
        signed: bool,
    },
    Min {
        signed: bool,
    },
    Max {
        signed: bool,
    },
    /// `(total, count)` slots
    Avg {
        signed: bool,
    },
    /// `(total, count)` slots, rendered as count/average/total
    Stats {
        signed: bool,
    },
    /// Log2 histogram, each power of two split into `2^k` linear slots
    Hist {
        #[serde(default)]
        k: u32,
    },
    /// Linear histogram over `[min, max)` in `step` wide buckets
    LinearHist {
        min: i64,
        max: i64,
        step: i64,
    },
    TimeSeries {
        interval_ns: u64,
        num_intervals: u64,
    },
}

impl MapValueKind {
    /// Descriptor the decoder uses for one stored value
    ///
    /// Aggregations are always wrapped in `PerCpu`; a map that is not per-CPU
    /// simply has a single slot. Fails for histogram parameters no map could
    /// hold.
    pub fn value_type(&self, per_cpu: bool) -> Result<TypeDescriptor, RenderError> {
        let int = |signed: bool| TypeDescriptor::Integer { width: 8, signed };
        let ty = match self {
            Self::Plain { ty } if per_cpu => TypeDescriptor::per_cpu(ty.clone(), CpuReduce::List),
            Self::Plain { ty } => ty.clone(),
            Self::Count => TypeDescriptor::per_cpu(TypeDescriptor::uint(8), CpuReduce::Sum),
            Self::Sum { signed } => TypeDescriptor::per_cpu(int(*signed), CpuReduce::Sum),
            Self::Min { signed } => TypeDescriptor::per_cpu(int(*signed), CpuReduce::Min),
            Self::Max { signed } => TypeDescriptor::per_cpu(int(*signed), CpuReduce::Max),
            Self::Avg { signed } | Self::Stats { signed } => TypeDescriptor::per_cpu(
                TypeDescriptor::tuple(vec![int(*signed), TypeDescriptor::uint(8)]),
                CpuReduce::Average,
            ),
            Self::Hist { .. } | Self::LinearHist { .. } => {
                TypeDescriptor::array(TypeDescriptor::uint(8), self.hist_slots()?)
            }
            Self::TimeSeries { .. } => TypeDescriptor::int(8),
        };
        Ok(ty)
    }

    /// Bucket slots one key of a histogram map holds
    pub fn hist_slots(&self) -> Result<usize, RenderError> {
        match *self {
            Self::Hist { k } if k > bpfout_common::LOG2_MAX_K => Err(RenderError::InvalidDescriptor(
                format!("log2 sub-bucket exponent {k} exceeds {}", bpfout_common::LOG2_MAX_K),
            )),
            Self::Hist { k } => Ok(bpfout_common::log2_bucket_count(k)),
            Self::LinearHist { min, max, step } => bpfout_common::linear_slot_count(min, max, step)
                .ok_or_else(|| {
                    RenderError::InvalidDescriptor(format!(
                        "linear histogram min={min} max={max} step={step} needs more than {} buckets",
                        bpfout_common::MAX_LINEAR_BUCKETS
                    ))
                }),
            ref other => Err(RenderError::InvalidDescriptor(format!("{other:?} is not a histogram"))),
        }
    }

    /// Values are rendered on their own lines below the key
    pub fn is_multiline(&self) -> bool {
        matches!(self, Self::Hist { .. } | Self::LinearHist { .. } | Self::TimeSeries { .. })
    }
}

/// A map as known to the output layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDescriptor {
    /// Name including the `@` sigil
    pub name: String,
    #[serde(default = "no_key")]
    pub key: TypeDescriptor,
    pub value: MapValueKind,
    #[serde(default)]
    pub per_cpu: bool,
}

fn no_key() -> TypeDescriptor {
    TypeDescriptor::None
}

impl MapDescriptor {
    pub fn new(name: impl Into<String>, key: TypeDescriptor, value: MapValueKind) -> Self {
        Self { name: name.into(), key, value, per_cpu: false }
    }

    #[must_use]
    pub fn per_cpu(mut self) -> Self {
        self.per_cpu = true;
        self
    }
}

/// Source position of the call that triggered a helper error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

/// Identifies a failed in-kernel helper call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperErrorInfo {
    /// `bpf_func_id` of the helper
    pub func_id: u32,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

impl HelperErrorInfo {
    pub fn new(func_id: u32) -> Self {
        Self { func_id, location: None }
    }
}

/// Category of an emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Map,
    Value,
    Hist,
    Lhist,
    Tseries,
    Stats,
    Printf,
    Time,
    Cat,
    Join,
    Syscall,
    AttachedProbes,
    LostEvents,
    HelperError,
    BenchmarkResults,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Value => "value",
            Self::Hist => "hist",
            Self::Lhist => "lhist",
            Self::Tseries => "tseries",
            Self::Stats => "stats",
            Self::Printf => "printf",
            Self::Time => "time",
            Self::Cat => "cat",
            Self::Join => "join",
            Self::Syscall => "syscall",
            Self::AttachedProbes => "attached_probes",
            Self::LostEvents => "lost_events",
            Self::HelperError => "helper_error",
            Self::BenchmarkResults => "benchmark_results",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_layout_pads_like_c() {
        // u8 at 0, u64 at 8, u16 at 16; padded to 24
        let elems = vec![TypeDescriptor::uint(1), TypeDescriptor::uint(8), TypeDescriptor::uint(2)];
        assert_eq!(TypeDescriptor::element_offsets(&elems), vec![0, 8, 16]);
        assert_eq!(TypeDescriptor::tuple(elems).size(), 24);
    }

    #[test]
    fn test_record_offsets() {
        let ty = TypeDescriptor::record(vec![
            ("a", TypeDescriptor::uint(4)),
            ("b", TypeDescriptor::string(8)),
            ("c", TypeDescriptor::Bool),
        ]);
        let TypeDescriptor::Struct { fields, size } = &ty else {
            panic!("expected struct");
        };
        let offsets: Vec<usize> = fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 12]);
        assert_eq!(*size, 16);
        assert_eq!(ty.align(), 4);
    }

    #[test]
    fn test_aggregations_are_per_cpu() {
        let count = MapValueKind::Count.value_type(false).unwrap();
        assert_eq!(count, TypeDescriptor::per_cpu(TypeDescriptor::uint(8), CpuReduce::Sum));

        let avg = MapValueKind::Avg { signed: true }.value_type(true).unwrap();
        assert_eq!(avg.size(), 16);

        let plain = MapValueKind::Plain { ty: TypeDescriptor::uint(4) };
        assert_eq!(plain.value_type(false).unwrap(), TypeDescriptor::uint(4));
        assert!(matches!(
            plain.value_type(true).unwrap(),
            TypeDescriptor::PerCpu { reduce: CpuReduce::List, .. }
        ));
    }

    #[test]
    fn test_histogram_slot_counts() {
        assert_eq!(MapValueKind::Hist { k: 0 }.hist_slots().unwrap(), bpfout_common::LOG2_BUCKETS);
        assert_eq!(MapValueKind::Hist { k: 2 }.hist_slots().unwrap(), 252);
        assert!(MapValueKind::Hist { k: 6 }.value_type(false).is_err());

        let lhist = MapValueKind::LinearHist { min: 0, max: 30, step: 10 };
        assert_eq!(lhist.value_type(false).unwrap(), TypeDescriptor::array(TypeDescriptor::uint(8), 5));

        let huge = MapValueKind::LinearHist { min: i64::MIN, max: i64::MAX, step: 1 };
        assert!(matches!(huge.value_type(false), Err(RenderError::InvalidDescriptor(_))));
        assert!(MapValueKind::Count.hist_slots().is_err());

        let parsed: MapValueKind = serde_json::from_str(r#"{"kind": "hist"}"#).unwrap();
        assert_eq!(parsed, MapValueKind::Hist { k: 0 });
    }

    #[test]
    fn test_oversized_array_size_saturates() {
        let ty = TypeDescriptor::array(TypeDescriptor::uint(8), usize::MAX / 4);
        assert_eq!(ty.size(), usize::MAX);
        let tuple = TypeDescriptor::tuple(vec![TypeDescriptor::uint(1), ty]);
        assert_eq!(tuple.size(), usize::MAX);
    }

    #[test]
    fn test_message_kind_tags() {
        assert_eq!(MessageKind::AttachedProbes.to_string(), "attached_probes");
        assert_eq!(MessageKind::Lhist.to_string(), "lhist");
        let parsed: MessageKind = serde_json::from_str("\"helper_error\"").unwrap();
        assert_eq!(parsed, MessageKind::HelperError);
    }

    #[test]
    fn test_descriptor_from_json() {
        let ty: TypeDescriptor = serde_json::from_str(
            r#"{"kind": "array", "elem": {"kind": "integer", "width": 4, "signed": true}, "count": 3}"#,
        )
        .unwrap();
        assert_eq!(ty, TypeDescriptor::array(TypeDescriptor::int(4), 3));
        assert_eq!(ty.size(), 12);
    }
}

//! Type-directed decoding of raw map keys and values
//!
//! The decoder walks a [`TypeDescriptor`] and reads the matching bytes,
//! handing every composite (array, struct, tuple) and string-like leaf to a
//! [`ValueFormatter`] so that text and JSON output can share one decoder
//! while disagreeing on syntax.
//!
//! # Per-CPU values
//!
//! A `PerCpu` descriptor means the buffer holds one `inner` slot per
//! possible CPU. The number of slots comes from the [`RenderContext`]; how
//! the slots collapse into one value is carried on the descriptor as a
//! [`CpuReduce`] chosen by the collection layer.

// Integers are widened to i128 so sums over every CPU cannot overflow
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use crate::domain::{CpuReduce, MapDescriptor, RenderError, TypeDescriptor};
use log::debug;
use std::fmt::Write;

type Result<T> = std::result::Result<T, RenderError>;

/// Collector-supplied facts the decoder cannot derive from descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    /// Slots in a per-CPU value (possible CPUs, not online ones)
    pub ncpus: usize,
}

impl RenderContext {
    pub fn new(ncpus: usize) -> Self {
        Self { ncpus: ncpus.max(1) }
    }

    /// Context for values of `map`; maps that are not per-CPU have one slot
    #[must_use]
    pub fn for_map(self, map: &MapDescriptor) -> Self {
        if map.per_cpu {
            self
        } else {
            Self { ncpus: 1 }
        }
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Output-specific syntax for decoded values
///
/// `is_map_key` asks for syntax that is safe inside a composite map key
/// rather than for a standalone value.
pub trait ValueFormatter {
    /// Pair a struct member's name with its formatted value
    fn field_to_str(&self, name: &str, value: &str, is_map_key: bool) -> String;

    /// Join formatted tuple elements
    fn tuple_to_str(&self, elems: &[String], is_map_key: bool) -> String;

    /// Format string bytes (already cut at the terminator)
    fn string_to_str(&self, bytes: &[u8], is_map_key: bool) -> String;

    /// `[e1, e2, ...]`
    fn array_to_str(&self, elems: &[String]) -> String {
        format!("[{}]", elems.join(", "))
    }

    /// `{ e1, e2, ... }`, elements already formatted by `field_to_str`
    fn struct_to_str(&self, elems: &[String]) -> String {
        if elems.is_empty() {
            return "{}".to_string();
        }
        format!("{{ {} }}", elems.join(", "))
    }

    fn bool_to_str(&self, value: bool) -> String {
        value.to_string()
    }

    fn pointer_to_str(&self, addr: u64, _is_map_key: bool) -> String {
        format!("0x{addr:016x}")
    }

    fn buffer_to_str(&self, bytes: &[u8], _is_map_key: bool) -> String {
        hex(bytes)
    }
}

/// Lowercase hex, two digits per byte
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Count, total and average of `(total, count)` slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub count: i128,
    pub total: i128,
}

impl Stats {
    pub fn average(&self) -> i128 {
        if self.count == 0 {
            0
        } else {
            self.total / self.count
        }
    }
}

fn take<'a>(bytes: &'a [u8], needed: usize, what: &'static str) -> Result<&'a [u8]> {
    bytes.get(..needed).ok_or_else(|| RenderError::short(what, needed, bytes.len()))
}

/// Little-endian integer of `width` bytes, sign- or zero-extended
pub fn read_int(bytes: &[u8], width: usize, signed: bool) -> Result<i128> {
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(RenderError::InvalidDescriptor(format!("integer width {width}")));
    }
    let raw = take(bytes, width, "integer")?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(raw);
    let value = u64::from_le_bytes(buf);

    if signed {
        let shift = 64 - width as u32 * 8;
        Ok(i128::from(((value << shift) as i64) >> shift))
    } else {
        Ok(i128::from(value))
    }
}

fn integer_shape(ty: &TypeDescriptor) -> Result<(usize, bool)> {
    match ty {
        TypeDescriptor::Integer { width, signed } => Ok((*width, *signed)),
        other => Err(RenderError::InvalidDescriptor(format!(
            "numeric per-cpu reduction over {other:?}"
        ))),
    }
}

fn scale(value: i128, div: u64) -> i128 {
    value / i128::from(div.max(1))
}

/// Render `bytes` as a value of type `ty`
pub fn value_to_str<F: ValueFormatter + ?Sized>(
    fmt: &F,
    ctx: &RenderContext,
    ty: &TypeDescriptor,
    bytes: &[u8],
    div: u64,
    is_map_key: bool,
) -> Result<String> {
    match ty {
        TypeDescriptor::None => Ok(String::new()),
        TypeDescriptor::Integer { width, signed } => {
            Ok(scale(read_int(bytes, *width, *signed)?, div).to_string())
        }
        TypeDescriptor::Bool => {
            let raw = take(bytes, 1, "bool")?;
            Ok(fmt.bool_to_str(raw[0] != 0))
        }
        TypeDescriptor::String { max_len } => {
            let raw = take(bytes, *max_len, "string")?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            Ok(fmt.string_to_str(&raw[..end], is_map_key))
        }
        TypeDescriptor::Buffer { len } => Ok(fmt.buffer_to_str(take(bytes, *len, "buffer")?, is_map_key)),
        TypeDescriptor::Pointer => {
            let addr = read_int(bytes, 8, false)? as u64;
            Ok(fmt.pointer_to_str(addr, is_map_key))
        }
        TypeDescriptor::Array { elem, count } => {
            let stride = elem.size();
            let needed = stride.checked_mul(*count).ok_or_else(|| {
                RenderError::InvalidDescriptor(format!("array of {count} elements of {stride} bytes"))
            })?;
            let raw = take(bytes, needed, "array")?;
            let elems = (0..*count)
                .map(|i| value_to_str(fmt, ctx, elem, &raw[i * stride..], div, is_map_key))
                .collect::<Result<Vec<_>>>()?;
            Ok(fmt.array_to_str(&elems))
        }
        TypeDescriptor::Struct { fields, size } => {
            let raw = take(bytes, *size, "struct")?;
            let elems = fields
                .iter()
                .map(|field| {
                    let at = raw.get(field.offset..).unwrap_or_default();
                    let value = value_to_str(fmt, ctx, &field.ty, at, div, is_map_key)?;
                    Ok(fmt.field_to_str(&field.name, &value, is_map_key))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(fmt.struct_to_str(&elems))
        }
        TypeDescriptor::Tuple { elems } => {
            let parts = elements_to_str(fmt, ctx, ty, elems, bytes, div, is_map_key)?;
            Ok(fmt.tuple_to_str(&parts, is_map_key))
        }
        TypeDescriptor::MapKey { elems } => {
            let parts = elements_to_str(fmt, ctx, ty, elems, bytes, div, true)?;
            Ok(fmt.tuple_to_str(&parts, true))
        }
        TypeDescriptor::PerCpu { inner, reduce } => {
            per_cpu_to_str(fmt, ctx, inner, *reduce, bytes, div, is_map_key)
        }
    }
}

/// Render a map key; keys are never scaled
pub fn key_to_str<F: ValueFormatter + ?Sized>(
    fmt: &F,
    ctx: &RenderContext,
    ty: &TypeDescriptor,
    bytes: &[u8],
) -> Result<String> {
    value_to_str(fmt, ctx, ty, bytes, 1, true)
}

fn elements_to_str<F: ValueFormatter + ?Sized>(
    fmt: &F,
    ctx: &RenderContext,
    ty: &TypeDescriptor,
    elems: &[TypeDescriptor],
    bytes: &[u8],
    div: u64,
    is_map_key: bool,
) -> Result<Vec<String>> {
    let raw = take(bytes, ty.size(), "tuple")?;
    TypeDescriptor::element_offsets(elems)
        .into_iter()
        .zip(elems)
        .map(|(offset, elem)| value_to_str(fmt, ctx, elem, &raw[offset..], div, is_map_key))
        .collect()
}

/// Split a per-CPU buffer into its `ctx.ncpus` slots
fn cpu_slots<'a>(
    ctx: &RenderContext,
    inner: &TypeDescriptor,
    bytes: &'a [u8],
) -> Result<std::slice::ChunksExact<'a, u8>> {
    let slot = inner.size();
    if slot == 0 {
        return Err(RenderError::InvalidDescriptor("zero-sized per-cpu slot".to_string()));
    }
    let needed = slot.checked_mul(ctx.ncpus).ok_or_else(|| {
        RenderError::InvalidDescriptor(format!("{} per-cpu slots of {slot} bytes", ctx.ncpus))
    })?;
    if bytes.len() > needed {
        debug!("per-cpu value has {} bytes, only {needed} belong to {} cpus", bytes.len(), ctx.ncpus);
    }
    Ok(take(bytes, needed, "per-cpu value")?.chunks_exact(slot))
}

fn per_cpu_to_str<F: ValueFormatter + ?Sized>(
    fmt: &F,
    ctx: &RenderContext,
    inner: &TypeDescriptor,
    reduce: CpuReduce,
    bytes: &[u8],
    div: u64,
    is_map_key: bool,
) -> Result<String> {
    let slots = cpu_slots(ctx, inner, bytes)?;
    match reduce {
        CpuReduce::List => {
            let elems = slots
                .map(|slot| value_to_str(fmt, ctx, inner, slot, div, is_map_key))
                .collect::<Result<Vec<_>>>()?;
            Ok(fmt.array_to_str(&elems))
        }
        CpuReduce::Average => Ok(scale(stats_from_slots(inner, slots)?.average(), div).to_string()),
        CpuReduce::Sum | CpuReduce::Min | CpuReduce::Max => {
            let (width, signed) = integer_shape(inner)?;
            let values = slots.map(|slot| read_int(slot, width, signed)).collect::<Result<Vec<_>>>()?;
            let reduced: i128 = match reduce {
                CpuReduce::Sum => values.iter().sum(),
                CpuReduce::Min => values.iter().copied().min().unwrap_or(0),
                _ => values.iter().copied().max().unwrap_or(0),
            };
            Ok(scale(reduced, div).to_string())
        }
    }
}

fn stats_from_slots(inner: &TypeDescriptor, slots: std::slice::ChunksExact<'_, u8>) -> Result<Stats> {
    let TypeDescriptor::Tuple { elems } = inner else {
        return Err(RenderError::InvalidDescriptor(format!("average over {inner:?}")));
    };
    let [total_ty, count_ty] = elems.as_slice() else {
        return Err(RenderError::InvalidDescriptor("average needs (total, count)".to_string()));
    };
    let (total_width, total_signed) = integer_shape(total_ty)?;
    let (count_width, count_signed) = integer_shape(count_ty)?;
    let offsets = TypeDescriptor::element_offsets(elems);

    let mut stats = Stats::default();
    for slot in slots {
        stats.total += read_int(&slot[offsets[0]..], total_width, total_signed)?;
        stats.count += read_int(&slot[offsets[1]..], count_width, count_signed)?;
    }
    Ok(stats)
}

/// Count and total of a stats/avg value across all CPU slots
pub fn read_stats(ctx: &RenderContext, value_type: &TypeDescriptor, bytes: &[u8]) -> Result<Stats> {
    match value_type {
        TypeDescriptor::PerCpu { inner, reduce: CpuReduce::Average } => {
            stats_from_slots(inner, cpu_slots(ctx, inner, bytes)?)
        }
        other => Err(RenderError::InvalidDescriptor(format!("stats over {other:?}"))),
    }
}

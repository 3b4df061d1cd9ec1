//! # Shared Definitions (eBPF ↔ Userspace)
//!
//! Constants and bucket arithmetic that both the in-kernel programs and the
//! userspace renderers must agree on. Nothing here allocates, so the crate
//! stays `no_std` and can be linked into BPF objects as-is.
//!
//! ## Key Items
//!
//! - [`log2_bucket`] / [`log2_bucket_k`] - power-of-two histogram slots
//! - [`linear_bucket`] / [`linear_slot_count`] - fixed-width histogram slots
//! - [`HelperErrorEvent`] - record emitted when an in-kernel helper fails
//! - [`helper_name`] - names for `bpf_func_id` values reported in helper errors

#![no_std]
// Slot indices are bounded well below usize::MAX on every supported target
#![allow(clippy::cast_possible_truncation)]

// ============================================================================
// Log2 Histograms
// ============================================================================

/// Number of slots in a log2 histogram
///
/// Slot 0 counts the value zero, slot k (1..=64) counts values in
/// `[2^(k-1), 2^k)`. A `u64` can never land beyond slot 64.
pub const LOG2_BUCKETS: usize = 65;

/// Slot index for `value` in a log2 histogram
///
/// ```
/// assert_eq!(bpfout_common::log2_bucket(0), 0);
/// assert_eq!(bpfout_common::log2_bucket(1), 1);
/// assert_eq!(bpfout_common::log2_bucket(3), 2);
/// assert_eq!(bpfout_common::log2_bucket(4), 3);
/// ```
#[must_use]
pub const fn log2_bucket(value: u64) -> usize {
    (u64::BITS - value.leading_zeros()) as usize
}

/// Largest supported sub-bucket exponent; larger `k` is treated as this
pub const LOG2_MAX_K: u32 = 5;

const fn clamp_k(k: u32) -> u32 {
    if k > LOG2_MAX_K {
        LOG2_MAX_K
    } else {
        k
    }
}

/// Number of slots in a log2 histogram with `2^k` sub-buckets per power of two
///
/// Values below `2^k` get one slot each, every power of two from `2^k` up to
/// `2^63` is split into `2^k` equal slots. `k = 0` is [`LOG2_BUCKETS`].
#[must_use]
pub const fn log2_bucket_count(k: u32) -> usize {
    let k = clamp_k(k);
    (65 - k as usize) << k
}

/// Slot index for `value` in a log2 histogram with `2^k` sub-buckets
///
/// ```
/// assert_eq!(bpfout_common::log2_bucket_k(5, 0), bpfout_common::log2_bucket(5));
/// // k = 1: [0] [1] [2] [3] [4, 6) [6, 8) [8, 12) ...
/// assert_eq!(bpfout_common::log2_bucket_k(3, 1), 3);
/// assert_eq!(bpfout_common::log2_bucket_k(5, 1), 4);
/// assert_eq!(bpfout_common::log2_bucket_k(6, 1), 5);
/// ```
#[must_use]
pub const fn log2_bucket_k(value: u64, k: u32) -> usize {
    let k = clamp_k(k);
    let sub = 1u64 << k;
    if value < sub {
        return value as usize;
    }
    let power = u64::BITS - 1 - value.leading_zeros();
    let offset = (value - (1 << power)) >> (power - k);
    (sub + (power - k) as u64 * sub + offset) as usize
}

// ============================================================================
// Linear Histograms
// ============================================================================

/// Most interior slots a linear histogram may have
pub const MAX_LINEAR_BUCKETS: usize = 1 << 20;

/// Number of interior slots for a linear histogram over `[min, max)`
///
/// This is `ceil((max - min) / step)`. The underflow and overflow slots are
/// not included. Degenerate parameters (`step <= 0` or `max <= min`) collapse
/// to a single interior slot rather than dividing by zero.
#[must_use]
pub const fn linear_bucket_count(min: i64, max: i64, step: i64) -> usize {
    if step <= 0 || max <= min {
        return 1;
    }
    let span = max.abs_diff(min);
    let step = step.unsigned_abs();
    span.div_ceil(step) as usize
}

/// Whether `linear_bucket_count` had to fall back to a single slot
#[must_use]
pub const fn linear_params_degenerate(min: i64, max: i64, step: i64) -> bool {
    step <= 0 || max <= min
}

/// Total slots of a linear histogram, underflow and overflow included
///
/// `None` when the interior would exceed [`MAX_LINEAR_BUCKETS`].
#[must_use]
pub const fn linear_slot_count(min: i64, max: i64, step: i64) -> Option<usize> {
    let buckets = linear_bucket_count(min, max, step);
    if buckets > MAX_LINEAR_BUCKETS {
        None
    } else {
        Some(buckets + 2)
    }
}

/// Slot index for `value` in a linear histogram
///
/// Slot 0 is the underflow (`value < min`), slots `1..=n` are the interior
/// buckets and slot `n + 1` is the overflow (`value >= max`).
#[must_use]
pub const fn linear_bucket(value: i64, min: i64, max: i64, step: i64) -> usize {
    let buckets = linear_bucket_count(min, max, step);
    if value < min {
        return 0;
    }
    if value >= max {
        return buckets.saturating_add(1);
    }
    if linear_params_degenerate(min, max, step) {
        return 1;
    }
    (value.abs_diff(min) / step.unsigned_abs()) as usize + 1
}

// ============================================================================
// Helper Errors
// ============================================================================

/// Record emitted by a BPF program when a helper call fails
///
/// Layout must match the kernel side exactly. Integers are little-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperErrorEvent {
    /// Call site that failed, an index into the session's error table
    pub error_id: u64,

    /// Return value of the helper (a negative errno)
    pub return_value: i32,
}

/// Size of a [`HelperErrorEvent`] as emitted, trailing padding included
pub const HELPER_ERROR_EVENT_SIZE: usize = core::mem::size_of::<HelperErrorEvent>();

impl HelperErrorEvent {
    /// Read an event from raw bytes; `None` when fewer than
    /// [`HELPER_ERROR_EVENT_SIZE`] bytes are supplied
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..HELPER_ERROR_EVENT_SIZE)?;
        let mut error_id = [0u8; 8];
        error_id.copy_from_slice(&raw[..8]);
        let mut return_value = [0u8; 4];
        return_value.copy_from_slice(&raw[8..12]);
        Some(Self {
            error_id: u64::from_le_bytes(error_id),
            return_value: i32::from_le_bytes(return_value),
        })
    }
}

// ============================================================================
// BPF Helper Functions
// ============================================================================

/// `BPF_FUNC_map_lookup_elem`
pub const BPF_FUNC_MAP_LOOKUP_ELEM: u32 = 1;

/// `BPF_FUNC_map_update_elem`
pub const BPF_FUNC_MAP_UPDATE_ELEM: u32 = 2;

/// `BPF_FUNC_map_delete_elem`
pub const BPF_FUNC_MAP_DELETE_ELEM: u32 = 3;

/// `BPF_FUNC_probe_read`
pub const BPF_FUNC_PROBE_READ: u32 = 4;

/// `BPF_FUNC_probe_read_str`
pub const BPF_FUNC_PROBE_READ_STR: u32 = 45;

/// `BPF_FUNC_probe_read_user`
pub const BPF_FUNC_PROBE_READ_USER: u32 = 112;

/// `BPF_FUNC_probe_read_kernel`
pub const BPF_FUNC_PROBE_READ_KERNEL: u32 = 113;

/// `BPF_FUNC_probe_read_user_str`
pub const BPF_FUNC_PROBE_READ_USER_STR: u32 = 114;

/// `BPF_FUNC_probe_read_kernel_str`
pub const BPF_FUNC_PROBE_READ_KERNEL_STR: u32 = 115;

/// `BPF_FUNC_ringbuf_output`
pub const BPF_FUNC_RINGBUF_OUTPUT: u32 = 130;

/// Helper names indexed by `bpf_func_id`, for the contiguous low range
const LOW_HELPER_NAMES: [&str; 46] = [
    "unspec",
    "map_lookup_elem",
    "map_update_elem",
    "map_delete_elem",
    "probe_read",
    "ktime_get_ns",
    "trace_printk",
    "get_prandom_u32",
    "get_smp_processor_id",
    "skb_store_bytes",
    "l3_csum_replace",
    "l4_csum_replace",
    "tail_call",
    "clone_redirect",
    "get_current_pid_tgid",
    "get_current_uid_gid",
    "get_current_comm",
    "get_cgroup_classid",
    "skb_vlan_push",
    "skb_vlan_pop",
    "skb_get_tunnel_key",
    "skb_set_tunnel_key",
    "perf_event_read",
    "redirect",
    "get_route_realm",
    "perf_event_output",
    "skb_load_bytes",
    "get_stackid",
    "csum_diff",
    "skb_get_tunnel_opt",
    "skb_set_tunnel_opt",
    "skb_change_proto",
    "skb_change_type",
    "skb_under_cgroup",
    "get_hash_recalc",
    "get_current_task",
    "probe_write_user",
    "current_task_under_cgroup",
    "skb_change_tail",
    "skb_pull_data",
    "csum_update",
    "set_hash_invalid",
    "get_numa_node_id",
    "skb_change_head",
    "xdp_adjust_head",
    "probe_read_str",
];

/// Name of the BPF helper with the given `bpf_func_id`
///
/// Only the helpers a tracing program can realistically fail in are known
/// beyond the contiguous low range.
#[must_use]
pub fn helper_name(func_id: u32) -> Option<&'static str> {
    if let Some(name) = LOW_HELPER_NAMES.get(func_id as usize) {
        return Some(*name);
    }
    match func_id {
        80 => Some("get_current_cgroup_id"),
        BPF_FUNC_PROBE_READ_USER => Some("probe_read_user"),
        BPF_FUNC_PROBE_READ_KERNEL => Some("probe_read_kernel"),
        BPF_FUNC_PROBE_READ_USER_STR => Some("probe_read_user_str"),
        BPF_FUNC_PROBE_READ_KERNEL_STR => Some("probe_read_kernel_str"),
        BPF_FUNC_RINGBUF_OUTPUT => Some("ringbuf_output"),
        131 => Some("ringbuf_reserve"),
        132 => Some("ringbuf_submit"),
        133 => Some("ringbuf_discard"),
        134 => Some("ringbuf_query"),
        _ => None,
    }
}

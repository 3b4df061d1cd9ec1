//! Descriptions of failed BPF helper calls
//!
//! Turns the `(func_id, retcode)` pair reported by the kernel side into a
//! message a user can act on. Lookups never fail: unknown helpers get a
//! generic label and unknown error codes fall back to the OS description.
//!
//! The kernel side only emits a [`HelperErrorEvent`] naming a call site; the
//! session keeps a table from `error_id` to the call site's
//! [`HelperErrorInfo`].

use crate::domain::{HelperErrorInfo, RenderError};
use bpfout_common::{
    helper_name, HelperErrorEvent, BPF_FUNC_MAP_DELETE_ELEM, BPF_FUNC_MAP_LOOKUP_ELEM,
    BPF_FUNC_MAP_UPDATE_ELEM, HELPER_ERROR_EVENT_SIZE,
};
use std::collections::BTreeMap;

/// Call sites by `error_id`
pub type HelperErrorTable = BTreeMap<u64, HelperErrorInfo>;

/// Label used for helpers missing from the id table
pub const UNKNOWN_HELPER: &str = "unknown helper";

/// Name of the helper, or [`UNKNOWN_HELPER`]
pub fn helper_label(func_id: u32) -> &'static str {
    helper_name(func_id).unwrap_or(UNKNOWN_HELPER)
}

/// Human-readable reason for a helper failing with `retcode`
pub fn helper_error_msg(func_id: u32, retcode: i32) -> String {
    match func_id {
        BPF_FUNC_MAP_UPDATE_ELEM if retcode == -libc::E2BIG => {
            "Map full; can't update element. Try increasing max_entries".to_string()
        }
        BPF_FUNC_MAP_DELETE_ELEM if retcode == -libc::ENOENT => {
            "Can't delete map element because it does not exist.".to_string()
        }
        // lookups report 0 on a miss, so the code carries no information
        BPF_FUNC_MAP_LOOKUP_ELEM => "Can't lookup map element because it does not exist.".to_string(),
        _ => errno_description(retcode.saturating_neg()),
    }
}

/// Decode the raw bytes of a helper error event
pub fn read_helper_error_event(bytes: &[u8]) -> Result<HelperErrorEvent, RenderError> {
    HelperErrorEvent::from_bytes(bytes)
        .ok_or_else(|| RenderError::short("helper error event", HELPER_ERROR_EVENT_SIZE, bytes.len()))
}

/// Call site of `event`
pub fn resolve_helper_error<'a>(
    table: &'a HelperErrorTable,
    event: &HelperErrorEvent,
) -> Result<&'a HelperErrorInfo, RenderError> {
    table.get(&event.error_id).ok_or_else(|| {
        RenderError::InvalidDescriptor(format!("no call site for helper error id {}", event.error_id))
    })
}

/// OS description of `errno` without the trailing "(os error N)"
fn errno_description(errno: i32) -> String {
    let desc = std::io::Error::from_raw_os_error(errno).to_string();
    match desc.rfind(" (os error ") {
        Some(idx) => desc[..idx].to_string(),
        None => desc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpfout_common::BPF_FUNC_PROBE_READ;

    #[test]
    fn test_map_specific_messages() {
        assert!(helper_error_msg(BPF_FUNC_MAP_UPDATE_ELEM, -libc::E2BIG).starts_with("Map full"));
        assert!(helper_error_msg(BPF_FUNC_MAP_DELETE_ELEM, -libc::ENOENT).contains("does not exist"));
        assert!(helper_error_msg(BPF_FUNC_MAP_LOOKUP_ELEM, 0).contains("lookup"));
    }

    #[test]
    fn test_falls_back_to_errno_description() {
        let msg = helper_error_msg(BPF_FUNC_PROBE_READ, -libc::EFAULT);
        assert_eq!(msg, "Bad address");
        let msg = helper_error_msg(BPF_FUNC_MAP_UPDATE_ELEM, -libc::ENOMEM);
        assert!(!msg.contains("os error"));
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_read_helper_error_event() {
        let mut raw = 3u64.to_le_bytes().to_vec();
        raw.extend_from_slice(&(-libc::EFAULT).to_le_bytes());
        raw.extend_from_slice(&[0; 4]);
        let event = read_helper_error_event(&raw).unwrap();
        assert_eq!(event, HelperErrorEvent { error_id: 3, return_value: -libc::EFAULT });

        let err = read_helper_error_event(&raw[..10]).unwrap_err();
        assert!(matches!(err, RenderError::ShortBuffer { needed: 16, got: 10, .. }));
    }

    #[test]
    fn test_resolve_helper_error() {
        let table = HelperErrorTable::from([(3, HelperErrorInfo::new(BPF_FUNC_PROBE_READ))]);
        let event = HelperErrorEvent { error_id: 3, return_value: -1 };
        assert_eq!(resolve_helper_error(&table, &event).unwrap().func_id, BPF_FUNC_PROBE_READ);

        let missing = HelperErrorEvent { error_id: 4, return_value: -1 };
        assert!(matches!(
            resolve_helper_error(&table, &missing),
            Err(RenderError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_unknown_helper_label() {
        assert_eq!(helper_label(BPF_FUNC_PROBE_READ), "probe_read");
        assert_eq!(helper_label(4242), UNKNOWN_HELPER);
    }
}

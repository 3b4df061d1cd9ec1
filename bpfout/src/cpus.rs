//! CPU utility functions
//!
//! Per-CPU map values carry one slot per *possible* CPU, not per online CPU,
//! so the slot count comes from /sys/devices/system/cpu/possible.

use anyhow::{Context, Result};
use std::fs;

const POSSIBLE_CPUS: &str = "/sys/devices/system/cpu/possible";

/// Parse a kernel CPU list such as "0-3" or "0-3,8-11" into CPU ids
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for range in list.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().with_context(|| format!("Invalid CPU range: {range}"))?;
            let end: u32 = end.parse().with_context(|| format!("Invalid CPU range: {range}"))?;
            cpus.extend(start..=end);
        } else {
            let cpu: u32 = range.parse().with_context(|| format!("Invalid CPU id: {range}"))?;
            cpus.push(cpu);
        }
    }

    Ok(cpus)
}

/// Number of possible CPUs, the slot count of a per-CPU value
pub fn possible_cpus() -> Result<usize> {
    let content = fs::read_to_string(POSSIBLE_CPUS).with_context(|| format!("Failed to read {POSSIBLE_CPUS}"))?;
    let cpus = parse_cpu_list(&content)?;
    // ids may be sparse; slots are indexed by id
    Ok(cpus.iter().max().map_or(0, |&max| max as usize + 1))
}

//! # bpfout - Output Rendering for Tracing Data
//!
//! bpfout turns what a BPF tracing session collected (raw map keys and
//! values, histogram buckets, time-series samples and status events) into
//! either aligned human-readable text or one JSON record per line.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            Collector / Snapshot (raw bytes)              │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │ MapDescriptor + key/value bytes
//!                         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Output trait (output)                   │
//! │  map_contents / map_hist_contents / map_stats_contents   │
//! │         │                  │                 │           │
//! │         ▼                  ▼                 ▼           │
//! │  ┌────────────┐    ┌──────────────┐   ┌────────────┐     │
//! │  │   decode   │    │  hist        │   │  tseries   │     │
//! │  │ (TypeDesc) │    │ (log2/linear)│   │ (windows)  │     │
//! │  └────────────┘    └──────────────┘   └────────────┘     │
//! │         │                  │                 │           │
//! │         └────────┬─────────┴─────────────────┘           │
//! │                  ▼                                       │
//! │      TextOutput            JsonOutput                    │
//! └──────────────────┬───────────────────────────────────────┘
//!                    ▼
//!              out / err streams
//! ```
//!
//! ## Module Structure
//!
//! - [`domain`]: type descriptors, map descriptors, message kinds and errors
//! - [`decode`]: byte-level decoding of values against a type descriptor,
//!   including per-CPU reduction
//! - [`hist`]: log2 and linear histogram ranges, bounds and labels
//! - [`tseries`]: fixed-width windows over sparse time-series samples
//! - [`output`]: the [`output::Output`] trait with text and JSON renderers
//! - [`helpers`]: messages for failed in-kernel helper calls
//! - [`cpus`]: possible-CPU count for per-CPU values
//! - [`snapshot`]: replayable snapshots of collected data
//! - [`cli`]: command-line argument parsing
//!
//! ## Typical Usage
//!
//! ```bash
//! bpfout snapshot.json
//! bpfout snapshot.json --format json --top 10
//! ```

// Expose modules for testing
pub mod cli;
pub mod cpus;
pub mod decode;
pub mod domain;
pub mod helpers;
pub mod hist;
pub mod output;
pub mod snapshot;
pub mod tseries;

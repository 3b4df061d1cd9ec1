//! Domain model for bpfout
//!
//! This module contains core domain types and errors that provide:
//! - Type descriptors driving the byte-level decoder
//! - Map descriptors carrying aggregation semantics
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    CpuReduce, Epoch, Field, HelperErrorInfo, MapDescriptor, MapValueKind, MessageKind,
    RawKeyValue, SourceLocation, TimeSeries, TimeSeriesMap, TypeDescriptor,
};

pub use errors::{RenderError, SnapshotError};

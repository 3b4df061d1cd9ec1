//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Renderer selected with `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Aligned tables and ASCII histograms
    Text,
    /// One JSON record per line
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "bpfout",
    about = "Render a snapshot of collected tracing data",
    after_help = "\
EXAMPLES:
    bpfout snapshot.json                     Human-readable output
    bpfout snapshot.json --format json       One JSON record per line
    bpfout snapshot.json --top 10 --div 1000 First 10 entries, values divided by 1000"
)]
pub struct Args {
    /// Snapshot file to replay
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Print only the first N entries of each map (0 = all)
    #[arg(long, default_value = "0")]
    pub top: usize,

    /// Divide map values by N
    #[arg(long, default_value = "1")]
    pub div: u64,

    /// Slots per per-CPU value (defaults to the snapshot's, then this host's)
    #[arg(long)]
    pub ncpus: Option<usize>,

    /// Suppress attached-probe and lost-event messages
    #[arg(short, long)]
    pub quiet: bool,
}

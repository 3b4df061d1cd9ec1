//! # bpfout - Main Entry Point
//!
//! Replays a snapshot of collected tracing data through the text or JSON
//! renderer, the same way a live session prints its results on exit.

use anyhow::{Context, Result};
use bpfout::cli::{Args, Format};
use bpfout::cpus::possible_cpus;
use bpfout::decode::RenderContext;
use bpfout::domain::SnapshotError;
use bpfout::output::{JsonOutput, Output, TextOutput};
use bpfout::snapshot::Snapshot;
use clap::Parser;
use log::{debug, warn};
use std::io::{self, BufWriter, Write};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DATAERR: i32 = 65;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SnapshotError>() {
        Some(SnapshotError::ParseFailed(_) | SnapshotError::Json(_)) => return EXIT_DATAERR,
        Some(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::PermissionDenied => return EXIT_NOPERM,
        _ => {}
    }
    if err.to_string().to_lowercase().contains("permission denied") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

/// Slot count for per-CPU values: flag, then snapshot, then this host
fn resolve_ncpus(args: &Args, snapshot: &Snapshot) -> usize {
    if let Some(n) = args.ncpus.or(snapshot.ncpus) {
        return n;
    }
    match possible_cpus() {
        Ok(n) => n,
        Err(e) => {
            warn!("{e:#}; assuming a single CPU");
            1
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let mut snapshot = Snapshot::from_path(&args.snapshot)
        .with_context(|| format!("Failed to load snapshot {}", args.snapshot.display()))?;
    if args.quiet {
        snapshot.attached_probes = None;
        snapshot.lost_events = 0;
    }

    let ctx = RenderContext::new(resolve_ncpus(&args, &snapshot));
    debug!("Rendering {} items as {:?} with {} CPU slots", snapshot.items.len(), args.format, ctx.ncpus);

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut out = BufWriter::new(stdout.lock());
    let mut err = stderr.lock();

    {
        let mut renderer: Box<dyn Output + '_> = match args.format {
            Format::Text => Box::new(TextOutput::new(&mut out, &mut err, ctx)),
            Format::Json => Box::new(JsonOutput::new(&mut out, &mut err, ctx)),
        };
        snapshot.render(renderer.as_mut(), args.top, args.div)?;
    }

    out.flush().context("Failed to flush output")?;
    Ok(())
}

//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Execute a configured HTTP request for one message.
///
/// Reads a JSON request configuration, optionally an inbound message and a
/// persisted snapshot store, and prints every emission as one JSON line on
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "request-engine")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the JSON request configuration
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the inbound message (JSON); an empty message is used when omitted
    #[arg(short, long)]
    pub message: Option<PathBuf>,

    /// Path to the persisted snapshot store (JSON); rewritten after the run
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

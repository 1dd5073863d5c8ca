//! CLI entry point for the request engine.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use request_engine::{
    AttachmentSettings, EmitError, Emission, Emitter, HttpAttachmentStore, Message,
    PathEvaluator, RequestConfig, RequestEngine, SnapshotStore,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

mod cli;

use cli::Args;

/// Prints each emission as one JSON line on stdout.
struct JsonLinesEmitter;

#[async_trait]
impl Emitter for JsonLinesEmitter {
    async fn emit(&self, emission: Emission) -> Result<(), EmitError> {
        let kind = emission.kind();
        let line =
            serde_json::to_string(&emission).map_err(|e| EmitError::new(kind, e.to_string()))?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").map_err(|e| EmitError::new(kind, e.to_string()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {what} in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries emissions; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config: RequestConfig = read_json(&args.config, "request configuration")?;
    let message: Message = match &args.message {
        Some(path) => read_json(path, "message")?,
        None => Message::default(),
    };
    let snapshots: SnapshotStore = match &args.snapshot {
        Some(path) if path.exists() => read_json(path, "snapshot store")?,
        _ => SnapshotStore::new(),
    };

    let mut settings = AttachmentSettings::from_env();
    if let Some(base_url) = config.attachment_service_url.as_deref() {
        settings = settings.with_base_url(base_url);
    }
    if let Some(token) = config.token.as_deref() {
        settings = settings.with_token(token);
    }
    let store = HttpAttachmentStore::new(settings).context("failed to create attachment store")?;

    let engine = RequestEngine::new(
        Arc::new(PathEvaluator::new()),
        Arc::new(JsonLinesEmitter),
        Arc::new(store),
    );

    info!(config = %args.config.display(), "request engine starting");
    let snapshots = engine.execute(&config, message, snapshots).await?;

    if let Some(path) = &args.snapshot {
        let text = serde_json::to_string_pretty(&snapshots)?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write snapshot store to {}", path.display()))?;
        debug!(streams = snapshots.len(), path = %path.display(), "snapshot store saved");
    }

    Ok(())
}

//! Flush Command
//!
//! Child-process side of the queue handoff: restores a snapshot into a fresh
//! handler and drains it to the collection endpoint.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use testrelay_common::{
    BatchTransport, DrainSummary, EventHandler, EventNormalizer, HttpTransport, QueueSnapshot,
    ReporterConfig,
};

use super::{read_snapshot, STDIN_SOURCE};
use crate::output::{print_error, print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct FlushArgs {
    /// Snapshot file, or `-` to read it from stdin
    #[arg(long, default_value = STDIN_SOURCE)]
    pub snapshot: String,

    /// Reporter configuration file (TOML); environment variables take precedence
    #[arg(long, env = "TESTRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Exit with an error if any event could not be delivered
    #[arg(long)]
    pub fail_on_undelivered: bool,
}

/// Result of a flush, for display
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub queued: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub batches: usize,
}

impl FlushReport {
    fn new(queued: usize, summary: DrainSummary) -> Self {
        Self {
            queued,
            delivered: summary.delivered,
            dropped: summary.dropped,
            batches: summary.batches,
        }
    }
}

impl TableDisplay for FlushReport {
    fn headers() -> Vec<&'static str> {
        vec!["Queued", "Delivered", "Dropped", "Batches"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.queued.to_string(),
            self.delivered.to_string(),
            self.dropped.to_string(),
            self.batches.to_string(),
        ]
    }
}

pub async fn execute(args: FlushArgs, format: OutputFormat) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let snapshot = read_snapshot(&args.snapshot)?;

    let transport = Arc::new(HttpTransport::new(&config)?);
    let report = deliver(&config, snapshot, transport).await?;
    print_item(&report, format);

    if report.dropped > 0 {
        print_error(&format!("{} event(s) were not delivered", report.dropped));
        if args.fail_on_undelivered {
            anyhow::bail!("{} of {} event(s) undelivered", report.dropped, report.queued);
        }
    }
    Ok(())
}

/// Reporter configuration from an optional TOML file plus the environment
pub fn load_config(path: Option<&Path>) -> Result<ReporterConfig> {
    let config = match path {
        Some(path) => {
            debug!("Loading reporter config from {}", path.display());
            let mut config = ReporterConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env()?;
            config
        }
        None => ReporterConfig::from_env()?,
    };

    config.validate().context("Invalid reporter configuration")?;
    Ok(config)
}

/// Drain a snapshot through `transport`.
///
/// Entries are already normalized, so no run title lookup happens here.
pub async fn deliver(
    config: &ReporterConfig,
    snapshot: QueueSnapshot,
    transport: Arc<dyn BatchTransport>,
) -> Result<FlushReport> {
    let queued = snapshot.len();
    info!("Flushing {} handed-off event(s)", queued);

    let normalizer = EventNormalizer::new(
        config.project_id()?,
        config.run_id.clone().unwrap_or_default(),
    );
    let handler = EventHandler::with_parts(config, normalizer, transport);
    handler.restore(snapshot);

    let summary = handler.drain().await;
    Ok(FlushReport::new(queued, summary))
}

//! CLI Commands

pub mod flush;
pub mod inspect;

use anyhow::{Context, Result};
use std::path::Path;
use testrelay_common::QueueSnapshot;

/// Snapshot source meaning standard input
pub const STDIN_SOURCE: &str = "-";

/// Read a snapshot from a file path, or from stdin when `source` is `-`
pub fn read_snapshot(source: &str) -> Result<QueueSnapshot> {
    if source == STDIN_SOURCE {
        QueueSnapshot::read_from(std::io::stdin().lock())
            .context("Failed to read snapshot from stdin")
    } else {
        QueueSnapshot::load(Path::new(source))
            .with_context(|| format!("Failed to read snapshot from {}", source))
    }
}

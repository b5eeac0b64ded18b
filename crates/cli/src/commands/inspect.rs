//! Inspect Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use testrelay_common::{QueueEntry, QueueSnapshot};

use super::read_snapshot;
use crate::output::{print_list, OutputFormat, TableDisplay};

const TITLE_DISPLAY_LENGTH: usize = 48;

#[derive(Args)]
pub struct InspectArgs {
    /// Snapshot file, or `-` to read it from stdin
    #[arg(long)]
    pub snapshot: String,
}

/// One queued event for display
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub position: usize,
    pub event: String,
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    pub attachment: Option<String>,
}

impl EntryInfo {
    fn from_entry(position: usize, entry: &QueueEntry) -> Self {
        Self {
            position,
            event: entry.event.to_string(),
            id: entry.data.rabbit_mq_id.clone(),
            title: entry.data.title.clone(),
            status: entry.data.status.to_string(),
            attachment: entry.data.media.as_ref().map(|m| m.file_name.clone()),
        }
    }
}

impl TableDisplay for EntryInfo {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Event", "ID", "Title", "Status", "Attachment"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.position.to_string(),
            self.event.clone(),
            self.id.clone().unwrap_or_else(|| "-".to_string()),
            truncate(&self.title, TITLE_DISPLAY_LENGTH),
            self.status.clone(),
            self.attachment.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        text.to_string()
    }
}

/// Display rows for every entry, in queue order
pub fn entries(snapshot: &QueueSnapshot) -> Vec<EntryInfo> {
    snapshot
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| EntryInfo::from_entry(i + 1, entry))
        .collect()
}

pub fn execute(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let snapshot = read_snapshot(&args.snapshot)?;
    print_list(&entries(&snapshot), format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use testrelay_common::{
        CanonicalMessage, LifecycleEvent, MediaAttachment, MediaKind, TestStatus,
    };

    fn sample() -> QueueSnapshot {
        let media =
            MediaAttachment::new("m1", "fail.png", "image/png", MediaKind::Image, vec![1u8]);
        QueueSnapshot::new(vec![
            QueueEntry::new(
                LifecycleEvent::TestStart,
                CanonicalMessage::new("p1", "does X", TestStatus::Running).with_id("t1"),
            ),
            QueueEntry::new(
                LifecycleEvent::TestFail,
                CanonicalMessage::new("p1", "does X", TestStatus::Failed)
                    .with_id("t1")
                    .with_media(media),
            ),
        ])
    }

    #[test]
    fn test_entries_in_queue_order() {
        let rows = entries(&sample());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[0].event, "testStart");
        assert_eq!(rows[1].status, "failed");
        assert_eq!(rows[1].attachment.as_deref(), Some("fail.png"));
    }

    #[test]
    fn test_read_snapshot_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        sample().save(&path).unwrap();

        let loaded = read_snapshot(path.to_str().unwrap()).unwrap();
        assert_eq!(entries(&loaded), entries(&sample()));
    }

    #[test]
    fn test_read_missing_snapshot_fails() {
        assert!(read_snapshot("/nonexistent/queue.json").is_err());
    }

    #[test]
    fn test_truncate_long_titles() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}

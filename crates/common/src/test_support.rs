//! Transport doubles for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{BatchTransport, OutgoingBatch};
use crate::types::QueueEntry;

/// Records every batch and fails the first `failures` calls
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<OutgoingBatch>>,
    calls: AtomicUsize,
    failures: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Successfully delivered batches
    pub fn batches(&self) -> Vec<OutgoingBatch> {
        self.batches.lock().clone()
    }

    /// Delivered entries in order, decoded from the JSON field
    pub fn delivered(&self) -> Vec<QueueEntry> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| serde_json::from_str::<Vec<QueueEntry>>(&b.messages).unwrap())
            .collect()
    }
}

#[async_trait]
impl BatchTransport for RecordingTransport {
    async fn send_batch(&self, batch: &OutgoingBatch) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Delivery {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        self.batches.lock().push(batch.clone());
        Ok(())
    }
}

//! Batching delivery client
//!
//! Buffers queue entries and sends them through a [`BatchTransport`] once a
//! batch fills up or a flush is requested. A failed flush keeps the buffer
//! intact so the same batch can be retried; deciding whether to retry is up
//! to the caller.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::DeliveryConfig;
use crate::error::{Error, Result};
use crate::media::split_attachment;
use crate::transport::{BatchTransport, OutgoingBatch};
use crate::types::QueueEntry;

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; no request made
    Empty,
    /// Batch accepted and buffer cleared
    Delivered { messages: usize },
    /// Transient failure; buffer kept for retry
    Retained { messages: usize },
    /// Batch could not be encoded; dropped without a request
    Rejected { messages: usize },
}

impl FlushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Empty | FlushOutcome::Delivered { .. })
    }
}

/// Client that batches entries for a transport
pub struct DeliveryClient {
    transport: Arc<dyn BatchTransport>,
    batch_size: usize,
    request_timeout: Duration,
    buffer: Vec<QueueEntry>,
}

impl DeliveryClient {
    pub fn new(transport: Arc<dyn BatchTransport>, config: &DeliveryConfig) -> Self {
        Self {
            transport,
            batch_size: config.batch_size.max(1),
            request_timeout: config.request_timeout(),
            buffer: Vec::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of entries waiting in the send buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append an entry; flushes when the buffer reaches the batch size.
    ///
    /// Returns the outcome of that automatic flush, or `None` if the entry was
    /// only buffered.
    pub async fn publish_message(&mut self, entry: QueueEntry) -> Option<FlushOutcome> {
        self.buffer.push(entry);
        if self.buffer.len() >= self.batch_size {
            Some(self.try_flush().await)
        } else {
            None
        }
    }

    /// Flush the buffer; `true` when it is empty afterwards because of success
    pub async fn flush_queue(&mut self) -> bool {
        self.try_flush().await.is_success()
    }

    /// Flush the buffer and report exactly what happened
    pub async fn try_flush(&mut self) -> FlushOutcome {
        let messages = self.buffer.len();
        if messages == 0 {
            return FlushOutcome::Empty;
        }

        let batch = match encode_batch(&self.buffer) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Dropping batch of {} message(s), encoding failed: {}", messages, e);
                self.buffer.clear();
                return FlushOutcome::Rejected { messages };
            }
        };

        let sent = tokio::time::timeout(self.request_timeout, self.transport.send_batch(&batch))
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout {
                    millis: self.request_timeout.as_millis() as u64,
                })
            });

        match sent {
            Ok(()) => {
                debug!(
                    "Delivered batch of {} message(s) with {} attachment(s)",
                    messages,
                    batch.attachments.len()
                );
                self.buffer.clear();
                FlushOutcome::Delivered { messages }
            }
            Err(e) => {
                warn!("Batch delivery failed, retaining {} message(s) for retry: {}", messages, e);
                FlushOutcome::Retained { messages }
            }
        }
    }

    /// Empty the send buffer, returning how many entries were discarded
    pub fn discard_buffer(&mut self) -> usize {
        let n = self.buffer.len();
        self.buffer.clear();
        n
    }
}

/// Encode entries for the wire.
///
/// Attachments are lifted out into their own parts and the JSON copy keeps
/// only the metadata. An attachment that cannot be resolved is left out with
/// a warning; its message is still sent.
pub fn encode_batch(entries: &[QueueEntry]) -> Result<OutgoingBatch> {
    let mut attachments = Vec::new();
    let mut stripped = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut entry = entry.clone();
        if let Some(media) = entry.data.media.take() {
            let (copy, part) = split_attachment(&media);
            match part {
                Some(Ok(attachment)) => attachments.push(attachment),
                Some(Err(e)) => warn!(
                    "Sending message {} without its attachment {}: {}",
                    entry.data.rabbit_mq_id.as_deref().unwrap_or("<none>"),
                    copy.file_name,
                    e
                ),
                None => {}
            }
            entry.data.media = Some(copy);
        }
        stripped.push(entry);
    }

    Ok(OutgoingBatch {
        messages: serde_json::to_string(&stripped)?,
        message_count: stripped.len(),
        attachments,
    })
}

//! Event handler
//!
//! Owns the event queue, the normalizer and the delivery client for one
//! reporter instance. Adapters normalize through [`EventHandler::normalizer_mut`],
//! enqueue with [`EventHandler::queue_event`] and await
//! [`EventHandler::process_event_queue`] before letting the host exit.
//!
//! All queue operations take `&self`: events can be enqueued while a drain
//! is waiting on the endpoint. The queue lock is never held across an await.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ReporterConfig;
use crate::delivery::{DeliveryClient, FlushOutcome};
use crate::error::Result;
use crate::handoff::HandoffCommand;
use crate::identity::resolve_run_title;
use crate::normalizer::EventNormalizer;
use crate::snapshot::QueueSnapshot;
use crate::transport::{BatchTransport, HttpTransport};
use crate::types::{CanonicalMessage, LifecycleEvent, QueueEntry};

/// Counts from one drain of the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Messages the endpoint accepted
    pub delivered: usize,
    /// Messages given up on after the retry bound or an encoding failure
    pub dropped: usize,
    /// Requests that succeeded
    pub batches: usize,
}

impl DrainSummary {
    pub fn is_success(&self) -> bool {
        self.dropped == 0
    }
}

/// Queue plus delivery for one reporter instance
pub struct EventHandler {
    normalizer: EventNormalizer,
    queue: Mutex<VecDeque<QueueEntry>>,
    // Held for a whole drain, so concurrent drains run one after another
    delivery: tokio::sync::Mutex<DeliveryClient>,
    max_flush_attempts: u32,
    retry_backoff: Duration,
}

impl EventHandler {
    /// Handler delivering over HTTP.
    ///
    /// Fails immediately when the API key or project id is missing, or when
    /// no run id is configured and the git branch cannot be determined.
    pub fn new(config: &ReporterConfig) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(config)?);
        Self::with_transport(config, transport)
    }

    /// Handler delivering through the given transport
    pub fn with_transport(
        config: &ReporterConfig,
        transport: Arc<dyn BatchTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let run_title = resolve_run_title(config.run_id.as_deref(), None)?;

        let mut normalizer = EventNormalizer::new(config.project_id()?, run_title);
        if let Some(tool) = &config.test_tool {
            normalizer = normalizer.with_test_tool(tool.clone());
        }

        Ok(Self::with_parts(config, normalizer, transport))
    }

    /// Handler around a prepared normalizer; `config` is assumed valid
    pub fn with_parts(
        config: &ReporterConfig,
        normalizer: EventNormalizer,
        transport: Arc<dyn BatchTransport>,
    ) -> Self {
        Self {
            normalizer,
            queue: Mutex::new(VecDeque::new()),
            delivery: tokio::sync::Mutex::new(DeliveryClient::new(transport, &config.delivery)),
            max_flush_attempts: config.delivery.max_flush_attempts.max(1),
            retry_backoff: config.delivery.retry_backoff(),
        }
    }

    pub fn normalizer(&self) -> &EventNormalizer {
        &self.normalizer
    }

    pub fn normalizer_mut(&mut self) -> &mut EventNormalizer {
        &mut self.normalizer
    }

    /// Append an event to the tail of the queue
    pub fn queue_event(&self, event: impl Into<LifecycleEvent>, message: CanonicalMessage) {
        self.queue.lock().push_back(QueueEntry::new(event, message));
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Copy of the queued entries in order
    pub fn get_event_queue(&self) -> Vec<QueueEntry> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Replace the queue wholesale
    pub fn set_event_queue(&self, entries: Vec<QueueEntry>) {
        *self.queue.lock() = entries.into();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot::new(self.get_event_queue())
    }

    /// Replace the queue with a snapshot's entries
    pub fn restore(&self, snapshot: QueueSnapshot) {
        debug!("Restoring {} queued event(s) from snapshot", snapshot.len());
        self.set_event_queue(snapshot.into_entries());
    }

    /// Move the queue into a detached child process that finishes delivery.
    ///
    /// On spawn failure the entries go back to the front of the queue.
    /// Blocks while the snapshot is written to the child, see
    /// [`HandoffCommand::spawn`]; from async code run it on
    /// `tokio::task::spawn_blocking`.
    pub fn hand_off(&self, command: &HandoffCommand) -> Result<Child> {
        let entries: Vec<QueueEntry> = std::mem::take(&mut *self.queue.lock()).into();
        let snapshot = QueueSnapshot::new(entries);

        match command.spawn(&snapshot) {
            Ok(child) => Ok(child),
            Err(e) => {
                let mut queue = self.queue.lock();
                for entry in snapshot.into_entries().into_iter().rev() {
                    queue.push_front(entry);
                }
                Err(e)
            }
        }
    }

    /// Deliver everything queued; `false` if any message was given up on
    pub async fn process_event_queue(&self) -> bool {
        self.drain().await.is_success()
    }

    /// Deliver everything queued and report the counts.
    ///
    /// Entries are dequeued in order into the delivery client, which flushes
    /// whenever a batch fills. A final flush sends the remainder. Each failed
    /// flush is retried up to the configured attempt bound before its batch
    /// is dropped; draining continues either way. Events queued after the
    /// final flush has started wait for the next drain.
    pub async fn drain(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();
        let mut delivery = self.delivery.lock().await;
        if self.is_empty() && delivery.buffered() == 0 {
            return summary;
        }

        info!("Delivering {} queued event(s)", self.len());

        while let Some(entry) = self.next_entry() {
            if let Some(outcome) = delivery.publish_message(entry).await {
                self.settle(&mut delivery, outcome, &mut summary).await;
            }
        }

        let outcome = delivery.try_flush().await;
        self.settle(&mut delivery, outcome, &mut summary).await;

        if summary.is_success() {
            info!(
                "Delivered {} event(s) in {} batch(es)",
                summary.delivered, summary.batches
            );
        } else {
            error!(
                "{} event(s) were not delivered ({} delivered)",
                summary.dropped, summary.delivered
            );
        }
        summary
    }

    fn next_entry(&self) -> Option<QueueEntry> {
        self.queue.lock().pop_front()
    }

    // `first` counts as attempt one.
    async fn settle(
        &self,
        delivery: &mut DeliveryClient,
        first: FlushOutcome,
        summary: &mut DrainSummary,
    ) {
        let mut outcome = first;
        let mut attempts = 1;

        loop {
            match outcome {
                FlushOutcome::Empty => return,
                FlushOutcome::Delivered { messages } => {
                    summary.delivered += messages;
                    summary.batches += 1;
                    return;
                }
                FlushOutcome::Rejected { messages } => {
                    summary.dropped += messages;
                    return;
                }
                FlushOutcome::Retained { .. } if attempts >= self.max_flush_attempts => {
                    let lost = delivery.discard_buffer();
                    error!(
                        "Batch of {} event(s) not delivered after {} attempt(s)",
                        lost, attempts
                    );
                    summary.dropped += lost;
                    return;
                }
                FlushOutcome::Retained { .. } => {
                    if !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                    attempts += 1;
                    debug!("Retrying flush (attempt {} of {})", attempts, self.max_flush_attempts);
                    outcome = delivery.try_flush().await;
                }
            }
        }
    }
}

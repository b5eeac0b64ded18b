//! Mock collection endpoint - captures the batches a reporter posts

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use testrelay_common::config::BATCH_PATH;
use testrelay_common::transport::{MEDIA_FIELD, MEDIA_ID_HEADER, MESSAGES_FIELD};
use testrelay_common::{EventHandler, QueueEntry, ReporterConfig};

use crate::error::{E2eError, E2eResult};

/// API key handed out by [`MockCollector::reporter_config`]
pub const TEST_API_KEY: &str = "e2e-api-key";

/// Project id handed out by [`MockCollector::reporter_config`]
pub const TEST_PROJECT_ID: &str = "e2e-project";

/// Run title handed out by [`MockCollector::reporter_config`]
pub const TEST_RUN_ID: &str = "e2e-run";

/// Behaviour of the mock endpoint
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Reject this many requests before accepting any
    pub fail_first: usize,

    /// Status returned for rejected requests
    pub failure_status: u16,

    /// Delay before every response
    pub response_delay: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            fail_first: 0,
            failure_status: 503,
            response_delay: Duration::ZERO,
        }
    }
}

/// One multipart part other than `messages`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedMedia {
    pub field: String,
    /// Media id from the part header, matching a message's `media.rabbitMqId`
    pub correlation_id: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// One request as the endpoint saw it
#[derive(Debug, Clone, Default)]
pub struct CapturedBatch {
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    /// Raw `messages` field
    pub messages: Option<String>,
    pub media: Vec<CapturedMedia>,
    /// Whether the endpoint answered with success
    pub accepted: bool,
}

impl CapturedBatch {
    /// Decode the `messages` field
    pub fn entries(&self) -> E2eResult<Vec<QueueEntry>> {
        let raw = self
            .messages
            .as_deref()
            .ok_or_else(|| E2eError::AssertionFailed("batch has no messages field".to_string()))?;
        Ok(serde_json::from_str(raw)?)
    }

    /// The `messages` field as untyped JSON
    pub fn messages_json(&self) -> E2eResult<serde_json::Value> {
        let raw = self.messages.as_deref().unwrap_or("null");
        Ok(serde_json::from_str(raw)?)
    }
}

struct CollectorState {
    config: CollectorConfig,
    remaining_failures: AtomicUsize,
    requests: Mutex<Vec<CapturedBatch>>,
}

/// Handle to a running mock endpoint on `127.0.0.1`
pub struct MockCollector {
    base_url: String,
    port: u16,
    state: Arc<CollectorState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockCollector {
    /// Start an endpoint that accepts everything
    pub async fn start() -> E2eResult<Self> {
        Self::start_with(CollectorConfig::default()).await
    }

    pub async fn start_with(config: CollectorConfig) -> E2eResult<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| E2eError::CollectorStartup(format!("Failed to bind: {}", e)))?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = Arc::new(CollectorState {
            remaining_failures: AtomicUsize::new(config.fail_first),
            config,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(BATCH_PATH, post(receive_batch))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                warn!("Mock collector stopped with error: {}", e);
            }
        });

        info!("Mock collector listening at {}", base_url);
        Ok(Self {
            base_url,
            port,
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Get the base URL for this endpoint
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Reporter configuration pointed at this endpoint, without retry backoff
    pub fn reporter_config(&self) -> ReporterConfig {
        let mut config = ReporterConfig::new(TEST_API_KEY, TEST_PROJECT_ID);
        config.base_url = self.base_url.clone();
        config.run_id = Some(TEST_RUN_ID.to_string());
        config.delivery.retry_backoff_ms = 0;
        config
    }

    /// Handler delivering to this endpoint with [`Self::reporter_config`]
    pub fn handler(&self) -> E2eResult<EventHandler> {
        self.handler_with(&self.reporter_config())
    }

    /// Handler for a config derived from [`Self::reporter_config`]
    pub fn handler_with(&self, config: &ReporterConfig) -> E2eResult<EventHandler> {
        Ok(EventHandler::new(config)?)
    }

    /// Every request received, accepted or not
    pub fn requests(&self) -> Vec<CapturedBatch> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    /// Requests that were answered with success
    pub fn batches(&self) -> Vec<CapturedBatch> {
        self.requests().into_iter().filter(|b| b.accepted).collect()
    }

    /// Entries from accepted requests, in arrival order
    pub fn delivered(&self) -> E2eResult<Vec<QueueEntry>> {
        let mut entries = Vec::new();
        for batch in self.batches() {
            entries.extend(batch.entries()?);
        }
        Ok(entries)
    }

    /// Poll until at least `count` entries have been accepted
    pub async fn wait_for_entries(
        &self,
        count: usize,
        timeout: Duration,
    ) -> E2eResult<Vec<QueueEntry>> {
        let start = std::time::Instant::now();
        loop {
            let entries = self.delivered()?;
            if entries.len() >= count {
                return Ok(entries);
            }
            if start.elapsed() >= timeout {
                return Err(E2eError::Timeout(format!(
                    "{} delivered entries (have {})",
                    count,
                    entries.len()
                )));
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Stop the endpoint and wait for it to shut down
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn receive_batch(
    State(state): State<Arc<CollectorState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    let mut batch = CapturedBatch {
        authorization: header_value(&headers, header::AUTHORIZATION),
        user_agent: header_value(&headers, header::USER_AGENT),
        ..Default::default()
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return StatusCode::BAD_REQUEST;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let correlation_id = field
            .headers()
            .get(MEDIA_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read part '{}': {}", name, e);
                return StatusCode::BAD_REQUEST;
            }
        };

        if name == MESSAGES_FIELD {
            batch.messages = Some(String::from_utf8_lossy(&data).into_owned());
        } else {
            if name != MEDIA_FIELD {
                warn!("Unexpected multipart field '{}'", name);
            }
            batch.media.push(CapturedMedia {
                field: name,
                correlation_id,
                file_name,
                content_type,
                data,
            });
        }
    }

    let rejected = state
        .remaining_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    batch.accepted = !rejected && batch.messages.is_some();
    let status = if rejected {
        StatusCode::from_u16(state.config.failure_status)
            .unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
    } else if batch.messages.is_none() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    debug!(
        "Captured batch: {} media part(s), status {}",
        batch.media.len(),
        status
    );
    state.requests.lock().push(batch);

    if !state.config.response_delay.is_zero() {
        sleep(state.config.response_delay).await;
    }
    status
}

//! Wire transport for message batches

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::{user_agent, ReporterConfig};
use crate::error::{Error, Result};
use crate::media::Attachment;

/// Multipart field holding the JSON message array
pub const MESSAGES_FIELD: &str = "messages";

/// Multipart field used for every attachment
pub const MEDIA_FIELD: &str = "media";

/// Part header carrying the media `rabbitMqId`, which matches the
/// `media.rabbitMqId` of the owning message in the `messages` field
pub const MEDIA_ID_HEADER: &str = "x-testrelay-media-id";

/// A batch ready to send: media-stripped messages plus their attachments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingBatch {
    /// JSON array of `{ event, data }` entries
    pub messages: String,
    pub message_count: usize,
    pub attachments: Vec<Attachment>,
}

/// Sends encoded batches to the collection endpoint
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Deliver one batch. Any `Err` is treated as transient by the caller.
    async fn send_batch(&self, batch: &OutgoingBatch) -> Result<()>;
}

/// Authenticated multipart POST to `<base_url>/reporter-events/batch`
pub struct HttpTransport {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpTransport {
    /// Create a transport from a validated configuration
    pub fn new(config: &ReporterConfig) -> Result<Self> {
        let api_key = config.api_key()?.to_string();
        let client = Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.batch_url(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_form(batch: &OutgoingBatch) -> Form {
        let mut form = Form::new().text(MESSAGES_FIELD, batch.messages.clone());
        for attachment in &batch.attachments {
            form = form.part(MEDIA_FIELD, media_part(attachment));
        }
        form
    }
}

fn media_part(attachment: &Attachment) -> Part {
    let part = Part::bytes(attachment.data.to_vec())
        .file_name(attachment.file_name.clone())
        .headers(correlation_headers(attachment));
    match part.mime_str(&attachment.mime_type) {
        Ok(part) => part,
        Err(e) => {
            warn!(
                "Invalid mime type '{}' for {}: {}",
                attachment.mime_type, attachment.file_name, e
            );
            Part::bytes(attachment.data.to_vec())
                .file_name(attachment.file_name.clone())
                .headers(correlation_headers(attachment))
        }
    }
}

fn correlation_headers(attachment: &Attachment) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&attachment.correlation_id) {
        Ok(value) => {
            headers.insert(MEDIA_ID_HEADER, value);
        }
        Err(_) => warn!(
            "Media id '{}' of {} is not a valid header value; part sent without it",
            attachment.correlation_id, attachment.file_name
        ),
    }
    headers
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send_batch(&self, batch: &OutgoingBatch) -> Result<()> {
        debug!(
            url = %self.url,
            messages = batch.message_count,
            attachments = batch.attachments.len(),
            "Posting batch"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(Self::build_form(batch))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
        Err(Error::Delivery {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_requires_api_key() {
        let config = ReporterConfig {
            project_id: Some("p1".to_string()),
            ..Default::default()
        };
        assert!(matches!(HttpTransport::new(&config), Err(Error::MissingApiKey)));
    }

    #[test]
    fn test_transport_url() {
        let mut config = ReporterConfig::new("key", "p1");
        config.base_url = "http://127.0.0.1:4000/".to_string();
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.url(), "http://127.0.0.1:4000/reporter-events/batch");
    }

    fn attachment(id: &str) -> Attachment {
        Attachment {
            correlation_id: id.to_string(),
            file_name: "screenshot.png".to_string(),
            mime_type: "image/png".to_string(),
            data: bytes::Bytes::from_static(&[1]),
        }
    }

    #[test]
    fn test_correlation_header_carries_media_id() {
        let headers = correlation_headers(&attachment("m1"));
        assert_eq!(headers.get(MEDIA_ID_HEADER).unwrap(), "m1");
    }

    #[test]
    fn test_unrepresentable_media_id_is_skipped() {
        let headers = correlation_headers(&attachment("bad\nid"));
        assert!(headers.get(MEDIA_ID_HEADER).is_none());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let transport = HttpTransport::new(&ReporterConfig::new("super-secret", "p1")).unwrap();
        let rendered = format!("{:?}", transport);
        assert!(!rendered.contains("super-secret"));
    }
}

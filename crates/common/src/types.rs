//! Canonical message schema for testrelay
//!
//! Every producer (normalizer) and consumer (queue, delivery client, snapshot)
//! speaks these types. Field names serialize in camelCase because the
//! collection endpoint expects that shape.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Lifecycle status of a run, suite or test
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Running,
    Passed,
    Failed,
    Pending,
    Skipped,
}

impl TestStatus {
    /// Terminal status for a suite or run
    pub fn from_failed(has_failed: bool) -> Self {
        if has_failed {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestStatus::Running)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Running => write!(f, "running"),
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Pending => write!(f, "pending"),
            TestStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Kind of test a suite contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    E2e,
    Unit,
}

/// Weak reference to a previously normalized suite or run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub title: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Host information attached to suite messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub platform: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
}

impl SystemInfo {
    /// Describe the current host
    pub fn detect() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned()),
            cpu_count: std::thread::available_parallelism().ok().map(|n| n.get()),
            runtime_version: None,
        }
    }
}

/// Version-control metadata, supplied by the adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

/// Browser a test executed in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
}

/// Attachment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// `{ "type": "Buffer", "data": [...] }`, the JSON form a binary buffer takes
/// after crossing a serialization boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBuffer {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<i64>,
}

impl SerializedBuffer {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            kind: "Buffer".to_string(),
            data: bytes.iter().map(|b| i64::from(*b)).collect(),
        }
    }
}

/// Attachment payload, either in memory or in serialized buffer form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaData {
    Raw(Bytes),
    Serialized(SerializedBuffer),
}

impl From<Vec<u8>> for MediaData {
    fn from(bytes: Vec<u8>) -> Self {
        MediaData::Raw(Bytes::from(bytes))
    }
}

impl From<Bytes> for MediaData {
    fn from(bytes: Bytes) -> Self {
        MediaData::Raw(bytes)
    }
}

// Raw bytes are written in the buffer form so a snapshot can carry them
// through JSON without loss.
impl Serialize for MediaData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MediaData::Raw(bytes) => {
                let mut state = serializer.serialize_struct("Buffer", 2)?;
                state.serialize_field("type", "Buffer")?;
                state.serialize_field("data", bytes.as_ref())?;
                state.end()
            }
            MediaData::Serialized(buffer) => buffer.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MediaData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        SerializedBuffer::deserialize(deserializer).map(MediaData::Serialized)
    }
}

/// Screenshot or video captured during a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    pub rabbit_mq_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MediaData>,
    pub file_name: String,
    pub mime_type: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub timestamp: DateTime<Utc>,
}

impl MediaAttachment {
    pub fn new(
        rabbit_mq_id: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        kind: MediaKind,
        data: impl Into<MediaData>,
    ) -> Self {
        Self {
            rabbit_mq_id: rabbit_mq_id.into(),
            data: Some(data.into()),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// The normalized, framework-agnostic representation of one lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMessage {
    pub project_id: String,
    /// Entity id; absent only for a run-end that had no run-start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rabbit_mq_id: Option<String>,
    pub title: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<TestType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl CanonicalMessage {
    /// Message carrying only the mandatory fields
    pub fn new(
        project_id: impl Into<String>,
        title: impl Into<String>,
        status: TestStatus,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            rabbit_mq_id: None,
            title: title.into(),
            status,
            start_time: None,
            end_time: None,
            duration: None,
            file_name: None,
            test_body: None,
            error: None,
            stack: None,
            test_suite: None,
            test_run: None,
            test_case_count: None,
            test_tool: None,
            test_type: None,
            system: None,
            git: None,
            retries: None,
            media: None,
            browser: None,
            metadata: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.rabbit_mq_id = Some(id.into());
        self
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }
}

/// Name of the lifecycle transition a queue entry records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleEvent {
    RunStart,
    SuiteStart,
    TestStart,
    TestPass,
    TestFail,
    TestPending,
    TestSkip,
    SuiteEnd,
    RunEnd,
    Custom(String),
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleEvent::RunStart => "runStart",
            LifecycleEvent::SuiteStart => "suiteStart",
            LifecycleEvent::TestStart => "testStart",
            LifecycleEvent::TestPass => "testPass",
            LifecycleEvent::TestFail => "testFail",
            LifecycleEvent::TestPending => "testPending",
            LifecycleEvent::TestSkip => "testSkip",
            LifecycleEvent::SuiteEnd => "suiteEnd",
            LifecycleEvent::RunEnd => "runEnd",
            LifecycleEvent::Custom(name) => name,
        }
    }
}

impl From<String> for LifecycleEvent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "runStart" => LifecycleEvent::RunStart,
            "suiteStart" => LifecycleEvent::SuiteStart,
            "testStart" => LifecycleEvent::TestStart,
            "testPass" => LifecycleEvent::TestPass,
            "testFail" => LifecycleEvent::TestFail,
            "testPending" => LifecycleEvent::TestPending,
            "testSkip" => LifecycleEvent::TestSkip,
            "suiteEnd" => LifecycleEvent::SuiteEnd,
            "runEnd" => LifecycleEvent::RunEnd,
            _ => LifecycleEvent::Custom(name),
        }
    }
}

impl From<&str> for LifecycleEvent {
    fn from(name: &str) -> Self {
        LifecycleEvent::from(name.to_string())
    }
}

impl From<LifecycleEvent> for String {
    fn from(event: LifecycleEvent) -> Self {
        event.as_str().to_string()
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One buffered `(event, message)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub event: LifecycleEvent,
    pub data: CanonicalMessage,
}

impl QueueEntry {
    pub fn new(event: impl Into<LifecycleEvent>, data: CanonicalMessage) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

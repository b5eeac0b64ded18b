//! testrelay E2E Test Framework
//!
//! Runs the reporter pipeline against an in-process collection endpoint:
//!
//! ```text
//! EventHandler ──multipart POST──▶ MockCollector (axum, 127.0.0.1:0)
//!                                    ├── captures messages + media parts
//!                                    ├── records auth / user-agent headers
//!                                    └── injects 5xx failures or delays
//! ```

pub mod collector;
pub mod error;

pub use collector::{CapturedBatch, CapturedMedia, CollectorConfig, MockCollector};
pub use error::{E2eError, E2eResult};

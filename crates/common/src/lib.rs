//! testrelay Common Library
//!
//! Canonical message schema, event normalization, queueing and batched
//! delivery shared by testrelay reporters and the `testrelay` CLI.

pub mod ansi;
pub mod config;
pub mod delivery;
pub mod error;
pub mod handler;
pub mod handoff;
pub mod identity;
pub mod media;
pub mod normalizer;
pub mod snapshot;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{DeliveryConfig, ReporterConfig};
pub use delivery::{DeliveryClient, FlushOutcome};
pub use error::{Error, Result};
pub use handler::{DrainSummary, EventHandler};
pub use handoff::HandoffCommand;
pub use identity::{RunIdentity, RunIdentityCache};
pub use normalizer::EventNormalizer;
pub use snapshot::QueueSnapshot;
pub use transport::{BatchTransport, HttpTransport, OutgoingBatch};
pub use types::*;

/// testrelay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

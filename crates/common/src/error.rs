//! Error types for testrelay

use thiserror::Error;

/// Result type alias using the testrelay Error
pub type Result<T> = std::result::Result<T, Error>;

/// testrelay error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API key is not set (export TESTRELAY_API_KEY)")]
    MissingApiKey,

    #[error("Project id is not set (export TESTRELAY_PROJECT_ID)")]
    MissingProjectId,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot resolve run title: {0}")]
    RunTitle(String),

    #[error("Request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Delivery rejected with status {status}: {body}")]
    Delivery { status: u16, body: String },

    #[error("Media error: {0}")]
    Media(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Handoff error: {0}")]
    Handoff(String),
}

impl Error {
    /// Whether this error is a configuration problem that should stop the host early
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::MissingApiKey
                | Error::MissingProjectId
                | Error::InvalidConfig(_)
                | Error::ConfigParse(_)
                | Error::RunTitle(_)
        )
    }
}

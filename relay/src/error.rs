//! Error types for the relay.
//!
//! Each stage owns its error enum. None of these are fatal on their own:
//! ingestion errors mean "no message", delivery errors are isolated per
//! destination. Only startup failures (surfaced through `anyhow`) stop the
//! process.

use std::path::PathBuf;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised while reading or parsing piped input.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse mail document: {0}")]
    Parse(#[from] mailparse::MailParseError),
}

/// Errors raised by a destination while delivering one message.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request to {destination} failed: {source}")]
    Http {
        destination: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{destination} rejected message: {reason}")]
    Rejected {
        destination: &'static str,
        reason: String,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal before any site is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("webhook url is not configured (set AID_DISCORD_WEBHOOK_URL)")]
    MissingWebhookUrl,
    #[error("failed to read registry {path:?}: {source}")]
    RegistryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry {path:?} is not valid JSON: {source}")]
    RegistryInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("invalid settings: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("another run holds the lock {0:?}")]
    AlreadyRunning(PathBuf),
    #[error("failed to write run lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier unavailable: {0}")]
    Init(String),
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("classifier returned a malformed result: {0}")]
    Malformed(String),
    #[error("classifier did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write registry {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

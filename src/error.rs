//! Error taxonomy for lansentry.
//!
//! The packet path itself never surfaces these: malformed input degrades to
//! sentinel values and external lookup failures to cached negatives. The
//! variants below cover persistence (cache, model, exports, alert log) and
//! startup wiring, where a descriptive error to the operator is wanted.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentryError>;

#[derive(Error, Debug)]
pub enum SentryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vendor lookup failed: {0}")]
    Lookup(String),

    #[error("background worker exited abnormally")]
    WorkerPanic,
}

use std::path::PathBuf;

use jws_lib::{KeyError, SigningError};
use reqwest::StatusCode;
use thiserror::Error;

/// Outcome of a signed call that did not produce a trusted body.
#[derive(Debug, Error)]
pub enum CallError {
    /// Network or I/O failure while sending or reading the response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request was never sent.
    #[error("failed to sign request: {0}")]
    Signing(#[from] SigningError),

    #[error("failed to encode request body: {0}")]
    Body(#[from] serde_json::Error),

    /// Success status, but the response was not signed by a trusted key.
    /// The body is dropped.
    #[error("invalid signature: {status} response was not signed by a trusted key")]
    UntrustedResponse { status: StatusCode },

    /// Non-success status; `body` is the raw response body.
    #[error("server returned {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

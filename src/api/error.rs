//! Errors surfaced by the request gateway

use reqwest::StatusCode;

use crate::auth::RefreshError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend rejected the credential and it could not be renewed.
    /// The session has been terminated by the time this is returned.
    #[error("401 Unauthorized for {target}: {body}")]
    Unauthorized { target: String, body: String },

    /// A refresh this request was waiting on failed.
    #[error("credential refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Any non-2xx, non-401 answer, passed through untouched.
    #[error("HTTP {status} for {target}: {body}")]
    Status {
        status: StatusCode,
        target: String,
        body: String,
    },

    #[error("{0:#}")]
    Transport(anyhow::Error),

    /// Credentials could not be written to the local store.
    #[error("{0:#}")]
    Storage(anyhow::Error),

    #[error("failed to decode response from {target}: {source}")]
    Decode {
        target: String,
        #[source]
        source: serde_json::Error,
    },
}

//! Error taxonomy shared by adapters and core components.

use thiserror::Error;

use crate::store::StoreError;

/// Diagnostic text surfaced when no candidate identity can act for a location
pub const NO_CREDENTIAL_MESSAGE: &str = "no usable account linked";

/// Errors from external integrations and the operations built on them
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Network-level or retryable upstream failure; left for the next tick
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Token rejected or expired upstream
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Upstream resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream rejected the request for a non-retryable reason
    #[error("{0}")]
    Permanent(String),

    #[error("{}", NO_CREDENTIAL_MESSAGE)]
    NoCredential(NoCredentialReason),

    #[error("Location {0} is not linked to an external profile")]
    NotLinked(String),

    /// A local record referenced by id does not exist
    #[error("No such {kind}: {id}")]
    UnknownRecord { kind: &'static str, id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Why credential resolution came up empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoCredentialReason {
    /// No candidate identity holds a credential for the platform
    NeverConnected,

    /// Credentials exist but every one was expired and could not be refreshed
    AllStale { candidates: usize },
}

impl IntegrationError {
    /// Classify an upstream HTTP failure by status code
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let detail = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };

        match status {
            401 | 403 => Self::Unauthorized(detail),
            404 | 410 => Self::NotFound(detail),
            408 | 429 | 500..=599 => Self::TransientNetwork(detail),
            _ => Self::Permanent(detail),
        }
    }

    /// Text recorded in a result map slot or status reason
    pub fn detail(&self) -> String {
        match self {
            Self::TransientNetwork(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg)
            | Self::Permanent(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_no_credential(&self) -> bool {
        matches!(self, Self::NoCredential(_))
    }

    pub(crate) fn unknown(kind: &'static str, id: &str) -> Self {
        Self::UnknownRecord {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::TransientNetwork(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IntegrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent(format!("Unexpected response shape: {}", err))
    }
}

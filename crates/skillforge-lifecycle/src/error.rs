//! Lifecycle error types.
//!
//! Errors fall into two classes. Transport failures (the network call or
//! the response body could not be completed/parsed) always reach the
//! caller. Everything else is a domain failure, which
//! [`SkillLifecycleManager::handle_error`](crate::SkillLifecycleManager::handle_error)
//! turns into a negative discovery result.

use skillforge_lora::LoraError;
use skillforge_store::StoreError;

/// Message fragments that mark a failure as transport-class even when it
/// arrives as a domain error (for example a service relaying its own
/// upstream fetch failure in `errorMessage`).
pub const TRANSPORT_MARKERS: [&str; 3] = ["Network error", "Invalid JSON", "fetch"];

/// Errors raised by the skill lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The request could not be sent or the connection failed.
    #[error("Network error: {service}: {reason}")]
    Transport {
        service: &'static str,
        reason: String,
    },

    /// The response body was not the JSON we expected.
    #[error("Invalid JSON from {service}: {reason}")]
    InvalidJson {
        service: &'static str,
        reason: String,
    },

    /// The service answered with a non-2xx status.
    #[error("{service} returned HTTP {status}")]
    Http { service: &'static str, status: u16 },

    /// Discovery answered but not with a usable result.
    #[error("skill discovery failed: {0}")]
    Discovery(String),

    /// Submitting a new error node failed.
    #[error("error node submission failed: {0}")]
    Submission(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lora(#[from] LoraError),
}

impl LifecycleError {
    /// Whether this failure must be surfaced rather than converted into a
    /// negative discovery result.
    pub fn is_transport_failure(&self) -> bool {
        if matches!(self, Self::Transport { .. } | Self::InvalidJson { .. }) {
            return true;
        }
        let message = self.to_string();
        TRANSPORT_MARKERS.iter().any(|m| message.contains(m))
    }

    /// Map a `reqwest` failure for `service`.
    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidJson {
                service,
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                service,
                reason: err.to_string(),
            }
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LifecycleError>;

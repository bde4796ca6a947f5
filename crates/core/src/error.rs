//! Error taxonomy for session and weight-set operations.

use thiserror::Error;

/// Failures surfaced by the API client and session manager.
///
/// Server-provided messages are carried through where the payload has
/// one; transport and 5xx failures fall back to generic wording so the
/// frontends can show them verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected before any network call was made.
    #[error("{0}")]
    Validation(String),

    /// The server answered 401 for the presented credential.
    #[error("{}", .message.as_deref().unwrap_or("authentication required"))]
    Unauthorized {
        /// Message extracted from the response payload, if any.
        message: Option<String>,
    },

    /// Any other 4xx response.
    #[error("{}", .message.as_deref().unwrap_or("the server rejected the request"))]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response payload, if any.
        message: Option<String>,
    },

    /// 5xx response; not retried by the core.
    #[error("the server hit a problem (status {status}), try again later")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// No response at all (connection refused, timeout, DNS failure).
    #[error("could not reach the server, check your connection")]
    Network(#[source] reqwest::Error),

    /// The response arrived but its body could not be decoded.
    #[error("unexpected response from the server")]
    Decode(#[source] reqwest::Error),

    /// A request body could not be serialized.
    #[error("failed to encode request body")]
    Encode(#[source] serde_json::Error),

    /// Refresh was requested without a persisted refresh token.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// An operation requiring an authenticated session ran without one.
    #[error("not signed in")]
    NotAuthenticated,

    /// The durable token store could not be updated.
    #[error("failed to persist session tokens")]
    Store(#[source] anyhow::Error),
}

impl ApiError {
    /// True for errors that should prompt the user to sign in again.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::MissingRefreshToken | ApiError::NotAuthenticated
        )
    }
}

use popwatch_core::PublishError;
use thiserror::Error;

/// Errors returned by the Bluesky XRPC client.
#[derive(Debug, Error)]
pub enum BlueskyError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status and an XRPC error body.
    #[error("XRPC {method} failed with HTTP {status}: {error}: {message}")]
    Api {
        method: String,
        status: u16,
        error: String,
        message: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A request needing a session was made before [`login`](crate::BlueskyClient::login).
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl BlueskyError {
    /// `true` when the session's access token has expired.
    #[must_use]
    pub fn is_expired_token(&self) -> bool {
        matches!(self, Self::Api { error, .. } if error == "ExpiredToken")
    }
}

impl From<BlueskyError> for PublishError {
    fn from(err: BlueskyError) -> Self {
        match err {
            BlueskyError::NotAuthenticated => PublishError::NotAuthenticated,
            other => PublishError::Rejected(other.to_string()),
        }
    }
}

//! REST API clients for user-data stream credentials

pub mod listen_key;

pub use listen_key::ListenKeyClient;

use async_trait::async_trait;

/// Errors from the REST layer
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No API key configured")]
    MissingApiKey,

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl RestError {
    /// The server refused the request itself (4xx other than rate limiting).
    ///
    /// For listen keys this means the key is expired or unknown.
    pub fn is_rejected(&self) -> bool {
        match self {
            RestError::Status { status, .. } => (400..500).contains(status) && *status != 429,
            _ => false,
        }
    }
}

/// Issues and renews the listen key that authenticates the user-data stream.
///
/// The stream manager only relies on keys being strings; a renewal that
/// returns a different key than it was given means the stream must move.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtain a listen key
    async fn issue_key(&self) -> Result<String, RestError>;

    /// Extend `key`; returns the key to use from now on
    async fn renew_key(&self, key: &str) -> Result<String, RestError>;

    /// Invalidate `key`
    async fn revoke_key(&self, key: &str) -> Result<(), RestError>;
}

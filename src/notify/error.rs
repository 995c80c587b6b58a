//! Channel delivery errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Still rate limited after the last allowed attempt.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("not ready: {0}")]
    NotReady(String),
}

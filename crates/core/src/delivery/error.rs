use thiserror::Error;

/// Errors from the messaging channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("channel rejected the request: {0}")]
    Rejected(String),

    #[error("payload exceeds channel limit")]
    PayloadTooLarge,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    /// Whether a resend may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Io(_)
        )
    }
}

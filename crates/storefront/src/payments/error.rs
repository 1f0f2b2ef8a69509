//! Payment processor errors.

use thiserror::Error;

/// Errors that can occur when interacting with the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The processor did not answer in time; the outcome is unknown.
    #[error("payment processor timed out: {0}")]
    Timeout(String),

    /// HTTP request failed.
    #[error("payment request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("payment response error: {0}")]
    Response(String),

    /// The processor rejected the request.
    #[error("payment processor error: {0}")]
    Api(String),

    /// No payment intent with this ID.
    #[error("payment not found: {0}")]
    NotFound(String),

    /// Client could not be built.
    #[error("payment configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Whether the processor may or may not have acted on the request.
    #[must_use]
    pub const fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

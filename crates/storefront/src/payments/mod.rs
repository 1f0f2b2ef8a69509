//! Card payment processing.
//!
//! The checkout flow talks to the processor through [`PaymentGateway`]:
//! creating a payment intent the client confirms, then retrieving it to
//! verify capture before an order is written. [`StripeClient`] is the
//! production implementation.

mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
mod stripe;
mod types;

use async_trait::async_trait;

use atelier_core::CurrencyCode;

pub use error::PaymentError;
#[cfg(any(test, feature = "testing"))]
pub use fake::FakeGateway;
pub use stripe::StripeClient;
pub use types::{PaymentIntent, PaymentIntentStatus};

/// A card payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for `amount_minor` units of `currency`.
    ///
    /// Not retried: a timeout leaves the intent's existence unknown.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Fetch the current state of a payment intent.
    async fn retrieve_intent(&self, payment_id: &str) -> Result<PaymentIntent, PaymentError>;
}

//! Payment intent types as returned by the Stripe API.

use serde::{Deserialize, Serialize};

/// A payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Intent ID (`pi_...`); the order's `payment_id`.
    pub id: String,
    /// Secret the browser uses to confirm the payment.
    pub client_secret: Option<String>,
    /// Amount in minor units.
    pub amount: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    pub status: PaymentIntentStatus,
}

/// Lifecycle status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentIntentStatus {
    /// Status name as the processor spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        }
    }
}

/// Error envelope of a failed API call.
#[derive(Debug, Deserialize)]
pub(super) struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorDetail {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_intent() {
        let json = r#"{
            "id": "pi_3Mt",
            "object": "payment_intent",
            "amount": 15000,
            "currency": "usd",
            "client_secret": "pi_3Mt_secret_abc",
            "status": "requires_payment_method"
        }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.amount, 15000);
        assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let status: PaymentIntentStatus = serde_json::from_str("\"requires_review\"").unwrap();
        assert_eq!(status, PaymentIntentStatus::Unknown);
    }

    #[test]
    fn test_deserialize_error_envelope() {
        let json = r#"{"error": {"message": "No such payment_intent", "type": "invalid_request_error", "code": "resource_missing"}}"#;
        let body: ErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.error.code.as_deref(), Some("resource_missing"));
    }
}

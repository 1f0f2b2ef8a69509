//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; service errors convert into it with `?`.
//!
//! Every error response is a JSON body:
//!
//! ```json
//! {"error": "validation_failed", "message": "...", "fields": {"name": ["is required"]}}
//! ```

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payments::PaymentError;
use crate::services::{
    AddressError, AuthError, CartError, CatalogError, FieldErrors, OrderError, WishlistError,
};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input failed field-level validation.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Request body or path could not be parsed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but may not act on the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with existing data.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Order status change outside the status machine.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// The processor does not report the payment as captured.
    #[error("Payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    /// Payment processor call failed.
    #[error("Payment error: {0}")]
    Payment(PaymentError),

    /// A confirmed payment's order could not be written.
    #[error("Order for payment {payment_id} could not be saved: {source}")]
    OrderPersistence {
        payment_id: String,
        source: RepositoryError,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_id: Option<&'a str>,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::PaymentNotConfirmed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Payment(e) if e.is_indeterminate() => StatusCode::GATEWAY_TIMEOUT,
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::OrderPersistence { .. } | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::RateLimited => "rate_limited",
            Self::PaymentNotConfirmed(_) => "payment_not_confirmed",
            Self::Payment(e) if e.is_indeterminate() => "payment_indeterminate",
            Self::Payment(_) => "payment_failed",
            Self::OrderPersistence { .. } => "order_persistence_failed",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Client-facing message. Store and internal details are never exposed.
    fn message(&self) -> String {
        match self {
            Self::Validation(_) => "The given data was invalid".to_owned(),
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::InvalidTransition(msg)
            | Self::PaymentNotConfirmed(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, please try again later".to_owned(),
            Self::Payment(e) if e.is_indeterminate() => {
                "The payment processor did not answer in time; check the payment status before retrying"
                    .to_owned()
            }
            Self::Payment(_) => "The payment processor rejected the request".to_owned(),
            Self::OrderPersistence { .. } => {
                "Your payment was received but the order could not be saved; it has been flagged for review"
                    .to_owned()
            }
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_owned(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server and upstream errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                code = self.code(),
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.message(),
            fields: match &self {
                Self::Validation(fields) => Some(fields),
                _ => None,
            },
            payment_id: match &self {
                Self::OrderPersistence { payment_id, .. } => Some(payment_id),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        Self::Payment(e)
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(fields) => Self::Validation(fields),
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_owned()),
            AuthError::InvalidToken => Self::Unauthorized("Invalid or expired token".to_owned()),
            AuthError::UserNotFound => Self::NotFound("User not found".to_owned()),
            AuthError::UserAlreadyExists => {
                Self::Conflict("An account with this email already exists".to_owned())
            }
            AuthError::Repository(e) => Self::Database(e),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_owned()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Validation(fields) => Self::Validation(fields),
            CatalogError::ProductNotFound(_) => Self::NotFound("Product not found".to_owned()),
            CatalogError::CollectionNotFound(_) => {
                Self::NotFound("Collection not found".to_owned())
            }
            CatalogError::SlugTaken => {
                Self::Conflict("A collection with this slug already exists".to_owned())
            }
            CatalogError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::Validation(fields) => Self::Validation(fields),
            CartError::ProductNotFound(_) => Self::NotFound("Product not found".to_owned()),
            CartError::ItemNotFound => Self::NotFound("Cart item not found".to_owned()),
            CartError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<WishlistError> for AppError {
    fn from(e: WishlistError) -> Self {
        match e {
            WishlistError::ProductNotFound(_) => Self::NotFound("Product not found".to_owned()),
            WishlistError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<AddressError> for AppError {
    fn from(e: AddressError) -> Self {
        match e {
            AddressError::Validation(fields) => Self::Validation(fields),
            AddressError::NotFound => Self::NotFound("Address not found".to_owned()),
            AddressError::Forbidden => {
                Self::Forbidden("This address belongs to another user".to_owned())
            }
            AddressError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Validation(fields) => Self::Validation(fields),
            OrderError::NotFound => Self::NotFound("Order not found".to_owned()),
            OrderError::PaymentAlreadyUsed(_) => {
                Self::Conflict("This payment was already used for another order".to_owned())
            }
            OrderError::PaymentNotConfirmed(reason) => Self::PaymentNotConfirmed(reason),
            OrderError::Payment(e) => Self::Payment(e),
            e @ OrderError::InvalidTransition { .. } => Self::InvalidTransition(e.to_string()),
            OrderError::Persistence { payment_id, source } => {
                Self::OrderPersistence { payment_id, source }
            }
            OrderError::ReconciliationNotFound => {
                Self::NotFound("Reconciliation record not found".to_owned())
            }
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::OrderStatus;
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn body_json(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let (status, body) = body_json(FieldErrors::single("name", "is required").into()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["fields"]["name"][0], "is required");
        assert!(body.get("payment_id").is_none());
    }

    #[tokio::test]
    async fn test_persistence_failure_carries_payment_id() {
        let error = AppError::from(OrderError::Persistence {
            payment_id: "pi_150".to_owned(),
            source: RepositoryError::Storage("disk full".to_owned()),
        });
        let (status, body) = body_json(error).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "order_persistence_failed");
        assert_eq!(body["payment_id"], "pi_150");
        assert!(!body["message"].as_str().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_store_details_are_hidden() {
        let (status, body) =
            body_json(RepositoryError::DataCorruption("bad row 7".to_owned()).into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn test_payment_errors_map_by_outcome() {
        let timeout = AppError::from(PaymentError::Timeout("15s".to_owned()));
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.code(), "payment_indeterminate");

        let rejected = AppError::from(PaymentError::Api("card declined".to_owned()));
        assert_eq!(rejected.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(rejected.code(), "payment_failed");

        let unconfirmed = AppError::from(OrderError::PaymentNotConfirmed("pending".to_owned()));
        assert_eq!(unconfirmed.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_domain_errors_map_to_classes() {
        assert_eq!(AppError::from(AddressError::Forbidden).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(CartError::ItemNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(CatalogError::SlugTaken).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(AuthError::InvalidToken).status(),
            StatusCode::UNAUTHORIZED
        );

        let transition = AppError::from(OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
        });
        assert_eq!(transition.status(), StatusCode::CONFLICT);
        assert_eq!(transition.code(), "invalid_transition");
    }
}

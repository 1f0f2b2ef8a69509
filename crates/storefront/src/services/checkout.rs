//! Checkout: payment intents and order placement.
//!
//! Placing an order runs strictly in this order:
//!
//! 1. Validate the submitted lines, total and payment reference.
//! 2. Return the existing order if this payment was already used by the caller.
//! 3. Resolve products and the shipping address.
//! 4. Verify with the processor that the payment succeeded for this amount.
//! 5. Write order, items and cart cleanup in one store transaction.
//!
//! A failure in step 5 happens after money was captured. It is logged at
//! error level, sent to Sentry, recorded as a reconciliation record and
//! reported as [`OrderError::Persistence`] carrying the payment id.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use atelier_core::{CurrencyCode, ProductId, UserId, from_minor_units, to_minor_units};

use crate::cache::{CacheTag, ResponseCache};
use crate::db::Store;
use crate::models::order::CheckoutInput;
use crate::models::{
    NewOrder, NewOrderItem, NewReconciliation, OrderInsert, OrderWithItems, PlaceOrderInput,
};
use crate::payments::{PaymentError, PaymentGateway, PaymentIntentStatus};
use crate::services::{FieldErrors, OrderError};

const MAX_PAYMENT_ID_LENGTH: usize = 255;

/// What the browser needs to confirm a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub client_secret: String,
    pub payment_id: String,
}

/// Outcome of [`CheckoutService::place_order`].
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderWithItems,
    /// `false` when the payment had already produced this order.
    pub created: bool,
}

/// Payment and order placement for the calling user.
pub struct CheckoutService<'a> {
    store: &'a dyn Store,
    payments: &'a dyn PaymentGateway,
    cache: &'a ResponseCache,
    currency: CurrencyCode,
    verify_payments: bool,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        payments: &'a dyn PaymentGateway,
        cache: &'a ResponseCache,
        currency: CurrencyCode,
        verify_payments: bool,
    ) -> Self {
        Self {
            store,
            payments,
            cache,
            currency,
            verify_payments,
        }
    }

    /// Ask the processor for a payment intent of `amount`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` if the amount is not positive or has
    /// more than two decimal places.
    /// Returns `OrderError::Payment` if the processor fails or times out.
    #[instrument(skip(self, input), fields(user_id = %user_id, amount = %input.amount))]
    pub async fn create_payment_intent(
        &self,
        user_id: UserId,
        input: &CheckoutInput,
    ) -> Result<PaymentSession, OrderError> {
        let amount_minor = to_minor_units(input.amount)
            .map_err(|e| FieldErrors::single("amount", e.to_string()))?;
        if amount_minor == 0 {
            return Err(FieldErrors::single("amount", "must be greater than zero").into());
        }

        let intent = self
            .payments
            .create_intent(amount_minor, self.currency)
            .await
            .inspect_err(|e| {
                if e.is_indeterminate() {
                    warn!(error = %e, "Payment intent outcome unknown");
                }
            })?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Response("intent has no client secret".to_owned()))?;

        info!(payment_id = %intent.id, "Payment intent created");
        Ok(PaymentSession {
            client_secret,
            payment_id: intent.id,
        })
    }

    /// Write the order paid for by `input.payment_id`.
    ///
    /// Repeating the call with the same payment id returns the original order
    /// with `created: false`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for malformed lines, a total that does
    /// not match them, unknown products or a foreign address.
    /// Returns `OrderError::PaymentAlreadyUsed` if another user's order holds
    /// this payment id.
    /// Returns `OrderError::PaymentNotConfirmed` if the processor does not
    /// report the payment as succeeded for this total.
    /// Returns `OrderError::Persistence` if the order could not be written
    /// after the payment was confirmed.
    #[instrument(
        skip(self, input),
        fields(user_id = %user_id, payment_id = %input.payment_id, total = %input.total_amount)
    )]
    pub async fn place_order(
        &self,
        user_id: UserId,
        input: &PlaceOrderInput,
    ) -> Result<PlacedOrder, OrderError> {
        let payment_id = validate_order(input)?;

        if let Some(existing) = self.store.get_order_by_payment(&payment_id).await? {
            return self.already_placed(user_id, existing);
        }

        let items = self.resolve_items(input).await?;

        if let Some(address_id) = input.address_id {
            let owned = self
                .store
                .get_address(address_id)
                .await?
                .is_some_and(|a| a.user_id == user_id);
            if !owned {
                return Err(FieldErrors::single("address_id", "address not found").into());
            }
        }

        if self.verify_payments {
            self.verify_payment(&payment_id, input.total_amount).await?;
        }

        let new_order = NewOrder {
            user_id,
            total_amount: input.total_amount,
            status: atelier_core::OrderStatus::Paid,
            payment_id: payment_id.clone(),
            address_id: input.address_id,
            items,
        };

        let inserted = match self.store.create_order(&new_order).await {
            Ok(inserted) => inserted,
            Err(source) => {
                self.record_unpersisted_payment(&new_order, &source).await;
                return Err(OrderError::Persistence { payment_id, source });
            }
        };

        let order = match inserted {
            OrderInsert::Created(order) => order,
            OrderInsert::Existing(existing) => return self.already_placed(user_id, existing),
        };

        info!(order_id = %order.order.id, items = order.items.len(), "Order placed");
        self.cache
            .invalidate(&[CacheTag::UserOrders(user_id), CacheTag::AllOrders]);

        Ok(PlacedOrder {
            order,
            created: true,
        })
    }

    fn already_placed(
        &self,
        user_id: UserId,
        existing: OrderWithItems,
    ) -> Result<PlacedOrder, OrderError> {
        if existing.order.user_id != user_id {
            warn!(order_id = %existing.order.id, "Payment id reused by another user");
            return Err(OrderError::PaymentAlreadyUsed(existing.order.payment_id));
        }
        info!(order_id = %existing.order.id, "Order already placed for this payment");
        Ok(PlacedOrder {
            order: existing,
            created: false,
        })
    }

    /// Look up every ordered product, snapshotting its name.
    async fn resolve_items(&self, input: &PlaceOrderInput) -> Result<Vec<NewOrderItem>, OrderError> {
        let mut ids: Vec<ProductId> = input.items.iter().map(|i| i.product_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let products: HashMap<ProductId, String> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut errors = FieldErrors::new();
        let mut items = Vec::with_capacity(input.items.len());
        for (index, line) in input.items.iter().enumerate() {
            match products.get(&line.product_id) {
                Some(name) => items.push(NewOrderItem {
                    product_id: line.product_id,
                    product_name: name.clone(),
                    quantity: line.quantity,
                    price: line.price,
                }),
                None => errors.add(format!("items.{index}.product_id"), "product not found"),
            }
        }
        errors.into_result()?;
        Ok(items)
    }

    /// Check that the processor captured exactly `total` for this payment.
    async fn verify_payment(&self, payment_id: &str, total: Decimal) -> Result<(), OrderError> {
        let intent = match self.payments.retrieve_intent(payment_id).await {
            Ok(intent) => intent,
            Err(PaymentError::NotFound(_)) => {
                return Err(OrderError::PaymentNotConfirmed("payment not found".to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        if intent.status != PaymentIntentStatus::Succeeded {
            return Err(OrderError::PaymentNotConfirmed(format!(
                "payment status is {}",
                intent.status.as_str()
            )));
        }
        if from_minor_units(intent.amount) != total {
            warn!(
                captured = intent.amount,
                "Payment amount does not match order total"
            );
            return Err(OrderError::PaymentNotConfirmed(
                "payment amount does not match order total".to_owned(),
            ));
        }
        if !intent.currency.eq_ignore_ascii_case(self.currency.as_lower()) {
            return Err(OrderError::PaymentNotConfirmed(format!(
                "payment currency is {}",
                intent.currency
            )));
        }
        Ok(())
    }

    /// Leave a trail for a payment whose order could not be written.
    async fn record_unpersisted_payment(
        &self,
        order: &NewOrder,
        source: &crate::db::RepositoryError,
    ) {
        let event_id = sentry::capture_error(source);
        error!(
            error = %source,
            payment_id = %order.payment_id,
            sentry_event_id = %event_id,
            "Payment captured but order could not be saved"
        );

        let record = NewReconciliation {
            payment_id: order.payment_id.clone(),
            user_id: order.user_id,
            amount: order.total_amount,
            error: source.to_string(),
        };
        match self.store.create_reconciliation(&record).await {
            Ok(saved) => info!(reconciliation_id = %saved.id, "Reconciliation recorded"),
            Err(e) => error!(
                error = %e,
                payment_id = %order.payment_id,
                "Reconciliation record could not be saved"
            ),
        }
    }
}

/// Check the order body, returning the trimmed payment id.
fn validate_order(input: &PlaceOrderInput) -> Result<String, FieldErrors> {
    let mut errors = FieldErrors::new();

    if input.items.is_empty() {
        errors.add("items", "must contain at least one item");
    }

    // `None` once any line has failed; the sum check is skipped then.
    let mut computed = Some(Decimal::ZERO);
    for (index, line) in input.items.iter().enumerate() {
        if line.quantity < 1 {
            errors.add(format!("items.{index}.quantity"), "must be at least 1");
        }
        if let Err(e) = to_minor_units(line.price) {
            errors.add(format!("items.{index}.price"), e.to_string());
            computed = None;
            continue;
        }
        let subtotal = line.price.checked_mul(Decimal::from(line.quantity));
        if subtotal.is_none() {
            errors.add(format!("items.{index}.price"), "line total is too large");
        }
        computed = computed.zip(subtotal).and_then(|(sum, sub)| sum.checked_add(sub));
    }

    if let Err(e) = to_minor_units(input.total_amount) {
        errors.add("total_amount", e.to_string());
    } else if let Some(computed) = computed
        && !input.items.is_empty()
        && computed != input.total_amount
    {
        errors.add(
            "total_amount",
            format!("does not match the sum of the items ({computed})"),
        );
    }

    let payment_id = input.payment_id.trim();
    if payment_id.is_empty() {
        errors.add("payment_id", "is required");
    } else if payment_id.len() > MAX_PAYMENT_ID_LENGTH
        || !payment_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        errors.add("payment_id", "is not a valid payment reference");
    }

    errors.into_result()?;
    Ok(payment_id.to_owned())
}

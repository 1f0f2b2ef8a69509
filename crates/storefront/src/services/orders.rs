//! Order history, admin status changes and payment reconciliation.

use thiserror::Error;
use tracing::{info, instrument};

use atelier_core::{OrderId, OrderStatus, ReconciliationId, UserId};

use crate::cache::{CacheKey, CacheTag, ResponseCache};
use crate::db::{RepositoryError, Store};
use crate::models::order::UpdateStatusInput;
use crate::models::{AdminOrder, Order, OrderWithItems, Reconciliation};
use crate::payments::PaymentError;
use crate::services::FieldErrors;

/// Orders returned by a customer's order history.
pub const USER_ORDER_LIMIT: i64 = 50;

/// Orders returned by the admin order list.
pub const ADMIN_ORDER_LIMIT: i64 = 100;

/// Errors that can occur in checkout and order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("order not found")]
    NotFound,

    /// The payment was already used for another user's order.
    #[error("payment {0} belongs to another order")]
    PaymentAlreadyUsed(String),

    /// The processor does not report the payment as captured for this amount.
    #[error("payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    /// The payment processor failed or timed out.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The payment was captured but the order could not be written.
    #[error("order for payment {payment_id} could not be saved: {source}")]
    Persistence {
        payment_id: String,
        source: RepositoryError,
    },

    #[error("reconciliation record not found")]
    ReconciliationNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<FieldErrors> for OrderError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Reading and administering orders.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    cache: &'a ResponseCache,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, cache: &'a ResponseCache) -> Self {
        Self { store, cache }
    }

    /// The user's most recent orders with their items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<OrderWithItems>, OrderError> {
        self.cache
            .get_or_load(CacheKey::UserOrders(user_id), || async {
                Ok::<_, OrderError>(self.store.list_user_orders(user_id, USER_ORDER_LIMIT).await?)
            })
            .await
    }

    /// The most recent orders of all users with their owners.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list_all_orders(&self) -> Result<Vec<AdminOrder>, OrderError> {
        self.cache
            .get_or_load(CacheKey::AllOrders, || async {
                Ok::<_, OrderError>(self.store.list_all_orders(ADMIN_ORDER_LIMIT).await?)
            })
            .await
    }

    /// One order with its items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if it does not exist.
    pub async fn get_order(&self, id: OrderId) -> Result<OrderWithItems, OrderError> {
        self.store.get_order(id).await?.ok_or(OrderError::NotFound)
    }

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for an unknown status name.
    /// Returns `OrderError::NotFound` if the order does not exist.
    /// Returns `OrderError::InvalidTransition` if the status machine forbids
    /// the move, including when another request changed the status first.
    #[instrument(skip(self, input), fields(order_id = %id, status = %input.status))]
    pub async fn update_status(
        &self,
        id: OrderId,
        input: &UpdateStatusInput,
    ) -> Result<Order, OrderError> {
        let to: OrderStatus = input
            .status
            .trim()
            .parse()
            .map_err(|e: String| FieldErrors::single("status", e))?;

        let current = self.get_order(id).await?.order;
        if !current.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let Some(order) = self
            .store
            .update_order_status(id, current.status, to)
            .await?
        else {
            let now = self.get_order(id).await?.order;
            return Err(OrderError::InvalidTransition {
                from: now.status,
                to,
            });
        };

        info!(from = %current.status, to = %order.status, "Order status changed");
        self.cache.invalidate(&[
            CacheTag::UserOrders(order.user_id),
            CacheTag::AllOrders,
        ]);
        Ok(order)
    }

    /// Captured payments whose orders were never written.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list_reconciliations(&self) -> Result<Vec<Reconciliation>, OrderError> {
        Ok(self.store.list_open_reconciliations().await?)
    }

    /// Mark a reconciliation record handled.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::ReconciliationNotFound` if it does not exist.
    #[instrument(skip(self), fields(reconciliation_id = %id))]
    pub async fn resolve_reconciliation(
        &self,
        id: ReconciliationId,
    ) -> Result<Reconciliation, OrderError> {
        let record = self
            .store
            .resolve_reconciliation(id)
            .await?
            .ok_or(OrderError::ReconciliationNotFound)?;
        info!(payment_id = %record.payment_id, "Reconciliation resolved");
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::config::CacheConfig;
    use crate::db::{MemoryStore, OrderStore, UserStore};
    use crate::models::{NewOrder, NewUser, OrderInsert};

    async fn seed_order(store: &MemoryStore, status: OrderStatus) -> (UserId, OrderId) {
        let user = store
            .create_user(&NewUser {
                name: "Ada".to_owned(),
                email: atelier_core::Email::parse("ada@example.com").unwrap(),
                password_hash: "x".to_owned(),
            })
            .await
            .unwrap()
            .id;
        let inserted = store
            .create_order(&NewOrder {
                user_id: user,
                total_amount: Decimal::new(1000, 2),
                status,
                payment_id: "pi_seed".to_owned(),
                address_id: None,
                items: Vec::new(),
            })
            .await
            .unwrap();
        let OrderInsert::Created(order) = inserted else {
            panic!("expected a new order");
        };
        (user, order.order.id)
    }

    fn status(name: &str) -> UpdateStatusInput {
        UpdateStatusInput {
            status: name.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let store = MemoryStore::new();
        let cache = ResponseCache::disabled();
        let orders = OrderService::new(&store, &cache);
        let (_, id) = seed_order(&store, OrderStatus::Paid).await;

        for next in ["processing", "shipped", "delivered"] {
            let order = orders.update_status(id, &status(next)).await.unwrap();
            assert_eq!(order.status.as_str(), next);
        }
        assert!(matches!(
            orders.update_status(id, &status("cancelled")).await,
            Err(OrderError::InvalidTransition { from: OrderStatus::Delivered, .. })
        ));
    }

    #[tokio::test]
    async fn test_skipping_steps_is_rejected() {
        let store = MemoryStore::new();
        let cache = ResponseCache::disabled();
        let orders = OrderService::new(&store, &cache);
        let (_, id) = seed_order(&store, OrderStatus::Paid).await;

        assert!(matches!(
            orders.update_status(id, &status("delivered")).await,
            Err(OrderError::InvalidTransition { .. })
        ));
        assert!(matches!(
            orders.update_status(id, &status("refunded")).await,
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            orders.update_status(OrderId::new(999), &status("shipped")).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_status_change_evicts_order_lists() {
        let store = MemoryStore::new();
        let cache = ResponseCache::new(&CacheConfig::default());
        let orders = OrderService::new(&store, &cache);
        let (user, id) = seed_order(&store, OrderStatus::Paid).await;

        assert_eq!(orders.list_user_orders(user).await.unwrap()[0].order.status, OrderStatus::Paid);
        assert_eq!(orders.list_all_orders().await.unwrap()[0].order.order.status, OrderStatus::Paid);

        orders.update_status(id, &status("cancelled")).await.unwrap();

        assert_eq!(
            orders.list_user_orders(user).await.unwrap()[0].order.status,
            OrderStatus::Cancelled
        );
        assert_eq!(
            orders.list_all_orders().await.unwrap()[0].order.order.status,
            OrderStatus::Cancelled
        );
    }
}

//! Order and payment reconciliation types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{
    AddressId, Email, OrderId, OrderItemId, OrderStatus, ProductId, ReconciliationId, UserId,
};

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    /// Processor payment reference. Unique across orders.
    pub payment_id: String,
    pub address_id: Option<AddressId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order line. `price` and `product_name` are snapshots from order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    /// `None` once the product has been deleted from the catalog.
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// An order with its lines, as returned by the order endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Owner details attached to orders in admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderCustomer {
    pub id: UserId,
    pub name: String,
    pub email: Email,
}

/// An order as listed for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminOrder {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub customer: OrderCustomer,
}

/// A validated order ready to be written.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_id: String,
    pub address_id: Option<AddressId>,
    pub items: Vec<NewOrderItem>,
}

/// A line of a [`NewOrder`].
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Result of an idempotent order insert.
#[derive(Debug, Clone)]
pub enum OrderInsert {
    /// The order was written by this call.
    Created(OrderWithItems),
    /// An order with the same payment id already existed; nothing was written.
    Existing(OrderWithItems),
}

/// A captured payment whose order could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub id: ReconciliationId,
    pub payment_id: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A reconciliation record about to be written.
#[derive(Debug, Clone)]
pub struct NewReconciliation {
    pub payment_id: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub error: String,
}

/// One line of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Decimal,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderInput {
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub payment_id: String,
    pub address_id: Option<AddressId>,
}

/// Body of `POST /checkout`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub amount: Decimal,
}

/// Body of `PATCH /admin/orders/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusInput {
    #[serde(default)]
    pub status: String,
}

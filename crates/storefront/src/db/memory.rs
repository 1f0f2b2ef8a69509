//! In-process [`Store`] for tests.
//!
//! All state lives behind one mutex and every operation holds it for its full
//! duration, so each call is atomic the way the `PostgreSQL` transactions are.
//! Failure injection hooks let tests exercise rollback paths.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use atelier_core::{
    AddressId, CartItemId, CollectionId, Email, OrderId, OrderItemId, OrderStatus, ProductId,
    ReconciliationId, UserId, WishlistItemId,
};

use super::{
    AddressStore, CartStore, CatalogStore, OrderStore, RepositoryError, Store, UserStore,
    WishlistStore,
};
use crate::models::{
    Address, AddressFields, AdminOrder, CartItem, CartLine, Collection, CollectionFields,
    NewOrder, NewReconciliation, NewUser, Order, OrderCustomer, OrderInsert, OrderItem,
    OrderWithItems, Product, ProductFields, ProfileUpdate, Reconciliation, User, WishlistEntry,
    WishlistToggle,
};

#[derive(Default)]
struct MemoryState {
    next_id: i32,
    users: BTreeMap<UserId, (User, String)>,
    tokens: HashMap<String, UserId>,
    products: BTreeMap<ProductId, Product>,
    collections: BTreeMap<CollectionId, Collection>,
    cart: BTreeMap<CartItemId, CartItem>,
    wishlist: BTreeMap<WishlistItemId, (UserId, ProductId, DateTime<Utc>)>,
    addresses: BTreeMap<AddressId, Address>,
    orders: BTreeMap<OrderId, OrderWithItems>,
    reconciliations: BTreeMap<ReconciliationId, Reconciliation>,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &Email, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|(user, _)| &user.email == email && Some(user.id) != except)
    }

    fn cart_line(&self, item: &CartItem) -> Option<CartLine> {
        let product = self.products.get(&item.product_id)?;
        Some(CartLine::new(item.clone(), product.summary()))
    }

    fn wishlist_entry(
        &self,
        id: WishlistItemId,
        product_id: ProductId,
        created_at: DateTime<Utc>,
    ) -> Option<WishlistEntry> {
        let product = self.products.get(&product_id)?;
        Some(WishlistEntry {
            id,
            product_id,
            product: product.summary(),
            created_at,
        })
    }

    fn clear_default(&mut self, user_id: UserId, except: Option<AddressId>) {
        let now = Utc::now();
        for address in self.addresses.values_mut() {
            if address.user_id == user_id && address.fields.is_default && Some(address.id) != except
            {
                address.fields.is_default = false;
                address.updated_at = now;
            }
        }
    }
}

#[derive(Default)]
struct Failures {
    order_item_at: Option<usize>,
    cart_add_products: HashSet<ProductId>,
    unavailable: bool,
}

/// In-memory [`Store`] with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failures: Mutex<Failures>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next order write fail while inserting the item at `index`.
    ///
    /// The failure fires once; nothing from the failed order is kept.
    pub fn fail_order_item_at(&self, index: usize) {
        self.failures.lock().order_item_at = Some(index);
    }

    /// Make every cart add for `product_id` fail with a storage error.
    pub fn fail_cart_adds_for(&self, product_id: ProductId) {
        self.failures.lock().cart_add_products.insert(product_id);
    }

    /// Make [`Store::ping`] fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.failures.lock().unavailable = unavailable;
    }

    /// Number of orders stored.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    /// Number of order items stored across all orders.
    #[must_use]
    pub fn order_item_count(&self) -> usize {
        self.state.lock().orders.values().map(|o| o.items.len()).sum()
    }

    /// Raw cart rows of a user, oldest first.
    #[must_use]
    pub fn cart_items(&self, user_id: UserId) -> Vec<CartItem> {
        self.state
            .lock()
            .cart
            .values()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.failures.lock().unavailable {
            return Err(RepositoryError::Storage("store unavailable".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.lock();
        if state.email_taken(&new_user.email, None) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_id()),
            name: new_user.name.clone(),
            email: new_user.email.clone(),
            is_admin: false,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        state
            .users
            .insert(user.id, (user.clone(), new_user.password_hash.clone()));
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.lock().users.get(&id).map(|(user, _)| user.clone()))
    }

    async fn get_user_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|(user, _)| &user.email == email)
            .cloned())
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.lock();
        if let Some(email) = &update.email
            && state.email_taken(email, Some(id))
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let Some((user, _)) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            user.name.clone_from(name);
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.lock();
        let Some((user, _)) = state.users.values_mut().find(|(u, _)| &u.email == email) else {
            return Ok(None);
        };
        user.is_admin = is_admin;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn create_token(&self, token_hash: &str, user_id: UserId) -> Result<(), RepositoryError> {
        self.state
            .lock()
            .tokens
            .insert(token_hash.to_owned(), user_id);
        Ok(())
    }

    async fn get_user_by_token(&self, token_hash: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock();
        Ok(state
            .tokens
            .get(token_hash)
            .and_then(|id| state.users.get(id))
            .map(|(user, _)| user.clone()))
    }

    async fn delete_token(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().tokens.remove(token_hash).is_some())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.state.lock().products.values().cloned().collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.lock().products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.lock();
        Ok(state
            .products
            .values()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn create_product(&self, fields: &ProductFields) -> Result<Product, RepositoryError> {
        let mut state = self.state.lock();
        if let Some(collection_id) = fields.collection_id
            && !state.collections.contains_key(&collection_id)
        {
            return Err(RepositoryError::Conflict("collection does not exist".to_owned()));
        }

        let now = Utc::now();
        let product = Product {
            id: ProductId::new(state.next_id()),
            name: fields.name.clone(),
            description: fields.description.clone(),
            price: fields.price,
            stock: fields.stock,
            collection_id: fields.collection_id,
            sizes: fields.sizes.clone(),
            image_url: fields.image_url.clone(),
            images: fields.images.clone(),
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        fields: &ProductFields,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut state = self.state.lock();
        if let Some(collection_id) = fields.collection_id
            && !state.collections.contains_key(&collection_id)
        {
            return Err(RepositoryError::Conflict("collection does not exist".to_owned()));
        }

        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        product.name.clone_from(&fields.name);
        product.description.clone_from(&fields.description);
        product.price = fields.price;
        product.stock = fields.stock;
        product.collection_id = fields.collection_id;
        product.sizes.clone_from(&fields.sizes);
        product.image_url.clone_from(&fields.image_url);
        product.images.clone_from(&fields.images);
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if state.products.remove(&id).is_none() {
            return Ok(false);
        }

        state.cart.retain(|_, item| item.product_id != id);
        state.wishlist.retain(|_, (_, product_id, _)| *product_id != id);
        for order in state.orders.values_mut() {
            for item in &mut order.items {
                if item.product_id == Some(id) {
                    item.product_id = None;
                }
            }
        }
        Ok(true)
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, RepositoryError> {
        Ok(self.state.lock().collections.values().cloned().collect())
    }

    async fn get_collection(
        &self,
        id: CollectionId,
    ) -> Result<Option<Collection>, RepositoryError> {
        Ok(self.state.lock().collections.get(&id).cloned())
    }

    async fn list_collection_products(
        &self,
        id: CollectionId,
    ) -> Result<Vec<Product>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .products
            .values()
            .filter(|p| p.collection_id == Some(id))
            .cloned()
            .collect())
    }

    async fn create_collection(
        &self,
        fields: &CollectionFields,
    ) -> Result<Collection, RepositoryError> {
        let mut state = self.state.lock();
        if state.collections.values().any(|c| c.slug == fields.slug) {
            return Err(RepositoryError::Conflict("slug already exists".to_owned()));
        }

        let now = Utc::now();
        let collection = Collection {
            id: CollectionId::new(state.next_id()),
            name: fields.name.clone(),
            slug: fields.slug.clone(),
            description: fields.description.clone(),
            image_url: fields.image_url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn update_collection(
        &self,
        id: CollectionId,
        fields: &CollectionFields,
    ) -> Result<Option<Collection>, RepositoryError> {
        let mut state = self.state.lock();
        if state
            .collections
            .values()
            .any(|c| c.slug == fields.slug && c.id != id)
        {
            return Err(RepositoryError::Conflict("slug already exists".to_owned()));
        }

        let Some(collection) = state.collections.get_mut(&id) else {
            return Ok(None);
        };
        collection.name.clone_from(&fields.name);
        collection.slug.clone_from(&fields.slug);
        collection.description.clone_from(&fields.description);
        collection.image_url.clone_from(&fields.image_url);
        collection.updated_at = Utc::now();
        Ok(Some(collection.clone()))
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if state.collections.remove(&id).is_none() {
            return Ok(false);
        }

        for product in state.products.values_mut() {
            if product.collection_id == Some(id) {
                product.collection_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn list_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let state = self.state.lock();
        Ok(state
            .cart
            .values()
            .filter(|item| item.user_id == user_id)
            .filter_map(|item| state.cart_line(item))
            .collect())
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        size: Option<&str>,
        quantity: i32,
        max_quantity: i32,
    ) -> Result<(CartItem, bool), RepositoryError> {
        if self.failures.lock().cart_add_products.contains(&product_id) {
            return Err(RepositoryError::Storage(format!(
                "injected failure adding product {product_id}"
            )));
        }

        let mut state = self.state.lock();
        if !state.products.contains_key(&product_id) {
            return Err(RepositoryError::Storage(format!(
                "product {product_id} does not exist"
            )));
        }

        let existing = state.cart.values_mut().find(|item| {
            item.user_id == user_id && item.product_id == product_id && item.size.as_deref() == size
        });
        if let Some(item) = existing {
            item.quantity = item.quantity.saturating_add(quantity).min(max_quantity);
            item.updated_at = Utc::now();
            return Ok((item.clone(), false));
        }

        let now = Utc::now();
        let item = CartItem {
            id: CartItemId::new(state.next_id()),
            user_id,
            product_id,
            quantity: quantity.min(max_quantity),
            size: size.map(str::to_owned),
            created_at: now,
            updated_at: now,
        };
        state.cart.insert(item.id, item.clone());
        Ok((item, true))
    }

    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let mut state = self.state.lock();
        let Some(item) = state
            .cart
            .get_mut(&id)
            .filter(|item| item.user_id == user_id)
        else {
            return Ok(None);
        };
        item.quantity = quantity;
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn remove_cart_item(
        &self,
        user_id: UserId,
        id: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if state.cart.get(&id).is_some_and(|item| item.user_id == user_id) {
            state.cart.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn list_wishlist(&self, user_id: UserId) -> Result<Vec<WishlistEntry>, RepositoryError> {
        let state = self.state.lock();
        let mut entries: Vec<WishlistEntry> = state
            .wishlist
            .iter()
            .filter(|(_, (owner, _, _))| *owner == user_id)
            .filter_map(|(id, (_, product_id, created_at))| {
                state.wishlist_entry(*id, *product_id, *created_at)
            })
            .collect();
        entries.sort_by_key(|e| (Reverse(e.created_at), Reverse(e.id)));
        Ok(entries)
    }

    async fn toggle_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<WishlistToggle, RepositoryError> {
        let mut state = self.state.lock();
        let existing = state
            .wishlist
            .iter()
            .find(|(_, (owner, product, _))| *owner == user_id && *product == product_id)
            .map(|(id, _)| *id);

        if let Some(id) = existing {
            state.wishlist.remove(&id);
            return Ok(WishlistToggle::Removed);
        }

        if !state.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }

        let id = WishlistItemId::new(state.next_id());
        let now = Utc::now();
        state.wishlist.insert(id, (user_id, product_id, now));
        state
            .wishlist_entry(id, product_id, now)
            .map(WishlistToggle::Added)
            .ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let mut addresses: Vec<Address> = self
            .state
            .lock()
            .addresses
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| (!a.fields.is_default, Reverse(a.created_at), Reverse(a.id)));
        Ok(addresses)
    }

    async fn get_address(&self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        Ok(self.state.lock().addresses.get(&id).cloned())
    }

    async fn create_address(
        &self,
        user_id: UserId,
        fields: &AddressFields,
    ) -> Result<Address, RepositoryError> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound);
        }
        if fields.is_default {
            state.clear_default(user_id, None);
        }

        let now = Utc::now();
        let address = Address {
            id: AddressId::new(state.next_id()),
            user_id,
            fields: fields.clone(),
            created_at: now,
            updated_at: now,
        };
        state.addresses.insert(address.id, address.clone());
        Ok(address)
    }

    async fn update_address(
        &self,
        user_id: UserId,
        id: AddressId,
        fields: &AddressFields,
    ) -> Result<Option<Address>, RepositoryError> {
        let mut state = self.state.lock();
        if !state
            .addresses
            .get(&id)
            .is_some_and(|a| a.user_id == user_id)
        {
            return Ok(None);
        }
        if fields.is_default {
            state.clear_default(user_id, Some(id));
        }

        let Some(address) = state.addresses.get_mut(&id) else {
            return Ok(None);
        };
        address.fields = fields.clone();
        address.updated_at = Utc::now();
        Ok(Some(address.clone()))
    }

    async fn delete_address(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        if !state
            .addresses
            .get(&id)
            .is_some_and(|a| a.user_id == user_id)
        {
            return Ok(false);
        }

        state.addresses.remove(&id);
        for order in state.orders.values_mut() {
            if order.order.address_id == Some(id) {
                order.order.address_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, new_order: &NewOrder) -> Result<OrderInsert, RepositoryError> {
        let mut state = self.state.lock();

        if let Some(existing) = state
            .orders
            .values()
            .find(|o| o.order.payment_id == new_order.payment_id)
        {
            return Ok(OrderInsert::Existing(existing.clone()));
        }

        let fail_at = self.failures.lock().order_item_at.take();

        // Built aside and only stored once every item succeeded.
        let order_id = OrderId::new(state.next_id());
        let mut items = Vec::with_capacity(new_order.items.len());
        for (index, item) in new_order.items.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(RepositoryError::Storage(format!(
                    "injected failure writing order item {index}"
                )));
            }
            items.push(OrderItem {
                id: OrderItemId::new(state.next_id()),
                product_id: Some(item.product_id),
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                price: item.price,
            });
        }

        let now = Utc::now();
        let order = OrderWithItems {
            order: Order {
                id: order_id,
                user_id: new_order.user_id,
                total_amount: new_order.total_amount,
                status: new_order.status,
                payment_id: new_order.payment_id.clone(),
                address_id: new_order.address_id,
                created_at: now,
                updated_at: now,
            },
            items,
        };

        let ordered: HashSet<ProductId> = new_order.items.iter().map(|i| i.product_id).collect();
        state
            .cart
            .retain(|_, item| item.user_id != new_order.user_id || !ordered.contains(&item.product_id));
        state.orders.insert(order_id, order.clone());

        Ok(OrderInsert::Created(order))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(self.state.lock().orders.get(&id).cloned())
    }

    async fn get_order_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .find(|o| o.order.payment_id == payment_id)
            .cloned())
    }

    async fn list_user_orders(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .rev()
            .filter(|o| o.order.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_all_orders(&self, limit: i64) -> Result<Vec<AdminOrder>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.lock();
        state
            .orders
            .values()
            .rev()
            .take(limit)
            .map(|order| {
                let (user, _) = state.users.get(&order.order.user_id).ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "order {} has no owner",
                        order.order.id
                    ))
                })?;
                Ok(AdminOrder {
                    order: order.clone(),
                    customer: OrderCustomer {
                        id: user.id,
                        name: user.name.clone(),
                        email: user.email.clone(),
                    },
                })
            })
            .collect()
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock();
        let Some(order) = state
            .orders
            .get_mut(&id)
            .filter(|o| o.order.status == from)
        else {
            return Ok(None);
        };
        order.order.status = to;
        order.order.updated_at = Utc::now();
        Ok(Some(order.order.clone()))
    }

    async fn create_reconciliation(
        &self,
        record: &NewReconciliation,
    ) -> Result<Reconciliation, RepositoryError> {
        let mut state = self.state.lock();
        let reconciliation = Reconciliation {
            id: ReconciliationId::new(state.next_id()),
            payment_id: record.payment_id.clone(),
            user_id: record.user_id,
            amount: record.amount,
            error: record.error.clone(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        state
            .reconciliations
            .insert(reconciliation.id, reconciliation.clone());
        Ok(reconciliation)
    }

    async fn list_open_reconciliations(&self) -> Result<Vec<Reconciliation>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .reconciliations
            .values()
            .filter(|r| r.resolved_at.is_none())
            .cloned()
            .collect())
    }

    async fn resolve_reconciliation(
        &self,
        id: ReconciliationId,
    ) -> Result<Option<Reconciliation>, RepositoryError> {
        let mut state = self.state.lock();
        let Some(record) = state.reconciliations.get_mut(&id) else {
            return Ok(None);
        };
        record.resolved_at.get_or_insert_with(Utc::now);
        Ok(Some(record.clone()))
    }
}

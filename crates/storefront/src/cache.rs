//! Read-through response cache with per-kind TTLs and tag invalidation.
//!
//! Every entry carries the tags of the data it was built from. Writes
//! invalidate by tag, so a product update evicts the product itself, the
//! product list and any collection page embedding it without the writer
//! knowing which keys exist.
//!
//! A load that overlaps an invalidation is not kept: loaders note the
//! invalidation epoch before reading the store and drop their result if the
//! epoch moved by the time it is inserted.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use tracing::{debug, warn};

use atelier_core::{CollectionId, ProductId, UserId};

use crate::config::{CacheConfig, CacheTtls};
use crate::models::{AdminOrder, Collection, CollectionWithProducts, OrderWithItems, Product};

/// Cache key per cached response.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Products,
    Product(ProductId),
    Collections,
    Collection(CollectionId),
    UserOrders(UserId),
    AllOrders,
}

/// Invalidation tag attached to cached entries.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheTag {
    ProductList,
    Product(ProductId),
    CollectionList,
    Collection(CollectionId),
    UserOrders(UserId),
    AllOrders,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Vec<Product>),
    Product(Box<Product>),
    Collections(Vec<Collection>),
    Collection(Box<CollectionWithProducts>),
    UserOrders(Vec<OrderWithItems>),
    AllOrders(Vec<AdminOrder>),
}

/// A response type that can live in the cache.
pub trait Cacheable: Clone + Sized {
    fn into_value(self) -> CacheValue;
    fn from_value(value: &CacheValue) -> Option<Self>;
    /// Tags of the data this response was built from.
    fn tags(&self, key: CacheKey) -> Vec<CacheTag>;
}

impl Cacheable for Vec<Product> {
    fn into_value(self) -> CacheValue {
        CacheValue::Products(self)
    }

    fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::Products(products) => Some(products.clone()),
            _ => None,
        }
    }

    fn tags(&self, _key: CacheKey) -> Vec<CacheTag> {
        vec![CacheTag::ProductList]
    }
}

impl Cacheable for Product {
    fn into_value(self) -> CacheValue {
        CacheValue::Product(Box::new(self))
    }

    fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::Product(product) => Some((**product).clone()),
            _ => None,
        }
    }

    fn tags(&self, _key: CacheKey) -> Vec<CacheTag> {
        vec![CacheTag::Product(self.id)]
    }
}

impl Cacheable for Vec<Collection> {
    fn into_value(self) -> CacheValue {
        CacheValue::Collections(self)
    }

    fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::Collections(collections) => Some(collections.clone()),
            _ => None,
        }
    }

    fn tags(&self, _key: CacheKey) -> Vec<CacheTag> {
        vec![CacheTag::CollectionList]
    }
}

impl Cacheable for CollectionWithProducts {
    fn into_value(self) -> CacheValue {
        CacheValue::Collection(Box::new(self))
    }

    fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::Collection(collection) => Some((**collection).clone()),
            _ => None,
        }
    }

    fn tags(&self, _key: CacheKey) -> Vec<CacheTag> {
        std::iter::once(CacheTag::Collection(self.collection.id))
            .chain(self.products.iter().map(|p| CacheTag::Product(p.id)))
            .collect()
    }
}

impl Cacheable for Vec<OrderWithItems> {
    fn into_value(self) -> CacheValue {
        CacheValue::UserOrders(self)
    }

    fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::UserOrders(orders) => Some(orders.clone()),
            _ => None,
        }
    }

    fn tags(&self, key: CacheKey) -> Vec<CacheTag> {
        match key {
            CacheKey::UserOrders(user_id) => vec![CacheTag::UserOrders(user_id)],
            _ => vec![CacheTag::AllOrders],
        }
    }
}

impl Cacheable for Vec<AdminOrder> {
    fn into_value(self) -> CacheValue {
        CacheValue::AllOrders(self)
    }

    fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
            CacheValue::AllOrders(orders) => Some(orders.clone()),
            _ => None,
        }
    }

    fn tags(&self, _key: CacheKey) -> Vec<CacheTag> {
        vec![CacheTag::AllOrders]
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: CacheValue,
    tags: Vec<CacheTag>,
}

/// Per-key-kind expiration.
struct KindExpiry {
    ttl: CacheTtls,
}

impl KindExpiry {
    const fn ttl_for(&self, key: &CacheKey) -> Duration {
        match key {
            CacheKey::Products => self.ttl.products,
            CacheKey::Product(_) => self.ttl.product,
            CacheKey::Collections => self.ttl.collections,
            CacheKey::Collection(_) => self.ttl.collection,
            CacheKey::UserOrders(_) => self.ttl.user_orders,
            CacheKey::AllOrders => self.ttl.admin_orders,
        }
    }
}

impl Expiry<CacheKey, Arc<CacheEntry>> for KindExpiry {
    fn expire_after_create(
        &self,
        key: &CacheKey,
        _value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(self.ttl_for(key))
    }

    fn expire_after_update(
        &self,
        key: &CacheKey,
        _value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.ttl_for(key))
    }
}

struct CacheInner {
    cache: Cache<CacheKey, Arc<CacheEntry>>,
    epoch: AtomicU64,
}

/// Shared response cache. Cloning is cheap; a disabled cache loads every time.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Option<Arc<CacheInner>>,
}

impl ResponseCache {
    /// Build the cache from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(KindExpiry { ttl: config.ttl })
            .support_invalidation_closures()
            .build();

        Self {
            inner: Some(Arc::new(CacheInner {
                cache,
                epoch: AtomicU64::new(0),
            })),
        }
    }

    /// A cache that never stores anything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether caching is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Return the cached value for `key`, or run `load` and cache its result.
    ///
    /// Errors from `load` are returned as-is and never cached.
    ///
    /// # Errors
    ///
    /// Returns whatever `load` returns.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: CacheKey, load: F) -> Result<T, E>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(inner) = &self.inner else {
            return load().await;
        };

        if let Some(entry) = inner.cache.get(&key).await
            && let Some(value) = T::from_value(&entry.value)
        {
            debug!(?key, "Cache hit");
            return Ok(value);
        }

        let epoch = inner.epoch.load(Ordering::Acquire);
        let value = load().await?;

        if inner.epoch.load(Ordering::Acquire) == epoch {
            let entry = CacheEntry {
                tags: value.tags(key),
                value: value.clone().into_value(),
            };
            inner.cache.insert(key, Arc::new(entry)).await;

            // An invalidation that started after the check above could have
            // registered before this insert landed.
            if inner.epoch.load(Ordering::Acquire) != epoch {
                inner.cache.invalidate(&key).await;
            }
        }

        Ok(value)
    }

    /// Evict every entry carrying any of `tags`.
    pub fn invalidate(&self, tags: &[CacheTag]) {
        let Some(inner) = &self.inner else {
            return;
        };
        if tags.is_empty() {
            return;
        }

        inner.epoch.fetch_add(1, Ordering::AcqRel);
        let tags = tags.to_vec();
        debug!(?tags, "Invalidating cache tags");

        let result = inner
            .cache
            .invalidate_entries_if(move |_key, entry| entry.tags.iter().any(|t| tags.contains(t)));
        if let Err(e) = result {
            warn!(error = %e, "Tag invalidation unavailable, clearing cache");
            inner.cache.invalidate_all();
        }
    }

    /// Evict everything.
    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.epoch.fetch_add(1, Ordering::AcqRel);
            inner.cache.invalidate_all();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;

    fn product(id: i32, name: &str) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(id),
            name: name.to_owned(),
            description: String::new(),
            price: Decimal::new(1000, 2),
            stock: 1,
            collection_id: None,
            sizes: Vec::new(),
            image_url: None,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn load_counting(
        cache: &ResponseCache,
        calls: &AtomicUsize,
        name: &str,
    ) -> Product {
        cache
            .get_or_load(CacheKey::Product(ProductId::new(1)), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(product(1, name))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_read_is_a_hit() {
        let cache = ResponseCache::new(&CacheConfig::default());
        let calls = AtomicUsize::new(0);

        load_counting(&cache, &calls, "Shirt").await;
        let cached = load_counting(&cache, &calls, "Changed").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.name, "Shirt");
    }

    #[tokio::test]
    async fn test_invalidate_by_tag_forces_reload() {
        let cache = ResponseCache::new(&CacheConfig::default());
        let calls = AtomicUsize::new(0);

        load_counting(&cache, &calls, "Shirt").await;
        cache.invalidate(&[CacheTag::Product(ProductId::new(1))]);
        let fresh = load_counting(&cache, &calls, "Renamed").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(fresh.name, "Renamed");
    }

    #[tokio::test]
    async fn test_unrelated_tag_keeps_entry() {
        let cache = ResponseCache::new(&CacheConfig::default());
        let calls = AtomicUsize::new(0);

        load_counting(&cache, &calls, "Shirt").await;
        cache.invalidate(&[CacheTag::Product(ProductId::new(2))]);
        load_counting(&cache, &calls, "Shirt").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collection_entry_is_tagged_with_its_products() {
        let now = Utc::now();
        let page = CollectionWithProducts {
            collection: Collection {
                id: CollectionId::new(9),
                name: "Accessories".to_owned(),
                slug: "accessories".to_owned(),
                description: None,
                image_url: None,
                created_at: now,
                updated_at: now,
            },
            products: vec![product(1, "Belt"), product(2, "Scarf")],
        };

        let tags = page.tags(CacheKey::Collection(CollectionId::new(9)));
        assert!(tags.contains(&CacheTag::Collection(CollectionId::new(9))));
        assert!(tags.contains(&CacheTag::Product(ProductId::new(2))));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ResponseCache::new(&CacheConfig::default());
        let key = CacheKey::Products;

        let failed: Result<Vec<Product>, &str> = cache.get_or_load(key, || async { Err("down") }).await;
        assert!(failed.is_err());

        let loaded: Result<Vec<Product>, &str> =
            cache.get_or_load(key, || async { Ok(vec![product(1, "Shirt")]) }).await;
        assert_eq!(loaded.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_loads() {
        let cache = ResponseCache::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let calls = AtomicUsize::new(0);

        load_counting(&cache, &calls, "Shirt").await;
        load_counting(&cache, &calls, "Shirt").await;

        assert!(!cache.is_enabled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::StorefrontConfig;
use crate::db::Store;
use crate::payments::PaymentGateway;
use crate::services::{CartService, CheckoutService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the store, the payment processor and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn Store>,
    payments: Arc<dyn PaymentGateway>,
    cache: ResponseCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Persistence backend
    /// * `payments` - Payment processor client
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        let cache = ResponseCache::new(&config.cache);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                payments,
                cache,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the persistence backend.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to the payment processor client.
    #[must_use]
    pub fn payments(&self) -> &dyn PaymentGateway {
        self.inner.payments.as_ref()
    }

    /// Get a reference to the response cache.
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    /// Cart service with the configured line quantity cap.
    #[must_use]
    pub fn cart(&self) -> CartService<'_> {
        CartService::new(self.store(), self.config().cart_max_line_quantity)
    }

    /// Checkout service with the configured currency and verification mode.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService<'_> {
        let stripe = &self.config().stripe;
        CheckoutService::new(
            self.store(),
            self.payments(),
            self.cache(),
            stripe.currency,
            stripe.verify_payments,
        )
    }
}

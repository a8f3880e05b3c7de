//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;

use crate::commerce::{CartApi, CommerceClient, CommerceError, WishlistApi};
use crate::config::StorefrontConfig;
use crate::guest::{CART_COOKIE_MAX_AGE_DAYS, GuestStorage, MemoryStorage, keys};
use crate::identity::IdentityClient;
use crate::session::{Storefront, StorefrontDeps};

/// Devices idle for this long are dropped with their state.
const DEVICE_IDLE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Upper bound on concurrently cached devices.
const MAX_DEVICES: u64 = 100_000;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Holds the commerce and identity clients and one
/// [`Storefront`] container per device.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    cart_api: Arc<dyn CartApi>,
    wishlist_api: Arc<dyn WishlistApi>,
    identity: IdentityClient,
    devices: Cache<String, Arc<Storefront>>,
}

impl AppState {
    /// Create the application state with HTTP clients built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the commerce HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, CommerceError> {
        let client = CommerceClient::new(&config.commerce)?;
        Ok(Self::with_apis(config, Arc::new(client.clone()), Arc::new(client)))
    }

    /// Create the application state over the given commerce API implementations.
    #[must_use]
    pub fn with_apis(
        config: StorefrontConfig,
        cart_api: Arc<dyn CartApi>,
        wishlist_api: Arc<dyn WishlistApi>,
    ) -> Self {
        let identity = IdentityClient::new(&config.identity);
        let devices = Cache::builder()
            .max_capacity(MAX_DEVICES)
            .time_to_idle(DEVICE_IDLE_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                cart_api,
                wishlist_api,
                identity,
                devices,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the identity provider client.
    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }

    /// The container for a device, restoring it on first use.
    ///
    /// A new device's guest store is seeded with the request's `cart` cookie,
    /// so a guest cart survives a server restart.
    pub async fn storefront_for(&self, device_id: &str, cart_cookie: Option<&str>) -> Arc<Storefront> {
        let deps = StorefrontDeps {
            storage: seeded_storage(cart_cookie),
            cart_api: Arc::clone(&self.inner.cart_api),
            wishlist_api: Arc::clone(&self.inner.wishlist_api),
            sync: self.inner.config.sync,
        };

        self.inner
            .devices
            .get_with(device_id.to_string(), async move {
                tracing::debug!("Restoring device container");
                Arc::new(Storefront::restore(deps).await)
            })
            .await
    }

    /// Number of cached devices.
    #[must_use]
    pub fn device_count(&self) -> u64 {
        self.inner.devices.entry_count()
    }

    /// Wait for every device's background writes to finish.
    pub async fn settle(&self) {
        let devices: Vec<Arc<Storefront>> = self.inner.devices.iter().map(|(_, storefront)| storefront).collect();
        for storefront in devices {
            storefront.settle().await;
        }
    }
}

fn seeded_storage(cart_cookie: Option<&str>) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    if let Some(value) = cart_cookie.filter(|v| !v.is_empty()) {
        let expires_at = Utc::now() + chrono::Duration::days(CART_COOKIE_MAX_AGE_DAYS);
        if let Err(e) = storage.set(keys::CART, value.to_string(), Some(expires_at)) {
            tracing::debug!(error = %e, "Ignoring cart cookie");
        }
    }
    storage
}

//! Integration tests for the ExaltRide storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p exaltride-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - Optimistic cart updates, debounce and revert
//! - `wishlist_sync` - Wishlist toggles and failure notices
//! - `login_merge` - Guest-to-account merge, anonymous sessions and logout
//! - `http_api` - The JSON surface end to end
//!
//! Nothing here talks to a real commerce API: [`FakeCommerce`] stands in for
//! it, keeps an account cart and wishlist, and records every write.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use exaltride_core::{CartLineItem, GuestId, Price, ProductId, WishlistItem, cart, wishlist};
use exaltride_storefront::commerce::{CartApi, CommerceError, RequestAuth, WishlistApi};
use exaltride_storefront::config::{CommerceConfig, IdentityConfig, StorefrontConfig, SyncConfig};
use exaltride_storefront::guest::{MemoryStorage, SharedStorage, StoredSession};
use exaltride_storefront::identity::TokenSet;
use exaltride_storefront::session::{Storefront, StorefrontDeps};
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio::sync::watch;
use url::Url;

/// In-memory commerce API.
///
/// Holds one account's cart and wishlist. Guest-session requests see an empty
/// account; guest-session toggles are kept per guest until merged. Every write is logged as a short line (`add p1 2`, `set p1 7`,
/// `remove p1`, `clear`, `toggle p9`, `merge <guest id>`), including writes
/// that fail. Failures are switched on with [`set_offline`](Self::set_offline)
/// or per product with [`fail_product`](Self::fail_product).
#[derive(Default)]
pub struct FakeCommerce {
    state: Mutex<FakeState>,
    reads_open: Mutex<Option<watch::Receiver<bool>>>,
}

#[derive(Default)]
struct FakeState {
    cart: Vec<CartLineItem>,
    wishlist: Vec<WishlistItem>,
    calls: Vec<String>,
    guest_sessions: Vec<GuestId>,
    guest_wishlists: HashMap<GuestId, Vec<WishlistItem>>,
    offline: bool,
    failing: Vec<ProductId>,
}

impl FakeCommerce {
    /// An empty account.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An account holding `cart` and `wishlist`.
    #[must_use]
    pub fn with_account(cart: Vec<CartLineItem>, wishlist: Vec<WishlistItem>) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock();
            state.cart = cart;
            state.wishlist = wishlist;
        }
        Arc::new(fake)
    }

    /// Make every request fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Make writes touching `product_id` fail.
    pub fn fail_product(&self, product_id: &str) {
        self.state.lock().failing.push(ProductId::new(product_id));
    }

    /// Hold account reads until `true` is sent on the returned channel.
    #[must_use]
    pub fn hold_account_reads(&self) -> watch::Sender<bool> {
        let (open, rx) = watch::channel(false);
        *self.reads_open.lock() = Some(rx);
        open
    }

    /// Guest identifiers that writes were sent under, in order.
    #[must_use]
    pub fn guest_sessions(&self) -> Vec<GuestId> {
        self.state.lock().guest_sessions.clone()
    }

    /// Writes received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// The account cart as the server sees it.
    #[must_use]
    pub fn cart(&self) -> Vec<CartLineItem> {
        self.state.lock().cart.clone()
    }

    /// The account wishlist as the server sees it.
    #[must_use]
    pub fn wishlist(&self) -> Vec<WishlistItem> {
        self.state.lock().wishlist.clone()
    }

    /// Log a write and fail it if offline or the product is failing.
    fn write(
        &self,
        auth: &RequestAuth,
        call: String,
        product_id: Option<&ProductId>,
    ) -> Result<parking_lot::MutexGuard<'_, FakeState>, CommerceError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if let RequestAuth::GuestSession(id) = auth {
            state.guest_sessions.push(*id);
        }
        if state.offline || product_id.is_some_and(|id| state.failing.contains(id)) {
            return Err(offline());
        }
        Ok(state)
    }

    async fn wait_for_reads(&self, auth: Option<&RequestAuth>) {
        if !auth.is_some_and(RequestAuth::is_bearer) {
            return;
        }
        let gate = self.reads_open.lock().clone();
        if let Some(mut open) = gate {
            open.wait_for(|open| *open).await.ok();
        }
    }

    fn read(&self, auth: Option<&RequestAuth>) -> Result<Option<parking_lot::MutexGuard<'_, FakeState>>, CommerceError> {
        let state = self.state.lock();
        if state.offline {
            return Err(offline());
        }
        Ok(auth.is_some_and(RequestAuth::is_bearer).then_some(state))
    }
}

fn offline() -> CommerceError {
    CommerceError::Api {
        status: 503,
        message: "Service unavailable".to_string(),
    }
}

#[async_trait]
impl CartApi for FakeCommerce {
    async fn list(&self, auth: Option<&RequestAuth>) -> Result<Vec<CartLineItem>, CommerceError> {
        self.wait_for_reads(auth).await;
        Ok(self.read(auth)?.map(|state| state.cart.clone()).unwrap_or_default())
    }

    async fn add(&self, auth: &RequestAuth, product_id: &ProductId, quantity: u32) -> Result<(), CommerceError> {
        let mut state = self.write(auth, format!("add {product_id} {quantity}"), Some(product_id))?;
        if auth.is_bearer() {
            let item = CartLineItem::new(product_id.clone(), product_id.as_str(), Price::ZERO, quantity);
            cart::add(&mut state.cart, item);
        }
        Ok(())
    }

    async fn set_quantity(&self, auth: &RequestAuth, product_id: &ProductId, quantity: u32) -> Result<(), CommerceError> {
        let mut state = self.write(auth, format!("set {product_id} {quantity}"), Some(product_id))?;
        if auth.is_bearer() {
            cart::set_quantity(&mut state.cart, product_id, i64::from(quantity));
        }
        Ok(())
    }

    async fn remove(&self, auth: &RequestAuth, product_id: &ProductId) -> Result<(), CommerceError> {
        let mut state = self.write(auth, format!("remove {product_id}"), Some(product_id))?;
        if auth.is_bearer() {
            cart::remove(&mut state.cart, product_id);
        }
        Ok(())
    }

    async fn clear(&self, auth: &RequestAuth) -> Result<(), CommerceError> {
        let mut state = self.write(auth, "clear".to_string(), None)?;
        if auth.is_bearer() {
            state.cart.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl WishlistApi for FakeCommerce {
    async fn list(&self, auth: Option<&RequestAuth>) -> Result<Vec<WishlistItem>, CommerceError> {
        self.wait_for_reads(auth).await;
        Ok(self
            .read(auth)?
            .map(|state| state.wishlist.clone())
            .unwrap_or_default())
    }

    async fn toggle(&self, auth: &RequestAuth, product_id: &ProductId) -> Result<Option<bool>, CommerceError> {
        let mut state = self.write(auth, format!("toggle {product_id}"), Some(product_id))?;
        let list = match auth {
            RequestAuth::Bearer(_) => &mut state.wishlist,
            RequestAuth::GuestSession(id) => state.guest_wishlists.entry(*id).or_default(),
        };
        Ok(Some(wishlist::toggle(list, WishlistItem::bare(product_id.clone()))))
    }

    async fn merge(&self, auth: &RequestAuth, guest_id: &GuestId) -> Result<(), CommerceError> {
        let mut state = self.write(auth, format!("merge {guest_id}"), None)?;
        let guest = state.guest_wishlists.remove(guest_id).unwrap_or_default();
        state.wishlist = wishlist::merge(&state.wishlist, &guest);
        Ok(())
    }
}

/// A cart line with a readable name and a price of `price` rupees.
#[must_use]
pub fn line(id: &str, price: i64, quantity: u32) -> CartLineItem {
    CartLineItem::new(id, format!("Product {id}"), Price::from_units(price), quantity)
}

/// A wishlist entry with display fields.
#[must_use]
pub fn entry(id: &str) -> WishlistItem {
    WishlistItem {
        title: format!("Product {id}"),
        price: Price::from_units(499),
        ..WishlistItem::bare(id)
    }
}

/// Product ids of a cart, in order.
#[must_use]
pub fn cart_ids(items: &[CartLineItem]) -> Vec<(String, u32)> {
    items
        .iter()
        .map(|i| (i.product_id.as_str().to_string(), i.quantity))
        .collect()
}

/// Dependencies for a device backed by `fake`, with default sync settings.
#[must_use]
pub fn deps(storage: SharedStorage, fake: &Arc<FakeCommerce>) -> StorefrontDeps {
    StorefrontDeps {
        storage,
        cart_api: fake.clone(),
        wishlist_api: fake.clone(),
        sync: SyncConfig::default(),
    }
}

/// A guest device with an empty guest store.
pub async fn guest_device(fake: &Arc<FakeCommerce>) -> (Storefront, SharedStorage) {
    let storage = MemoryStorage::shared();
    let storefront = Storefront::restore(deps(storage.clone(), fake)).await;
    (storefront, storage)
}

/// A guest device whose changes are mirrored to the commerce API under an
/// anonymous guest session.
pub async fn anonymous_guest_device(fake: &Arc<FakeCommerce>) -> (Storefront, SharedStorage) {
    let storage = MemoryStorage::shared();
    let deps = StorefrontDeps {
        sync: SyncConfig {
            anonymous_sessions: true,
            ..SyncConfig::default()
        },
        ..deps(storage.clone(), fake)
    };
    (Storefront::restore(deps).await, storage)
}

/// A device restored with a stored session, so it starts logged in.
///
/// # Panics
///
/// Panics if the session cannot be stored.
pub async fn account_device(fake: &Arc<FakeCommerce>) -> Storefront {
    let storage = MemoryStorage::shared();
    assert!(
        StoredSession::new(storage.clone())
            .save(&TokenSet::bearer("access-token"))
            .is_ok(),
        "storing the session"
    );
    Storefront::restore(deps(storage, fake)).await
}

/// Configuration for an in-process server.
///
/// # Panics
///
/// Panics if the fixed test URLs do not parse.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    let url = |s: &str| Url::parse(s).unwrap_or_else(|e| panic!("test url {s}: {e}"));
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        commerce: CommerceConfig {
            api_url: url("http://commerce.invalid/api/"),
            anonymous_sessions: false,
            timeout: Duration::from_secs(1),
        },
        identity: IdentityConfig {
            base_url: url("http://identity.invalid/"),
            client_id: "storefront".to_string(),
            client_secret: SecretString::from("test-secret"),
        },
        sync: SyncConfig::default(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

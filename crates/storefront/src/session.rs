//! Per-device storefront container and the guest/authenticated lifecycle.
//!
//! A [`Storefront`] owns one device's cart, wishlist and selected car. It
//! starts as a guest or, if a stored session exists, as authenticated:
//!
//! ```text
//!            login(tokens)                 merge done
//!   Guest ─────────────────▶ Authenticating ──────────▶ Authenticated
//!     ▲                                                      │
//!     └──────────────────────── logout() ────────────────────┘
//! ```
//!
//! The guest-to-authenticated transition merges the guest collections into
//! the account exactly once per login.

use std::sync::Arc;

use exaltride_core::{CartLineItem, GuestId, WishlistItem, wishlist};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::car::CarSelector;
use crate::commerce::{CartApi, CommerceError, RequestAuth, WishlistApi};
use crate::config::SyncConfig;
use crate::guest::{
    DetailsCache, GuestCart, GuestIdentity, GuestWishlist, SharedStorage, StorageError, StoredSession,
};
use crate::identity::{TokenSet, UserProfile};
use crate::sync::{CartStore, Notices, SyncContext, SyncTarget, WishlistStore};

/// Errors from session transitions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another login is still merging.
    #[error("a login is already in progress")]
    LoginInProgress,

    /// The device is already logged in; the merge has happened.
    #[error("already logged in")]
    AlreadyAuthenticated,

    /// The device is not logged in.
    #[error("not logged in")]
    NotAuthenticated,

    /// The session could not be persisted.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A remote read failed.
    #[error("commerce API error: {0}")]
    Remote(#[from] CommerceError),
}

/// Authentication state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Guest,
    Authenticating,
    Authenticated,
}

/// Outcome of the login merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Guest cart lines folded in.
    pub guest_cart_lines: usize,
    /// Guest wishlist entries folded in.
    pub guest_wishlist_items: usize,
    /// Cart lines after the merge.
    pub cart_lines: usize,
    /// Wishlist entries after the merge.
    pub wishlist_items: usize,
    /// Whether every remote read and write-back succeeded.
    pub remote_synced: bool,
}

/// What a [`Storefront`] is built from.
#[derive(Clone)]
pub struct StorefrontDeps {
    pub storage: SharedStorage,
    pub cart_api: Arc<dyn CartApi>,
    pub wishlist_api: Arc<dyn WishlistApi>,
    pub sync: SyncConfig,
}

/// One device's storefront state.
pub struct Storefront {
    cart: CartStore,
    wishlist: WishlistStore,
    car: CarSelector,
    ctx: SyncContext,
    session: StoredSession,
    guest_cart: GuestCart,
    guest_wishlist: GuestWishlist,
    identity: GuestIdentity,
    cart_api: Arc<dyn CartApi>,
    wishlist_api: Arc<dyn WishlistApi>,
    anonymous_sessions: bool,
    auth: RwLock<AuthState>,
    tokens: RwLock<Option<TokenSet>>,
}

impl Storefront {
    /// Build the container for a device.
    ///
    /// With a stored session the device starts authenticated and the
    /// collections are fetched from the commerce API (a failed fetch is
    /// logged and leaves them empty). Otherwise it starts as a guest with the
    /// guest store's cart and wishlist.
    #[instrument(skip_all)]
    pub async fn restore(deps: StorefrontDeps) -> Self {
        let StorefrontDeps {
            storage,
            cart_api,
            wishlist_api,
            sync,
        } = deps;

        let session = StoredSession::new(storage.clone());
        let guest_cart = GuestCart::new(storage.clone());
        let guest_wishlist = GuestWishlist::new(storage.clone());
        let details = DetailsCache::new(storage.clone());
        let identity = GuestIdentity::new(storage.clone());

        let tokens = session.load();
        let (state, target, cart_items, wishlist_items) = match &tokens {
            Some(tokens) => (
                AuthState::Authenticated,
                SyncTarget::Account(RequestAuth::Bearer(tokens.access_token.clone())),
                Vec::new(),
                Vec::new(),
            ),
            None => (
                AuthState::Guest,
                guest_target(sync.anonymous_sessions, &identity),
                guest_cart.read(),
                guest_wishlist.read(),
            ),
        };

        let ctx = SyncContext::new(target);
        let cart = CartStore::new(
            cart_items,
            Arc::clone(&cart_api),
            guest_cart.clone(),
            ctx.clone(),
            sync.quantity_debounce,
        );
        let wishlist = WishlistStore::new(
            wishlist_items,
            Arc::clone(&wishlist_api),
            guest_wishlist.clone(),
            details,
            ctx.clone(),
        );

        let storefront = Self {
            cart,
            wishlist,
            car: CarSelector::new(storage),
            ctx,
            session,
            guest_cart,
            guest_wishlist,
            identity,
            cart_api,
            wishlist_api,
            anonymous_sessions: sync.anonymous_sessions,
            auth: RwLock::new(state),
            tokens: RwLock::new(tokens),
        };

        if state == AuthState::Authenticated
            && let Err(e) = storefront.refresh().await
        {
            tracing::warn!(error = %e, "Failed to load account collections");
        }

        storefront
    }

    #[must_use]
    pub const fn cart(&self) -> &CartStore {
        &self.cart
    }

    #[must_use]
    pub const fn wishlist(&self) -> &WishlistStore {
        &self.wishlist
    }

    #[must_use]
    pub const fn car(&self) -> &CarSelector {
        &self.car
    }

    #[must_use]
    pub const fn notices(&self) -> &Notices {
        self.ctx.notices()
    }

    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        *self.auth.read()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }

    /// Profile of the logged-in shopper.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.tokens.read().as_ref().and_then(|t| t.user.clone())
    }

    /// Tokens of the current session.
    #[must_use]
    pub fn tokens(&self) -> Option<TokenSet> {
        self.tokens.read().clone()
    }

    /// The guest identifier, if one has been minted.
    #[must_use]
    pub fn guest_id(&self) -> Option<GuestId> {
        self.identity.get()
    }

    /// The stored `cart` cookie value, if any.
    #[must_use]
    pub fn guest_cart_cookie(&self) -> Option<String> {
        self.guest_cart.cookie_value()
    }

    /// Wait for every background write to finish.
    pub async fn settle(&self) {
        self.ctx.settle().await;
    }

    /// Log in and merge the guest cart and wishlist into the account.
    ///
    /// The merge runs once per login: it is rejected while another login is
    /// merging or after one has completed. If the commerce API is unreachable
    /// the merged collections are still applied locally and the failed writes
    /// are logged (`remote_synced` is false).
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not a guest, or if the session cannot
    /// be persisted. Nothing is changed in either case.
    #[instrument(skip_all)]
    pub async fn login(&self, tokens: TokenSet) -> Result<MergeReport, SessionError> {
        {
            let mut auth = self.auth.write();
            match *auth {
                AuthState::Guest => *auth = AuthState::Authenticating,
                AuthState::Authenticating => return Err(SessionError::LoginInProgress),
                AuthState::Authenticated => return Err(SessionError::AlreadyAuthenticated),
            }
        }

        let result = self.merge_into_account(tokens).await;
        *self.auth.write() = if result.is_ok() {
            AuthState::Authenticated
        } else {
            AuthState::Guest
        };
        result
    }

    async fn merge_into_account(&self, tokens: TokenSet) -> Result<MergeReport, SessionError> {
        self.session.save(&tokens)?;

        let auth = RequestAuth::Bearer(tokens.access_token.clone());
        let (server_cart, server_wishlist) = tokio::join!(
            self.cart_api.list(Some(&auth)),
            self.wishlist_api.list(Some(&auth))
        );

        let mut remote_synced = true;
        let server_cart = server_cart.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read account cart during login, merging guest cart only");
            remote_synced = false;
            Vec::new()
        });
        let server_wishlist = server_wishlist
            .inspect_err(|e| {
                tracing::warn!(error = %e, "Failed to read account wishlist during login, merging guest wishlist only");
            })
            .ok();
        remote_synced &= server_wishlist.is_some();

        // Guest changes made while the account was being read are merged too.
        // From the switch on, changes go to the account.
        let ((guest_cart, merged_cart), (guest_wishlist, merged_wishlist)) = self
            .ctx
            .switch_target(SyncTarget::Account(auth.clone()), || {
                (
                    self.cart.merge_into(&server_cart),
                    self.wishlist
                        .merge_into(server_wishlist.as_deref().unwrap_or_default()),
                )
            });
        *self.tokens.write() = Some(tokens);
        let guest_id = self.identity.get();

        remote_synced &= self.write_back_cart(&auth, &guest_cart).await;
        remote_synced &= self
            .write_back_wishlist(&auth, guest_id, &guest_wishlist, server_wishlist.as_deref())
            .await;

        if let Err(e) = self.guest_cart.write(&self.cart.items()) {
            tracing::warn!(error = %e, "Failed to store merged cart");
        }
        if let Err(e) = self.guest_wishlist.write(&self.wishlist.items()) {
            tracing::warn!(error = %e, "Failed to store merged wishlist");
        }
        self.identity.discard();

        let report = MergeReport {
            guest_cart_lines: guest_cart.len(),
            guest_wishlist_items: guest_wishlist.len(),
            cart_lines: merged_cart.len(),
            wishlist_items: merged_wishlist.len(),
            remote_synced,
        };
        tracing::info!(?report, "Logged in, guest collections merged");
        Ok(report)
    }

    /// Send each guest line to the account cart. `add` is additive, so the
    /// account ends up with the summed quantities.
    async fn write_back_cart(&self, auth: &RequestAuth, guest: &[CartLineItem]) -> bool {
        let mut synced = true;
        for item in guest {
            if let Err(e) = self.cart_api.add(auth, &item.product_id, item.quantity).await {
                tracing::warn!(error = %e, product_id = %item.product_id, "Failed to write back guest cart line");
                synced = false;
            }
        }
        synced
    }

    /// Fold the guest wishlist into the account: a server-side merge when the
    /// guest had an anonymous session, otherwise a toggle for each guest-only
    /// entry.
    async fn write_back_wishlist(
        &self,
        auth: &RequestAuth,
        guest_id: Option<GuestId>,
        guest: &[WishlistItem],
        server: Option<&[WishlistItem]>,
    ) -> bool {
        if guest.is_empty() {
            return true;
        }

        if self.anonymous_sessions
            && let Some(guest_id) = guest_id
        {
            return match self.wishlist_api.merge(auth, &guest_id).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to merge guest wishlist");
                    false
                }
            };
        }

        // A toggle flips membership, so it is only safe against a known server list.
        let Some(server) = server else {
            tracing::warn!("Account wishlist unknown, skipping guest wishlist write-back");
            return false;
        };

        let mut synced = true;
        for item in guest.iter().filter(|i| !wishlist::contains(server, &i.product_id)) {
            if let Err(e) = self.wishlist_api.toggle(auth, &item.product_id).await {
                tracing::warn!(error = %e, product_id = %item.product_id, "Failed to write back guest wishlist entry");
                synced = false;
            }
        }
        synced
    }

    /// Log out. Returns the tokens of the ended session.
    ///
    /// In-memory collections, stored tokens and the guest store's cart and
    /// wishlist are cleared; pending quantity syncs are cancelled. A new guest
    /// identifier is minted when one is next needed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` unless the device is logged in.
    #[instrument(skip_all)]
    pub fn logout(&self) -> Result<Option<TokenSet>, SessionError> {
        {
            let mut auth = self.auth.write();
            if *auth != AuthState::Authenticated {
                return Err(SessionError::NotAuthenticated);
            }
            *auth = AuthState::Guest;
        }

        let tokens = self.tokens.write().take();
        self.session.clear();
        self.ctx
            .switch_target(guest_target(self.anonymous_sessions, &self.identity), || {
                self.cart.cancel_pending();
                self.cart.replace(Vec::new());
                self.wishlist.replace(Vec::new());
                self.guest_cart.clear();
                self.guest_wishlist.clear();
            });

        tracing::info!("Logged out");
        Ok(tokens)
    }

    /// Replace the tokens of the current session (after a token refresh).
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not logged in or the tokens cannot be
    /// persisted.
    pub fn update_tokens(&self, tokens: TokenSet) -> Result<(), SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        self.session.save(&tokens)?;
        self.ctx
            .set_target(SyncTarget::Account(RequestAuth::Bearer(tokens.access_token.clone())));
        *self.tokens.write() = Some(tokens);
        Ok(())
    }

    /// Re-read the collections from their source of truth: the commerce API
    /// when logged in, the guest store otherwise.
    ///
    /// Collections that were read are applied even if the other read failed.
    ///
    /// # Errors
    ///
    /// Returns the first remote read error, or `LoginInProgress` during a login.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<(), SessionError> {
        match self.auth_state() {
            AuthState::Authenticating => Err(SessionError::LoginInProgress),
            AuthState::Guest => {
                self.cart.cancel_pending();
                self.cart.replace(self.guest_cart.read());
                self.wishlist.replace(self.guest_wishlist.read());
                Ok(())
            }
            AuthState::Authenticated => {
                let Some(auth) = self.ctx.target().remote_auth() else {
                    return Err(SessionError::NotAuthenticated);
                };

                let (cart, wishlist) = tokio::join!(
                    self.cart_api.list(Some(&auth)),
                    self.wishlist_api.list(Some(&auth))
                );

                self.cart.cancel_pending();
                let cart = cart.map(|items| self.cart.replace(items));
                let wishlist = wishlist.map(|items| self.wishlist.replace(items));
                cart?;
                wishlist?;
                Ok(())
            }
        }
    }
}

fn guest_target(anonymous_sessions: bool, identity: &GuestIdentity) -> SyncTarget {
    SyncTarget::Guest {
        identity: anonymous_sessions.then(|| identity.clone()),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use exaltride_core::{Price, ProductId};

    use super::*;
    use crate::guest::MemoryStorage;

    /// Commerce API with nothing on the account and every write accepted.
    struct EmptyAccount;

    #[async_trait]
    impl CartApi for EmptyAccount {
        async fn list(&self, _: Option<&RequestAuth>) -> Result<Vec<CartLineItem>, CommerceError> {
            Ok(Vec::new())
        }
        async fn add(&self, _: &RequestAuth, _: &ProductId, _: u32) -> Result<(), CommerceError> {
            Ok(())
        }
        async fn set_quantity(&self, _: &RequestAuth, _: &ProductId, _: u32) -> Result<(), CommerceError> {
            Ok(())
        }
        async fn remove(&self, _: &RequestAuth, _: &ProductId) -> Result<(), CommerceError> {
            Ok(())
        }
        async fn clear(&self, _: &RequestAuth) -> Result<(), CommerceError> {
            Ok(())
        }
    }

    #[async_trait]
    impl WishlistApi for EmptyAccount {
        async fn list(&self, _: Option<&RequestAuth>) -> Result<Vec<WishlistItem>, CommerceError> {
            Ok(Vec::new())
        }
        async fn toggle(&self, _: &RequestAuth, _: &ProductId) -> Result<Option<bool>, CommerceError> {
            Ok(None)
        }
        async fn merge(&self, _: &RequestAuth, _: &GuestId) -> Result<(), CommerceError> {
            Ok(())
        }
    }

    fn deps(storage: SharedStorage) -> StorefrontDeps {
        StorefrontDeps {
            storage,
            cart_api: Arc::new(EmptyAccount),
            wishlist_api: Arc::new(EmptyAccount),
            sync: SyncConfig::default(),
        }
    }

    fn line(id: &str, quantity: u32) -> CartLineItem {
        CartLineItem::new(id, format!("Product {id}"), Price::from_units(100), quantity)
    }

    #[tokio::test]
    async fn test_restore_guest_from_guest_store() {
        let storage = MemoryStorage::shared();
        assert!(GuestCart::new(storage.clone()).write(&[line("p1", 2)]).is_ok());

        let storefront = Storefront::restore(deps(storage)).await;

        assert_eq!(storefront.auth_state(), AuthState::Guest);
        assert_eq!(storefront.cart().items(), vec![line("p1", 2)]);
    }

    #[tokio::test]
    async fn test_restore_authenticated_from_stored_session() {
        let storage = MemoryStorage::shared();
        assert!(StoredSession::new(storage.clone()).save(&TokenSet::bearer("t")).is_ok());
        assert!(GuestCart::new(storage.clone()).write(&[line("stale", 1)]).is_ok());

        let storefront = Storefront::restore(deps(storage)).await;

        assert_eq!(storefront.auth_state(), AuthState::Authenticated);
        assert!(storefront.cart().items().is_empty());
    }

    #[tokio::test]
    async fn test_login_twice_is_rejected() {
        let storefront = Storefront::restore(deps(MemoryStorage::shared())).await;

        assert!(storefront.login(TokenSet::bearer("t")).await.is_ok());
        assert!(matches!(
            storefront.login(TokenSet::bearer("t")).await,
            Err(SessionError::AlreadyAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_logout_requires_login() {
        let storefront = Storefront::restore(deps(MemoryStorage::shared())).await;
        assert!(matches!(storefront.logout(), Err(SessionError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_logout_clears_everything_but_the_car() {
        let storage = MemoryStorage::shared();
        let storefront = Storefront::restore(deps(storage.clone())).await;
        assert!(storefront.cart().add(line("p1", 1)).is_ok());
        assert!(
            storefront
                .car()
                .select(exaltride_core::SelectedCar::new("Tata", "Nexon", 2023, ""))
                .is_ok()
        );

        assert!(storefront.login(TokenSet::bearer("t")).await.is_ok());
        let ended = storefront.logout();

        assert!(ended.is_ok_and(|t| t.is_some()));
        assert_eq!(storefront.auth_state(), AuthState::Guest);
        assert!(storefront.cart().items().is_empty());
        assert!(GuestCart::new(storage.clone()).read().is_empty());
        assert!(StoredSession::new(storage).load().is_none());
        assert!(storefront.car().current().is_some());
    }
}

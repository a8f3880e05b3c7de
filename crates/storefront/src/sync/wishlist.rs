//! Wishlist container.

use std::sync::Arc;

use exaltride_core::cart::InvalidLineItem;
use exaltride_core::{ProductId, WishlistItem, wishlist};
use tokio::sync::watch;
use tracing::instrument;

use super::notice::{Notice, Operation};
use super::optimistic::{Optimistic, Versioned};
use super::{SyncContext, SyncError, SyncTarget};
use crate::commerce::WishlistApi;
use crate::guest::{DetailsCache, GuestWishlist};

/// The shopper's wishlist.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WishlistStore {
    inner: Arc<WishlistInner>,
}

struct WishlistInner {
    state: Optimistic<WishlistItem>,
    remote: Arc<dyn WishlistApi>,
    guest: GuestWishlist,
    details: DetailsCache,
    ctx: SyncContext,
}

impl WishlistStore {
    pub(crate) fn new(
        mut items: Vec<WishlistItem>,
        remote: Arc<dyn WishlistApi>,
        guest: GuestWishlist,
        details: DetailsCache,
        ctx: SyncContext,
    ) -> Self {
        details.fill(&mut items);
        Self {
            inner: Arc::new(WishlistInner {
                state: Optimistic::new(items),
                remote,
                guest,
                details,
                ctx,
            }),
        }
    }

    /// Current entries.
    #[must_use]
    pub fn items(&self) -> Vec<WishlistItem> {
        self.inner.state.items()
    }

    /// Whether a product is wishlisted.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.inner.state.read(|items| wishlist::contains(items, product_id))
    }

    /// Watch every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Versioned<WishlistItem>> {
        self.inner.state.subscribe()
    }

    /// Flip a product's membership. Returns the membership now shown.
    ///
    /// Membership is decided here, before the remote call. If the server then
    /// reports the opposite, the server's answer is applied.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Invalid` if the item has no product id.
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub fn toggle(&self, item: WishlistItem) -> Result<bool, SyncError> {
        if item.product_id.is_blank() {
            tracing::warn!("Rejected wishlist toggle without product id");
            return Err(InvalidLineItem::MissingProductId.into());
        }

        let mut item = item;
        if item.has_details() {
            self.inner.details.remember([&item]);
        } else {
            self.inner.details.fill(std::slice::from_mut(&mut item));
        }

        let product_id = item.product_id.clone();
        let target = self.inner.ctx.hold_target();
        let (checkpoint, present) = self
            .inner
            .state
            .apply(|items| wishlist::toggle(items, item.clone()));
        self.inner.persist_guest(&target);

        if let Some(auth) = target.remote_auth() {
            let inner = Arc::clone(&self.inner);
            self.inner.ctx.spawn(async move {
                match inner.remote.toggle(&auth, &product_id).await {
                    Ok(Some(server)) if server != present => {
                        tracing::debug!(product_id = %product_id, server, "Server disagrees on membership, applying server state");
                        let applied = inner.state.follow_up(&checkpoint, |items| {
                            wishlist::set_membership(items, item, server);
                        });
                        if applied {
                            inner.persist_guest(&inner.ctx.target());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, product_id = %product_id, "Remote wishlist toggle failed, reverting");
                        if inner.state.revert(&checkpoint, std::slice::from_ref(&product_id)) {
                            inner.persist_guest(&inner.ctx.target());
                        }
                        inner
                            .ctx
                            .notices()
                            .publish(Notice::failed(Operation::ToggleWishlist, Some(product_id)));
                    }
                }
            });
        }

        Ok(present)
    }

    /// Replace the whole wishlist (refresh, logout), filling display fields
    /// from the details cache.
    pub(crate) fn replace(&self, mut items: Vec<WishlistItem>) {
        self.inner.details.remember(&items);
        self.inner.details.fill(&mut items);
        self.inner.state.replace(items);
    }

    /// Fold the wishlist as it is now into the account's `server` wishlist and
    /// make the union the wishlist.
    ///
    /// Returns the entries that were folded in and the merged wishlist.
    pub(crate) fn merge_into(&self, server: &[WishlistItem]) -> (Vec<WishlistItem>, Vec<WishlistItem>) {
        let mut merged = Vec::new();
        let folded = self.inner.state.replace_with(|current| {
            merged = wishlist::merge(server, current);
            self.inner.details.remember(&merged);
            self.inner.details.fill(&mut merged);
            merged.clone()
        });
        (folded, merged)
    }
}

impl WishlistInner {
    fn persist_guest(&self, target: &SyncTarget) {
        if !target.is_guest() {
            return;
        }
        if let Err(e) = self.guest.write(&self.state.items()) {
            tracing::warn!(error = %e, "Failed to persist guest wishlist");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use exaltride_core::{GuestId, Price};
    use parking_lot::Mutex;

    use super::*;
    use crate::commerce::{CommerceError, RequestAuth};
    use crate::guest::MemoryStorage;

    /// Answers toggles with a fixed result.
    struct Scripted {
        answer: Result<Option<bool>, u16>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl WishlistApi for Scripted {
        async fn list(&self, _: Option<&RequestAuth>) -> Result<Vec<WishlistItem>, CommerceError> {
            Ok(Vec::new())
        }
        async fn toggle(&self, _: &RequestAuth, _: &ProductId) -> Result<Option<bool>, CommerceError> {
            *self.calls.lock() += 1;
            self.answer.map_err(|status| CommerceError::Api {
                status,
                message: "offline".to_string(),
            })
        }
        async fn merge(&self, _: &RequestAuth, _: &GuestId) -> Result<(), CommerceError> {
            Ok(())
        }
    }

    fn item(id: &str) -> WishlistItem {
        WishlistItem {
            title: format!("Product {id}"),
            price: Price::from_units(999),
            ..WishlistItem::bare(id)
        }
    }

    fn store(answer: Result<Option<bool>, u16>, items: Vec<WishlistItem>) -> (WishlistStore, Arc<Scripted>) {
        let remote = Arc::new(Scripted {
            answer,
            calls: Mutex::new(0),
        });
        let storage = MemoryStorage::shared();
        let store = WishlistStore::new(
            items,
            remote.clone(),
            GuestWishlist::new(storage.clone()),
            DetailsCache::new(storage),
            SyncContext::new(SyncTarget::Account(RequestAuth::bearer("token"))),
        );
        (store, remote)
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_membership() {
        let (store, remote) = store(Ok(None), vec![item("a")]);
        let before = store.items();

        assert_eq!(store.toggle(item("b")).ok(), Some(true));
        assert_eq!(store.toggle(item("b")).ok(), Some(false));

        store.inner.ctx.settle().await;
        assert_eq!(store.items(), before);
        assert_eq!(*remote.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts_with_one_notice() {
        let (store, _) = store(Err(503), Vec::new());

        assert_eq!(store.toggle(item("p9")).ok(), Some(true));
        assert!(store.contains(&ProductId::new("p9")));

        store.inner.ctx.settle().await;
        assert!(!store.contains(&ProductId::new("p9")));
        let notices = store.inner.ctx.notices().take_pending();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices.first().map(|n| n.operation), Some(Operation::ToggleWishlist));
    }

    #[tokio::test]
    async fn test_server_membership_wins() {
        let (store, _) = store(Ok(Some(true)), vec![item("a")]);

        assert_eq!(store.toggle(item("a")).ok(), Some(false));
        store.inner.ctx.settle().await;

        assert!(store.contains(&ProductId::new("a")));
    }

    #[tokio::test]
    async fn test_bare_toggle_is_filled_from_cache() {
        let (store, _) = store(Ok(None), Vec::new());
        assert_eq!(store.toggle(item("a")).ok(), Some(true));
        assert_eq!(store.toggle(WishlistItem::bare("a")).ok(), Some(false));
        assert_eq!(store.toggle(WishlistItem::bare("a")).ok(), Some(true));
        assert_eq!(store.items(), vec![item("a")]);
    }

    #[tokio::test]
    async fn test_blank_product_id_is_rejected() {
        let (store, remote) = store(Ok(None), Vec::new());
        assert!(matches!(store.toggle(WishlistItem::bare(" ")), Err(SyncError::Invalid(_))));
        assert_eq!(*remote.calls.lock(), 0);
    }
}

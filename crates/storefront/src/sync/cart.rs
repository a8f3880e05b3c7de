//! Cart container.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use exaltride_core::cart;
use exaltride_core::{CartLineItem, Price, ProductId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::notice::{Notice, Operation};
use super::optimistic::{Checkpoint, Optimistic, Versioned};
use super::{SyncContext, SyncError, SyncTarget};
use crate::commerce::{CartApi, CommerceError, RequestAuth};
use crate::guest::GuestCart;

/// A debounced quantity sync waiting to fire.
struct PendingQuantity {
    seq: u64,
    cancel: CancellationToken,
    /// State before the first change of the burst.
    checkpoint: Checkpoint<CartLineItem>,
}

/// The shopper's cart.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartInner>,
}

struct CartInner {
    state: Optimistic<CartLineItem>,
    remote: Arc<dyn CartApi>,
    guest: GuestCart,
    ctx: SyncContext,
    debounce: Duration,
    pending: Mutex<HashMap<ProductId, PendingQuantity>>,
    next_seq: AtomicU64,
}

impl CartStore {
    pub(crate) fn new(
        items: Vec<CartLineItem>,
        remote: Arc<dyn CartApi>,
        guest: GuestCart,
        ctx: SyncContext,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CartInner {
                state: Optimistic::new(items),
                remote,
                guest,
                ctx,
                debounce,
                pending: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Current line items.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        self.inner.state.items()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.inner.state.read(cart::subtotal)
    }

    /// Total number of units.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.inner.state.read(cart::item_count)
    }

    /// Quantity of a product, if it is in the cart.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> Option<u32> {
        self.inner.quantity_of(product_id)
    }

    /// Watch every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Versioned<CartLineItem>> {
        self.inner.state.subscribe()
    }

    /// Add an item, incrementing the quantity if the product is already in the cart.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Invalid` if the item lacks an id or name, or has a
    /// zero quantity. Nothing is changed in that case.
    #[instrument(skip(self, item), fields(product_id = %item.product_id, quantity = item.quantity))]
    pub fn add(&self, item: CartLineItem) -> Result<(), SyncError> {
        if let Err(e) = item.validate() {
            tracing::warn!(error = %e, "Rejected add to cart");
            return Err(e.into());
        }

        let product_id = item.product_id.clone();
        let quantity = item.quantity;
        let target = self.inner.ctx.hold_target();
        let (checkpoint, ()) = self.inner.state.apply(|items| cart::add(items, item));
        self.inner.persist_guest(&target);

        if let Some(auth) = target.remote_auth() {
            let inner = Arc::clone(&self.inner);
            self.inner.ctx.spawn(async move {
                let result = inner.remote.add(&auth, &product_id, quantity).await;
                inner.settle_write(result, &checkpoint, Operation::AddToCart, product_id);
            });
        }
        Ok(())
    }

    /// Remove a product. Removing an absent product does nothing.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn remove(&self, product_id: &ProductId) {
        if self.quantity_of(product_id).is_none() {
            tracing::debug!("Product not in cart, nothing to remove");
            return;
        }

        // A removal supersedes any pending quantity sync for the product.
        let superseded = self.inner.take_pending(product_id, None);

        let target = self.inner.ctx.hold_target();
        let (checkpoint, _) = self.inner.state.apply(|items| cart::remove(items, product_id));
        self.inner.persist_guest(&target);

        // Revert to the state before the superseded burst, if there was one.
        let checkpoint = match superseded {
            Some(pending) => pending.checkpoint.extend_to(&checkpoint),
            None => checkpoint,
        };

        if let Some(auth) = target.remote_auth() {
            let inner = Arc::clone(&self.inner);
            let product_id = product_id.clone();
            self.inner.ctx.spawn(async move {
                let result = inner.remote.remove(&auth, &product_id).await;
                inner.settle_write(result, &checkpoint, Operation::RemoveFromCart, product_id);
            });
        }
    }

    /// Set a product's quantity. Anything below 1 removes the product.
    ///
    /// Every value is published immediately; the remote write is debounced
    /// per product and carries only the last value.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn update_quantity(&self, product_id: &ProductId, quantity: i64) {
        if quantity < 1 {
            self.remove(product_id);
            return;
        }

        if self.quantity_of(product_id).is_none() {
            tracing::debug!("Product not in cart, ignoring quantity change");
            return;
        }

        let target = self.inner.ctx.hold_target();
        let (checkpoint, _) = self
            .inner
            .state
            .apply(|items| cart::set_quantity(items, product_id, quantity));
        self.inner.persist_guest(&target);

        if let Some(auth) = target.remote_auth() {
            self.schedule_quantity_sync(product_id.clone(), checkpoint, auth);
        }
    }

    /// Empty the cart.
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let superseded = self.inner.drain_pending();
        let target = self.inner.ctx.hold_target();
        let (checkpoint, keys) = self.inner.state.apply(|items| {
            let keys: Vec<ProductId> = items.iter().map(|i| i.product_id.clone()).collect();
            items.clear();
            keys
        });
        self.inner.persist_guest(&target);

        // Revert to before the earliest superseded quantity burst.
        let earliest = superseded
            .into_iter()
            .map(|p| p.checkpoint)
            .min_by_key(Checkpoint::base);
        let checkpoint = match earliest {
            Some(earliest) => earliest.extend_to(&checkpoint),
            None => checkpoint,
        };

        if let Some(auth) = target.remote_auth() {
            let inner = Arc::clone(&self.inner);
            self.inner.ctx.spawn(async move {
                if let Err(e) = inner.remote.clear(&auth).await {
                    tracing::warn!(error = %e, "Remote cart clear failed, reverting");
                    if inner.state.revert(&checkpoint, &keys) {
                        inner.persist_guest(&inner.ctx.target());
                    }
                    inner.ctx.notices().publish(Notice::failed(Operation::ClearCart, None));
                }
            });
        }
    }

    /// Cancel every pending debounced quantity sync without sending it.
    pub fn cancel_pending(&self) {
        let cancelled = self.inner.drain_pending().len();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled pending quantity syncs");
        }
    }

    /// Replace the whole cart (refresh, logout).
    pub(crate) fn replace(&self, items: Vec<CartLineItem>) {
        self.inner.state.replace(items);
    }

    /// Fold the cart as it is now into the account's `server` cart and make
    /// the result the cart, cancelling pending quantity syncs.
    ///
    /// Returns the lines that were folded in and the merged cart.
    pub(crate) fn merge_into(&self, server: &[CartLineItem]) -> (Vec<CartLineItem>, Vec<CartLineItem>) {
        self.cancel_pending();
        let mut merged = Vec::new();
        let folded = self.inner.state.replace_with(|current| {
            merged = cart::merge(server, current);
            merged.clone()
        });
        (folded, merged)
    }

    fn schedule_quantity_sync(&self, product_id: ProductId, checkpoint: Checkpoint<CartLineItem>, auth: RequestAuth) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut pending = self.inner.pending.lock();
            let checkpoint = match pending.remove(&product_id) {
                Some(previous) => {
                    previous.cancel.cancel();
                    previous.checkpoint.extend_to(&checkpoint)
                }
                None => checkpoint,
            };
            pending.insert(
                product_id.clone(),
                PendingQuantity {
                    seq,
                    cancel: cancel.clone(),
                    checkpoint,
                },
            );
        }

        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.debounce;
        self.inner.ctx.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(debounce) => {}
            }

            let Some(pending) = inner.take_pending(&product_id, Some(seq)) else {
                return;
            };
            let Some(quantity) = inner.quantity_of(&product_id) else {
                return;
            };

            tracing::debug!(product_id = %product_id, quantity, "Sending debounced quantity");
            let result = inner.remote.set_quantity(&auth, &product_id, quantity).await;
            inner.settle_write(result, &pending.checkpoint, Operation::UpdateQuantity, product_id);
        });
    }
}

impl CartInner {
    fn quantity_of(&self, product_id: &ProductId) -> Option<u32> {
        self.state.read(|items| {
            items
                .iter()
                .find(|i| &i.product_id == product_id)
                .map(|i| i.quantity)
        })
    }

    /// Remove a pending sync, cancelling its timer. With `seq`, only if it
    /// is still that sync.
    fn take_pending(&self, product_id: &ProductId, seq: Option<u64>) -> Option<PendingQuantity> {
        let mut pending = self.pending.lock();
        if seq.is_some_and(|seq| pending.get(product_id).is_none_or(|p| p.seq != seq)) {
            return None;
        }
        let entry = pending.remove(product_id)?;
        entry.cancel.cancel();
        Some(entry)
    }

    fn drain_pending(&self) -> Vec<PendingQuantity> {
        self.pending
            .lock()
            .drain()
            .map(|(_, entry)| {
                entry.cancel.cancel();
                entry
            })
            .collect()
    }

    fn persist_guest(&self, target: &SyncTarget) {
        if !target.is_guest() {
            return;
        }
        if let Err(e) = self.guest.write(&self.state.items()) {
            tracing::warn!(error = %e, "Failed to persist guest cart");
        }
    }

    /// Revert and notify if a remote write failed.
    fn settle_write(
        &self,
        result: Result<(), CommerceError>,
        checkpoint: &Checkpoint<CartLineItem>,
        operation: Operation,
        product_id: ProductId,
    ) {
        let Err(e) = result else {
            return;
        };

        tracing::warn!(error = %e, product_id = %product_id, ?operation, "Remote cart write failed, reverting");
        if self.state.revert(checkpoint, std::slice::from_ref(&product_id)) {
            self.persist_guest(&self.ctx.target());
        }
        self.ctx
            .notices()
            .publish(Notice::failed(operation, Some(product_id)));
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::guest::MemoryStorage;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: bool,
        /// Fail only calls starting with this verb.
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn record(&self, call: String) -> Result<(), CommerceError> {
            let fails = self.fail || self.fail_on.is_some_and(|verb| call.starts_with(verb));
            self.calls.lock().push(call);
            if fails {
                return Err(CommerceError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CartApi for Recorder {
        async fn list(&self, _: Option<&RequestAuth>) -> Result<Vec<CartLineItem>, CommerceError> {
            Ok(Vec::new())
        }
        async fn add(&self, _: &RequestAuth, id: &ProductId, quantity: u32) -> Result<(), CommerceError> {
            self.record(format!("add {id} {quantity}"))
        }
        async fn set_quantity(&self, _: &RequestAuth, id: &ProductId, quantity: u32) -> Result<(), CommerceError> {
            self.record(format!("set {id} {quantity}"))
        }
        async fn remove(&self, _: &RequestAuth, id: &ProductId) -> Result<(), CommerceError> {
            self.record(format!("remove {id}"))
        }
        async fn clear(&self, _: &RequestAuth) -> Result<(), CommerceError> {
            self.record("clear".to_string())
        }
    }

    fn line(id: &str, quantity: u32) -> CartLineItem {
        CartLineItem::new(id, format!("Product {id}"), Price::from_units(100), quantity)
    }

    fn account_store(remote: Arc<Recorder>, items: Vec<CartLineItem>) -> CartStore {
        let ctx = SyncContext::new(SyncTarget::Account(RequestAuth::bearer("token")));
        CartStore::new(
            items,
            remote,
            GuestCart::new(MemoryStorage::shared()),
            ctx,
            Duration::from_millis(300),
        )
    }

    #[tokio::test]
    async fn test_guest_add_persists_without_remote() {
        let storage = MemoryStorage::shared();
        let remote = Arc::new(Recorder::default());
        let store = CartStore::new(
            Vec::new(),
            remote.clone(),
            GuestCart::new(storage.clone()),
            SyncContext::new(SyncTarget::Guest { identity: None }),
            Duration::from_millis(300),
        );

        assert!(store.add(line("p1", 1)).is_ok());
        assert!(store.add(line("p1", 1)).is_ok());

        assert_eq!(store.items(), vec![line("p1", 2)]);
        assert_eq!(store.subtotal(), Price::from_units(200));
        assert_eq!(GuestCart::new(storage).read(), vec![line("p1", 2)]);
        assert!(remote.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_add_is_rejected() {
        let store = account_store(Arc::new(Recorder::default()), Vec::new());
        let result = store.add(CartLineItem::new("", "Nameless", Price::from_units(1), 1));
        assert!(matches!(result, Err(SyncError::Invalid(_))));
        assert!(store.items().is_empty());
    }

    #[tokio::test]
    async fn test_failed_add_reverts_with_one_notice() {
        let remote = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let before = vec![line("p1", 1)];
        let store = account_store(remote, before.clone());

        assert!(store.add(line("p2", 1)).is_ok());
        assert_eq!(store.items().len(), 2);

        store.inner.ctx.settle().await;
        assert_eq!(store.items(), before);
        assert_eq!(store.inner.ctx.notices().take_pending().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quantity_changes_are_coalesced() {
        let remote = Arc::new(Recorder::default());
        let store = account_store(remote.clone(), vec![line("p1", 5)]);
        let id = ProductId::new("p1");

        store.update_quantity(&id, 6);
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.update_quantity(&id, 7);

        store.inner.ctx.settle().await;
        assert_eq!(*remote.calls.lock(), vec!["set p1 7".to_string()]);
        assert_eq!(store.quantity_of(&id), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_clear_after_quantity_burst_restores_exactly() {
        let remote = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let before = vec![line("p1", 5), line("p2", 1)];
        let store = account_store(remote.clone(), before.clone());

        store.update_quantity(&ProductId::new("p1"), 6);
        store.update_quantity(&ProductId::new("p2"), 3);
        store.update_quantity(&ProductId::new("p1"), 7);
        store.clear();
        assert!(store.items().is_empty());

        store.inner.ctx.settle().await;
        assert_eq!(*remote.calls.lock(), vec!["clear".to_string()]);
        assert_eq!(store.items(), before);
        let notices = store.inner.ctx.notices().take_pending();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices.first().map(|n| n.operation), Some(Operation::ClearCart));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_add_during_pending_quantity_sync() {
        let remote = Arc::new(Recorder {
            fail_on: Some("add"),
            ..Recorder::default()
        });
        let store = account_store(remote.clone(), vec![line("p1", 5)]);
        let id = ProductId::new("p1");

        store.update_quantity(&id, 6);
        assert!(store.add(line("p1", 1)).is_ok());
        assert_eq!(store.quantity_of(&id), Some(7));

        store.inner.ctx.settle().await;
        assert_eq!(
            *remote.calls.lock(),
            vec!["add p1 1".to_string(), "set p1 6".to_string()]
        );
        assert_eq!(store.items(), vec![line("p1", 6)]);
        let notices = store.inner.ctx.notices().take_pending();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices.first().map(|n| n.operation), Some(Operation::AddToCart));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_cancels_pending_quantity_sync() {
        let remote = Arc::new(Recorder::default());
        let store = account_store(remote.clone(), vec![line("p1", 5)]);
        let id = ProductId::new("p1");

        store.update_quantity(&id, 6);
        store.update_quantity(&id, 0);

        store.inner.ctx.settle().await;
        assert_eq!(*remote.calls.lock(), vec!["remove p1".to_string()]);
        assert!(store.items().is_empty());
    }

    #[tokio::test]
    async fn test_missing_product_quantity_change_is_ignored() {
        let remote = Arc::new(Recorder::default());
        let store = account_store(remote.clone(), Vec::new());
        store.update_quantity(&ProductId::new("ghost"), 3);
        store.remove(&ProductId::new("ghost"));
        store.inner.ctx.settle().await;
        assert!(remote.calls.lock().is_empty());
    }
}

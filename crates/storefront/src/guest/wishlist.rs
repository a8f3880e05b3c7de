//! Guest wishlist, its display-field cache, and the guest identifier.

use std::collections::HashMap;

use exaltride_core::{GuestId, ProductId, WishlistItem, wishlist};

use super::{SharedStorage, StorageError, keys, read_json, write_json};

/// Guest wishlist adapter over the device store.
#[derive(Clone)]
pub struct GuestWishlist {
    storage: SharedStorage,
}

impl GuestWishlist {
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Read the guest wishlist. Absent or corrupt values read as empty.
    #[must_use]
    pub fn read(&self) -> Vec<WishlistItem> {
        read_json::<Vec<WishlistItem>>(self.storage.as_ref(), keys::WISHLIST)
            .map(wishlist::collapse)
            .unwrap_or_default()
    }

    /// Replace the guest wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium refuses the write.
    pub fn write(&self, items: &[WishlistItem]) -> Result<(), StorageError> {
        write_json(self.storage.as_ref(), keys::WISHLIST, items)
    }

    /// Drop the guest wishlist.
    pub fn clear(&self) {
        self.storage.remove(keys::WISHLIST);
    }
}

/// Last-known display fields per product.
///
/// Remote wishlist records do not always carry joined product details; this
/// cache lets such entries render with values seen earlier on this device.
/// It survives logout.
#[derive(Clone)]
pub struct DetailsCache {
    storage: SharedStorage,
}

impl DetailsCache {
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    fn load(&self) -> HashMap<ProductId, WishlistItem> {
        read_json(self.storage.as_ref(), keys::WISHLIST_DETAILS).unwrap_or_default()
    }

    /// Remember the display fields of every entry that has them.
    pub fn remember<'a>(&self, items: impl IntoIterator<Item = &'a WishlistItem>) {
        let mut cache = self.load();
        let mut changed = false;
        for item in items.into_iter().filter(|i| i.has_details()) {
            if cache.get(&item.product_id) != Some(item) {
                cache.insert(item.product_id.clone(), item.clone());
                changed = true;
            }
        }

        if changed && let Err(e) = write_json(self.storage.as_ref(), keys::WISHLIST_DETAILS, &cache) {
            tracing::warn!(error = %e, "Failed to persist wishlist details cache");
        }
    }

    /// Fill missing display fields from the cache.
    pub fn fill(&self, items: &mut [WishlistItem]) {
        if items.iter().all(WishlistItem::has_details) {
            return;
        }
        let cache = self.load();
        for item in items.iter_mut().filter(|i| !i.has_details()) {
            if let Some(known) = cache.get(&item.product_id) {
                item.fill_from(known);
            }
        }
    }
}

/// The persisted guest identifier.
#[derive(Clone)]
pub struct GuestIdentity {
    storage: SharedStorage,
}

impl GuestIdentity {
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// The stored guest identifier, if any. Corrupt values read as absent.
    #[must_use]
    pub fn get(&self) -> Option<GuestId> {
        self.storage.get(keys::GUEST_ID).and_then(|raw| GuestId::parse(&raw))
    }

    /// The stored guest identifier, generating and persisting one if needed.
    #[must_use]
    pub fn get_or_create(&self) -> GuestId {
        if let Some(id) = self.get() {
            return id;
        }

        let id = GuestId::generate();
        if let Err(e) = self.storage.set(keys::GUEST_ID, id.to_string(), None) {
            tracing::warn!(error = %e, "Failed to persist guest id");
        }
        tracing::debug!(guest_id = %id, "Generated guest id");
        id
    }

    /// Forget the guest identifier (after a login merge).
    pub fn discard(&self) {
        self.storage.remove(keys::GUEST_ID);
    }
}

#[cfg(test)]
mod tests {
    use exaltride_core::Price;

    use super::*;
    use crate::guest::{GuestStorage, MemoryStorage};

    fn detailed(id: &str) -> WishlistItem {
        WishlistItem {
            title: format!("Product {id}"),
            price: Price::from_units(75),
            image: format!("https://cdn.exaltride.com/{id}.jpg"),
            ..WishlistItem::bare(id)
        }
    }

    #[test]
    fn test_guest_wishlist_round_trip() {
        let wishlist = GuestWishlist::new(MemoryStorage::shared());
        assert!(wishlist.read().is_empty());
        assert!(wishlist.write(&[detailed("a")]).is_ok());
        assert_eq!(wishlist.read(), vec![detailed("a")]);
    }

    #[test]
    fn test_guest_wishlist_corrupt_reads_empty() {
        let storage = MemoryStorage::shared();
        assert!(storage.set(keys::WISHLIST, "[{".to_string(), None).is_ok());
        assert!(GuestWishlist::new(storage).read().is_empty());
    }

    #[test]
    fn test_details_cache_fills_bare_entries() {
        let cache = DetailsCache::new(MemoryStorage::shared());
        cache.remember([&detailed("a")]);

        let mut items = vec![WishlistItem::bare("a"), WishlistItem::bare("b")];
        cache.fill(&mut items);

        assert_eq!(items.first(), Some(&detailed("a")));
        assert!(!items.get(1).is_some_and(WishlistItem::has_details));
    }

    #[test]
    fn test_details_cache_ignores_bare_entries() {
        let storage = MemoryStorage::shared();
        DetailsCache::new(storage.clone()).remember([&WishlistItem::bare("a")]);
        assert!(storage.get(keys::WISHLIST_DETAILS).is_none());
    }

    #[test]
    fn test_guest_identity_is_stable_until_discarded() {
        let identity = GuestIdentity::new(MemoryStorage::shared());
        assert!(identity.get().is_none());

        let first = identity.get_or_create();
        assert_eq!(identity.get_or_create(), first);

        identity.discard();
        assert!(identity.get().is_none());
        assert_ne!(identity.get_or_create(), first);
    }
}

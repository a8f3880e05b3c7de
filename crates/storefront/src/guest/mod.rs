//! Device-local guest store.
//!
//! Everything a shopper accumulates before logging in lives here: the cart
//! (cookie-shaped, 7-day expiry), the wishlist and its display-field cache,
//! the guest identifier, the stored login session and the selected car.
//!
//! # Storage layout
//!
//! | Key | Contents |
//! |---|---|
//! | `cart` | URL-encoded JSON array of `CartLineItem`, 7-day expiry |
//! | `exaltride_guest_wishlist` | JSON array of `WishlistItem` |
//! | `exaltride_wishlist_details_cache` | JSON map `productId -> WishlistItem` |
//! | `wishlist_guest_id` | random UUID string |
//! | `authToken` / `idToken` / `refreshToken` / `user` | authenticated session |
//! | `user_car` | JSON `SelectedCar` |
//!
//! There is no partial-update API: callers read the whole collection, modify
//! it and write it back. Corrupt or missing values read as empty and are never
//! surfaced as errors.

mod cart;
mod session;
mod wishlist;

pub use cart::{CART_COOKIE_MAX_AGE_DAYS, CartCookie, GuestCart};
pub use session::StoredSession;
pub use wishlist::{DetailsCache, GuestIdentity, GuestWishlist};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Storage keys for the guest store.
pub mod keys {
    /// Guest cart (cookie-shaped value).
    pub const CART: &str = "cart";

    /// Guest wishlist.
    pub const WISHLIST: &str = "exaltride_guest_wishlist";

    /// Wishlist display-field cache.
    pub const WISHLIST_DETAILS: &str = "exaltride_wishlist_details_cache";

    /// Guest identifier sent as the guest-session header.
    pub const GUEST_ID: &str = "wishlist_guest_id";

    /// Access token of the authenticated session.
    pub const AUTH_TOKEN: &str = "authToken";

    /// `OpenID` Connect ID token.
    pub const ID_TOKEN: &str = "idToken";

    /// Refresh token.
    pub const REFRESH_TOKEN: &str = "refreshToken";

    /// Serialized user profile.
    pub const USER: &str = "user";

    /// Selected car.
    pub const USER_CAR: &str = "user_car";
}

/// Errors writing to the guest store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Value could not be serialized.
    #[error("failed to serialize {key}: {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The medium refused the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A device-local key/value medium (cookie jar or local storage).
///
/// Values are strings; expired values read as absent.
pub trait GuestStorage: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, optionally expiring at `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the medium refuses the write.
    fn set(&self, key: &str, value: String, expires_at: Option<DateTime<Utc>>) -> Result<(), StorageError>;

    /// Delete a value. Deleting an absent key is a no-op.
    fn remove(&self, key: &str);
}

/// Shared handle to a guest store.
pub type SharedStorage = Arc<dyn GuestStorage>;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory guest store.
///
/// Used per device by the HTTP surface (seeded from the request's `cart`
/// cookie) and by tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind a shared handle.
    #[must_use]
    pub fn shared() -> SharedStorage {
        Arc::new(Self::new())
    }

    /// Number of live (unexpired) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.values
            .read()
            .values()
            .filter(|v| v.expires_at.is_none_or(|at| at > now))
            .count()
    }

    /// Whether no live keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GuestStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read();
        let stored = values.get(key)?;
        match stored.expires_at {
            Some(at) if at <= Utc::now() => None,
            _ => Some(stored.value.clone()),
        }
    }

    fn set(&self, key: &str, value: String, expires_at: Option<DateTime<Utc>>) -> Result<(), StorageError> {
        self.values
            .write()
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

/// Read and deserialize a JSON value. Missing or corrupt values read as `None`.
pub(crate) fn read_json<T: DeserializeOwned>(storage: &dyn GuestStorage, key: &'static str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(key, error = %e, "Ignoring corrupt guest store value");
            None
        }
    }
}

/// Serialize and write a JSON value without expiry.
pub(crate) fn write_json<T: Serialize + ?Sized>(
    storage: &dyn GuestStorage,
    key: &'static str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialize { key, source })?;
    storage.set(key, raw, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.set("k", "v".to_string(), None).is_ok());
        assert_eq!(storage.get("k").as_deref(), Some("v"));
        storage.remove("k");
        assert_eq!(storage.get("k"), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_storage_expired_value_is_absent() {
        let storage = MemoryStorage::new();
        let past = Utc::now() - chrono::Duration::seconds(1);
        assert!(storage.set("k", "v".to_string(), Some(past)).is_ok());
        assert_eq!(storage.get("k"), None);
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn test_read_json_swallows_corrupt_values() {
        let storage = MemoryStorage::new();
        assert!(storage.set(keys::USER_CAR, "{not json".to_string(), None).is_ok());
        let value: Option<serde_json::Value> = read_json(&storage, keys::USER_CAR);
        assert!(value.is_none());
    }
}

//! Guest cart persisted in cookie form.

use chrono::{Duration, Utc};
use exaltride_core::{CartLineItem, cart};

use super::{GuestStorage, SharedStorage, StorageError, keys};

/// Lifetime of the `cart` cookie.
pub const CART_COOKIE_MAX_AGE_DAYS: i64 = 7;

/// Codec for the `cart` cookie value: a URL-encoded JSON array of line items.
pub struct CartCookie;

impl CartCookie {
    /// Cookie name.
    pub const NAME: &'static str = keys::CART;

    /// Encode line items as a cookie value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialize` if the items cannot be serialized.
    pub fn encode(items: &[CartLineItem]) -> Result<String, StorageError> {
        let json = serde_json::to_string(items).map_err(|source| StorageError::Serialize {
            key: keys::CART,
            source,
        })?;
        Ok(urlencoding::encode(&json).into_owned())
    }

    /// Decode a cookie value. Malformed values decode to an empty cart;
    /// repeated products are folded into one line.
    #[must_use]
    pub fn decode(value: &str) -> Vec<CartLineItem> {
        let Ok(json) = urlencoding::decode(value) else {
            tracing::debug!("Ignoring cart cookie with invalid percent-encoding");
            return Vec::new();
        };

        match serde_json::from_str::<Vec<CartLineItem>>(&json) {
            Ok(items) => cart::collapse(items),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed cart cookie");
                Vec::new()
            }
        }
    }
}

/// Guest cart adapter over the device store.
#[derive(Clone)]
pub struct GuestCart {
    storage: SharedStorage,
}

impl GuestCart {
    /// Create an adapter over `storage`.
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Read the guest cart. Absent or corrupt values read as empty.
    #[must_use]
    pub fn read(&self) -> Vec<CartLineItem> {
        self.storage
            .get(keys::CART)
            .map(|raw| CartCookie::decode(&raw))
            .unwrap_or_default()
    }

    /// Replace the guest cart, refreshing the 7-day expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the items cannot be encoded or the medium refuses the write.
    pub fn write(&self, items: &[CartLineItem]) -> Result<(), StorageError> {
        let value = CartCookie::encode(items)?;
        let expires_at = Utc::now() + Duration::days(CART_COOKIE_MAX_AGE_DAYS);
        self.storage.set(keys::CART, value, Some(expires_at))
    }

    /// The raw cookie value, if a cart is stored.
    #[must_use]
    pub fn cookie_value(&self) -> Option<String> {
        self.storage.get(keys::CART)
    }

    /// Drop the guest cart.
    pub fn clear(&self) {
        self.storage.remove(keys::CART);
    }
}

#[cfg(test)]
mod tests {
    use exaltride_core::Price;

    use super::*;
    use crate::guest::MemoryStorage;

    fn line(id: &str, quantity: u32) -> CartLineItem {
        CartLineItem::new(id, format!("Product {id}"), Price::from_units(100), quantity)
    }

    #[test]
    fn test_cookie_value_is_url_encoded_json() {
        let encoded = CartCookie::encode(&[line("p1", 1)]).unwrap_or_default();
        assert!(encoded.starts_with("%5B%7B"));
        assert!(!encoded.contains('"'));
        assert_eq!(CartCookie::decode(&encoded), vec![line("p1", 1)]);
    }

    #[test]
    fn test_decode_malformed_is_empty() {
        assert!(CartCookie::decode("%5Bnot-json").is_empty());
        assert!(CartCookie::decode("").is_empty());
        assert!(CartCookie::decode("%E0%A4%A").is_empty());
    }

    #[test]
    fn test_decode_drops_zero_quantity_lines() {
        let encoded = urlencoding::encode(
            r#"[{"productId":"p1","name":"A","price":10,"quantity":0},{"productId":"p2","name":"B","price":10,"quantity":2}]"#,
        )
        .into_owned();
        let items = CartCookie::decode(&encoded);
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().map(|i| i.product_id.as_str()), Some("p2"));
    }

    #[test]
    fn test_decode_folds_repeated_products() {
        let encoded = urlencoding::encode(
            r#"[{"productId":"p1","name":"A","price":10,"quantity":1},{"productId":"p1","name":"A","price":10,"quantity":2}]"#,
        )
        .into_owned();
        let items = CartCookie::decode(&encoded);
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().map(|i| i.quantity), Some(3));
    }

    #[test]
    fn test_guest_cart_read_write() {
        let cart = GuestCart::new(MemoryStorage::shared());
        assert!(cart.read().is_empty());
        assert!(cart.write(&[line("p1", 2)]).is_ok());
        assert_eq!(cart.read(), vec![line("p1", 2)]);
        cart.clear();
        assert!(cart.read().is_empty());
    }
}

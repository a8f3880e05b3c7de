//! Normalization of commerce API responses.
//!
//! This is the only place that tolerates upstream shape variance. The
//! canonical contract is:
//!
//! ```json
//! {"items": [{"product_id": "p1", "quantity": 2, "name": "...", "price": 499.0}]}
//! ```
//!
//! Accepted aliases:
//! - envelope: `{"data": [...]}`, `{"data": {"items": [...]}}`, or a bare array
//! - record key: `productId` for `product_id`
//! - product details either flattened on the record or nested under `product`
//!
//! Anything else is a [`CommerceError::Schema`].

use exaltride_core::{CartLineItem, Price, ProductId, WishlistItem, cart, wishlist};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::CommerceError;

/// List envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Items { items: Vec<T> },
    Data { data: DataBody<T> },
    Bare(Vec<T>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataBody<T> {
    List(Vec<T>),
    Nested { items: Vec<T> },
}

impl<T> Envelope<T> {
    fn into_records(self) -> Vec<T> {
        match self {
            Self::Items { items }
            | Self::Bare(items)
            | Self::Data {
                data: DataBody::List(items) | DataBody::Nested { items },
            } => items,
        }
    }
}

/// Display fields, either flattened on a record or nested under `product`.
#[derive(Debug, Default, Deserialize)]
struct ProductDetails {
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, alias = "categoryId")]
    category_id: Option<String>,
    #[serde(default, alias = "brandName")]
    brand_name: Option<String>,
    #[serde(default, alias = "inStock")]
    in_stock: Option<bool>,
}

impl ProductDetails {
    /// Field-wise: flattened values win over nested ones.
    fn or(self, nested: Option<Self>) -> Self {
        let Some(nested) = nested else {
            return self;
        };
        Self {
            name: self.name.filter(|n| !n.is_empty()).or(nested.name),
            price: self.price.or(nested.price),
            image: self.image.filter(|i| !i.is_empty()).or(nested.image),
            slug: self.slug.or(nested.slug),
            category_id: self.category_id.or(nested.category_id),
            brand_name: self.brand_name.or(nested.brand_name),
            in_stock: self.in_stock.or(nested.in_stock),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CartRecord {
    #[serde(alias = "productId")]
    product_id: ProductId,
    quantity: u32,
    #[serde(default)]
    product: Option<ProductDetails>,
    #[serde(flatten)]
    details: ProductDetails,
}

impl CartRecord {
    fn into_line_item(self) -> Option<CartLineItem> {
        if self.product_id.is_blank() || self.quantity == 0 {
            tracing::debug!(product_id = %self.product_id, "Skipping empty cart record");
            return None;
        }

        let details = self.details.or(self.product);
        Some(CartLineItem {
            product_id: self.product_id,
            name: details.name.unwrap_or_default(),
            price: details.price.map_or(Price::ZERO, Price::new),
            image: details.image.unwrap_or_default(),
            quantity: self.quantity,
            category_id: details.category_id,
            slug: details.slug,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WishlistRecord {
    #[serde(alias = "productId")]
    product_id: ProductId,
    #[serde(default)]
    product: Option<ProductDetails>,
    #[serde(flatten)]
    details: ProductDetails,
}

impl WishlistRecord {
    fn into_item(self) -> Option<WishlistItem> {
        if self.product_id.is_blank() {
            return None;
        }

        let details = self.details.or(self.product);
        Some(WishlistItem {
            product_id: self.product_id,
            title: details.name.unwrap_or_default(),
            price: details.price.map_or(Price::ZERO, Price::new),
            image: details.image.unwrap_or_default(),
            slug: details.slug,
            brand_name: details.brand_name,
            in_stock: details.in_stock,
        })
    }
}

/// Toggle response. Membership may be reported at the top level or under `data`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToggleBody {
    Data { data: ToggleMembership },
    Flat(ToggleMembership),
}

#[derive(Debug, Deserialize)]
struct ToggleMembership {
    #[serde(default, alias = "inWishlist", alias = "added")]
    in_wishlist: Option<bool>,
}

fn parse_list<T: DeserializeOwned>(body: &str, what: &str) -> Result<Vec<T>, CommerceError> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_records)
        .map_err(|e| {
            tracing::warn!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Unrecognized {what} response shape"
            );
            CommerceError::Schema(format!("unrecognized {what} response: {e}"))
        })
}

/// Normalize a `GET /cart` response body.
///
/// # Errors
///
/// Returns `CommerceError::Schema` if the body matches no accepted shape.
pub fn cart_items(body: &str) -> Result<Vec<CartLineItem>, CommerceError> {
    let records = parse_list::<CartRecord>(body, "cart")?;
    Ok(cart::collapse(records.into_iter().filter_map(CartRecord::into_line_item)))
}

/// Normalize a `GET /wishlist/list` response body.
///
/// # Errors
///
/// Returns `CommerceError::Schema` if the body matches no accepted shape.
pub fn wishlist_items(body: &str) -> Result<Vec<WishlistItem>, CommerceError> {
    let records = parse_list::<WishlistRecord>(body, "wishlist")?;
    Ok(wishlist::collapse(records.into_iter().filter_map(WishlistRecord::into_item)))
}

/// Membership reported by a `POST /wishlist/toggle` response, if any.
///
/// Empty or unrecognized bodies report nothing.
#[must_use]
pub fn toggle_membership(body: &str) -> Option<bool> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<ToggleBody>(body) {
        Ok(ToggleBody::Data { data: m } | ToggleBody::Flat(m)) => m.in_wishlist,
        Err(e) => {
            tracing::debug!(error = %e, "Toggle response carries no membership");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error", alias = "detail")]
    message: String,
}

/// Human-readable message from an error response body.
///
/// Falls back to the first 200 characters of the raw body.
#[must_use]
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map_or_else(|_| body.chars().take(200).collect(), |e| e.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[CartLineItem]) -> Vec<(&str, u32)> {
        items.iter().map(|i| (i.product_id.as_str(), i.quantity)).collect()
    }

    #[test]
    fn test_canonical_cart() {
        let items = cart_items(
            r#"{"items":[{"product_id":"p1","quantity":2,"name":"Brake Pad","price":499.5,"image":"a.jpg"}]}"#,
        )
        .unwrap_or_default();
        assert_eq!(ids(&items), vec![("p1", 2)]);
        let first = items.first();
        assert_eq!(first.map(|i| i.name.as_str()), Some("Brake Pad"));
        assert_eq!(first.map(|i| i.price.display()), Some("₹499.50".to_string()));
    }

    #[test]
    fn test_cart_envelope_aliases() {
        let bodies = [
            r#"{"data":[{"productId":"p1","quantity":1}]}"#,
            r#"{"data":{"items":[{"productId":"p1","quantity":1}]}}"#,
            r#"[{"product_id":"p1","quantity":1}]"#,
        ];
        for body in bodies {
            let items = cart_items(body);
            assert!(items.is_ok(), "{body}");
            assert_eq!(ids(&items.unwrap_or_default()), vec![("p1", 1)], "{body}");
        }
    }

    #[test]
    fn test_cart_nested_product_details() {
        let items = cart_items(
            r#"{"items":[{"product_id":"p1","quantity":3,"product":{"title":"Wiper","price":"120.00","slug":"wiper"}}]}"#,
        )
        .unwrap_or_default();
        let first = items.first();
        assert_eq!(first.map(|i| i.name.as_str()), Some("Wiper"));
        assert_eq!(first.map(|i| i.price), Some(Price::from_units(120)));
        assert_eq!(first.and_then(|i| i.slug.as_deref()), Some("wiper"));
    }

    #[test]
    fn test_cart_skips_zero_quantity() {
        let items = cart_items(r#"{"items":[{"product_id":"p1","quantity":0},{"product_id":"p2","quantity":1}]}"#)
            .unwrap_or_default();
        assert_eq!(ids(&items), vec![("p2", 1)]);
    }

    #[test]
    fn test_repeated_products_become_one_record() {
        let items = cart_items(r#"{"items":[{"product_id":"p1","quantity":1},{"productId":"p1","quantity":2}]}"#)
            .unwrap_or_default();
        assert_eq!(ids(&items), vec![("p1", 3)]);

        let items = wishlist_items(r#"[{"product_id":"p9"},{"productId":"p9","product":{"name":"Seat Cover"}}]"#)
            .unwrap_or_default();
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().map(|i| i.title.as_str()), Some("Seat Cover"));
    }

    #[test]
    fn test_unknown_shape_is_schema_error() {
        assert!(matches!(cart_items(r#"{"cart":[]}"#), Err(CommerceError::Schema(_))));
        assert!(matches!(cart_items(r#"{"items":[{"sku":"x"}]}"#), Err(CommerceError::Schema(_))));
        assert!(matches!(wishlist_items("null"), Err(CommerceError::Schema(_))));
    }

    #[test]
    fn test_wishlist_records() {
        let items = wishlist_items(
            r#"{"items":[{"productId":"p9","product":{"name":"Seat Cover","price":999,"brandName":"Acme","inStock":true}},{"product_id":"p10"}]}"#,
        )
        .unwrap_or_default();
        assert_eq!(items.len(), 2);
        let first = items.first();
        assert_eq!(first.map(|i| i.title.as_str()), Some("Seat Cover"));
        assert_eq!(first.and_then(|i| i.brand_name.as_deref()), Some("Acme"));
        assert_eq!(first.and_then(|i| i.in_stock), Some(true));
        assert!(!items.get(1).is_some_and(WishlistItem::has_details));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"message":"out of stock"}"#), "out of stock");
        assert_eq!(error_message(r#"{"error":"unauthorized"}"#), "unauthorized");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_toggle_membership() {
        assert_eq!(toggle_membership(r#"{"in_wishlist":true}"#), Some(true));
        assert_eq!(toggle_membership(r#"{"added":false}"#), Some(false));
        assert_eq!(toggle_membership(r#"{"data":{"inWishlist":true}}"#), Some(true));
        assert_eq!(toggle_membership(r#"{"ok":true}"#), None);
        assert_eq!(toggle_membership(""), None);
    }
}

//! Wishlist entries and toggle/merge semantics.
//!
//! Membership is binary: an entry is either present once or absent.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::keyed::{Keyed, position_of};
use super::price::Price;

/// A product saved to the wishlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    /// Product identifier (unique within a wishlist).
    pub product_id: ProductId,
    /// Product title.
    #[serde(default)]
    pub title: String,
    /// Last seen price.
    #[serde(default)]
    pub price: Price,
    /// Product image URL.
    #[serde(default)]
    pub image: String,
    /// Product URL slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Brand name.
    #[serde(default, rename = "brand_name", skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    /// Stock flag as last reported.
    #[serde(default, rename = "in_stock", skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
}

impl WishlistItem {
    /// Create an entry with only the key known.
    #[must_use]
    pub fn bare(product_id: impl Into<ProductId>) -> Self {
        Self {
            product_id: product_id.into(),
            title: String::new(),
            price: Price::ZERO,
            image: String::new(),
            slug: None,
            brand_name: None,
            in_stock: None,
        }
    }

    /// Whether the entry carries enough to render a card.
    #[must_use]
    pub fn has_details(&self) -> bool {
        !self.title.is_empty()
    }

    /// Fill missing display fields from a previously seen entry.
    pub fn fill_from(&mut self, known: &Self) {
        if self.title.is_empty() {
            self.title.clone_from(&known.title);
        }
        if self.price == Price::ZERO {
            self.price = known.price;
        }
        if self.image.is_empty() {
            self.image.clone_from(&known.image);
        }
        if self.slug.is_none() {
            self.slug.clone_from(&known.slug);
        }
        if self.brand_name.is_none() {
            self.brand_name.clone_from(&known.brand_name);
        }
        if self.in_stock.is_none() {
            self.in_stock = known.in_stock;
        }
    }
}

impl Keyed for WishlistItem {
    fn product_id(&self) -> &ProductId {
        &self.product_id
    }
}

/// Whether the product is in the wishlist.
#[must_use]
pub fn contains(items: &[WishlistItem], product_id: &ProductId) -> bool {
    position_of(items, product_id).is_some()
}

/// Flip membership of `item`'s product. Returns the new membership.
pub fn toggle(items: &mut Vec<WishlistItem>, item: WishlistItem) -> bool {
    match position_of(items, &item.product_id) {
        Some(idx) => {
            items.remove(idx);
            false
        }
        None => {
            items.push(item);
            true
        }
    }
}

/// Force membership to `present`. Returns whether anything changed.
pub fn set_membership(items: &mut Vec<WishlistItem>, item: WishlistItem, present: bool) -> bool {
    if contains(items, &item.product_id) == present {
        return false;
    }
    toggle(items, item);
    true
}

/// Union of server and guest wishlists, server order first.
#[must_use]
pub fn merge(server: &[WishlistItem], guest: &[WishlistItem]) -> Vec<WishlistItem> {
    let mut merged = server.to_vec();
    for item in guest {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.fill_from(item),
            None => merged.push(item.clone()),
        }
    }
    merged
}

/// Build a wishlist from records that may repeat a product, keeping the
/// first entry for each and filling its missing fields from later ones.
#[must_use]
pub fn collapse(records: impl IntoIterator<Item = WishlistItem>) -> Vec<WishlistItem> {
    let records: Vec<WishlistItem> = records.into_iter().collect();
    merge(&[], &records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> WishlistItem {
        WishlistItem {
            title: format!("Product {id}"),
            price: Price::from_units(50),
            ..WishlistItem::bare(id)
        }
    }

    fn ids(items: &[WishlistItem]) -> Vec<&str> {
        items.iter().map(|i| i.product_id.as_str()).collect()
    }

    #[test]
    fn test_toggle_twice_restores_membership() {
        let original = vec![item("a"), item("b")];

        let mut items = original.clone();
        assert!(toggle(&mut items, item("p9")));
        assert!(!toggle(&mut items, item("p9")));
        assert_eq!(items, original);

        let mut items = original.clone();
        assert!(!toggle(&mut items, item("a")));
        assert!(toggle(&mut items, item("a")));
        assert_eq!(ids(&items), vec!["b", "a"]);
        assert!(contains(&items, &ProductId::new("a")));
    }

    #[test]
    fn test_set_membership_is_noop_when_already_matching() {
        let mut items = vec![item("a")];
        assert!(!set_membership(&mut items, item("a"), true));
        assert!(set_membership(&mut items, item("a"), false));
        assert!(items.is_empty());
    }

    #[test]
    fn test_merge_is_union_server_first() {
        let server = vec![item("b"), item("c")];
        let guest = vec![item("a"), item("b")];
        assert_eq!(ids(&merge(&server, &guest)), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_merge_fills_missing_details_from_guest() {
        let server = vec![WishlistItem::bare("a")];
        let guest = vec![item("a")];
        let merged = merge(&server, &guest);
        assert_eq!(merged.first().map(|i| i.title.as_str()), Some("Product a"));
    }

    #[test]
    fn test_collapse_keeps_one_entry_per_product() {
        let items = collapse([WishlistItem::bare("a"), item("b"), item("a")]);
        assert_eq!(items, vec![item("a"), item("b")]);
    }

    #[test]
    fn test_fill_from_keeps_present_fields() {
        let mut fresh = item("a");
        fresh.title = "Fresh".to_string();
        fresh.fill_from(&item("a"));
        assert_eq!(fresh.title, "Fresh");
    }

    #[test]
    fn test_wishlist_layout_uses_snake_case_brand() {
        let mut entry = item("a");
        entry.brand_name = Some("Bosch".to_string());
        let json = serde_json::to_value(&entry).ok();
        assert_eq!(
            json.as_ref().and_then(|v| v.get("brand_name")),
            Some(&serde_json::json!("Bosch"))
        );
    }
}

//! Cart line items and the pure cart algebra.
//!
//! Every function here is a pure transformation of an ordered collection of
//! [`CartLineItem`]s. The invariants they maintain:
//! - at most one line item per product (adding an existing product increments);
//! - no line item with a quantity below 1 ever exists (dropping below 1 removes).

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::keyed::{Keyed, position_of};
use super::price::Price;

/// Errors raised when a line item is not fit to be added to a cart.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidLineItem {
    /// The product ID is empty.
    #[error("line item is missing a product id")]
    MissingProductId,
    /// The product name is empty.
    #[error("line item {0} is missing a name")]
    MissingName(ProductId),
    /// The quantity is zero.
    #[error("line item {0} must have a quantity of at least 1")]
    ZeroQuantity(ProductId),
}

/// A single product in the cart.
///
/// `price` is a snapshot taken when the product was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    /// Product identifier (unique within a cart).
    pub product_id: ProductId,
    /// Product display name.
    pub name: String,
    /// Unit price at the time of add.
    pub price: Price,
    /// Product image URL.
    #[serde(default)]
    pub image: String,
    /// Number of units (always at least 1).
    pub quantity: u32,
    /// Category the product was added from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Product URL slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl CartLineItem {
    /// Create a line item with the required fields.
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, name: impl Into<String>, price: Price, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price,
            image: String::new(),
            quantity,
            category_id: None,
            slug: None,
        }
    }

    /// Check the fields required before an add-to-cart is attempted.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid field.
    pub fn validate(&self) -> Result<(), InvalidLineItem> {
        if self.product_id.is_blank() {
            return Err(InvalidLineItem::MissingProductId);
        }
        if self.name.trim().is_empty() {
            return Err(InvalidLineItem::MissingName(self.product_id.clone()));
        }
        if self.quantity == 0 {
            return Err(InvalidLineItem::ZeroQuantity(self.product_id.clone()));
        }
        Ok(())
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price * self.quantity
    }
}

impl Keyed for CartLineItem {
    fn product_id(&self) -> &ProductId {
        &self.product_id
    }
}

/// Outcome of an absolute quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line item now has the requested quantity.
    Updated(u32),
    /// The requested quantity was below 1, so the line item was removed.
    Removed,
    /// No line item exists for the product; nothing changed.
    Missing,
}

/// Add an item, incrementing the quantity if the product is already present.
///
/// The existing line keeps its original price snapshot and display fields.
pub fn add(items: &mut Vec<CartLineItem>, item: CartLineItem) {
    match items.iter_mut().find(|existing| existing.product_id == item.product_id) {
        Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
        None => items.push(item),
    }
}

/// Set a line item's quantity. Anything below 1 removes the line item.
pub fn set_quantity(items: &mut Vec<CartLineItem>, product_id: &ProductId, quantity: i64) -> QuantityChange {
    let Some(idx) = position_of(items, product_id) else {
        return QuantityChange::Missing;
    };

    if quantity < 1 {
        items.remove(idx);
        return QuantityChange::Removed;
    }

    let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
    if let Some(line) = items.get_mut(idx) {
        line.quantity = quantity;
    }
    QuantityChange::Updated(quantity)
}

/// Remove a line item. Returns whether anything was removed.
pub fn remove(items: &mut Vec<CartLineItem>, product_id: &ProductId) -> bool {
    position_of(items, product_id).is_some_and(|idx| {
        items.remove(idx);
        true
    })
}

/// Merge a guest cart into a server cart.
///
/// Server line items keep their order and gain the guest quantity on
/// collision; guest-only items are appended in guest order.
#[must_use]
pub fn merge(server: &[CartLineItem], guest: &[CartLineItem]) -> Vec<CartLineItem> {
    let mut merged = server.to_vec();
    for item in guest {
        add(&mut merged, item.clone());
    }
    merged
}

/// Build a cart from records that may repeat a product or carry a zero
/// quantity, as read from a cookie or an upstream list.
///
/// Repeated products are folded into their first line with [`add`];
/// zero-quantity records are dropped.
#[must_use]
pub fn collapse(records: impl IntoIterator<Item = CartLineItem>) -> Vec<CartLineItem> {
    let mut items = Vec::new();
    for record in records.into_iter().filter(|r| r.quantity >= 1) {
        add(&mut items, record);
    }
    items
}

/// Sum of line totals.
#[must_use]
pub fn subtotal(items: &[CartLineItem]) -> Price {
    items.iter().map(CartLineItem::line_total).sum()
}

/// Total number of units across all line items.
#[must_use]
pub fn item_count(items: &[CartLineItem]) -> u32 {
    items.iter().fold(0, |acc, item| acc.saturating_add(item.quantity))
}

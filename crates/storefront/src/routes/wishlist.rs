//! Wishlist route handlers.

use axum::Json;
use exaltride_core::{ProductId, WishlistItem};
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::Device;

/// Wishlist display data.
#[derive(Debug, Clone, Serialize)]
pub struct WishlistView {
    pub items: Vec<WishlistItem>,
    pub count: usize,
}

impl WishlistView {
    fn new(items: Vec<WishlistItem>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Result of a toggle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleView {
    pub product_id: ProductId,
    pub in_wishlist: bool,
    pub wishlist: WishlistView,
}

/// Show the wishlist.
///
/// # Route
///
/// `GET /wishlist`
pub async fn show(device: Device) -> Json<WishlistView> {
    Json(WishlistView::new(device.storefront.wishlist().items()))
}

/// Add a product to the wishlist, or remove it if already present.
///
/// The body carries at least `productId`; display fields are optional and
/// are filled from earlier sightings when missing.
///
/// # Route
///
/// `POST /wishlist/toggle`
#[instrument(skip_all, fields(product_id = %item.product_id))]
pub async fn toggle(device: Device, Json(item): Json<WishlistItem>) -> Result<Json<ToggleView>> {
    let product_id = item.product_id.clone();
    let wishlist = device.storefront.wishlist();
    let in_wishlist = wishlist.toggle(item)?;

    Ok(Json(ToggleView {
        product_id,
        in_wishlist,
        wishlist: WishlistView::new(wishlist.items()),
    }))
}

//! Cart route handlers.
//!
//! Every mutation answers with the updated cart. While the device is a guest
//! the response also refreshes the `cart` cookie, which seeds the device's
//! guest store if the server forgets it.

use axum::{
    Json,
    extract::Path,
    http::{HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use exaltride_core::{CartLineItem, Price, ProductId};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::guest::{CART_COOKIE_MAX_AGE_DAYS, CartCookie};
use crate::middleware::Device;
use crate::session::{AuthState, Storefront};

/// Cart line display data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub quantity: u32,
    pub price: Price,
    pub line_price: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl From<CartLineItem> for CartItemView {
    fn from(item: CartLineItem) -> Self {
        Self {
            line_price: item.line_total(),
            product_id: item.product_id,
            name: item.name,
            image: item.image,
            quantity: item.quantity,
            price: item.price,
            slug: item.slug,
            category_id: item.category_id,
        }
    }
}

/// Cart display data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: Price,
    pub subtotal_display: String,
    pub item_count: u32,
}

impl CartView {
    fn of(storefront: &Storefront) -> Self {
        let cart = storefront.cart();
        let subtotal = cart.subtotal();
        Self {
            items: cart.items().into_iter().map(CartItemView::from).collect(),
            subtotal,
            subtotal_display: subtotal.display(),
            item_count: cart.item_count(),
        }
    }
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartInput {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}

impl From<AddToCartInput> for CartLineItem {
    fn from(input: AddToCartInput) -> Self {
        Self {
            product_id: input.product_id,
            name: input.name,
            price: input.price,
            image: input.image,
            quantity: input.quantity,
            category_id: input.category_id,
            slug: input.slug,
        }
    }
}

/// Quantity update request body.
///
/// Signed so that zero and negative values can ask for removal.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityInput {
    pub quantity: i64,
}

/// Show the cart.
///
/// # Route
///
/// `GET /cart`
pub async fn show(device: Device) -> Json<CartView> {
    Json(CartView::of(&device.storefront))
}

/// Add a product to the cart.
///
/// # Route
///
/// `POST /cart/items`
#[instrument(skip_all, fields(product_id = %input.product_id))]
pub async fn add(device: Device, Json(input): Json<AddToCartInput>) -> Result<Response> {
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", input.product_id.as_str())]));
    device.storefront.cart().add(input.into())?;
    Ok(cart_response(&device.storefront))
}

/// Set a product's quantity.
///
/// # Route
///
/// `PUT /cart/items/{id}`
#[instrument(skip_all, fields(product_id = %id))]
pub async fn update(
    device: Device,
    Path(id): Path<String>,
    Json(input): Json<UpdateQuantityInput>,
) -> Response {
    device
        .storefront
        .cart()
        .update_quantity(&ProductId::new(id), input.quantity);
    cart_response(&device.storefront)
}

/// Remove a product from the cart.
///
/// # Route
///
/// `DELETE /cart/items/{id}`
#[instrument(skip_all, fields(product_id = %id))]
pub async fn remove(device: Device, Path(id): Path<String>) -> Response {
    device.storefront.cart().remove(&ProductId::new(id));
    cart_response(&device.storefront)
}

/// Empty the cart.
///
/// # Route
///
/// `DELETE /cart`
#[instrument(skip_all)]
pub async fn clear(device: Device) -> Response {
    device.storefront.cart().clear();
    cart_response(&device.storefront)
}

fn cart_response(storefront: &Storefront) -> Response {
    let mut response = Json(CartView::of(storefront)).into_response();

    if storefront.auth_state() == AuthState::Guest {
        let cookie = cart_cookie(storefront.guest_cart_cookie());
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    response
}

/// The `cart` cookie for a stored value; an expired cookie when there is none.
fn cart_cookie(value: Option<String>) -> Cookie<'static> {
    let max_age = if value.is_some() {
        Duration::days(CART_COOKIE_MAX_AGE_DAYS)
    } else {
        Duration::ZERO
    };

    Cookie::build((CartCookie::NAME, value.unwrap_or_default()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

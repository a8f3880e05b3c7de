//! HTTP route handlers for storefront.
//!
//! JSON endpoints over the requesting device's [`Storefront`](crate::session::Storefront).
//!
//! # Route Structure
//!
//! ```text
//! GET    /health               - Health check
//!
//! # Cart
//! GET    /cart                 - Cart view
//! POST   /cart/items           - Add to cart
//! PUT    /cart/items/{id}      - Set quantity (below 1 removes)
//! DELETE /cart/items/{id}      - Remove item
//! DELETE /cart                 - Empty the cart
//!
//! # Wishlist
//! GET    /wishlist             - Wishlist view
//! POST   /wishlist/toggle      - Toggle membership
//!
//! # Car
//! GET    /car                  - Selected car
//! PUT    /car                  - Select a car
//! DELETE /car                  - Forget the car
//! POST   /car/compatibility    - Annotate a product's fitments
//!
//! # Notices
//! GET    /notices              - Drain sync failure notices
//!
//! # Auth
//! GET    /auth/login           - Redirect to the identity provider
//! GET    /auth/callback        - Exchange code, log in and merge
//! POST   /auth/logout          - Log out
//! GET    /auth/session         - Login state
//! POST   /auth/refresh         - Refresh the access token
//! ```

pub mod auth;
pub mod car;
pub mod cart;
pub mod notices;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route("/items/{id}", put(cart::update).delete(cart::remove))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show))
        .route("/toggle", post(wishlist::toggle))
}

/// Create the car routes router.
pub fn car_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(car::show).put(car::select).delete(car::clear))
        .route("/compatibility", post(car::compatibility))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::status))
        .route("/refresh", post(auth::refresh))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/cart", cart_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/car", car_routes())
        .route("/notices", get(notices::drain))
        .nest("/auth", auth_routes())
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

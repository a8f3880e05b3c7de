//! ExaltRide storefront library.
//!
//! Per-device cart, wishlist and selected-car state with optimistic updates,
//! background sync to the commerce API and the guest-to-account merge on
//! login, plus the HTTP surface serving it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod car;
pub mod commerce;
pub mod config;
pub mod error;
pub mod guest;
pub mod identity;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod sync;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the storefront router with its middleware stack.
///
/// Sentry layers are added by the binary on top of this.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    Router::new()
        .merge(routes::routes())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}

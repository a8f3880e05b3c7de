//! Device extractor.
//!
//! Resolves the request's session to its device and that device's
//! [`Storefront`] container.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::COOKIE, request::Parts},
};
use tower_sessions::Session;
use tower_sessions::cookie::Cookie;

use super::session::device_id;
use crate::error::AppError;
use crate::guest::CartCookie;
use crate::session::Storefront;
use crate::state::AppState;

/// The requesting device and its storefront state.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(device: Device) -> Json<Vec<CartLineItem>> {
///     Json(device.storefront.cart().items())
/// }
/// ```
pub struct Device {
    pub id: String,
    pub storefront: Arc<Storefront>,
}

impl FromRequestParts<AppState> for Device {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Set by SessionManagerLayer
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer not installed".to_string()))?;

        let id = device_id(&session)
            .await
            .map_err(|e| AppError::Internal(format!("session store: {e}")))?;

        sentry::configure_scope(|scope| {
            scope.set_tag("device_id", &id);
        });

        let storefront = state
            .storefront_for(&id, cart_cookie(&parts.headers).as_deref())
            .await;

        Ok(Self { id, storefront })
    }
}

/// Raw value of the `cart` cookie, if the request carries one.
fn cart_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == CartCookie::NAME)
        .map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_cart_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("exaltride_session=abc; cart=%5B%5D; theme=dark"),
        );
        assert_eq!(cart_cookie(&headers).as_deref(), Some("%5B%5D"));
    }

    #[test]
    fn test_missing_cart_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(cart_cookie(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("cartx=1"));
        assert_eq!(cart_cookie(&headers), None);
    }
}

//! Commerce API client.
//!
//! # Architecture
//!
//! - Plain JSON-over-HTTP calls, one request per operation
//! - The commerce backend is the source of truth for authenticated sessions
//! - Response shapes are normalized in [`records`] and nowhere else
//!
//! # Authentication
//!
//! Every call carries a [`RequestAuth`]: the shopper's bearer token, or the
//! guest identifier sent as `X-Session-Id` when anonymous sessions are enabled.
//! Listing without any credential returns an empty collection.
//!
//! # Example
//!
//! ```rust,ignore
//! use exaltride_storefront::commerce::{CartApi, CommerceClient, RequestAuth};
//!
//! let client = CommerceClient::new(&config.commerce)?;
//! let auth = RequestAuth::bearer(token);
//!
//! client.add(&auth, &ProductId::new("p1"), 1).await?;
//! let items = CartApi::list(&client, Some(&auth)).await?;
//! ```

mod cart;
pub mod records;
mod wishlist;

use std::sync::Arc;

use async_trait::async_trait;
use exaltride_core::{CartLineItem, GuestId, ProductId, WishlistItem};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::config::CommerceConfig;

/// Header carrying the guest identifier for anonymous sessions.
pub const GUEST_SESSION_HEADER: &str = "X-Session-Id";

/// Errors that can occur when interacting with the commerce API.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// HTTP request failed (connection refused, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body matched no accepted shape.
    #[error("Unexpected response: {0}")]
    Schema(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// Credential attached to a commerce API request.
#[derive(Clone)]
pub enum RequestAuth {
    /// Logged-in shopper.
    Bearer(SecretString),
    /// Anonymous guest session.
    GuestSession(GuestId),
}

impl RequestAuth {
    /// Bearer credential from a raw access token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(SecretString::from(token.into()))
    }

    /// Whether this is a logged-in credential.
    #[must_use]
    pub const fn is_bearer(&self) -> bool {
        matches!(self, Self::Bearer(_))
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token.expose_secret()),
            Self::GuestSession(id) => request.header(GUEST_SESSION_HEADER, id.to_string()),
        }
    }
}

impl std::fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Self::GuestSession(id) => f.debug_tuple("GuestSession").field(id).finish(),
        }
    }
}

/// Remote cart operations.
///
/// `add` is additive, `set_quantity` is absolute, `remove` and `clear` are
/// idempotent.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// Fetch the cart. Without a credential, returns an empty cart.
    async fn list(&self, auth: Option<&RequestAuth>) -> Result<Vec<CartLineItem>, CommerceError>;

    /// Add `quantity` units of a product.
    async fn add(&self, auth: &RequestAuth, product_id: &ProductId, quantity: u32) -> Result<(), CommerceError>;

    /// Set a product's quantity.
    async fn set_quantity(
        &self,
        auth: &RequestAuth,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CommerceError>;

    /// Remove a product.
    async fn remove(&self, auth: &RequestAuth, product_id: &ProductId) -> Result<(), CommerceError>;

    /// Empty the cart.
    async fn clear(&self, auth: &RequestAuth) -> Result<(), CommerceError>;
}

/// Remote wishlist operations.
#[async_trait]
pub trait WishlistApi: Send + Sync {
    /// Fetch the wishlist. Without a credential, returns an empty wishlist.
    async fn list(&self, auth: Option<&RequestAuth>) -> Result<Vec<WishlistItem>, CommerceError>;

    /// Flip membership of a product. Returns the membership the server
    /// reports, if it reports one.
    async fn toggle(&self, auth: &RequestAuth, product_id: &ProductId) -> Result<Option<bool>, CommerceError>;

    /// Fold the anonymous session's wishlist into the authenticated one.
    async fn merge(&self, auth: &RequestAuth, guest_id: &GuestId) -> Result<(), CommerceError>;
}

/// Build an endpoint URL under `base` from path segments.
pub(crate) fn endpoint<I>(base: &Url, segments: I) -> Url
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Client for the commerce API.
#[derive(Clone)]
pub struct CommerceClient {
    inner: Arc<CommerceClientInner>,
}

struct CommerceClientInner {
    client: reqwest::Client,
    api_url: Url,
}

impl CommerceClient {
    /// Create a new commerce API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CommerceConfig) -> Result<Self, CommerceError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            inner: Arc::new(CommerceClientInner {
                client,
                api_url: config.api_url.clone(),
            }),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        endpoint(&self.inner.api_url, segments)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, CommerceError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CommerceError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Commerce API returned non-success status"
            );
            return Err(CommerceError::Api {
                status: status.as_u16(),
                message: records::error_message(&body),
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let base = Url::parse("https://api.exaltride.com/v1/").unwrap();
        assert_eq!(
            endpoint(&base, ["cart", "items", "p 1"]).as_str(),
            "https://api.exaltride.com/v1/cart/items/p%201"
        );

        let base = Url::parse("https://api.exaltride.com/v1").unwrap();
        assert_eq!(endpoint(&base, ["cart"]).as_str(), "https://api.exaltride.com/v1/cart");
    }

    #[test]
    fn test_request_auth_debug_redacts() {
        let auth = RequestAuth::bearer("secret-token");
        assert_eq!(format!("{auth:?}"), "Bearer([REDACTED])");
        assert!(auth.is_bearer());
        assert!(!RequestAuth::GuestSession(GuestId::generate()).is_bearer());
    }

    #[test]
    fn test_request_auth_headers() {
        let client = reqwest::Client::new();

        let request = RequestAuth::bearer("tok")
            .apply(client.get("https://api.exaltride.com/v1/cart"))
            .build()
            .unwrap();
        assert_eq!(request.headers().get("authorization").unwrap(), "Bearer tok");
        assert!(request.headers().get(GUEST_SESSION_HEADER).is_none());

        let guest = GuestId::generate();
        let request = RequestAuth::GuestSession(guest)
            .apply(client.get("https://api.exaltride.com/v1/cart"))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("x-session-id").unwrap().to_str().unwrap(),
            guest.to_string()
        );
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = CommerceError::Api {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "API error (503): maintenance");
        assert_eq!(
            CommerceError::RateLimited(30).to_string(),
            "Rate limited, retry after 30 seconds"
        );
    }
}

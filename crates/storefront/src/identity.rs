//! Identity provider client.
//!
//! The identity provider is an external OAuth 2.0 / `OpenID` Connect service;
//! this module only consumes its authorize, token, userinfo and logout
//! endpoints.
//!
//! # OAuth Flow
//!
//! 1. Generate authorization URL with `authorization_url()`
//! 2. Redirect the shopper to the provider's login page
//! 3. Provider redirects back with an authorization code
//! 4. Exchange the code for tokens with `exchange_code()`
//! 5. Hand the resulting [`TokenSet`] to `Storefront::login`, which merges the
//!    guest cart and wishlist into the account

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::commerce::endpoint;
use crate::config::IdentityConfig;

/// Errors that can occur when talking to the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("OAuth error: {0}")]
    OAuth(String),
}

/// Profile of the logged-in shopper, as stored under the `user` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject identifier.
    #[serde(alias = "sub")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Tokens of an authenticated session.
///
/// Implements `Debug` manually to redact tokens.
#[derive(Clone)]
pub struct TokenSet {
    /// Bearer token for commerce API calls.
    pub access_token: SecretString,
    /// `OpenID` Connect ID token (used as the logout hint).
    pub id_token: Option<String>,
    /// Refresh token.
    pub refresh_token: Option<SecretString>,
    /// Profile of the logged-in shopper.
    pub user: Option<UserProfile>,
}

impl TokenSet {
    /// Create a token set with only an access token.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            id_token: None,
            refresh_token: None,
            user: None,
        }
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

/// Raw token response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

/// Client for the identity provider.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    base_url: Url,
    client_id: String,
    client_secret: SecretString,
}

impl IdentityClient {
    /// Create a new identity provider client.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            inner: Arc::new(IdentityClientInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            }),
        }
    }

    /// Generate the authorization URL for login.
    ///
    /// # Arguments
    ///
    /// * `redirect_uri` - The callback URL to redirect to after authentication
    /// * `state` - A random string stored in the session to prevent CSRF attacks
    /// * `nonce` - A random string for `OpenID` Connect replay protection
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, state: &str, nonce: &str) -> String {
        let mut url = endpoint(&self.inner.base_url, ["oauth", "authorize"]);
        url.query_pairs_mut()
            .append_pair("client_id", &self.inner.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "openid email profile offline_access")
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        url.into()
    }

    /// Generate the logout URL.
    #[must_use]
    pub fn logout_url(&self, id_token: &str, post_logout_redirect_uri: &str) -> String {
        let mut url = endpoint(&self.inner.base_url, ["oauth", "logout"]);
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        url.into()
    }

    /// Exchange an authorization code for tokens, then fetch the profile.
    ///
    /// A failed profile fetch is logged and leaves `user` empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, IdentityError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let mut tokens = self.request_tokens(&params).await?;

        match self.fetch_user(&tokens.access_token).await {
            Ok(user) => tokens.user = Some(user),
            Err(e) => tracing::warn!(error = %e, "Failed to fetch user profile after login"),
        }

        Ok(tokens)
    }

    /// Refresh an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenSet, IdentityError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
        ];
        self.request_tokens(&params).await
    }

    /// Fetch the profile of the token's owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider rejects the token.
    pub async fn fetch_user(&self, access_token: &SecretString) -> Result<UserProfile, IdentityError> {
        let url = endpoint(&self.inner.base_url, ["oauth", "userinfo"]);
        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::OAuth(format!("userinfo failed ({status}): {text}")));
        }

        Ok(response.json().await?)
    }

    async fn request_tokens(&self, params: &[(&str, &str)]) -> Result<TokenSet, IdentityError> {
        let url = endpoint(&self.inner.base_url, ["oauth", "token"]);
        let response = self.inner.client.post(url).form(params).send().await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::OAuth(format!("Token request failed: {text}")));
        }

        let token_response: TokenResponse = response.json().await?;

        Ok(TokenSet {
            access_token: SecretString::from(token_response.access_token),
            id_token: token_response.id_token,
            refresh_token: token_response.refresh_token.map(SecretString::from),
            user: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> IdentityClient {
        IdentityClient::new(&IdentityConfig {
            base_url: Url::parse("https://auth.exaltride.com/").unwrap(),
            client_id: "storefront".to_string(),
            client_secret: SecretString::from("k8$Qz!v2Lp#9WmXr"),
        })
    }

    #[test]
    fn test_authorization_url() {
        let url = Url::parse(&client().authorization_url("https://shop.exaltride.com/auth/callback", "st", "no")).unwrap();
        assert_eq!(url.path(), "/oauth/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".to_string(), "storefront".to_string())));
        assert!(pairs.contains(&("state".to_string(), "st".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://shop.exaltride.com/auth/callback".to_string()
        )));
    }

    #[test]
    fn test_logout_url() {
        let url = Url::parse(&client().logout_url("idt", "https://shop.exaltride.com/")).unwrap();
        assert_eq!(url.path(), "/oauth/logout");
        assert!(url.query().unwrap().contains("id_token_hint=idt"));
    }

    #[test]
    fn test_token_set_debug_redacts() {
        let mut tokens = TokenSet::bearer("very-secret-access");
        tokens.id_token = Some("very-secret-id".to_string());
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_user_profile_accepts_sub() {
        let user: UserProfile = serde_json::from_str(r#"{"sub":"u1","email":"a@b.in"}"#).unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email.as_deref(), Some("a@b.in"));
    }
}

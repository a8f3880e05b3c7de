//! Identity provider login route handlers.
//!
//! Handles the OAuth flow and the guest-to-account transition:
//! - Login: Redirects to the identity provider's authorization page
//! - Callback: Exchanges the code for tokens and merges the guest cart and
//!   wishlist into the account
//! - Logout: Ends the session and redirects to the provider's logout page

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use exaltride_core::GuestId;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::identity::{TokenSet, UserProfile};
use crate::middleware::{Device, session_keys};
use crate::session::{AuthState, SessionError};
use crate::state::AppState;

/// Query parameters from the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// State parameter for CSRF protection.
    pub state: Option<String>,
    /// Error code if authorization failed.
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

/// Login state of the device.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<GuestId>,
}

/// Generate a cryptographically secure random string.
fn generate_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn redirect_uri(state: &AppState) -> String {
    format!("{}/auth/callback", state.config().base_url)
}

/// Initiate login.
///
/// Generates state and nonce parameters, stores them in the session,
/// and redirects to the identity provider's authorization page.
///
/// # Route
///
/// `GET /auth/login`
pub async fn login(State(state): State<AppState>, session: Session) -> Response {
    let oauth_state = generate_random_string(32);
    let nonce = generate_random_string(32);

    if let Err(e) = session.insert(session_keys::OAUTH_STATE, &oauth_state).await {
        tracing::error!(error = %e, "Failed to store OAuth state in session");
        return Redirect::to("/?auth_error=session").into_response();
    }

    if let Err(e) = session.insert(session_keys::OAUTH_NONCE, &nonce).await {
        tracing::error!(error = %e, "Failed to store OAuth nonce in session");
        return Redirect::to("/?auth_error=session").into_response();
    }

    let auth_url = state
        .identity()
        .authorization_url(&redirect_uri(&state), &oauth_state, &nonce);

    Redirect::to(&auth_url).into_response()
}

/// Handle the OAuth callback.
///
/// Validates the state parameter, exchanges the authorization code for tokens
/// and logs the device in, merging its guest collections into the account.
///
/// # Route
///
/// `GET /auth/callback`
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    device: Device,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!(%error, %description, "Identity provider denied login");
        return Redirect::to("/?auth_error=denied").into_response();
    }

    let Some(code) = query.code else {
        tracing::warn!("OAuth callback missing code");
        return Redirect::to("/?auth_error=missing_code").into_response();
    };

    let Some(returned_state) = query.state else {
        tracing::warn!("OAuth callback missing state");
        return Redirect::to("/?auth_error=missing_state").into_response();
    };

    let stored_state: Option<String> = session.get(session_keys::OAUTH_STATE).await.ok().flatten();

    if stored_state.as_ref() != Some(&returned_state) {
        tracing::warn!("OAuth state mismatch");
        return Redirect::to("/?auth_error=invalid_state").into_response();
    }

    // One-time use
    let _ = session.remove::<String>(session_keys::OAUTH_STATE).await;
    let _ = session.remove::<String>(session_keys::OAUTH_NONCE).await;

    let tokens = match state.identity().exchange_code(&code, &redirect_uri(&state)).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(error = %e, "Failed to exchange OAuth code");
            return Redirect::to("/?auth_error=token_exchange").into_response();
        }
    };

    let user = tokens.user.clone();
    match device.storefront.login(tokens).await {
        Ok(report) => {
            if let Some(user) = user {
                set_sentry_user(&user.id, user.email.as_deref());
            }
            tracing::info!(
                cart_lines = report.cart_lines,
                wishlist_items = report.wishlist_items,
                remote_synced = report.remote_synced,
                "Device logged in"
            );
            Redirect::to("/").into_response()
        }
        Err(SessionError::AlreadyAuthenticated) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Login failed");
            Redirect::to("/?auth_error=login").into_response()
        }
    }
}

/// Log out.
///
/// Ends the device's session and, if the provider issued an ID token,
/// redirects to the provider's logout endpoint.
///
/// # Route
///
/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>, device: Device) -> Response {
    let tokens = match device.storefront.logout() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::debug!(error = %e, "Logout without a session");
            None
        }
    };
    clear_sentry_user();

    if let Some(id_token) = tokens.and_then(|t| t.id_token) {
        let post_logout_uri = format!("{}/", state.config().base_url);
        let logout_url = state.identity().logout_url(&id_token, &post_logout_uri);
        return Redirect::to(&logout_url).into_response();
    }

    Redirect::to("/").into_response()
}

/// Show the device's login state.
///
/// # Route
///
/// `GET /auth/session`
pub async fn status(device: Device) -> Json<SessionView> {
    let storefront = &device.storefront;
    Json(SessionView {
        state: storefront.auth_state(),
        user: storefront.user(),
        guest_id: storefront.guest_id(),
    })
}

/// Refresh the session's access token.
///
/// Fields the provider omits from the refresh response are carried over.
///
/// # Route
///
/// `POST /auth/refresh`
pub async fn refresh(State(state): State<AppState>, device: Device) -> Result<Json<SessionView>> {
    let current = device
        .storefront
        .tokens()
        .ok_or_else(|| AppError::Unauthorized("not logged in".to_string()))?;
    let refresh_token = current
        .refresh_token
        .clone()
        .ok_or_else(|| AppError::BadRequest("session has no refresh token".to_string()))?;

    let fresh = state.identity().refresh(&refresh_token).await?;
    device.storefront.update_tokens(carry_over(current, fresh))?;

    Ok(status(device).await)
}

fn carry_over(current: TokenSet, fresh: TokenSet) -> TokenSet {
    TokenSet {
        access_token: fresh.access_token,
        id_token: fresh.id_token.or(current.id_token),
        refresh_token: fresh.refresh_token.or(current.refresh_token),
        user: fresh.user.or(current.user),
    }
}

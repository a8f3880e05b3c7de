//! Session middleware configuration.
//!
//! Sessions only carry the device identifier and the OAuth round-trip values;
//! device state itself lives in [`AppState`](crate::state::AppState).

use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use uuid::Uuid;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "exaltride_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Keys stored in the session.
pub mod session_keys {
    /// Identifier of the device's storefront container.
    pub const DEVICE_ID: &str = "device_id";

    /// OAuth `state` awaiting the callback.
    pub const OAUTH_STATE: &str = "oauth_state";

    /// `OpenID` nonce awaiting the callback.
    pub const OAUTH_NONCE: &str = "oauth_nonce";
}

/// Create the session layer with an in-memory store.
#[must_use]
pub fn create_session_layer(config: &StorefrontConfig) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// The session's device identifier, minting one on first use.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn device_id(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(id) = session.get::<String>(session_keys::DEVICE_ID).await? {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    session.insert(session_keys::DEVICE_ID, &id).await?;
    tracing::debug!(device_id = %id, "New device");
    Ok(id)
}

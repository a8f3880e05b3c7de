//! Persisted login session (`authToken`, `idToken`, `refreshToken`, `user`).

use secrecy::{ExposeSecret, SecretString};

use super::{SharedStorage, StorageError, keys, read_json, write_json};
use crate::identity::{TokenSet, UserProfile};

/// Login session persisted on the device.
#[derive(Clone)]
pub struct StoredSession {
    storage: SharedStorage,
}

impl StoredSession {
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Load the stored session. Without an access token there is no session.
    #[must_use]
    pub fn load(&self) -> Option<TokenSet> {
        let access_token = self.storage.get(keys::AUTH_TOKEN).filter(|t| !t.is_empty())?;
        Some(TokenSet {
            access_token: SecretString::from(access_token),
            id_token: self.storage.get(keys::ID_TOKEN),
            refresh_token: self.storage.get(keys::REFRESH_TOKEN).map(SecretString::from),
            user: read_json::<UserProfile>(self.storage.as_ref(), keys::USER),
        })
    }

    /// Persist a session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium refuses a write.
    pub fn save(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        self.clear();
        self.storage
            .set(keys::AUTH_TOKEN, tokens.access_token.expose_secret().to_string(), None)?;
        if let Some(id_token) = &tokens.id_token {
            self.storage.set(keys::ID_TOKEN, id_token.clone(), None)?;
        }
        if let Some(refresh_token) = &tokens.refresh_token {
            self.storage
                .set(keys::REFRESH_TOKEN, refresh_token.expose_secret().to_string(), None)?;
        }
        if let Some(user) = &tokens.user {
            write_json(self.storage.as_ref(), keys::USER, user)?;
        }
        Ok(())
    }

    /// Remove every session key.
    pub fn clear(&self) {
        for key in [keys::AUTH_TOKEN, keys::ID_TOKEN, keys::REFRESH_TOKEN, keys::USER] {
            self.storage.remove(key);
        }
    }
}

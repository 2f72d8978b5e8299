use std::sync::Arc;

use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use log::info;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{user_key, LocalStorage, LocalStorageExt, StorageError, CURRENT_USER_KEY};

/// A guest identity known to this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub username: String,
    /// Argon2 hash of the passcode
    pub passcode: String,
    #[serde(default)]
    pub favorite: Option<String>,
}

/// The identity the device is currently using, and the session it used it in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub username: String,
    pub passcode: String,
    #[serde(default)]
    pub favorite: Option<String>,
    pub sid: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub passcode: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Need username + passcode")]
    MissingCredentials,
    #[error("No such user")]
    UnknownUser,
    #[error("Wrong passcode")]
    WrongPasscode,
    #[error("HashError: {0}")]
    Hash(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The local identity store used for passcode logins.
/// Nothing here leaves the device.
pub struct Identity<S> {
    storage: Arc<S>,
    argon: Argon2<'static>,
}

impl<S> Identity<S>
where
    S: LocalStorage,
{
    pub fn new(storage: &Arc<S>) -> Self {
        Self {
            storage: storage.clone(),
            argon: Argon2::default(),
        }
    }

    /// Stores a user record, replacing one with the same username
    pub fn register(
        &self,
        credentials: Credentials,
        favorite: Option<String>,
    ) -> Result<LocalUser, IdentityError> {
        let credentials = normalize(credentials)?;

        let salt = SaltString::generate(&mut OsRng);
        let hashed_passcode = self
            .argon
            .hash_password(credentials.passcode.as_bytes(), &salt)
            .map_err(|e| IdentityError::Hash(e.to_string()))?
            .to_string();

        let user = LocalUser {
            username: credentials.username,
            passcode: hashed_passcode,
            favorite: favorite.filter(|f| !f.trim().is_empty()),
        };

        self.storage.set_json(&user_key(&user.username), &user)?;
        info!("Registered local user {}", user.username);

        Ok(user)
    }

    /// Checks credentials against the stored user record
    pub fn verify(&self, credentials: Credentials) -> Result<LocalUser, IdentityError> {
        let credentials = normalize(credentials)?;

        let user: LocalUser = self
            .storage
            .get_json(&user_key(&credentials.username))
            .ok_or(IdentityError::UnknownUser)?;

        let stored_passcode = PasswordHash::parse(&user.passcode, Encoding::default())
            .map_err(|e| IdentityError::Hash(e.to_string()))?;

        self.argon
            .verify_password(credentials.passcode.as_bytes(), &stored_passcode)
            .map_err(|_| IdentityError::WrongPasscode)?;

        Ok(user)
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.storage.get_json(CURRENT_USER_KEY)
    }

    pub fn set_current(&self, user: &LocalUser, sid: &str) -> Result<CurrentUser, IdentityError> {
        let current = CurrentUser {
            username: user.username.clone(),
            passcode: user.passcode.clone(),
            favorite: user.favorite.clone(),
            sid: sid.to_string(),
        };

        self.storage.set_json(CURRENT_USER_KEY, &current)?;
        Ok(current)
    }

    pub fn clear_current(&self) -> Result<(), IdentityError> {
        self.storage.remove(CURRENT_USER_KEY)?;
        Ok(())
    }
}

fn normalize(credentials: Credentials) -> Result<Credentials, IdentityError> {
    let username = credentials.username.trim().to_string();

    if username.is_empty() || credentials.passcode.is_empty() {
        return Err(IdentityError::MissingCredentials);
    }

    Ok(Credentials {
        username,
        passcode: credentials.passcode,
    })
}

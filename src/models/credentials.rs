// src/models/credentials.rs
//! Credentials submitted by a person registering a new identity.

use crate::error::ValidationError;
use serde::Deserialize;
use std::fmt;

/// Username and passphrase pair supplied by the registering user.
///
/// The username is usually an email address. The passphrase is never
/// persisted; it only feeds the lookup hash and the DID encryption key.
#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub passphrase: String,
    pub passphrase_confirmation: String,
}

impl Credentials {
    #[allow(dead_code)]
    pub fn new(
        username: impl Into<String>,
        passphrase: impl Into<String>,
        passphrase_confirmation: impl Into<String>,
    ) -> Self {
        Credentials {
            username: username.into(),
            passphrase: passphrase.into(),
            passphrase_confirmation: passphrase_confirmation.into(),
        }
    }

    /// Checks the credentials before any keys are generated or requests sent.
    ///
    /// # Errors
    /// - [`ValidationError::PassphraseMismatch`] if the confirmation differs
    /// - [`ValidationError::MissingUsername`] if the username is empty
    /// - [`ValidationError::MissingPassphrase`] if the passphrase is empty
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.passphrase != self.passphrase_confirmation {
            return Err(ValidationError::PassphraseMismatch);
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingUsername);
        }
        if self.passphrase.is_empty() {
            return Err(ValidationError::MissingPassphrase);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

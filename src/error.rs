// src/error.rs
//! Error taxonomy for the registration pipeline.
//!
//! Each stage of a registration attempt has its own error type so failures can
//! be logged and tested precisely. [`RegistrationError`] wraps them all and is
//! the only type that crosses the pipeline boundary. At the user-facing edge
//! every failure after validation collapses into one generic message, see
//! [`RegistrationError::user_message`].

use crate::services::registration::RegistrationStatus;
use thiserror::Error;

/// Message shown to the end user for any failure after validation.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Failed to register with the network. Try a different email address and passphrase";

/// Local credential checks that failed before any work was started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("The passphrases you entered do not match.")]
    PassphraseMismatch,

    #[error("You failed to provide an email address")]
    MissingUsername,

    #[error("You failed to provide a passphrase")]
    MissingPassphrase,
}

#[derive(Debug, Error)]
pub enum KeyGenerationError {
    #[error("unsupported RSA modulus size: {0} bits")]
    UnsupportedModulus(usize),

    #[error("RSA key generation failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("key generation worker did not complete: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("failed to encode public key as PEM: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("PBKDF2 iteration count must be non-zero")]
    InvalidIterations,

    #[error("system randomness unavailable")]
    Randomness,

    #[error("failed to seal DID payload")]
    Seal,

    /// Wrong passphrase or tampered ciphertext.
    #[error("failed to open encrypted DID payload")]
    Decrypt,

    #[error("unsupported cipher parameters: {0}")]
    UnsupportedCipher(String),

    #[error("malformed encrypted DID field: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("decrypted DID is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("encryption worker did not complete: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Failure publishing a record to the directory service.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to build directory HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to encode record for {endpoint}: {source}")]
    Encoding {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("POST {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("POST {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("POST {endpoint} returned {status}, expected 201 Created")]
    UnexpectedStatus { endpoint: String, status: u16 },
}

/// Everything that can end a registration attempt without success.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("key generation failed: {0}")]
    KeyGeneration(#[from] KeyGenerationError),

    #[error("DID encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("directory publication failed: {0}")]
    Publish(#[from] PublishError),

    #[error("no identity provider was configured for this registration")]
    MissingIdentityProvider,

    #[error("a registration attempt is already in progress")]
    AlreadyInProgress,

    #[error("registration received an unexpected event while {0:?}")]
    InvalidTransition(RegistrationStatus),
}

impl RegistrationError {
    /// The message that may be shown to the person registering.
    ///
    /// Validation failures are local and specific. Everything from key
    /// generation onward is reported with [`GENERIC_FAILURE_MESSAGE`] so the
    /// cause of a failed registration is never disclosed.
    pub fn user_message(&self) -> String {
        match self {
            RegistrationError::Validation(e) => e.to_string(),
            RegistrationError::MissingIdentityProvider | RegistrationError::AlreadyInProgress => {
                self.to_string()
            }
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Where the caller should be sent instead of running the pipeline.
    pub fn redirect_path(&self) -> Option<&'static str> {
        match self {
            RegistrationError::MissingIdentityProvider => Some("/register/idp-error"),
            _ => None,
        }
    }
}

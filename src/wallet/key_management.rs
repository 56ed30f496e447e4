// src/wallet/key_management.rs
//! Asymmetric key generation for new identities.
//!
//! Every registration attempt gets a fresh RSA keypair. The public half is
//! published in the DID document as an SPKI PEM block; the private half lives
//! only as long as the attempt and is zeroized on drop.
//!
//! RSA prime search is CPU bound, so [`RsaKeyGenerator`] runs it on the
//! blocking thread pool instead of the async executor.

use crate::error::KeyGenerationError;
use async_trait::async_trait;
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use tokio::task;

/// RSA modulus sizes accepted by [`RsaKeyGenerator`].
pub const SUPPORTED_MODULUS_BITS: [usize; 3] = [2048, 3072, 4096];

/// An RSA keypair owned by a single registration attempt.
pub struct Keypair {
    /// Never persisted and never logged
    private_key: RsaPrivateKey,
    /// Derived public key for the DID document
    public_key: RsaPublicKey,
    public_key_pem: String,
}

impl Keypair {
    /// Builds a keypair from a private key, deriving and PEM-encoding the
    /// public half.
    ///
    /// # Errors
    /// Returns [`KeyGenerationError::Encoding`] if the public key cannot be
    /// serialized as SPKI PEM.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, KeyGenerationError> {
        let public_key = RsaPublicKey::from(&private_key);
        let public_key_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyGenerationError::Encoding(e.to_string()))?;

        Ok(Keypair {
            private_key,
            public_key,
            public_key_pem,
        })
    }

    #[allow(dead_code)]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    #[allow(dead_code)]
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// PEM text, `-----BEGIN PUBLIC KEY-----` framed.
    #[allow(dead_code)]
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// Consumes the keypair, keeping only the public PEM.
    ///
    /// The private key is dropped (and zeroized) here.
    pub fn into_public_key_pem(self) -> String {
        self.public_key_pem
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("bits", &self.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Produces keypairs for registration attempts.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Generates a new keypair with a modulus of `bits` bits.
    async fn generate_keypair(&self, bits: usize) -> Result<Keypair, KeyGenerationError>;
}

/// Generates RSA keys from the operating system RNG on a blocking worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaKeyGenerator;

#[async_trait]
impl KeyGenerator for RsaKeyGenerator {
    async fn generate_keypair(&self, bits: usize) -> Result<Keypair, KeyGenerationError> {
        if !SUPPORTED_MODULUS_BITS.contains(&bits) {
            return Err(KeyGenerationError::UnsupportedModulus(bits));
        }

        let private_key = task::spawn_blocking(move || RsaPrivateKey::new(&mut OsRng, bits)).await??;
        Keypair::from_private_key(private_key)
    }
}

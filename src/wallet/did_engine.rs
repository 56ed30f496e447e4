// src/wallet/did_engine.rs
//! DID generation, lookup hashing and passphrase encryption.
//!
//! The [`DidEngine`] produces the three values a registration needs besides
//! the keypair:
//! - a fresh DID (`did:` followed by a random UUID)
//! - a deterministic lookup hash of the username and passphrase
//! - the DID encrypted under a PBKDF2-derived AES-256-GCM key
//!
//! # Lookup hash
//! SHA-256 over `len(username) as u64 big-endian || username || passphrase`,
//! rendered as lowercase hex. The length prefix keeps `("ab", "c")` and
//! `("a", "bc")` from colliding.

use crate::error::EncryptionError;
use crate::models::did::{Did, EncryptedDid, LookupHash};
use crate::utils::crypto::{derive_key, hash_data, random_bytes};
use crate::utils::serialization::{decode_base64, encode_base64};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::SystemRandom;
use std::num::NonZeroU32;
use uuid::Uuid;

pub const CIPHER_ALGORITHM: &str = "AES-256-GCM";
pub const KEY_HASH_METHOD: &str = "PBKDF2-SHA256";
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 32;

/// The DID work a registration attempt needs besides its keypair.
///
/// Calls are synchronous and may be CPU bound; callers run `encrypt` off the
/// async executor.
pub trait DidCipher: Send + Sync {
    fn generate_did(&self) -> Did;

    fn generate_lookup_hash(&self, username: &str, passphrase: &str) -> LookupHash;

    fn encrypt(&self, did: &Did, passphrase: &str) -> Result<EncryptedDid, EncryptionError>;
}

pub struct DidEngine {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl DidEngine {
    /// Creates an engine that stretches passphrases with `iterations` rounds
    /// of PBKDF2.
    ///
    /// # Errors
    /// Returns [`EncryptionError::InvalidIterations`] for a zero count.
    pub fn new(iterations: u32) -> Result<Self, EncryptionError> {
        let iterations = NonZeroU32::new(iterations).ok_or(EncryptionError::InvalidIterations)?;
        Ok(DidEngine {
            iterations,
            rng: SystemRandom::new(),
        })
    }

    /// Generates a fresh DID. Independent of any credentials.
    pub fn generate_did(&self) -> Did {
        Did::new(format!("did:{}", Uuid::new_v4()))
    }

    /// Computes the lookup hash for a username and passphrase.
    ///
    /// Pure: the same inputs always give the same hash, across calls and
    /// across processes, since the value is used as a remote lookup key.
    pub fn generate_lookup_hash(&self, username: &str, passphrase: &str) -> LookupHash {
        let mut input = Vec::with_capacity(8 + username.len() + passphrase.len());
        input.extend_from_slice(&(username.len() as u64).to_be_bytes());
        input.extend_from_slice(username.as_bytes());
        input.extend_from_slice(passphrase.as_bytes());

        LookupHash::from_hex(hex::encode(hash_data(&input)))
    }

    /// Encrypts a DID so that only the same passphrase can recover it.
    ///
    /// A new salt and nonce are drawn for every call, so encrypting the same
    /// DID twice gives different ciphertexts.
    pub fn encrypt(&self, did: &Did, passphrase: &str) -> Result<EncryptedDid, EncryptionError> {
        let salt: [u8; SALT_LEN] = random_bytes(&self.rng).ok_or(EncryptionError::Randomness)?;
        let iv: [u8; NONCE_LEN] = random_bytes(&self.rng).ok_or(EncryptionError::Randomness)?;

        let key = sealing_key(passphrase, &salt, self.iterations)?;
        let mut in_out = did.as_str().as_bytes().to_vec();
        key.seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Seal)?;

        Ok(EncryptedDid {
            cipher_algorithm: CIPHER_ALGORITHM.to_string(),
            pw_key_hash_method: KEY_HASH_METHOD.to_string(),
            num_iterations: self.iterations.get(),
            salt: encode_base64(&salt),
            iv: encode_base64(&iv),
            data: encode_base64(&in_out),
        })
    }

    /// Recovers a DID from its encrypted form.
    ///
    /// Uses the parameters recorded in `encrypted`, not the engine's own
    /// iteration count, so older records remain readable.
    ///
    /// # Errors
    /// - [`EncryptionError::UnsupportedCipher`] for unknown algorithm labels
    /// - [`EncryptionError::Decrypt`] for a wrong passphrase or tampered data
    #[allow(dead_code)]
    pub fn decrypt(&self, encrypted: &EncryptedDid, passphrase: &str) -> Result<Did, EncryptionError> {
        if encrypted.cipher_algorithm != CIPHER_ALGORITHM {
            return Err(EncryptionError::UnsupportedCipher(encrypted.cipher_algorithm.clone()));
        }
        if encrypted.pw_key_hash_method != KEY_HASH_METHOD {
            return Err(EncryptionError::UnsupportedCipher(encrypted.pw_key_hash_method.clone()));
        }
        let iterations =
            NonZeroU32::new(encrypted.num_iterations).ok_or(EncryptionError::InvalidIterations)?;

        let salt = decode_base64(&encrypted.salt)?;
        let iv = decode_base64(&encrypted.iv)?;
        let mut in_out = decode_base64(&encrypted.data)?;

        let nonce = Nonce::try_assume_unique_for_key(&iv)
            .map_err(|_| EncryptionError::UnsupportedCipher(format!("{}-byte iv", iv.len())))?;
        let key = sealing_key(passphrase, &salt, iterations)?;
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Decrypt)?;

        Ok(Did::new(String::from_utf8(plaintext.to_vec())?))
    }
}

impl DidCipher for DidEngine {
    fn generate_did(&self) -> Did {
        DidEngine::generate_did(self)
    }

    fn generate_lookup_hash(&self, username: &str, passphrase: &str) -> LookupHash {
        DidEngine::generate_lookup_hash(self, username, passphrase)
    }

    fn encrypt(&self, did: &Did, passphrase: &str) -> Result<EncryptedDid, EncryptionError> {
        DidEngine::encrypt(self, did, passphrase)
    }
}

fn sealing_key(passphrase: &str, salt: &[u8], iterations: NonZeroU32) -> Result<LessSafeKey, EncryptionError> {
    let key_bytes = derive_key(passphrase.as_bytes(), salt, iterations);
    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| EncryptionError::Seal)?;
    Ok(LessSafeKey::new(unbound))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DidEngine {
        DidEngine::new(1_000).unwrap()
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(matches!(DidEngine::new(0), Err(EncryptionError::InvalidIterations)));
    }

    #[test]
    fn test_generated_dids_are_distinct() {
        let engine = engine();
        let a = engine.generate_did();
        let b = engine.generate_did();

        assert!(a.as_str().starts_with("did:"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_lookup_hash_is_deterministic() {
        // A second engine stands in for a separate process
        let first = engine().generate_lookup_hash("alice@example.com", "correct horse");
        let second = engine().generate_lookup_hash("alice@example.com", "correct horse");

        assert_eq!(first, second);
        assert_eq!(first.as_hex().len(), 64);
    }

    #[test]
    fn test_lookup_hash_known_value() {
        // sha256(00 00 00 00 00 00 00 01 'a' 'b')
        let mut input = vec![0u8, 0, 0, 0, 0, 0, 0, 1];
        input.extend_from_slice(b"ab");
        let expected = hex::encode(hash_data(&input));

        assert_eq!(engine().generate_lookup_hash("a", "b").as_hex(), expected);
    }

    #[test]
    fn test_lookup_hash_separates_username_and_passphrase() {
        let engine = engine();
        assert_ne!(
            engine.generate_lookup_hash("ab", "c"),
            engine.generate_lookup_hash("a", "bc")
        );
    }

    #[test]
    fn test_encrypt_then_decrypt_recovers_did() {
        let engine = engine();
        let did = engine.generate_did();

        let encrypted = engine.encrypt(&did, "correct horse").unwrap();
        assert_eq!(encrypted.cipher_algorithm, CIPHER_ALGORITHM);
        assert_eq!(encrypted.num_iterations, 1_000);
        assert!(!encrypted.data.contains(did.as_str()));

        assert_eq!(engine.decrypt(&encrypted, "correct horse").unwrap(), did);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let engine = engine();
        let did = engine.generate_did();
        let encrypted = engine.encrypt(&did, "correct horse").unwrap();

        let result = engine.decrypt(&encrypted, "battery staple");
        assert!(matches!(result, Err(EncryptionError::Decrypt)));
    }

    #[test]
    fn test_fresh_salt_per_encryption() {
        let engine = engine();
        let did = engine.generate_did();

        let a = engine.encrypt(&did, "pass").unwrap();
        let b = engine.encrypt(&did, "pass").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_decrypt_uses_recorded_iterations() {
        let did = Did::new("did:legacy");
        let encrypted = DidEngine::new(10).unwrap().encrypt(&did, "pass").unwrap();

        assert_eq!(engine().decrypt(&encrypted, "pass").unwrap(), did);
    }

    #[test]
    fn test_unknown_cipher_rejected() {
        let engine = engine();
        let mut encrypted = engine.encrypt(&Did::new("did:x"), "pass").unwrap();
        encrypted.cipher_algorithm = "AES-128-CBC".into();

        assert!(matches!(
            engine.decrypt(&encrypted, "pass"),
            Err(EncryptionError::UnsupportedCipher(_))
        ));
    }
}

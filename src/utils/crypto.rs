// src/utils/crypto.rs
//! Cryptographic primitives backed by `ring`.
//!
//! Uses SHA-256 for hashing and PBKDF2-HMAC-SHA256 for passphrase key
//! derivation. Randomness comes from the operating system.

use ring::digest::{digest, SHA256};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

/// Computes a SHA-256 hash of the input data.
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Derives a 256-bit key from a passphrase with PBKDF2-HMAC-SHA256.
///
/// # Arguments
/// * `passphrase` - Secret to stretch
/// * `salt` - Per-ciphertext random salt
/// * `iterations` - Work factor
pub fn derive_key(passphrase: &[u8], salt: &[u8], iterations: NonZeroU32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, passphrase, &mut key);
    key
}

/// Fills a fixed-size array from the system CSPRNG.
///
/// Returns `None` only if the operating system refuses to provide entropy.
pub fn random_bytes<const N: usize>(rng: &SystemRandom) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    rng.fill(&mut out).ok()?;
    Some(out)
}

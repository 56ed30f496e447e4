// src/wallet/mod.rs
//! Key material and DID cryptography for new identities.

pub mod did_engine;
pub mod key_management;

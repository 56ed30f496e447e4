// src/models/did.rs
//! Decentralized Identifier (DID) data model.
//!
//! Defines the identifiers and the two records published to the directory
//! service during registration:
//! - [`MappingRecord`]: lookup hash to encrypted DID, used to recover the DID
//!   from a username and passphrase
//! - [`DidDocumentRecord`]: the public DID document carrying the user's public key
//!
//! Both records use the [identity v1 JSON-LD context](https://w3id.org/identity/v1).

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-LD context attached to every published record.
pub const IDENTITY_CONTEXT: &str = "https://w3id.org/identity/v1";

/// Prefix for mapping record identifiers.
pub const LOOKUP_URN_PREFIX: &str = "urn:sha256:";

/// A decentralized identifier.
///
/// Generated fresh for every registration attempt and never derived from
/// the user's credentials.
/// Example: "did:3c5ae2a4-2e6d-4bb0-9d3c-fbd1c1e8a1a7"
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    pub fn new(id: impl Into<String>) -> Self {
        Did(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic hex digest of a username and passphrase.
///
/// Used as the retrieval key for the encrypted DID. Not reversible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupHash(String);

impl LookupHash {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        LookupHash(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// The mapping record identifier, `urn:sha256:<hex>`.
    pub fn to_urn(&self) -> String {
        format!("{}{}", LOOKUP_URN_PREFIX, self.as_hex())
    }
}

/// A DID encrypted under a passphrase-derived key.
///
/// Carries everything except the passphrase needed to decrypt it again:
/// algorithm labels, KDF parameters, salt and nonce. Binary fields are
/// standard base64.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedDid {
    /// Example: "AES-256-GCM"
    pub cipher_algorithm: String,

    /// Example: "PBKDF2-SHA256"
    pub pw_key_hash_method: String,

    pub num_iterations: u32,

    pub salt: String,

    pub iv: String,

    /// Ciphertext with the authentication tag appended
    pub data: String,
}

/// Description of the identity provider the user is registering with.
///
/// Supplied out-of-band before registration starts. Only `url` is
/// interpreted; any other fields are passed through untouched into the
/// published DID document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IdentityProviderInfo {
    /// Where the user is handed off after a successful registration
    pub url: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IdentityProviderInfo {
    #[allow(dead_code)]
    pub fn new(url: impl Into<String>) -> Self {
        IdentityProviderInfo {
            url: url.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Record binding a lookup hash to an encrypted DID.
///
/// Published once per registration and immutable thereafter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MappingRecord {
    #[serde(rename = "@context")]
    pub context: String,

    /// Example: "urn:sha256:9f86d081884c7d65..."
    pub id: String,

    #[serde(rename = "cipherData")]
    pub cipher_data: EncryptedDid,
}

impl MappingRecord {
    pub fn new(lookup_hash: &LookupHash, cipher_data: EncryptedDid) -> Self {
        MappingRecord {
            context: IDENTITY_CONTEXT.to_string(),
            id: lookup_hash.to_urn(),
            cipher_data,
        }
    }
}

/// The public DID document.
///
/// Associates the DID with the user's PEM-encoded public key and the
/// identity provider it was registered through.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DidDocumentRecord {
    #[serde(rename = "@context")]
    pub context: String,

    pub id: Did,

    pub idp: IdentityProviderInfo,

    #[serde(rename = "publicKeys")]
    pub public_keys: Vec<String>,
}

impl DidDocumentRecord {
    pub fn new(did: Did, idp: IdentityProviderInfo, public_key_pem: String) -> Self {
        DidDocumentRecord {
            context: IDENTITY_CONTEXT.to_string(),
            id: did,
            idp,
            public_keys: vec![public_key_pem],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_cipher() -> EncryptedDid {
        EncryptedDid {
            cipher_algorithm: "AES-256-GCM".into(),
            pw_key_hash_method: "PBKDF2-SHA256".into(),
            num_iterations: 1000,
            salt: "c2FsdA==".into(),
            iv: "aXY=".into(),
            data: "ZGF0YQ==".into(),
        }
    }

    #[test]
    fn test_mapping_record_wire_format() {
        let hash = LookupHash::from_hex("abc123");
        let record = MappingRecord::new(&hash, sample_cipher());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["@context"], IDENTITY_CONTEXT);
        assert_eq!(value["id"], "urn:sha256:abc123");
        assert_eq!(value["cipherData"]["cipherAlgorithm"], "AES-256-GCM");
        assert_eq!(value["cipherData"]["numIterations"], 1000);
    }

    #[test]
    fn test_did_document_wire_format() {
        let mut idp = IdentityProviderInfo::new("https://idp.example.com/complete");
        idp.extra.insert("name".into(), json!("Example IdP"));

        let record = DidDocumentRecord::new(
            Did::new("did:1234"),
            idp,
            "-----BEGIN PUBLIC KEY-----\n...".into(),
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "@context": "https://w3id.org/identity/v1",
                "id": "did:1234",
                "idp": {
                    "url": "https://idp.example.com/complete",
                    "name": "Example IdP"
                },
                "publicKeys": ["-----BEGIN PUBLIC KEY-----\n..."]
            })
        );
    }

    #[test]
    fn test_idp_passes_unknown_fields_through() {
        let idp: IdentityProviderInfo = serde_json::from_value(json!({
            "url": "https://idp.example.com",
            "id": "did:idp",
            "label": "Test"
        }))
        .unwrap();

        assert_eq!(idp.url, "https://idp.example.com");
        assert_eq!(idp.extra.len(), 2);
        assert_eq!(serde_json::to_value(&idp).unwrap()["id"], "did:idp");
    }
}

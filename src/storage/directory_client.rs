// src/storage/directory_client.rs
//! Client for the remote identity directory.
//!
//! The directory stores the two records a registration produces:
//! - `POST /mappings/` with a [`MappingRecord`]
//! - `POST /dids/` with a [`DidDocumentRecord`]
//!
//! A publish succeeds only when the directory answers `201 Created`. Any other
//! status, a transport failure or a timeout is a [`PublishError`]. Retries,
//! idempotency keys and conflict handling are the directory's business; this
//! client sends each request exactly once.

use crate::error::PublishError;
use crate::models::did::{DidDocumentRecord, MappingRecord};
use crate::utils::serialization::serialize;
use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

pub const MAPPINGS_PATH: &str = "mappings/";
pub const DIDS_PATH: &str = "dids/";

/// Publishes registration records to the directory service.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Stores the lookup hash to encrypted DID mapping.
    async fn create_mapping(&self, record: &MappingRecord) -> Result<(), PublishError>;

    /// Stores the public DID document.
    async fn create_did_document(&self, record: &DidDocumentRecord) -> Result<(), PublishError>;
}

/// [`DirectoryClient`] speaking JSON over HTTP.
#[derive(Clone)]
pub struct HttpDirectoryClient {
    client: Client,
    /// Directory root, always ending in `/`
    base_url: String,
}

impl HttpDirectoryClient {
    /// Creates a client for the directory at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - Directory root, e.g. "https://directory.example.com"
    /// * `timeout` - Upper bound for each publish request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PublishError::Client)?;

        Ok(HttpDirectoryClient {
            client,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, record: &T) -> Result<(), PublishError> {
        let endpoint = self.endpoint(path);
        let body = serialize(record).map_err(|source| PublishError::Encoding {
            endpoint: endpoint.clone(),
            source,
        })?;
        debug!("POST {} ({} bytes)", endpoint, body.len());

        let response = self
            .client
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    PublishError::Timeout {
                        endpoint: endpoint.clone(),
                    }
                } else {
                    PublishError::Transport {
                        endpoint: endpoint.clone(),
                        source,
                    }
                }
            })?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            status => Err(PublishError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn create_mapping(&self, record: &MappingRecord) -> Result<(), PublishError> {
        self.post(MAPPINGS_PATH, record).await
    }

    async fn create_did_document(&self, record: &DidDocumentRecord) -> Result<(), PublishError> {
        self.post(DIDS_PATH, record).await
    }
}

/// In-memory directory double for tests elsewhere in the crate.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Published {
        Mapping(MappingRecord),
        DidDocument(DidDocumentRecord),
    }

    /// Records every publish call in order; can be told to reject either one.
    #[derive(Default)]
    pub struct RecordingDirectory {
        pub calls: Mutex<Vec<Published>>,
        pub mapping_status: Option<u16>,
        pub did_document_status: Option<u16>,
    }

    impl RecordingDirectory {
        pub fn rejecting_mappings(status: u16) -> Self {
            RecordingDirectory {
                mapping_status: Some(status),
                ..Default::default()
            }
        }

        pub fn rejecting_did_documents(status: u16) -> Self {
            RecordingDirectory {
                did_document_status: Some(status),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<Published> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectoryClient for RecordingDirectory {
        async fn create_mapping(&self, record: &MappingRecord) -> Result<(), PublishError> {
            self.calls.lock().unwrap().push(Published::Mapping(record.clone()));
            match self.mapping_status {
                Some(status) => Err(PublishError::UnexpectedStatus {
                    endpoint: MAPPINGS_PATH.into(),
                    status,
                }),
                None => Ok(()),
            }
        }

        async fn create_did_document(&self, record: &DidDocumentRecord) -> Result<(), PublishError> {
            self.calls.lock().unwrap().push(Published::DidDocument(record.clone()));
            match self.did_document_status {
                Some(status) => Err(PublishError::UnexpectedStatus {
                    endpoint: DIDS_PATH.into(),
                    status,
                }),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::did::{Did, EncryptedDid, IdentityProviderInfo, LookupHash};
    use mockito::{mock, Matcher};
    use serde_json::json;

    // Every test mounts its mocks under its own prefix so they can share the
    // mockito server while running in parallel.
    fn client(prefix: &str) -> HttpDirectoryClient {
        let base = format!("{}/{}", mockito::server_url(), prefix);
        HttpDirectoryClient::new(&base, Duration::from_secs(5)).unwrap()
    }

    fn mapping() -> MappingRecord {
        MappingRecord::new(
            &LookupHash::from_hex("feedbeef"),
            EncryptedDid {
                cipher_algorithm: "AES-256-GCM".into(),
                pw_key_hash_method: "PBKDF2-SHA256".into(),
                num_iterations: 1000,
                salt: "c2FsdA==".into(),
                iv: "aXY=".into(),
                data: "ZGF0YQ==".into(),
            },
        )
    }

    fn document() -> DidDocumentRecord {
        DidDocumentRecord::new(
            Did::new("did:abc"),
            IdentityProviderInfo::new("https://idp.example.com"),
            "-----BEGIN PUBLIC KEY-----".into(),
        )
    }

    #[test]
    fn test_base_url_normalised() {
        let a = HttpDirectoryClient::new("http://dir.example.com/", Duration::from_secs(1)).unwrap();
        let b = HttpDirectoryClient::new("http://dir.example.com", Duration::from_secs(1)).unwrap();
        assert_eq!(a.endpoint(MAPPINGS_PATH), "http://dir.example.com/mappings/");
        assert_eq!(a.endpoint(DIDS_PATH), b.endpoint(DIDS_PATH));
    }

    #[tokio::test]
    async fn test_create_mapping_posts_record() {
        let m = mock("POST", "/created-mapping/mappings/")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "@context": "https://w3id.org/identity/v1",
                "id": "urn:sha256:feedbeef",
                "cipherData": {
                    "cipherAlgorithm": "AES-256-GCM",
                    "pwKeyHashMethod": "PBKDF2-SHA256",
                    "numIterations": 1000,
                    "salt": "c2FsdA==",
                    "iv": "aXY=",
                    "data": "ZGF0YQ=="
                }
            })))
            .with_status(201)
            .expect(1)
            .create();

        tokio_test::assert_ok!(client("created-mapping").create_mapping(&mapping()).await);
        m.assert();
    }

    #[tokio::test]
    async fn test_create_did_document_posts_record() {
        let m = mock("POST", "/created-did/dids/")
            .match_body(Matcher::PartialJson(json!({
                "id": "did:abc",
                "idp": { "url": "https://idp.example.com" },
                "publicKeys": ["-----BEGIN PUBLIC KEY-----"]
            })))
            .with_status(201)
            .expect(1)
            .create();

        tokio_test::assert_ok!(client("created-did").create_did_document(&document()).await);
        m.assert();
    }

    #[tokio::test]
    async fn test_ok_is_not_created() {
        let _m = mock("POST", "/ok-mapping/mappings/").with_status(200).create();

        let result = client("ok-mapping").create_mapping(&mapping()).await;
        assert!(matches!(
            result,
            Err(PublishError::UnexpectedStatus { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_conflict_is_failure() {
        let _m = mock("POST", "/conflict-did/dids/").with_status(409).create();

        let result = client("conflict-did").create_did_document(&document()).await;
        assert!(matches!(
            result,
            Err(PublishError::UnexpectedStatus { status: 409, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_transport_error() {
        let client = HttpDirectoryClient::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();

        let result = client.create_mapping(&mapping()).await;
        assert!(matches!(result, Err(PublishError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_silent_directory_times_out() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client =
            HttpDirectoryClient::new(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();
        let result = client.create_mapping(&mapping()).await;

        match result {
            Err(PublishError::Timeout { endpoint }) => {
                assert_eq!(endpoint, format!("http://{}/mappings/", addr));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        server.abort();
    }
}

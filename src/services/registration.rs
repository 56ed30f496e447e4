// src/services/registration.rs
//! Identity registration pipeline.
//!
//! A registration attempt walks a fixed sequence of states:
//!
//! ```text
//! Idle -> Validating -> GeneratingKeys -> GeneratingDid -> Encrypting
//!      -> PublishingMapping -> PublishingDidDocument -> Succeeded
//! ```
//!
//! Any non-terminal state can move to `Failed`. Every step gates the next and
//! nothing runs in parallel. The mapping record is always confirmed before the
//! DID document is sent, so the encrypted-DID recovery path exists before the
//! public identity becomes discoverable. If the DID document is rejected after
//! the mapping was stored, the mapping stays in the directory; no retraction
//! is attempted.
//!
//! State transitions are computed by [`Attempt::transition`], a pure function
//! from the current state and an event to the next state and the effect to
//! run. [`RegistrationPipeline::register`] executes effects and feeds their
//! outcome back in as events.
//!
//! Each attempt generates its own keypair and DID. Retrying after a failure is
//! a brand-new registration, nothing is resumed.

use crate::error::{EncryptionError, RegistrationError};
use crate::models::credentials::Credentials;
use crate::models::did::{
    Did, DidDocumentRecord, EncryptedDid, IdentityProviderInfo, LookupHash, MappingRecord,
};
use crate::storage::directory_client::DirectoryClient;
use crate::wallet::did_engine::DidCipher;
use crate::wallet::key_management::{KeyGenerator, Keypair};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task;

/// RSA modulus size used for new identities.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Externally visible progress of a pipeline.
///
/// This is the only source of "busy" information; callers disable re-entry
/// and show progress from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationStatus {
    Idle,
    Validating,
    GeneratingKeys,
    GeneratingDid,
    Encrypting,
    PublishingMapping,
    PublishingDidDocument,
    Succeeded,
    Failed,
}

impl RegistrationStatus {
    /// True while an attempt is in flight.
    pub fn is_busy(self) -> bool {
        !matches!(
            self,
            RegistrationStatus::Idle | RegistrationStatus::Succeeded | RegistrationStatus::Failed
        )
    }
}

/// Inbound registration request.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub credentials: Credentials,
    /// Identity provider the user registers with; required
    pub idp: Option<IdentityProviderInfo>,
    /// Opaque callback carried through to the handoff
    pub callback: Option<String>,
}

/// What a successful registration hands to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Handoff {
    pub did: Did,
    /// The identity provider's registration-complete URL
    pub redirect_url: String,
    pub callback: Option<String>,
}

/// Input carried from submission until the DID is encrypted.
#[derive(Debug)]
struct Submission {
    credentials: Credentials,
    idp: IdentityProviderInfo,
    callback: Option<String>,
}

/// State of one attempt, carrying everything accumulated so far.
///
/// The keypair lives here only until the DID document is assembled; the
/// passphrase only until encryption is requested.
#[derive(Debug)]
enum Attempt {
    Validating(Submission),
    GeneratingKeys(Submission),
    GeneratingDid {
        submission: Submission,
        keypair: Keypair,
    },
    Encrypting {
        idp: IdentityProviderInfo,
        callback: Option<String>,
        keypair: Keypair,
        did: Did,
    },
    PublishingMapping {
        document: DidDocumentRecord,
        handoff: Handoff,
    },
    PublishingDidDocument {
        handoff: Handoff,
    },
    Succeeded(Handoff),
    Failed(RegistrationError),
}

enum Event {
    Submitted,
    KeysGenerated(Keypair),
    DidGenerated(Did),
    Encrypted {
        lookup_hash: LookupHash,
        cipher_data: EncryptedDid,
    },
    MappingPublished,
    DidDocumentPublished,
    Failed(RegistrationError),
}

enum Effect {
    GenerateKeys,
    GenerateDid,
    Encrypt {
        did: Did,
        username: String,
        passphrase: String,
    },
    PublishMapping(MappingRecord),
    PublishDidDocument(DidDocumentRecord),
}

impl Attempt {
    fn status(&self) -> RegistrationStatus {
        match self {
            Attempt::Validating(_) => RegistrationStatus::Validating,
            Attempt::GeneratingKeys(_) => RegistrationStatus::GeneratingKeys,
            Attempt::GeneratingDid { .. } => RegistrationStatus::GeneratingDid,
            Attempt::Encrypting { .. } => RegistrationStatus::Encrypting,
            Attempt::PublishingMapping { .. } => RegistrationStatus::PublishingMapping,
            Attempt::PublishingDidDocument { .. } => RegistrationStatus::PublishingDidDocument,
            Attempt::Succeeded(_) => RegistrationStatus::Succeeded,
            Attempt::Failed(_) => RegistrationStatus::Failed,
        }
    }

    /// Computes the next state and the effect needed to leave it.
    ///
    /// Terminal states return no effect and ignore further events.
    fn transition(self, event: Event) -> (Attempt, Option<Effect>) {
        match (self, event) {
            (state @ (Attempt::Succeeded(_) | Attempt::Failed(_)), _) => (state, None),

            (_, Event::Failed(err)) => (Attempt::Failed(err), None),

            (Attempt::Validating(submission), Event::Submitted) => {
                match submission.credentials.validate() {
                    Ok(()) => (Attempt::GeneratingKeys(submission), Some(Effect::GenerateKeys)),
                    Err(err) => (Attempt::Failed(err.into()), None),
                }
            }

            (Attempt::GeneratingKeys(submission), Event::KeysGenerated(keypair)) => (
                Attempt::GeneratingDid {
                    submission,
                    keypair,
                },
                Some(Effect::GenerateDid),
            ),

            (Attempt::GeneratingDid { submission, keypair }, Event::DidGenerated(did)) => {
                let Submission {
                    credentials,
                    idp,
                    callback,
                } = submission;
                let effect = Effect::Encrypt {
                    did: did.clone(),
                    username: credentials.username,
                    passphrase: credentials.passphrase,
                };
                (
                    Attempt::Encrypting {
                        idp,
                        callback,
                        keypair,
                        did,
                    },
                    Some(effect),
                )
            }

            (
                Attempt::Encrypting {
                    idp,
                    callback,
                    keypair,
                    did,
                },
                Event::Encrypted {
                    lookup_hash,
                    cipher_data,
                },
            ) => {
                let mapping = MappingRecord::new(&lookup_hash, cipher_data);
                let handoff = Handoff {
                    did: did.clone(),
                    redirect_url: idp.url.clone(),
                    callback,
                };
                let document = DidDocumentRecord::new(did, idp, keypair.into_public_key_pem());
                (
                    Attempt::PublishingMapping { document, handoff },
                    Some(Effect::PublishMapping(mapping)),
                )
            }

            (Attempt::PublishingMapping { document, handoff }, Event::MappingPublished) => (
                Attempt::PublishingDidDocument { handoff },
                Some(Effect::PublishDidDocument(document)),
            ),

            (Attempt::PublishingDidDocument { handoff }, Event::DidDocumentPublished) => {
                (Attempt::Succeeded(handoff), None)
            }

            (state, _) => (
                Attempt::Failed(RegistrationError::InvalidTransition(state.status())),
                None,
            ),
        }
    }
}

/// Shared collaborators used by every registration attempt.
#[derive(Clone)]
pub struct Registrar {
    key_generator: Arc<dyn KeyGenerator>,
    did_engine: Arc<dyn DidCipher>,
    directory: Arc<dyn DirectoryClient>,
    key_bits: usize,
}

impl Registrar {
    /// Wires the pipeline collaborators together.
    ///
    /// # Arguments
    /// * `key_generator` - Source of per-attempt keypairs
    /// * `did_engine` - DID generation, hashing and encryption
    /// * `directory` - Where the mapping and DID document are published
    /// * `key_bits` - RSA modulus size, normally [`DEFAULT_KEY_BITS`]
    pub fn new(
        key_generator: Arc<dyn KeyGenerator>,
        did_engine: Arc<dyn DidCipher>,
        directory: Arc<dyn DirectoryClient>,
        key_bits: usize,
    ) -> Self {
        Registrar {
            key_generator,
            did_engine,
            directory,
            key_bits,
        }
    }

    /// A fresh, idle pipeline backed by these collaborators.
    pub fn pipeline(&self) -> RegistrationPipeline {
        RegistrationPipeline::new(self.clone())
    }

    async fn execute(&self, effect: Effect) -> Event {
        match effect {
            Effect::GenerateKeys => self
                .key_generator
                .generate_keypair(self.key_bits)
                .await
                .map_or_else(|e| Event::Failed(e.into()), Event::KeysGenerated),

            Effect::GenerateDid => Event::DidGenerated(self.did_engine.generate_did()),

            Effect::Encrypt {
                did,
                username,
                passphrase,
            } => {
                // PBKDF2 is CPU bound
                let engine = Arc::clone(&self.did_engine);
                let sealed = task::spawn_blocking(move || {
                    let cipher_data = engine.encrypt(&did, &passphrase)?;
                    let lookup_hash = engine.generate_lookup_hash(&username, &passphrase);
                    Ok::<_, EncryptionError>((lookup_hash, cipher_data))
                })
                .await
                .map_err(EncryptionError::from)
                .and_then(|result| result);

                match sealed {
                    Ok((lookup_hash, cipher_data)) => Event::Encrypted {
                        lookup_hash,
                        cipher_data,
                    },
                    Err(e) => Event::Failed(e.into()),
                }
            }

            Effect::PublishMapping(record) => self
                .directory
                .create_mapping(&record)
                .await
                .map_or_else(|e| Event::Failed(e.into()), |_| Event::MappingPublished),

            Effect::PublishDidDocument(record) => self
                .directory
                .create_did_document(&record)
                .await
                .map_or_else(|e| Event::Failed(e.into()), |_| Event::DidDocumentPublished),
        }
    }
}

/// Runs registration attempts one at a time and publishes their progress.
pub struct RegistrationPipeline {
    registrar: Registrar,
    status: watch::Sender<RegistrationStatus>,
}

impl RegistrationPipeline {
    pub fn new(registrar: Registrar) -> Self {
        let (status, _) = watch::channel(RegistrationStatus::Idle);
        RegistrationPipeline { registrar, status }
    }

    pub fn status(&self) -> RegistrationStatus {
        *self.status.borrow()
    }

    #[allow(dead_code)]
    pub fn is_busy(&self) -> bool {
        self.status().is_busy()
    }

    /// Receives every status change of this pipeline.
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<RegistrationStatus> {
        self.status.subscribe()
    }

    /// Runs one complete registration attempt.
    ///
    /// # Returns
    /// The [`Handoff`] to the identity provider once both records are stored.
    ///
    /// # Errors
    /// - [`RegistrationError::MissingIdentityProvider`] before anything starts
    /// - [`RegistrationError::AlreadyInProgress`] if an attempt is in flight;
    ///   the running attempt is not affected
    /// - [`RegistrationError::Validation`] without any key generation or
    ///   network traffic
    /// - key generation, encryption and publish failures, which callers must
    ///   present through [`RegistrationError::user_message`]
    pub async fn register(&self, request: RegistrationRequest) -> Result<Handoff, RegistrationError> {
        let RegistrationRequest {
            credentials,
            idp,
            callback,
        } = request;

        let idp = idp.ok_or_else(|| {
            warn!("registration requested without identity provider information");
            RegistrationError::MissingIdentityProvider
        })?;

        if !self.try_begin() {
            warn!("rejected registration for {}: attempt already in flight", credentials.username);
            return Err(RegistrationError::AlreadyInProgress);
        }
        let _busy = BusyGuard {
            status: &self.status,
        };

        let username = credentials.username.clone();
        let mut attempt = Attempt::Validating(Submission {
            credentials,
            idp,
            callback,
        });
        let mut event = Event::Submitted;

        loop {
            let (next, effect) = attempt.transition(event);
            attempt = next;
            debug!("registration for {}: {:?}", username, attempt.status());
            self.status.send_replace(attempt.status());

            match effect {
                Some(effect) => event = self.registrar.execute(effect).await,
                None => break,
            }
        }

        match attempt {
            Attempt::Succeeded(handoff) => {
                info!("registered {} for {}", handoff.did, username);
                Ok(handoff)
            }
            Attempt::Failed(RegistrationError::Validation(err)) => {
                info!("registration for {} rejected: {}", username, err);
                Err(err.into())
            }
            Attempt::Failed(err) => {
                error!("Failed to register {} with the network: {}", username, err);
                Err(err)
            }
            stalled => {
                let err = RegistrationError::InvalidTransition(stalled.status());
                error!("Failed to register {} with the network: {}", username, err);
                self.status.send_replace(RegistrationStatus::Failed);
                Err(err)
            }
        }
    }

    /// Claims the pipeline for a new attempt unless one is already running.
    fn try_begin(&self) -> bool {
        self.status.send_if_modified(|status| {
            if status.is_busy() {
                false
            } else {
                *status = RegistrationStatus::Validating;
                true
            }
        })
    }
}

/// Moves a still-busy pipeline to `Failed` when the attempt ends, including
/// when the attempt future is dropped half way.
struct BusyGuard<'a> {
    status: &'a watch::Sender<RegistrationStatus>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.status.send_if_modified(|status| {
            if status.is_busy() {
                *status = RegistrationStatus::Failed;
                true
            } else {
                false
            }
        });
    }
}

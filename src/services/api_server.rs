// src/services/api_server.rs
//! HTTP front door for identity registration.
//!
//! Accepts registration requests, runs them through a
//! [`RegistrationPipeline`] and translates the outcome into HTTP:
//! - POST /register
//! - GET  /register/status/:username
//!
//! A request claims its username for as long as it runs. A second request for
//! the same username gets 409 instead of starting a second keypair and DID.

use crate::error::RegistrationError;
use crate::models::credentials::Credentials;
use crate::models::did::IdentityProviderInfo;
use crate::services::registration::{
    Registrar, RegistrationPipeline, RegistrationRequest, RegistrationStatus,
};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

// API request and response structures

/// Request payload for registering a new identity
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(flatten)]
    credentials: Credentials,
    /// Overrides the configured identity provider
    idp: Option<IdentityProviderInfo>,
    callback: Option<String>,
}

/// Response for a completed registration
#[derive(Serialize, Deserialize)]
struct RegisterResponse {
    did: String,
    redirect: String,
    callback: Option<String>,
}

/// Response carrying a message for the user
#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Response describing the progress of a user's registration
#[derive(Serialize)]
struct StatusResponse {
    status: RegistrationStatus,
}

/// Shared state behind the registration endpoints.
pub struct ApiServer {
    registrar: Registrar,

    /// Identity provider injected through configuration
    default_idp: Option<IdentityProviderInfo>,

    /// Pipelines of claimed usernames, one per running request
    sessions: Mutex<HashMap<String, Arc<RegistrationPipeline>>>,
}

/// A username claimed by one request.
///
/// Dropping it gives the username back, including when the request future is
/// dropped because the client went away.
struct Session {
    server: Arc<ApiServer>,
    username: String,
    pipeline: Arc<RegistrationPipeline>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.server.release(&self.username, &self.pipeline);
    }
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `registrar` - Collaborators for registration attempts
    /// * `default_idp` - Identity provider used when a request names none
    pub fn new(registrar: Registrar, default_idp: Option<IdentityProviderInfo>) -> Self {
        ApiServer {
            registrar,
            default_idp,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the router with all registration routes.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/register", post(Self::register_handler))
            .route("/register/status/:username", get(Self::status_handler))
            .with_state(self)
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let app = Arc::new(self).router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await
    }

    /// Claims `username` with a fresh pipeline.
    ///
    /// Returns `None` while another request holds the username.
    fn claim(self: &Arc<Self>, username: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.entry(username.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let pipeline = Arc::new(self.registrar.pipeline());
                slot.insert(Arc::clone(&pipeline));
                Some(Session {
                    server: Arc::clone(self),
                    username: username.to_string(),
                    pipeline,
                })
            }
        }
    }

    fn release(&self, username: &str, pipeline: &Arc<RegistrationPipeline>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions
            .get(username)
            .map_or(false, |current| Arc::ptr_eq(current, pipeline))
        {
            sessions.remove(username);
        }
    }

    fn current_status(&self, username: &str) -> RegistrationStatus {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(username)
            .map_or(RegistrationStatus::Idle, |pipeline| pipeline.status())
    }

    /// Registers a new identity
    ///
    /// # Endpoint
    /// POST /register
    ///
    /// # Request Body
    /// `{username, passphrase, passphraseConfirmation, idp?, callback?}`
    ///
    /// # Responses
    /// - 201 Created: DID registered, body carries the handoff URL
    /// - 303 See Other: no identity provider available
    /// - 400 Bad Request: credentials failed validation
    /// - 409 Conflict: an attempt for this username is already running
    /// - 502 Bad Gateway: registration failed (generic message)
    async fn register_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterRequest>,
    ) -> Response {
        let username = payload.credentials.username.clone();
        let request = RegistrationRequest {
            credentials: payload.credentials,
            idp: payload.idp.or_else(|| state.default_idp.clone()),
            callback: payload.callback,
        };

        let Some(session) = state.claim(&username) else {
            warn!("rejected registration for {}: another request is running", username);
            return error_response(RegistrationError::AlreadyInProgress);
        };
        let result = session.pipeline.register(request).await;
        drop(session);

        match result {
            Ok(handoff) => (
                StatusCode::CREATED,
                Json(RegisterResponse {
                    did: handoff.did.to_string(),
                    redirect: handoff.redirect_url,
                    callback: handoff.callback,
                }),
            )
                .into_response(),
            Err(err) => error_response(err),
        }
    }

    /// Reports registration progress for a username
    ///
    /// # Endpoint
    /// GET /register/status/:username
    ///
    /// # Responses
    /// - 200 OK: `{status}`, `idle` when nothing is in flight
    async fn status_handler(
        Path(username): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> impl IntoResponse {
        Json(StatusResponse {
            status: state.current_status(&username),
        })
    }
}

fn error_response(err: RegistrationError) -> Response {
    if let Some(path) = err.redirect_path() {
        return Redirect::to(path).into_response();
    }
    let status = match err {
        RegistrationError::Validation(_) => StatusCode::BAD_REQUEST,
        RegistrationError::AlreadyInProgress => StatusCode::CONFLICT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            message: err.user_message(),
        }),
    )
        .into_response()
}

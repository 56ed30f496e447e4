// src/main.rs

//! # DID Registrar - Main Entry Point
//!
//! Registers new decentralized identities on behalf of users. For each
//! registration the service generates an RSA keypair and a fresh DID, encrypts
//! the DID under the user's passphrase and publishes two records to the
//! identity directory:
//! 1. a lookup hash to encrypted DID mapping (`POST /mappings/`)
//! 2. the DID document carrying the public key (`POST /dids/`)
//!
//! ## Architecture Overview
//! 1. **Services Layer**: registration pipeline and HTTP API
//! 2. **Wallet Layer**: key generation and DID cryptography
//! 3. **Storage Layer**: directory service client
//!
//! ## Configuration
//! See [`settings::Settings`]. A `.env` file is honoured. `RUST_LOG` controls
//! log verbosity (default `info`).

use crate::settings::Settings;
use crate::services::api_server::ApiServer;
use crate::services::registration::Registrar;
use crate::storage::directory_client::HttpDirectoryClient;
use crate::wallet::did_engine::DidEngine;
use crate::wallet::key_management::RsaKeyGenerator;
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod settings;      // Layered runtime settings
mod error;         // Error taxonomy
mod models;        // Data structures
mod services;      // Registration pipeline and API
mod storage;       // Directory service client
mod utils;         // Helper functions
mod wallet;        // Key generation and DID cryptography

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load registrar settings")?;

    let directory = HttpDirectoryClient::new(&settings.directory_url, settings.publish_timeout())
        .context("failed to build directory client")?;
    let did_engine = DidEngine::new(settings.pbkdf2_iterations)
        .context("invalid pbkdf2_iterations setting")?;

    let registrar = Registrar::new(
        Arc::new(RsaKeyGenerator),
        Arc::new(did_engine),
        Arc::new(directory),
        settings.key_bits,
    );

    if settings.idp.is_none() {
        warn!("no identity provider configured; requests must supply one");
    }
    let api_server = ApiServer::new(registrar, settings.idp.clone());

    info!("API server running at http://{}", settings.listen_addr);
    info!("Publishing to directory at {}", settings.directory_url);
    info!("Available endpoints:");
    info!("- POST /register");
    info!("- GET  /register/status/:username");

    api_server
        .run(settings.listen_addr)
        .await
        .context("API server terminated")
}

// src/settings.rs
//! Runtime settings for the registrar.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. Optional `registrar.{toml,json,yaml}` in the working directory
//! 3. Environment variables prefixed `REGISTRAR_`, nested keys joined with `__`
//!    (e.g. `REGISTRAR_DIRECTORY_URL`, `REGISTRAR_IDP__URL`)

use crate::models::did::IdentityProviderInfo;
use crate::services::registration::DEFAULT_KEY_BITS;
use crate::wallet::did_engine::DEFAULT_PBKDF2_ITERATIONS;
use crate::wallet::key_management::SUPPORTED_MODULUS_BITS;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the HTTP API listens on
    pub listen_addr: SocketAddr,

    /// Root URL of the identity directory
    pub directory_url: String,

    /// RSA modulus size for new keypairs
    pub key_bits: usize,

    pub pbkdf2_iterations: u32,

    /// Upper bound for each publish request, in seconds
    pub publish_timeout_secs: u64,

    /// Identity provider used when a request names none
    pub idp: Option<IdentityProviderInfo>,
}

impl Settings {
    /// Loads settings from the default file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name("registrar").required(false))
                .add_source(Environment::with_prefix("REGISTRAR").separator("__")),
        )
    }

    /// Applies defaults to `builder` and deserializes the result.
    ///
    /// # Errors
    /// Besides source and type errors, rejects a `key_bits` the key generator
    /// does not support, so a bad value stops startup instead of failing
    /// every registration.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder
            .set_default("listen_addr", "127.0.0.1:3000")?
            .set_default("directory_url", "http://localhost:8080")?
            .set_default("key_bits", DEFAULT_KEY_BITS as i64)?
            .set_default("pbkdf2_iterations", DEFAULT_PBKDF2_ITERATIONS as i64)?
            .set_default("publish_timeout_secs", 30i64)?
            .build()?
            .try_deserialize()?;

        if !SUPPORTED_MODULUS_BITS.contains(&settings.key_bits) {
            return Err(ConfigError::Message(format!(
                "key_bits must be one of {:?}, got {}",
                SUPPORTED_MODULUS_BITS, settings.key_bits
            )));
        }
        Ok(settings)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_builder(Config::builder()).unwrap();

        assert_eq!(settings.listen_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(settings.key_bits, 2048);
        assert_eq!(settings.pbkdf2_iterations, 100_000);
        assert_eq!(settings.publish_timeout(), Duration::from_secs(30));
        assert!(settings.idp.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let toml = r#"
            directory_url = "https://directory.example.com"
            publish_timeout_secs = 5

            [idp]
            url = "https://idp.example.com/complete"
            name = "Example"
        "#;
        let settings = Settings::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
        .unwrap();

        assert_eq!(settings.directory_url, "https://directory.example.com");
        assert_eq!(settings.publish_timeout(), Duration::from_secs(5));

        let idp = settings.idp.unwrap();
        assert_eq!(idp.url, "https://idp.example.com/complete");
        assert_eq!(idp.extra["name"], "Example");
    }

    #[test]
    fn test_unsupported_key_bits_rejected() {
        let result = Settings::from_builder(
            Config::builder().add_source(File::from_str("key_bits = 1024", FileFormat::Toml)),
        );

        match result {
            Err(ConfigError::Message(message)) => assert!(message.contains("1024")),
            other => panic!("expected key_bits to be rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_larger_supported_key_bits_accepted() {
        let settings = Settings::from_builder(
            Config::builder().add_source(File::from_str("key_bits = 4096", FileFormat::Toml)),
        )
        .unwrap();

        assert_eq!(settings.key_bits, 4096);
    }
}

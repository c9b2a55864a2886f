//! Configuration store for the Speechmatics bridge
//!
//! Stored settings come from .env files, YAML files and environment variables.
//! Priority: YAML > ENV vars > .env values > defaults. Values are only
//! checked for type here; range and credential validation happens when a
//! session is configured.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use speechmatics_stt_bridge::config::AppConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = AppConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = AppConfig::from_file(&config_path)?;
//!
//! println!("Transcribing in {}", config.language);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;

mod merge;
mod yaml;

pub use yaml::{SpeechmaticsYaml, YamlConfig};

use crate::core::stt::speechmatics::config::{AudioEncoding, ConnectionSettings, OperatingPoint};

/// Stored Speechmatics settings
///
/// Environment variables:
/// - `SPEECHMATICS_API_KEY`
/// - `SPEECHMATICS_LANGUAGE` (default `en`)
/// - `SPEECHMATICS_OPERATING_POINT` (default `enhanced`)
/// - `SPEECHMATICS_MAX_DELAY` (default `0.8`)
/// - `SPEECHMATICS_URL` (default `wss://eu2.rt.speechmatics.com/v2`)
/// - `SPEECHMATICS_CHUNK_SIZE` (default `4096`)
/// - `SPEECHMATICS_ENCODING` (default `pcm_s16le`)
#[derive(Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub language: String,
    pub operating_point: OperatingPoint,
    /// Max latency budget in seconds
    pub max_delay: f32,
    /// Audio frame size in bytes
    pub chunk_size: usize,
    pub encoding: AudioEncoding,
}

/// Zeroize the credential when the config is dropped.
impl Drop for AppConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("language", &self.language)
            .field("operating_point", &self.operating_point)
            .field("max_delay", &self.max_delay)
            .field("chunk_size", &self.chunk_size)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Loads the .env file if present, then reads `SPEECHMATICS_*` variables
    /// falling back to defaults.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format (e.g. a
    /// non-numeric max delay or an unknown operating point).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        merge::merge_config(None)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Note: .env file is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        merge::merge_config(Some(yaml_config))
    }

    /// Check if a credential is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Stored defaults for new sessions.
    ///
    /// Sample rate keeps its default; the entity overrides it from request
    /// metadata.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone().unwrap_or_default(),
            language: self.language.clone(),
            operating_point: self.operating_point,
            max_delay: self.max_delay,
            chunk_size: self.chunk_size,
            encoding: self.encoding,
            ..Default::default()
        }
    }
}

//! Endpoint URL validation for the real-time WebSocket connection
//!
//! Ensures the configured endpoint:
//! - Is a well-formed URL with a host
//! - Uses `wss://` (plain `ws://` is only accepted for loopback hosts, so a
//!   local mock server can be used in development and tests)
//!
//! The credential travels in the upgrade request headers, so a plaintext
//! scheme to a remote host is always rejected.

use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

/// Errors that can occur during endpoint validation
#[derive(Debug, Error, PartialEq)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be wss (or ws for loopback hosts), got: {0}")]
    SecureSchemeRequired(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Checks whether a parsed URL points at the local machine
pub fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Validates a real-time endpoint URL
///
/// # Arguments
/// * `url` - The endpoint URL string to validate
///
/// # Returns
/// * `Ok(Url)` with the parsed URL if the endpoint is acceptable
/// * `Err(UrlValidationError)` if validation fails
///
/// # Example
/// ```rust
/// use speechmatics_stt_bridge::utils::validate_endpoint_url;
///
/// assert!(validate_endpoint_url("wss://eu2.rt.speechmatics.com/v2").is_ok());
/// assert!(validate_endpoint_url("ws://127.0.0.1:9000/v2").is_ok());
/// assert!(validate_endpoint_url("ws://eu2.rt.speechmatics.com/v2").is_err());
/// assert!(validate_endpoint_url("https://eu2.rt.speechmatics.com/v2").is_err());
/// ```
pub fn validate_endpoint_url(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;

    if parsed.host().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    match parsed.scheme() {
        "wss" => Ok(parsed),
        "ws" if is_loopback_host(&parsed) => {
            warn!(url = %parsed, "Using plaintext WebSocket endpoint on loopback host");
            Ok(parsed)
        }
        other => Err(UrlValidationError::SecureSchemeRequired(other.to_string())),
    }
}

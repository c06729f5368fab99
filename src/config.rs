//! Environment-driven configuration.
//!
//! Values come from the process environment (a `.env` file is loaded first by
//! the binary), with working defaults for a local deployment.

use std::time::Duration;

use crate::models::OwnerId;

/// Runtime configuration for the bot core.
///
/// # Environment Variables
///
/// - `ZETTEL_API_URL` (default `http://localhost:8000`): note service base URL
/// - `ZETTEL_REQUEST_TIMEOUT_SECS` (default 10): per-request timeout
/// - `ZETTEL_OWNER`: default owner ID for CLI invocations that omit `--owner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub request_timeout: Duration,
    pub default_owner: Option<OwnerId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(10),
            default_owner: None,
        }
    }
}

impl Config {
    /// Parses configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or fails to parse.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_url = std::env::var("ZETTEL_API_URL").unwrap_or(defaults.api_url);

        let request_timeout = std::env::var("ZETTEL_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let default_owner = std::env::var("ZETTEL_OWNER")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(OwnerId::new);

        Self {
            api_url,
            request_timeout,
            default_owner,
        }
    }
}

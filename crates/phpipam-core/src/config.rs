//! Configuration types for the phpIPAM provider
//!
//! Connection settings are read from the environment, mirroring the
//! variables the provider has always accepted:
//!
//! - `PHPIPAM_APP_ID`: API application id (required)
//! - `PHPIPAM_ENDPOINT_ADDR`: API base URL (default `http://localhost/api`)
//! - `PHPIPAM_USER_NAME`: user for token login; empty means the password is a static app token
//! - `PHPIPAM_PASSWORD`: password or static token (required)
//! - `PHPIPAM_INSECURE`: skip TLS verification when `true`/`1`
//! - `PHPIPAM_TIMEOUT_SECS`: HTTP timeout (default 30)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection settings for the phpIPAM API
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API application id, the first path segment after the endpoint
    pub app_id: String,

    /// API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// User name for token login
    #[serde(default)]
    pub username: String,

    /// Password, or the static app token when `username` is empty
    pub password: String,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Create a configuration with default endpoint and timeout
    pub fn new(app_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            endpoint: default_endpoint(),
            username: String::new(),
            password: password.into(),
            insecure: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set the user name
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, crate::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, crate::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let insecure = match lookup("PHPIPAM_INSECURE").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(crate::Error::config(format!(
                    "PHPIPAM_INSECURE must be true or false. Got: {}",
                    other
                )));
            }
        };

        let timeout_secs = match lookup("PHPIPAM_TIMEOUT_SECS") {
            Some(raw) if !raw.is_empty() => raw.parse().map_err(|_| {
                crate::Error::config(format!(
                    "PHPIPAM_TIMEOUT_SECS must be a number of seconds. Got: {}",
                    raw
                ))
            })?,
            _ => default_timeout_secs(),
        };

        Ok(Self {
            app_id: lookup("PHPIPAM_APP_ID").unwrap_or_default(),
            endpoint: lookup("PHPIPAM_ENDPOINT_ADDR")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_endpoint),
            username: lookup("PHPIPAM_USER_NAME").unwrap_or_default(),
            password: lookup("PHPIPAM_PASSWORD").unwrap_or_default(),
            insecure,
            timeout_secs,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.app_id.is_empty() {
            return Err(crate::Error::config(
                "PHPIPAM_APP_ID is required. Set it via: export PHPIPAM_APP_ID=your_app",
            ));
        }

        if self.password.is_empty() {
            return Err(crate::Error::config(
                "PHPIPAM_PASSWORD is required (password, or app token when no user name is set)",
            ));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "PHPIPAM_ENDPOINT_ADDR must use HTTP or HTTPS scheme. Got: {}",
                self.endpoint
            )));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(crate::Error::config(format!(
                "PHPIPAM_TIMEOUT_SECS must be between 1 and 600 seconds. Got: {}",
                self.timeout_secs
            )));
        }

        Ok(())
    }

    /// Base URL for API calls, `{endpoint}/{app_id}`
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.app_id)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("app_id", &self.app_id)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_endpoint() -> String {
    "http://localhost/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

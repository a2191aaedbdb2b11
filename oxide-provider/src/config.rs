//! Provider configuration: where the control plane lives and how to
//! authenticate against it.

use std::time::Duration;

use oxide_api::{ApiError, HttpClient};
use thiserror::Error;
use url::Url;

/// Host used when neither a value nor an environment variable is given.
pub const DEFAULT_HOST: &str = "http://127.0.0.1:12220";

/// Timeout for operations without a per-instance override.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Environment variables consulted for the host, in order.
pub const HOST_ENV: [&str; 2] = ["OXIDE_HOST", "OXIDE_TEST_HOST"];

/// Environment variables consulted for the token, in order.
pub const TOKEN_ENV: [&str; 2] = ["OXIDE_TOKEN", "OXIDE_TEST_TOKEN"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("token must not be empty; set it explicitly or through OXIDE_TOKEN")]
    MissingToken,

    #[error("invalid host {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("default timeout must be greater than zero")]
    ZeroTimeout,
}

/// Resolved provider settings shared by every engine.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub host: String,
    pub token: String,
    pub default_timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve from explicit values, then the process environment.
    pub fn resolve(host: Option<String>, token: Option<String>) -> Result<Self, ConfigError> {
        Self::resolve_with(host, token, |key| std::env::var(key).ok())
    }

    /// Resolve using `env` to look up environment variables.
    pub fn resolve_with(
        host: Option<String>,
        token: Option<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |keys: &[&str]| keys.iter().find_map(|&k| env(k).filter(|v| !v.is_empty()));

        let host = host
            .or_else(|| lookup(&HOST_ENV))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let token = token.or_else(|| lookup(&TOKEN_ENV)).unwrap_or_default();

        let config = Self {
            host,
            token,
            default_timeout: DEFAULT_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.default_timeout = timeout;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let url = Url::parse(&self.host).map_err(|e| ConfigError::InvalidHost {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidHost {
                host: self.host.clone(),
                reason: format!("scheme must be http or https, not {}", url.scheme()),
            });
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidHost {
                host: self.host.clone(),
                reason: "missing host name".to_string(),
            });
        }
        Ok(())
    }

    /// HTTP client for the configured control plane.
    pub fn client(&self) -> Result<HttpClient, ApiError> {
        HttpClient::new(&self.host, &self.token)
    }
}

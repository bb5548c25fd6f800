//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Remote account API settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the account API, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token of the signed-in session.
    pub api_token: SecretString,
    /// Per-request timeout for commits.
    pub request_timeout: Duration,
}

/// Onboarding engine configuration.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Local libSQL database file holding resumable onboarding state.
    pub database_path: PathBuf,
    pub gateway: GatewayConfig,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/onboarding.db"),
            gateway: GatewayConfig {
                base_url: "http://localhost:8080".to_string(),
                api_token: SecretString::from(""),
                request_timeout: Duration::from_secs(15),
            },
        }
    }
}

impl OnboardingConfig {
    /// Read configuration from the environment.
    ///
    /// `DECOR_API_BASE_URL` and `DECOR_API_TOKEN` are required;
    /// `DECOR_DB_PATH` and `DECOR_API_TIMEOUT_SECS` fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let base_url = lookup("DECOR_API_BASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DECOR_API_BASE_URL".to_string()))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "DECOR_API_BASE_URL".to_string(),
                message: format!("expected an http(s) URL, got {base_url:?}"),
            });
        }

        let api_token = lookup("DECOR_API_TOKEN")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("DECOR_API_TOKEN".to_string()))?;

        let request_timeout = match lookup("DECOR_API_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "DECOR_API_TIMEOUT_SECS".to_string(),
                    message: format!("expected whole seconds, got {raw:?}"),
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.gateway.request_timeout,
        };

        let database_path = lookup("DECOR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        Ok(Self {
            database_path,
            gateway: GatewayConfig {
                base_url,
                api_token,
                request_timeout,
            },
        })
    }
}

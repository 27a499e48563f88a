//! Provider configuration supplied by the plugin host at configure time.
//!
//! Every field may also come from an `OKTA_*` environment variable; values
//! in the host payload take precedence. [`ProviderConfig::validate`] enforces
//! ranges and the credential mutual-exclusion rules before the transport is
//! built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while validating provider configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required field is missing
    #[error("Missing required provider setting '{field}'")]
    Missing { field: &'static str },
    /// A numeric field is outside its allowed range
    #[error("Provider setting '{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    /// Credential settings conflict or are incomplete
    #[error("Invalid credentials: {message}")]
    Credentials { message: String },
    /// Any other invalid value
    #[error("Invalid provider setting '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Provider configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Org identifier used as the first label of the service host
    #[serde(default)]
    pub org_name: Option<String>,
    /// Domain suffix (`okta.com`, `oktapreview.com`) or a full URL override
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Static API token, sent as `SSWS`
    #[serde(default)]
    pub api_token: Option<String>,
    /// Pre-minted OAuth access token, sent as `Bearer`
    #[serde(default)]
    pub access_token: Option<String>,
    /// OAuth service app client id for the assertion flow
    #[serde(default)]
    pub client_id: Option<String>,
    /// PEM private key signing the client assertion
    #[serde(default)]
    pub private_key: Option<String>,
    /// Key id placed in the assertion header
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// Scopes requested by the assertion flow
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Percentage of each rate-limit bucket the provider may consume
    #[serde(default = "default_max_api_capacity")]
    pub max_api_capacity: u32,
    /// Per-request timeout in seconds; 0 keeps the HTTP client default
    #[serde(default)]
    pub request_timeout: u64,
    /// Cap on retry attempts per call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Disables every retry when false
    #[serde(default = "default_backoff")]
    pub backoff: bool,
    /// Wait applied on 429 responses without a reset header
    #[serde(default = "default_min_wait_seconds")]
    pub min_wait_seconds: u64,
    /// Cap on any single retry wait
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: u64,
    /// Worker pool hint for the host adapter
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Log severity threshold
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_base_url() -> String {
    "okta.com".to_string()
}

fn default_max_api_capacity() -> u32 {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff() -> bool {
    true
}

fn default_min_wait_seconds() -> u64 {
    30
}

fn default_max_wait_seconds() -> u64 {
    300
}

fn default_parallelism() -> usize {
    1
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            org_name: None,
            base_url: default_base_url(),
            api_token: None,
            access_token: None,
            client_id: None,
            private_key: None,
            private_key_id: None,
            scopes: Vec::new(),
            max_api_capacity: default_max_api_capacity(),
            request_timeout: 0,
            max_retries: default_max_retries(),
            backoff: default_backoff(),
            min_wait_seconds: default_min_wait_seconds(),
            max_wait_seconds: default_max_wait_seconds(),
            parallelism: default_parallelism(),
            log_level: default_log_level(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "[REDACTED]" } else { "None" }
        }
        f.debug_struct("ProviderConfig")
            .field("org_name", &self.org_name)
            .field("base_url", &self.base_url)
            .field("api_token", &redact(&self.api_token))
            .field("access_token", &redact(&self.access_token))
            .field("client_id", &self.client_id)
            .field("private_key", &redact(&self.private_key))
            .field("private_key_id", &self.private_key_id)
            .field("scopes", &self.scopes)
            .field("max_api_capacity", &self.max_api_capacity)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("min_wait_seconds", &self.min_wait_seconds)
            .field("max_wait_seconds", &self.max_wait_seconds)
            .field("parallelism", &self.parallelism)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Which credential source the transport authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ApiToken,
    AccessToken,
    PrivateKey,
}

impl ProviderConfig {
    /// Build a configuration from `OKTA_*` environment variables only.
    pub fn from_env() -> Self {
        Self::default().with_env_fallback(|key| std::env::var(key).ok())
    }

    /// Fill every unset field from `lookup`, which maps `OKTA_*` names to values.
    ///
    /// Numeric fields are only taken from the environment while they still hold
    /// their default value.
    pub fn with_env_fallback<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fill(&mut self.org_name, lookup("OKTA_ORG_NAME"));
        fill(&mut self.api_token, lookup("OKTA_API_TOKEN"));
        fill(&mut self.access_token, lookup("OKTA_ACCESS_TOKEN"));
        fill(&mut self.client_id, lookup("OKTA_API_CLIENT_ID"));
        fill(&mut self.private_key, lookup("OKTA_API_PRIVATE_KEY"));
        fill(&mut self.private_key_id, lookup("OKTA_API_PRIVATE_KEY_ID"));

        if self.base_url == default_base_url() {
            if let Some(base_url) = lookup("OKTA_BASE_URL") {
                self.base_url = base_url;
            }
        }
        if self.scopes.is_empty() {
            if let Some(scopes) = lookup("OKTA_API_SCOPES") {
                self.scopes = scopes
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
        if self.log_level == default_log_level() {
            if let Some(level) = lookup("OKTA_LOG_LEVEL") {
                self.log_level = level;
            }
        }

        parse_if_default(
            &mut self.max_api_capacity,
            default_max_api_capacity(),
            lookup("OKTA_MAX_API_CAPACITY"),
        );
        parse_if_default(&mut self.request_timeout, 0, lookup("OKTA_REQUEST_TIMEOUT"));
        parse_if_default(
            &mut self.max_retries,
            default_max_retries(),
            lookup("OKTA_MAX_RETRIES"),
        );
        parse_if_default(&mut self.backoff, default_backoff(), lookup("OKTA_BACKOFF"));
        parse_if_default(
            &mut self.min_wait_seconds,
            default_min_wait_seconds(),
            lookup("OKTA_MIN_WAIT_SECONDS"),
        );
        parse_if_default(
            &mut self.max_wait_seconds,
            default_max_wait_seconds(),
            lookup("OKTA_MAX_WAIT_SECONDS"),
        );
        parse_if_default(
            &mut self.parallelism,
            default_parallelism(),
            lookup("OKTA_PARALLELISM"),
        );

        self
    }

    /// Validate ranges and credential selection.
    pub fn validate(&self) -> Result<CredentialSource, ConfigError> {
        let full_url = self.base_url.starts_with("http://") || self.base_url.starts_with("https://");
        if !full_url && self.org_name.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing { field: "org_name" });
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing { field: "base_url" });
        }

        check_range("max_api_capacity", self.max_api_capacity as i64, 1, 100)?;
        check_range("request_timeout", self.request_timeout as i64, 0, 300)?;
        check_range("max_retries", self.max_retries as i64, 0, 100)?;
        check_range("parallelism", self.parallelism as i64, 1, 1024)?;

        if self.max_wait_seconds < self.min_wait_seconds {
            return Err(ConfigError::Invalid {
                field: "max_wait_seconds",
                message: format!(
                    "must be greater than or equal to min_wait_seconds ({})",
                    self.min_wait_seconds
                ),
            });
        }

        if self.log_level.trim().parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Invalid {
                field: "log_level",
                message: format!("unknown level '{}'", self.log_level),
            });
        }

        self.credential_source()
    }

    /// Decide which credential source is configured.
    pub fn credential_source(&self) -> Result<CredentialSource, ConfigError> {
        let assertion_fields = [
            self.client_id.is_some(),
            self.private_key.is_some(),
            !self.scopes.is_empty(),
        ];
        let assertion_count = assertion_fields.iter().filter(|set| **set).count();

        let mut sources = Vec::new();
        if self.api_token.is_some() {
            sources.push(CredentialSource::ApiToken);
        }
        if self.access_token.is_some() {
            sources.push(CredentialSource::AccessToken);
        }
        if assertion_count > 0 {
            if assertion_count < assertion_fields.len() {
                return Err(ConfigError::Credentials {
                    message: "client_id, private_key and scopes must all be set for the private key flow"
                        .to_string(),
                });
            }
            sources.push(CredentialSource::PrivateKey);
        }

        match sources.as_slice() {
            [source] => Ok(*source),
            [] => Err(ConfigError::Credentials {
                message: "one of api_token, access_token or client_id/private_key/scopes is required"
                    .to_string(),
            }),
            _ => Err(ConfigError::Credentials {
                message: "api_token, access_token and the private key flow are mutually exclusive"
                    .to_string(),
            }),
        }
    }

    /// Base URL of the org, e.g. `https://example.okta.com`.
    pub fn org_url(&self) -> String {
        if self.base_url.starts_with("http://") || self.base_url.starts_with("https://") {
            return self.base_url.trim_end_matches('/').to_string();
        }
        format!(
            "https://{}.{}",
            self.org_name.as_deref().unwrap_or_default(),
            self.base_url.trim_matches('/')
        )
    }

    /// Request timeout, or `None` for the client default.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    /// Parsed log level filter, falling back to `warn`.
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level
            .trim()
            .parse()
            .unwrap_or(log::LevelFilter::Warn)
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn parse_if_default<T>(slot: &mut T, default: T, value: Option<String>)
where
    T: PartialEq + std::str::FromStr,
{
    if *slot != default {
        return;
    }
    if let Some(parsed) = value.and_then(|v| v.trim().parse::<T>().ok()) {
        *slot = parsed;
    }
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

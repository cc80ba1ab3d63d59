//! Client configuration and credential resolution
//!
//! Identity can come from three places, in increasing precedence: defaults,
//! a JSON credentials file, and process environment variables. Environment
//! overrides are applied once, when the file is loaded (or explicitly via
//! [`ClientConfig::apply_env`]); the client itself never reads the
//! environment, so programmatic configurations stay reproducible.

use crate::error::{GraphError, Result};
use crate::resilience::logging::LogLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names recognized as identity overrides.
const ENV_TENANT_ID: &str = "TENANT_ID";
const ENV_CLIENT_ID: &str = "CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
const ENV_CERTIFICATE_PATH: &str = "CERTIFICATE_PATH";
const ENV_CERTIFICATE_KEY_PATH: &str = "CERTIFICATE_KEY_PATH";
const ENV_CERT_THUMBPRINT: &str = "CERT_THUMBPRINT";

/// Full configuration surface for [`crate::GraphClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tenant_id: String,
    pub client_id: String,
    /// Secret-based authentication; takes precedence over the certificate
    /// fields when both are present.
    pub client_secret: Option<String>,
    pub certificate_path: Option<PathBuf>,
    pub certificate_key_path: Option<PathBuf>,
    pub cert_thumbprint: Option<String>,
    pub log_level: LogLevel,
    /// Retries after the initial attempt.
    pub max_retry_attempts: u32,
    /// When false the governor holds permits at `max_concurrent_requests`.
    pub enable_dynamic_rate_limiting: bool,
    pub max_concurrent_requests: usize,
    /// Assumed token lifetime when the token endpoint omits `expires_in`.
    pub token_lifespan: Duration,
    /// Tokens within this buffer of expiry are refreshed before use.
    pub token_refresh_buffer: Duration,
    /// Cumulative wall-clock budget for one logical call.
    pub total_retry_duration: Duration,
    /// Resource API base. Callers needing the beta surface construct a
    /// client with the beta base; the core never mixes versions.
    pub base_url: String,
    /// Identity provider base, overridable for tests.
    pub authority: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: None,
            certificate_path: None,
            certificate_key_path: None,
            cert_thumbprint: None,
            log_level: LogLevel::None,
            max_retry_attempts: 3,
            enable_dynamic_rate_limiting: false,
            max_concurrent_requests: 5,
            token_lifespan: Duration::from_secs(30 * 60),
            token_refresh_buffer: Duration::from_secs(5 * 60),
            total_retry_duration: Duration::from_secs(60),
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            authority: "https://login.microsoftonline.com".to_string(),
        }
    }
}

/// JSON credentials file. All keys optional; unknown keys ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsFile {
    #[serde(rename = "tenantID", default)]
    pub tenant_id: Option<String>,
    #[serde(rename = "tenantName", default)]
    pub tenant_name: Option<String>,
    #[serde(rename = "clientID", default)]
    pub client_id: Option<String>,
    #[serde(rename = "clientSecret", default)]
    pub client_secret: Option<String>,
    #[serde(rename = "certificatePath", default)]
    pub certificate_path: Option<String>,
    #[serde(rename = "certificateKeyPath", default)]
    pub certificate_key_path: Option<String>,
    #[serde(rename = "certThumbprint", default)]
    pub cert_thumbprint: Option<String>,
}

impl ClientConfig {
    /// Load identity from a JSON credentials file, then apply environment
    /// overrides on top. Non-identity fields keep their defaults.
    pub fn from_credentials_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GraphError::ConfigInvalid(format!(
                "cannot read credentials file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let file: CredentialsFile = serde_json::from_str(&raw).map_err(|e| {
            GraphError::ConfigInvalid(format!("malformed credentials file: {e}"))
        })?;

        let mut config = Self::default().merge_file(file);
        config.apply_env();
        Ok(config)
    }

    fn merge_file(mut self, file: CredentialsFile) -> Self {
        if let Some(tenant) = file.tenant_id {
            self.tenant_id = tenant;
        }
        if let Some(client) = file.client_id {
            self.client_id = client;
        }
        self.client_secret = file.client_secret.filter(|s| !s.is_empty());
        self.certificate_path = file.certificate_path.map(PathBuf::from);
        self.certificate_key_path = file.certificate_key_path.map(PathBuf::from);
        self.cert_thumbprint = file.cert_thumbprint;
        self
    }

    /// Apply process-environment identity overrides. Present variables
    /// shadow whatever the config currently holds.
    pub fn apply_env(&mut self) {
        self.apply_env_from(&|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(tenant) = lookup(ENV_TENANT_ID) {
            self.tenant_id = tenant;
        }
        if let Some(client) = lookup(ENV_CLIENT_ID) {
            self.client_id = client;
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET) {
            self.client_secret = Some(secret);
        }
        if let Some(path) = lookup(ENV_CERTIFICATE_PATH) {
            self.certificate_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_CERTIFICATE_KEY_PATH) {
            self.certificate_key_path = Some(PathBuf::from(path));
        }
        if let Some(thumbprint) = lookup(ENV_CERT_THUMBPRINT) {
            self.cert_thumbprint = Some(thumbprint);
        }
    }

    /// Reject configurations that cannot work before anything touches the
    /// network. Numeric fields are unsigned, so "negative" can only show
    /// up as a nonsensical zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(GraphError::ConfigInvalid(
                "maxConcurrentRequests must be positive".to_string(),
            ));
        }
        if self.token_lifespan.is_zero() {
            return Err(GraphError::ConfigInvalid(
                "tokenLifespan must be positive".to_string(),
            ));
        }
        if self.token_refresh_buffer >= self.token_lifespan {
            return Err(GraphError::ConfigInvalid(
                "tokenRefreshBufferPeriod must be shorter than tokenLifespan".to_string(),
            ));
        }

        let base = reqwest::Url::parse(&self.base_url)
            .map_err(|e| GraphError::ConfigInvalid(format!("invalid base URL: {e}")))?;
        ensure_https(&base)?;
        let authority = reqwest::Url::parse(&self.authority)
            .map_err(|e| GraphError::ConfigInvalid(format!("invalid authority URL: {e}")))?;
        ensure_https(&authority)?;

        Ok(())
    }
}

/// Calls are HTTPS-only; loopback hosts are exempt so tests can point at a
/// local mock server.
fn ensure_https(url: &reqwest::Url) -> Result<()> {
    if url.scheme() == "https" {
        return Ok(());
    }
    let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    if url.scheme() == "http" && loopback {
        return Ok(());
    }
    Err(GraphError::ConfigInvalid(format!(
        "insecure URL not permitted: {url}"
    )))
}

/// Resolved client identity. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub client_id: String,
    pub variant: AuthVariant,
}

/// Which client-credentials variant the token provider will use.
#[derive(Debug, Clone)]
pub enum AuthVariant {
    /// Shared secret posted directly to the token endpoint.
    Secret(String),
    /// Private-key JWT assertion signed with the certificate's key.
    Certificate {
        cert_path: PathBuf,
        /// Separate key file; falls back to `cert_path` when absent.
        key_path: Option<PathBuf>,
        /// SHA-1 thumbprint carried in the assertion's `x5t` header.
        thumbprint: Option<String>,
    },
}

impl Identity {
    /// Choose the authentication variant from the configured material.
    /// Secret wins over certificate when both are supplied.
    pub fn resolve(config: &ClientConfig) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(GraphError::ConfigInvalid(
                "clientId must not be empty".to_string(),
            ));
        }
        if config.tenant_id.is_empty() {
            return Err(GraphError::ConfigInvalid(
                "tenantId must not be empty".to_string(),
            ));
        }

        let variant = if let Some(secret) = config.client_secret.as_ref().filter(|s| !s.is_empty())
        {
            AuthVariant::Secret(secret.clone())
        } else if let Some(cert) = config.certificate_path.clone() {
            AuthVariant::Certificate {
                cert_path: cert,
                key_path: config.certificate_key_path.clone(),
                thumbprint: config.cert_thumbprint.clone(),
            }
        } else {
            return Err(GraphError::ConfigInvalid(
                "either clientSecret or certificatePath is required".to_string(),
            ));
        };

        Ok(Self {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            variant,
        })
    }
}

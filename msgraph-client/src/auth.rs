//! OAuth2 client-credentials token lifecycle
//!
//! Acquires bearer tokens from the Microsoft identity platform's
//! `/oauth2/v2.0/token` endpoint and caches them until they approach
//! expiry. Two grant variants: a shared client secret posted directly, or
//! a certificate identity proven with an RS256-signed JWT assertion.
//!
//! Refreshes for one identity are serialized: the first caller to find the
//! cache stale performs the refresh under a mutex while concurrent callers
//! wait on the same lock and then reuse the freshly published token, so N
//! simultaneous expiry discoveries produce exactly one token-endpoint
//! call. Readers take an `ArcSwap` snapshot; a token handed out stays
//! valid for its holder even after a replacement is published.

use crate::config::{AuthVariant, Identity};
use crate::context::RequestContext;
use crate::error::{GraphError, Result};
use crate::resilience::logging::ApiLogger;
use crate::resilience::metrics::MetricsLedger;
use crate::time::{Clock, SystemClock};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Validity window stamped into certificate assertions. Short-lived on
/// purpose: the assertion only has to survive the token request itself.
const ASSERTION_LIFETIME: Duration = Duration::from_secs(300);

/// Connect/overall timeouts for token requests. These are small form posts;
/// anything slower than this is an outage, not a slow response.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An issued bearer token. Never mutated; refresh publishes a replacement.
#[derive(Debug)]
pub struct Token {
    access_token: String,
    issued_at: Instant,
    expires_at: Instant,
    issued_wall: DateTime<Utc>,
    scope: String,
}

impl Token {
    /// The opaque credential for the `Authorization` header.
    pub fn bearer(&self) -> &str {
        &self.access_token
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn issued_at_wall(&self) -> DateTime<Utc> {
        self.issued_wall
    }

    /// Total issued lifetime; strictly positive by construction.
    pub fn lifetime(&self) -> Duration {
        self.expires_at.duration_since(self.issued_at)
    }

    /// Lifetime left at `now`, zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Usable without refresh: at least `buffer` of lifetime remains.
    pub fn is_fresh(&self, now: Instant, buffer: Duration) -> bool {
        self.remaining(now) > buffer
    }
}

/// Token-endpoint parameters decoupled from the full client configuration.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Identity provider base, e.g. `https://login.microsoftonline.com`.
    pub authority: String,
    /// Scope requested for the token, e.g.
    /// `https://graph.microsoft.com/.default`.
    pub scope: String,
    /// Assumed lifetime when the endpoint omits `expires_in`.
    pub lifespan: Duration,
    /// Tokens within this buffer of expiry refresh before use.
    pub refresh_buffer: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            scope: "https://graph.microsoft.com/.default".to_string(),
            lifespan: Duration::from_secs(30 * 60),
            refresh_buffer: Duration::from_secs(5 * 60),
        }
    }
}

/// Subset of the token response we consume. Extra fields (e.g.
/// `ext_expires_in`) are ignored by serde.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Claims of the certificate-variant client assertion.
#[derive(Debug, Serialize)]
struct AssertionClaims {
    aud: String,
    iss: String,
    sub: String,
    jti: String,
    iat: i64,
    nbf: i64,
    exp: i64,
}

impl AssertionClaims {
    fn new(client_id: &str, audience: &str, now: DateTime<Utc>) -> Self {
        Self {
            aud: audience.to_string(),
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME.as_secs() as i64,
        }
    }
}

/// Header of the certificate-variant client assertion: RS256 with the
/// certificate thumbprint in `x5t` so the identity provider can locate the
/// registered public key.
fn assertion_header(thumbprint: Option<&str>) -> Header {
    let mut header = Header::new(Algorithm::RS256);
    header.x5t = thumbprint.map(str::to_string);
    header
}

/// Acquires and refreshes bearer tokens for one identity.
pub struct TokenProvider {
    http: reqwest::Client,
    identity: Identity,
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
    token: ArcSwapOption<Token>,
    refresh: Mutex<()>,
    metrics: Arc<MetricsLedger>,
    logger: ApiLogger,
}

impl TokenProvider {
    pub fn new(
        identity: Identity,
        settings: TokenSettings,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsLedger>,
        logger: ApiLogger,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GraphError::ConfigInvalid(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            identity,
            settings,
            clock,
            token: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            metrics,
            logger,
        })
    }

    /// Provider primed with a fixed token, bypassing the identity
    /// provider. For tests that exercise the pipeline without a token
    /// endpoint; the token is treated as freshly issued for one hour.
    pub fn with_static_token(token: &str) -> Self {
        let now = Instant::now();
        let provider = Self {
            http: reqwest::Client::new(),
            identity: Identity {
                tenant_id: "static".to_string(),
                client_id: "static".to_string(),
                variant: AuthVariant::Secret(String::new()),
            },
            settings: TokenSettings::default(),
            clock: Arc::new(SystemClock),
            token: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            metrics: Arc::new(MetricsLedger::new()),
            logger: ApiLogger::disabled(),
        };
        provider.token.store(Some(Arc::new(Token {
            access_token: token.to_string(),
            issued_at: now,
            expires_at: now + Duration::from_secs(3600),
            issued_wall: Utc::now(),
            scope: provider.settings.scope.clone(),
        })));
        provider
    }

    /// Return a token with at least the refresh buffer of lifetime left,
    /// refreshing first when the cache is absent or stale.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<Arc<Token>> {
        let wait_started = Instant::now();

        if let Some(token) = self.fresh_snapshot() {
            return Ok(token);
        }

        let _serialized = ctx.run(self.refresh.lock()).await?;

        // A concurrent caller may have refreshed while we waited for the
        // lock; reuse its result instead of hitting the endpoint again.
        if let Some(token) = self.fresh_snapshot() {
            self.metrics.record_token_wait(wait_started.elapsed());
            return Ok(token);
        }

        let token = self.request_token(ctx).await?;
        self.token.store(Some(Arc::clone(&token)));
        self.metrics.record_token_wait(wait_started.elapsed());
        self.logger.info(
            "token refreshed",
            &[
                ("tenant", self.identity.tenant_id.clone()),
                (
                    "expires_in_secs",
                    token.remaining(self.clock.instant()).as_secs().to_string(),
                ),
            ],
        );
        Ok(token)
    }

    /// Discard the cached token and fetch a new one. Used when the
    /// resource API rejects a token before local expiry tracking noticed
    /// (revocation, clock skew).
    pub async fn force_refresh(&self, ctx: &RequestContext) -> Result<Arc<Token>> {
        let _serialized = ctx.run(self.refresh.lock()).await?;
        self.token.store(None);
        let token = self.request_token(ctx).await?;
        self.token.store(Some(Arc::clone(&token)));
        self.logger.info(
            "token force-refreshed after server-side rejection",
            &[("tenant", self.identity.tenant_id.clone())],
        );
        Ok(token)
    }

    fn fresh_snapshot(&self) -> Option<Arc<Token>> {
        let token = self.token.load_full()?;
        token
            .is_fresh(self.clock.instant(), self.settings.refresh_buffer)
            .then_some(token)
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.settings.authority.trim_end_matches('/'),
            self.identity.tenant_id
        )
    }

    async fn request_token(&self, ctx: &RequestContext) -> Result<Arc<Token>> {
        let endpoint = self.token_endpoint();
        let params = self.grant_params(&endpoint)?;

        let response = ctx
            .run(self.http.post(&endpoint).form(&params).send())
            .await?
            .map_err(|e| GraphError::AuthFailed {
                status: None,
                body: format!("token endpoint unreachable: {e}"),
            })?;

        // Read the body before branching on status so AADSTS diagnostics
        // survive into the error.
        let status = response.status();
        let body = ctx
            .run(response.text())
            .await?
            .map_err(|e| GraphError::AuthFailed {
                status: Some(status),
                body: format!("failed to read token response: {e}"),
            })?;

        if !status.is_success() {
            return Err(GraphError::AuthFailed {
                status: Some(status),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            GraphError::AuthFailed {
                status: Some(status),
                body: format!("unparseable token response: {e}"),
            }
        })?;

        let lifetime = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(self.settings.lifespan);
        if lifetime.is_zero() {
            return Err(GraphError::AuthFailed {
                status: Some(status),
                body: "token endpoint returned a non-positive expires_in".to_string(),
            });
        }

        let now = self.clock.instant();
        Ok(Arc::new(Token {
            access_token: parsed.access_token,
            issued_at: now,
            expires_at: now + lifetime,
            issued_wall: self.clock.wall(),
            scope: parsed.scope.unwrap_or_else(|| self.settings.scope.clone()),
        }))
    }

    fn grant_params(&self, endpoint: &str) -> Result<Vec<(&'static str, String)>> {
        let mut params = vec![
            ("client_id", self.identity.client_id.clone()),
            ("scope", self.settings.scope.clone()),
            ("grant_type", "client_credentials".to_string()),
        ];

        match &self.identity.variant {
            AuthVariant::Secret(secret) => {
                params.push(("client_secret", secret.clone()));
            }
            AuthVariant::Certificate {
                cert_path,
                key_path,
                thumbprint,
            } => {
                let assertion = self.build_assertion(
                    cert_path,
                    key_path.as_deref(),
                    thumbprint.as_deref(),
                    endpoint,
                )?;
                params.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
                params.push(("client_assertion", assertion));
            }
        }

        Ok(params)
    }

    fn build_assertion(
        &self,
        cert_path: &Path,
        key_path: Option<&Path>,
        thumbprint: Option<&str>,
        audience: &str,
    ) -> Result<String> {
        let key_file: PathBuf = key_path.unwrap_or(cert_path).to_path_buf();
        let pem = std::fs::read(&key_file).map_err(|e| {
            GraphError::ConfigInvalid(format!(
                "cannot read private key {}: {e}",
                key_file.display()
            ))
        })?;
        let key = EncodingKey::from_rsa_pem(&pem).map_err(|e| {
            GraphError::ConfigInvalid(format!(
                "invalid RSA private key {}: {e}",
                key_file.display()
            ))
        })?;

        let header = assertion_header(thumbprint);
        let claims = AssertionClaims::new(&self.identity.client_id, audience, self.clock.wall());

        jsonwebtoken::encode(&header, &claims, &key).map_err(|e| GraphError::AuthFailed {
            status: None,
            body: format!("failed to sign client assertion: {e}"),
        })
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("tenant_id", &self.identity.tenant_id)
            .field("client_id", &self.identity.client_id)
            .field("endpoint", &self.token_endpoint())
            .finish_non_exhaustive()
    }
}

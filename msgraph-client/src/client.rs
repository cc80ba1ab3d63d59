//! Authenticated request pipeline
//!
//! `GraphClient` owns the token provider, concurrency governor, metrics
//! ledger, and logger, and drives every outbound call through the same
//! sequence: compose URL, acquire token, acquire permit, dispatch with a
//! per-attempt timeout, classify the outcome, retry under the configured
//! budgets, decode. Endpoint wrappers hold a shared reference and only ever
//! see a decoded value or a classified [`GraphError`].

use crate::auth::{TokenProvider, TokenSettings};
use crate::config::{ClientConfig, Identity};
use crate::context::RequestContext;
use crate::error::{GraphError, Result};
use crate::odata::{ErrorResponse, ListResponse};
use crate::resilience::governor::{ConcurrencyGovernor, GovernorConfig};
use crate::resilience::logging::ApiLogger;
use crate::resilience::metrics::{MetricsLedger, MetricsSnapshot};
use crate::resilience::retry::{self, RetryConfig};
use crate::time::{Clock, SystemClock};
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// `User-Agent` sent on every request; the version is stamped at build
/// time from the crate manifest.
pub const SDK_USER_AGENT: &str = concat!("msgraph-client/", env!("CARGO_PKG_VERSION"));

/// Per-attempt ceiling; a tighter context deadline wins.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout covering TCP + TLS establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated, concurrency-governed HTTP client core.
#[derive(Debug)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Arc<TokenProvider>,
    governor: Arc<ConcurrencyGovernor>,
    metrics: Arc<MetricsLedger>,
    logger: ApiLogger,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl GraphClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Construct with an explicit clock, letting tests drive token expiry.
    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let identity = Identity::resolve(&config)?;

        let logger = ApiLogger::new(config.log_level);
        let metrics = Arc::new(MetricsLedger::new());

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| GraphError::ConfigInvalid(format!("invalid base URL: {e}")))?;

        let auth = Arc::new(TokenProvider::new(
            identity,
            TokenSettings {
                authority: config.authority.clone(),
                scope: derive_scope(&base_url),
                lifespan: config.token_lifespan,
                refresh_buffer: config.token_refresh_buffer,
            },
            clock,
            Arc::clone(&metrics),
            logger.clone(),
        )?);

        let governor = ConcurrencyGovernor::new(
            GovernorConfig {
                max_permits: config.max_concurrent_requests,
                dynamic: config.enable_dynamic_rate_limiting,
                ..GovernorConfig::default()
            },
            Arc::clone(&metrics),
            logger.clone(),
        );
        let shutdown = CancellationToken::new();
        governor.spawn_control_loop(shutdown.child_token());

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GraphError::ConfigInvalid(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            auth,
            governor,
            metrics,
            logger,
            retry: RetryConfig {
                max_retries: config.max_retry_attempts,
                total_retry_duration: config.total_retry_duration,
                ..RetryConfig::default()
            },
            shutdown,
        })
    }

    /// Point-in-time copy of the request counters and durations.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The admission governor, exposed for observation.
    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET a single resource and decode it.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, ctx: &RequestContext) -> Result<T> {
        let url = self.absolute_url(path)?;
        let (_, _, body) = self.dispatch(Method::GET, url, None, ctx).await?;
        decode_slice("response body", &body)
    }

    /// Enumerate a collection fully, following `@odata.nextLink`
    /// continuations. Items arrive in server order; next links are
    /// absolute URLs minted by the server and are followed verbatim.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<T>> {
        let mut url = self.absolute_url(path)?;
        let mut items = Vec::new();
        loop {
            let (_, _, body) = self.dispatch(Method::GET, url, None, ctx).await?;
            let page: ListResponse<T> = decode_slice("collection page", &body)?;
            items.extend(page.value);
            match page.next_link {
                Some(next) => {
                    url = Url::parse(&next).map_err(|e| GraphError::Decode {
                        detail: format!("invalid @odata.nextLink {next}: {e}"),
                        source: None,
                    })?;
                }
                None => break,
            }
        }
        Ok(items)
    }

    /// POST a JSON body and decode the response.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        ctx: &RequestContext,
    ) -> Result<T> {
        let url = self.absolute_url(path)?;
        let payload = encode_body(body)?;
        let (_, _, bytes) = self.dispatch(Method::POST, url, Some(payload), ctx).await?;
        decode_slice("response body", &bytes)
    }

    /// POST for endpoints that answer 204 with no body (actions).
    pub async fn post_no_content<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        ctx: &RequestContext,
    ) -> Result<()> {
        let url = self.absolute_url(path)?;
        let payload = encode_body(body)?;
        self.dispatch(Method::POST, url, Some(payload), ctx).await?;
        Ok(())
    }

    /// PATCH a JSON body; Graph answers 204 for most updates.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        ctx: &RequestContext,
    ) -> Result<()> {
        let url = self.absolute_url(path)?;
        let payload = encode_body(body)?;
        self.dispatch(Method::PATCH, url, Some(payload), ctx).await?;
        Ok(())
    }

    /// PUT a JSON body and decode the response.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        ctx: &RequestContext,
    ) -> Result<T> {
        let url = self.absolute_url(path)?;
        let payload = encode_body(body)?;
        let (_, _, bytes) = self.dispatch(Method::PUT, url, Some(payload), ctx).await?;
        decode_slice("response body", &bytes)
    }

    pub async fn delete(&self, path: &str, ctx: &RequestContext) -> Result<()> {
        let url = self.absolute_url(path)?;
        self.dispatch(Method::DELETE, url, None, ctx).await?;
        Ok(())
    }

    /// Escape hatch for callers that already hold serialized bytes (or
    /// want the raw response): the body passes through untouched and the
    /// response body comes back undecoded.
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        ctx: &RequestContext,
    ) -> Result<Vec<u8>> {
        let url = self.absolute_url(path)?;
        let (_, _, bytes) = self.dispatch(method, url, body, ctx).await?;
        Ok(bytes)
    }

    /// Join a relative path onto the configured base. Absolute URLs are
    /// rejected here; only server-minted next links may leave the base,
    /// and those are followed inside `get_all`.
    fn absolute_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Err(GraphError::ConfigInvalid(format!(
                "request path must be relative to the configured base: {path}"
            )));
        }
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| GraphError::ConfigInvalid(format!("invalid request path {path}: {e}")))
    }

    fn attempt_timeout(&self, ctx: &RequestContext) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining
                .min(DEFAULT_ATTEMPT_TIMEOUT)
                .max(Duration::from_millis(1)),
            None => DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Delay before the next retry, or `None` once either budget (attempt
    /// count or total duration) would be overrun. Computed once so the
    /// jittered value checked against the budget is the value slept.
    fn retry_delay(
        &self,
        attempts: u32,
        started: Instant,
        hint: Option<Duration>,
    ) -> Option<Duration> {
        if attempts > self.retry.max_retries {
            return None;
        }
        let delay = self.retry.delay(attempts, hint);
        if started.elapsed() + delay > self.retry.total_retry_duration {
            return None;
        }
        Some(delay)
    }

    fn status_retry_allowed(&self, method: &Method, status: StatusCode, body: &[u8]) -> bool {
        if !retry::is_retriable_status(status) {
            return false;
        }
        if retry::method_is_idempotent(method) {
            true
        } else {
            retry::non_idempotent_status_retry(status, body)
        }
    }

    /// One logical call: dispatch with retry until success, a fatal
    /// classification, or budget exhaustion. Returns the raw success
    /// status, headers, and body.
    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        ctx: &RequestContext,
    ) -> Result<(StatusCode, HeaderMap, Vec<u8>)> {
        let started = Instant::now();
        let correlation = Uuid::new_v4().to_string();
        let mut attempts: u32 = 0;
        let mut refreshed_auth = false;

        loop {
            attempts += 1;

            let token = self
                .auth
                .acquire(ctx)
                .await
                .map_err(|e| e.with_attempts(attempts))?;
            let permit = self
                .governor
                .acquire(ctx)
                .await
                .map_err(|e| e.with_attempts(attempts))?;

            let attempt_started = Instant::now();
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .timeout(self.attempt_timeout(ctx))
                .header(AUTHORIZATION, format!("Bearer {}", token.bearer()))
                .header(ACCEPT, "application/json")
                .header(USER_AGENT, SDK_USER_AGENT)
                .header("client-request-id", correlation.clone());
            if let Some(bytes) = &body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(bytes.clone());
            }

            let sent = match ctx.run(request.send()).await {
                Ok(outcome) => outcome,
                Err(ctx_err) => {
                    drop(permit);
                    return Err(ctx_err.with_attempts(attempts));
                }
            };

            let response = match sent {
                Ok(response) => response,
                Err(transport_err) => {
                    drop(permit);
                    self.metrics
                        .record_attempt(attempt_started.elapsed(), false, attempts > 1);
                    if retry::transport_retriable(&method, &transport_err) {
                        if let Some(delay) = self.retry_delay(attempts, started, None) {
                            self.logger.debug(
                                "retrying after transport error",
                                &[
                                    ("error", transport_err.to_string()),
                                    ("delay_ms", delay.as_millis().to_string()),
                                ],
                            );
                            self.metrics.record_retry();
                            ctx.run(tokio::time::sleep(delay))
                                .await
                                .map_err(|e| e.with_attempts(attempts))?;
                            continue;
                        }
                    }
                    return Err(GraphError::Transport {
                        source: transport_err,
                        attempts,
                    });
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            let read = match ctx.run(response.bytes()).await {
                Ok(outcome) => outcome,
                Err(ctx_err) => {
                    drop(permit);
                    return Err(ctx_err.with_attempts(attempts));
                }
            };
            drop(permit);

            let bytes = match read {
                Ok(bytes) => bytes.to_vec(),
                Err(read_err) => {
                    self.metrics
                        .record_attempt(attempt_started.elapsed(), false, attempts > 1);
                    if retry::transport_retriable(&method, &read_err) {
                        if let Some(delay) = self.retry_delay(attempts, started, None) {
                            self.metrics.record_retry();
                            ctx.run(tokio::time::sleep(delay))
                                .await
                                .map_err(|e| e.with_attempts(attempts))?;
                            continue;
                        }
                    }
                    return Err(GraphError::Transport {
                        source: read_err,
                        attempts,
                    });
                }
            };

            let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
            self.metrics
                .record_attempt(attempt_started.elapsed(), rate_limited, attempts > 1);
            if rate_limited {
                self.metrics.record_rate_limit();
            }

            if let Some(deprecation) = headers.get("deprecation").and_then(|v| v.to_str().ok()) {
                self.logger.warn(
                    "endpoint is deprecated",
                    &[
                        ("deprecation", deprecation.to_string()),
                        ("path", url.path().to_string()),
                    ],
                );
            }

            if status.is_success() {
                self.logger.debug(
                    "request completed",
                    &[
                        ("method", method.to_string()),
                        ("path", url.path().to_string()),
                        ("status", status.as_u16().to_string()),
                        ("attempts", attempts.to_string()),
                    ],
                );
                return Ok((status, headers, bytes));
            }

            if status == StatusCode::UNAUTHORIZED {
                // Strictly one refresh-and-retry: a second 401 means the
                // credentials are expired or revoked, not merely stale.
                if refreshed_auth {
                    return Err(GraphError::AuthFailed {
                        status: Some(status),
                        body: String::from_utf8_lossy(&bytes).into_owned(),
                    });
                }
                refreshed_auth = true;
                self.auth
                    .force_refresh(ctx)
                    .await
                    .map_err(|e| e.with_attempts(attempts))?;
                self.logger
                    .debug("token rejected, retrying once after refresh", &[]);
                continue;
            }

            if self.status_retry_allowed(&method, status, &bytes) {
                let hint = retry::parse_retry_after(&headers, Utc::now());
                if let Some(delay) = self.retry_delay(attempts, started, hint) {
                    self.logger.debug(
                        "retrying after server status",
                        &[
                            ("status", status.as_u16().to_string()),
                            ("delay_ms", delay.as_millis().to_string()),
                        ],
                    );
                    self.metrics.record_retry();
                    ctx.run(tokio::time::sleep(delay))
                        .await
                        .map_err(|e| e.with_attempts(attempts))?;
                    continue;
                }
            }

            return Err(self.terminal_error(status, &headers, &bytes, attempts, started));
        }
    }

    fn terminal_error(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        attempts: u32,
        started: Instant,
    ) -> GraphError {
        let parsed = ErrorResponse::from_bytes(body);
        let request_id = parsed
            .as_ref()
            .and_then(|p| p.request_id().map(str::to_string))
            .or_else(|| {
                headers
                    .get("request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            });
        let code = parsed.as_ref().and_then(|p| p.error.code.clone());
        let message = parsed
            .as_ref()
            .and_then(|p| p.error.message.clone())
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

        if status == StatusCode::TOO_MANY_REQUESTS {
            GraphError::Throttled {
                status,
                retry_after: retry::parse_retry_after(headers, Utc::now()),
                request_id,
                attempts,
            }
        } else if status == StatusCode::REQUEST_TIMEOUT {
            GraphError::Timeout {
                elapsed: started.elapsed(),
                attempts,
            }
        } else if status.is_server_error() {
            GraphError::Server {
                status,
                code,
                message,
                request_id,
                attempts,
            }
        } else {
            GraphError::Client {
                status,
                code,
                message,
                request_id,
                attempts,
            }
        }
    }
}

impl Drop for GraphClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Token scope for a resource base: its origin plus `/.default`.
fn derive_scope(base: &Url) -> String {
    format!("{}/.default", base.origin().ascii_serialization())
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>> {
    serde_json::to_vec(body)
        .map_err(|e| GraphError::ConfigInvalid(format!("unserializable request body: {e}")))
}

fn decode_slice<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| GraphError::decode(what, e))
}

//! Typed error hierarchy for the client core.
//!
//! `GraphError` replaces a `Box<dyn Error>` convention with a structured enum
//! that preserves diagnostic context at each failure boundary. Every variant
//! carries enough information for callers to:
//! - Distinguish the failure category (config, auth, throttling, server,
//!   client, decode, transport, cancellation, timeout).
//! - See the server-supplied OData error code/message and correlation id
//!   where the response carried one.
//! - Know how many attempts the pipeline consumed before giving up.
//!
//! Deprecation headers are logged at warn level by the pipeline and are
//! never converted into errors.

use reqwest::StatusCode;
use std::time::Duration;

/// Unified error type for all client operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Bad configuration supplied by the caller. Fatal at construction or
    /// call time; nothing was sent on the wire.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The token endpoint returned a non-2xx response or an unparseable
    /// body, or the resource API rejected a freshly refreshed token.
    /// The `body` field preserves the identity provider's diagnostic
    /// payload (AADSTS codes) verbatim.
    #[error("authentication failed{}: {body}", fmt_status(.status))]
    AuthFailed {
        /// HTTP status from the token endpoint, when one was received.
        status: Option<StatusCode>,
        /// Raw response body, kept for its AADSTS diagnostics.
        body: String,
    },

    /// The caller's context was cancelled while the call was suspended
    /// (permit wait, token wait, transport, or backoff sleep).
    #[error("request cancelled")]
    Cancelled,

    /// The per-call deadline elapsed, or the server kept answering 408
    /// until the retry budget ran out.
    #[error("timed out after {elapsed:?} ({attempts} attempts)")]
    Timeout { elapsed: Duration, attempts: u32 },

    /// The server asked the client to slow down (429) and the retry budget
    /// was exhausted before a successful attempt.
    #[error("throttled by server after {attempts} attempts")]
    Throttled {
        status: StatusCode,
        /// Server-provided retry hint, when the response carried one.
        retry_after: Option<Duration>,
        request_id: Option<String>,
        attempts: u32,
    },

    /// Upstream 5xx that survived the retry budget.
    #[error("server error {status} after {attempts} attempts: {message}")]
    Server {
        status: StatusCode,
        /// OData error code from the response body, e.g. "InternalServerError".
        code: Option<String>,
        message: String,
        request_id: Option<String>,
        attempts: u32,
    },

    /// Non-retriable 4xx. The request as constructed will never succeed.
    #[error("client error {status}: {message}")]
    Client {
        status: StatusCode,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
        attempts: u32,
    },

    /// A success body did not match the requested target shape. Never
    /// retried: a schema mismatch is not a transient fault.
    #[error("failed to decode response: {detail}")]
    Decode {
        /// What was being decoded plus the serde position (line/column).
        detail: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Connectivity-level failure (DNS, connect, reset, per-attempt
    /// timeout) after retry exhaustion.
    #[error("transport error after {attempts} attempts: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
        attempts: u32,
    },
}

fn fmt_status(status: &Option<StatusCode>) -> String {
    match status {
        Some(s) => format!(" ({})", s),
        None => String::new(),
    }
}

impl GraphError {
    /// HTTP status associated with the failure, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthFailed { status, .. } => *status,
            Self::Throttled { status, .. }
            | Self::Server { status, .. }
            | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Correlation id extracted from the response, when present.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Throttled { request_id, .. }
            | Self::Server { request_id, .. }
            | Self::Client { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Number of attempts the pipeline consumed before surfacing this error.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. }
            | Self::Throttled { attempts, .. }
            | Self::Server { attempts, .. }
            | Self::Client { attempts, .. }
            | Self::Transport { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Annotate an error produced below the pipeline (context, governor)
    /// with the attempt count of the call it interrupted.
    pub(crate) fn with_attempts(mut self, n: u32) -> Self {
        match &mut self {
            Self::Timeout { attempts, .. }
            | Self::Throttled { attempts, .. }
            | Self::Server { attempts, .. }
            | Self::Client { attempts, .. }
            | Self::Transport { attempts, .. } => *attempts = n,
            _ => {}
        }
        self
    }

    /// Build a `Decode` error from a serde failure, keeping the position.
    pub(crate) fn decode(what: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            detail: format!(
                "{} at line {} column {}",
                what,
                source.line(),
                source.column()
            ),
            source: Some(source),
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;

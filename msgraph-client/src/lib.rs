//! Authenticated, concurrency-governed client core for the Microsoft Graph
//! device-management APIs.
//!
//! Endpoint wrappers sit on one contract: given a method, a relative path,
//! an optional body, and a decode target, [`GraphClient`] returns either the
//! decoded response or a classified [`GraphError`]. Everything between is
//! handled here: OAuth2 client-credentials tokens (secret or certificate
//! assertion), an adaptive admission semaphore, retry with bounded budgets
//! and `Retry-After` handling, pagination, and structured error decoding.
//!
//! # Modules
//!
//! - [`auth`] — token acquisition and proactive refresh, serialized per identity.
//! - [`client`] — the request pipeline and typed helpers.
//! - [`config`] — configuration, credentials file, environment overrides.
//! - [`context`] — per-call deadline and cancellation scope.
//! - [`error`] — classified error hierarchy.
//! - [`odata`] — collection envelopes, error bodies, dynamic values.
//! - [`resilience`] — governor, retry policy, metrics, leveled logging.
//! - [`time`] — clock abstraction for deterministic tests.
//!
//! # Quick start
//!
//! ```ignore
//! use msgraph_client::{ClientConfig, GraphClient, RequestContext};
//!
//! let config = ClientConfig::from_credentials_file("credentials.json")?;
//! let client = GraphClient::new(config)?;
//! let ctx = RequestContext::new();
//! let devices: Vec<serde_json::Value> = client
//!     .get_all("/deviceManagement/managedDevices", &ctx)
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod odata;
pub mod resilience;
pub mod time;

pub use auth::{Token, TokenProvider, TokenSettings};
pub use client::{GraphClient, SDK_USER_AGENT};
pub use config::{AuthVariant, ClientConfig, CredentialsFile, Identity};
pub use context::RequestContext;
pub use error::{GraphError, Result};
pub use odata::{DynamicValue, ErrorResponse, ListResponse, Payload};
pub use resilience::{
    ApiLogger, ConcurrencyGovernor, ControlState, GovernorConfig, LogLevel, MetricsLedger,
    MetricsSnapshot, RetryConfig, WindowStats,
};
pub use time::{Clock, ManualClock, SystemClock};

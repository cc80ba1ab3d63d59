//! Production resilience features
//!
//! Retry policies, adaptive concurrency admission, metrics, and structured
//! logging for the request pipeline.

pub mod governor;
pub mod logging;
pub mod metrics;
pub mod retry;

pub use governor::{ConcurrencyGovernor, ControlState, GovernorAdjustment, GovernorConfig};
pub use logging::{ApiLogger, LogLevel};
pub use metrics::{MetricsLedger, MetricsSnapshot, WindowStats};
pub use retry::RetryConfig;

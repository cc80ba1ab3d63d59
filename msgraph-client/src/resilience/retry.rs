//! Outcome classification and backoff schedule
//!
//! Completed attempts are classified into success / retriable / fatal.
//! Retriable outcomes sleep on an exponential schedule with jitter unless
//! the server supplied a `Retry-After` hint, which is used exactly (never
//! shortened). Two budgets bound every logical call: a retry count and a
//! total wall-clock duration; the pipeline stops as soon as the next sleep
//! would overrun either.

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Method, StatusCode};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

use crate::odata::ErrorResponse;

/// Retry behavior knobs. Defaults follow the client configuration surface:
/// up to 3 retries within a 60 second budget, 500 ms exponential base
/// doubling to a 30 second ceiling.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Cumulative wall-clock budget for one logical call.
    pub total_retry_duration: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            total_retry_duration: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based). A server hint wins
    /// outright; otherwise exponential backoff with optional jitter in
    /// `[d/2, d]` to decorrelate concurrent callers.
    pub fn delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        if let Some(hinted) = hint {
            return hinted;
        }

        let exponent = retry.saturating_sub(1).min(31);
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let final_secs = if self.jitter {
            capped * rand::rng().random_range(0.5..=1.0)
        } else {
            capped
        };
        Duration::from_secs_f64(final_secs)
    }
}

/// Statuses worth another attempt for idempotent methods.
pub fn is_retriable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::REQUEST_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Idempotent methods may always retry retriable statuses.
pub fn method_is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE
    )
}

/// Whether a non-idempotent request may retry this HTTP outcome.
///
/// POST retries are confined to 429/503 responses whose body parses as the
/// structured OData error envelope; an ambiguous body could mean the server
/// acted on the request before failing.
pub fn non_idempotent_status_retry(status: StatusCode, body: &[u8]) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    ) && ErrorResponse::from_bytes(body).is_some()
}

/// Whether a transport failure is retriable for the given method.
///
/// Idempotent methods retry any connectivity-level failure. Others retry
/// only when the connection was never established, so no request byte can
/// have been accepted.
pub fn transport_retriable(method: &Method, err: &reqwest::Error) -> bool {
    if method_is_idempotent(method) {
        err.is_connect() || err.is_timeout() || err.is_request()
    } else {
        err.is_connect()
    }
}

/// Parse a `Retry-After` header: either delay-seconds or an HTTP-date.
/// Dates already in the past collapse to zero.
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?;
    let delta = at.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retriable_statuses_match_policy() {
        for code in [408u16, 429, 500, 502, 503, 504] {
            assert!(
                is_retriable_status(StatusCode::from_u16(code).unwrap()),
                "{code} should be retriable"
            );
        }
        for code in [400u16, 401, 403, 404, 409, 501] {
            assert!(
                !is_retriable_status(StatusCode::from_u16(code).unwrap()),
                "{code} should be fatal"
            );
        }
    }

    #[test]
    fn idempotent_methods_only() {
        assert!(method_is_idempotent(&Method::GET));
        assert!(method_is_idempotent(&Method::DELETE));
        assert!(!method_is_idempotent(&Method::POST));
        assert!(!method_is_idempotent(&Method::PATCH));
    }

    #[test]
    fn post_retry_needs_structured_body() {
        let structured = br#"{"error":{"code":"TooManyRequests","message":"m"}}"#;
        assert!(non_idempotent_status_retry(
            StatusCode::TOO_MANY_REQUESTS,
            structured
        ));
        assert!(non_idempotent_status_retry(
            StatusCode::SERVICE_UNAVAILABLE,
            structured
        ));
        // Ambiguous body: server may have acted on the request.
        assert!(!non_idempotent_status_retry(
            StatusCode::TOO_MANY_REQUESTS,
            b"<html>busy</html>"
        ));
        // 500 is never POST-retriable, structured or not.
        assert!(!non_idempotent_status_retry(
            StatusCode::INTERNAL_SERVER_ERROR,
            structured
        ));
    }

    #[test]
    fn retry_after_seconds_form() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        assert_eq!(
            parse_retry_after(&headers, Utc::now()),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn retry_after_http_date_form() {
        let now = DateTime::parse_from_rfc2822("Wed, 11 Nov 2026 00:00:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 11 Nov 2026 00:00:30 GMT"),
        );
        assert_eq!(
            parse_retry_after(&headers, now),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn retry_after_past_date_is_zero() {
        let now = DateTime::parse_from_rfc2822("Wed, 11 Nov 2026 00:01:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 11 Nov 2026 00:00:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers, now), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_absent_or_garbage_is_none() {
        assert_eq!(parse_retry_after(&HeaderMap::new(), Utc::now()), None);

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, Utc::now()), None);
    }

    #[test]
    fn server_hint_is_used_exactly() {
        let config = RetryConfig::default();
        assert_eq!(
            config.delay(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn backoff_grows_exponentially_without_jitter() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay(1, None), Duration::from_millis(500));
        assert_eq!(config.delay(2, None), Duration::from_millis(1000));
        assert_eq!(config.delay(3, None), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay(30, None), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let d = config.delay(2, None);
            assert!(d >= Duration::from_millis(500), "{d:?} below half");
            assert!(d <= Duration::from_millis(1000), "{d:?} above full");
        }
    }
}

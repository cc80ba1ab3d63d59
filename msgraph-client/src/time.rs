//! Clock abstraction for token expiry and backoff accounting
//!
//! Token lifetimes are tracked against monotonic time so that wall-clock
//! adjustments never invalidate (or resurrect) a cached token. Wall time is
//! only used where the wire format demands it: JWT `iat`/`exp` claims.
//! Tests swap in [`ManualClock`] to drive expiry deterministically.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic and wall time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic reading, used for expiry and elapsed-time math.
    fn instant(&self) -> Instant;

    /// Wall-clock reading, used for JWT claims and log correlation.
    fn wall(&self) -> DateTime<Utc>;
}

/// Default clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn instant(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
///
/// Starts at the construction-time instant and only moves when `advance`
/// is called. Wall time moves in lockstep with the monotonic reading.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    instant: Instant,
    wall: DateTime<Utc>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                instant: Instant::now(),
                wall: Utc::now(),
            }),
        }
    }

    /// Move both readings forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut state = self.state.lock().unwrap();
        state.instant += delta;
        state.wall += chrono::Duration::from_std(delta).unwrap_or(chrono::Duration::zero());
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn instant(&self) -> Instant {
        self.state.lock().unwrap().instant
    }

    fn wall(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().wall
    }
}

//! Adaptive admission control for in-flight requests
//!
//! A FIFO semaphore bounds concurrent dispatches. When dynamic rate
//! limiting is enabled, a background control loop revises the permit count
//! from observed metrics every evaluation interval: sustained rate-limit
//! errors or high latency shrink the pool multiplicatively, a healthy
//! window grows it back toward the configured maximum. With the feature
//! disabled the loop still ticks but never changes the limit, keeping
//! behavior deterministic.

use crate::context::RequestContext;
use crate::error::{GraphError, Result};
use crate::resilience::logging::ApiLogger;
use crate::resilience::metrics::{MetricsLedger, WindowStats};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Governor tuning. Defaults mirror the client configuration surface:
/// 5 permits, dynamic adjustment off, 30 second evaluation interval.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Configured ceiling; also the starting permit count.
    pub max_permits: usize,
    /// When false, the control loop runs but never changes the limit.
    pub dynamic: bool,
    pub evaluation_interval: Duration,
    /// Rate-limit-error ratio above which the pool shrinks.
    pub high_rate_limit_ratio: f64,
    /// Ratio below which (with low latency) the pool may grow.
    pub low_rate_limit_ratio: f64,
    /// Average latency above which the pool shrinks.
    pub high_latency: Duration,
    /// Latency below which (with a low error ratio) the pool may grow.
    pub low_latency: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_permits: 5,
            dynamic: false,
            evaluation_interval: Duration::from_secs(30),
            high_rate_limit_ratio: 0.05,
            low_rate_limit_ratio: 0.01,
            high_latency: Duration::from_secs(2),
            low_latency: Duration::from_millis(500),
        }
    }
}

/// Direction the last control step took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Steady,
    ScalingUp,
    ScalingDown,
}

/// One recorded permit-count change.
#[derive(Debug, Clone)]
pub struct GovernorAdjustment {
    pub at: Instant,
    pub from: usize,
    pub to: usize,
    pub state: ControlState,
}

#[derive(Debug)]
struct ControlInfo {
    state: ControlState,
    last_adjustment: Option<Instant>,
    history: Vec<GovernorAdjustment>,
}

/// Kept adjustment records; older entries are discarded.
const HISTORY_LIMIT: usize = 64;

/// FIFO admission semaphore with an adaptive permit count.
#[derive(Debug)]
pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    limit: AtomicUsize,
    config: GovernorConfig,
    metrics: Arc<MetricsLedger>,
    logger: ApiLogger,
    control: Mutex<ControlInfo>,
    acquired: AtomicU64,
    waited: AtomicU64,
}

impl ConcurrencyGovernor {
    pub fn new(config: GovernorConfig, metrics: Arc<MetricsLedger>, logger: ApiLogger) -> Arc<Self> {
        let permits = config.max_permits.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            limit: AtomicUsize::new(permits),
            config,
            metrics,
            logger,
            control: Mutex::new(ControlInfo {
                state: ControlState::Steady,
                last_adjustment: None,
                history: Vec::new(),
            }),
            acquired: AtomicU64::new(0),
            waited: AtomicU64::new(0),
        })
    }

    /// Wait for a permit, honoring the context's deadline and cancellation.
    /// Grants are FIFO under contention. A cancelled or expired wait never
    /// consumes a permit.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<OwnedSemaphorePermit> {
        if self.semaphore.available_permits() == 0 {
            self.waited.fetch_add(1, Ordering::Relaxed);
            self.logger.debug(
                "governor: waiting for permit",
                &[("limit", self.current_limit().to_string())],
            );
        }

        let acquired = ctx.run(self.semaphore.clone().acquire_owned()).await?;
        let permit = acquired.map_err(|_| {
            GraphError::ConfigInvalid("governor semaphore closed".to_string())
        })?;

        self.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(permit)
    }

    /// Permit count currently in force.
    pub fn current_limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    /// Permits free right now (in-flight = limit - available).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn state(&self) -> ControlState {
        self.control.lock().unwrap().state
    }

    /// When the permit count last changed, if it ever has.
    pub fn last_adjustment(&self) -> Option<Instant> {
        self.control.lock().unwrap().last_adjustment
    }

    pub fn history(&self) -> Vec<GovernorAdjustment> {
        self.control.lock().unwrap().history.clone()
    }

    /// Run one control step immediately. The background loop calls this on
    /// every tick; tests call it directly to step the state machine
    /// without waiting out the interval.
    pub fn evaluate_now(&self) {
        if !self.config.dynamic {
            return;
        }

        let stats = self.metrics.window_stats(self.config.evaluation_interval);
        let current = self.current_limit();
        let (target, state) = self.decide(current, &stats);

        if target == current {
            self.control.lock().unwrap().state = state;
            return;
        }

        self.apply_limit(current, target, state);
    }

    fn decide(&self, current: usize, stats: &WindowStats) -> (usize, ControlState) {
        // An idle window carries no signal either way.
        if stats.samples == 0 {
            return (current, ControlState::Steady);
        }

        if stats.rate_limit_ratio > self.config.high_rate_limit_ratio
            || stats.avg_latency > self.config.high_latency
        {
            let target = ((current as f64) * 0.75).floor() as usize;
            return (target.max(1), ControlState::ScalingDown);
        }

        if stats.rate_limit_ratio < self.config.low_rate_limit_ratio
            && stats.avg_latency < self.config.low_latency
            && current < self.config.max_permits
        {
            let target = ((current as f64) * 1.25).ceil() as usize;
            return (target.min(self.config.max_permits), ControlState::ScalingUp);
        }

        (current, ControlState::Steady)
    }

    fn apply_limit(&self, from: usize, to: usize, state: ControlState) {
        self.limit.store(to, Ordering::Relaxed);

        if to > from {
            self.semaphore.add_permits(to - from);
        } else {
            // Withdraw permits as they free up. The waiter queues FIFO, so
            // the reduction takes effect ahead of later acquires.
            let shrink = (from - to) as u32;
            let semaphore = self.semaphore.clone();
            tokio::spawn(async move {
                if let Ok(claimed) = semaphore.acquire_many_owned(shrink).await {
                    claimed.forget();
                }
            });
        }

        self.logger.debug(
            "governor: permit count adjusted",
            &[
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("state", format!("{state:?}")),
            ],
        );

        let mut control = self.control.lock().unwrap();
        control.state = state;
        control.last_adjustment = Some(Instant::now());
        control.history.push(GovernorAdjustment {
            at: Instant::now(),
            from,
            to,
            state,
        });
        if control.history.len() > HISTORY_LIMIT {
            control.history.remove(0);
        }
    }

    /// Spawn the periodic control loop. Ticks until `shutdown` fires; each
    /// tick is a no-op unless dynamic rate limiting is enabled.
    pub fn spawn_control_loop(self: &Arc<Self>, shutdown: CancellationToken) {
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(governor.config.evaluation_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; skip it so the
            // first evaluation sees a full window.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => governor.evaluate_now(),
                }
            }
        });
    }
}

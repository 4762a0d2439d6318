//! Global request throttle with rate-limit backpressure
//!
//! Admission is a token bucket: `capacity` tokens refill evenly over one
//! batch interval, so requests flow at a steady rate instead of in bursts.
//! A rate-limit report from any worker closes the gate for a cooldown that
//! grows exponentially with consecutive strikes.

use crate::config::PipelineConfig;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Shared token-bucket limiter
///
/// All state lives behind one mutex that is never held across an await, so
/// the limiter is safe to share between any number of workers.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    capacity: f64,
    refill_per_sec: f64,
    base_cooldown: Duration,
    max_cooldown: Duration,
}

#[derive(Debug)]
struct LimiterState {
    tokens: f64,
    last_refill: Instant,
    rate_limited_until: Option<Instant>,
    strikes: u32,
}

impl LimiterState {
    fn refill(&mut self, now: Instant, capacity: f64, refill_per_sec: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed > Duration::ZERO {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * refill_per_sec).min(capacity);
            self.last_refill = now;
        }
    }
}

impl RateLimiter {
    /// Creates a limiter admitting `capacity` requests per `interval`
    ///
    /// The bucket starts full.
    pub fn new(
        capacity: u32,
        interval: Duration,
        base_cooldown: Duration,
        max_cooldown: Duration,
    ) -> Self {
        let capacity = f64::from(capacity.max(1));
        let interval = interval.max(Duration::from_millis(1));

        Self {
            state: Mutex::new(LimiterState {
                tokens: capacity,
                last_refill: Instant::now(),
                rate_limited_until: None,
                strikes: 0,
            }),
            capacity,
            refill_per_sec: capacity / interval.as_secs_f64(),
            base_cooldown,
            max_cooldown: max_cooldown.max(base_cooldown),
        }
    }

    /// Creates a limiter from the pipeline settings
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.batch_size,
            config.batch_delay(),
            config.cooldown(),
            config.max_cooldown(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until a request is permitted, then consumes one token
    pub async fn admit(&self) {
        loop {
            match self.try_acquire(Instant::now()) {
                Ok(()) => return,
                Err(wake_at) => sleep_until(wake_at).await,
            }
        }
    }

    /// Takes a token if one is available now, otherwise returns when to retry
    fn try_acquire(&self, now: Instant) -> Result<(), Instant> {
        let mut state = self.lock();

        if let Some(until) = state.rate_limited_until {
            if now < until {
                return Err(until);
            }
            state.rate_limited_until = None;
        }

        state.refill(now, self.capacity, self.refill_per_sec);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            Err(now + Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    /// Closes the gate after the remote service signaled rate limiting
    ///
    /// The deadline only ever moves forward: concurrent reports keep the
    /// latest deadline, and reports that land inside an active cooldown do
    /// not escalate it further. The bucket is emptied so the end of the
    /// cooldown does not release a burst.
    ///
    /// Returns the deadline now in force.
    pub fn report_rate_limited(&self) -> Instant {
        let now = Instant::now();
        let mut state = self.lock();

        let cooling = state.rate_limited_until.is_some_and(|until| now < until);
        if !cooling {
            state.strikes = state.strikes.saturating_add(1);
        }

        let candidate = now + self.cooldown_for(state.strikes);
        let until = match state.rate_limited_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        };

        state.rate_limited_until = Some(until);
        state.tokens = 0.0;
        state.last_refill = until;
        until
    }

    /// Resets the cooldown escalation after a successful request
    pub fn report_success(&self) {
        self.lock().strikes = 0;
    }

    /// Whether a cooldown is currently in force
    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_deadline().is_some()
    }

    /// Deadline of the active cooldown, if any
    pub fn cooldown_deadline(&self) -> Option<Instant> {
        let now = Instant::now();
        self.lock().rate_limited_until.filter(|until| now < *until)
    }

    fn cooldown_for(&self, strikes: u32) -> Duration {
        let exponent = strikes.saturating_sub(1).min(16);
        self.base_cooldown
            .saturating_mul(1u32 << exponent)
            .min(self.max_cooldown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(capacity: u32, interval_ms: u64) -> RateLimiter {
        RateLimiter::new(
            capacity,
            Duration::from_millis(interval_ms),
            Duration::from_secs(1),
            Duration::from_secs(8),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_bucket_admits_immediately() {
        let limiter = limiter(5, 1000);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.admit().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_bucket_waits_for_one_token() {
        // 2 tokens per second: one token every 500ms
        let limiter = limiter(2, 1000);
        let start = Instant::now();
        limiter.admit().await;
        limiter.admit().await;
        limiter.admit().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_rate_over_many_requests() {
        let limiter = limiter(10, 1000);
        let start = Instant::now();
        for _ in 0..30 {
            limiter.admit().await;
        }
        // 10 from the full bucket, 20 more at 10 per second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_blocks_until_cooldown_ends() {
        let limiter = limiter(100, 1000);
        let deadline = limiter.report_rate_limited();
        assert!(limiter.is_cooling_down());

        limiter.admit().await;
        assert!(Instant::now() >= deadline);
        assert!(!limiter.is_cooling_down());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_escalates_between_strikes() {
        let limiter = limiter(100, 1000);

        let first = limiter.report_rate_limited();
        assert_eq!(first - Instant::now(), Duration::from_secs(1));
        limiter.admit().await;

        let second = limiter.report_rate_limited();
        assert_eq!(second - Instant::now(), Duration::from_secs(2));
        limiter.admit().await;

        let third = limiter.report_rate_limited();
        assert_eq!(third - Instant::now(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_capped() {
        let limiter = limiter(100, 1000);
        for _ in 0..10 {
            limiter.report_rate_limited();
            limiter.admit().await;
        }
        let deadline = limiter.report_rate_limited();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_escalation() {
        let limiter = limiter(100, 1000);
        limiter.report_rate_limited();
        limiter.admit().await;
        limiter.report_rate_limited();
        limiter.admit().await;

        limiter.report_success();
        let deadline = limiter.report_rate_limited();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_reports_share_one_cooldown() {
        let limiter = Arc::new(limiter(100, 1000));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.report_rate_limited() })
            })
            .collect();

        let mut deadlines = Vec::new();
        for handle in handles {
            deadlines.push(handle.await.unwrap());
        }

        // No escalation from the burst and no report lost: every reporter
        // sees the same single-strike deadline
        let first = deadlines[0];
        assert!(deadlines.iter().all(|d| *d == first));
        assert_eq!(limiter.cooldown_deadline(), Some(first));
        assert_eq!(first - Instant::now(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_burst_after_cooldown() {
        let limiter = limiter(10, 1000);
        let deadline = limiter.report_rate_limited();

        limiter.admit().await;
        limiter.admit().await;

        // The bucket was emptied, so the second admission waits one token
        // interval past the deadline
        assert!(Instant::now() >= deadline + Duration::from_millis(100));
    }
}

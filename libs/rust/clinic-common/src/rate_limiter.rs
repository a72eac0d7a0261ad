//! Token-bucket rate limiting with bounded waits.
//!
//! Time is divided into refresh cycles of `limit_refresh_period`, counted from
//! the moment the limiter was created. Each cycle restores up to
//! `limit_for_period` tokens. A caller that finds the bucket empty reserves a
//! token of the first future cycle with spare capacity, provided that cycle
//! starts within `timeout_duration`. Reserved tokens are taken out of their
//! cycle before newcomers see it, and a waiter that gives up before its cycle
//! starts returns the token.

use crate::error::ClinicError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Tokens restored each refresh cycle, also the bucket capacity
    pub limit_for_period: u32,
    /// Length of one refresh cycle
    pub limit_refresh_period: Duration,
    /// Longest a caller waits for a token before being rejected
    pub timeout_duration: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 100,
            limit_refresh_period: Duration::from_secs(1),
            timeout_duration: Duration::from_millis(25),
        }
    }
}

impl RateLimiterConfig {
    /// Create a new config with custom limit per period.
    #[must_use]
    pub const fn with_limit_for_period(mut self, limit: u32) -> Self {
        self.limit_for_period = limit;
        self
    }

    /// Create a new config with custom refresh period.
    #[must_use]
    pub const fn with_limit_refresh_period(mut self, period: Duration) -> Self {
        self.limit_refresh_period = period;
        self
    }

    /// Create a new config with custom timeout.
    #[must_use]
    pub const fn with_timeout_duration(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }
}

#[derive(Debug)]
struct BucketState {
    cycle: u64,
    tokens: u32,
    /// Reserved tokens of future cycles, keyed by cycle.
    reservations: BTreeMap<u64, u32>,
}

/// A caller's claim on one token of a future cycle.
///
/// Dropped before its cycle starts, the claim is returned so the cycle keeps
/// its full capacity.
struct Reservation<'a> {
    limiter: &'a RateLimiter,
    cycle: u64,
    armed: bool,
}

impl Reservation<'_> {
    fn fulfil(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.limiter.cancel(self.cycle);
        }
    }
}

/// Named token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    epoch: Instant,
    period_nanos: u64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a new rate limiter with a full bucket.
    #[must_use]
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        let config = RateLimiterConfig {
            limit_for_period: config.limit_for_period.max(1),
            ..config
        };
        let period_nanos = u64::try_from(config.limit_refresh_period.as_nanos())
            .unwrap_or(u64::MAX)
            .max(1);
        Self {
            name: name.into(),
            state: Mutex::new(BucketState {
                cycle: 0,
                tokens: config.limit_for_period,
                reservations: BTreeMap::new(),
            }),
            config,
            epoch: Instant::now(),
            period_nanos,
        }
    }

    /// Create a rate limiter with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RateLimiterConfig::default())
    }

    /// Name of the limiter.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for a permit.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::RateLimited`] after waiting `timeout_duration`
    /// when no token can be obtained within that time.
    pub async fn acquire(&self) -> Result<(), ClinicError> {
        let reserved = {
            let mut state = self.state.lock();
            let now = Instant::now();
            self.refresh(&mut state, now);

            if state.tokens > 0 {
                state.tokens -= 1;
                return Ok(());
            }
            self.reserve(&mut state, now)
        };

        if let Some((reservation, wait)) = reserved {
            debug!(limiter = %self.name, wait_ms = wait.as_millis(), "Waiting for reserved permit");
            tokio::time::sleep(wait).await;
            reservation.fulfil();
            Ok(())
        } else {
            let timeout = self.config.timeout_duration;
            tokio::time::sleep(timeout).await;
            warn!(limiter = %self.name, "Rate limit exceeded");
            Err(ClinicError::rate_limited(&self.name, timeout))
        }
    }

    /// Tokens currently available without waiting.
    #[must_use]
    pub fn available_tokens(&self) -> u32 {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());
        state.tokens
    }

    /// Callers holding a reservation on a future cycle.
    #[must_use]
    pub fn waiting_callers(&self) -> u64 {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());
        state.reservations.values().copied().map(u64::from).sum()
    }

    /// Claim a token of the first future cycle with spare capacity that
    /// starts within the timeout.
    fn reserve(
        &self,
        state: &mut BucketState,
        now: Instant,
    ) -> Option<(Reservation<'_>, Duration)> {
        let mut cycle = state.cycle + 1;
        loop {
            let wait = self.cycle_start(cycle).saturating_duration_since(now);
            if wait > self.config.timeout_duration {
                return None;
            }
            let claimed = state.reservations.entry(cycle).or_insert(0);
            if *claimed < self.config.limit_for_period {
                *claimed += 1;
                let reservation = Reservation {
                    limiter: self,
                    cycle,
                    armed: true,
                };
                return Some((reservation, wait));
            }
            cycle += 1;
        }
    }

    fn cancel(&self, cycle: u64) {
        let mut state = self.state.lock();
        self.refresh(&mut state, Instant::now());
        if cycle <= state.cycle {
            return;
        }
        if let Some(claimed) = state.reservations.get_mut(&cycle) {
            *claimed = claimed.saturating_sub(1);
            if *claimed == 0 {
                state.reservations.remove(&cycle);
            }
            debug!(limiter = %self.name, cycle, "Abandoned reservation returned");
        }
    }

    fn current_cycle(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(elapsed / u128::from(self.period_nanos)).unwrap_or(u64::MAX)
    }

    fn cycle_start(&self, cycle: u64) -> Instant {
        self.epoch + Duration::from_nanos(self.period_nanos.saturating_mul(cycle))
    }

    fn refresh(&self, state: &mut BucketState, now: Instant) {
        let cycle = self.current_cycle(now);
        if cycle <= state.cycle {
            return;
        }
        let claimed = state.reservations.remove(&cycle).unwrap_or(0);
        state.reservations = state.reservations.split_off(&cycle);
        state.tokens = self.config.limit_for_period.saturating_sub(claimed);
        state.cycle = cycle;
    }
}

/// One shared rate limiter per limiter name.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    config: RateLimiterConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create a registry whose limiters all use `config`.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Return the limiter for `name`, creating it on first use.
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock();
        Arc::clone(
            limiters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(name, self.config.clone()))),
        )
    }

    /// Return the limiter for `name` if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.lock().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, timeout: Duration) -> RateLimiterConfig {
        RateLimiterConfig::default()
            .with_limit_for_period(limit)
            .with_limit_refresh_period(Duration::from_secs(1))
            .with_timeout_duration(timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new("default", config(3, Duration::from_millis(25)));
        for _ in 0..3 {
            assert!(limiter.acquire().await.is_ok());
        }
        assert_eq!(limiter.available_tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_after_timeout() {
        let limiter = RateLimiter::new("default", config(2, Duration::from_millis(25)));
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let start = Instant::now();
        let err = limiter.acquire().await.unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_millis(25));
        assert!(matches!(err, ClinicError::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_millis(25)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserves_next_cycle_within_timeout() {
        let limiter = RateLimiter::new("default", config(1, Duration::from_secs(2)));
        limiter.acquire().await.unwrap();

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        // The reserved caller consumed the whole refresh.
        assert_eq!(limiter.available_tokens(), 0);
        assert_eq!(limiter.waiting_callers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservations_fill_cycles_in_order() {
        let limiter = Arc::new(RateLimiter::new("default", config(1, Duration::from_millis(2500))));
        limiter.acquire().await.unwrap();

        let start = Instant::now();
        let first = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.acquire().await.unwrap();
                start.elapsed()
            }
        });
        tokio::task::yield_now().await;
        let second = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.acquire().await.unwrap();
                start.elapsed()
            }
        });

        assert_eq!(first.await.unwrap(), Duration::from_secs(1));
        assert_eq!(second.await.unwrap(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_returns_its_token() {
        let limiter = RateLimiter::new("default", config(1, Duration::from_secs(2)));
        limiter.acquire().await.unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(abandoned.is_err());
        assert_eq!(limiter.waiting_callers(), 0);

        // The next waiter still gets the first refresh.
        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiters_leave_next_cycle_full() {
        let limiter = RateLimiter::new("default", config(3, Duration::from_secs(2)));
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        for _ in 0..3 {
            let abandoned = tokio::time::timeout(Duration::from_millis(1), limiter.acquire()).await;
            assert!(abandoned.is_err());
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.available_tokens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_never_exceeds_capacity() {
        let limiter = RateLimiter::new("default", config(5, Duration::from_millis(25)));
        limiter.acquire().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(limiter.available_tokens(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_shares_buckets() {
        let registry = RateLimiterRegistry::new(config(1, Duration::from_millis(25)));
        registry.get_or_create("default").acquire().await.unwrap();
        assert_eq!(registry.get_or_create("default").available_tokens(), 0);
        assert_eq!(registry.get_or_create("reports").available_tokens(), 1);
    }
}

//! Circuit breaker implementation for resilience.
//!
//! A count-based sliding window of the last `sliding_window_size` outcomes is
//! kept per named circuit. Once the window is full and its failure rate reaches
//! `failure_rate_threshold`, the circuit opens and short-circuits every call
//! until `wait_duration_in_open_state` has elapsed. The next admission check
//! then half-opens it and lets a bounded number of trial calls through: a successful
//! trial closes the circuit with an empty window, a failed trial re-opens it.
//!
//! All transitions happen under a single lock, so every later caller observes
//! them. Admission hands out a [`CircuitPermit`] that is settled with the
//! call's outcome or released when the call is abandoned.

use crate::error::ClinicError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, limited requests are allowed to test recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure rate in `(0, 1]` at or above which a full window opens the circuit
    pub failure_rate_threshold: f64,
    /// Number of most recent outcomes considered
    pub sliding_window_size: usize,
    /// Time to wait before transitioning from open to half-open
    pub wait_duration_in_open_state: Duration,
    /// Maximum trial calls allowed in half-open state
    pub permitted_calls_in_half_open_state: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 20,
            wait_duration_in_open_state: Duration::from_millis(1000),
            permitted_calls_in_half_open_state: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with custom failure rate threshold.
    #[must_use]
    pub const fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold;
        self
    }

    /// Create a new config with custom sliding window size.
    #[must_use]
    pub const fn with_sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size;
        self
    }

    /// Create a new config with custom open-state wait.
    #[must_use]
    pub const fn with_wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.wait_duration_in_open_state = wait;
        self
    }

    /// Create a new config with a custom number of half-open trial calls.
    #[must_use]
    pub const fn with_permitted_calls_in_half_open_state(mut self, calls: u32) -> Self {
        self.permitted_calls_in_half_open_state = calls;
        self
    }
}

/// Ring buffer of outcomes, `true` meaning failure.
#[derive(Debug)]
struct OutcomeWindow {
    outcomes: VecDeque<bool>,
    failures: usize,
    capacity: usize,
}

impl OutcomeWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            failures: 0,
            capacity,
        }
    }

    fn push(&mut self, failed: bool) {
        if self.outcomes.len() == self.capacity && self.outcomes.pop_front() == Some(true) {
            self.failures -= 1;
        }
        self.outcomes.push_back(failed);
        if failed {
            self.failures += 1;
        }
    }

    fn is_full(&self) -> bool {
        self.outcomes.len() == self.capacity
    }

    #[allow(clippy::cast_precision_loss)]
    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f64 / self.outcomes.len() as f64
    }

    fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { in_flight: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Ignored,
}

impl Outcome {
    fn of<T>(result: &Result<T, ClinicError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) if err.is_backend_failure() => Self::Failure,
            Err(_) => Self::Ignored,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    window: OutcomeWindow,
    /// Bumped on every phase transition.
    generation: u64,
}

impl Inner {
    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Admission of one call, settled with the call's outcome.
///
/// A permit remembers the phase generation it was granted in. Outcomes of
/// permits from an earlier generation are discarded, so a slow call admitted
/// while closed cannot close a circuit that has since half-opened. A permit
/// dropped without an outcome, for instance because the caller's future was
/// cancelled, hands its half-open trial slot back.
#[must_use = "a dropped permit releases its slot without recording an outcome"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Settle the permit with the outcome of the admitted call.
    pub fn record<T>(mut self, result: &Result<T, ClinicError>) {
        self.settled = true;
        self.breaker.settle(self.generation, Outcome::of(result));
    }
}

impl fmt::Debug for CircuitPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitPermit")
            .field("circuit", &self.breaker.name)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(circuit = %self.breaker.name, "Circuit permit released without an outcome");
            self.breaker.settle(self.generation, Outcome::Ignored);
        }
    }
}

/// Circuit breaker protecting one named circuit.
///
/// Every operation bound to the same circuit name shares one instance through
/// the [`CircuitBreakerRegistry`].
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = OutcomeWindow::new(config.sliding_window_size);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                window,
                generation: 0,
            }),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Name of the circuit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask for permission to run one call.
    ///
    /// An open circuit whose wait has elapsed moves to half-open here and the
    /// caller takes the first trial slot.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::CircuitOpen`] when the circuit is open, or
    /// half-open with every trial slot taken.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, ClinicError> {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::Closed => {}
            Phase::Open { since } => {
                let elapsed = since.elapsed();
                let wait = self.config.wait_duration_in_open_state;
                if elapsed < wait {
                    return Err(ClinicError::circuit_open(&self.name, wait - elapsed));
                }
                inner.enter(Phase::HalfOpen { in_flight: 1 });
                info!(circuit = %self.name, "Circuit breaker half-open, admitting trial call");
            }
            Phase::HalfOpen { in_flight } => {
                if in_flight >= self.config.permitted_calls_in_half_open_state {
                    return Err(ClinicError::circuit_open(
                        &self.name,
                        self.config.wait_duration_in_open_state,
                    ));
                }
                inner.phase = Phase::HalfOpen {
                    in_flight: in_flight + 1,
                };
            }
        }
        Ok(CircuitPermit {
            breaker: self,
            generation: inner.generation,
            settled: false,
        })
    }

    /// Record a successful call in the current phase.
    pub fn on_success(&self) {
        self.apply(&mut self.inner.lock(), Outcome::Success);
    }

    /// Record a failed call that counts against the circuit.
    pub fn on_failure(&self) {
        self.apply(&mut self.inner.lock(), Outcome::Failure);
    }

    /// Record a call whose outcome says nothing about backend health.
    ///
    /// Releases one half-open trial slot.
    pub fn on_ignored(&self) {
        self.apply(&mut self.inner.lock(), Outcome::Ignored);
    }

    /// Execute an async operation through the circuit breaker.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::CircuitOpen`] without invoking `operation` when
    /// the call is not admitted, otherwise the operation's own error.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, ClinicError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClinicError>>,
    {
        let permit = self.try_acquire()?;
        let result = operation().await;
        permit.record(&result);
        result
    }

    fn settle(&self, generation: u64, outcome: Outcome) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            self.apply(&mut inner, outcome);
        }
    }

    fn apply(&self, inner: &mut Inner, outcome: Outcome) {
        match (inner.phase, outcome) {
            (Phase::Closed, Outcome::Success) => {
                inner.window.push(false);
                self.trip_if_over_threshold(inner);
            }
            (Phase::Closed, Outcome::Failure) => {
                inner.window.push(true);
                self.trip_if_over_threshold(inner);
            }
            (Phase::HalfOpen { .. }, Outcome::Success) => {
                inner.window.clear();
                inner.enter(Phase::Closed);
                info!(circuit = %self.name, "Circuit breaker closed after successful trial call");
            }
            (Phase::HalfOpen { .. }, Outcome::Failure) => {
                inner.enter(Phase::Open {
                    since: Instant::now(),
                });
                warn!(circuit = %self.name, "Circuit breaker re-opened after failed trial call");
            }
            (Phase::HalfOpen { in_flight }, Outcome::Ignored) => {
                inner.phase = Phase::HalfOpen {
                    in_flight: in_flight.saturating_sub(1),
                };
            }
            (Phase::Closed, Outcome::Ignored) | (Phase::Open { .. }, _) => {}
        }
    }

    fn trip_if_over_threshold(&self, inner: &mut Inner) {
        if inner.window.is_full()
            && inner.window.failure_rate() >= self.config.failure_rate_threshold
        {
            warn!(
                circuit = %self.name,
                failure_rate = inner.window.failure_rate(),
                "Circuit breaker opened"
            );
            inner.enter(Phase::Open {
                since: Instant::now(),
            });
        }
    }

    /// Get the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        match self.inner.lock().phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Number of outcomes currently held in the sliding window.
    #[must_use]
    pub fn buffered_calls(&self) -> usize {
        self.inner.lock().window.outcomes.len()
    }

    /// Failure rate over the outcomes currently in the window.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.inner.lock().window.failure_rate()
    }

    /// Reset the circuit breaker to closed state with an empty window.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.window.clear();
        inner.enter(Phase::Closed);
    }
}

/// One shared circuit breaker per circuit name.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers all use `config`.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the breaker for `name`, creating it on first use.
    #[must_use]
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone()))),
        )
    }

    /// Return the breaker for `name` if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn small_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_sliding_window_size(4)
            .with_failure_rate_threshold(0.5)
            .with_wait_duration_in_open_state(Duration::from_millis(1000))
    }

    fn open(cb: &CircuitBreaker) {
        for _ in 0..4 {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_initial_state_closed() {
        let cb = CircuitBreaker::with_defaults("default");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_stays_closed_until_window_full() {
        let cb = CircuitBreaker::new("default", small_config());
        for _ in 0..3 {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.buffered_calls(), 3);
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = CircuitBreaker::new("default", small_config());
        cb.on_success();
        cb.on_failure();
        cb.on_success();
        cb.on_failure();

        assert_eq!(cb.state(), CircuitState::Open);
        let err = cb.try_acquire().unwrap_err();
        assert!(matches!(err, ClinicError::CircuitOpen { .. }));
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let cb = CircuitBreaker::new("default", small_config());
        cb.on_success();
        cb.on_success();
        cb.on_success();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!((cb.failure_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_slides() {
        let cb = CircuitBreaker::new("default", small_config());
        cb.on_failure();
        for _ in 0..6 {
            cb.on_success();
        }
        assert_eq!(cb.buffered_calls(), 4);
        assert!(cb.failure_rate().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_operation() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);

        let invoked = AtomicU32::new(0);
        let result: Result<(), ClinicError> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ClinicError::CircuitOpen { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_shrinks_while_open() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);
        tokio::time::advance(Duration::from_millis(400)).await;

        let err = cb.try_acquire().unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_millis(600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_with_empty_window() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);
        tokio::time::advance(Duration::from_millis(1000)).await;

        let result = cb.call(|| async { Ok::<_, ClinicError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.buffered_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_timer() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);
        tokio::time::advance(Duration::from_millis(1000)).await;

        let result: Result<(), ClinicError> = cb
            .call(|| async { Err(ClinicError::unavailable("db down")) })
            .await;
        assert!(matches!(result, Err(ClinicError::Unavailable(_))));
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(cb.try_acquire().is_err());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_limits_trial_calls() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);
        tokio::time::advance(Duration::from_millis(1000)).await;

        let trial = cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_err());

        // A validation failure hands its trial slot back.
        trial.record(&Err::<(), _>(ClinicError::invalid_input("bad")));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_releases_slot() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);
        tokio::time::advance(Duration::from_millis(1000)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cb.call(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, ClinicError>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let result = cb.call(|| async { Ok::<_, ClinicError>(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_permit_while_closed_records_nothing() {
        let cb = CircuitBreaker::new("default", small_config());
        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.buffered_calls(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_does_not_close_half_open_circuit() {
        let cb = CircuitBreaker::new("default", small_config());
        let slow = cb.try_acquire().unwrap();
        open(&cb);
        tokio::time::advance(Duration::from_millis(1000)).await;
        let trial = cb.try_acquire().unwrap();

        slow.record(&Ok::<_, ClinicError>(()));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err());

        trial.record(&Err::<(), _>(ClinicError::unavailable("db down")));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_trial_outcome_ignored_after_reopen() {
        let cb = CircuitBreaker::new(
            "default",
            small_config().with_permitted_calls_in_half_open_state(2),
        );
        open(&cb);
        tokio::time::advance(Duration::from_millis(1000)).await;

        let first = cb.try_acquire().unwrap();
        let second = cb.try_acquire().unwrap();
        first.record(&Err::<(), _>(ClinicError::unavailable("db down")));
        assert_eq!(cb.state(), CircuitState::Open);

        second.record(&Ok::<_, ClinicError>(()));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_validation_errors_not_recorded() {
        let cb = CircuitBreaker::new("default", small_config());
        for _ in 0..8 {
            let _ = cb
                .call(|| async { Err::<(), _>(ClinicError::not_found("owner 9")) })
                .await;
        }
        assert_eq!(cb.buffered_calls(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_registry_shares_breakers() {
        let registry = CircuitBreakerRegistry::new(small_config());
        let a = registry.get_or_create("default");
        let b = registry.get_or_create("default");
        assert!(Arc::ptr_eq(&a, &b));

        open(&a);
        assert_eq!(b.state(), CircuitState::Open);
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_reset() {
        let cb = CircuitBreaker::new("default", small_config());
        open(&cb);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.buffered_calls(), 0);
    }
}

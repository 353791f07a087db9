//! Circuit breaker guarding calls into the upstream data provider.
//!
//! # States
//! - Closed: normal operation, every call runs
//! - Open: upstream presumed down, calls fail fast with [`CallError::Open`]
//! - Half-Open: probing whether upstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: now - last_failure > timeout, checked on the next call
//! Half-Open → Closed: successes >= success_threshold
//! Half-Open → Open: failures >= failure_threshold
//! ```
//!
//! # Design Decisions
//! - One breaker per upstream dependency, never shared across unrelated ones
//! - No timer task: the Open → Half-Open check runs at the top of `call`
//! - State, counters and last failure live behind one mutex
//! - The mutex is not held while the operation runs; admission and outcome
//!   bookkeeping are separate critical sections
//! - Outcomes of calls admitted before the last transition are ignored

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::observability::metrics::{self, MetricsSink};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    /// Encoding used by the state gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent snapshot of state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerCounters {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Rejected without running the operation.
    #[error("circuit breaker is open")]
    Open,
    /// The operation ran and failed; its error is passed through unchanged.
    #[error(transparent)]
    Inner(E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open)
    }

    /// The operation's error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CallError::Open => None,
            CallError::Inner(e) => Some(e),
        }
    }
}

/// Records an admitted call as failed if it is dropped before completing.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(self.generation, success);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(breaker = %self.breaker.name, "Call abandoned before completing, counted as failure");
            self.breaker.record(self.generation, false);
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    /// Bumped on every transition; stale outcomes carry an older value.
    generation: u64,
}

/// Three-state circuit breaker.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    name: String,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    ///
    /// Thresholds below 1 are raised to 1.
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        if failure_threshold == 0 || success_threshold == 0 {
            tracing::warn!(
                failure_threshold,
                success_threshold,
                "Circuit breaker threshold of 0 raised to 1"
            );
        }

        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                generation: 0,
            }),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            timeout,
            name: "upstream".to_string(),
            sink: None,
        }
    }

    /// Name the breaker for logs and report transitions to `sink`.
    pub fn with_observer(mut self, name: impl Into<String>, sink: Arc<dyn MetricsSink>) -> Self {
        self.name = name.into();
        sink.set_gauge(metrics::BREAKER_STATE, self.state().gauge_value());
        self.sink = Some(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long the breaker stays open before probing.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` through the breaker.
    ///
    /// `op` is invoked at most once. In the Open state it is never invoked and
    /// [`CallError::Open`] is returned. Dropping the returned future after
    /// admission counts as a failure.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = match self.admit() {
            Some(generation) => generation,
            None => return Err(CallError::Open),
        };

        let admission = Admission {
            breaker: self,
            generation,
            settled: false,
        };
        let result = op().await;
        admission.settle(result.is_ok());
        result.map_err(CallError::Inner)
    }

    /// Current state. Never performs the lazy Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current state and counters, read atomically.
    pub fn counters(&self) -> BreakerCounters {
        let inner = self.lock();
        BreakerCounters {
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
        }
    }

    /// Force the breaker closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still holds valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admission check. Returns the generation the call runs under, or None
    /// when rejecting.
    fn admit(&self) -> Option<u64> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let cooled_down = inner
                .last_failure
                .map_or(true, |at| at.elapsed() > self.timeout);
            if !cooled_down {
                tracing::debug!(breaker = %self.name, "Circuit open, rejecting call");
                return None;
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        Some(inner.generation)
    }

    fn record(&self, generation: u64, success: bool) {
        let mut inner = self.lock();

        if inner.generation != generation {
            tracing::debug!(
                breaker = %self.name,
                success,
                state = %inner.state,
                "Ignoring outcome of call admitted before last transition"
            );
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.failures = 0;
                inner.successes = 0;
            }
            (CircuitState::Closed, false) => {
                inner.failures = inner.failures.saturating_add(1);
                inner.successes = 0;
                if inner.failures >= self.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.successes = inner.successes.saturating_add(1);
                if inner.successes >= self.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.failures = inner.failures.saturating_add(1);
                if inner.failures >= self.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            // Admission never hands out an Open generation
            (CircuitState::Open, _) => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);

        match to {
            CircuitState::Open => {
                inner.last_failure = Some(Instant::now());
                tracing::warn!(
                    breaker = %self.name,
                    from = %from,
                    failures = inner.failures,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Circuit breaker tripped to OPEN"
                );
            }
            CircuitState::HalfOpen => {
                inner.failures = 0;
                inner.successes = 0;
                tracing::info!(breaker = %self.name, "Circuit breaker HALF-OPEN, probing upstream");
            }
            CircuitState::Closed => {
                inner.failures = 0;
                inner.successes = 0;
                if from != CircuitState::Closed {
                    tracing::info!(breaker = %self.name, from = %from, "Circuit breaker CLOSED");
                }
            }
        }

        if let Some(sink) = &self.sink {
            sink.set_gauge(metrics::BREAKER_STATE, to.gauge_value());
            if to == CircuitState::Open {
                sink.increment_counter(metrics::BREAKER_TRIPS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MemorySink;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError;

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CallError<TestError>> {
        breaker.call(|| async { Err::<(), _>(TestError) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), CallError<TestError>> {
        breaker.call(|| async { Ok::<(), TestError>(()) }).await
    }

    #[tokio::test]
    async fn test_starts_closed_and_passes_calls() {
        let breaker = CircuitBreaker::new(3, 5, Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::Closed);

        let value = breaker.call(|| async { Ok::<_, TestError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_error_passes_through_unchanged() {
        let breaker = CircuitBreaker::new(3, 5, Duration::from_secs(30));
        let err = fail(&breaker).await.unwrap_err();
        assert_eq!(err.into_inner(), Some(TestError));
    }

    #[tokio::test]
    async fn test_opens_on_threshold_and_rejects_without_invoking() {
        let breaker = CircuitBreaker::new(3, 1, Duration::from_secs(30));
        let invocations = AtomicU32::new(0);

        for _ in 0..3 {
            let result = breaker
                .call(|| async {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError)
                })
                .await;
            assert!(matches!(result, Err(CallError::Inner(TestError))));
        }
        // The third call was the trigger and still ran
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TestError>(())
            })
            .await;
        assert!(result.unwrap_err().is_open());
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_in_closed_resets_failures() {
        let breaker = CircuitBreaker::new(3, 1, Duration::from_secs(30));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.counters().failures, 2);

        succeed(&breaker).await.unwrap();
        assert_eq!(
            breaker.counters(),
            BreakerCounters { state: CircuitState::Closed, failures: 0, successes: 0 }
        );

        // Two more failures are not enough after the reset
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe_runs_once() {
        let breaker = CircuitBreaker::new(1, 2, Duration::from_millis(50));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        // The transition happens lazily, on the next call
        assert_eq!(breaker.state(), CircuitState::Open);

        let invocations = AtomicU32::new(0);
        let observed = breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(breaker.state())
            })
            .await
            .unwrap();

        assert_eq!(observed, CircuitState::HalfOpen);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(
            breaker.counters(),
            BreakerCounters { state: CircuitState::HalfOpen, failures: 0, successes: 1 }
        );
    }

    #[tokio::test]
    async fn test_half_open_closes_on_success_streak() {
        let breaker = CircuitBreaker::new(1, 3, Duration::from_millis(20));
        let _ = fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        succeed(&breaker).await.unwrap();
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        succeed(&breaker).await.unwrap();

        assert_eq!(
            breaker.counters(),
            BreakerCounters { state: CircuitState::Closed, failures: 0, successes: 0 }
        );
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_failure_threshold() {
        let breaker = CircuitBreaker::new(2, 5, Duration::from_millis(20));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(40)).await;

        // One failure in half-open is below the threshold
        assert!(matches!(fail(&breaker).await, Err(CallError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(matches!(fail(&breaker).await, Err(CallError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::Open);

        // Fresh last-failure time: still rejecting right away
        assert!(fail(&breaker).await.unwrap_err().is_open());
    }

    #[tokio::test]
    async fn test_concrete_recovery_scenario() {
        let breaker = CircuitBreaker::new(2, 1, Duration::from_millis(100));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let invocations = AtomicU32::new(0);
        let rejected = breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TestError>(())
            })
            .await;
        assert!(rejected.unwrap_err().is_open());
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;

        breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TestError>(())
            })
            .await
            .unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_outcome_is_ignored() {
        let breaker = Arc::new(CircuitBreaker::new(1, 1, Duration::from_secs(30)));
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Admitted while closed, completes after the breaker opened
        let slow = {
            let breaker = Arc::clone(&breaker);
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok::<(), TestError>(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        release_tx.send(()).unwrap();
        slow.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_reset_closes() {
        let breaker = CircuitBreaker::new(1, 1, Duration::from_secs(30));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        succeed(&breaker).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_thresholds_are_raised() {
        let breaker = CircuitBreaker::new(0, 0, Duration::from_millis(10));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_observer_reports_transitions() {
        let sink = Arc::new(MemorySink::new());
        let breaker = CircuitBreaker::new(1, 1, Duration::from_millis(20))
            .with_observer("alpha_vantage", sink.clone());
        assert_eq!(breaker.name(), "alpha_vantage");
        assert_eq!(sink.gauge(metrics::BREAKER_STATE), Some(0.0));

        let _ = fail(&breaker).await;
        assert_eq!(sink.gauge(metrics::BREAKER_STATE), Some(1.0));
        assert_eq!(sink.counter(metrics::BREAKER_TRIPS), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(sink.gauge(metrics::BREAKER_STATE), Some(0.0));
    }

    #[tokio::test]
    async fn test_concurrent_calls_leave_valid_state() {
        let breaker = Arc::new(CircuitBreaker::new(5, 10, Duration::from_secs(30)));
        let successes = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for i in 0..100 {
            let breaker = Arc::clone(&breaker);
            let successes = Arc::clone(&successes);
            handles.push(tokio::spawn(async move {
                let ok = i % 2 == 0;
                let result = breaker
                    .call(|| async move { if ok { Ok(()) } else { Err(TestError) } })
                    .await;
                if result.is_ok() {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(successes.load(Ordering::SeqCst) > 0);
        let state = breaker.state();
        assert!(state == CircuitState::Closed || state == CircuitState::Open);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half-open\""
        );
        assert_eq!(CallError::<TestErrorDisplay>::Open.to_string(), "circuit breaker is open");
        assert_eq!(CallError::Inner(TestErrorDisplay).to_string(), "boom");
    }

    #[derive(Debug, Error)]
    #[error("boom")]
    struct TestErrorDisplay;

    #[tokio::test]
    async fn test_dropped_call_counts_as_failure() {
        let breaker = CircuitBreaker::new(1, 1, Duration::from_secs(30));

        let hung = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), TestError>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), hung).await.is_err());

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(succeed(&breaker).await.unwrap_err().is_open());
    }

    #[tokio::test]
    async fn test_dropped_call_before_admission_records_nothing() {
        let breaker = CircuitBreaker::new(1, 1, Duration::from_secs(30));

        // Never polled: admission has not happened
        drop(breaker.call(|| async { Ok::<(), TestError>(()) }));

        assert_eq!(
            breaker.counters(),
            BreakerCounters { state: CircuitState::Closed, failures: 0, successes: 0 }
        );
    }
}

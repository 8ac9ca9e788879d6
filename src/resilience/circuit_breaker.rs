//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and are counted
//! - Open: backend assumed down, calls fail fast without touching the network
//! - Half-Open: a single probe call tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= min_requests && failures / requests >= failure_ratio
//! Open → Half-Open: after open_timeout
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per backend, shared by every request to it
//! - State is kept behind a mutex that is never held across an await point
//! - Every transition starts a new generation; results from an older
//!   generation are discarded so a slow call cannot skew fresh counts
//! - The breaker never retries; it only decides whether a call is attempted

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

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

    /// Numeric form used by the state gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts accumulated since the last state transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollingCounts {
    pub requests: u32,
    pub successes: u32,
    pub failures: u32,
}

impl RollingCounts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.successes = self.successes.saturating_add(1);
    }

    fn on_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.failures as f64 / self.requests as f64
    }
}

/// Tuning for a single breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Minimum number of calls in the current window before the ratio is evaluated.
    pub min_requests: u32,
    /// Failure ratio at or above which the breaker trips.
    pub failure_ratio: f64,
    /// How long the breaker stays open before admitting a probe.
    pub open_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            min_requests: 5,
            failure_ratio: 0.5,
            open_timeout: Duration::from_secs(3),
        }
    }
}

/// Errors returned by [`CallBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Circuit is open, the operation was not invoked.
    #[error("circuit breaker is open")]
    Open,

    /// A half-open probe is already in flight, the operation was not invoked.
    #[error("too many requests while circuit breaker is half-open")]
    TooManyRequests,

    /// The operation ran and failed.
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Callback fired on each state transition: `(breaker name, from, to)`.
pub type StateObserver = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

struct Inner {
    state: CircuitState,
    counts: RollingCounts,
    generation: u64,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Admission granted by [`CallBreaker::acquire`].
///
/// The outcome is reported with [`CallPermit::success`] or
/// [`CallPermit::failure`]. A permit dropped unsettled reports nothing but
/// releases the half-open probe slot.
pub struct CallPermit<B: Deref<Target = CallBreaker>> {
    breaker: B,
    generation: u64,
    settled: bool,
}

impl<B: Deref<Target = CallBreaker>> CallPermit<B> {
    pub fn success(mut self) {
        self.settle(true);
    }

    pub fn failure(mut self) {
        self.settle(false);
    }

    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.after_call(self.generation, success);
    }
}

impl<B: Deref<Target = CallBreaker>> Drop for CallPermit<B> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(breaker = %self.breaker.name, "Call abandoned before completion");
            self.breaker.abandon(self.generation);
        }
    }
}

/// Per-backend fault isolator.
pub struct CallBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    observer: Option<StateObserver>,
}

impl fmt::Debug for CallBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (state, counts) = self.snapshot();
        f.debug_struct("CallBreaker")
            .field("name", &self.name)
            .field("state", &state)
            .field("counts", &counts)
            .finish()
    }
}

impl CallBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                counts: RollingCounts::default(),
                generation: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            observer: None,
        }
    }

    /// Attach a state transition observer.
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state and rolling counts.
    ///
    /// An open breaker whose timeout has elapsed is reported (and moved) to half-open.
    pub fn snapshot(&self) -> (CircuitState, RollingCounts) {
        let mut transitions = Vec::new();
        let snapshot = {
            let mut inner = self.lock();
            self.refresh(&mut inner, Instant::now(), &mut transitions);
            (inner.state, inner.counts)
        };
        self.notify(transitions);
        snapshot
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().0
    }

    /// Run `operation` under breaker protection.
    ///
    /// `Err` from the operation counts as a failure, `Ok` as a success.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit::<_, E>(self)?;
        let result = operation().await;
        match result {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) => {
                permit.failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Admit one call whose outcome is reported later, possibly from another task.
    pub fn acquire<E>(self: &Arc<Self>) -> Result<CallPermit<Arc<Self>>, BreakerError<E>> {
        self.admit(self.clone())
    }

    fn admit<B, E>(&self, breaker: B) -> Result<CallPermit<B>, BreakerError<E>>
    where
        B: Deref<Target = CallBreaker>,
    {
        let generation = self.before_call::<E>()?;
        Ok(CallPermit {
            breaker,
            generation,
            settled: false,
        })
    }

    // A call dropped before completion reports no outcome, but must not keep
    // the half-open probe slot occupied.
    fn abandon(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn before_call<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.lock();
            self.refresh(&mut inner, Instant::now(), &mut transitions);

            match inner.state {
                CircuitState::Open => Err(BreakerError::Open),
                CircuitState::HalfOpen if inner.probe_in_flight => {
                    Err(BreakerError::TooManyRequests)
                }
                CircuitState::HalfOpen => {
                    inner.probe_in_flight = true;
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
                CircuitState::Closed => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.notify(transitions);

        if admitted.is_err() {
            tracing::debug!(breaker = %self.name, "Call rejected by circuit breaker");
        }
        admitted
    }

    fn after_call(&self, generation: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            let now = Instant::now();
            self.refresh(&mut inner, now, &mut transitions);

            if inner.generation != generation {
                tracing::trace!(breaker = %self.name, "Discarding result from a previous generation");
            } else if success {
                self.on_success(&mut inner, now, &mut transitions);
            } else {
                self.on_failure(&mut inner, now, &mut transitions);
            }
        }
        self.notify(transitions);
    }

    fn on_success(
        &self,
        inner: &mut Inner,
        now: Instant,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        match inner.state {
            CircuitState::Closed => {
                inner.counts.on_success();
                self.maybe_trip(inner, now, transitions);
            }
            CircuitState::HalfOpen => {
                inner.counts.on_success();
                self.transition(inner, CircuitState::Closed, now, transitions);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(
        &self,
        inner: &mut Inner,
        now: Instant,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        match inner.state {
            CircuitState::Closed => {
                inner.counts.on_failure();
                self.maybe_trip(inner, now, transitions);
            }
            CircuitState::HalfOpen => {
                inner.counts.on_failure();
                self.transition(inner, CircuitState::Open, now, transitions);
            }
            CircuitState::Open => {}
        }
    }

    // Evaluated after every closed-state call, whatever that call's outcome.
    fn maybe_trip(
        &self,
        inner: &mut Inner,
        now: Instant,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        let counts = inner.counts;
        if counts.requests >= self.settings.min_requests
            && counts.failure_ratio() >= self.settings.failure_ratio
        {
            tracing::warn!(
                breaker = %self.name,
                requests = counts.requests,
                failures = counts.failures,
                ratio = counts.failure_ratio(),
                "Failure ratio exceeded, opening circuit"
            );
            self.transition(inner, CircuitState::Open, now, transitions);
        }
    }

    fn refresh(
        &self,
        inner: &mut Inner,
        now: Instant,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        if inner.state != CircuitState::Open {
            return;
        }
        let expired = inner
            .opened_at
            .map(|at| now.saturating_duration_since(at) >= self.settings.open_timeout)
            .unwrap_or(true);
        if expired {
            self.transition(inner, CircuitState::HalfOpen, now, transitions);
        }
    }

    fn transition(
        &self,
        inner: &mut Inner,
        to: CircuitState,
        now: Instant,
        transitions: &mut Vec<(CircuitState, CircuitState)>,
    ) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = RollingCounts::default();
        inner.probe_in_flight = false;
        inner.opened_at = match to {
            CircuitState::Open => Some(now),
            _ => None,
        };

        transitions.push((from, to));
    }

    // Observers run after the lock is released so they may read the breaker.
    fn notify(&self, transitions: Vec<(CircuitState, CircuitState)>) {
        for (from, to) in transitions {
            tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
            if let Some(observer) = &self.observer {
                observer(&self.name, from, to);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner is plain data; a panic elsewhere cannot leave it half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

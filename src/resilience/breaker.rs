//! Rolling-window circuit breaker shared by every call routed through one
//! [`super::ResiliencePolicy`].

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Failure ratio in `(0, 1]` at which the circuit opens.
    pub failure_threshold: f64,
    /// Outcomes older than this no longer count.
    pub window: Duration,
    /// How long the circuit stays open before admitting a trial call.
    pub cooldown: Duration,
    /// Outcomes required in the window before the ratio is trusted.
    pub minimum_calls: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.8,
            window: Duration::from_secs(100),
            cooldown: Duration::from_secs(30),
            minimum_calls: 5,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `(when, failed)` for calls made while closed.
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to make a call. `None` means the call must be rejected.
    ///
    /// The returned permit has to be settled with [`Permit::success`] or
    /// [`Permit::failure`]; dropping an unsettled half-open trial counts as a
    /// failure.
    pub fn admit(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return None;
                }
                info!("Circuit cooldown elapsed, admitting trial call");
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
        };
        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn settle(&self, trial: bool, failed: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if trial {
            inner.trial_in_flight = false;
            if failed {
                warn!("Trial call failed, circuit reopened");
                Self::open(&mut inner, now);
            } else {
                info!("Trial call succeeded, circuit closed");
                inner.state = CircuitState::Closed;
                inner.outcomes.clear();
                inner.opened_at = None;
            }
            return;
        }

        // Calls admitted while closed may finish after another call tripped
        // the circuit; their outcome no longer matters.
        if inner.state != CircuitState::Closed {
            return;
        }

        inner.outcomes.push_back((now, failed));
        let window = self.config.window;
        while inner
            .outcomes
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > window)
        {
            inner.outcomes.pop_front();
        }

        let total = inner.outcomes.len();
        if total < self.config.minimum_calls.max(1) {
            return;
        }
        let failures = inner.outcomes.iter().filter(|(_, failed)| *failed).count();
        let ratio = failures as f64 / total as f64;
        if ratio >= self.config.failure_threshold {
            warn!(
                failures,
                total,
                threshold = self.config.failure_threshold,
                "Failure ratio crossed threshold, circuit opened"
            );
            Self::open(&mut inner, now);
        }
    }

    fn open(inner: &mut Inner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.outcomes.clear();
    }
}

/// Admission to make one call through the breaker.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, false);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, true);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.settle(true, true);
        }
    }
}

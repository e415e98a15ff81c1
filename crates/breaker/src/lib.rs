// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process circuit breaker (spec §4.4).
//!
//! State is per-process, per-scope (spec §9 design notes: breaker state is
//! deliberately NOT shared through the store — a worker's view of
//! downstream health is local to itself). The worker runtime depends only
//! on the [`Gate`] trait so tests can substitute a breaker that always
//! allows or always denies.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wq_core::simple_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

simple_display! {
    CircuitState {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half_open",
    }
}

/// Everything a breaker instance needs to decide, expressed so callers
/// never have to match on internal state to build a backoff decision.
#[derive(Debug, Clone, Copy)]
pub struct GateDecision {
    pub allowed: bool,
    pub state: CircuitState,
    pub retry_after: Option<Duration>,
}

/// What a worker consults before claiming the next job (spec §4.3 step 1,
/// §9 "worker depends on Gate.Allow()"). Decoupled from the concrete
/// [`CircuitBreaker`] so tests can stub it out.
pub trait Gate: Send + Sync {
    fn allow(&self) -> GateDecision;
    fn record_success(&self);
    fn record_failure(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Sliding window size, in call outcomes.
    pub window_size: usize,
    /// Minimum calls in the window before the failure rate is evaluated.
    pub min_requests: u32,
    /// Failure rate (0.0-1.0) that trips the breaker.
    pub failure_rate_threshold: f64,
    /// How long the breaker stays Open before probing with a half-open trial.
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_requests: 10,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(30),
        }
    }
}

struct Window {
    outcomes: VecDeque<bool>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self { outcomes: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, success: bool) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn failure_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let failures = self.outcomes.iter().filter(|s| !**s).count();
        Some(failures as f64 / self.outcomes.len() as f64)
    }

    fn clear(&mut self) {
        self.outcomes.clear();
    }
}

struct Inner {
    state: CircuitState,
    window: Window,
    opened_at: Option<Instant>,
    /// Whether the single HalfOpen probe admitted this window is still
    /// outstanding (spec §4.4 "one outstanding probe").
    probe_in_flight: bool,
    trip_count: u64,
}

/// A single circuit breaker instance, count-based sliding window with a
/// half-open probe phase (spec §4.4).
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: Window::new(config.window_size),
                opened_at: None,
                probe_in_flight: false,
                trip_count: 0,
            }),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn trip_count(&self) -> u64 {
        self.inner.lock().trip_count
    }

    fn trip(inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
        inner.trip_count += 1;
        inner.window.clear();
    }
}

impl Gate for CircuitBreaker {
    fn allow(&self) -> GateDecision {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => GateDecision { allowed: true, state: CircuitState::Closed, retry_after: None },
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    GateDecision { allowed: true, state: CircuitState::HalfOpen, retry_after: None }
                } else {
                    GateDecision {
                        allowed: false,
                        state: CircuitState::Open,
                        retry_after: Some(self.config.open_duration - elapsed),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if !inner.probe_in_flight {
                    inner.probe_in_flight = true;
                    GateDecision { allowed: true, state: CircuitState::HalfOpen, retry_after: None }
                } else {
                    GateDecision {
                        allowed: false,
                        state: CircuitState::HalfOpen,
                        retry_after: Some(Duration::from_millis(50)),
                    }
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.probe_in_flight = false;
                inner.window.clear();
            }
            CircuitState::Closed => {
                inner.window.push(true);
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => Self::trip(&mut inner),
            CircuitState::Closed => {
                inner.window.push(false);
                let min_requests = self.config.min_requests;
                let threshold = self.config.failure_rate_threshold;
                let window_len = inner.window.outcomes.len() as u32;
                if window_len >= min_requests {
                    if let Some(rate) = inner.window.failure_rate() {
                        if rate >= threshold {
                            Self::trip(&mut inner);
                        }
                    }
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// Per-scope breaker registry (one breaker per downstream dependency, e.g.
/// per queue or per tenant), so a failing tenant doesn't trip every
/// worker's breaker for every other tenant.
#[derive(Clone)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, breakers: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn get_or_create(&self, scope: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            window_size: 10,
            min_requests: 4,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_millis(30),
        }
    }

    #[test]
    fn closed_breaker_allows_calls() {
        let breaker = CircuitBreaker::new(config());
        assert!(breaker.allow().allowed);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn trips_open_once_failure_rate_exceeds_threshold() {
        let breaker = CircuitBreaker::new(config());
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.trip_count(), 1);
        assert!(!breaker.allow().allowed);
    }

    #[test]
    fn stays_closed_below_min_requests() {
        let breaker = CircuitBreaker::new(config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_after_open_duration_elapses() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(40));
        let decision = breaker.allow();
        assert!(decision.allowed);
        assert_eq!(decision.state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        // spec §4.4/§8: "one outstanding probe" — a second `allow()` call
        // while the first probe hasn't resolved must be denied.
        let breaker = CircuitBreaker::new(config());
        for _ in 0..4 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(40));
        let first = breaker.allow();
        assert!(first.allowed);
        assert_eq!(first.state, CircuitState::HalfOpen);
        let second = breaker.allow();
        assert!(!second.allowed);
        assert_eq!(second.state, CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..4 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(40));
        breaker.allow();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_breaker() {
        let breaker = CircuitBreaker::new(config());
        for _ in 0..4 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(40));
        breaker.allow();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.trip_count(), 2);
    }

    #[test]
    fn registry_isolates_scopes() {
        let registry = BreakerRegistry::new(config());
        let a = registry.get_or_create("tenant-a");
        let b = registry.get_or_create("tenant-b");
        for _ in 0..4 {
            a.record_failure();
        }
        assert_eq!(a.state(), CircuitState::Open);
        assert_eq!(b.state(), CircuitState::Closed);
    }
}

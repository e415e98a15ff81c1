// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority Fairness Scheduler (spec §4.2).
//!
//! `allocate` is a pure function over a demand snapshot so it can be unit
//! tested without a store round trip; [`FairnessScheduler`] wraps it with
//! the per-priority consumption/`last_scheduled` bookkeeping that
//! `check_fairness` needs.

use parking_lot::Mutex;
use std::collections::HashMap;
use wq_core::{Clock, PriorityClass};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct FairnessConfig {
    /// Weight per priority class; an unknown priority defaults to 1.0
    /// (spec §4.2 "Weights are read from configuration ... unknown
    /// priority defaults to weight 1.0").
    pub weights: HashMap<PriorityClass, f64>,
    /// Fraction of `available` every demanding priority is guaranteed
    /// before weighted distribution begins.
    pub min_guarantee_share: f64,
    /// How long a demanding, zero-allocation priority may wait before the
    /// starvation guard grants it an emergency allocation.
    pub max_wait_time_ms: u64,
    /// Emergency grant size for starved priorities.
    pub emergency_floor: f64,
    /// Multiplier over fair share defining the burst envelope `check_fairness`
    /// allows before denying.
    pub burst_multiplier: f64,
    /// Refill rate backing the suggested delay `check_fairness` computes
    /// when it denies (tokens/requests per second, adaptive window).
    pub window_refill_per_sec: f64,
}

impl FairnessConfig {
    pub fn weight_of(&self, priority: &PriorityClass) -> f64 {
        self.weights.get(priority).copied().unwrap_or(1.0)
    }
}

/// Distribute `available` tokens across `demand` in three phases (spec
/// §4.2): guaranteed minimum, weighted fair share, starvation prevention.
/// `last_scheduled_ms` holds the last time each priority actually got
/// scheduled; priorities absent from it are treated as never scheduled
/// (maximally stale, eligible for the starvation grant).
pub fn allocate(
    demand: &HashMap<PriorityClass, f64>,
    available: f64,
    config: &FairnessConfig,
    now_ms: u64,
    last_scheduled_ms: &HashMap<PriorityClass, u64>,
) -> HashMap<PriorityClass, f64> {
    let active: Vec<PriorityClass> =
        demand.iter().filter(|(_, &d)| d > 0.0).map(|(p, _)| p.clone()).collect();
    let mut alloc: HashMap<PriorityClass, f64> = active.iter().map(|p| (p.clone(), 0.0)).collect();
    if active.is_empty() || available <= 0.0 {
        return alloc;
    }

    // Phase 1: guaranteed minimum.
    let mut remaining = available;
    for p in &active {
        let want = demand[p];
        let guarantee = (available * config.min_guarantee_share).min(want);
        if let Some(a) = alloc.get_mut(p) {
            *a += guarantee;
        }
        remaining -= guarantee;
    }
    remaining = remaining.max(0.0);

    // Phase 2: weighted fair share, water-filling over residual demand so
    // capacity capped by one priority's demand is redistributed to the rest.
    loop {
        let residual: Vec<(PriorityClass, f64, f64)> = active
            .iter()
            .filter_map(|p| {
                let resid_demand = demand[p] - alloc[p];
                if resid_demand > EPSILON {
                    Some((p.clone(), resid_demand, config.weight_of(p)))
                } else {
                    None
                }
            })
            .collect();
        if residual.is_empty() || remaining <= EPSILON {
            break;
        }
        let weight_sum: f64 = residual.iter().map(|(_, _, w)| w).sum();
        if weight_sum <= EPSILON {
            break;
        }
        let mut distributed = 0.0;
        let mut any_capped = false;
        for (p, resid_demand, weight) in &residual {
            let share = remaining * (weight / weight_sum);
            let grant = share.min(*resid_demand);
            if grant + EPSILON < share {
                any_capped = true;
            }
            if let Some(a) = alloc.get_mut(p) {
                *a += grant;
            }
            distributed += grant;
        }
        remaining -= distributed;
        if !any_capped || distributed <= EPSILON {
            break;
        }
    }

    // Phase 3: starvation prevention.
    for p in &active {
        if alloc[p] > EPSILON {
            continue;
        }
        let last = last_scheduled_ms.get(p).copied().unwrap_or(0);
        if now_ms.saturating_sub(last) >= config.max_wait_time_ms {
            let grant = config.emergency_floor.min(demand[p] - alloc[p]);
            if let Some(a) = alloc.get_mut(p) {
                *a += grant;
            }
        }
    }

    alloc
}

/// Outcome of [`FairnessScheduler::check_fairness`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairnessDecision {
    pub allowed: bool,
    pub suggested_delay_ms: u64,
}

#[derive(Default)]
struct PriorityState {
    consumed: f64,
    queued: f64,
    last_scheduled_ms: u64,
}

/// Stateful wrapper tracking per-priority consumption for `check_fairness`
/// (spec §3 "Fairness State (per priority class)").
pub struct FairnessScheduler<C> {
    config: FairnessConfig,
    state: Mutex<HashMap<PriorityClass, PriorityState>>,
    clock: C,
}

impl<C: Clock> FairnessScheduler<C> {
    pub fn new(config: FairnessConfig, clock: C) -> Self {
        Self { config, state: Mutex::new(HashMap::new()), clock }
    }

    pub fn allocate(
        &self,
        demand: &HashMap<PriorityClass, f64>,
        available: f64,
    ) -> HashMap<PriorityClass, f64> {
        let now = self.clock.epoch_ms();
        let last_scheduled: HashMap<PriorityClass, u64> = {
            let state = self.state.lock();
            state.iter().map(|(p, s)| (p.clone(), s.last_scheduled_ms)).collect()
        };
        allocate(demand, available, &self.config, now, &last_scheduled)
    }

    pub fn record_queued(&self, priority: &PriorityClass, depth: f64) {
        self.state.lock().entry(priority.clone()).or_default().queued = depth;
    }

    pub fn queued(&self, priority: &PriorityClass) -> f64 {
        self.state.lock().get(priority).map(|s| s.queued).unwrap_or(0.0)
    }

    /// Consult current consumption against `fair_share` and the burst
    /// envelope `fair_share * burst_multiplier` (spec §4.2
    /// `check_fairness`). Allowed decisions atomically increment
    /// consumption and bump `last_scheduled`.
    pub fn check_fairness(
        &self,
        priority: &PriorityClass,
        requested: f64,
        fair_share: f64,
    ) -> FairnessDecision {
        let mut state = self.state.lock();
        let entry = state.entry(priority.clone()).or_default();
        let envelope = fair_share * self.config.burst_multiplier;
        let projected = entry.consumed + requested;
        if projected <= envelope + EPSILON {
            entry.consumed = projected;
            entry.last_scheduled_ms = self.clock.epoch_ms();
            FairnessDecision { allowed: true, suggested_delay_ms: 0 }
        } else {
            let deficit = projected - envelope;
            let delay_ms = if self.config.window_refill_per_sec > 0.0 {
                ((deficit / self.config.window_refill_per_sec) * 1000.0).ceil() as u64
            } else {
                u64::MAX
            };
            FairnessDecision { allowed: false, suggested_delay_ms: delay_ms }
        }
    }

    /// Decay consumption at the start of a new fairness window; called
    /// periodically by the scheduling loop (spec §3 "windowed").
    pub fn reset_window(&self) {
        for s in self.state.lock().values_mut() {
            s.consumed = 0.0;
        }
    }

    pub fn consumed(&self, priority: &PriorityClass) -> f64 {
        self.state.lock().get(priority).map(|s| s.consumed).unwrap_or(0.0)
    }
}

//! In-process counters for attempts and resolutions.
//!
//! Nothing is persisted; a collaborator polls [`Metrics::snapshot`].

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{ExtractionAttempt, Outcome, Platform, StrategyId};

#[derive(Debug, Default)]
struct PlatformTotals {
    successes: u64,
    failures: u64,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: BTreeMap<StrategyId, BTreeMap<Outcome, u64>>,
    platforms: BTreeMap<Platform, PlatformTotals>,
}

/// Counters shared by every resolution of a pipeline
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<Counters>,
}

/// Attempts made with one strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyStats {
    pub attempts: u64,
    pub outcomes: BTreeMap<Outcome, u64>,
}

/// Resolutions finished for one platform
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformStats {
    pub successes: u64,
    pub failures: u64,
    pub average_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub strategies: BTreeMap<StrategyId, StrategyStats>,
    pub platforms: BTreeMap<Platform, PlatformStats>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_counters<T>(&self, f: impl FnOnce(&mut Counters) -> T) -> T {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut counters)
    }

    pub fn record_attempt(&self, attempt: &ExtractionAttempt) {
        self.with_counters(|c| {
            *c.attempts
                .entry(attempt.strategy.clone())
                .or_default()
                .entry(attempt.outcome)
                .or_default() += 1;
        });
    }

    pub fn record_resolution(&self, platform: Platform, succeeded: bool, latency: Duration) {
        self.with_counters(|c| {
            let totals = c.platforms.entry(platform).or_default();
            if succeeded {
                totals.successes += 1;
            } else {
                totals.failures += 1;
            }
            totals.latency += latency;
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.with_counters(|c| MetricsSnapshot {
            strategies: c
                .attempts
                .iter()
                .map(|(id, outcomes)| {
                    let stats = StrategyStats {
                        attempts: outcomes.values().sum(),
                        outcomes: outcomes.clone(),
                    };
                    (id.clone(), stats)
                })
                .collect(),
            platforms: c
                .platforms
                .iter()
                .map(|(platform, totals)| {
                    let finished = totals.successes + totals.failures;
                    let average_latency_ms = if finished == 0 {
                        0
                    } else {
                        (totals.latency.as_millis() / u128::from(finished)) as u64
                    };
                    let stats = PlatformStats {
                        successes: totals.successes,
                        failures: totals.failures,
                        average_latency_ms,
                    };
                    (*platform, stats)
                })
                .collect(),
        })
    }
}

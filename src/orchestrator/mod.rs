//! Fallback orchestration.
//!
//! A [`Resolution`] is the per-target state machine:
//!
//! ```text
//! Pending → Trying(i) → Succeeded
//!              ↓  ↑
//!        Waiting(i, delay)
//!              ↓
//!          Escalating → Trying(i + 1) … → Exhausted
//! ```
//!
//! It consumes one [`ExtractionAttempt`] at a time and answers with the next
//! [`Step`]. [`Orchestrator::run`] is the async loop around it that executes
//! strategies, sleeps between retries and honours cancellation.

pub mod chain;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    AttemptError, ErrorKind, ExtractionAttempt, Outcome, ResolveHints, StrategyId, Target,
};
use crate::executor::{run_strategy, Executor, ExecutorRegistry};
use crate::metrics::Metrics;
use crate::normalizer::completeness;
use crate::ratelimit::RateLimiter;

pub use chain::StrategyTable;
pub use retry::RetryPolicy;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_MIN_COMPLETENESS: f64 = 0.4;

/// Where a resolution stands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum State {
    Pending,
    Trying(usize),
    Waiting(usize, Duration),
    Succeeded,
    Exhausted,
    Cancelled,
}

/// What the driver does next
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Run the strategy at this chain index
    Run(usize),
    /// Sleep, then call [`Resolution::resume`]
    Wait(usize, Duration),
    Finish(Verdict),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Normalize the attempt at this index of [`Resolution::attempts`]
    Resolved { attempt: usize },
    Failed { kind: ErrorKind, message: String },
}

/// Retry/escalation state of one target's resolution
#[derive(Debug)]
pub struct Resolution {
    target: Target,
    chain_len: usize,
    policy: RetryPolicy,
    min_completeness: f64,
    state: State,
    retries: u32,
    /// Best partial so far: attempt index and completeness
    best: Option<(usize, f64)>,
    attempts: Vec<ExtractionAttempt>,
}

impl Resolution {
    pub fn new(target: Target, chain_len: usize, policy: RetryPolicy, min_completeness: f64) -> Self {
        Self {
            target,
            chain_len,
            policy,
            min_completeness,
            state: State::Pending,
            retries: 0,
            best: None,
            attempts: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn attempts(&self) -> &[ExtractionAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<ExtractionAttempt> {
        self.attempts
    }

    pub fn start(&mut self) -> Step {
        if self.chain_len == 0 {
            self.state = State::Exhausted;
            return Step::Finish(Verdict::Failed {
                kind: ErrorKind::NoStrategySucceeded,
                message: format!(
                    "no strategies configured for {}",
                    self.target.platform().display_name()
                ),
            });
        }
        self.state = State::Trying(0);
        Step::Run(0)
    }

    /// Leave `Waiting` and run the same strategy again
    pub fn resume(&mut self) -> Step {
        match self.state {
            State::Waiting(i, _) => {
                self.state = State::Trying(i);
                Step::Run(i)
            }
            State::Trying(i) => Step::Run(i),
            _ => self.start(),
        }
    }

    pub fn cancel(&mut self) -> Step {
        self.state = State::Cancelled;
        Step::Finish(Verdict::Failed {
            kind: ErrorKind::Cancelled,
            message: "resolution cancelled".to_string(),
        })
    }

    /// Record the attempt of the current strategy and decide what follows
    pub fn advance(&mut self, attempt: ExtractionAttempt) -> Step {
        let current = match self.state {
            State::Trying(i) => i,
            State::Waiting(i, _) => i,
            _ => 0,
        };
        let outcome = attempt.outcome;
        let kind = attempt.error_kind();
        let retry_after = attempt.error.as_ref().and_then(|e| e.retry_after);
        let score = completeness(&attempt.raw_fields, &self.target);
        let strategy = attempt.strategy.clone();

        self.attempts.push(attempt);
        let index = self.attempts.len() - 1;

        match outcome {
            Outcome::Success => {
                self.state = State::Succeeded;
                Step::Finish(Verdict::Resolved { attempt: index })
            }
            Outcome::Partial => {
                // Equal scores keep the earlier strategy.
                if self.best.map_or(true, |(_, best)| score > best) {
                    self.best = Some((index, score));
                }
                tracing::debug!(%strategy, score, "Partial result, trying next strategy");
                self.escalate(current)
            }
            Outcome::Skipped => self.escalate(current),
            Outcome::Failed => {
                let kind = kind.unwrap_or(ErrorKind::MalformedContent);
                if kind == ErrorKind::Cancelled {
                    return self.cancel();
                }
                if kind.is_retryable() && self.retries < self.policy.max_retries {
                    let delay = match kind {
                        ErrorKind::RateLimited => retry_after,
                        _ => Some(self.policy.backoff(self.retries)),
                    };
                    if let Some(delay) = delay {
                        self.retries += 1;
                        self.state = State::Waiting(current, delay);
                        tracing::debug!(
                            %strategy,
                            %kind,
                            retry = self.retries,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying strategy"
                        );
                        return Step::Wait(current, delay);
                    }
                }
                tracing::warn!(%strategy, %kind, target = %self.target, "Strategy failed, escalating");
                self.escalate(current)
            }
        }
    }

    fn escalate(&mut self, from: usize) -> Step {
        self.retries = 0;
        let next = from + 1;
        if next < self.chain_len {
            self.state = State::Trying(next);
            return Step::Run(next);
        }
        self.exhausted()
    }

    fn exhausted(&mut self) -> Step {
        if let Some((index, score)) = self.best {
            if score >= self.min_completeness {
                self.state = State::Succeeded;
                return Step::Finish(Verdict::Resolved { attempt: index });
            }
        }
        self.state = State::Exhausted;

        let last_error = self
            .attempts
            .iter()
            .rev()
            .find_map(|a| a.error.as_ref())
            .map(|e| format!("; last error: {}", e.message))
            .unwrap_or_default();
        let message = match self.best {
            Some((_, score)) => format!(
                "best partial result scored {:.2}, below the minimum of {:.2}{}",
                score, self.min_completeness, last_error
            ),
            None => format!(
                "no strategy succeeded after {} attempts{}",
                self.attempts.len(),
                last_error
            ),
        };
        Step::Finish(Verdict::Failed {
            kind: ErrorKind::NoStrategySucceeded,
            message,
        })
    }
}

/// Verdict of a chain together with every attempt it made
#[derive(Debug)]
pub struct ChainRun {
    pub verdict: Verdict,
    pub attempts: Vec<ExtractionAttempt>,
}

impl ChainRun {
    pub fn chosen(&self) -> Option<&ExtractionAttempt> {
        match self.verdict {
            Verdict::Resolved { attempt } => self.attempts.get(attempt),
            Verdict::Failed { .. } => None,
        }
    }
}

/// Runs strategy chains against the executor registry
pub struct Orchestrator {
    registry: ExecutorRegistry,
    table: StrategyTable,
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    min_completeness: f64,
}

impl Orchestrator {
    pub fn new(registry: ExecutorRegistry, table: StrategyTable) -> Self {
        Self {
            registry,
            table,
            limiter: Arc::new(RateLimiter::default()),
            metrics: Arc::new(Metrics::new()),
            policy: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            min_completeness: DEFAULT_MIN_COMPLETENESS,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_min_completeness(mut self, min_completeness: f64) -> Self {
        self.min_completeness = if min_completeness.is_nan() {
            DEFAULT_MIN_COMPLETENESS
        } else {
            min_completeness.clamp(0.0, 1.0)
        };
        self
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run the platform's chain for `target` until a verdict is reached
    pub async fn run(
        &self,
        target: &Target,
        hints: &ResolveHints,
        cancel: &CancellationToken,
    ) -> ChainRun {
        let chain = self.table.chain(target.platform());
        let mut resolution = Resolution::new(
            target.clone(),
            chain.len(),
            self.policy.clone(),
            self.min_completeness,
        );

        let mut step = resolution.start();
        loop {
            step = match step {
                Step::Finish(verdict) => {
                    return ChainRun {
                        verdict,
                        attempts: resolution.into_attempts(),
                    };
                }
                _ if cancel.is_cancelled() => resolution.cancel(),
                Step::Run(i) => {
                    let attempt = self.attempt(&chain[i], target, hints, cancel).await;
                    self.metrics.record_attempt(&attempt);
                    resolution.advance(attempt)
                }
                Step::Wait(_, delay) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => resolution.cancel(),
                        _ = tokio::time::sleep(delay) => resolution.resume(),
                    }
                }
            };
        }
    }

    /// One gated attempt of `strategy`
    async fn attempt(
        &self,
        strategy: &StrategyId,
        target: &Target,
        hints: &ResolveHints,
        cancel: &CancellationToken,
    ) -> ExtractionAttempt {
        let Some(executor) = self.registry.get(strategy) else {
            return ExtractionAttempt::skipped(
                strategy.clone(),
                target,
                format!("strategy {} is not registered", strategy),
            );
        };

        // Skips cost no rate budget.
        if let Some(reason) = executor.skip_reason(target) {
            tracing::debug!(%strategy, %target, "Skipped: {}", reason);
            return ExtractionAttempt::skipped(strategy.clone(), target, reason);
        }

        let started_at = Utc::now();
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return ExtractionAttempt::without_data(
                    strategy.clone(),
                    target,
                    started_at,
                    Duration::ZERO,
                    AttemptError::new(ErrorKind::Cancelled, "cancelled while waiting for rate limit"),
                );
            }
            acquired = self.limiter.acquire(target.platform()) => acquired,
        };

        match acquired {
            Ok(_permit) => {
                run_strategy(executor.as_ref(), target, hints, self.attempt_timeout, cancel).await
            }
            Err(limited) => ExtractionAttempt::without_data(
                strategy.clone(),
                target,
                started_at,
                Duration::ZERO,
                AttemptError::new(ErrorKind::RateLimited, limited.to_string())
                    .with_retry_after(limited.retry_after),
            ),
        }
    }
}

//! Per-platform token buckets with a concurrency cap.
//!
//! Every strategy attempt takes a [`Permit`] first. A permit holds one of
//! the platform's concurrent slots and has consumed one token; the slot is
//! given back when the permit is dropped.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Gcra};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;

use crate::domain::Platform;

/// Budget of one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Bucket size, i.e. the burst allowed after an idle period
    pub capacity: u32,

    /// Tokens added per minute; 0 means the bucket never refills
    pub refill_per_minute: u32,

    /// Attempts allowed in flight at once
    pub max_concurrent: usize,

    /// How long `acquire` may wait for a token before failing fast
    pub wait_window_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_per_minute: 60,
            max_concurrent: 4,
            wait_window_ms: 2000,
        }
    }
}

impl RateLimitSettings {
    pub fn new(capacity: u32, refill_per_minute: u32) -> Self {
        Self {
            capacity,
            refill_per_minute,
            ..Self::default()
        }
    }

    pub fn wait_window(&self) -> Duration {
        Duration::from_millis(self.wait_window_ms)
    }

    /// Defaults per platform, matching each site's tolerance for automated traffic
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Instagram => Self {
                refill_per_minute: 30,
                max_concurrent: 2,
                ..Self::default()
            },
            Platform::YouTube | Platform::TikTok => Self {
                refill_per_minute: 40,
                ..Self::default()
            },
            Platform::Twitter | Platform::Unknown => Self::default(),
        }
    }
}

/// No token became available within the wait window
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit reached for {platform}")]
pub struct RateLimited {
    pub platform: Platform,
    /// Time until the next token; `None` when the bucket never refills
    pub retry_after: Option<Duration>,
}

/// Admission to run one attempt
#[derive(Debug)]
pub struct Permit {
    platform: Platform,
    _slot: OwnedSemaphorePermit,
}

impl Permit {
    pub fn platform(&self) -> Platform {
        self.platform
    }
}

/// governor clock reading tokio's time, so token waits and `tokio::time`
/// sleeps share one timeline (including a paused test clock)
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        Instant::now().into_std()
    }
}

/// Token source of one platform
enum Tokens<C: Clock> {
    Refilling {
        limiter: Gcra<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
        clock: C,
    },
    /// `refill_per_minute = 0`: the initial capacity is all there is
    Fixed(AtomicU32),
}

impl<C: Clock + Clone> Tokens<C> {
    fn new(settings: &RateLimitSettings, clock: C) -> Self {
        match (
            NonZeroU32::new(settings.refill_per_minute),
            NonZeroU32::new(settings.capacity),
        ) {
            (Some(refill), Some(capacity)) => {
                let quota = Quota::per_minute(refill).allow_burst(capacity);
                Tokens::Refilling {
                    limiter: Gcra::direct_with_clock(quota, clock.clone()),
                    clock,
                }
            }
            _ => Tokens::Fixed(AtomicU32::new(settings.capacity)),
        }
    }

    /// Take a token, or report how long until one is available
    fn try_take(&self) -> Result<(), Option<Duration>> {
        match self {
            Tokens::Refilling { limiter, clock } => limiter
                .check()
                .map_err(|not_until| Some(not_until.wait_time_from(clock.now()))),
            Tokens::Fixed(remaining) => remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .map(|_| ())
                .map_err(|_| None),
        }
    }
}

struct Budget {
    settings: RateLimitSettings,
    tokens: Tokens<TokioClock>,
    slots: Arc<Semaphore>,
}

/// Shared limiter, injected into the orchestrator
pub struct RateLimiter {
    budgets: HashMap<Platform, Budget>,
}

impl RateLimiter {
    /// Limiter with the per-platform defaults, overridden by `overrides`
    pub fn new(overrides: BTreeMap<Platform, RateLimitSettings>) -> Self {
        let mut settings: BTreeMap<Platform, RateLimitSettings> = Platform::SUPPORTED
            .iter()
            .chain([Platform::Unknown].iter())
            .map(|p| (*p, RateLimitSettings::for_platform(*p)))
            .collect();
        settings.extend(overrides);

        let budgets = settings
            .into_iter()
            .map(|(platform, settings)| {
                let budget = Budget {
                    tokens: Tokens::new(&settings, TokioClock),
                    slots: Arc::new(Semaphore::new(
                        settings.max_concurrent.clamp(1, Semaphore::MAX_PERMITS),
                    )),
                    settings,
                };
                (platform, budget)
            })
            .collect();

        Self { budgets }
    }

    /// Limiter that admits everything immediately
    pub fn unlimited() -> Self {
        let open = RateLimitSettings {
            capacity: u32::MAX,
            refill_per_minute: u32::MAX,
            max_concurrent: Semaphore::MAX_PERMITS,
            wait_window_ms: 0,
        };
        Self::new(
            Platform::SUPPORTED
                .iter()
                .chain([Platform::Unknown].iter())
                .map(|p| (*p, open.clone()))
                .collect(),
        )
    }

    pub fn settings(&self, platform: Platform) -> &RateLimitSettings {
        &self.budget(platform).settings
    }

    fn budget(&self, platform: Platform) -> &Budget {
        // Every platform is inserted by `new`.
        &self.budgets[&platform]
    }

    /// Take a concurrent slot, then a token, both within one wait window.
    ///
    /// Fails fast when the window runs out: with the time until the next
    /// token when that is known, `None` for a saturated platform or a bucket
    /// that never refills.
    pub async fn acquire(&self, platform: Platform) -> Result<Permit, RateLimited> {
        let budget = self.budget(platform);
        let deadline = Instant::now() + budget.settings.wait_window();
        let limited = |retry_after| RateLimited {
            platform,
            retry_after,
        };

        let slot = match budget.slots.clone().try_acquire_owned() {
            Ok(slot) => slot,
            Err(TryAcquireError::NoPermits) => {
                match tokio::time::timeout_at(deadline, budget.slots.clone().acquire_owned()).await
                {
                    Ok(Ok(slot)) => slot,
                    Ok(Err(_)) => return Err(limited(None)),
                    Err(_) => {
                        tracing::debug!(%platform, "No concurrent slot within the wait window");
                        return Err(limited(None));
                    }
                }
            }
            Err(TryAcquireError::Closed) => return Err(limited(None)),
        };

        loop {
            match budget.tokens.try_take() {
                Ok(()) => {
                    return Ok(Permit {
                        platform,
                        _slot: slot,
                    })
                }
                Err(Some(wait)) if Instant::now() + wait <= deadline => {
                    tracing::debug!(%platform, wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
                    tokio::time::sleep(wait).await;
                }
                Err(retry_after) => {
                    tracing::debug!(%platform, ?retry_after, "Rate limit reached");
                    return Err(limited(retry_after));
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use tokio_test::{assert_err, assert_ok};

    fn limiter(platform: Platform, settings: RateLimitSettings) -> RateLimiter {
        RateLimiter::new(BTreeMap::from([(platform, settings)]))
    }

    #[tokio::test]
    async fn test_zero_refill_admits_capacity_then_fails() {
        let limiter = limiter(
            Platform::TikTok,
            RateLimitSettings {
                wait_window_ms: 0,
                ..RateLimitSettings::new(3, 0)
            },
        );

        for _ in 0..3 {
            assert_ok!(limiter.acquire(Platform::TikTok).await);
        }
        for _ in 0..2 {
            let err = limiter.acquire(Platform::TikTok).await.unwrap_err();
            assert_eq!(err.retry_after, None);
        }
    }

    #[test]
    fn test_tokens_refill_with_clock() {
        let clock = FakeRelativeClock::default();
        let tokens = Tokens::new(&RateLimitSettings::new(2, 30), clock.clone());

        assert_eq!(tokens.try_take(), Ok(()));
        assert_eq!(tokens.try_take(), Ok(()));
        assert_eq!(tokens.try_take(), Err(Some(Duration::from_secs(2))));

        clock.advance(Duration::from_secs(2));
        assert_eq!(tokens.try_take(), Ok(()));
        assert_eq!(tokens.try_take(), Err(Some(Duration::from_secs(2))));
    }

    #[test]
    fn test_zero_refill_tokens_never_return() {
        let clock = FakeRelativeClock::default();
        let tokens = Tokens::new(&RateLimitSettings::new(1, 0), clock.clone());

        assert_eq!(tokens.try_take(), Ok(()));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(tokens.try_take(), Err(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_retry_after() {
        let limiter = limiter(
            Platform::Instagram,
            RateLimitSettings {
                wait_window_ms: 0,
                ..RateLimitSettings::new(1, 60)
            },
        );

        assert_ok!(limiter.acquire(Platform::Instagram).await);
        let err = assert_err!(limiter.acquire(Platform::Instagram).await);
        let retry_after = err.retry_after.unwrap();
        assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(1));

        tokio::time::advance(retry_after).await;
        assert_ok!(limiter.acquire(Platform::Instagram).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_within_window() {
        let limiter = limiter(
            Platform::YouTube,
            RateLimitSettings {
                wait_window_ms: 5000,
                ..RateLimitSettings::new(1, 60)
            },
        );

        let start = Instant::now();
        assert!(limiter.acquire(Platform::YouTube).await.is_ok());
        assert!(limiter.acquire(Platform::YouTube).await.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_platforms_have_separate_buckets() {
        let limiter = RateLimiter::new(BTreeMap::from([
            (
                Platform::TikTok,
                RateLimitSettings {
                    wait_window_ms: 0,
                    ..RateLimitSettings::new(1, 0)
                },
            ),
        ]));

        assert_ok!(limiter.acquire(Platform::TikTok).await);
        assert_err!(limiter.acquire(Platform::TikTok).await);
        assert_ok!(limiter.acquire(Platform::YouTube).await);
    }

    #[tokio::test]
    async fn test_permit_holds_concurrent_slot() {
        let limiter = limiter(
            Platform::Twitter,
            RateLimitSettings {
                max_concurrent: 1,
                ..RateLimitSettings::new(10, 0)
            },
        );

        let first = limiter.acquire(Platform::Twitter).await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire(Platform::Twitter),
        )
        .await;
        assert!(blocked.is_err());

        drop(first);
        assert!(limiter.acquire(Platform::Twitter).await.is_ok());
    }

    #[tokio::test]
    async fn test_saturated_platform_fails_fast() {
        let limiter = limiter(
            Platform::Twitter,
            RateLimitSettings {
                max_concurrent: 1,
                wait_window_ms: 0,
                ..RateLimitSettings::new(10, 0)
            },
        );

        let _held = assert_ok!(limiter.acquire(Platform::Twitter).await);
        let second = tokio::time::timeout(
            Duration::from_secs(2),
            limiter.acquire(Platform::Twitter),
        )
        .await
        .expect("acquire must not wait past its window");
        let err = assert_err!(second);
        assert_eq!(err.retry_after, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_freed_within_window_is_taken() {
        let limiter = limiter(
            Platform::TikTok,
            RateLimitSettings {
                max_concurrent: 1,
                wait_window_ms: 1000,
                ..RateLimitSettings::new(10, 0)
            },
        );

        let held = assert_ok!(limiter.acquire(Platform::TikTok).await);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(held);
        });

        let start = Instant::now();
        assert_ok!(limiter.acquire(Platform::TikTok).await);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}

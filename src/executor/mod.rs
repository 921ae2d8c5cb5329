//! Strategy executors.
//!
//! Each extraction mechanism implements [`Executor`]. Opening an executor
//! for a target yields a [`Session`] that owns whatever the attempt
//! acquired (a browser page, a concurrency slot, a remote actor run).
//!
//! ```text
//! Executor::open → Session::fetch → FieldExtractor → ExtractionAttempt
//!                        ↓
//!                 Session::release   (always, exactly once)
//! ```
//!
//! [`run_strategy`] drives one attempt under a deadline and a cancellation
//! token and awaits `release` on every exit path once `open` succeeded.

pub mod apify;
pub mod browser;
pub mod http;
pub mod public_api;
pub mod scripted;
pub mod settings;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    AttemptError, ErrorKind, ExtractionAttempt, Field, Outcome, Platform, RawFields,
    ResolveHints, StrategyId, Target,
};
use crate::extractor::{FieldExtractor, FieldSpec};
use crate::normalizer::missing_required;

pub use crate::extractor::ParsedContent;
pub use apify::ApifyExecutor;
pub use browser::BrowserExecutor;
pub use http::HttpHtmlExecutor;
pub use public_api::PublicApiExecutor;
pub use scripted::{ScriptedExecutor, ScriptedStep};
pub use settings::{BrowserSettings, HttpSettings};

/// Capability tag of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    Browser,
    Http,
    PublicApi,
    AuthenticatedActor,
    Scripted,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mechanism::Browser => "browser",
            Mechanism::Http => "http",
            Mechanism::PublicApi => "public-api",
            Mechanism::AuthenticatedActor => "authenticated-actor",
            Mechanism::Scripted => "scripted",
        };
        f.write_str(name)
    }
}

/// Failure of a session, before it is folded into an attempt
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Blocked: {0}")]
    Blocked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Malformed content: {0}")]
    Malformed(String),
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Transport(_) => ErrorKind::TransientTransport,
            ExecError::Blocked(_) => ErrorKind::Blocked,
            ExecError::NotFound(_) => ErrorKind::NotFound,
            ExecError::RateLimited { .. } => ErrorKind::RateLimited,
            ExecError::Malformed(_) => ErrorKind::MalformedContent,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExecError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map an HTTP status to the failure taxonomy; `None` for success
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        let message = format!("HTTP {}", status.as_u16());
        Some(match status.as_u16() {
            404 | 410 => ExecError::NotFound(message),
            401 | 403 => ExecError::Blocked(message),
            429 => ExecError::RateLimited {
                message,
                retry_after,
            },
            408 | 500..=599 => ExecError::Transport(message),
            _ => ExecError::Malformed(message),
        })
    }

    /// Fail on a non-success response, reading `Retry-After` for 429s
    pub fn check_response(response: &Response) -> Result<(), ExecError> {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        match Self::from_status(response.status(), retry_after) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<reqwest::Error> for ExecError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs may carry API keys.
        let err = err.without_url();
        if err.is_decode() {
            ExecError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, None).unwrap_or_else(|| ExecError::Transport(err.to_string()))
        } else {
            ExecError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(err: serde_json::Error) -> Self {
        ExecError::Malformed(err.to_string())
    }
}

impl From<ExecError> for AttemptError {
    fn from(err: ExecError) -> Self {
        AttemptError::new(err.kind(), err.to_string()).with_retry_after(err.retry_after())
    }
}

/// One extraction mechanism
#[async_trait]
pub trait Executor: Send + Sync {
    fn id(&self) -> StrategyId;

    fn mechanism(&self) -> Mechanism;

    fn supports(&self, platform: Platform) -> bool;

    /// Why this executor does not apply to `target`, if it doesn't
    fn skip_reason(&self, target: &Target) -> Option<String> {
        if self.supports(target.platform()) {
            None
        } else {
            Some(format!(
                "{} does not handle {}",
                self.id(),
                target.platform().display_name()
            ))
        }
    }

    fn field_specs(&self, target: &Target) -> Vec<FieldSpec>;

    async fn open(
        &self,
        target: &Target,
        hints: &ResolveHints,
    ) -> Result<Box<dyn Session>, ExecError>;
}

/// Resources held by one attempt
#[async_trait]
pub trait Session: Send {
    async fn fetch(&mut self, target: &Target) -> Result<ParsedContent, ExecError>;

    /// Give back everything the session acquired
    async fn release(&mut self);
}

/// Executors by strategy id
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<StrategyId, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.id(), executor);
    }

    pub fn with(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, id: &StrategyId) -> Option<Arc<dyn Executor>> {
        self.executors.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &StrategyId> {
        self.executors.keys()
    }
}

/// Run one strategy against `target`.
///
/// `timeout` bounds open and fetch together. Once a session is open its
/// `release` is awaited before returning, whether the fetch finished,
/// failed, timed out or was cancelled.
pub async fn run_strategy(
    executor: &dyn Executor,
    target: &Target,
    hints: &ResolveHints,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ExtractionAttempt {
    let strategy = executor.id();

    if let Some(reason) = executor.skip_reason(target) {
        tracing::debug!(%strategy, %target, "Skipped: {}", reason);
        return ExtractionAttempt::skipped(strategy, target, reason);
    }

    let started_at = Utc::now();
    let clock = Instant::now();
    let deadline = clock + timeout;
    let failed = |error: AttemptError| {
        ExtractionAttempt::without_data(
            strategy.clone(),
            target,
            started_at,
            clock.elapsed(),
            error,
        )
    };

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return failed(AttemptError::new(ErrorKind::Cancelled, "cancelled before session opened"));
        }
        _ = tokio::time::sleep_until(deadline) => {
            return failed(timeout_error(timeout));
        }
        opened = executor.open(target, hints) => opened,
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => return failed(e.into()),
    };

    let mut interrupted = false;
    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            interrupted = true;
            Err(AttemptError::new(ErrorKind::Cancelled, "cancelled during fetch"))
        }
        _ = tokio::time::sleep_until(deadline) => {
            interrupted = true;
            Err(timeout_error(timeout))
        }
        fetched = session.fetch(target) => fetched.map_err(AttemptError::from),
    };

    if interrupted {
        tracing::warn!(%strategy, %target, "Releasing session after interrupted fetch");
    }
    session.release().await;

    let content = match fetched {
        Ok(content) => content,
        Err(e) => return failed(e),
    };

    let specs = executor.field_specs(target);
    let (raw_fields, mut gaps) = FieldExtractor::extract_all(&content, &specs);
    for field in missing_required(&raw_fields, target) {
        if !gaps.contains(&field) {
            gaps.push(field);
        }
    }

    let (outcome, error) = match classify(&raw_fields, &gaps) {
        Outcome::Failed => {
            let error = match &content {
                ParsedContent::Html(html) => looks_blocked(html).map(|marker| {
                    AttemptError::new(ErrorKind::Blocked, format!("page shows {}", marker))
                }),
                ParsedContent::Json(_) => None,
            }
            .unwrap_or_else(|| {
                AttemptError::new(
                    ErrorKind::MalformedContent,
                    format!("missing required fields: {}", join_fields(&gaps)),
                )
            });
            (Outcome::Failed, Some(error))
        }
        outcome => (outcome, None),
    };

    tracing::debug!(
        %strategy,
        %target,
        %outcome,
        resolved = raw_fields.len(),
        missing = gaps.len(),
        "Attempt finished"
    );

    ExtractionAttempt {
        strategy,
        target: target.clone(),
        started_at,
        duration: clock.elapsed(),
        outcome,
        raw_fields,
        gaps,
        error,
        skip_reason: None,
    }
}

/// Success when nothing required is missing; partial when at least a title
/// and one engagement metric resolved
pub fn classify(raw: &RawFields, gaps: &[Field]) -> Outcome {
    if gaps.is_empty() && !raw.is_empty() {
        Outcome::Success
    } else if raw.contains_key(&Field::Title) && raw.keys().any(Field::is_engagement) {
        Outcome::Partial
    } else {
        Outcome::Failed
    }
}

const BLOCK_MARKERS: &[(&str, &str)] = &[
    ("/accounts/login", "a login wall"),
    ("g-recaptcha", "a captcha"),
    ("captcha-container", "a captcha"),
    ("cf-challenge", "a challenge page"),
    ("challenge-platform", "a challenge page"),
    ("Log in to see", "a login wall"),
    ("Sign in to confirm you", "a bot check"),
    ("unusual traffic", "a bot check"),
];

/// Marker of a login wall or anti-bot page, if the HTML shows one
pub fn looks_blocked(html: &str) -> Option<&'static str> {
    BLOCK_MARKERS
        .iter()
        .find(|(needle, _)| html.contains(needle))
        .map(|(_, what)| *what)
}

/// Whether a final URL after redirects is a login page
pub fn is_login_url(url: &str) -> bool {
    url.contains("/accounts/login") || url.contains("/login") || url.contains("/i/flow/login")
}

/// Create a remote resource (a browser tab, an actor run) on its own task.
///
/// If the caller stops waiting before `create` finishes, for example on a
/// deadline or cancellation, the finished result is handed to `orphaned`
/// instead of being lost. `None` means the creating task panicked.
pub async fn create_owned<T, F, C, CF>(create: F, orphaned: C) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
    C: FnOnce(T) -> CF + Send + 'static,
    CF: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let created = create.await;
        if let Err(created) = tx.send(created) {
            tracing::debug!("Caller gave up during creation, disposing of the result");
            orphaned(created).await;
        }
    });
    rx.await.ok()
}

fn timeout_error(timeout: Duration) -> AttemptError {
    AttemptError::new(
        ErrorKind::TransientTransport,
        format!("attempt timed out after {}ms", timeout.as_millis()),
    )
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(Field::key)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::classifier::classify as classify_target;
    use serde_json::json;

    fn youtube() -> Target {
        classify_target("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let kind = |code: u16| {
            ExecError::from_status(StatusCode::from_u16(code).unwrap(), None).map(|e| e.kind())
        };
        assert_eq!(kind(200), None);
        assert_eq!(kind(404), Some(ErrorKind::NotFound));
        assert_eq!(kind(410), Some(ErrorKind::NotFound));
        assert_eq!(kind(403), Some(ErrorKind::Blocked));
        assert_eq!(kind(429), Some(ErrorKind::RateLimited));
        assert_eq!(kind(503), Some(ErrorKind::TransientTransport));
        assert_eq!(kind(400), Some(ErrorKind::MalformedContent));
    }

    #[test]
    fn test_classify_outcomes() {
        let mut raw = RawFields::new();
        raw.insert(Field::Title, "t".into());
        assert_eq!(classify(&raw, &[Field::ViewCount]), Outcome::Failed);

        raw.insert(Field::ViewCount, "10".into());
        assert_eq!(classify(&raw, &[Field::LikeCount]), Outcome::Partial);
        assert_eq!(classify(&raw, &[]), Outcome::Success);
    }

    #[test]
    fn test_block_markers() {
        assert_eq!(
            looks_blocked(r#"<div class="g-recaptcha"></div>"#),
            Some("a captcha")
        );
        assert_eq!(looks_blocked("<html><body>hello</body></html>"), None);
        assert!(is_login_url("https://www.instagram.com/accounts/login/?next=/p/x/"));
        assert!(!is_login_url("https://www.instagram.com/p/x/"));
    }

    #[tokio::test]
    async fn test_run_strategy_success_releases_once() {
        let target = youtube();
        let executor = ScriptedExecutor::new(
            "browser_dom",
            vec![ScriptedStep::Content(json!({
                "title": "Never Gonna Give You Up",
                "view_count": "1.2B",
                "like_count": "17M",
                "upload_date": "2009-10-25",
                "creator_username": "Rick Astley",
            }))],
        );

        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(attempt.outcome, Outcome::Success);
        assert!(attempt.gaps.is_empty());
        assert_eq!(executor.counters().opens.load(Ordering::SeqCst), 1);
        assert_eq!(executor.counters().releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_strategy_title_only_is_malformed() {
        let target = youtube();
        let executor = ScriptedExecutor::new(
            "http_html",
            vec![ScriptedStep::Content(json!({"title": "only a title"}))],
        );

        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(attempt.outcome, Outcome::Failed);
        assert_eq!(attempt.error_kind(), Some(ErrorKind::MalformedContent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_strategy_timeout_still_releases() {
        let target = youtube();
        let executor = ScriptedExecutor::new("browser_dom", vec![ScriptedStep::Hang]);

        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(2),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(attempt.error_kind(), Some(ErrorKind::TransientTransport));
        assert_eq!(executor.counters().releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_strategy_skip_opens_nothing() {
        let target = youtube();
        let executor =
            ScriptedExecutor::new("apify_actor", vec![]).skipping("actor token not configured");

        let attempt = run_strategy(
            &executor,
            &target,
            &ResolveHints::default(),
            Duration::from_secs(2),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(attempt.outcome, Outcome::Skipped);
        assert_eq!(executor.counters().opens.load(Ordering::SeqCst), 0);
        assert_eq!(executor.counters().releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_owned_hands_result_back() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = disposed.clone();
        let created = create_owned(async { 7 }, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(created, Some(7));
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_owned_disposes_when_abandoned() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = disposed.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let creating = create_owned(
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                "tab"
            },
            move |tab| async move {
                assert_eq!(tab, "tab");
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = creating => panic!("creation should still be pending"),
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}

//! # clipscout
//!
//! Resolves a short-form video URL or handle into one canonical metadata
//! record (title, engagement counts, caption tags, creator) across YouTube,
//! Instagram, TikTok and Twitter/X.
//!
//! ## Architecture
//!
//! ```text
//! classify → StrategyTable → Orchestrator ⇄ RateLimiter
//!                                 ↓
//!                  Executor/Session → FieldExtractor
//!                                 ↓
//!                 Normalizer → (TextAnalyzer) → CanonicalResult
//! ```
//!
//! Each platform has an ordered chain of strategies (headless browser, plain
//! HTTP, public APIs, an authenticated scraping actor). The orchestrator
//! retries transient failures, escalates along the chain and keeps the most
//! complete partial result when nothing fully succeeds.
//!
//! ## Quick Start
//!
//! ```bash
//! # Resolve one video
//! clipscout resolve https://www.youtube.com/watch?v=dQw4w9WgXcQ
//!
//! # Bare handle with a platform hint
//! clipscout resolve @natgeo --platform instagram
//!
//! # Resolve a list of targets, 8 at a time
//! clipscout batch targets.txt --workers 8
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components
/// from the loaded [`Config`](config::Config): executors, rate limiter,
/// orchestrator, pipeline and analyzer.
pub mod app;

/// Configuration management.
///
/// Loads from `~/.config/clipscout/config.toml`, supporting:
/// - Retry, timeout and completeness settings
/// - Strategy chains and rate limits per platform
/// - Browser/HTTP settings and credentials
pub mod config;

/// Command-line interface using clap.
///
/// - `resolve <target>` - Resolve one target
/// - `classify <target>` - Show the classification only
/// - `batch <file>` - Resolve many targets concurrently
/// - `chains` - Print strategy chains
pub mod cli;

/// Core domain models.
///
/// - [`Target`](domain::Target): classified input
/// - [`ExtractionAttempt`](domain::ExtractionAttempt): one strategy invocation
/// - [`CanonicalResult`](domain::CanonicalResult): the normalized record
pub mod domain;

/// URL and handle classification into platform and content type.
pub mod classifier;

/// Field locators and per-platform field tables.
pub mod extractor;

/// Strategy executors and the attempt runner.
///
/// - [`BrowserExecutor`](executor::BrowserExecutor): headless Chrome via chromiumoxide
/// - [`HttpHtmlExecutor`](executor::HttpHtmlExecutor): reqwest page fetch
/// - [`PublicApiExecutor`](executor::PublicApiExecutor): YouTube Data API and oEmbed endpoints
/// - [`ApifyExecutor`](executor::ApifyExecutor): authenticated actor runs
/// - [`ScriptedExecutor`](executor::ScriptedExecutor): replayed outcomes for tests
pub mod executor;

/// Retry, escalation and best-partial selection.
pub mod orchestrator;

/// Unit conversion and canonical record construction.
pub mod normalizer;

/// Per-platform token buckets and concurrency caps.
pub mod ratelimit;

/// Attempt and resolution counters.
pub mod metrics;

/// Optional text analysis of resolved captions.
pub mod analysis;

/// Classifier, orchestrator, normalizer and analyzer wired together.
///
/// [`Pipeline::resolve_all`](pipeline::Pipeline::resolve_all) resolves
/// targets concurrently with a semaphore; cancelling its token or dropping
/// the future releases every open session.
pub mod pipeline;

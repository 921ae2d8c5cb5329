use std::sync::Arc;

use crate::analysis::{ChatAnalyzer, TextAnalyzer};
use crate::app::error::Result;
use crate::config::Config;
use crate::executor::{
    ApifyExecutor, BrowserExecutor, ExecutorRegistry, HttpHtmlExecutor, PublicApiExecutor,
};
use crate::metrics::Metrics;
use crate::orchestrator::Orchestrator;
use crate::pipeline::Pipeline;
use crate::ratelimit::RateLimiter;

pub struct AppContext {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let workers = config.pipeline.workers;
        Self::with_workers(config, workers, true)
    }

    /// Context resolving `workers` targets at a time; `analysis` turns the
    /// text analyzer on when the configuration allows it
    pub fn with_workers(config: Config, workers: usize, analysis: bool) -> Result<Self> {
        let registry = Self::registry(&config)?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));

        let orchestrator = Orchestrator::new(registry, config.strategy_table())
            .with_limiter(limiter)
            .with_metrics(Arc::new(Metrics::new()))
            .with_policy(config.pipeline.retry_policy())
            .with_attempt_timeout(config.pipeline.attempt_timeout())
            .with_min_completeness(config.pipeline.min_completeness);

        let mut pipeline = Pipeline::with_workers(orchestrator, workers);
        if analysis {
            if let Some(analyzer) = ChatAnalyzer::from_settings(&config.analysis)? {
                let analyzer: Arc<dyn TextAnalyzer> = Arc::new(analyzer);
                pipeline = pipeline.with_analyzer(analyzer);
            } else {
                tracing::debug!("Text analysis disabled or no API key configured");
            }
        }

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
        })
    }

    /// Every built-in executor, configured from `config`
    pub fn registry(config: &Config) -> Result<ExecutorRegistry> {
        let credentials = &config.credentials;

        let registry = ExecutorRegistry::new()
            .with(Arc::new(BrowserExecutor::new(config.browser.clone())))
            .with(Arc::new(HttpHtmlExecutor::new(&config.http)?))
            .with(Arc::new(PublicApiExecutor::new(
                &config.http,
                credentials.youtube_api_key.clone(),
                credentials.instagram_access_token.clone(),
            )?))
            .with(Arc::new(ApifyExecutor::new(
                &config.http,
                credentials.apify_token.clone(),
            )?));

        Ok(registry)
    }
}

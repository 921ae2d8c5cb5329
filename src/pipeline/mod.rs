use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::analysis::TextAnalyzer;
use crate::classifier::classify_with_hint;
use crate::domain::{
    AttemptSummary, CanonicalResult, ErrorKind, ExtractionAttempt, Platform, ResolveHints,
};
use crate::metrics::Metrics;
use crate::normalizer::Normalizer;
use crate::orchestrator::{Orchestrator, StrategyTable, Verdict};

pub const DEFAULT_WORKERS: usize = 4;

/// Why a target could not be resolved, with every attempt made
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{error_kind}: {message}")]
pub struct ResolutionFailure {
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub attempts: Vec<AttemptSummary>,
}

impl ResolutionFailure {
    fn new(error_kind: ErrorKind, message: impl Into<String>, attempts: &[ExtractionAttempt]) -> Self {
        Self {
            error_kind,
            message: message.into(),
            attempts: attempts.iter().map(ExtractionAttempt::summary).collect(),
        }
    }
}

pub type Resolved = Result<CanonicalResult, ResolutionFailure>;

/// Classifier, orchestrator, normalizer and optional analyzer wired together
pub struct Pipeline {
    orchestrator: Orchestrator,
    normalizer: Normalizer,
    analyzer: Option<Arc<dyn TextAnalyzer>>,
    semaphore: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self::with_workers(orchestrator, DEFAULT_WORKERS)
    }

    pub fn with_workers(orchestrator: Orchestrator, workers: usize) -> Self {
        Self {
            orchestrator,
            normalizer: Normalizer::new(),
            analyzer: None,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn metrics(&self) -> &Metrics {
        self.orchestrator.metrics()
    }

    pub fn strategy_table(&self) -> &StrategyTable {
        self.orchestrator.table()
    }

    pub async fn resolve(&self, input: &str, hints: &ResolveHints) -> Resolved {
        self.resolve_with_cancel(input, hints, &CancellationToken::new())
            .await
    }

    /// Resolve one target; cancelling `cancel` stops the active attempt and
    /// releases its session before this returns
    pub async fn resolve_with_cancel(
        &self,
        input: &str,
        hints: &ResolveHints,
        cancel: &CancellationToken,
    ) -> Resolved {
        let started = Instant::now();

        let target = match classify_with_hint(input, hints.platform_hint) {
            Ok(target) => target,
            Err(e) => {
                tracing::debug!("{}", e);
                self.metrics().record_resolution(
                    hints.platform_hint.unwrap_or(Platform::Unknown),
                    false,
                    started.elapsed(),
                );
                return Err(ResolutionFailure::new(
                    ErrorKind::UnrecognizedTarget,
                    e.to_string(),
                    &[],
                ));
            }
        };

        tracing::info!(%target, "Resolving target");
        let run = self.orchestrator.run(&target, hints, cancel).await;

        let result = match (&run.verdict, run.chosen()) {
            (_, Some(attempt)) => self
                .normalizer
                .normalize(attempt, &target)
                .map_err(|e| {
                    ResolutionFailure::new(ErrorKind::MalformedContent, e.to_string(), &run.attempts)
                }),
            (Verdict::Failed { kind, message }, None) => {
                Err(ResolutionFailure::new(*kind, message.clone(), &run.attempts))
            }
            (Verdict::Resolved { .. }, None) => Err(ResolutionFailure::new(
                ErrorKind::NoStrategySucceeded,
                "chosen attempt missing",
                &run.attempts,
            )),
        };

        self.metrics()
            .record_resolution(target.platform(), result.is_ok(), started.elapsed());

        match result {
            Ok(mut record) => {
                tracing::info!(
                    %target,
                    strategy = %record.raw_strategy_used,
                    completeness = record.completeness_score,
                    degraded = record.degraded,
                    "Resolved target"
                );
                if let Some(ref analyzer) = self.analyzer {
                    self.decorate(analyzer.as_ref(), &mut record).await;
                }
                Ok(record)
            }
            Err(failure) => {
                tracing::info!(%target, kind = %failure.error_kind, "Resolution failed: {}", failure.message);
                Err(failure)
            }
        }
    }

    async fn decorate(&self, analyzer: &dyn TextAnalyzer, record: &mut CanonicalResult) {
        let text = record.analysis_text();
        if text.is_empty() {
            return;
        }
        match analyzer.analyze(&text).await {
            Ok(analysis) => record.analysis = Some(analysis),
            Err(e) => tracing::warn!(canonical_id = %record.canonical_id, "Analysis failed: {}", e),
        }
    }

    /// Resolve many targets concurrently, at most `workers` at a time.
    ///
    /// Results come back in input order, one per input. Cancelling `cancel`,
    /// or dropping the returned future, cancels every resolution still
    /// running; each releases its active session before its task ends.
    pub async fn resolve_all(
        self: &Arc<Self>,
        inputs: Vec<String>,
        hints: &ResolveHints,
        cancel: &CancellationToken,
    ) -> Vec<(String, Resolved)> {
        let batch = cancel.child_token();
        let _cancel_on_drop = batch.clone().drop_guard();
        let mut handles = Vec::with_capacity(inputs.len());

        for input in inputs {
            let pipeline = self.clone();
            let semaphore = self.semaphore.clone();
            let hints = hints.clone();
            let cancel = batch.clone();
            let task_input = input.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                pipeline
                    .resolve_with_cancel(&task_input, &hints, &cancel)
                    .await
            });

            handles.push((input, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (input, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(%input, "Task join error: {}", e);
                    let kind = if e.is_cancelled() {
                        ErrorKind::Cancelled
                    } else {
                        ErrorKind::NoStrategySucceeded
                    };
                    Err(ResolutionFailure::new(
                        kind,
                        format!("resolution task failed: {}", e),
                        &[],
                    ))
                }
            };
            results.push((input, result));
        }

        results
    }
}

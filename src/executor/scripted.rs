use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Platform, ResolveHints, StrategyId, Target};
use crate::executor::{ExecError, Executor, Mechanism, ParsedContent, Session};
use crate::extractor::{specs, FieldSpec};

/// What the next fetch of a [`ScriptedExecutor`] does
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Return a JSON document keyed by field names
    Content(Value),
    /// Return an HTML page
    Html(String),
    Fail(ExecError),
    /// Never complete
    Hang,
}

/// Calls observed by a scripted executor
#[derive(Debug, Default)]
pub struct ScriptCounters {
    pub opens: AtomicUsize,
    pub fetches: AtomicUsize,
    pub releases: AtomicUsize,
}

/// Executor that replays a fixed list of steps, one per fetch.
///
/// Stands in for a real mechanism in tests and dry runs; documents are read
/// with one `Json(field_key)` locator per field.
pub struct ScriptedExecutor {
    id: StrategyId,
    steps: Arc<Mutex<VecDeque<ScriptedStep>>>,
    counters: Arc<ScriptCounters>,
    skip: Option<String>,
}

impl ScriptedExecutor {
    pub fn new(id: &str, steps: Vec<ScriptedStep>) -> Self {
        Self {
            id: StrategyId::new(id),
            steps: Arc::new(Mutex::new(steps.into())),
            counters: Arc::new(ScriptCounters::default()),
            skip: None,
        }
    }

    /// Report every target as not applicable
    pub fn skipping(mut self, reason: &str) -> Self {
        self.skip = Some(reason.to_string());
        self
    }

    pub fn counters(&self) -> &Arc<ScriptCounters> {
        &self.counters
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn mechanism(&self) -> Mechanism {
        Mechanism::Scripted
    }

    fn supports(&self, _platform: Platform) -> bool {
        true
    }

    fn skip_reason(&self, _target: &Target) -> Option<String> {
        self.skip.clone()
    }

    fn field_specs(&self, target: &Target) -> Vec<FieldSpec> {
        specs::flat_specs(target)
    }

    async fn open(
        &self,
        _target: &Target,
        _hints: &ResolveHints,
    ) -> Result<Box<dyn Session>, ExecError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            steps: self.steps.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedSession {
    steps: Arc<Mutex<VecDeque<ScriptedStep>>>,
    counters: Arc<ScriptCounters>,
}

impl ScriptedSession {
    fn next_step(&self) -> Option<ScriptedStep> {
        match self.steps.lock() {
            Ok(mut steps) => steps.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn fetch(&mut self, _target: &Target) -> Result<ParsedContent, ExecError> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Some(ScriptedStep::Content(value)) => Ok(ParsedContent::Json(value)),
            Some(ScriptedStep::Html(html)) => Ok(ParsedContent::Html(html)),
            Some(ScriptedStep::Fail(err)) => Err(err),
            Some(ScriptedStep::Hang) => std::future::pending().await,
            None => Err(ExecError::Transport("script exhausted".to_string())),
        }
    }

    async fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Field, Target};

/// Raw, unconverted field values as an executor found them
pub type RawFields = BTreeMap<Field, String>;

/// Identifier of one extraction strategy, e.g. `browser_dom`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StrategyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StrategyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Failure taxonomy shared by every layer of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnrecognizedTarget,
    TransientTransport,
    Blocked,
    NotFound,
    RateLimited,
    MalformedContent,
    NoStrategySucceeded,
    Cancelled,
}

impl ErrorKind {
    /// Retried on the same strategy; everything else escalates or terminates
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientTransport | ErrorKind::RateLimited)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnrecognizedTarget => "unrecognized_target",
            ErrorKind::TransientTransport => "transient_transport",
            ErrorKind::Blocked => "blocked",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::MalformedContent => "malformed_content",
            ErrorKind::NoStrategySucceeded => "no_strategy_succeeded",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result category of one strategy invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }

    pub fn produced_data(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Partial)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt failed or was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
    /// Delay requested by the source or the rate limiter before retrying
    pub retry_after: Option<Duration>,
}

impl AttemptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Record of a single strategy invocation, kept for the active resolution only
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub strategy: StrategyId,
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: Outcome,
    pub raw_fields: RawFields,
    /// Required fields no locator resolved
    pub gaps: Vec<Field>,
    pub error: Option<AttemptError>,
    /// Why the strategy did not apply, for skipped attempts
    pub skip_reason: Option<String>,
}

impl ExtractionAttempt {
    /// An attempt that never produced content
    pub fn without_data(
        strategy: StrategyId,
        target: &Target,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: AttemptError,
    ) -> Self {
        Self {
            strategy,
            target: target.clone(),
            started_at,
            duration,
            outcome: Outcome::Failed,
            raw_fields: RawFields::new(),
            gaps: Vec::new(),
            error: Some(error),
            skip_reason: None,
        }
    }

    pub fn skipped(strategy: StrategyId, target: &Target, reason: impl Into<String>) -> Self {
        Self {
            strategy,
            target: target.clone(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
            outcome: Outcome::Skipped,
            raw_fields: RawFields::new(),
            gaps: Vec::new(),
            error: None,
            skip_reason: Some(reason.into()),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            strategy: self.strategy.clone(),
            outcome: self.outcome,
            duration_ms: self.duration.as_millis() as u64,
            fields_resolved: self.raw_fields.len(),
            missing_required: self.gaps.clone(),
            error_kind: self.error_kind(),
            message: self
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .or_else(|| self.skip_reason.clone()),
        }
    }
}

/// Caller-facing diagnostics for one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub strategy: StrategyId,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub fields_resolved: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_required: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::TransientTransport.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::Blocked.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::MalformedContent.is_retryable());
        assert!(!ErrorKind::UnrecognizedTarget.is_retryable());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoStrategySucceeded).unwrap();
        assert_eq!(json, "\"no_strategy_succeeded\"");
    }

    #[test]
    fn test_skipped_summary_carries_reason() {
        let target = Target::new(
            crate::domain::Platform::YouTube,
            crate::domain::ContentType::Video,
            "dQw4w9WgXcQ",
            "x",
        );
        let summary = ExtractionAttempt::skipped("public_api".into(), &target, "no API key")
            .summary();
        assert_eq!(summary.outcome, Outcome::Skipped);
        assert_eq!(summary.error_kind, None);
        assert_eq!(summary.message.as_deref(), Some("no API key"));
    }

    #[test]
    fn test_strategy_id_is_transparent() {
        let id = StrategyId::new("browser_dom");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"browser_dom\"");
        assert_eq!(id.to_string(), "browser_dom");
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ContentType, Field, Platform, StrategyId};

/// Creator of the resolved content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub username: Option<String>,
    pub profile_url: Option<String>,
    pub follower_count: Option<u64>,
}

/// Output of the optional text-analysis decoration step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub summary: String,
    pub sentiment: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The canonical, platform-independent record returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    pub platform: Platform,
    pub content_type: ContentType,
    pub canonical_id: String,
    pub source_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
    /// Playback length in seconds
    pub duration_secs: Option<u64>,
    /// `YYYY-MM-DD` when the source date could be parsed, raw text otherwise
    pub upload_date: Option<String>,
    pub creator: Creator,
    pub hashtags: BTreeSet<String>,
    pub mentions: BTreeSet<String>,
    pub thumbnail_url: Option<String>,
    /// (likes + comments + shares) / views
    pub engagement_rate: Option<f64>,
    pub raw_strategy_used: StrategyId,
    pub completeness_score: f64,
    /// Set when at least one required field is missing
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ContentAnalysis>,
    pub fetched_at: DateTime<Utc>,
}

impl CanonicalResult {
    /// Text handed to the analysis collaborator: title and description
    pub fn analysis_text(&self) -> String {
        [self.title.as_deref(), self.description.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

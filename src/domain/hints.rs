use serde::{Deserialize, Serialize};

use crate::domain::Platform;

/// Caller-supplied hints for one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveHints {
    /// Upper bound on items an actor run may collect
    pub max_items: Option<usize>,
    /// Platform for bare handles and hashtags
    pub platform_hint: Option<Platform>,
}

impl ResolveHints {
    pub fn with_platform(platform: Platform) -> Self {
        Self {
            platform_hint: Some(platform),
            ..Self::default()
        }
    }

    /// Item limit for actor runs, at least one
    pub fn item_limit(&self) -> usize {
        self.max_items.unwrap_or(1).max(1)
    }
}

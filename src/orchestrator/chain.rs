use std::collections::BTreeMap;

use crate::domain::{Platform, StrategyId};
use crate::executor::{apify, browser, http, public_api};

/// Ordered strategy ids per platform
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyTable {
    chains: BTreeMap<Platform, Vec<StrategyId>>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        let chain = |ids: &[&str]| -> Vec<StrategyId> {
            ids.iter().map(|id| StrategyId::new(*id)).collect()
        };
        Self {
            chains: BTreeMap::from([
                (
                    Platform::YouTube,
                    chain(&[
                        public_api::STRATEGY_ID,
                        http::STRATEGY_ID,
                        browser::STRATEGY_ID,
                    ]),
                ),
                (
                    Platform::Instagram,
                    chain(&[
                        browser::STRATEGY_ID,
                        http::STRATEGY_ID,
                        public_api::STRATEGY_ID,
                        apify::STRATEGY_ID,
                    ]),
                ),
                (
                    Platform::TikTok,
                    chain(&[
                        browser::STRATEGY_ID,
                        http::STRATEGY_ID,
                        public_api::STRATEGY_ID,
                        apify::STRATEGY_ID,
                    ]),
                ),
                (
                    Platform::Twitter,
                    chain(&[
                        public_api::STRATEGY_ID,
                        browser::STRATEGY_ID,
                        apify::STRATEGY_ID,
                    ]),
                ),
            ]),
        }
    }
}

impl StrategyTable {
    /// Table with no chains at all
    pub fn empty() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }

    /// Replace the chain of `platform`
    pub fn with_chain<I, S>(mut self, platform: Platform, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StrategyId>,
    {
        self.set_chain(platform, ids);
        self
    }

    pub fn set_chain<I, S>(&mut self, platform: Platform, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<StrategyId>,
    {
        self.chains
            .insert(platform, ids.into_iter().map(Into::into).collect());
    }

    /// Chain for `platform`; empty when none is configured
    pub fn chain(&self, platform: Platform) -> &[StrategyId] {
        self.chains.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Platform, &[StrategyId])> {
        self.chains.iter().map(|(p, ids)| (*p, ids.as_slice()))
    }
}

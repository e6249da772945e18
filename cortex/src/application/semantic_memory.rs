// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Semantic memory
//!
//! Trader reliability profiles and per-symbol market knowledge. Records are
//! created on first reference through an explicit upsert (`trader_profile`,
//! `market_knowledge`) with reliability 0.5 and empty histories.
//!
//! Each cache is guarded by an async mutex held across the whole
//! read-modify-persist sequence, so concurrent updates to one record are
//! never lost. A failed store write leaves the cached value authoritative.
//! A failed store read caches nothing: reads fall back to an uncached
//! default and mutations are applied to a scratch record that is neither
//! cached nor persisted, so a transient outage cannot overwrite stored history.
//!
//! History lists are capped at [`HISTORY_LIMIT`](crate::domain::HISTORY_LIMIT)
//! by the record types themselves; every append in this module goes through them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Reliability-scored knowledge about traders and markets

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{
    FeedbackSource, KnowledgeRepository, MarketKnowledge, SignalEntry, TradeEntry, TraderProfile,
};

pub struct SemanticTier {
    repository: Arc<dyn KnowledgeRepository>,
    feedback_decay: f64,
    traders: Mutex<HashMap<String, TraderProfile>>,
    markets: Mutex<HashMap<String, MarketKnowledge>>,
}

impl SemanticTier {
    pub fn new(repository: Arc<dyn KnowledgeRepository>, feedback_decay: f64) -> Self {
        Self {
            repository,
            feedback_decay,
            traders: Mutex::new(HashMap::new()),
            markets: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the trader's profile, creating and persisting a default one if
    /// none exists yet.
    pub async fn trader_profile(&self, trader_id: &str) -> TraderProfile {
        let mut cache = self.traders.lock().await;
        match self.ensure_trader(&mut cache, trader_id).await {
            Some(profile) => profile.clone(),
            None => TraderProfile::new(trader_id),
        }
    }

    /// Fetch the symbol's market record, creating and persisting a default
    /// one if none exists yet.
    pub async fn market_knowledge(&self, symbol: &str) -> MarketKnowledge {
        let mut cache = self.markets.lock().await;
        match self.ensure_market(&mut cache, symbol).await {
            Some(market) => market.clone(),
            None => MarketKnowledge::new(symbol),
        }
    }

    /// Count one more success or failure and recompute reliability as the
    /// success ratio. Returns the new reliability.
    pub async fn update_trader_reliability(&self, trader_id: &str, success: bool) -> f64 {
        let reliability = self
            .modify_trader(trader_id, |profile| {
                profile.record_outcome(success);
                profile.reliability
            })
            .await;
        debug!(trader_id, success, reliability, "Updated trader reliability");
        reliability
    }

    /// Blend a feedback value into the trader's reliability with the
    /// configured decay.
    pub async fn apply_trader_feedback(&self, trader_id: &str, value: f64, source: FeedbackSource) -> f64 {
        let decay = self.feedback_decay;
        self.modify_trader(trader_id, |profile| profile.apply_feedback(value, decay, source))
            .await
    }

    pub async fn apply_market_feedback(&self, symbol: &str, value: f64, source: FeedbackSource) -> f64 {
        let decay = self.feedback_decay;
        self.modify_market(symbol, |market| market.apply_feedback(value, decay, source))
            .await
    }

    pub async fn add_trade_to_history(&self, trader_id: &str, entry: TradeEntry) {
        self.modify_trader(trader_id, |profile| profile.push_trade(entry))
            .await
    }

    pub async fn add_signal_to_market(&self, symbol: &str, entry: SignalEntry) {
        self.modify_market(symbol, |market| market.push_signal(entry))
            .await
    }

    pub async fn add_price_point(&self, symbol: &str, price: f64) {
        self.modify_market(symbol, |market| market.push_price(price))
            .await
    }

    /// Forget cached records; the next access reloads from the store.
    pub async fn clear_caches(&self) {
        self.traders.lock().await.clear();
        self.markets.lock().await.clear();
    }

    async fn modify_trader<R>(&self, trader_id: &str, f: impl FnOnce(&mut TraderProfile) -> R) -> R {
        let mut cache = self.traders.lock().await;
        let Some(profile) = self.ensure_trader(&mut cache, trader_id).await else {
            warn!(trader_id, "Trader profile unavailable, update not persisted");
            return f(&mut TraderProfile::new(trader_id));
        };
        let out = f(profile);
        if let Err(e) = self.repository.save_trader(profile).await {
            warn!(trader_id, error = %e, "Failed to persist trader profile");
        }
        out
    }

    async fn modify_market<R>(&self, symbol: &str, f: impl FnOnce(&mut MarketKnowledge) -> R) -> R {
        let mut cache = self.markets.lock().await;
        let Some(market) = self.ensure_market(&mut cache, symbol).await else {
            warn!(symbol, "Market knowledge unavailable, update not persisted");
            return f(&mut MarketKnowledge::new(symbol));
        };
        let out = f(market);
        if let Err(e) = self.repository.save_market(market).await {
            warn!(symbol, error = %e, "Failed to persist market knowledge");
        }
        out
    }

    /// Load the cached record, falling back to the store and then to a fresh
    /// persisted default. `None` when the store could not be read.
    async fn ensure_trader<'a>(
        &self,
        cache: &'a mut HashMap<String, TraderProfile>,
        trader_id: &str,
    ) -> Option<&'a mut TraderProfile> {
        if !cache.contains_key(trader_id) {
            let profile = match self.repository.find_trader(trader_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    let profile = TraderProfile::new(trader_id);
                    if let Err(e) = self.repository.save_trader(&profile).await {
                        warn!(trader_id, error = %e, "Failed to persist new trader profile");
                    }
                    debug!(trader_id, "Created trader profile");
                    profile
                }
                Err(e) => {
                    warn!(trader_id, error = %e, "Failed to load trader profile");
                    return None;
                }
            };
            cache.insert(trader_id.to_string(), profile);
        }
        cache.get_mut(trader_id)
    }

    async fn ensure_market<'a>(
        &self,
        cache: &'a mut HashMap<String, MarketKnowledge>,
        symbol: &str,
    ) -> Option<&'a mut MarketKnowledge> {
        if !cache.contains_key(symbol) {
            let market = match self.repository.find_market(symbol).await {
                Ok(Some(market)) => market,
                Ok(None) => {
                    let market = MarketKnowledge::new(symbol);
                    if let Err(e) = self.repository.save_market(&market).await {
                        warn!(symbol, error = %e, "Failed to persist new market knowledge");
                    }
                    debug!(symbol, "Created market knowledge");
                    market
                }
                Err(e) => {
                    warn!(symbol, error = %e, "Failed to load market knowledge");
                    return None;
                }
            };
            cache.insert(symbol.to_string(), market);
        }
        cache.get_mut(symbol)
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Knowledge Records
//!
//! Trader profiles and market knowledge held by the semantic tier.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Reliability-scored records with bounded histories
//!
//! Every history list on these records is capped at [`HISTORY_LIMIT`] entries.
//! The cap lives in [`push_bounded`], which is the only way the records grow a
//! list, so the semantic tier's append helpers and the feedback path cannot
//! disagree about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum entries retained in any trade, signal, price or feedback history.
pub const HISTORY_LIMIT: usize = 100;

/// Reliability assigned to a record created on first reference.
pub const DEFAULT_RELIABILITY: f64 = 0.5;

/// `old * decay + value * (1 - decay)`, clamped to `[0, 1]`.
pub fn decayed_update(old: f64, value: f64, decay: f64) -> f64 {
    (old * decay + value * (1.0 - decay)).clamp(0.0, 1.0)
}

/// Append and drop the oldest entries beyond [`HISTORY_LIMIT`].
pub fn push_bounded<T>(list: &mut Vec<T>, item: T) {
    list.push(item);
    if list.len() > HISTORY_LIMIT {
        let overflow = list.len() - HISTORY_LIMIT;
        list.drain(..overflow);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    User,
    TradeOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub value: f64,
    pub source: FeedbackSource,
    pub reliability_after: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub symbol: String,
    pub action: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub action: String,
    #[serde(default)]
    pub trader_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// What the agent has learned about one signal provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderProfile {
    pub trader_id: String,
    pub reliability: f64,
    pub successful_signals: u64,
    pub failed_signals: u64,
    #[serde(default)]
    pub trade_history: Vec<TradeEntry>,
    #[serde(default)]
    pub feedback_history: Vec<FeedbackEntry>,
    #[serde(default)]
    pub preferences: Map<String, Value>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TraderProfile {
    pub fn new(trader_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            trader_id: trader_id.into(),
            reliability: DEFAULT_RELIABILITY,
            successful_signals: 0,
            failed_signals: 0,
            trade_history: Vec::new(),
            feedback_history: Vec::new(),
            preferences: Map::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Count one resolved signal and recompute reliability from the counters.
    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.successful_signals += 1;
        } else {
            self.failed_signals += 1;
        }
        let total = self.successful_signals + self.failed_signals;
        if total > 0 {
            self.reliability = (self.successful_signals as f64 / total as f64).clamp(0.0, 1.0);
        }
        self.updated_at = Utc::now();
    }

    /// Blend a feedback value into reliability and log it in the feedback history.
    pub fn apply_feedback(&mut self, value: f64, decay: f64, source: FeedbackSource) -> f64 {
        self.reliability = decayed_update(self.reliability, value, decay);
        let now = Utc::now();
        push_bounded(
            &mut self.feedback_history,
            FeedbackEntry {
                value,
                source,
                reliability_after: self.reliability,
                timestamp: now,
            },
        );
        self.updated_at = now;
        self.reliability
    }

    pub fn push_trade(&mut self, entry: TradeEntry) {
        push_bounded(&mut self.trade_history, entry);
        self.updated_at = Utc::now();
    }
}

/// What the agent has learned about one traded instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketKnowledge {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub reliability: f64,
    #[serde(default)]
    pub price_history: Vec<PricePoint>,
    #[serde(default)]
    pub trade_signals: Vec<SignalEntry>,
    #[serde(default)]
    pub feedback_history: Vec<FeedbackEntry>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MarketKnowledge {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let now = Utc::now();
        Self {
            name: symbol.clone(),
            symbol,
            sector: "Unknown".to_string(),
            reliability: DEFAULT_RELIABILITY,
            price_history: Vec::new(),
            trade_signals: Vec::new(),
            feedback_history: Vec::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_feedback(&mut self, value: f64, decay: f64, source: FeedbackSource) -> f64 {
        self.reliability = decayed_update(self.reliability, value, decay);
        let now = Utc::now();
        push_bounded(
            &mut self.feedback_history,
            FeedbackEntry {
                value,
                source,
                reliability_after: self.reliability,
                timestamp: now,
            },
        );
        self.updated_at = now;
        self.reliability
    }

    pub fn push_signal(&mut self, entry: SignalEntry) {
        push_bounded(&mut self.trade_signals, entry);
        self.updated_at = Utc::now();
    }

    pub fn push_price(&mut self, price: f64) {
        let now = Utc::now();
        push_bounded(&mut self.price_history, PricePoint { price, timestamp: now });
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decayed_update_scenario() {
        let updated = decayed_update(0.5, 1.0, 0.9);
        assert!((updated - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_decayed_update_is_clamped() {
        assert_eq!(decayed_update(0.0, -1.0, 0.5), 0.0);
        assert_eq!(decayed_update(1.0, 5.0, 0.1), 1.0);
    }

    #[test]
    fn test_reliability_stays_in_bounds_under_mixed_feedback() {
        let mut trader = TraderProfile::new("alice");
        let values = [1.0, -1.0, -1.0, 0.3, 1.0, -0.7, 1.0, 1.0, -1.0, 0.0];
        for (i, value) in values.iter().cycle().take(500).enumerate() {
            if i % 7 == 0 {
                trader.record_outcome(i % 2 == 0);
            } else {
                trader.apply_feedback(*value, 0.9, FeedbackSource::User);
            }
            assert!((0.0..=1.0).contains(&trader.reliability));
        }
    }

    #[test]
    fn test_record_outcome_recomputes_ratio() {
        let mut trader = TraderProfile::new("bob");
        trader.record_outcome(true);
        trader.record_outcome(true);
        trader.record_outcome(false);
        assert_eq!(trader.successful_signals, 2);
        assert_eq!(trader.failed_signals, 1);
        assert!((trader.reliability - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_histories_are_capped_oldest_first() {
        let mut market = MarketKnowledge::new("BTC");
        for i in 0..(HISTORY_LIMIT + 25) {
            market.push_price(i as f64);
            market.apply_feedback(0.1, 0.9, FeedbackSource::TradeOutcome);
        }
        assert_eq!(market.price_history.len(), HISTORY_LIMIT);
        assert_eq!(market.feedback_history.len(), HISTORY_LIMIT);
        assert_eq!(market.price_history[0].price, 25.0);
    }

    #[test]
    fn test_new_market_defaults() {
        let market = MarketKnowledge::new("ETH");
        assert_eq!(market.name, "ETH");
        assert_eq!(market.sector, "Unknown");
        assert_eq!(market.reliability, DEFAULT_RELIABILITY);
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feedback and Trade Outcomes
//!
//! Explicit user feedback, implicit trade outcomes and the signal log that
//! the learning engines mine.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Input and record types for the feedback path

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::knowledge::FeedbackSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackId(pub Uuid);

impl FeedbackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeedbackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which record a piece of feedback is about.
///
/// Unrecognised tags are kept verbatim in `Other` so they are still recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FeedbackKind {
    TradeSignal,
    TraderReliability,
    Strategy,
    #[default]
    General,
    Other(String),
}

impl FeedbackKind {
    pub fn as_str(&self) -> &str {
        match self {
            FeedbackKind::TradeSignal => "trade_signal",
            FeedbackKind::TraderReliability => "trader_reliability",
            FeedbackKind::Strategy => "strategy",
            FeedbackKind::General => "general",
            FeedbackKind::Other(tag) => tag.as_str(),
        }
    }
}

impl From<String> for FeedbackKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "trade_signal" => FeedbackKind::TradeSignal,
            "trader_reliability" => FeedbackKind::TraderReliability,
            "strategy" => FeedbackKind::Strategy,
            "general" | "" => FeedbackKind::General,
            _ => FeedbackKind::Other(tag),
        }
    }
}

impl From<FeedbackKind> for String {
    fn from(kind: FeedbackKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Raw feedback value as supplied by a user: a score or a keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackValue {
    Score(f64),
    Keyword(String),
}

impl FeedbackValue {
    /// Map to `[-1, 1]`. Keywords outside the known sets are neutral.
    pub fn normalize(&self) -> f64 {
        match self {
            FeedbackValue::Score(score) if score.is_nan() => 0.0,
            FeedbackValue::Score(score) => score.clamp(-1.0, 1.0),
            FeedbackValue::Keyword(word) => match word.trim().to_lowercase().as_str() {
                "positive" | "good" | "yes" => 1.0,
                "negative" | "bad" | "no" => -1.0,
                _ => 0.0,
            },
        }
    }
}

impl Default for FeedbackValue {
    fn default() -> Self {
        FeedbackValue::Score(0.0)
    }
}

/// A state/action pair to feed into Q-learning alongside a reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Value,
    pub action: Value,
    #[serde(default)]
    pub next_state: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    #[serde(rename = "type", default)]
    pub kind: FeedbackKind,
    #[serde(default)]
    pub value: FeedbackValue,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub trader_id: Option<String>,
    #[serde(default)]
    pub pattern_type: Option<String>,
    #[serde(default)]
    pub pattern_key: Option<String>,
    #[serde(default)]
    pub transition: Option<Transition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: FeedbackId,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub value: f64,
    pub text: Option<String>,
    pub source: FeedbackSource,
    pub symbol: Option<String>,
    pub trader_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Failure,
    #[serde(other)]
    Unknown,
}

impl OutcomeKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "success" => OutcomeKind::Success,
            "failure" => OutcomeKind::Failure,
            _ => OutcomeKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Failure => "failure",
            OutcomeKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcomeInput {
    #[serde(default)]
    pub trade_id: Option<String>,
    #[serde(default)]
    pub trader_id: Option<String>,
    pub symbol: String,
    #[serde(default)]
    pub action: Option<String>,
    pub outcome: OutcomeKind,
    #[serde(default)]
    pub profit_loss: f64,
    #[serde(default)]
    pub transition: Option<Transition>,
}

/// Reward for a resolved trade, scaled from profit/loss in percent.
pub fn outcome_reward(outcome: OutcomeKind, profit_loss: f64) -> f64 {
    let scaled = if profit_loss.is_finite() { profit_loss / 100.0 } else { 0.0 };
    match outcome {
        OutcomeKind::Success => scaled.clamp(0.1, 1.0),
        OutcomeKind::Failure => scaled.clamp(-1.0, -0.1),
        OutcomeKind::Unknown => 0.0,
    }
}

/// Persisted record of a resolved trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub id: Uuid,
    pub trade_id: Option<String>,
    pub trader_id: Option<String>,
    pub symbol: String,
    pub action: Option<String>,
    pub outcome: OutcomeKind,
    pub profit_loss: f64,
    pub reward: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn from_input(input: &TradeOutcomeInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            trade_id: input.trade_id.clone(),
            trader_id: input.trader_id.clone(),
            symbol: input.symbol.clone(),
            action: input.action.clone(),
            outcome: input.outcome,
            profit_loss: input.profit_loss,
            reward: outcome_reward(input.outcome, input.profit_loss),
            recorded_at: Utc::now(),
        }
    }
}

/// A trade signal as it arrived from a trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Uuid,
    pub trader_id: Option<String>,
    pub symbol: String,
    pub action: String,
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SignalRecord {
    pub fn new(
        trader_id: Option<String>,
        symbol: impl Into<String>,
        action: impl Into<String>,
        content: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trader_id,
            symbol: symbol.into(),
            action: action.into(),
            content,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyword_normalization() {
        for word in ["positive", "Good", " yes "] {
            assert_eq!(FeedbackValue::Keyword(word.to_string()).normalize(), 1.0);
        }
        for word in ["negative", "BAD", "no"] {
            assert_eq!(FeedbackValue::Keyword(word.to_string()).normalize(), -1.0);
        }
        assert_eq!(FeedbackValue::Keyword("meh".to_string()).normalize(), 0.0);
    }

    #[test]
    fn test_numeric_values_are_clamped() {
        assert_eq!(FeedbackValue::Score(3.5).normalize(), 1.0);
        assert_eq!(FeedbackValue::Score(-2.0).normalize(), -1.0);
        assert_eq!(FeedbackValue::Score(0.25).normalize(), 0.25);
        assert_eq!(FeedbackValue::Score(f64::NAN).normalize(), 0.0);
    }

    #[test]
    fn test_feedback_input_deserializes_loose_payload() {
        let input: FeedbackInput = serde_json::from_value(json!({
            "type": "trade_signal",
            "value": "good",
            "symbol": "BTC"
        }))
        .unwrap();
        assert_eq!(input.kind, FeedbackKind::TradeSignal);
        assert_eq!(input.value.normalize(), 1.0);

        let custom: FeedbackInput =
            serde_json::from_value(json!({"type": "ux", "value": 0.4})).unwrap();
        assert_eq!(custom.kind, FeedbackKind::Other("ux".to_string()));
        assert_eq!(serde_json::to_value(&custom.kind).unwrap(), json!("ux"));
    }

    #[test]
    fn test_outcome_reward_bands() {
        assert_eq!(outcome_reward(OutcomeKind::Success, 50.0), 0.5);
        assert_eq!(outcome_reward(OutcomeKind::Success, 2.0), 0.1);
        assert_eq!(outcome_reward(OutcomeKind::Success, 500.0), 1.0);
        assert_eq!(outcome_reward(OutcomeKind::Failure, -20.0), -0.2);
        assert_eq!(outcome_reward(OutcomeKind::Failure, 15.0), -0.1);
        assert_eq!(outcome_reward(OutcomeKind::Failure, -400.0), -1.0);
        assert_eq!(outcome_reward(OutcomeKind::Unknown, 80.0), 0.0);
    }

    #[test]
    fn test_outcome_kind_parse() {
        assert_eq!(OutcomeKind::parse("SUCCESS"), OutcomeKind::Success);
        assert_eq!(OutcomeKind::parse("failure"), OutcomeKind::Failure);
        assert_eq!(OutcomeKind::parse("pending"), OutcomeKind::Unknown);
        let parsed: OutcomeKind = serde_json::from_value(json!("pending")).unwrap();
        assert_eq!(parsed, OutcomeKind::Unknown);
    }
}

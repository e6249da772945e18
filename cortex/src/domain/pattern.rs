// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::canonical::content_hash;
use super::errors::CortexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

/// Historical record set a mining pass runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDomain {
    Trades,
    Signals,
    Feedback,
}

impl PatternDomain {
    pub const ALL: [PatternDomain; 3] = [
        PatternDomain::Trades,
        PatternDomain::Signals,
        PatternDomain::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternDomain::Trades => "trades",
            PatternDomain::Signals => "signals",
            PatternDomain::Feedback => "feedback",
        }
    }
}

impl FromStr for PatternDomain {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trades" => Ok(PatternDomain::Trades),
            "signals" => Ok(PatternDomain::Signals),
            "feedback" => Ok(PatternDomain::Feedback),
            other => Err(CortexError::UnsupportedDomain(other.to_string())),
        }
    }
}

impl fmt::Display for PatternDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a detected pattern is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    HighSuccessSymbol {
        symbol: String,
        success_rate: f64,
    },
    ReliableTrader {
        trader_id: String,
        success_rate: f64,
    },
    ActionSymbolSuccess {
        action: String,
        symbol: String,
        success_rate: f64,
    },
    FrequentSignaler {
        trader_id: String,
        /// Seconds
        avg_time_between_signals: f64,
        signals_per_day: f64,
    },
    SimilarContent {
        symbol: String,
        content: String,
        avg_similarity: f64,
    },
    ConsistentFeedback {
        feedback_type: String,
        avg_value: f64,
    },
}

impl PatternKind {
    pub fn tag(&self) -> &'static str {
        match self {
            PatternKind::HighSuccessSymbol { .. } => "high_success_symbol",
            PatternKind::ReliableTrader { .. } => "reliable_trader",
            PatternKind::ActionSymbolSuccess { .. } => "action_symbol_success",
            PatternKind::FrequentSignaler { .. } => "frequent_signaler",
            PatternKind::SimilarContent { .. } => "similar_content",
            PatternKind::ConsistentFeedback { .. } => "consistent_feedback",
        }
    }

    pub fn domain(&self) -> PatternDomain {
        match self {
            PatternKind::HighSuccessSymbol { .. }
            | PatternKind::ReliableTrader { .. }
            | PatternKind::ActionSymbolSuccess { .. } => PatternDomain::Trades,
            PatternKind::FrequentSignaler { .. } | PatternKind::SimilarContent { .. } => {
                PatternDomain::Signals
            }
            PatternKind::ConsistentFeedback { .. } => PatternDomain::Feedback,
        }
    }
}

/// Recurring behaviour found by one mining pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub id: PatternId,
    #[serde(flatten)]
    pub kind: PatternKind,
    pub sample_size: usize,
    pub strength: f64,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

impl DetectedPattern {
    /// Confidence is the sample-size adequacy factor times strength.
    pub fn new(kind: PatternKind, sample_size: usize, strength: f64, min_occurrences: usize) -> Self {
        Self {
            id: PatternId::new(),
            kind,
            sample_size,
            strength,
            confidence: pattern_confidence(sample_size, min_occurrences, strength),
            detected_at: Utc::now(),
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Hash over the pattern's content. The id and detection time are left
    /// out so a re-detection of the same finding hashes identically.
    pub fn content_hash(&self) -> String {
        let kind = serde_json::to_value(&self.kind).unwrap_or_default();
        content_hash(&json!({
            "kind": kind,
            "sample_size": self.sample_size,
            "strength": self.strength,
            "confidence": self.confidence,
        }))
    }

    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.tag(), self.content_hash())
    }

    /// True when the pattern is about the given trader, symbol or
    /// action/symbol combination.
    pub fn concerns(&self, trader_id: Option<&str>, symbol: Option<&str>, action: Option<&str>) -> bool {
        match &self.kind {
            PatternKind::ReliableTrader { trader_id: t, .. } => trader_id == Some(t.as_str()),
            PatternKind::HighSuccessSymbol { symbol: s, .. } => symbol == Some(s.as_str()),
            PatternKind::ActionSymbolSuccess { action: a, symbol: s, .. } => {
                action == Some(a.as_str()) && symbol == Some(s.as_str())
            }
            _ => false,
        }
    }
}

/// `min(1, sample_size / (2 * min_occurrences)) * strength`, clamped to `[0, 1]`.
pub fn pattern_confidence(sample_size: usize, min_occurrences: usize, strength: f64) -> f64 {
    let adequacy = if min_occurrences == 0 {
        1.0
    } else {
        (sample_size as f64 / (2 * min_occurrences) as f64).min(1.0)
    };
    (adequacy * strength).clamp(0.0, 1.0)
}

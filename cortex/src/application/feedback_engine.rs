// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feedback engine
//!
//! Turns explicit user feedback and realised trade outcomes into scalar
//! rewards in `[-1, 1]`, then pushes them into semantic memory (trader and
//! market reliability) and procedural memory (strategy effectiveness).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Normalise feedback signals and route them to the right records

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::procedural_memory::ProceduralTier;
use super::semantic_memory::SemanticTier;
use crate::config::FeedbackConfig;
use crate::domain::{
    FeedbackId, FeedbackInput, FeedbackKind, FeedbackRecord, FeedbackRepository, FeedbackSource,
    OutcomeKind, TradeOutcome, TradeOutcomeInput, TradeRecordRepository, HISTORY_LIMIT,
};

pub struct FeedbackEngine {
    config: FeedbackConfig,
    semantic: Arc<SemanticTier>,
    procedural: Arc<ProceduralTier>,
    feedback_store: Arc<dyn FeedbackRepository>,
    trade_store: Arc<dyn TradeRecordRepository>,
    history: Mutex<VecDeque<FeedbackRecord>>,
}

impl FeedbackEngine {
    pub fn new(
        config: FeedbackConfig,
        semantic: Arc<SemanticTier>,
        procedural: Arc<ProceduralTier>,
        feedback_store: Arc<dyn FeedbackRepository>,
        trade_store: Arc<dyn TradeRecordRepository>,
    ) -> Self {
        Self {
            config,
            semantic,
            procedural,
            feedback_store,
            trade_store,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Normalise, record and dispatch one piece of user feedback. The
    /// returned record's `value` is the normalised reward.
    pub async fn process_user_feedback(&self, input: &FeedbackInput) -> FeedbackRecord {
        let record = FeedbackRecord {
            id: FeedbackId::new(),
            kind: input.kind.clone(),
            value: input.value.normalize(),
            text: input.text.clone(),
            source: FeedbackSource::User,
            symbol: input.symbol.clone(),
            trader_id: input.trader_id.clone(),
            timestamp: Utc::now(),
        };

        self.remember(record.clone());
        if let Err(e) = self.feedback_store.append_feedback(&record).await {
            warn!(feedback_id = ?record.id, error = %e, "Failed to persist feedback");
        }

        match &record.kind {
            FeedbackKind::TradeSignal => match &input.symbol {
                Some(symbol) => {
                    let reliability = self
                        .semantic
                        .apply_market_feedback(symbol, record.value, FeedbackSource::User)
                        .await;
                    debug!(symbol = %symbol, reliability, "Applied signal feedback");
                }
                None => warn!("Trade signal feedback without a symbol"),
            },
            FeedbackKind::TraderReliability => match &input.trader_id {
                Some(trader_id) => {
                    let reliability = self
                        .semantic
                        .apply_trader_feedback(trader_id, record.value, FeedbackSource::User)
                        .await;
                    debug!(trader_id = %trader_id, reliability, "Applied trader feedback");
                }
                None => warn!("Trader reliability feedback without a trader id"),
            },
            FeedbackKind::Strategy => {
                self.apply_strategy_feedback(input, record.value).await;
            }
            FeedbackKind::General | FeedbackKind::Other(_) => {}
        }

        metrics::counter!("cortex_feedback_processed_total", "source" => "user").increment(1);
        info!(
            feedback_type = record.kind.as_str(),
            value = record.value,
            "Processed user feedback"
        );
        record
    }

    /// Score a realised trade and fold the reward into the symbol's and, when
    /// known, the trader's reliability. The outcome also joins the in-process
    /// feedback history; it is persisted as a trade record, not as feedback.
    pub async fn process_trade_outcome(&self, input: &TradeOutcomeInput) -> TradeOutcome {
        let outcome = TradeOutcome::from_input(input);
        self.remember(FeedbackRecord {
            id: FeedbackId::new(),
            kind: FeedbackKind::TradeSignal,
            value: outcome.reward,
            text: Some(outcome.outcome.as_str().to_string()),
            source: FeedbackSource::TradeOutcome,
            symbol: Some(outcome.symbol.clone()),
            trader_id: outcome.trader_id.clone(),
            timestamp: outcome.recorded_at,
        });

        if let Err(e) = self.trade_store.append_outcome(&outcome).await {
            warn!(symbol = %outcome.symbol, error = %e, "Failed to persist trade outcome");
        }

        self.semantic
            .apply_market_feedback(&outcome.symbol, outcome.reward, FeedbackSource::TradeOutcome)
            .await;
        if let Some(trader_id) = &outcome.trader_id {
            self.semantic
                .apply_trader_feedback(trader_id, outcome.reward, FeedbackSource::TradeOutcome)
                .await;
        }

        metrics::counter!("cortex_feedback_processed_total", "source" => "trade_outcome")
            .increment(1);
        info!(
            symbol = %outcome.symbol,
            outcome = outcome.outcome.as_str(),
            reward = outcome.reward,
            "Processed trade outcome"
        );
        outcome
    }

    /// Newest first.
    pub fn recent_feedback(&self, limit: usize) -> Vec<FeedbackRecord> {
        self.history.lock().iter().rev().take(limit).cloned().collect()
    }

    async fn apply_strategy_feedback(&self, input: &FeedbackInput, value: f64) {
        let (Some(pattern_type), Some(pattern_key)) = (&input.pattern_type, &input.pattern_key) else {
            warn!("Strategy feedback without pattern_type and pattern_key");
            return;
        };

        let success = if value > self.config.positive_threshold {
            true
        } else if value < self.config.negative_threshold {
            false
        } else {
            debug!(pattern_type = %pattern_type, value, "Strategy feedback inside neutral band");
            return;
        };

        if let Some(pattern) = self
            .procedural
            .update_pattern_effectiveness(pattern_type, pattern_key, success)
            .await
        {
            debug!(
                pattern_type = %pattern_type,
                effectiveness = pattern.effectiveness,
                "Applied strategy feedback"
            );
        }
    }

    fn remember(&self, record: FeedbackRecord) {
        let mut history = self.history.lock();
        history.push_back(record);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }
}

/// Whether an outcome should count toward success/failure tallies.
pub fn outcome_success(outcome: OutcomeKind) -> Option<bool> {
    match outcome {
        OutcomeKind::Success => Some(true),
        OutcomeKind::Failure => Some(false),
        OutcomeKind::Unknown => None,
    }
}

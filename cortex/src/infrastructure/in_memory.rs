// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-Memory Learning Store
//!
//! Thread-safe map-backed implementation of every learning repository. Used
//! for development, the `simulate` command and tests; state is lost on drop.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Ephemeral persistence for the learning core
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    ActionPattern, ActionPatternRepository, DetectedPattern, DetectedPatternRepository,
    FeedbackRecord, FeedbackRepository, KnowledgeRepository, MarketKnowledge, MetricsRepository,
    MetricsScope, OutcomeFilter, PerformanceReport, PerformanceSnapshot, RepositoryError,
    SignalRecord, Timeframe, TradeOutcome, TradeRecordRepository, TraderProfile,
};

#[derive(Default)]
struct StoreState {
    traders: HashMap<String, TraderProfile>,
    markets: HashMap<String, MarketKnowledge>,
    action_patterns: HashMap<(String, String), ActionPattern>,
    feedback: Vec<FeedbackRecord>,
    outcomes: Vec<TradeOutcome>,
    signals: Vec<SignalRecord>,
    snapshots: Vec<PerformanceSnapshot>,
    reports: Vec<PerformanceReport>,
    detected: Vec<DetectedPattern>,
}

#[derive(Clone, Default)]
pub struct InMemoryLearningStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detected_pattern_count(&self) -> usize {
        self.state.read().detected.len()
    }

    pub fn action_pattern_count(&self) -> usize {
        self.state.read().action_patterns.len()
    }

    pub fn report_count(&self) -> usize {
        self.state.read().reports.len()
    }
}

fn after(since: Option<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    since.is_none_or(|since| at >= since)
}

#[async_trait]
impl KnowledgeRepository for InMemoryLearningStore {
    async fn find_trader(&self, trader_id: &str) -> Result<Option<TraderProfile>, RepositoryError> {
        Ok(self.state.read().traders.get(trader_id).cloned())
    }

    async fn save_trader(&self, profile: &TraderProfile) -> Result<(), RepositoryError> {
        self.state
            .write()
            .traders
            .insert(profile.trader_id.clone(), profile.clone());
        Ok(())
    }

    async fn find_market(&self, symbol: &str) -> Result<Option<MarketKnowledge>, RepositoryError> {
        Ok(self.state.read().markets.get(symbol).cloned())
    }

    async fn save_market(&self, market: &MarketKnowledge) -> Result<(), RepositoryError> {
        self.state
            .write()
            .markets
            .insert(market.symbol.clone(), market.clone());
        Ok(())
    }
}

#[async_trait]
impl ActionPatternRepository for InMemoryLearningStore {
    async fn find_action_pattern(
        &self,
        pattern_type: &str,
        pattern_key: &str,
    ) -> Result<Option<ActionPattern>, RepositoryError> {
        let key = (pattern_type.to_string(), pattern_key.to_string());
        Ok(self.state.read().action_patterns.get(&key).cloned())
    }

    async fn save_action_pattern(&self, pattern: &ActionPattern) -> Result<(), RepositoryError> {
        let key = (pattern.pattern_type.clone(), pattern.pattern_key.clone());
        self.state.write().action_patterns.insert(key, pattern.clone());
        Ok(())
    }

    async fn list_action_patterns(
        &self,
        pattern_type: &str,
        limit: usize,
    ) -> Result<Vec<ActionPattern>, RepositoryError> {
        let state = self.state.read();
        let mut patterns: Vec<ActionPattern> = state
            .action_patterns
            .values()
            .filter(|p| p.pattern_type == pattern_type)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| b.effectiveness.total_cmp(&a.effectiveness));
        patterns.truncate(limit);
        Ok(patterns)
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryLearningStore {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<(), RepositoryError> {
        self.state.write().feedback.push(record.clone());
        Ok(())
    }

    async fn list_feedback(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        Ok(self
            .state
            .read()
            .feedback
            .iter()
            .filter(|r| after(since, r.timestamp))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TradeRecordRepository for InMemoryLearningStore {
    async fn append_outcome(&self, outcome: &TradeOutcome) -> Result<(), RepositoryError> {
        self.state.write().outcomes.push(outcome.clone());
        Ok(())
    }

    async fn list_outcomes(&self, filter: &OutcomeFilter) -> Result<Vec<TradeOutcome>, RepositoryError> {
        Ok(self
            .state
            .read()
            .outcomes
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    async fn active_traders(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, RepositoryError> {
        let state = self.state.read();
        let traders: BTreeSet<String> = state
            .outcomes
            .iter()
            .filter(|o| after(since, o.recorded_at))
            .filter_map(|o| o.trader_id.clone())
            .collect();
        Ok(traders.into_iter().collect())
    }

    async fn active_symbols(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, RepositoryError> {
        let state = self.state.read();
        let symbols: BTreeSet<String> = state
            .outcomes
            .iter()
            .filter(|o| after(since, o.recorded_at))
            .map(|o| o.symbol.clone())
            .collect();
        Ok(symbols.into_iter().collect())
    }

    async fn append_signal(&self, signal: &SignalRecord) -> Result<(), RepositoryError> {
        self.state.write().signals.push(signal.clone());
        Ok(())
    }

    async fn list_signals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignalRecord>, RepositoryError> {
        Ok(self
            .state
            .read()
            .signals
            .iter()
            .filter(|s| after(since, s.timestamp))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MetricsRepository for InMemoryLearningStore {
    async fn append_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<(), RepositoryError> {
        self.state.write().snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn list_overall_snapshots(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<PerformanceSnapshot>, RepositoryError> {
        let state = self.state.read();
        let matching: Vec<&PerformanceSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.scope == MetricsScope::Overall && s.timeframe == timeframe)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn append_report(&self, report: &PerformanceReport) -> Result<(), RepositoryError> {
        self.state.write().reports.push(report.clone());
        Ok(())
    }

    async fn latest_report(&self) -> Result<Option<PerformanceReport>, RepositoryError> {
        Ok(self.state.read().reports.last().cloned())
    }
}

#[async_trait]
impl DetectedPatternRepository for InMemoryLearningStore {
    async fn append_pattern(&self, pattern: &DetectedPattern) -> Result<(), RepositoryError> {
        self.state.write().detected.push(pattern.clone());
        Ok(())
    }

    async fn list_patterns(&self, tag: &str) -> Result<Vec<DetectedPattern>, RepositoryError> {
        Ok(self
            .state
            .read()
            .detected
            .iter()
            .filter(|p| p.tag() == tag)
            .cloned()
            .collect())
    }
}

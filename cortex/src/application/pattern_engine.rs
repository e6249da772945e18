// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pattern engine
//!
//! Mines recurring, high-confidence patterns from trade outcomes, signals and
//! feedback:
//!
//! | Domain     | Grouped by            | Strength                          | Qualifies when                    |
//! |------------|-----------------------|-----------------------------------|-----------------------------------|
//! | `trades`   | symbol                | success rate                      | `>= min_pattern_confidence`       |
//! | `trades`   | trader                | success rate                      | `>= min_pattern_confidence`       |
//! | `trades`   | action + symbol       | success rate                      | `>= min_pattern_confidence`       |
//! | `signals`  | trader                | `min(1, 86400 / avg gap seconds)` | average gap `<= 24h`              |
//! | `signals`  | similar past content  | mean similarity                   | `>= pattern_similarity_threshold` |
//! | `feedback` | feedback type         | `abs(mean value)`                 | `>= min_pattern_confidence`       |
//!
//! Every group also needs at least `min_pattern_occurrences` members.
//! Confidence is `min(1, n / (2 * min_pattern_occurrences)) * strength`.
//! Each domain's result is ranked by confidence and cut to
//! `max_patterns_per_type`. A pattern is persisted once per `type:hash`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Find what keeps working (or failing) across history

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::episodic_memory::EpisodicTier;
use crate::config::PatternConfig;
use crate::domain::{
    CortexError, DetectedPattern, DetectedPatternRepository, FeedbackRepository, OutcomeFilter,
    OutcomeKind, PatternDomain, PatternKind, SignalRecord, Timeframe, TradeOutcome,
    TradeRecordRepository, TurnInput,
};

const SECONDS_PER_DAY: f64 = 86_400.0;
const CONTENT_SAMPLE_CHARS: usize = 100;
const SIMILAR_CONTENT_LIMIT: usize = 5;

/// Pattern tags that can be matched against a turn's subjects.
const SUBJECT_TAGS: [&str; 3] = ["reliable_trader", "high_success_symbol", "action_symbol_success"];

pub struct PatternEngine {
    config: PatternConfig,
    trades: Arc<dyn TradeRecordRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    store: Arc<dyn DetectedPatternRepository>,
    episodic: Option<Arc<EpisodicTier>>,
    persisted: Mutex<HashSet<String>>,
    latest: Mutex<HashMap<&'static str, Vec<DetectedPattern>>>,
}

impl PatternEngine {
    pub fn new(
        config: PatternConfig,
        trades: Arc<dyn TradeRecordRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        store: Arc<dyn DetectedPatternRepository>,
    ) -> Self {
        Self {
            config,
            trades,
            feedback,
            store,
            episodic: None,
            persisted: Mutex::new(HashSet::new()),
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Enables similar-content mining over episodic memory.
    pub fn with_episodic(mut self, episodic: Arc<EpisodicTier>) -> Self {
        self.episodic = Some(episodic);
        self
    }

    /// String-typed entry point; rejects unknown domains and timeframes.
    pub async fn detect_patterns_by_name(
        &self,
        domain: &str,
        timeframe: &str,
    ) -> Result<Vec<DetectedPattern>, CortexError> {
        let domain: PatternDomain = domain.parse()?;
        let timeframe: Timeframe = timeframe.parse()?;
        Ok(self.detect_patterns(domain, timeframe).await)
    }

    pub async fn detect_patterns(&self, domain: PatternDomain, timeframe: Timeframe) -> Vec<DetectedPattern> {
        let since = timeframe.cutoff(Utc::now());
        let mut patterns = match domain {
            PatternDomain::Trades => {
                let outcomes = self
                    .trades
                    .list_outcomes(&OutcomeFilter::since(since))
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Failed to load trade outcomes for pattern mining");
                        Vec::new()
                    });
                self.trade_patterns(&outcomes)
            }
            PatternDomain::Signals => {
                let signals = self.trades.list_signals(since).await.unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to load signals for pattern mining");
                    Vec::new()
                });
                let mut patterns = self.frequency_patterns(&signals);
                patterns.extend(self.similar_content_patterns(&signals).await);
                patterns
            }
            PatternDomain::Feedback => {
                let feedback = self.feedback.list_feedback(since).await.unwrap_or_else(|e| {
                    warn!(error = %e, "Failed to load feedback for pattern mining");
                    Vec::new()
                });
                let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
                for record in &feedback {
                    groups.entry(record.kind.as_str()).or_default().push(record.value);
                }
                groups
                    .into_iter()
                    .filter_map(|(feedback_type, values)| self.feedback_pattern(feedback_type, &values))
                    .collect()
            }
        };

        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        patterns.truncate(self.config.max_patterns_per_type);

        self.persist_new(&patterns).await;
        self.remember(domain, &patterns);

        metrics::counter!("cortex_patterns_detected_total", "domain" => domain.as_str())
            .increment(patterns.len() as u64);
        info!(domain = %domain, timeframe = %timeframe, count = patterns.len(), "Detected patterns");
        patterns
    }

    /// Known patterns of one type with at least `min_confidence`, best first.
    /// Uses the latest mining pass, or the store when nothing was mined yet.
    pub async fn patterns_by_type(&self, tag: &str, min_confidence: f64) -> Vec<DetectedPattern> {
        let mut patterns = self.known_patterns(tag).await;
        patterns.retain(|p| p.confidence >= min_confidence);
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        patterns
    }

    /// Patterns about this turn's trader, symbol or action+symbol pair.
    pub async fn get_relevant_patterns(&self, input: &TurnInput, limit: usize) -> Vec<DetectedPattern> {
        let trader = input.trader_id.as_deref();
        let symbol = input.symbol.as_deref();
        let action = input.action.as_deref();
        if trader.is_none() && symbol.is_none() {
            return Vec::new();
        }

        let mut relevant = Vec::new();
        for tag in SUBJECT_TAGS {
            relevant.extend(
                self.known_patterns(tag)
                    .await
                    .into_iter()
                    .filter(|p| p.concerns(trader, symbol, action)),
            );
        }
        relevant.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        relevant.truncate(limit);
        relevant
    }

    fn trade_patterns(&self, outcomes: &[TradeOutcome]) -> Vec<DetectedPattern> {
        let mut by_symbol: BTreeMap<&str, Vec<&TradeOutcome>> = BTreeMap::new();
        let mut by_trader: BTreeMap<&str, Vec<&TradeOutcome>> = BTreeMap::new();
        let mut by_combo: BTreeMap<(&str, &str), Vec<&TradeOutcome>> = BTreeMap::new();
        for outcome in outcomes {
            if !outcome.symbol.is_empty() {
                by_symbol.entry(&outcome.symbol).or_default().push(outcome);
            }
            if let Some(trader) = outcome.trader_id.as_deref() {
                by_trader.entry(trader).or_default().push(outcome);
            }
            if let Some(action) = outcome.action.as_deref() {
                if !outcome.symbol.is_empty() {
                    by_combo
                        .entry((action, outcome.symbol.as_str()))
                        .or_default()
                        .push(outcome);
                }
            }
        }

        let mut patterns = Vec::new();
        for (symbol, group) in by_symbol {
            patterns.extend(self.success_pattern(&group, |success_rate| PatternKind::HighSuccessSymbol {
                symbol: symbol.to_string(),
                success_rate,
            }));
        }
        for (trader_id, group) in by_trader {
            patterns.extend(self.success_pattern(&group, |success_rate| PatternKind::ReliableTrader {
                trader_id: trader_id.to_string(),
                success_rate,
            }));
        }
        for ((action, symbol), group) in by_combo {
            patterns.extend(self.success_pattern(&group, |success_rate| {
                PatternKind::ActionSymbolSuccess {
                    action: action.to_string(),
                    symbol: symbol.to_string(),
                    success_rate,
                }
            }));
        }
        patterns
    }

    fn success_pattern(
        &self,
        group: &[&TradeOutcome],
        kind: impl FnOnce(f64) -> PatternKind,
    ) -> Option<DetectedPattern> {
        let total = group.len();
        if total == 0 || total < self.config.min_pattern_occurrences {
            return None;
        }
        let successes = group
            .iter()
            .filter(|o| o.outcome == OutcomeKind::Success)
            .count();
        let success_rate = successes as f64 / total as f64;
        if success_rate < self.config.min_pattern_confidence {
            return None;
        }
        Some(DetectedPattern::new(
            kind(success_rate),
            total,
            success_rate,
            self.config.min_pattern_occurrences,
        ))
    }

    fn frequency_patterns(&self, signals: &[SignalRecord]) -> Vec<DetectedPattern> {
        let mut by_trader: BTreeMap<&str, Vec<&SignalRecord>> = BTreeMap::new();
        for signal in signals {
            if let Some(trader) = signal.trader_id.as_deref() {
                by_trader.entry(trader).or_default().push(signal);
            }
        }

        let mut patterns = Vec::new();
        for (trader_id, mut group) in by_trader {
            if group.len() < 2 || group.len() < self.config.min_pattern_occurrences {
                continue;
            }
            group.sort_by_key(|s| s.timestamp);
            let gaps: Vec<f64> = group
                .windows(2)
                .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0)
                .collect();
            let avg_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
            if avg_gap > SECONDS_PER_DAY {
                continue;
            }

            let (strength, signals_per_day) = if avg_gap > 0.0 {
                ((SECONDS_PER_DAY / avg_gap).min(1.0), SECONDS_PER_DAY / avg_gap)
            } else {
                (1.0, group.len() as f64)
            };
            patterns.push(DetectedPattern::new(
                PatternKind::FrequentSignaler {
                    trader_id: trader_id.to_string(),
                    avg_time_between_signals: avg_gap,
                    signals_per_day,
                },
                group.len(),
                strength,
                self.config.min_pattern_occurrences,
            ));
        }
        patterns
    }

    async fn similar_content_patterns(&self, signals: &[SignalRecord]) -> Vec<DetectedPattern> {
        let Some(episodic) = &self.episodic else {
            return Vec::new();
        };

        let limit = SIMILAR_CONTENT_LIMIT.max(self.config.min_pattern_occurrences);
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut patterns = Vec::new();
        for signal in signals {
            let Some(content) = signal.content.as_deref().filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            if !seen.insert((signal.symbol.as_str(), content)) {
                continue;
            }

            let similar = episodic.retrieve_similar(content, limit).await;
            if similar.is_empty() || similar.len() < self.config.min_pattern_occurrences {
                continue;
            }
            let avg_similarity = similar
                .iter()
                .map(|e| e.similarity_score.unwrap_or(0.0))
                .sum::<f64>()
                / similar.len() as f64;
            if avg_similarity < self.config.pattern_similarity_threshold {
                continue;
            }

            patterns.push(DetectedPattern::new(
                PatternKind::SimilarContent {
                    symbol: signal.symbol.clone(),
                    content: content.chars().take(CONTENT_SAMPLE_CHARS).collect(),
                    avg_similarity,
                },
                similar.len(),
                avg_similarity.clamp(0.0, 1.0),
                self.config.min_pattern_occurrences,
            ));
        }
        patterns
    }

    fn feedback_pattern(&self, feedback_type: &str, values: &[f64]) -> Option<DetectedPattern> {
        if values.is_empty() || values.len() < self.config.min_pattern_occurrences {
            return None;
        }
        let avg_value = values.iter().sum::<f64>() / values.len() as f64;
        let strength = avg_value.abs();
        if strength < self.config.min_pattern_confidence {
            return None;
        }
        Some(DetectedPattern::new(
            PatternKind::ConsistentFeedback {
                feedback_type: feedback_type.to_string(),
                avg_value,
            },
            values.len(),
            strength,
            self.config.min_pattern_occurrences,
        ))
    }

    async fn persist_new(&self, patterns: &[DetectedPattern]) {
        for pattern in patterns {
            let key = pattern.dedup_key();
            if !self.persisted.lock().insert(key.clone()) {
                debug!(key = %key, "Pattern already persisted");
                continue;
            }
            if let Err(e) = self.store.append_pattern(pattern).await {
                warn!(pattern_type = pattern.tag(), error = %e, "Failed to persist detected pattern");
                self.persisted.lock().remove(&key);
            }
        }
    }

    fn remember(&self, domain: PatternDomain, patterns: &[DetectedPattern]) {
        let mut latest = self.latest.lock();
        latest.retain(|_, cached| cached.first().is_none_or(|p| p.kind.domain() != domain));
        for pattern in patterns {
            latest.entry(pattern.tag()).or_default().push(pattern.clone());
        }
    }

    async fn known_patterns(&self, tag: &str) -> Vec<DetectedPattern> {
        let cached = self.latest.lock().get(tag).cloned();
        if let Some(patterns) = cached {
            return patterns;
        }
        self.store.list_patterns(tag).await.unwrap_or_else(|e| {
            warn!(pattern_type = tag, error = %e, "Failed to load detected patterns");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ExperienceRecord, FeedbackId, FeedbackKind, FeedbackRecord, FeedbackSource,
    };
    use crate::infrastructure::{HashEmbeddingClient, InMemoryLearningStore, InMemoryVectorIndex};
    use chrono::{DateTime, Duration};
    use serde_json::json;
    use uuid::Uuid;

    fn engine(store: &InMemoryLearningStore) -> PatternEngine {
        PatternEngine::new(
            PatternConfig::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
    }

    fn trade(trader: &str, symbol: &str, action: &str, kind: OutcomeKind) -> TradeOutcome {
        TradeOutcome {
            id: Uuid::new_v4(),
            trade_id: None,
            trader_id: Some(trader.to_string()),
            symbol: symbol.to_string(),
            action: Some(action.to_string()),
            outcome: kind,
            profit_loss: 0.0,
            reward: 0.0,
            recorded_at: Utc::now(),
        }
    }

    fn signal(trader: &str, symbol: &str, content: &str, at: DateTime<Utc>) -> SignalRecord {
        SignalRecord {
            id: Uuid::new_v4(),
            trader_id: Some(trader.to_string()),
            symbol: symbol.to_string(),
            action: "buy".to_string(),
            content: Some(content.to_string()),
            timestamp: at,
        }
    }

    async fn seed_symbol_group(store: &InMemoryLearningStore) {
        let kinds = [
            OutcomeKind::Success,
            OutcomeKind::Success,
            OutcomeKind::Failure,
            OutcomeKind::Success,
            OutcomeKind::Success,
        ];
        for (i, kind) in kinds.into_iter().enumerate() {
            let trader = format!("trader-{}", i);
            store.append_outcome(&trade(&trader, "BTC", "buy", kind)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_symbol_group_qualifies_with_scaled_confidence() {
        let store = InMemoryLearningStore::new();
        seed_symbol_group(&store).await;
        let patterns = engine(&store).detect_patterns(PatternDomain::Trades, Timeframe::All).await;

        let symbol = patterns
            .iter()
            .find(|p| p.tag() == "high_success_symbol")
            .unwrap();
        assert_eq!(symbol.sample_size, 5);
        assert!((symbol.strength - 0.8).abs() < 1e-12);
        assert!((symbol.confidence - 0.4).abs() < 1e-12);
        assert!(patterns.iter().any(|p| p.tag() == "action_symbol_success"));
        assert!(!patterns.iter().any(|p| p.tag() == "reliable_trader"));
    }

    #[tokio::test]
    async fn test_low_success_groups_do_not_qualify() {
        let store = InMemoryLearningStore::new();
        for kind in [OutcomeKind::Success, OutcomeKind::Failure, OutcomeKind::Failure, OutcomeKind::Unknown, OutcomeKind::Success] {
            store.append_outcome(&trade("alice", "ETH", "sell", kind)).await.unwrap();
        }
        let patterns = engine(&store).detect_patterns(PatternDomain::Trades, Timeframe::All).await;
        assert!(patterns.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_mining_persists_once() {
        let store = InMemoryLearningStore::new();
        seed_symbol_group(&store).await;
        let engine = engine(&store);
        let first = engine.detect_patterns(PatternDomain::Trades, Timeframe::All).await;
        engine.detect_patterns(PatternDomain::Trades, Timeframe::All).await;
        assert_eq!(store.detected_pattern_count(), first.len());
    }

    #[tokio::test]
    async fn test_frequent_signaler() {
        let store = InMemoryLearningStore::new();
        let start = Utc::now() - Duration::hours(12);
        for i in 0..6 {
            store
                .append_signal(&signal("alice", "BTC", &format!("call {}", i), start + Duration::hours(2 * i)))
                .await
                .unwrap();
        }
        for i in 0..5 {
            store
                .append_signal(&signal("bob", "ETH", &format!("idea {}", i), start - Duration::days(3 * (i + 1))))
                .await
                .unwrap();
        }

        let patterns = engine(&store).detect_patterns(PatternDomain::Signals, Timeframe::All).await;
        assert_eq!(patterns.len(), 1);
        match &patterns[0].kind {
            PatternKind::FrequentSignaler {
                trader_id,
                avg_time_between_signals,
                signals_per_day,
            } => {
                assert_eq!(trader_id, "alice");
                assert!((avg_time_between_signals - 7200.0).abs() < 1e-6);
                assert!((signals_per_day - 12.0).abs() < 1e-6);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
        assert_eq!(patterns[0].strength, 1.0);
    }

    #[tokio::test]
    async fn test_similar_content_uses_episodic_memory() {
        let store = InMemoryLearningStore::new();
        let episodic = Arc::new(EpisodicTier::new(
            Arc::new(HashEmbeddingClient::new(256)),
            Arc::new(InMemoryVectorIndex::new()),
        ));
        for _ in 0..5 {
            episodic
                .store_experience(ExperienceRecord {
                    input: json!("btc breakout confirmed on volume"),
                    ..ExperienceRecord::default()
                })
                .await
                .unwrap();
        }
        store
            .append_signal(&signal("alice", "BTC", "btc breakout confirmed on volume", Utc::now()))
            .await
            .unwrap();

        let engine = engine(&store).with_episodic(episodic);
        let patterns = engine.detect_patterns(PatternDomain::Signals, Timeframe::All).await;
        let similar = patterns
            .iter()
            .find(|p| p.tag() == "similar_content")
            .unwrap();
        assert_eq!(similar.sample_size, 5);
        assert!(similar.strength > 0.99);
    }

    #[tokio::test]
    async fn test_consistent_feedback() {
        let store = InMemoryLearningStore::new();
        for value in [-1.0, -1.0, -0.8, -1.0, -0.9, -1.0] {
            store
                .append_feedback(&FeedbackRecord {
                    id: FeedbackId::new(),
                    kind: FeedbackKind::TradeSignal,
                    value,
                    text: None,
                    source: FeedbackSource::User,
                    symbol: Some("DOGE".to_string()),
                    trader_id: None,
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        let engine = engine(&store);
        let patterns = engine.detect_patterns(PatternDomain::Feedback, Timeframe::Week).await;
        assert_eq!(patterns.len(), 1);
        assert!(matches!(
            &patterns[0].kind,
            PatternKind::ConsistentFeedback { feedback_type, avg_value }
                if feedback_type == "trade_signal" && *avg_value < -0.9
        ));

        assert_eq!(engine.patterns_by_type("consistent_feedback", 0.0).await.len(), 1);
        assert!(engine.patterns_by_type("consistent_feedback", 0.99).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_domain_is_a_validation_error() {
        let store = InMemoryLearningStore::new();
        let result = engine(&store).detect_patterns_by_name("weather", "all").await;
        assert_eq!(result, Err(CortexError::UnsupportedDomain("weather".to_string())));
        let result = engine(&store).detect_patterns_by_name("trades", "decade").await;
        assert_eq!(result, Err(CortexError::UnsupportedTimeframe("decade".to_string())));
    }

    #[tokio::test]
    async fn test_results_capped_per_domain() {
        let store = InMemoryLearningStore::new();
        for s in 0..15 {
            for _ in 0..5 {
                store
                    .append_outcome(&trade("x", &format!("SYM{}", s), "buy", OutcomeKind::Success))
                    .await
                    .unwrap();
            }
        }
        let patterns = engine(&store).detect_patterns(PatternDomain::Trades, Timeframe::All).await;
        assert_eq!(patterns.len(), PatternConfig::default().max_patterns_per_type);
        assert!(patterns.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[tokio::test]
    async fn test_relevant_patterns_match_turn_subjects() {
        let store = InMemoryLearningStore::new();
        seed_symbol_group(&store).await;
        let engine = engine(&store);
        engine.detect_patterns(PatternDomain::Trades, Timeframe::All).await;

        let input = TurnInput::text("btc?").with_symbol("BTC").with_action("buy");
        let relevant = engine.get_relevant_patterns(&input, 10).await;
        let tags: HashSet<_> = relevant.iter().map(|p| p.tag()).collect();
        assert!(tags.contains("high_success_symbol"));
        assert!(tags.contains("action_symbol_success"));

        let other = TurnInput::text("eth?").with_symbol("ETH");
        assert!(engine.get_relevant_patterns(&other, 10).await.is_empty());
        assert!(engine.get_relevant_patterns(&TurnInput::text("hi"), 10).await.is_empty());
    }
}

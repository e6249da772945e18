// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Memory coordinator
//!
//! Fans context assembly and per-turn updates out across the four memory
//! tiers. Composition is best-effort: a tier that cannot answer contributes
//! an empty or default value, and a tier that cannot be written to does not
//! stop the others.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Single entry point for reading and writing agent memory

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::episodic_memory::EpisodicTier;
use super::feedback_engine::outcome_success;
use super::procedural_memory::ProceduralTier;
use super::semantic_memory::SemanticTier;
use super::working_memory::{WorkingContext, WorkingTier};
use crate::config::MemoryConfig;
use crate::domain::{
    ActionPattern, ActionResult, AgentResponse, DetectedPattern, Experience, ExperienceId,
    ExperienceRecord, MarketKnowledge, SignalEntry, SignalRecord, TradeEntry,
    TradeRecordRepository, TraderProfile, TurnInput,
};

pub const ACTION_SEQUENCE_PATTERN: &str = "action_sequence";
pub const TOOL_USAGE_PATTERN: &str = "tool_usage";

/// Everything the decision engine gets to see for one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositeContext {
    pub working: WorkingContext,
    pub similar_experiences: Vec<Experience>,
    pub trader: Option<TraderProfile>,
    pub market: Option<MarketKnowledge>,
    pub action_patterns: Vec<ActionPattern>,
    /// Mined patterns about this turn's subjects, filled in by the learning side
    pub relevant_patterns: Vec<DetectedPattern>,
}

/// What one `update_memories` call wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub experience_id: Option<ExperienceId>,
    pub trader_reliability: Option<f64>,
    pub trade_recorded: bool,
    pub signal_recorded: bool,
    pub patterns_stored: usize,
}

pub struct MemoryCoordinator {
    working: WorkingTier,
    episodic: Arc<EpisodicTier>,
    semantic: Arc<SemanticTier>,
    procedural: Arc<ProceduralTier>,
    signals: Arc<dyn TradeRecordRepository>,
    max_episodic_memories: usize,
    max_procedural_patterns: usize,
}

impl MemoryCoordinator {
    pub fn new(
        config: &MemoryConfig,
        episodic: Arc<EpisodicTier>,
        semantic: Arc<SemanticTier>,
        procedural: Arc<ProceduralTier>,
        signals: Arc<dyn TradeRecordRepository>,
    ) -> Self {
        Self {
            working: WorkingTier::new(config.max_history),
            episodic,
            semantic,
            procedural,
            signals,
            max_episodic_memories: config.max_episodic_memories,
            max_procedural_patterns: config.max_procedural_patterns,
        }
    }

    /// Assemble the context for one turn from all four tiers concurrently.
    pub async fn get_context(&self, input: &TurnInput) -> CompositeContext {
        let query = input.embedding_text();

        let similar = async {
            if query.is_empty() {
                Vec::new()
            } else {
                self.episodic
                    .retrieve_similar(&query, self.max_episodic_memories)
                    .await
            }
        };
        let trader = async {
            match input.trader_id.as_deref() {
                Some(id) => Some(self.semantic.trader_profile(id).await),
                None => None,
            }
        };
        let market = async {
            match input.symbol.as_deref() {
                Some(symbol) => Some(self.semantic.market_knowledge(symbol).await),
                None => None,
            }
        };
        let patterns = self
            .procedural
            .get_relevant_patterns(input, self.max_procedural_patterns);

        let (similar_experiences, trader, market, action_patterns) =
            tokio::join!(similar, trader, market, patterns);

        CompositeContext {
            working: self.working.get_context(),
            similar_experiences,
            trader,
            market,
            action_patterns,
            relevant_patterns: Vec::new(),
        }
    }

    /// Write one finished turn into every tier that has something to learn
    /// from it.
    pub async fn update_memories(
        &self,
        input: &TurnInput,
        response: &AgentResponse,
        result: &ActionResult,
        metadata: Option<Map<String, Value>>,
    ) -> MemoryUpdate {
        let mut update = MemoryUpdate::default();
        self.working.update(input, response, result);

        let record = ExperienceRecord {
            input: serde_json::to_value(input).unwrap_or(Value::Null),
            response: serde_json::to_value(response).unwrap_or(Value::Null),
            result: serde_json::to_value(result).unwrap_or(Value::Null),
            metadata: metadata.unwrap_or_default(),
            timestamp: Some(Utc::now()),
        };
        update.experience_id = self.episodic.store_experience(record).await;

        let outcome = result.outcome.and_then(outcome_success);

        if let Some(trader_id) = input.trader_id.as_deref() {
            if let Some(success) = outcome {
                update.trader_reliability =
                    Some(self.semantic.update_trader_reliability(trader_id, success).await);
            }
            if let (Some(symbol), Some(action)) = (&input.symbol, &input.action) {
                let mut details = Map::new();
                if let Some(kind) = result.outcome {
                    details.insert("outcome".to_string(), json!(kind.as_str()));
                }
                if let Some(pl) = result.profit_loss {
                    details.insert("profit_loss".to_string(), json!(pl));
                }
                self.semantic
                    .add_trade_to_history(
                        trader_id,
                        TradeEntry {
                            symbol: symbol.clone(),
                            action: action.clone(),
                            details,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
                update.trade_recorded = true;
            }
        }

        if let (Some(symbol), Some(action)) = (&input.symbol, &input.action) {
            self.semantic
                .add_signal_to_market(
                    symbol,
                    SignalEntry {
                        action: action.clone(),
                        trader_id: input.trader_id.clone(),
                        content: input.content.clone(),
                        timestamp: Utc::now(),
                    },
                )
                .await;

            let signal = SignalRecord::new(
                input.trader_id.clone(),
                symbol.clone(),
                action.clone(),
                input.content.clone(),
            );
            match self.signals.append_signal(&signal).await {
                Ok(()) => update.signal_recorded = true,
                Err(e) => warn!(symbol = %symbol, error = %e, "Failed to record signal"),
            }
        }

        let success = outcome.or(result.success).unwrap_or(false);
        if let Some(sequence) = &response.action_sequence {
            self.procedural
                .store_pattern(ACTION_SEQUENCE_PATTERN, sequence.clone(), success)
                .await;
            update.patterns_stored += 1;
        }
        if let Some(tool) = &response.tool {
            self.procedural
                .store_pattern(
                    TOOL_USAGE_PATTERN,
                    json!({"tool": tool, "parameters": response.parameters}),
                    success,
                )
                .await;
            update.patterns_stored += 1;
        }

        debug!(
            experience_stored = update.experience_id.is_some(),
            patterns_stored = update.patterns_stored,
            "Updated memories"
        );
        update
    }

    pub fn clear_working_memory(&self) {
        self.working.reset();
    }

    pub async fn clear_caches(&self) {
        self.semantic.clear_caches().await;
        self.procedural.clear_cache().await;
    }

    pub fn working(&self) -> &WorkingTier {
        &self.working
    }

    pub fn episodic(&self) -> &Arc<EpisodicTier> {
        &self.episodic
    }

    pub fn semantic(&self) -> &Arc<SemanticTier> {
        &self.semantic
    }

    pub fn procedural(&self) -> &Arc<ProceduralTier> {
        &self.procedural
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmbeddingProvider, OutcomeKind, SimilarityError};
    use crate::infrastructure::{HashEmbeddingClient, InMemoryLearningStore, InMemoryVectorIndex};
    use async_trait::async_trait;

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>, SimilarityError> {
            Err(SimilarityError::Embedding("unreachable".to_string()))
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn coordinator_with(embedder: Arc<dyn EmbeddingProvider>) -> (MemoryCoordinator, InMemoryLearningStore) {
        let store = InMemoryLearningStore::new();
        let config = MemoryConfig::default();
        let coordinator = MemoryCoordinator::new(
            &config,
            Arc::new(EpisodicTier::new(embedder, Arc::new(InMemoryVectorIndex::new()))),
            Arc::new(SemanticTier::new(Arc::new(store.clone()), 0.9)),
            Arc::new(ProceduralTier::new(Arc::new(store.clone()))),
            Arc::new(store.clone()),
        );
        (coordinator, store)
    }

    fn signal_input() -> TurnInput {
        TurnInput::text("Going long BTC here")
            .with_trader("alice")
            .with_symbol("BTC")
            .with_action("buy")
    }

    #[tokio::test]
    async fn test_update_then_context_sees_every_tier() {
        let (coordinator, store) = coordinator_with(Arc::new(HashEmbeddingClient::new(128)));
        let input = signal_input();
        let response = AgentResponse::tool_call("place_order", json!({"symbol": "BTC", "side": "buy"}));
        let result = ActionResult {
            success: Some(true),
            outcome: Some(OutcomeKind::Success),
            profit_loss: Some(25.0),
            ..ActionResult::default()
        };

        let update = coordinator.update_memories(&input, &response, &result, None).await;
        assert!(update.experience_id.is_some());
        assert_eq!(update.trader_reliability, Some(1.0));
        assert!(update.trade_recorded);
        assert!(update.signal_recorded);
        assert_eq!(update.patterns_stored, 1);
        assert_eq!(store.list_signals(None).await.unwrap().len(), 1);

        let context = coordinator.get_context(&input).await;
        assert_eq!(context.working.conversation.len(), 1);
        assert_eq!(context.similar_experiences.len(), 1);
        assert_eq!(context.trader.unwrap().trade_history.len(), 1);
        assert_eq!(context.market.unwrap().trade_signals.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_outage_does_not_block_other_tiers() {
        let (coordinator, _store) = coordinator_with(Arc::new(DownEmbedder));
        let input = signal_input();
        let result = ActionResult {
            outcome: Some(OutcomeKind::Failure),
            ..ActionResult::default()
        };
        let mut response = AgentResponse::reply("noted");
        response.action_sequence = Some(json!(["analyze", "reply"]));

        let update = coordinator.update_memories(&input, &response, &result, None).await;
        assert!(update.experience_id.is_none());
        assert_eq!(update.trader_reliability, Some(0.0));
        assert_eq!(update.patterns_stored, 1);

        let context = coordinator.get_context(&input).await;
        assert!(context.similar_experiences.is_empty());
        assert_eq!(context.trader.unwrap().failed_signals, 1);
    }

    #[tokio::test]
    async fn test_anonymous_input_skips_semantic_records() {
        let (coordinator, _store) = coordinator_with(Arc::new(HashEmbeddingClient::new(32)));
        let input = TurnInput::text("hello there");
        let update = coordinator
            .update_memories(&input, &AgentResponse::reply("hi"), &ActionResult::succeeded(), None)
            .await;
        assert!(update.trader_reliability.is_none());
        assert!(!update.signal_recorded);

        let context = coordinator.get_context(&input).await;
        assert!(context.trader.is_none());
        assert!(context.market.is_none());
    }

    #[tokio::test]
    async fn test_clear_working_memory() {
        let (coordinator, _store) = coordinator_with(Arc::new(HashEmbeddingClient::new(32)));
        coordinator.working().set_state("mode", json!("scalping"));
        coordinator
            .update_memories(&TurnInput::text("x"), &AgentResponse::reply("y"), &ActionResult::succeeded(), None)
            .await;
        coordinator.clear_working_memory();
        coordinator.clear_caches().await;
        assert!(coordinator.working().is_empty());
        assert!(coordinator.working().get_state("mode").is_none());
    }
}

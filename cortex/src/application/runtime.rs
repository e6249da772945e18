// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cortex runtime
//!
//! Wires tiers, engines and coordinators around one learning store, one
//! embedding client, one vector index and one event bus.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Composition root for the memory and learning core

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::info;

use super::episodic_memory::EpisodicTier;
use super::feedback_engine::FeedbackEngine;
use super::learning_coordinator::LearningCoordinator;
use super::memory_coordinator::MemoryCoordinator;
use super::pattern_engine::PatternEngine;
use super::performance_engine::PerformanceEngine;
use super::procedural_memory::ProceduralTier;
use super::reinforcement_engine::ReinforcementEngine;
use super::semantic_memory::SemanticTier;
use super::turn::{ActionExecutor, AgentTurn, DecisionEngine};
use crate::config::CortexConfig;
use crate::domain::{EmbeddingProvider, LearningStore, StorageBackend, VectorIndex};
use crate::infrastructure::{
    EventBus, HashEmbeddingClient, InMemoryLearningStore, InMemoryVectorIndex, PostgresLearningStore,
};

pub struct CortexRuntime {
    pub config: CortexConfig,
    pub memory: Arc<MemoryCoordinator>,
    pub learning: Arc<LearningCoordinator>,
    pub events: EventBus,
}

impl CortexRuntime {
    /// Build on the configured storage backend. Postgres is connected and its
    /// schema created before anything else is wired.
    pub async fn from_config(config: &CortexConfig) -> Result<Self> {
        match config.storage.storage_backend()? {
            StorageBackend::InMemory => Ok(Self::in_memory(config)),
            StorageBackend::PostgreSQL(pg) => {
                let store = PostgresLearningStore::connect(&pg.connection_string)
                    .await
                    .context("Failed to connect to the learning store")?;
                store
                    .ensure_schema()
                    .await
                    .context("Failed to prepare the learning store schema")?;
                info!("Using PostgreSQL learning store");
                Ok(Self::with_store(
                    config,
                    Arc::new(store),
                    Arc::new(HashEmbeddingClient::new(config.memory.embedding_dimension)),
                    Arc::new(InMemoryVectorIndex::new()),
                    None,
                ))
            }
        }
    }

    pub fn in_memory(config: &CortexConfig) -> Self {
        Self::in_memory_inner(config, None)
    }

    /// In-memory runtime whose exploration choices are reproducible.
    pub fn in_memory_with_seed(config: &CortexConfig, seed: u64) -> Self {
        Self::in_memory_inner(config, Some(seed))
    }

    fn in_memory_inner(config: &CortexConfig, seed: Option<u64>) -> Self {
        Self::with_store(
            config,
            Arc::new(InMemoryLearningStore::new()),
            Arc::new(HashEmbeddingClient::new(config.memory.embedding_dimension)),
            Arc::new(InMemoryVectorIndex::new()),
            seed,
        )
    }

    pub fn with_store<S>(
        config: &CortexConfig,
        store: Arc<S>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        seed: Option<u64>,
    ) -> Self
    where
        S: LearningStore + 'static,
    {
        let learning_config = &config.learning;
        let events = EventBus::with_default_capacity();

        let episodic = Arc::new(EpisodicTier::new(embedder, index));
        let semantic = Arc::new(SemanticTier::new(
            store.clone(),
            learning_config.feedback.feedback_decay,
        ));
        let procedural = Arc::new(ProceduralTier::new(store.clone()));

        let memory = Arc::new(MemoryCoordinator::new(
            &config.memory,
            episodic.clone(),
            semantic.clone(),
            procedural.clone(),
            store.clone(),
        ));

        let reinforcement = match seed {
            Some(seed) => ReinforcementEngine::with_seed(learning_config.reinforcement.clone(), seed),
            None => ReinforcementEngine::new(learning_config.reinforcement.clone()),
        };
        let learning = Arc::new(LearningCoordinator::new(
            learning_config.clone(),
            FeedbackEngine::new(
                learning_config.feedback.clone(),
                semantic,
                procedural.clone(),
                store.clone(),
                store.clone(),
            ),
            reinforcement,
            PerformanceEngine::new(learning_config.performance.clone(), store.clone(), store.clone()),
            PatternEngine::new(learning_config.pattern.clone(), store.clone(), store.clone(), store)
                .with_episodic(episodic),
            procedural,
            events.clone(),
        ));

        Self {
            config: config.clone(),
            memory,
            learning,
            events,
        }
    }

    pub fn agent_turn(
        &self,
        decision: Arc<dyn DecisionEngine>,
        executor: Arc<dyn ActionExecutor>,
    ) -> AgentTurn {
        AgentTurn::new(self.memory.clone(), self.learning.clone(), decision, executor)
            .with_relevant_patterns(self.config.memory.max_procedural_patterns)
    }

    pub async fn shutdown(&self) {
        if self.learning.stop_background_learning().await {
            info!("Background learning stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_rejects_postgres_without_url() {
        let mut config = CortexConfig::default();
        config.storage.backend = "postgres".to_string();
        config.storage.database_url = None;
        assert!(CortexRuntime::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_runtime_shares_one_store() {
        let rt = CortexRuntime::in_memory(&CortexConfig::default());
        rt.memory
            .procedural()
            .store_pattern("general", serde_json::json!({"hint": "wait"}), true)
            .await;
        let patterns = rt.memory.procedural().get_patterns_by_type("general", 5).await;
        assert_eq!(patterns.len(), 1);
        rt.shutdown().await;
    }
}

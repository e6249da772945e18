// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Procedural memory
//!
//! Effectiveness records for action patterns (tool calls, action sequences,
//! strategies), keyed by the canonical content hash of the pattern payload so
//! the same payload under any field order lands on one record.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Track which actions work and rank them by effectiveness

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::canonical::content_hash;
use crate::domain::{ActionPattern, ActionPatternRepository, RepositoryError, TurnInput};

/// Minimum effectiveness for a pattern to count as relevant to a turn.
pub const RELEVANT_MIN_EFFECTIVENESS: f64 = 0.6;

pub const GENERAL_PATTERN_TYPE: &str = "general";

pub struct ProceduralTier {
    repository: Arc<dyn ActionPatternRepository>,
    cache: Mutex<HashMap<String, ActionPattern>>,
}

impl ProceduralTier {
    pub fn new(repository: Arc<dyn ActionPatternRepository>) -> Self {
        Self {
            repository,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Record one observation of `payload` under `pattern_type`. A first
    /// observation seeds the counts from its outcome alone.
    ///
    /// When the stored record cannot be read the observation is dropped and a
    /// detached first observation is returned; nothing is cached or persisted.
    pub async fn store_pattern(&self, pattern_type: &str, payload: Value, success: bool) -> ActionPattern {
        match self.record_observation(pattern_type, &payload, success).await {
            Ok((pattern, saved)) => {
                if let Err(e) = saved {
                    warn!(pattern_type, pattern_key = %pattern.pattern_key, error = %e, "Failed to persist action pattern");
                }
                pattern
            }
            Err(e) => {
                warn!(pattern_type, error = %e, "Action pattern unavailable, observation not recorded");
                ActionPattern::first_observation(pattern_type, payload, success)
            }
        }
    }

    /// Like [`store_pattern`](Self::store_pattern), but a failed read or write
    /// is returned to the caller. A failed write still updates the cache.
    pub async fn try_store_pattern(
        &self,
        pattern_type: &str,
        payload: Value,
        success: bool,
    ) -> Result<ActionPattern, RepositoryError> {
        let (pattern, saved) = self.record_observation(pattern_type, &payload, success).await?;
        saved.map(|()| pattern)
    }

    async fn record_observation(
        &self,
        pattern_type: &str,
        payload: &Value,
        success: bool,
    ) -> Result<(ActionPattern, Result<(), RepositoryError>), RepositoryError> {
        let pattern_key = content_hash(payload);
        let cache_key = ActionPattern::cache_key(pattern_type, &pattern_key);
        let mut cache = self.cache.lock().await;

        let existing = match cache.get(&cache_key) {
            Some(pattern) => Some(pattern.clone()),
            None => self.load(pattern_type, &pattern_key).await?,
        };

        let pattern = match existing {
            Some(mut pattern) => {
                pattern.record(success);
                pattern
            }
            None => ActionPattern::first_observation(pattern_type, payload.clone(), success),
        };

        let saved = self.repository.save_action_pattern(&pattern).await;
        debug!(
            pattern_type,
            pattern_key = %pattern.pattern_key,
            effectiveness = pattern.effectiveness,
            "Stored action pattern"
        );
        cache.insert(cache_key, pattern.clone());
        Ok((pattern, saved))
    }

    /// Count one success or failure against an existing pattern addressed by
    /// its key. Unknown keys are left alone.
    pub async fn update_pattern_effectiveness(
        &self,
        pattern_type: &str,
        pattern_key: &str,
        success: bool,
    ) -> Option<ActionPattern> {
        let cache_key = ActionPattern::cache_key(pattern_type, pattern_key);
        let mut cache = self.cache.lock().await;

        let mut pattern = match cache.get(&cache_key) {
            Some(pattern) => pattern.clone(),
            None => match self.load(pattern_type, pattern_key).await {
                Ok(Some(pattern)) => pattern,
                Ok(None) => {
                    warn!(pattern_type, pattern_key, "No action pattern to update");
                    return None;
                }
                Err(e) => {
                    warn!(pattern_type, pattern_key, error = %e, "Failed to load action pattern");
                    return None;
                }
            },
        };
        pattern.record(success);

        if let Err(e) = self.repository.save_action_pattern(&pattern).await {
            warn!(pattern_type, pattern_key, error = %e, "Failed to persist action pattern");
        }
        cache.insert(cache_key, pattern.clone());
        Some(pattern)
    }

    pub async fn get_pattern(&self, pattern_type: &str, payload: &Value) -> Option<ActionPattern> {
        let pattern_key = content_hash(payload);
        let cache_key = ActionPattern::cache_key(pattern_type, &pattern_key);
        let mut cache = self.cache.lock().await;
        if let Some(pattern) = cache.get(&cache_key) {
            return Some(pattern.clone());
        }
        match self.load(pattern_type, &pattern_key).await {
            Ok(found) => {
                let pattern = found?;
                cache.insert(cache_key, pattern.clone());
                Some(pattern)
            }
            Err(e) => {
                warn!(pattern_type, pattern_key = %pattern_key, error = %e, "Failed to load action pattern");
                None
            }
        }
    }

    pub async fn get_patterns_by_type(&self, pattern_type: &str, limit: usize) -> Vec<ActionPattern> {
        match self.repository.list_action_patterns(pattern_type, limit).await {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(pattern_type, error = %e, "Failed to list action patterns, using cache");
                let mut cached = self.cached_of_type(pattern_type).await;
                sort_by_effectiveness(&mut cached);
                cached.truncate(limit);
                cached
            }
        }
    }

    /// Patterns of `pattern_type` with effectiveness at least
    /// `min_effectiveness`, best first.
    pub async fn get_most_effective_patterns(
        &self,
        pattern_type: &str,
        min_effectiveness: f64,
        limit: usize,
    ) -> Vec<ActionPattern> {
        let mut patterns = self
            .get_patterns_by_type(pattern_type, limit.saturating_mul(2))
            .await;
        patterns.retain(|p| p.effectiveness >= min_effectiveness);
        sort_by_effectiveness(&mut patterns);
        patterns.truncate(limit);
        patterns
    }

    /// Effective patterns filed under the turn's trader, symbol and action,
    /// plus the general ones.
    pub async fn get_relevant_patterns(&self, input: &TurnInput, limit: usize) -> Vec<ActionPattern> {
        let mut pattern_types = Vec::new();
        if let Some(trader) = &input.trader_id {
            pattern_types.push(format!("trader:{}", trader));
        }
        if let Some(symbol) = &input.symbol {
            pattern_types.push(format!("symbol:{}", symbol));
        }
        if let Some(action) = &input.action {
            pattern_types.push(format!("action:{}", action));
        }
        pattern_types.push(GENERAL_PATTERN_TYPE.to_string());

        let mut merged: HashMap<String, ActionPattern> = HashMap::new();
        for pattern_type in &pattern_types {
            for pattern in self
                .get_most_effective_patterns(pattern_type, RELEVANT_MIN_EFFECTIVENESS, limit)
                .await
            {
                merged.insert(
                    ActionPattern::cache_key(&pattern.pattern_type, &pattern.pattern_key),
                    pattern,
                );
            }
        }

        let mut patterns: Vec<ActionPattern> = merged.into_values().collect();
        sort_by_effectiveness(&mut patterns);
        patterns.truncate(limit);
        patterns
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    async fn load(&self, pattern_type: &str, pattern_key: &str) -> Result<Option<ActionPattern>, RepositoryError> {
        self.repository.find_action_pattern(pattern_type, pattern_key).await
    }

    async fn cached_of_type(&self, pattern_type: &str) -> Vec<ActionPattern> {
        self.cache
            .lock()
            .await
            .values()
            .filter(|p| p.pattern_type == pattern_type)
            .cloned()
            .collect()
    }
}

/// Highest effectiveness first; ties keep the more observed pattern first.
fn sort_by_effectiveness(patterns: &mut [ActionPattern]) {
    patterns.sort_by(|a, b| {
        b.effectiveness
            .total_cmp(&a.effectiveness)
            .then_with(|| b.total_observations().cmp(&a.total_observations()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::infrastructure::InMemoryLearningStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn tier() -> (ProceduralTier, InMemoryLearningStore) {
        let store = InMemoryLearningStore::new();
        (ProceduralTier::new(Arc::new(store.clone())), store)
    }

    struct BrokenRepository;

    #[async_trait]
    impl ActionPatternRepository for BrokenRepository {
        async fn find_action_pattern(&self, _: &str, _: &str) -> Result<Option<ActionPattern>, RepositoryError> {
            Err(RepositoryError::Database("broken".to_string()))
        }

        async fn save_action_pattern(&self, _: &ActionPattern) -> Result<(), RepositoryError> {
            Err(RepositoryError::Database("broken".to_string()))
        }

        async fn list_action_patterns(&self, _: &str, _: usize) -> Result<Vec<ActionPattern>, RepositoryError> {
            Err(RepositoryError::Database("broken".to_string()))
        }
    }

    #[tokio::test]
    async fn test_field_order_maps_to_one_record() {
        let (tier, store) = tier();
        tier.store_pattern("tool_usage", json!({"tool": "buy", "parameters": {"qty": 1, "symbol": "BTC"}}), true)
            .await;
        let second = tier
            .store_pattern("tool_usage", json!({"parameters": {"symbol": "BTC", "qty": 1}, "tool": "buy"}), false)
            .await;

        assert_eq!(store.action_pattern_count(), 1);
        assert_eq!((second.success_count, second.failure_count), (1, 1));
        assert_eq!(second.effectiveness, 0.5);
    }

    #[tokio::test]
    async fn test_effectiveness_tracks_counts_after_cache_clear() {
        let (tier, _store) = tier();
        let payload = json!(["analyze", "buy"]);
        for success in [true, true, false, true] {
            tier.store_pattern("action_sequence", payload.clone(), success).await;
        }
        tier.clear_cache().await;
        let pattern = tier.get_pattern("action_sequence", &payload).await.unwrap();
        assert_eq!(pattern.success_count, 3);
        assert_eq!(pattern.failure_count, 1);
        assert_eq!(pattern.effectiveness, 0.75);
    }

    #[tokio::test]
    async fn test_update_by_key() {
        let (tier, _store) = tier();
        let stored = tier.store_pattern("strategy", json!({"name": "breakout"}), true).await;
        let updated = tier
            .update_pattern_effectiveness("strategy", &stored.pattern_key, false)
            .await
            .unwrap();
        assert_eq!(updated.effectiveness, 0.5);
        assert!(tier.update_pattern_effectiveness("strategy", "missing", true).await.is_none());
    }

    #[tokio::test]
    async fn test_most_effective_filters_and_sorts() {
        let (tier, _store) = tier();
        tier.store_pattern("general", json!("a"), true).await;
        tier.store_pattern("general", json!("b"), true).await;
        tier.store_pattern("general", json!("b"), false).await;
        tier.store_pattern("general", json!("c"), false).await;

        let best = tier.get_most_effective_patterns("general", 0.5, 5).await;
        let payloads: Vec<_> = best.iter().map(|p| p.pattern.clone()).collect();
        assert_eq!(payloads, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_relevant_patterns_merge_subject_types() {
        let (tier, _store) = tier();
        tier.store_pattern("trader:alice", json!("follow"), true).await;
        tier.store_pattern("symbol:BTC", json!("hodl"), true).await;
        tier.store_pattern("symbol:ETH", json!("fade"), true).await;
        tier.store_pattern("general", json!("ask"), false).await;

        let input = TurnInput::text("thoughts?").with_trader("alice").with_symbol("BTC");
        let relevant = tier.get_relevant_patterns(&input, 5).await;
        let types: Vec<_> = relevant.iter().map(|p| p.pattern_type.as_str()).collect();
        assert_eq!(relevant.len(), 2);
        assert!(types.contains(&"trader:alice"));
        assert!(types.contains(&"symbol:BTC"));
    }

    #[tokio::test]
    async fn test_unreadable_store_records_nothing() {
        let tier = ProceduralTier::new(Arc::new(BrokenRepository));
        let first = tier.store_pattern("general", json!("x"), true).await;
        assert_eq!(first.success_count, 1);
        tier.store_pattern("general", json!("x"), true).await;
        assert!(tier.get_patterns_by_type("general", 10).await.is_empty());
        assert!(tier.try_store_pattern("general", json!("x"), true).await.is_err());
    }

    /// Reads and writes go through to a real store unless told to fail.
    struct FlakyRepository {
        inner: InMemoryLearningStore,
        fail_next_find: AtomicBool,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl ActionPatternRepository for FlakyRepository {
        async fn find_action_pattern(
            &self,
            pattern_type: &str,
            pattern_key: &str,
        ) -> Result<Option<ActionPattern>, RepositoryError> {
            if self.fail_next_find.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Database("connection reset".to_string()));
            }
            self.inner.find_action_pattern(pattern_type, pattern_key).await
        }

        async fn save_action_pattern(&self, pattern: &ActionPattern) -> Result<(), RepositoryError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(RepositoryError::Database("read-only".to_string()));
            }
            self.inner.save_action_pattern(pattern).await
        }

        async fn list_action_patterns(
            &self,
            pattern_type: &str,
            limit: usize,
        ) -> Result<Vec<ActionPattern>, RepositoryError> {
            self.inner.list_action_patterns(pattern_type, limit).await
        }
    }

    #[tokio::test]
    async fn test_failed_load_keeps_stored_counts() {
        let (seeded, store) = tier();
        for _ in 0..3 {
            seeded.store_pattern("strategy", json!({"name": "breakout"}), true).await;
        }

        let flaky = Arc::new(FlakyRepository {
            inner: store.clone(),
            fail_next_find: AtomicBool::new(true),
            fail_saves: AtomicBool::new(false),
        });
        let tier = ProceduralTier::new(flaky);
        tier.store_pattern("strategy", json!({"name": "breakout"}), false).await;

        let stored = seeded.get_pattern("strategy", &json!({"name": "breakout"})).await.unwrap();
        assert_eq!((stored.success_count, stored.failure_count), (3, 0));

        let next = tier.store_pattern("strategy", json!({"name": "breakout"}), false).await;
        assert_eq!((next.success_count, next.failure_count), (3, 1));
        assert_eq!(store.action_pattern_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_and_cached() {
        let flaky = Arc::new(FlakyRepository {
            inner: InMemoryLearningStore::new(),
            fail_next_find: AtomicBool::new(false),
            fail_saves: AtomicBool::new(true),
        });
        let tier = ProceduralTier::new(flaky.clone());
        assert!(tier.try_store_pattern("general", json!("y"), true).await.is_err());

        let cached = tier.store_pattern("general", json!("y"), true).await;
        assert_eq!(cached.success_count, 2);
        assert_eq!(flaky.inner.action_pattern_count(), 0);
    }
}

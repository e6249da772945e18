// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reinforcement engine
//!
//! Tabular Q-learning over canonical state and action keys with an
//! epsilon-greedy policy.
//!
//! ```text
//! Q(s,a) += learning_rate * (reward * reward_scale + discount * max_a' Q(s',a') - Q(s,a))
//! exploration_rate = max(min_exploration_rate, exploration_rate * exploration_decay)
//! ```
//!
//! Keys come from [`canonical_key`]: string states map to `state:<value>`,
//! structured ones to `state:<sha256>` of their sorted-key encoding, and the
//! same for actions. The table holds at most `max_states` states; touching a
//! state marks it recently used and inserting past capacity evicts the least
//! recently used state together with its transition counts.
//!
//! All table state sits behind one lock so an update's read of `max Q(s',·)`
//! and its write of `Q(s,a)` are atomic with respect to concurrent selection.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Learn action values from rewards and pick actions

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ReinforcementConfig;
use crate::domain::canonical::canonical_key;

pub const ACTION_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Exploration,
    Exploitation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSelection {
    pub action: Value,
    pub action_key: String,
    pub mode: SelectionMode,
    pub q_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionHistoryEntry {
    pub state_key: String,
    pub action_key: String,
    pub mode: SelectionMode,
    pub exploration_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Serialized form of the learned model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QModelSnapshot {
    pub q_table: BTreeMap<String, BTreeMap<String, f64>>,
    pub transitions: BTreeMap<String, BTreeMap<String, u64>>,
    pub exploration_rate: f64,
}

#[derive(Debug, Default)]
struct StateEntry {
    actions: HashMap<String, f64>,
    transitions: HashMap<String, u64>,
}

struct QTable {
    states: LruCache<String, StateEntry>,
    exploration_rate: f64,
    history: VecDeque<ActionHistoryEntry>,
}

pub struct ReinforcementEngine {
    config: ReinforcementConfig,
    table: Mutex<QTable>,
    rng: Mutex<StdRng>,
}

impl ReinforcementEngine {
    pub fn new(config: ReinforcementConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic exploration for tests and simulations.
    pub fn with_seed(config: ReinforcementConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ReinforcementConfig, rng: StdRng) -> Self {
        let capacity = NonZeroUsize::new(config.max_states).unwrap_or(NonZeroUsize::MIN);
        let table = QTable {
            states: LruCache::new(capacity),
            exploration_rate: config.exploration_rate,
            history: VecDeque::new(),
        };
        metrics::gauge!("cortex_exploration_rate").set(config.exploration_rate);
        Self {
            config,
            table: Mutex::new(table),
            rng: Mutex::new(rng),
        }
    }

    /// Apply one Q-learning step and return the new `Q(state, action)`.
    pub fn update_q_value(&self, state: &Value, action: &Value, reward: f64, next_state: &Value) -> f64 {
        let state_key = canonical_key("state", state);
        let action_key = canonical_key("action", action);
        let next_key = canonical_key("state", next_state);
        let scaled = reward * self.config.reward_scale;

        let mut table = self.table.lock();
        let max_next = table
            .states
            .peek(&next_key)
            .and_then(|entry| entry.actions.values().copied().reduce(f64::max))
            .unwrap_or(0.0);

        let entry = table
            .states
            .get_or_insert_mut(state_key.clone(), StateEntry::default);
        let current = entry.actions.get(&action_key).copied().unwrap_or(0.0);
        let updated = current
            + self.config.learning_rate * (scaled + self.config.discount_factor * max_next - current);
        entry.actions.insert(action_key.clone(), updated);
        *entry.transitions.entry(next_key).or_insert(0) += 1;

        table.exploration_rate = (table.exploration_rate * self.config.exploration_decay)
            .max(self.config.min_exploration_rate);
        let exploration_rate = table.exploration_rate;
        drop(table);

        metrics::counter!("cortex_q_updates_total").increment(1);
        metrics::gauge!("cortex_exploration_rate").set(exploration_rate);
        debug!(
            state = %state_key,
            action = %action_key,
            reward,
            q_value = updated,
            exploration_rate,
            "Updated Q-value"
        );
        updated
    }

    /// Epsilon-greedy choice among `candidates`. Unknown pairs count as
    /// `Q = 0`; ties go to the earlier candidate. `None` when there is
    /// nothing to choose from.
    pub fn select_action(&self, state: &Value, candidates: &[Value]) -> Option<ActionSelection> {
        if candidates.is_empty() {
            return None;
        }
        let state_key = canonical_key("state", state);
        let action_keys: Vec<String> = candidates
            .iter()
            .map(|c| canonical_key("action", c))
            .collect();

        let exploration_rate = self.table.lock().exploration_rate;
        let explore_pick = {
            let mut rng = self.rng.lock();
            if rng.random::<f64>() < exploration_rate {
                Some(rng.random_range(0..candidates.len()))
            } else {
                None
            }
        };

        let mut table = self.table.lock();
        let values: Vec<f64> = {
            let known = table.states.get(&state_key).map(|entry| &entry.actions);
            action_keys
                .iter()
                .map(|key| known.and_then(|a| a.get(key)).copied().unwrap_or(0.0))
                .collect()
        };

        let (index, mode) = match explore_pick {
            Some(index) => (index, SelectionMode::Exploration),
            None => {
                let mut best = 0;
                for (i, value) in values.iter().enumerate().skip(1) {
                    if *value > values[best] {
                        best = i;
                    }
                }
                (best, SelectionMode::Exploitation)
            }
        };

        table.history.push_back(ActionHistoryEntry {
            state_key,
            action_key: action_keys[index].clone(),
            mode,
            exploration_rate,
            timestamp: Utc::now(),
        });
        while table.history.len() > ACTION_HISTORY_LIMIT {
            table.history.pop_front();
        }

        Some(ActionSelection {
            action: candidates[index].clone(),
            action_key: action_keys[index].clone(),
            mode,
            q_value: values[index],
        })
    }

    /// Known action values for `state`, keyed by canonical action key.
    pub fn action_values(&self, state: &Value) -> BTreeMap<String, f64> {
        let key = canonical_key("state", state);
        self.table
            .lock()
            .states
            .peek(&key)
            .map(|entry| entry.actions.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    /// Observed next-state distribution for `state`. Empty if never left.
    pub fn transition_probabilities(&self, state: &Value) -> BTreeMap<String, f64> {
        let key = canonical_key("state", state);
        let table = self.table.lock();
        let Some(entry) = table.states.peek(&key) else {
            return BTreeMap::new();
        };
        let total: u64 = entry.transitions.values().sum();
        if total == 0 {
            return BTreeMap::new();
        }
        entry
            .transitions
            .iter()
            .map(|(next, count)| (next.clone(), *count as f64 / total as f64))
            .collect()
    }

    /// Most recent selections, newest first.
    pub fn action_history(&self, limit: usize) -> Vec<ActionHistoryEntry> {
        self.table
            .lock()
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn exploration_rate(&self) -> f64 {
        self.table.lock().exploration_rate
    }

    pub fn state_count(&self) -> usize {
        self.table.lock().states.len()
    }

    pub fn save_model(&self) -> QModelSnapshot {
        let table = self.table.lock();
        let mut snapshot = QModelSnapshot {
            exploration_rate: table.exploration_rate,
            ..QModelSnapshot::default()
        };
        for (state, entry) in table.states.iter() {
            snapshot.q_table.insert(
                state.clone(),
                entry.actions.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            );
            if !entry.transitions.is_empty() {
                snapshot.transitions.insert(
                    state.clone(),
                    entry.transitions.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                );
            }
        }
        snapshot
    }

    /// Replace the learned model. States beyond capacity are evicted in
    /// load order.
    pub fn load_model(&self, snapshot: QModelSnapshot) {
        let QModelSnapshot {
            q_table,
            mut transitions,
            exploration_rate,
        } = snapshot;

        let mut table = self.table.lock();
        table.states.clear();
        for (state, actions) in q_table {
            let entry = StateEntry {
                actions: actions.into_iter().collect(),
                transitions: transitions.remove(&state).unwrap_or_default().into_iter().collect(),
            };
            table.states.put(state, entry);
        }
        for (state, counts) in transitions {
            table.states.put(
                state,
                StateEntry {
                    actions: HashMap::new(),
                    transitions: counts.into_iter().collect(),
                },
            );
        }
        table.exploration_rate = exploration_rate;
        metrics::gauge!("cortex_exploration_rate").set(exploration_rate);
        debug!(states = table.states.len(), exploration_rate, "Loaded Q-model");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ReinforcementConfig {
        ReinforcementConfig::default()
    }

    fn greedy() -> ReinforcementConfig {
        ReinforcementConfig {
            exploration_rate: 0.0,
            min_exploration_rate: 0.0,
            ..config()
        }
    }

    #[test]
    fn test_single_update_from_zero() {
        let engine = ReinforcementEngine::with_seed(config(), 7);
        let q = engine.update_q_value(&json!("s1"), &json!("a1"), 1.0, &json!("s2"));
        assert!((q - 0.1).abs() < 1e-12);
        assert_eq!(engine.action_values(&json!("s1")).get("action:a1"), Some(&q));
    }

    #[test]
    fn test_bootstraps_from_next_state() {
        let engine = ReinforcementEngine::with_seed(config(), 7);
        engine.update_q_value(&json!("s2"), &json!("a"), 1.0, &json!("end"));
        let q = engine.update_q_value(&json!("s1"), &json!("a"), 0.0, &json!("s2"));
        assert!((q - 0.1 * 0.9 * 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_exploration_decay() {
        let engine = ReinforcementEngine::with_seed(config(), 1);
        engine.update_q_value(&json!("s"), &json!("a"), 0.5, &json!("s"));
        assert!((engine.exploration_rate() - 0.199).abs() < 1e-12);

        let mut previous = engine.exploration_rate();
        for _ in 0..2000 {
            engine.update_q_value(&json!("s"), &json!("a"), 0.5, &json!("s"));
            let rate = engine.exploration_rate();
            assert!(rate <= previous);
            assert!(rate >= 0.01);
            previous = rate;
        }
        assert_eq!(previous, 0.01);
    }

    #[test]
    fn test_structured_state_is_order_independent() {
        let engine = ReinforcementEngine::with_seed(config(), 3);
        engine.update_q_value(&json!({"symbol": "BTC", "trader_id": "alice"}), &json!("buy"), 1.0, &json!("done"));
        let values = engine.action_values(&json!({"trader_id": "alice", "symbol": "BTC"}));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_greedy_selection_and_ties() {
        let engine = ReinforcementEngine::with_seed(greedy(), 11);
        let candidates = vec![json!("hold"), json!("buy"), json!("sell")];

        let first = engine.select_action(&json!("s"), &candidates).unwrap();
        assert_eq!(first.action, json!("hold"));
        assert_eq!(first.mode, SelectionMode::Exploitation);

        engine.update_q_value(&json!("s"), &json!("sell"), 1.0, &json!("t"));
        let best = engine.select_action(&json!("s"), &candidates).unwrap();
        assert_eq!(best.action, json!("sell"));
        assert!(best.q_value > 0.0);

        assert!(engine.select_action(&json!("s"), &[]).is_none());
        let history = engine.action_history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action_key, "action:sell");
    }

    #[test]
    fn test_full_exploration_is_seeded() {
        let explore = ReinforcementConfig {
            exploration_rate: 1.0,
            ..config()
        };
        let candidates: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        let picks = |seed| {
            let engine = ReinforcementEngine::with_seed(explore.clone(), seed);
            (0..20)
                .map(|_| engine.select_action(&json!("s"), &candidates).unwrap())
                .collect::<Vec<_>>()
        };
        let a = picks(42);
        let b = picks(42);
        assert!(a.iter().all(|s| s.mode == SelectionMode::Exploration));
        assert_eq!(
            a.iter().map(|s| s.action.clone()).collect::<Vec<_>>(),
            b.iter().map(|s| s.action.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_action_history_is_bounded() {
        let engine = ReinforcementEngine::with_seed(greedy(), 5);
        let candidates = vec![json!("x")];
        for _ in 0..(ACTION_HISTORY_LIMIT + 50) {
            engine.select_action(&json!("s"), &candidates);
        }
        assert_eq!(engine.action_history(usize::MAX).len(), ACTION_HISTORY_LIMIT);
    }

    #[test]
    fn test_transition_probabilities() {
        let engine = ReinforcementEngine::with_seed(config(), 9);
        engine.update_q_value(&json!("s"), &json!("a"), 0.0, &json!("x"));
        engine.update_q_value(&json!("s"), &json!("a"), 0.0, &json!("x"));
        engine.update_q_value(&json!("s"), &json!("b"), 0.0, &json!("y"));
        engine.update_q_value(&json!("s"), &json!("b"), 0.0, &json!("y"));
        let probs = engine.transition_probabilities(&json!("s"));
        assert_eq!(probs.get("state:x"), Some(&0.5));
        assert_eq!(probs.get("state:y"), Some(&0.5));
        assert!(engine.transition_probabilities(&json!("never")).is_empty());
    }

    #[test]
    fn test_lru_evicts_whole_state() {
        let small = ReinforcementConfig {
            max_states: 2,
            ..config()
        };
        let engine = ReinforcementEngine::with_seed(small, 2);
        engine.update_q_value(&json!("s1"), &json!("a"), 1.0, &json!("n"));
        engine.update_q_value(&json!("s2"), &json!("a"), 1.0, &json!("n"));
        engine.action_values(&json!("s1"));
        engine.select_action(&json!("s1"), &[json!("a")]);
        engine.update_q_value(&json!("s3"), &json!("a"), 1.0, &json!("n"));

        assert_eq!(engine.state_count(), 2);
        assert!(engine.action_values(&json!("s2")).is_empty());
        assert!(engine.transition_probabilities(&json!("s2")).is_empty());
        assert!(!engine.action_values(&json!("s1")).is_empty());
    }

    #[test]
    fn test_save_and_load_model() {
        let engine = ReinforcementEngine::with_seed(config(), 4);
        engine.update_q_value(&json!("s1"), &json!("a1"), 1.0, &json!("s2"));
        engine.update_q_value(&json!({"k": 1}), &json!({"tool": "t"}), -0.5, &json!("s1"));
        let snapshot = engine.save_model();

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = ReinforcementEngine::with_seed(config(), 99);
        restored.load_model(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.save_model(), snapshot);
        assert_eq!(restored.exploration_rate(), engine.exploration_rate());
    }
}

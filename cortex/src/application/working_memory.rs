// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Working memory: the last few turns plus a freeform scratch map

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ActionResult, AgentResponse, Interaction, TurnInput};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingContext {
    pub conversation: Vec<Interaction>,
    pub state: Map<String, Value>,
}

#[derive(Default)]
struct WorkingState {
    conversation: VecDeque<Interaction>,
    state: Map<String, Value>,
}

pub struct WorkingTier {
    max_history: usize,
    inner: Mutex<WorkingState>,
}

impl WorkingTier {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            inner: Mutex::new(WorkingState::default()),
        }
    }

    /// Append one interaction, trimming the oldest beyond capacity.
    pub fn update(&self, input: &TurnInput, response: &AgentResponse, result: &ActionResult) {
        let mut inner = self.inner.lock();
        inner.conversation.push_back(Interaction {
            input: input.clone(),
            response: response.clone(),
            result: result.clone(),
            timestamp: Utc::now(),
        });
        while inner.conversation.len() > self.max_history {
            inner.conversation.pop_front();
        }
    }

    pub fn get_context(&self) -> WorkingContext {
        let inner = self.inner.lock();
        WorkingContext {
            conversation: inner.conversation.iter().cloned().collect(),
            state: inner.state.clone(),
        }
    }

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().state.insert(key.into(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.inner.lock().state.get(key).cloned()
    }

    pub fn clear_state(&self) {
        self.inner.lock().state.clear();
    }

    /// Drop both the conversation and the state map
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.conversation.clear();
        inner.state.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().conversation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(tier: &WorkingTier, text: &str) {
        tier.update(
            &TurnInput::text(text),
            &AgentResponse::reply("ok"),
            &ActionResult::succeeded(),
        );
    }

    #[test]
    fn test_ring_buffer_trims_oldest() {
        let tier = WorkingTier::new(3);
        for i in 0..5 {
            turn(&tier, &format!("msg {}", i));
        }
        let context = tier.get_context();
        assert_eq!(context.conversation.len(), 3);
        assert_eq!(context.conversation[0].input.content.as_deref(), Some("msg 2"));
        assert_eq!(context.conversation[2].input.content.as_deref(), Some("msg 4"));
    }

    #[test]
    fn test_state_map_operations() {
        let tier = WorkingTier::new(2);
        tier.set_state("focus", json!("BTC"));
        assert_eq!(tier.get_state("focus"), Some(json!("BTC")));
        assert_eq!(tier.get_state("missing"), None);

        turn(&tier, "hello");
        tier.clear_state();
        assert!(tier.get_context().state.is_empty());
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let tier = WorkingTier::new(2);
        tier.set_state("k", json!(1));
        turn(&tier, "hello");
        tier.reset();
        assert!(tier.is_empty());
        assert_eq!(tier.get_context(), WorkingContext::default());
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent turn
//!
//! One pass of the agent loop, in a fixed order: read context, decide,
//! execute, write memories, learn. The decision engine and action executor
//! are collaborators behind traits; when either fails the turn still
//! completes with a failed [`ActionResult`] so the failure is remembered and
//! learned from.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Enforce read → decide → write → learn ordering per turn

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::learning_coordinator::LearningCoordinator;
use super::memory_coordinator::{CompositeContext, MemoryCoordinator, MemoryUpdate};
use crate::domain::{ActionResult, AgentResponse, TurnInput};

/// Default number of mined patterns attached to a turn's context
pub const DEFAULT_RELEVANT_PATTERNS: usize = 5;

/// Turns a context into a response. Usually backed by a language model.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(&self, input: &TurnInput, context: &CompositeContext) -> Result<AgentResponse>;
}

/// Carries out a response, e.g. delivers a message or places a trade.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, input: &TurnInput, response: &AgentResponse) -> Result<ActionResult>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub response: AgentResponse,
    pub result: ActionResult,
    pub memory: MemoryUpdate,
    pub reward: f64,
}

pub struct AgentTurn {
    memory: Arc<MemoryCoordinator>,
    learning: Arc<LearningCoordinator>,
    decision: Arc<dyn DecisionEngine>,
    executor: Arc<dyn ActionExecutor>,
    relevant_patterns: usize,
}

impl AgentTurn {
    pub fn new(
        memory: Arc<MemoryCoordinator>,
        learning: Arc<LearningCoordinator>,
        decision: Arc<dyn DecisionEngine>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            memory,
            learning,
            decision,
            executor,
            relevant_patterns: DEFAULT_RELEVANT_PATTERNS,
        }
    }

    pub fn with_relevant_patterns(mut self, limit: usize) -> Self {
        self.relevant_patterns = limit;
        self
    }

    pub async fn process_input(&self, input: TurnInput) -> TurnOutcome {
        let mut context = self.memory.get_context(&input).await;
        context.relevant_patterns = self
            .learning
            .get_relevant_patterns(&input, self.relevant_patterns)
            .await;

        let (response, result) = match self.decision.decide(&input, &context).await {
            Ok(response) => {
                let result = match self.executor.execute(&input, &response).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(error = %e, "Action execution failed");
                        ActionResult::failed(format!("execution failed: {:#}", e))
                    }
                };
                (response, result)
            }
            Err(e) => {
                warn!(error = %e, "Decision engine failed");
                (
                    AgentResponse::default(),
                    ActionResult::failed(format!("decision failed: {:#}", e)),
                )
            }
        };

        let memory = self
            .memory
            .update_memories(&input, &response, &result, None)
            .await;
        let reward = self.learning.learn_from_turn(&input, &response, &result).await;

        info!(
            trader_id = ?input.trader_id,
            symbol = ?input.symbol,
            success = ?result.success,
            reward,
            "Processed agent turn"
        );
        TurnOutcome {
            response,
            result,
            memory,
            reward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::CortexRuntime;
    use crate::config::CortexConfig;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    struct RecordingDecision {
        seen_patterns: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl DecisionEngine for RecordingDecision {
        async fn decide(&self, _input: &TurnInput, context: &CompositeContext) -> Result<AgentResponse> {
            self.seen_patterns.lock().push(context.relevant_patterns.len());
            Ok(AgentResponse::reply("noted"))
        }
    }

    struct BrokenDecision;

    #[async_trait]
    impl DecisionEngine for BrokenDecision {
        async fn decide(&self, _input: &TurnInput, _context: &CompositeContext) -> Result<AgentResponse> {
            Err(anyhow!("model unavailable"))
        }
    }

    struct Succeeds;

    #[async_trait]
    impl ActionExecutor for Succeeds {
        async fn execute(&self, _input: &TurnInput, _response: &AgentResponse) -> Result<ActionResult> {
            Ok(ActionResult::succeeded())
        }
    }

    struct BrokenExecutor;

    #[async_trait]
    impl ActionExecutor for BrokenExecutor {
        async fn execute(&self, _input: &TurnInput, _response: &AgentResponse) -> Result<ActionResult> {
            Err(anyhow!("channel closed"))
        }
    }

    fn runtime() -> CortexRuntime {
        CortexRuntime::in_memory(&CortexConfig::default())
    }

    #[tokio::test]
    async fn test_turn_updates_memory_and_learning() {
        let rt = runtime();
        let decision = Arc::new(RecordingDecision {
            seen_patterns: Mutex::new(Vec::new()),
        });
        let turn = rt.agent_turn(decision.clone(), Arc::new(Succeeds));

        let outcome = turn
            .process_input(TurnInput::text("what about sol?").with_trader("alice"))
            .await;
        assert_eq!(outcome.result.success, Some(true));
        assert_eq!(outcome.reward, 1.0);
        assert!(outcome.memory.experience_id.is_some());
        assert_eq!(rt.memory.working().len(), 1);
        assert_eq!(decision.seen_patterns.lock().as_slice(), &[0]);
    }

    #[tokio::test]
    async fn test_decision_failure_still_remembered() {
        let rt = runtime();
        let turn = rt.agent_turn(Arc::new(BrokenDecision), Arc::new(Succeeds));

        let outcome = turn.process_input(TurnInput::text("hello")).await;
        assert_eq!(outcome.result.success, Some(false));
        assert!(outcome
            .result
            .message
            .as_deref()
            .is_some_and(|m| m.contains("model unavailable")));
        assert_eq!(outcome.reward, -1.0);
        assert_eq!(rt.memory.working().len(), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_is_a_failed_result() {
        let rt = runtime();
        let turn = rt.agent_turn(
            Arc::new(RecordingDecision {
                seen_patterns: Mutex::new(Vec::new()),
            }),
            Arc::new(BrokenExecutor),
        );
        let outcome = turn.process_input(TurnInput::text("ping")).await;
        assert_eq!(outcome.response, AgentResponse::reply("noted"));
        assert_eq!(outcome.result.success, Some(false));
    }
}

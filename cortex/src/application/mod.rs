// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: memory tiers, learning engines and their coordinators

pub mod episodic_memory;
pub mod feedback_engine;
pub mod learning_coordinator;
pub mod memory_coordinator;
pub mod pattern_engine;
pub mod performance_engine;
pub mod procedural_memory;
pub mod reinforcement_engine;
pub mod runtime;
pub mod semantic_memory;
pub mod turn;
pub mod working_memory;

pub use episodic_memory::EpisodicTier;
pub use feedback_engine::FeedbackEngine;
pub use learning_coordinator::{LearningCoordinator, LearningCycleResult};
pub use memory_coordinator::{CompositeContext, MemoryCoordinator, MemoryUpdate};
pub use pattern_engine::PatternEngine;
pub use performance_engine::PerformanceEngine;
pub use procedural_memory::ProceduralTier;
pub use reinforcement_engine::{ActionSelection, QModelSnapshot, ReinforcementEngine, SelectionMode};
pub use runtime::CortexRuntime;
pub use semantic_memory::SemanticTier;
pub use turn::{ActionExecutor, AgentTurn, DecisionEngine, TurnOutcome};
pub use working_memory::{WorkingContext, WorkingTier};

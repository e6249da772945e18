// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Synthetic trading session against the in-memory stack
//!
//! Three traders with different hit rates post signals on three symbols. The
//! decision engine lets the reinforcement engine choose between placing the
//! order and holding; the executor resolves orders at the trader's hit rate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use signal_cortex::{
    ActionExecutor, ActionResult, AgentResponse, CompositeContext, CortexConfig, CortexRuntime,
    DecisionEngine, FeedbackInput, FeedbackKind, FeedbackValue, LearningCoordinator,
    LearningCycleResult, OutcomeKind, TurnInput,
};

const TRADERS: [(&str, f64); 3] = [("alice", 0.8), ("bob", 0.55), ("carol", 0.25)];
const SYMBOLS: [&str; 3] = ["BTC", "ETH", "SOL"];
const SIDES: [&str; 2] = ["buy", "sell"];
const PLACE_ORDER: &str = "place_order";

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of agent turns to run
    #[arg(long, default_value_t = 50)]
    turns: usize,

    /// Seed for the synthetic market and for exploration
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Serialize)]
struct SimulationSummary {
    turns: usize,
    seed: u64,
    orders_placed: usize,
    successful_orders: usize,
    exploration_rate: f64,
    states_learned: usize,
    cycle: LearningCycleResult,
}

/// Lets the Q-table choose between placing the signalled order and holding.
struct QPolicy {
    learning: Arc<LearningCoordinator>,
}

#[async_trait]
impl DecisionEngine for QPolicy {
    async fn decide(&self, input: &TurnInput, _context: &CompositeContext) -> Result<AgentResponse> {
        let (Some(symbol), Some(side)) = (&input.symbol, &input.action) else {
            return Ok(AgentResponse::reply("nothing to act on"));
        };
        let candidates = [
            AgentResponse::tool_call(PLACE_ORDER, json!({"symbol": symbol, "side": side})),
            AgentResponse::reply("hold"),
        ];
        let actions: Vec<_> = candidates.iter().map(AgentResponse::learning_action).collect();

        let selection = self
            .learning
            .select_action(&input.learning_state(), &actions)
            .context("No candidate actions")?;
        let index = actions
            .iter()
            .position(|a| *a == selection.action)
            .context("Selected action is not a candidate")?;
        Ok(candidates[index].clone())
    }
}

/// Resolves orders at the signalling trader's hit rate.
struct SyntheticMarket {
    rng: Mutex<StdRng>,
}

#[async_trait]
impl ActionExecutor for SyntheticMarket {
    async fn execute(&self, input: &TurnInput, response: &AgentResponse) -> Result<ActionResult> {
        if response.tool.as_deref() != Some(PLACE_ORDER) {
            return Ok(ActionResult::default());
        }
        let hit_rate = TRADERS
            .iter()
            .find(|(name, _)| input.trader_id.as_deref() == Some(*name))
            .map_or(0.5, |(_, rate)| *rate);

        let mut rng = self.rng.lock();
        let (outcome, profit_loss) = if rng.random_bool(hit_rate) {
            (OutcomeKind::Success, rng.random_range(5.0..60.0))
        } else {
            (OutcomeKind::Failure, -rng.random_range(5.0..40.0))
        };
        Ok(ActionResult {
            success: Some(outcome == OutcomeKind::Success),
            outcome: Some(outcome),
            profit_loss: Some(profit_loss),
            ..ActionResult::default()
        })
    }
}

pub async fn run(args: SimulateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = CortexConfig::load_or_default(config_override).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let runtime = CortexRuntime::in_memory_with_seed(&config, args.seed);
    let turn = runtime.agent_turn(
        Arc::new(QPolicy {
            learning: runtime.learning.clone(),
        }),
        Arc::new(SyntheticMarket {
            rng: Mutex::new(StdRng::seed_from_u64(args.seed.wrapping_add(1))),
        }),
    );

    let mut signals = StdRng::seed_from_u64(args.seed);
    let mut orders_placed = 0;
    let mut successful_orders = 0;
    for i in 0..args.turns {
        let (trader, _) = TRADERS[signals.random_range(0..TRADERS.len())];
        let symbol = SYMBOLS[signals.random_range(0..SYMBOLS.len())];
        let side = SIDES[signals.random_range(0..SIDES.len())];
        let input = TurnInput::text(format!("{} signal: {} {} now", trader, side, symbol))
            .with_trader(trader)
            .with_symbol(symbol)
            .with_action(side);

        let outcome = turn.process_input(input).await;
        if outcome.response.tool.is_some() {
            orders_placed += 1;
            if outcome.result.success == Some(true) {
                successful_orders += 1;
            }
        }

        // Every fifth turn the user rates the trader.
        if i % 5 == 4 {
            runtime
                .learning
                .process_feedback(&FeedbackInput {
                    kind: FeedbackKind::TraderReliability,
                    value: FeedbackValue::Score(if outcome.reward >= 0.0 { 0.8 } else { -0.8 }),
                    trader_id: Some(trader.to_string()),
                    ..FeedbackInput::default()
                })
                .await;
        }
    }

    let cycle = runtime.learning.run_learning_cycle().await;
    info!(
        turns = args.turns,
        orders_placed,
        patterns_detected = cycle.patterns_detected(),
        "Simulation finished"
    );

    let reinforcement = runtime.learning.reinforcement();
    let summary = SimulationSummary {
        turns: args.turns,
        seed: args.seed,
        orders_placed,
        successful_orders,
        exploration_rate: reinforcement.exploration_rate(),
        states_learned: reinforcement.state_count(),
        cycle,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    runtime.shutdown().await;
    Ok(())
}

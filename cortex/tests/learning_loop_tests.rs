// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use signal_cortex::{
    ActionExecutor, ActionResult, AgentResponse, CompositeContext, CortexConfig, CortexEvent,
    CortexRuntime, DecisionEngine, FeedbackInput, FeedbackKind, FeedbackValue, MetricsResult,
    OutcomeKind, PatternDomain, PatternKind, Timeframe, TradeOutcomeInput, Transition, TurnInput,
};

fn runtime() -> CortexRuntime {
    CortexRuntime::in_memory_with_seed(&CortexConfig::default(), 11)
}

fn outcome(trader: &str, symbol: &str, kind: OutcomeKind, profit_loss: f64) -> TradeOutcomeInput {
    TradeOutcomeInput {
        trade_id: None,
        trader_id: Some(trader.to_string()),
        symbol: symbol.to_string(),
        action: Some("buy".to_string()),
        outcome: kind,
        profit_loss,
        transition: None,
    }
}

#[tokio::test]
async fn test_q_update_from_feedback_transition() {
    let rt = runtime();
    rt.learning
        .process_feedback(&FeedbackInput {
            kind: FeedbackKind::General,
            value: FeedbackValue::Score(1.0),
            transition: Some(Transition {
                state: json!("s1"),
                action: json!("a1"),
                next_state: Some(json!("s2")),
            }),
            ..FeedbackInput::default()
        })
        .await;

    let values = rt.learning.reinforcement().action_values(&json!("s1"));
    let q = values.values().next().copied().unwrap();
    assert!((q - 0.1).abs() < 1e-12);
    assert!((rt.learning.reinforcement().exploration_rate() - 0.199).abs() < 1e-12);
}

#[tokio::test]
async fn test_trader_reliability_decay() {
    let rt = runtime();
    rt.learning
        .process_feedback(&FeedbackInput {
            kind: FeedbackKind::TraderReliability,
            value: FeedbackValue::Score(1.0),
            trader_id: Some("alice".to_string()),
            ..FeedbackInput::default()
        })
        .await;
    let profile = rt.memory.semantic().trader_profile("alice").await;
    assert!((profile.reliability - 0.55).abs() < 1e-12);
}

#[tokio::test]
async fn test_metrics_over_mixed_outcomes() {
    let rt = runtime();
    for (kind, pl) in [
        (OutcomeKind::Success, 50.0),
        (OutcomeKind::Success, 30.0),
        (OutcomeKind::Failure, -20.0),
        (OutcomeKind::Success, 40.0),
        (OutcomeKind::Failure, -10.0),
        (OutcomeKind::Unknown, 0.0),
    ] {
        rt.learning.process_outcome(&outcome("alice", "BTC", kind, pl)).await;
    }

    let metrics = rt.learning.get_performance_metrics(Timeframe::All).await;
    let snapshot = metrics.snapshot().unwrap();
    assert_eq!(snapshot.total_trades, 6);
    assert_eq!(snapshot.successful_trades, 3);
    assert_eq!(snapshot.failed_trades, 2);
    assert_eq!(snapshot.neutral_trades, 1);
    assert_eq!(snapshot.success_rate, 0.5);
    assert_eq!(snapshot.total_profit, 120.0);
    assert_eq!(snapshot.total_loss, -30.0);
    assert_eq!(snapshot.net_profit, 90.0);
}

#[tokio::test]
async fn test_symbol_pattern_confidence() {
    let rt = runtime();
    let kinds = [
        OutcomeKind::Success,
        OutcomeKind::Failure,
        OutcomeKind::Success,
        OutcomeKind::Success,
        OutcomeKind::Success,
    ];
    for (i, kind) in kinds.into_iter().enumerate() {
        rt.learning
            .process_outcome(&outcome(&format!("t{}", i), "ETH", kind, 10.0))
            .await;
    }

    let patterns = rt.learning.detect_patterns(PatternDomain::Trades, Timeframe::All).await;
    let symbol = patterns
        .iter()
        .find(|p| matches!(&p.kind, PatternKind::HighSuccessSymbol { symbol, .. } if symbol == "ETH"))
        .unwrap();
    assert!((symbol.strength - 0.8).abs() < 1e-12);
    assert!((symbol.confidence - 0.4).abs() < 1e-12);
}

#[tokio::test]
async fn test_insufficient_sample_is_not_an_error() {
    let rt = runtime();
    rt.learning
        .process_outcome(&outcome("alice", "BTC", OutcomeKind::Success, 10.0))
        .await;
    let metrics = rt.learning.get_performance_metrics(Timeframe::Day).await;
    assert!(matches!(
        metrics,
        MetricsResult::InsufficientData { total_trades: 1, min_sample_size: 5, .. }
    ));
}

#[tokio::test]
async fn test_outcome_events_are_published() {
    let rt = runtime();
    let mut events = rt.events.subscribe_to(&["trade_outcome_processed"]);
    rt.learning
        .process_outcome(&outcome("bob", "SOL", OutcomeKind::Failure, -50.0))
        .await;

    match events.recv().await.unwrap() {
        CortexEvent::TradeOutcomeProcessed { symbol, reward, .. } => {
            assert_eq!(symbol, "SOL");
            assert_eq!(reward, -0.5);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_background_loop_runs_a_cycle_and_stops() {
    let rt = runtime();
    let mut completed = rt.events.subscribe_to(&["learning_cycle_completed"]);

    assert!(rt.learning.start_if_enabled());
    let event = tokio::time::timeout(Duration::from_secs(5), completed.recv())
        .await
        .expect("cycle did not complete")
        .unwrap();
    assert!(matches!(event, CortexEvent::LearningCycleCompleted { errors: 0, .. }));

    assert!(rt.learning.stop_background_learning().await);
    assert!(!rt.learning.stop_background_learning().await);
    assert!(!rt.learning.is_background_learning());
}

struct TradeEverything;

#[async_trait]
impl DecisionEngine for TradeEverything {
    async fn decide(&self, input: &TurnInput, _context: &CompositeContext) -> Result<AgentResponse> {
        Ok(AgentResponse::tool_call(
            "place_order",
            json!({"symbol": input.symbol, "side": input.action}),
        ))
    }
}

struct AlwaysFills;

#[async_trait]
impl ActionExecutor for AlwaysFills {
    async fn execute(&self, _input: &TurnInput, _response: &AgentResponse) -> Result<ActionResult> {
        Ok(ActionResult {
            success: Some(true),
            outcome: Some(OutcomeKind::Success),
            profit_loss: Some(20.0),
            ..ActionResult::default()
        })
    }
}

#[tokio::test]
async fn test_turns_feed_memory_and_patterns() {
    let rt = runtime();
    let turn = rt.agent_turn(Arc::new(TradeEverything), Arc::new(AlwaysFills));

    for _ in 0..6 {
        let input = TurnInput::text("alice: buy BTC")
            .with_trader("alice")
            .with_symbol("BTC")
            .with_action("buy");
        let outcome = turn.process_input(input).await;
        assert_eq!(outcome.reward, 0.2);
        assert!(outcome.memory.signal_recorded);
    }

    let profile = rt.memory.semantic().trader_profile("alice").await;
    assert_eq!(profile.successful_signals, 6);
    assert_eq!(profile.trade_history.len(), 6);

    let cycle = rt.learning.run_learning_cycle().await;
    assert!(cycle.error.is_none());
    assert!(cycle.patterns["trades"]
        .iter()
        .any(|p| p.tag() == "reliable_trader"));
    assert!(cycle.patterns["signals"]
        .iter()
        .any(|p| p.tag() == "frequent_signaler"));

    // The next turn about the same subjects sees the mined patterns.
    let input = TurnInput::text("again?").with_trader("alice").with_symbol("BTC");
    let relevant = rt.learning.get_relevant_patterns(&input, 5).await;
    assert!(!relevant.is_empty());
    assert!(relevant.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn test_partial_yaml_config_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "learning:\n  pattern:\n    min_pattern_occurrences: 3\n  background_learning: false\n"
    )
    .unwrap();

    let config = CortexConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.learning.pattern.min_pattern_occurrences, 3);
    assert!(!config.learning.background_learning);
    assert_eq!(config.learning.reinforcement.learning_rate, 0.1);
    assert!(config.validate().is_ok());
}

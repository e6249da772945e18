// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learning Coordinator - feedback routing and the background learning cycle
//!
//! Owns the four learning engines. Foreground calls route feedback and trade
//! outcomes into the feedback engine and, when a state/action transition is
//! attached, into the Q-table. The background task repeats the learning
//! cycle (metrics, due report, pattern mining, procedural write-back) every
//! `learning_cycle_interval_secs`.
//!
//! Cancellation is observed at the next sleep boundary. A fault outside the
//! cycle's own error capture (a panic) backs the loop off for 60 seconds
//! instead of ending it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Compose the learning engines and drive the learning loop

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::feedback_engine::{outcome_success, FeedbackEngine};
use super::pattern_engine::PatternEngine;
use super::performance_engine::PerformanceEngine;
use super::procedural_memory::ProceduralTier;
use super::reinforcement_engine::{ActionSelection, ReinforcementEngine};
use crate::config::LearningConfig;
use crate::domain::{
    ActionResult, AgentResponse, CortexError, CortexEvent, DetectedPattern, FeedbackInput,
    FeedbackRecord, MetricsResult, PatternDomain, PerformanceReport, Timeframe, TradeOutcome,
    TradeOutcomeInput, Transition, TurnInput,
};
use crate::infrastructure::EventBus;

/// Pause after a loop-level fault before the next attempt
pub const LOOP_FAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Everything one learning cycle produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningCycleResult {
    pub timeframe: Timeframe,
    pub started_at: DateTime<Utc>,
    pub metrics: Option<MetricsResult>,
    pub report: Option<PerformanceReport>,
    /// Keyed by domain name
    pub patterns: BTreeMap<String, Vec<DetectedPattern>>,
    /// Detected patterns written back to procedural memory
    pub patterns_stored: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LearningCycleResult {
    fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            started_at: Utc::now(),
            metrics: None,
            report: None,
            patterns: BTreeMap::new(),
            patterns_stored: 0,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn patterns_detected(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }
}

struct BackgroundTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct LearningCoordinator {
    config: LearningConfig,
    feedback: FeedbackEngine,
    reinforcement: ReinforcementEngine,
    performance: PerformanceEngine,
    patterns: PatternEngine,
    procedural: Arc<ProceduralTier>,
    events: EventBus,
    background: Mutex<Option<BackgroundTask>>,
}

impl LearningCoordinator {
    pub fn new(
        config: LearningConfig,
        feedback: FeedbackEngine,
        reinforcement: ReinforcementEngine,
        performance: PerformanceEngine,
        patterns: PatternEngine,
        procedural: Arc<ProceduralTier>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            feedback,
            reinforcement,
            performance,
            patterns,
            procedural,
            events,
            background: Mutex::new(None),
        }
    }

    /// Record user feedback; a transition on the input also updates its Q-value
    /// with the normalised feedback value.
    pub async fn process_feedback(&self, input: &FeedbackInput) -> FeedbackRecord {
        let record = self.feedback.process_user_feedback(input).await;
        if let Some(transition) = &input.transition {
            self.reinforce(transition, record.value);
        }
        self.events.publish(CortexEvent::FeedbackProcessed {
            feedback_id: record.id,
            feedback_type: record.kind.as_str().to_string(),
            value: record.value,
            timestamp: record.timestamp,
        });
        record
    }

    /// Score a trade outcome; a transition on the input also updates its
    /// Q-value with the outcome's reward.
    pub async fn process_outcome(&self, input: &TradeOutcomeInput) -> TradeOutcome {
        let outcome = self.feedback.process_trade_outcome(input).await;
        if let Some(transition) = &input.transition {
            self.reinforce(transition, outcome.reward);
        }
        self.events.publish(CortexEvent::TradeOutcomeProcessed {
            symbol: outcome.symbol.clone(),
            trader_id: outcome.trader_id.clone(),
            outcome: outcome.outcome,
            reward: outcome.reward,
            timestamp: outcome.recorded_at,
        });
        outcome
    }

    /// Feed a finished turn into learning. A turn about a symbol with a known
    /// outcome becomes a trade outcome; any other turn only reinforces its
    /// state/action pair by plain success or failure.
    pub async fn learn_from_turn(
        &self,
        input: &TurnInput,
        response: &AgentResponse,
        result: &ActionResult,
    ) -> f64 {
        let transition = Transition {
            state: input.learning_state(),
            action: response.learning_action(),
            next_state: None,
        };

        match (&input.symbol, result.outcome) {
            (Some(symbol), Some(outcome)) => {
                let outcome = self
                    .process_outcome(&TradeOutcomeInput {
                        trade_id: None,
                        trader_id: input.trader_id.clone(),
                        symbol: symbol.clone(),
                        action: input.action.clone(),
                        outcome,
                        profit_loss: result.profit_loss.unwrap_or(0.0),
                        transition: Some(transition),
                    })
                    .await;
                outcome.reward
            }
            _ => {
                let success = result.outcome.and_then(outcome_success).or(result.success);
                let reward = match success {
                    Some(true) => 1.0,
                    Some(false) => -1.0,
                    None => 0.0,
                };
                self.reinforce(&transition, reward);
                reward
            }
        }
    }

    pub fn select_action(&self, state: &Value, candidates: &[Value]) -> Option<ActionSelection> {
        self.reinforcement.select_action(state, candidates)
    }

    pub async fn get_performance_metrics(&self, timeframe: Timeframe) -> MetricsResult {
        self.performance.calculate_metrics(timeframe).await
    }

    /// Generates a report now, regardless of the reporting schedule.
    pub async fn get_performance_report(&self, timeframe: Timeframe) -> PerformanceReport {
        let report = self.performance.generate_performance_report(timeframe).await;
        self.publish_report(&report);
        report
    }

    pub async fn detect_patterns(&self, domain: PatternDomain, timeframe: Timeframe) -> Vec<DetectedPattern> {
        let patterns = self.patterns.detect_patterns(domain, timeframe).await;
        self.events.publish(CortexEvent::PatternsDetected {
            domain,
            count: patterns.len(),
            timestamp: Utc::now(),
        });
        patterns
    }

    pub async fn detect_patterns_by_name(
        &self,
        domain: &str,
        timeframe: &str,
    ) -> Result<Vec<DetectedPattern>, CortexError> {
        let domain: PatternDomain = domain.parse()?;
        let timeframe: Timeframe = timeframe.parse()?;
        Ok(self.detect_patterns(domain, timeframe).await)
    }

    pub async fn get_patterns_by_type(&self, tag: &str, min_confidence: f64) -> Vec<DetectedPattern> {
        self.patterns.patterns_by_type(tag, min_confidence).await
    }

    pub async fn get_relevant_patterns(&self, input: &TurnInput, limit: usize) -> Vec<DetectedPattern> {
        self.patterns.get_relevant_patterns(input, limit).await
    }

    pub fn recent_feedback(&self, limit: usize) -> Vec<FeedbackRecord> {
        self.feedback.recent_feedback(limit)
    }

    pub fn reinforcement(&self) -> &ReinforcementEngine {
        &self.reinforcement
    }

    pub fn performance(&self) -> &PerformanceEngine {
        &self.performance
    }

    /// Run one learning cycle over all history. Never fails; a fault is
    /// reported in the result's `error`.
    pub async fn run_learning_cycle(&self) -> LearningCycleResult {
        self.run_learning_cycle_for(Timeframe::All).await
    }

    pub async fn run_learning_cycle_for(&self, timeframe: Timeframe) -> LearningCycleResult {
        let started = Instant::now();
        let mut result = LearningCycleResult::new(timeframe);
        info!(timeframe = %timeframe, "Running learning cycle");

        if let Err(e) = self.cycle_steps(&mut result).await {
            error!(error = %e, "Learning cycle failed");
            result.error = Some(format!("{:#}", e));
        }

        let elapsed = started.elapsed();
        result.duration_ms = elapsed.as_millis() as u64;

        let status = if result.error.is_some() { "error" } else { "ok" };
        metrics::counter!("cortex_learning_cycles_total", "status" => status).increment(1);
        metrics::histogram!("cortex_learning_cycle_duration_seconds").record(elapsed.as_secs_f64());

        self.events.publish(CortexEvent::LearningCycleCompleted {
            patterns_detected: result.patterns_detected(),
            report_generated: result.report.is_some(),
            errors: usize::from(result.error.is_some()),
            duration_ms: result.duration_ms,
            timestamp: Utc::now(),
        });
        info!(
            patterns_detected = result.patterns_detected(),
            patterns_stored = result.patterns_stored,
            report_generated = result.report.is_some(),
            duration_ms = result.duration_ms,
            "Learning cycle completed"
        );
        result
    }

    /// Every detected pattern is written back as a successful observation on
    /// every cycle, so patterns that keep being detected keep gaining weight
    /// in procedural memory. A failed write-back ends the cycle with an error.
    async fn cycle_steps(&self, result: &mut LearningCycleResult) -> anyhow::Result<()> {
        let timeframe = result.timeframe;
        result.metrics = Some(self.performance.calculate_metrics(timeframe).await);

        if let Some(report) = self.performance.generate_report_if_due(timeframe).await {
            self.publish_report(&report);
            result.report = Some(report);
        }

        for domain in PatternDomain::ALL {
            let patterns = self.detect_patterns(domain, timeframe).await;
            result.patterns.insert(domain.as_str().to_string(), patterns);
        }

        for pattern in result.patterns.values().flatten() {
            let payload = serde_json::to_value(&pattern.kind)
                .with_context(|| format!("Failed to encode {} pattern", pattern.tag()))?;
            self.procedural
                .try_store_pattern(pattern.tag(), payload, true)
                .await
                .with_context(|| format!("Failed to store {} pattern", pattern.tag()))?;
            result.patterns_stored += 1;
        }
        Ok(())
    }

    /// Start the background loop. Returns `false` if it is already running.
    pub fn start_background_learning(self: &Arc<Self>) -> bool {
        let mut background = self.background.lock();
        if background.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            debug!("Background learning already running");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(self).run_background(token.clone()));
        *background = Some(BackgroundTask { token, handle });

        self.events.publish(CortexEvent::BackgroundLearningStarted {
            interval_seconds: self.config.learning_cycle_interval_secs,
            timestamp: Utc::now(),
        });
        true
    }

    /// Starts the loop only when `background_learning` is enabled.
    pub fn start_if_enabled(self: &Arc<Self>) -> bool {
        if !self.config.background_learning {
            info!("Background learning is disabled");
            return false;
        }
        self.start_background_learning()
    }

    /// Stop the background loop and wait for it to exit. Stopping a loop that
    /// is not running is a no-op that returns `false`.
    pub async fn stop_background_learning(&self) -> bool {
        let task = self.background.lock().take();
        let Some(task) = task else {
            return false;
        };
        task.token.cancel();
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Background learning task ended abnormally");
        }
        true
    }

    pub fn is_background_learning(&self) -> bool {
        self.background
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    async fn run_background(self: Arc<Self>, token: CancellationToken) {
        let interval = Duration::from_secs(self.config.learning_cycle_interval_secs);
        info!(
            interval_seconds = self.config.learning_cycle_interval_secs,
            "Starting background learning task"
        );

        while !token.is_cancelled() {
            let pause = match AssertUnwindSafe(self.run_learning_cycle()).catch_unwind().await {
                Ok(result) => {
                    debug!(
                        patterns_detected = result.patterns_detected(),
                        error = ?result.error,
                        "Background learning cycle finished"
                    );
                    interval
                }
                Err(_) => {
                    error!(
                        backoff_seconds = LOOP_FAULT_BACKOFF.as_secs(),
                        "Background learning cycle panicked, backing off"
                    );
                    metrics::counter!("cortex_learning_loop_faults_total").increment(1);
                    LOOP_FAULT_BACKOFF
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = token.cancelled() => break,
            }
        }

        self.events.publish(CortexEvent::BackgroundLearningStopped {
            timestamp: Utc::now(),
        });
        info!("Background learning task stopped");
    }

    fn reinforce(&self, transition: &Transition, reward: f64) {
        let next_state = transition.next_state.clone().unwrap_or_else(|| json!(""));
        let q_value = self
            .reinforcement
            .update_q_value(&transition.state, &transition.action, reward, &next_state);
        debug!(reward, q_value, "Reinforced transition");
    }

    fn publish_report(&self, report: &PerformanceReport) {
        self.events.publish(CortexEvent::PerformanceReportGenerated {
            report_id: report.id,
            timeframe: report.timeframe,
            timestamp: report.generated_at,
        });
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the learning core
//! Published to the EventBus for observability and integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feedback::{FeedbackId, OutcomeKind};
use super::pattern::PatternDomain;
use super::performance::Timeframe;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CortexEvent {
    /// Explicit user feedback was normalised, recorded and dispatched
    FeedbackProcessed {
        feedback_id: FeedbackId,
        feedback_type: String,
        value: f64,
        timestamp: DateTime<Utc>,
    },

    /// A resolved trade was turned into a reward
    TradeOutcomeProcessed {
        symbol: String,
        trader_id: Option<String>,
        outcome: OutcomeKind,
        reward: f64,
        timestamp: DateTime<Utc>,
    },

    /// A mining pass produced patterns for one domain
    PatternsDetected {
        domain: PatternDomain,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    PerformanceReportGenerated {
        report_id: uuid::Uuid,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
    },

    LearningCycleCompleted {
        patterns_detected: usize,
        report_generated: bool,
        errors: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    BackgroundLearningStarted {
        interval_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    BackgroundLearningStopped {
        timestamp: DateTime<Utc>,
    },
}

impl CortexEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CortexEvent::FeedbackProcessed { timestamp, .. } => *timestamp,
            CortexEvent::TradeOutcomeProcessed { timestamp, .. } => *timestamp,
            CortexEvent::PatternsDetected { timestamp, .. } => *timestamp,
            CortexEvent::PerformanceReportGenerated { timestamp, .. } => *timestamp,
            CortexEvent::LearningCycleCompleted { timestamp, .. } => *timestamp,
            CortexEvent::BackgroundLearningStarted { timestamp, .. } => *timestamp,
            CortexEvent::BackgroundLearningStopped { timestamp } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CortexEvent::FeedbackProcessed { .. } => "feedback_processed",
            CortexEvent::TradeOutcomeProcessed { .. } => "trade_outcome_processed",
            CortexEvent::PatternsDetected { .. } => "patterns_detected",
            CortexEvent::PerformanceReportGenerated { .. } => "performance_report_generated",
            CortexEvent::LearningCycleCompleted { .. } => "learning_cycle_completed",
            CortexEvent::BackgroundLearningStarted { .. } => "background_learning_started",
            CortexEvent::BackgroundLearningStopped { .. } => "background_learning_stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CortexEvent::PatternsDetected {
            domain: PatternDomain::Signals,
            count: 3,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"patterns_detected\""));
        let deserialized: CortexEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event.event_type(), deserialized.event_type());
        assert_eq!(event.timestamp(), deserialized.timestamp());
    }

    #[test]
    fn test_outcome_event_type() {
        let event = CortexEvent::TradeOutcomeProcessed {
            symbol: "BTC".to_string(),
            trader_id: None,
            outcome: OutcomeKind::Failure,
            reward: -0.2,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "trade_outcome_processed");
    }
}

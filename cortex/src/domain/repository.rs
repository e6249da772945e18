// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Repository Interfaces
//!
//! Persistence contracts for the learning core. One repository per record
//! family, defined here and implemented in `crate::infrastructure`.
//!
//! | Trait | Records | Implementations |
//! |-------|---------|----------------|
//! | `KnowledgeRepository` | `TraderProfile`, `MarketKnowledge` | `InMemoryLearningStore`, `PostgresLearningStore` |
//! | `ActionPatternRepository` | `ActionPattern` | `InMemoryLearningStore`, `PostgresLearningStore` |
//! | `FeedbackRepository` | `FeedbackRecord` | `InMemoryLearningStore`, `PostgresLearningStore` |
//! | `TradeRecordRepository` | `TradeOutcome`, `SignalRecord` | `InMemoryLearningStore`, `PostgresLearningStore` |
//! | `MetricsRepository` | `PerformanceSnapshot`, `PerformanceReport` | `InMemoryLearningStore`, `PostgresLearningStore` |
//! | `DetectedPatternRepository` | `DetectedPattern` | `InMemoryLearningStore`, `PostgresLearningStore` |
//!
//! Feedback, outcomes, signals, snapshots, reports and detected patterns are
//! append-only. List queries return records oldest first unless stated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::action_pattern::ActionPattern;
use super::feedback::{FeedbackRecord, SignalRecord, TradeOutcome};
use super::knowledge::{MarketKnowledge, TraderProfile};
use super::pattern::DetectedPattern;
use super::performance::{PerformanceReport, PerformanceSnapshot, Timeframe};

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Filter for trade outcome queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeFilter {
    pub since: Option<DateTime<Utc>>,
    pub trader_id: Option<String>,
    pub symbol: Option<String>,
}

impl OutcomeFilter {
    pub fn since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            since,
            ..Self::default()
        }
    }

    pub fn matches(&self, outcome: &TradeOutcome) -> bool {
        self.since.is_none_or(|since| outcome.recorded_at >= since)
            && self
                .trader_id
                .as_ref()
                .is_none_or(|id| outcome.trader_id.as_ref() == Some(id))
            && self.symbol.as_ref().is_none_or(|s| &outcome.symbol == s)
    }
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn find_trader(&self, trader_id: &str) -> Result<Option<TraderProfile>, RepositoryError>;

    /// Create or replace
    async fn save_trader(&self, profile: &TraderProfile) -> Result<(), RepositoryError>;

    async fn find_market(&self, symbol: &str) -> Result<Option<MarketKnowledge>, RepositoryError>;

    /// Create or replace
    async fn save_market(&self, market: &MarketKnowledge) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ActionPatternRepository: Send + Sync {
    async fn find_action_pattern(
        &self,
        pattern_type: &str,
        pattern_key: &str,
    ) -> Result<Option<ActionPattern>, RepositoryError>;

    /// Create or replace, keyed by `(pattern_type, pattern_key)`
    async fn save_action_pattern(&self, pattern: &ActionPattern) -> Result<(), RepositoryError>;

    /// Patterns of one type, most effective first
    async fn list_action_patterns(
        &self,
        pattern_type: &str,
        limit: usize,
    ) -> Result<Vec<ActionPattern>, RepositoryError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<(), RepositoryError>;

    async fn list_feedback(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError>;
}

#[async_trait]
pub trait TradeRecordRepository: Send + Sync {
    async fn append_outcome(&self, outcome: &TradeOutcome) -> Result<(), RepositoryError>;

    async fn list_outcomes(&self, filter: &OutcomeFilter) -> Result<Vec<TradeOutcome>, RepositoryError>;

    /// Distinct trader ids with at least one outcome since `since`, sorted
    async fn active_traders(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, RepositoryError>;

    /// Distinct symbols with at least one outcome since `since`, sorted
    async fn active_symbols(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, RepositoryError>;

    async fn append_signal(&self, signal: &SignalRecord) -> Result<(), RepositoryError>;

    async fn list_signals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignalRecord>, RepositoryError>;
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn append_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<(), RepositoryError>;

    /// Most recent `limit` overall snapshots for a timeframe, oldest first
    async fn list_overall_snapshots(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<PerformanceSnapshot>, RepositoryError>;

    async fn append_report(&self, report: &PerformanceReport) -> Result<(), RepositoryError>;

    async fn latest_report(&self) -> Result<Option<PerformanceReport>, RepositoryError>;
}

#[async_trait]
pub trait DetectedPatternRepository: Send + Sync {
    async fn append_pattern(&self, pattern: &DetectedPattern) -> Result<(), RepositoryError>;

    /// Patterns carrying the given type tag, e.g. `reliable_trader`
    async fn list_patterns(&self, tag: &str) -> Result<Vec<DetectedPattern>, RepositoryError>;
}

/// Bundle of every repository the learning core writes to.
pub trait LearningStore:
    KnowledgeRepository
    + ActionPatternRepository
    + FeedbackRepository
    + TradeRecordRepository
    + MetricsRepository
    + DetectedPatternRepository
{
}

impl<T> LearningStore for T where
    T: KnowledgeRepository
        + ActionPatternRepository
        + FeedbackRepository
        + TradeRecordRepository
        + MetricsRepository
        + DetectedPatternRepository
{
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

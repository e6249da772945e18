// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Learning Store
//!
//! Production implementation of every learning repository backed by
//! PostgreSQL via `sqlx`. Each record is stored as a JSONB document next to
//! the handful of columns the list queries filter and sort on.
//!
//! `ensure_schema` creates the tables idempotently; there is no separate
//! migration step.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use crate::domain::{
    ActionPattern, ActionPatternRepository, DetectedPattern, DetectedPatternRepository,
    FeedbackRecord, FeedbackRepository, KnowledgeRepository, MarketKnowledge, MetricsRepository,
    MetricsScope, OutcomeFilter, PerformanceReport, PerformanceSnapshot, RepositoryError,
    SignalRecord, Timeframe, TradeOutcome, TradeRecordRepository, TraderProfile,
};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS trader_profiles (
        trader_id TEXT PRIMARY KEY,
        reliability DOUBLE PRECISION NOT NULL,
        document JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS market_knowledge (
        symbol TEXT PRIMARY KEY,
        reliability DOUBLE PRECISION NOT NULL,
        document JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS action_patterns (
        pattern_type TEXT NOT NULL,
        pattern_key TEXT NOT NULL,
        effectiveness DOUBLE PRECISION NOT NULL,
        document JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (pattern_type, pattern_key)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS feedback_records (
        id UUID PRIMARY KEY,
        feedback_type TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trade_outcomes (
        id UUID PRIMARY KEY,
        trader_id TEXT,
        symbol TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trade_signals (
        id UUID PRIMARY KEY,
        symbol TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS performance_snapshots (
        id UUID PRIMARY KEY,
        scope TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        calculated_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS performance_reports (
        id UUID PRIMARY KEY,
        generated_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS detected_patterns (
        id UUID PRIMARY KEY,
        pattern_type TEXT NOT NULL,
        detected_at TIMESTAMPTZ NOT NULL,
        document JSONB NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_trade_outcomes_recorded_at ON trade_outcomes (recorded_at)",
    "CREATE INDEX IF NOT EXISTS idx_detected_patterns_type ON detected_patterns (pattern_type)",
];

pub struct PostgresLearningStore {
    pool: PgPool,
}

impl PostgresLearningStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(connection_string: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to connect: {}", e)))?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA.iter().copied() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::Database(format!("Failed to create schema: {}", e)))?;
        }
        info!(tables = SCHEMA.len(), "Learning store schema ready");
        Ok(())
    }
}

fn to_document<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RepositoryError> {
    serde_json::to_value(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn from_row<T: DeserializeOwned>(row: &PgRow) -> Result<T, RepositoryError> {
    let document: serde_json::Value = row
        .try_get("document")
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
    serde_json::from_value(document)
        .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize document: {}", e)))
}

fn from_rows<T: DeserializeOwned>(rows: &[PgRow]) -> Result<Vec<T>, RepositoryError> {
    rows.iter().map(from_row).collect()
}

fn scope_label(scope: &MetricsScope) -> String {
    match scope {
        MetricsScope::Overall => "overall".to_string(),
        MetricsScope::Trader(id) => format!("trader:{}", id),
        MetricsScope::Symbol(symbol) => format!("symbol:{}", symbol),
    }
}

#[async_trait]
impl KnowledgeRepository for PostgresLearningStore {
    async fn find_trader(&self, trader_id: &str) -> Result<Option<TraderProfile>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM trader_profiles WHERE trader_id = $1")
            .bind(trader_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        row.as_ref().map(from_row).transpose()
    }

    async fn save_trader(&self, profile: &TraderProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO trader_profiles (trader_id, reliability, document, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (trader_id) DO UPDATE SET
                reliability = EXCLUDED.reliability,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&profile.trader_id)
        .bind(profile.reliability)
        .bind(to_document(profile)?)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save trader profile: {}", e)))?;
        Ok(())
    }

    async fn find_market(&self, symbol: &str) -> Result<Option<MarketKnowledge>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM market_knowledge WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        row.as_ref().map(from_row).transpose()
    }

    async fn save_market(&self, market: &MarketKnowledge) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO market_knowledge (symbol, reliability, document, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (symbol) DO UPDATE SET
                reliability = EXCLUDED.reliability,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&market.symbol)
        .bind(market.reliability)
        .bind(to_document(market)?)
        .bind(market.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save market knowledge: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ActionPatternRepository for PostgresLearningStore {
    async fn find_action_pattern(
        &self,
        pattern_type: &str,
        pattern_key: &str,
    ) -> Result<Option<ActionPattern>, RepositoryError> {
        let row = sqlx::query(
            "SELECT document FROM action_patterns WHERE pattern_type = $1 AND pattern_key = $2",
        )
        .bind(pattern_type)
        .bind(pattern_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        row.as_ref().map(from_row).transpose()
    }

    async fn save_action_pattern(&self, pattern: &ActionPattern) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO action_patterns (pattern_type, pattern_key, effectiveness, document, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pattern_type, pattern_key) DO UPDATE SET
                effectiveness = EXCLUDED.effectiveness,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&pattern.pattern_type)
        .bind(&pattern.pattern_key)
        .bind(pattern.effectiveness)
        .bind(to_document(pattern)?)
        .bind(pattern.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save action pattern: {}", e)))?;
        Ok(())
    }

    async fn list_action_patterns(
        &self,
        pattern_type: &str,
        limit: usize,
    ) -> Result<Vec<ActionPattern>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM action_patterns
            WHERE pattern_type = $1
            ORDER BY effectiveness DESC
            LIMIT $2
            "#,
        )
        .bind(pattern_type)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        from_rows(&rows)
    }
}

#[async_trait]
impl FeedbackRepository for PostgresLearningStore {
    async fn append_feedback(&self, record: &FeedbackRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO feedback_records (id, feedback_type, recorded_at, document) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.id.0)
        .bind(record.kind.as_str())
        .bind(record.timestamp)
        .bind(to_document(record)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append feedback: {}", e)))?;
        Ok(())
    }

    async fn list_feedback(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM feedback_records
            WHERE ($1::timestamptz IS NULL OR recorded_at >= $1)
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        from_rows(&rows)
    }
}

#[async_trait]
impl TradeRecordRepository for PostgresLearningStore {
    async fn append_outcome(&self, outcome: &TradeOutcome) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO trade_outcomes (id, trader_id, symbol, recorded_at, document)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(outcome.id)
        .bind(outcome.trader_id.as_deref())
        .bind(&outcome.symbol)
        .bind(outcome.recorded_at)
        .bind(to_document(outcome)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append trade outcome: {}", e)))?;
        Ok(())
    }

    async fn list_outcomes(&self, filter: &OutcomeFilter) -> Result<Vec<TradeOutcome>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM trade_outcomes
            WHERE ($1::timestamptz IS NULL OR recorded_at >= $1)
              AND ($2::text IS NULL OR trader_id = $2)
              AND ($3::text IS NULL OR symbol = $3)
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(filter.since)
        .bind(filter.trader_id.as_deref())
        .bind(filter.symbol.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        from_rows(&rows)
    }

    async fn active_traders(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT trader_id FROM trade_outcomes
            WHERE trader_id IS NOT NULL
              AND ($1::timestamptz IS NULL OR recorded_at >= $1)
            ORDER BY trader_id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("trader_id").map_err(RepositoryError::from))
            .collect()
    }

    async fn active_symbols(&self, since: Option<DateTime<Utc>>) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT symbol FROM trade_outcomes
            WHERE ($1::timestamptz IS NULL OR recorded_at >= $1)
            ORDER BY symbol
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("symbol").map_err(RepositoryError::from))
            .collect()
    }

    async fn append_signal(&self, signal: &SignalRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO trade_signals (id, symbol, recorded_at, document) VALUES ($1, $2, $3, $4)",
        )
        .bind(signal.id)
        .bind(&signal.symbol)
        .bind(signal.timestamp)
        .bind(to_document(signal)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append signal: {}", e)))?;
        Ok(())
    }

    async fn list_signals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SignalRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM trade_signals
            WHERE ($1::timestamptz IS NULL OR recorded_at >= $1)
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        from_rows(&rows)
    }
}

#[async_trait]
impl MetricsRepository for PostgresLearningStore {
    async fn append_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO performance_snapshots (id, scope, timeframe, calculated_at, document)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(snapshot.id)
        .bind(scope_label(&snapshot.scope))
        .bind(snapshot.timeframe.as_str())
        .bind(snapshot.calculated_at)
        .bind(to_document(snapshot)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append snapshot: {}", e)))?;
        Ok(())
    }

    async fn list_overall_snapshots(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<PerformanceSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM (
                SELECT document, calculated_at FROM performance_snapshots
                WHERE scope = 'overall' AND timeframe = $1
                ORDER BY calculated_at DESC
                LIMIT $2
            ) recent
            ORDER BY calculated_at ASC
            "#,
        )
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        from_rows(&rows)
    }

    async fn append_report(&self, report: &PerformanceReport) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO performance_reports (id, generated_at, document) VALUES ($1, $2, $3)",
        )
        .bind(report.id)
        .bind(report.generated_at)
        .bind(to_document(report)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append report: {}", e)))?;
        Ok(())
    }

    async fn latest_report(&self) -> Result<Option<PerformanceReport>, RepositoryError> {
        let row = sqlx::query(
            "SELECT document FROM performance_reports ORDER BY generated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        row.as_ref().map(from_row).transpose()
    }
}

#[async_trait]
impl DetectedPatternRepository for PostgresLearningStore {
    async fn append_pattern(&self, pattern: &DetectedPattern) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO detected_patterns (id, pattern_type, detected_at, document)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(pattern.id.0)
        .bind(pattern.tag())
        .bind(pattern.detected_at)
        .bind(to_document(pattern)?)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append detected pattern: {}", e)))?;
        Ok(())
    }

    async fn list_patterns(&self, tag: &str) -> Result<Vec<DetectedPattern>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM detected_patterns
            WHERE pattern_type = $1
            ORDER BY detected_at ASC
            "#,
        )
        .bind(tag)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        from_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_labels() {
        assert_eq!(scope_label(&MetricsScope::Overall), "overall");
        assert_eq!(scope_label(&MetricsScope::Trader("alice".into())), "trader:alice");
        assert_eq!(scope_label(&MetricsScope::Symbol("BTC".into())), "symbol:BTC");
    }

    #[test]
    fn test_schema_statements_are_idempotent() {
        assert!(SCHEMA.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Performance engine
//!
//! Rolling trade metrics overall and per trader/symbol, trend and volatility
//! over the snapshot history, and periodic performance reports.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Measure how well the agent's signals have been doing

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PerformanceConfig;
use crate::domain::{
    MetricsRepository, MetricsResult, MetricsScope, OutcomeFilter, PerformanceReport,
    PerformanceSnapshot, Timeframe, TradeRecordRepository, TrendMetrics,
};

pub struct PerformanceEngine {
    config: PerformanceConfig,
    trades: Arc<dyn TradeRecordRepository>,
    store: Arc<dyn MetricsRepository>,
    history: Mutex<VecDeque<PerformanceSnapshot>>,
    last_report_at: Mutex<Option<DateTime<Utc>>>,
}

impl PerformanceEngine {
    pub fn new(
        config: PerformanceConfig,
        trades: Arc<dyn TradeRecordRepository>,
        store: Arc<dyn MetricsRepository>,
    ) -> Self {
        Self {
            config,
            trades,
            store,
            history: Mutex::new(VecDeque::new()),
            last_report_at: Mutex::new(None),
        }
    }

    pub async fn calculate_metrics(&self, timeframe: Timeframe) -> MetricsResult {
        let filter = OutcomeFilter::since(timeframe.cutoff(Utc::now()));
        self.calculate(MetricsScope::Overall, timeframe, filter).await
    }

    pub async fn calculate_trader_metrics(&self, trader_id: &str, timeframe: Timeframe) -> MetricsResult {
        let filter = OutcomeFilter {
            trader_id: Some(trader_id.to_string()),
            ..OutcomeFilter::since(timeframe.cutoff(Utc::now()))
        };
        self.calculate(MetricsScope::Trader(trader_id.to_string()), timeframe, filter)
            .await
    }

    pub async fn calculate_symbol_metrics(&self, symbol: &str, timeframe: Timeframe) -> MetricsResult {
        let filter = OutcomeFilter {
            symbol: Some(symbol.to_string()),
            ..OutcomeFilter::since(timeframe.cutoff(Utc::now()))
        };
        self.calculate(MetricsScope::Symbol(symbol.to_string()), timeframe, filter)
            .await
    }

    async fn calculate(&self, scope: MetricsScope, timeframe: Timeframe, filter: OutcomeFilter) -> MetricsResult {
        let outcomes = match self.trades.list_outcomes(&filter).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(scope = ?scope, error = %e, "Failed to load trade outcomes");
                Vec::new()
            }
        };

        if outcomes.len() < self.config.min_sample_size {
            debug!(
                scope = ?scope,
                total_trades = outcomes.len(),
                min_sample_size = self.config.min_sample_size,
                "Not enough trades for metrics"
            );
            return MetricsResult::InsufficientData {
                scope,
                total_trades: outcomes.len(),
                min_sample_size: self.config.min_sample_size,
            };
        }

        let snapshot = PerformanceSnapshot::from_outcomes(
            scope,
            timeframe,
            &outcomes,
            self.config.metrics_window_size,
        );

        {
            let mut history = self.history.lock();
            history.push_back(snapshot.clone());
            while history.len() > self.config.metrics_window_size {
                history.pop_front();
            }
        }
        if snapshot.scope == MetricsScope::Overall {
            metrics::gauge!("cortex_success_rate", "timeframe" => timeframe.as_str())
                .set(snapshot.success_rate);
        }
        if let Err(e) = self.store.append_snapshot(&snapshot).await {
            warn!(error = %e, "Failed to persist performance snapshot");
        }
        MetricsResult::Computed(snapshot)
    }

    /// Trend and volatility over the overall snapshots for `timeframe`.
    /// Reads the store first and falls back to this engine's own history.
    pub async fn calculate_trend_metrics(&self, timeframe: Timeframe) -> TrendMetrics {
        let window = self.config.metrics_window_size;
        let snapshots = match self.store.list_overall_snapshots(timeframe, window).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(error = %e, "Failed to load snapshot history, using in-memory history");
                let history = self.history.lock();
                let mut local: Vec<PerformanceSnapshot> = history
                    .iter()
                    .filter(|s| s.scope == MetricsScope::Overall && s.timeframe == timeframe)
                    .cloned()
                    .collect();
                let excess = local.len().saturating_sub(window);
                local.drain(..excess);
                local
            }
        };
        TrendMetrics::from_history(&snapshots)
    }

    /// True if no report exists yet or the last one is at least
    /// `report_frequency` hours old.
    pub async fn should_generate_report(&self) -> bool {
        let cached = *self.last_report_at.lock();
        let last = match cached {
            Some(at) => Some(at),
            None => match self.store.latest_report().await {
                Ok(report) => report.map(|r| r.generated_at),
                Err(e) => {
                    warn!(error = %e, "Failed to load latest report");
                    None
                }
            },
        };
        match last {
            None => true,
            Some(at) => {
                let elapsed_hours = (Utc::now() - at).num_seconds() as f64 / 3600.0;
                elapsed_hours >= self.config.report_frequency as f64
            }
        }
    }

    /// Build a report covering overall metrics, every trader and symbol
    /// active in the timeframe, and trends.
    pub async fn generate_performance_report(&self, timeframe: Timeframe) -> PerformanceReport {
        let since = timeframe.cutoff(Utc::now());
        let overall = self.calculate_metrics(timeframe).await;

        let traders = self.trades.active_traders(since).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list active traders");
            Vec::new()
        });
        let mut by_trader = BTreeMap::new();
        for trader_id in traders {
            let metrics = self.calculate_trader_metrics(&trader_id, timeframe).await;
            by_trader.insert(trader_id, metrics);
        }

        let symbols = self.trades.active_symbols(since).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list active symbols");
            Vec::new()
        });
        let mut by_symbol = BTreeMap::new();
        for symbol in symbols {
            let metrics = self.calculate_symbol_metrics(&symbol, timeframe).await;
            by_symbol.insert(symbol, metrics);
        }

        let report = PerformanceReport {
            id: Uuid::new_v4(),
            timeframe,
            overall,
            by_trader,
            by_symbol,
            trends: self.calculate_trend_metrics(timeframe).await,
            generated_at: Utc::now(),
        };

        if let Err(e) = self.store.append_report(&report).await {
            warn!(report_id = %report.id, error = %e, "Failed to persist performance report");
        }
        *self.last_report_at.lock() = Some(report.generated_at);
        info!(
            report_id = %report.id,
            timeframe = %timeframe,
            traders = report.by_trader.len(),
            symbols = report.by_symbol.len(),
            "Generated performance report"
        );
        report
    }

    /// `generate_performance_report` gated by `should_generate_report`.
    pub async fn generate_report_if_due(&self, timeframe: Timeframe) -> Option<PerformanceReport> {
        if !self.should_generate_report().await {
            debug!("Performance report not due yet");
            return None;
        }
        Some(self.generate_performance_report(timeframe).await)
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutcomeKind, RepositoryError, TradeOutcome};
    use crate::infrastructure::InMemoryLearningStore;
    use async_trait::async_trait;

    fn outcome(trader: &str, symbol: &str, kind: OutcomeKind, profit_loss: f64) -> TradeOutcome {
        TradeOutcome {
            id: Uuid::new_v4(),
            trade_id: None,
            trader_id: Some(trader.to_string()),
            symbol: symbol.to_string(),
            action: Some("buy".to_string()),
            outcome: kind,
            profit_loss,
            reward: 0.0,
            recorded_at: Utc::now(),
        }
    }

    async fn seeded_store() -> InMemoryLearningStore {
        let store = InMemoryLearningStore::new();
        let rows = [
            ("alice", "BTC", OutcomeKind::Success, 50.0),
            ("alice", "BTC", OutcomeKind::Success, 30.0),
            ("bob", "ETH", OutcomeKind::Failure, -20.0),
            ("alice", "ETH", OutcomeKind::Success, 40.0),
            ("bob", "BTC", OutcomeKind::Failure, -10.0),
            ("bob", "BTC", OutcomeKind::Unknown, 0.0),
        ];
        for (trader, symbol, kind, pl) in rows {
            store.append_outcome(&outcome(trader, symbol, kind, pl)).await.unwrap();
        }
        store
    }

    fn engine(store: &InMemoryLearningStore, min_sample_size: usize) -> PerformanceEngine {
        let config = PerformanceConfig {
            min_sample_size,
            ..PerformanceConfig::default()
        };
        PerformanceEngine::new(config, Arc::new(store.clone()), Arc::new(store.clone()))
    }

    struct NoSnapshots(InMemoryLearningStore);

    #[async_trait]
    impl MetricsRepository for NoSnapshots {
        async fn append_snapshot(&self, _: &PerformanceSnapshot) -> Result<(), RepositoryError> {
            Err(RepositoryError::Database("read only".to_string()))
        }

        async fn list_overall_snapshots(&self, _: Timeframe, _: usize) -> Result<Vec<PerformanceSnapshot>, RepositoryError> {
            Err(RepositoryError::Database("read only".to_string()))
        }

        async fn append_report(&self, report: &PerformanceReport) -> Result<(), RepositoryError> {
            self.0.append_report(report).await
        }

        async fn latest_report(&self) -> Result<Option<PerformanceReport>, RepositoryError> {
            self.0.latest_report().await
        }
    }

    #[tokio::test]
    async fn test_overall_metrics() {
        let store = seeded_store().await;
        let engine = engine(&store, 5);
        let result = engine.calculate_metrics(Timeframe::All).await;
        let snapshot = result.snapshot().unwrap();
        assert_eq!(snapshot.total_trades, 6);
        assert_eq!(snapshot.successful_trades, 3);
        assert_eq!(snapshot.failed_trades, 2);
        assert_eq!(snapshot.neutral_trades, 1);
        assert_eq!(snapshot.success_rate, 0.5);
        assert_eq!(snapshot.total_profit, 120.0);
        assert_eq!(snapshot.total_loss, -30.0);
        assert_eq!(snapshot.net_profit, 90.0);
        assert_eq!(engine.history_len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_sample_is_a_sentinel() {
        let store = seeded_store().await;
        let engine = engine(&store, 5);
        let result = engine.calculate_trader_metrics("alice", Timeframe::Week).await;
        assert_eq!(
            result,
            MetricsResult::InsufficientData {
                scope: MetricsScope::Trader("alice".to_string()),
                total_trades: 3,
                min_sample_size: 5,
            }
        );
        assert_eq!(engine.history_len(), 0);
    }

    #[tokio::test]
    async fn test_symbol_metrics() {
        let store = seeded_store().await;
        let engine = engine(&store, 1);
        let result = engine.calculate_symbol_metrics("ETH", Timeframe::Day).await;
        let snapshot = result.snapshot().unwrap();
        assert_eq!(snapshot.total_trades, 2);
        assert_eq!(snapshot.profit_factor, 2.0);
    }

    #[tokio::test]
    async fn test_trend_needs_history_then_reports() {
        let store = seeded_store().await;
        let engine = engine(&store, 5);
        assert!(matches!(
            engine.calculate_trend_metrics(Timeframe::All).await,
            TrendMetrics::InsufficientData { data_points: 0, min_data_points: 2 }
        ));

        engine.calculate_metrics(Timeframe::All).await;
        store.append_outcome(&outcome("carol", "SOL", OutcomeKind::Success, 60.0)).await.unwrap();
        engine.calculate_metrics(Timeframe::All).await;

        match engine.calculate_trend_metrics(Timeframe::All).await {
            TrendMetrics::Computed { success_rate_trend, data_points, .. } => {
                assert_eq!(data_points, 2);
                assert!(success_rate_trend > 0.0);
            }
            other => panic!("expected computed trends, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_trend_falls_back_to_local_history() {
        let store = seeded_store().await;
        let engine = PerformanceEngine::new(
            PerformanceConfig::default(),
            Arc::new(store.clone()),
            Arc::new(NoSnapshots(store.clone())),
        );
        engine.calculate_metrics(Timeframe::All).await;
        engine.calculate_metrics(Timeframe::All).await;
        assert!(matches!(
            engine.calculate_trend_metrics(Timeframe::All).await,
            TrendMetrics::Computed { data_points: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_report_gating() {
        let store = seeded_store().await;
        let engine = engine(&store, 2);
        assert!(engine.should_generate_report().await);

        let report = engine.generate_report_if_due(Timeframe::All).await.unwrap();
        assert!(!report.overall.is_insufficient());
        assert_eq!(report.by_trader.len(), 2);
        assert_eq!(report.by_symbol.len(), 2);
        assert!(report.by_trader["alice"].snapshot().is_some());
        assert_eq!(store.report_count(), 1);

        assert!(!engine.should_generate_report().await);
        assert!(engine.generate_report_if_due(Timeframe::All).await.is_none());

        let fresh = engine_with_store_only(&store);
        assert!(!fresh.should_generate_report().await);
    }

    fn engine_with_store_only(store: &InMemoryLearningStore) -> PerformanceEngine {
        PerformanceEngine::new(
            PerformanceConfig::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_window() {
        let store = seeded_store().await;
        let config = PerformanceConfig {
            metrics_window_size: 3,
            min_sample_size: 1,
            ..PerformanceConfig::default()
        };
        let engine = PerformanceEngine::new(config, Arc::new(store.clone()), Arc::new(store.clone()));
        for _ in 0..5 {
            engine.calculate_metrics(Timeframe::All).await;
        }
        assert_eq!(engine.history_len(), 3);
    }
}

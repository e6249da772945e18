// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Performance Metrics
//!
//! Snapshot, report and trend types produced by the performance engine, plus
//! the pure statistics behind them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Trade statistics with explicit insufficient-data sentinels

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::CortexError;
use super::feedback::{OutcomeKind, TradeOutcome};

/// Minimum number of historical snapshots needed to compute a trend.
pub const MIN_TREND_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    #[default]
    All,
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::All => "all",
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
        }
    }

    /// Earliest timestamp included in this timeframe, or `None` for all time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::All => None,
            Timeframe::Day => Some(now - Duration::days(1)),
            Timeframe::Week => Some(now - Duration::weeks(1)),
            Timeframe::Month => Some(now - Duration::days(30)),
        }
    }
}

impl FromStr for Timeframe {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Timeframe::All),
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            other => Err(CortexError::UnsupportedTimeframe(other.to_string())),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "subject", rename_all = "snake_case")]
pub enum MetricsScope {
    Overall,
    Trader(String),
    Symbol(String),
}

/// Metrics over one set of trade outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub id: Uuid,
    pub scope: MetricsScope,
    pub timeframe: Timeframe,
    pub total_trades: usize,
    pub successful_trades: usize,
    pub failed_trades: usize,
    pub neutral_trades: usize,
    pub success_rate: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub net_profit: f64,
    pub avg_profit_per_trade: f64,
    pub avg_loss_per_trade: f64,
    /// `f64::INFINITY` when there were no losses; serialized as `null`.
    #[serde(with = "finite_or_null")]
    pub profit_factor: f64,
    pub confidence: f64,
    pub calculated_at: DateTime<Utc>,
}

impl PerformanceSnapshot {
    pub fn from_outcomes(
        scope: MetricsScope,
        timeframe: Timeframe,
        outcomes: &[TradeOutcome],
        window_size: usize,
    ) -> Self {
        let total = outcomes.len();
        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut total_profit = 0.0;
        let mut total_loss = 0.0;

        for outcome in outcomes {
            match outcome.outcome {
                OutcomeKind::Success => successful += 1,
                OutcomeKind::Failure => failed += 1,
                OutcomeKind::Unknown => {}
            }
            if outcome.profit_loss > 0.0 {
                total_profit += outcome.profit_loss;
            } else if outcome.profit_loss < 0.0 {
                total_loss += outcome.profit_loss;
            }
        }

        let ratio = |num: f64, den: usize| if den > 0 { num / den as f64 } else { 0.0 };
        let profit_factor = if total_loss != 0.0 {
            (total_profit / total_loss).abs()
        } else {
            f64::INFINITY
        };

        Self {
            id: Uuid::new_v4(),
            scope,
            timeframe,
            total_trades: total,
            successful_trades: successful,
            failed_trades: failed,
            neutral_trades: total - successful - failed,
            success_rate: ratio(successful as f64, total),
            total_profit,
            total_loss,
            net_profit: total_profit + total_loss,
            avg_profit_per_trade: ratio(total_profit, successful),
            avg_loss_per_trade: ratio(total_loss, failed),
            profit_factor,
            confidence: if window_size == 0 {
                1.0
            } else {
                (total as f64 / window_size as f64).min(1.0)
            },
            calculated_at: Utc::now(),
        }
    }
}

/// Either computed metrics or the reason they were withheld.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricsResult {
    InsufficientData {
        scope: MetricsScope,
        total_trades: usize,
        min_sample_size: usize,
    },
    Computed(PerformanceSnapshot),
}

impl MetricsResult {
    pub fn snapshot(&self) -> Option<&PerformanceSnapshot> {
        match self {
            MetricsResult::Computed(snapshot) => Some(snapshot),
            MetricsResult::InsufficientData { .. } => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, MetricsResult::InsufficientData { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendMetrics {
    InsufficientData {
        data_points: usize,
        min_data_points: usize,
    },
    Computed {
        success_rate_trend: f64,
        net_profit_trend: f64,
        profit_factor_trend: f64,
        success_rate_volatility: f64,
        net_profit_volatility: f64,
        profit_factor_volatility: f64,
        data_points: usize,
    },
}

impl TrendMetrics {
    /// Trend and volatility over snapshots ordered oldest first.
    pub fn from_history(history: &[PerformanceSnapshot]) -> Self {
        if history.len() < MIN_TREND_POINTS {
            return TrendMetrics::InsufficientData {
                data_points: history.len(),
                min_data_points: MIN_TREND_POINTS,
            };
        }

        let success_rates: Vec<f64> = history.iter().map(|s| s.success_rate).collect();
        let net_profits: Vec<f64> = history.iter().map(|s| s.net_profit).collect();
        // Loss-free snapshots carry an infinite factor that would poison the regression
        let profit_factors: Vec<f64> = history
            .iter()
            .map(|s| s.profit_factor)
            .filter(|v| v.is_finite())
            .collect();

        TrendMetrics::Computed {
            success_rate_trend: trend(&success_rates),
            net_profit_trend: trend(&net_profits),
            profit_factor_trend: trend(&profit_factors),
            success_rate_volatility: volatility(&success_rates),
            net_profit_volatility: volatility(&net_profits),
            profit_factor_volatility: volatility(&profit_factors),
            data_points: history.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub id: Uuid,
    pub timeframe: Timeframe,
    pub overall: MetricsResult,
    pub by_trader: BTreeMap<String, MetricsResult>,
    pub by_symbol: BTreeMap<String, MetricsResult>,
    pub trends: TrendMetrics,
    pub generated_at: DateTime<Utc>,
}

/// Least-squares slope over `values`, normalised by the slope implied by the
/// first and last points and clamped to `[-1, 1]`.
pub fn trend(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        return 0.0;
    }
    let slope = numerator / denominator;

    let endpoint_slope = ((values[n - 1] - values[0]) / (n_f - 1.0)).abs();
    if endpoint_slope == 0.0 {
        return 0.0;
    }
    (slope / endpoint_slope).clamp(-1.0, 1.0)
}

/// Population standard deviation divided by range, clamped to `[0, 1]`.
pub fn volatility(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let range = max - min;
    if range == 0.0 {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (variance.sqrt() / range).clamp(0.0, 1.0)
}

mod finite_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::canonical::content_hash;

/// Success statistics for one concrete action payload.
///
/// `pattern_key` is the content hash of `pattern`, so the same payload with
/// its fields in a different order lands on the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPattern {
    pub pattern_type: String,
    pub pattern_key: String,
    pub pattern: Value,
    pub success_count: u64,
    pub failure_count: u64,
    pub effectiveness: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionPattern {
    /// Create a record from a single observation. The counts start at 1/0 or
    /// 0/1, so effectiveness starts at exactly 1.0 or 0.0.
    pub fn first_observation(pattern_type: impl Into<String>, pattern: Value, success: bool) -> Self {
        let now = Utc::now();
        let mut record = Self {
            pattern_type: pattern_type.into(),
            pattern_key: content_hash(&pattern),
            pattern,
            success_count: 0,
            failure_count: 0,
            effectiveness: 0.0,
            created_at: now,
            updated_at: now,
        };
        record.record(success);
        record
    }

    pub fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.recompute();
        self.updated_at = Utc::now();
    }

    fn recompute(&mut self) {
        let total = self.success_count + self.failure_count;
        self.effectiveness = if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        };
    }

    pub fn total_observations(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Cache key combining type and content hash.
    pub fn cache_key(pattern_type: &str, pattern_key: &str) -> String {
        format!("{}:{}", pattern_type, pattern_key)
    }
}

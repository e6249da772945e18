// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Cortex Configuration
//
// YAML configuration for the memory tiers and learning engines:
// - memory fan-out and working-memory capacity
// - reinforcement, feedback, performance and pattern engine tuning
// - learning cycle scheduling
// - storage backend and telemetry settings
//
// Loaded from an explicit path or discovered, then overridden from
// CORTEX_* environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{CortexError, PostgresConfig, StorageBackend};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    pub memory: MemoryConfig,
    pub learning: LearningConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Working-memory ring buffer capacity
    pub max_history: usize,
    /// Similar experiences returned with each context
    pub max_episodic_memories: usize,
    /// Action patterns returned with each context
    pub max_procedural_patterns: usize,
    pub embedding_dimension: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            max_episodic_memories: 5,
            max_procedural_patterns: 3,
            embedding_dimension: 384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub reinforcement: ReinforcementConfig,
    pub feedback: FeedbackConfig,
    pub performance: PerformanceConfig,
    pub pattern: PatternConfig,
    pub learning_cycle_interval_secs: u64,
    pub background_learning: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            reinforcement: ReinforcementConfig::default(),
            feedback: FeedbackConfig::default(),
            performance: PerformanceConfig::default(),
            pattern: PatternConfig::default(),
            learning_cycle_interval_secs: 3600,
            background_learning: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReinforcementConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub exploration_rate: f64,
    pub min_exploration_rate: f64,
    pub exploration_decay: f64,
    pub reward_scale: f64,
    /// States kept in the Q-table before the least recently used is evicted
    pub max_states: usize,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.9,
            exploration_rate: 0.2,
            min_exploration_rate: 0.01,
            exploration_decay: 0.995,
            reward_scale: 1.0,
            max_states: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub positive_threshold: f64,
    pub negative_threshold: f64,
    pub feedback_weight: f64,
    pub outcome_weight: f64,
    pub feedback_decay: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            positive_threshold: 0.7,
            negative_threshold: 0.3,
            feedback_weight: 0.8,
            outcome_weight: 0.6,
            feedback_decay: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub metrics_window_size: usize,
    pub min_sample_size: usize,
    pub confidence_threshold: f64,
    /// Hours between performance reports
    pub report_frequency: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            metrics_window_size: 100,
            min_sample_size: 5,
            confidence_threshold: 0.6,
            report_frequency: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub min_pattern_occurrences: usize,
    pub min_pattern_confidence: f64,
    pub max_patterns_per_type: usize,
    pub pattern_similarity_threshold: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_pattern_occurrences: 5,
            min_pattern_confidence: 0.7,
            max_patterns_per_type: 10,
            pattern_similarity_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `in_memory` or `postgres`
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "in_memory".to_string(),
            database_url: None,
        }
    }
}

impl StorageConfig {
    pub fn storage_backend(&self) -> Result<StorageBackend, CortexError> {
        match self.backend.trim().to_lowercase().as_str() {
            "" | "in_memory" | "memory" => Ok(StorageBackend::InMemory),
            "postgres" | "postgresql" => match &self.database_url {
                Some(url) => Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url.clone(),
                })),
                None => Err(CortexError::UnsupportedBackend(
                    "postgres (missing database_url)".to_string(),
                )),
            },
            other => Err(CortexError::UnsupportedBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl CortexConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover a configuration file using precedence order
    /// 1. CORTEX_CONFIG_PATH environment variable
    /// 2. ./cortex-config.yaml (working directory)
    /// 3. ~/.cortex/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CORTEX_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./cortex-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cortex").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, falling back to defaults
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::info!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply CORTEX_* environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        let rl = &mut self.learning.reinforcement;
        env_override("CORTEX_LEARNING_RATE", &mut rl.learning_rate);
        env_override("CORTEX_DISCOUNT_FACTOR", &mut rl.discount_factor);
        env_override("CORTEX_EXPLORATION_RATE", &mut rl.exploration_rate);
        env_override("CORTEX_FEEDBACK_DECAY", &mut self.learning.feedback.feedback_decay);
        env_override(
            "CORTEX_METRICS_WINDOW_SIZE",
            &mut self.learning.performance.metrics_window_size,
        );
        env_override("CORTEX_MIN_SAMPLE_SIZE", &mut self.learning.performance.min_sample_size);
        env_override(
            "CORTEX_MIN_PATTERN_OCCURRENCES",
            &mut self.learning.pattern.min_pattern_occurrences,
        );
        env_override(
            "CORTEX_MIN_PATTERN_CONFIDENCE",
            &mut self.learning.pattern.min_pattern_confidence,
        );
        env_override(
            "CORTEX_LEARNING_CYCLE_INTERVAL",
            &mut self.learning.learning_cycle_interval_secs,
        );
        env_override("CORTEX_MAX_HISTORY", &mut self.memory.max_history);
        env_override("CORTEX_MAX_EPISODIC_MEMORIES", &mut self.memory.max_episodic_memories);
        env_override(
            "CORTEX_MAX_PROCEDURAL_PATTERNS",
            &mut self.memory.max_procedural_patterns,
        );

        if let Ok(val) = std::env::var("CORTEX_BACKGROUND_LEARNING") {
            match parse_flag(&val) {
                Some(enabled) => {
                    tracing::info!("Environment override: CORTEX_BACKGROUND_LEARNING={}", enabled);
                    self.learning.background_learning = enabled;
                }
                None => tracing::warn!(
                    "Invalid value for CORTEX_BACKGROUND_LEARNING: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(url) = std::env::var("CORTEX_DATABASE_URL") {
            tracing::info!("Environment override: CORTEX_DATABASE_URL set, using postgres backend");
            self.storage.backend = "postgres".to_string();
            self.storage.database_url = Some(url);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let rl = &self.learning.reinforcement;
        for (name, value) in [
            ("learning.reinforcement.learning_rate", rl.learning_rate),
            ("learning.reinforcement.discount_factor", rl.discount_factor),
            ("learning.reinforcement.exploration_rate", rl.exploration_rate),
            ("learning.reinforcement.min_exploration_rate", rl.min_exploration_rate),
            ("learning.reinforcement.exploration_decay", rl.exploration_decay),
            ("learning.feedback.feedback_decay", self.learning.feedback.feedback_decay),
            ("learning.feedback.feedback_weight", self.learning.feedback.feedback_weight),
            ("learning.feedback.outcome_weight", self.learning.feedback.outcome_weight),
            (
                "learning.performance.confidence_threshold",
                self.learning.performance.confidence_threshold,
            ),
            (
                "learning.pattern.min_pattern_confidence",
                self.learning.pattern.min_pattern_confidence,
            ),
            (
                "learning.pattern.pattern_similarity_threshold",
                self.learning.pattern.pattern_similarity_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }

        if rl.min_exploration_rate > rl.exploration_rate {
            anyhow::bail!(
                "learning.reinforcement.min_exploration_rate ({}) exceeds exploration_rate ({})",
                rl.min_exploration_rate,
                rl.exploration_rate
            );
        }

        let fb = &self.learning.feedback;
        if !(-1.0..=1.0).contains(&fb.positive_threshold) || !(-1.0..=1.0).contains(&fb.negative_threshold) {
            anyhow::bail!("learning.feedback thresholds must be within [-1, 1]");
        }

        for (name, value) in [
            ("memory.max_history", self.memory.max_history),
            ("memory.embedding_dimension", self.memory.embedding_dimension),
            (
                "learning.performance.metrics_window_size",
                self.learning.performance.metrics_window_size,
            ),
            ("learning.performance.min_sample_size", self.learning.performance.min_sample_size),
            (
                "learning.pattern.min_pattern_occurrences",
                self.learning.pattern.min_pattern_occurrences,
            ),
            ("learning.pattern.max_patterns_per_type", self.learning.pattern.max_patterns_per_type),
            ("learning.reinforcement.max_states", rl.max_states),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.learning.learning_cycle_interval_secs == 0 {
            anyhow::bail!("learning.learning_cycle_interval_secs must be greater than zero");
        }

        self.storage.storage_backend()?;

        if !matches!(self.telemetry.format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "telemetry.format must be 'compact' or 'json', got '{}'",
                self.telemetry.format
            );
        }

        Ok(())
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_override<T: FromStr + std::fmt::Display>(name: &str, target: &mut T) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::info!("Environment override: {}={}", name, value);
            *target = value;
        }
        Err(_) => tracing::warn!("Invalid value for {}: '{}'. Ignoring.", name, raw),
    }
}

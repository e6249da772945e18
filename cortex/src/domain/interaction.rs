// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Interactions
//!
//! The per-turn exchange between a trader and the agent, and the experience
//! records episodic memory keeps of it.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Turn input, agent response, action result and experiences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::feedback::OutcomeKind;

/// One inbound message, with whatever identifying fields perception extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trader_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TurnInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_trader(mut self, trader_id: impl Into<String>) -> Self {
        self.trader_id = Some(trader_id.into());
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Text used for similarity search: the content followed by one line per
    /// identifying field.
    pub fn embedding_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(content) = self.content.as_deref().filter(|c| !c.is_empty()) {
            parts.push(content.to_string());
        }
        if let Some(trader) = &self.trader_id {
            parts.push(format!("Trader: {}", trader));
        }
        if let Some(symbol) = &self.symbol {
            parts.push(format!("Symbol: {}", symbol));
        }
        if let Some(action) = &self.action {
            parts.push(format!("Action: {}", action));
        }
        parts.join("\n")
    }

    /// Reinforcement state for this input. Only the identifying fields take
    /// part, so two messages about the same trader/symbol/action share a state.
    pub fn learning_state(&self) -> Value {
        let mut state = Map::new();
        if let Some(trader) = &self.trader_id {
            state.insert("trader_id".to_string(), json!(trader));
        }
        if let Some(symbol) = &self.symbol {
            state.insert("symbol".to_string(), json!(symbol));
        }
        if let Some(action) = &self.action {
            state.insert("action".to_string(), json!(action));
        }
        if state.is_empty() {
            return json!("idle");
        }
        Value::Object(state)
    }
}

/// What the decision engine decided to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_sequence: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentResponse {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool: Some(tool.into()),
            parameters,
            ..Self::default()
        }
    }

    /// Reinforcement action for this response: the tool call when there is
    /// one, otherwise a plain reply.
    pub fn learning_action(&self) -> Value {
        match &self.tool {
            Some(tool) => json!({"tool": tool, "parameters": self.parameters}),
            None => json!("reply"),
        }
    }
}

/// What happened when the response was carried out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionResult {
    pub fn succeeded() -> Self {
        Self {
            success: Some(true),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One turn as kept by working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub input: TurnInput,
    pub response: AgentResponse,
    pub result: ActionResult,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperienceId(pub String);

impl ExperienceId {
    /// `exp_<unix seconds>_<8 hex chars>`
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("exp_{}_{}", Utc::now().timestamp(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An experience to be written to episodic memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub input: Value,
    pub response: Value,
    pub result: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Filled with the current time on store when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// An experience read back from episodic memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    pub timestamp: Option<DateTime<Utc>>,
    pub input: Value,
    pub response: Value,
    pub result: Value,
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Episodic memory
//!
//! Past interactions stored as embedding vectors so later turns can recall
//! what happened in similar situations. Every collaborator failure is logged
//! and degraded: stores return `None`, reads return an empty list.
//!
//! Vector metadata must be flat, so the structured parts of an experience
//! (`input`, `response`, `result`, `metadata`) are written as JSON strings and
//! parsed back on read. `timestamp_ms` is kept numeric for range filtering.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Similarity and time-range recall of past experiences

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::domain::{
    EmbeddingProvider, Experience, ExperienceId, ExperienceRecord, MetadataFilter, VectorIndex,
};

const TIMESTAMP_FIELD: &str = "timestamp_ms";

/// Upper bound on candidates pulled from the index for a time-range scan.
const TIME_RANGE_SCAN_LIMIT: usize = 10_000;

const ENCODED_FIELDS: [&str; 4] = ["input", "response", "result", "metadata"];

pub struct EpisodicTier {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl EpisodicTier {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Embed and upsert one experience. Returns the generated id, or `None`
    /// when the embedding or index call failed.
    pub async fn store_experience(&self, record: ExperienceRecord) -> Option<ExperienceId> {
        let id = ExperienceId::generate();
        let timestamp = record.timestamp.unwrap_or_else(Utc::now);
        let text = experience_text(&record);

        let vector = match self.embedder.embed(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(experience_id = %id, error = %e, "Failed to embed experience");
                return None;
            }
        };

        let mut metadata = Map::new();
        metadata.insert("text".to_string(), Value::String(text));
        metadata.insert("timestamp".to_string(), json!(timestamp.to_rfc3339()));
        metadata.insert(TIMESTAMP_FIELD.to_string(), json!(timestamp.timestamp_millis()));
        metadata.insert("input".to_string(), encode(&record.input));
        metadata.insert("response".to_string(), encode(&record.response));
        metadata.insert("result".to_string(), encode(&record.result));
        metadata.insert(
            "metadata".to_string(),
            encode(&Value::Object(record.metadata)),
        );

        match self.index.upsert(id.as_str(), vector, metadata).await {
            Ok(()) => {
                debug!(experience_id = %id, "Stored experience");
                Some(id)
            }
            Err(e) => {
                warn!(experience_id = %id, error = %e, "Failed to upsert experience");
                None
            }
        }
    }

    /// Up to `limit` experiences ranked by similarity to `query`, highest first.
    pub async fn retrieve_similar(&self, query: &str, limit: usize) -> Vec<Experience> {
        if limit == 0 {
            return Vec::new();
        }
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Failed to embed similarity query");
                return Vec::new();
            }
        };

        match self.index.query(&vector, limit, None).await {
            Ok(matches) => matches
                .into_iter()
                .map(|m| decode_experience(m.id, m.metadata, Some(m.score)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Similarity query failed");
                Vec::new()
            }
        }
    }

    /// Experiences whose timestamp lies within `[start, end]`, newest first.
    /// Either bound may be open.
    pub async fn retrieve_by_time_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Experience> {
        let filter = MetadataFilter {
            field: TIMESTAMP_FIELD.to_string(),
            gte: start.map(|t| t.timestamp_millis() as f64),
            lte: end.map(|t| t.timestamp_millis() as f64),
        };
        let zero_vector = vec![0.0f32; self.embedder.dimension()];

        let mut matches = match self
            .index
            .query(&zero_vector, TIME_RANGE_SCAN_LIMIT, Some(&filter))
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Time-range query failed");
                return Vec::new();
            }
        };

        let millis = |metadata: &Map<String, Value>| {
            metadata
                .get(TIMESTAMP_FIELD)
                .and_then(Value::as_i64)
                .unwrap_or_default()
        };
        matches.sort_by(|a, b| millis(&b.metadata).cmp(&millis(&a.metadata)));
        matches.truncate(limit);

        matches
            .into_iter()
            .map(|m| decode_experience(m.id, m.metadata, None))
            .collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        match self.index.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(experience_id = id, error = %e, "Failed to delete experience");
                false
            }
        }
    }

    pub async fn delete_all(&self) -> bool {
        match self.index.delete_all().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to delete all experiences");
                false
            }
        }
    }
}

/// Text embedded for an experience: the input text, then the response text.
fn experience_text(record: &ExperienceRecord) -> String {
    let mut parts = Vec::new();
    let input = value_text(&record.input);
    if !input.is_empty() {
        parts.push(input);
    }
    let response = value_text(&record.response);
    if !response.is_empty() {
        parts.push(format!("Response: {}", response));
    }
    parts.join("\n")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("content").and_then(Value::as_str) {
            Some(content) => {
                let mut lines = vec![content.to_string()];
                for (label, key) in [("Trader", "trader_id"), ("Symbol", "symbol"), ("Action", "action")] {
                    if let Some(v) = map.get(key).and_then(Value::as_str) {
                        lines.push(format!("{}: {}", label, v));
                    }
                }
                lines.join("\n")
            }
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn encode(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        primitive => primitive.clone(),
    }
}

fn decode(value: Option<Value>) -> Value {
    match value {
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => Value::String(s),
        },
        Some(other) => other,
        None => Value::Null,
    }
}

fn decode_experience(
    id: String,
    mut metadata: Map<String, Value>,
    similarity_score: Option<f64>,
) -> Experience {
    let timestamp = metadata
        .get(TIMESTAMP_FIELD)
        .and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    let mut fields = ENCODED_FIELDS.map(|key| decode(metadata.remove(key)));
    let extra = match std::mem::take(&mut fields[3]) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let [input, response, result, _] = fields;

    Experience {
        id: ExperienceId(id),
        timestamp,
        input,
        response,
        result,
        metadata: extra,
        similarity_score,
    }
}

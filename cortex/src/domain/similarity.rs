// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Contracts for the embedding and vector-similarity collaborators used by
//! episodic memory

use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),
}

/// Numeric range filter on one metadata field, bounds inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub field: String,
    pub gte: Option<f64>,
    pub lte: Option<f64>,
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        let Some(value) = metadata.get(&self.field).and_then(Value::as_f64) else {
            return false;
        };
        self.gte.is_none_or(|min| value >= min) && self.lte.is_none_or(|max| value <= max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SimilarityError>;

    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Metadata values must be primitives (string, number, bool, null)
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: Map<String, Value>,
    ) -> Result<(), SimilarityError>;

    /// Matches ranked by score, highest first
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, SimilarityError>;

    async fn delete(&self, id: &str) -> Result<(), SimilarityError>;

    async fn delete_all(&self) -> Result<(), SimilarityError>;
}

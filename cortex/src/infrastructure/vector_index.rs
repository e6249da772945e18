// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Brute-force cosine-similarity index held in memory

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::domain::{MetadataFilter, SimilarityError, VectorIndex, VectorMatch};

#[derive(Clone, Default)]
pub struct InMemoryVectorIndex {
    entries: Arc<RwLock<HashMap<String, (Vec<f32>, Map<String, Value>)>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: Map<String, Value>,
    ) -> Result<(), SimilarityError> {
        if let Some((key, value)) = metadata
            .iter()
            .find(|(_, v)| v.is_object() || v.is_array())
        {
            return Err(SimilarityError::Index(format!(
                "metadata field '{}' is not a primitive: {}",
                key, value
            )));
        }
        self.entries.write().insert(id.to_string(), (vector, metadata));
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>, SimilarityError> {
        let entries = self.entries.read();
        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, (_, metadata))| filter.is_none_or(|f| f.matches(metadata)))
            .map(|(id, (stored, metadata))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, stored),
                metadata: metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, id: &str) -> Result<(), SimilarityError> {
        match self.entries.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(SimilarityError::Index(format!("no vector with id '{}'", id))),
        }
    }

    async fn delete_all(&self) -> Result<(), SimilarityError> {
        self.entries.write().clear();
        Ok(())
    }
}

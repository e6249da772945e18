// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Client
//!
//! Deterministic feature-hashing embedder.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Local `EmbeddingProvider` for development and tests
//!
//! Each lowercase alphanumeric token is hashed into one of `dimension`
//! buckets with a hash-derived sign, and the result is L2-normalised. Texts
//! sharing vocabulary therefore score high on cosine similarity, which is all
//! episodic recall needs when no model-backed service is configured.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::domain::{EmbeddingProvider, SimilarityError};

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingClient {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SimilarityError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_generate_embedding() {
        let client = HashEmbeddingClient::default();
        let embedding = client.embed("Buy BTC now").await.unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_consistent_embeddings() {
        let client = HashEmbeddingClient::new(64);
        let emb1 = client.embed("same text").await.unwrap();
        let emb2 = client.embed("SAME, text!").await.unwrap();

        assert_eq!(emb1, emb2, "Same tokens should produce same embedding");
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let client = HashEmbeddingClient::default();
        let query = client.embed("long BTC breakout").await.unwrap();
        let near = client.embed("BTC breakout long setup").await.unwrap();
        let far = client.embed("weekly newsletter subscription").await.unwrap();

        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let client = HashEmbeddingClient::new(8);
        assert_eq!(client.embed("  ").await.unwrap(), vec![0.0; 8]);
    }
}

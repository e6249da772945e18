// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer: persistence, similarity collaborators and the event bus

pub mod embedding_client;
pub mod event_bus;
pub mod in_memory;
pub mod postgres;
pub mod vector_index;

pub use embedding_client::{HashEmbeddingClient, DEFAULT_EMBEDDING_DIMENSION};
pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use in_memory::InMemoryLearningStore;
pub use postgres::PostgresLearningStore;
pub use vector_index::InMemoryVectorIndex;

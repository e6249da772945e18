// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Validation errors surfaced directly to callers

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CortexError {
    #[error("Unsupported pattern domain: '{0}'. Expected one of trades, signals, feedback")]
    UnsupportedDomain(String),

    #[error("Unsupported timeframe: '{0}'. Expected one of all, day, week, month")]
    UnsupportedTimeframe(String),

    #[error("Unsupported storage backend: '{0}'. Expected in_memory or postgres")]
    UnsupportedBackend(String),
}

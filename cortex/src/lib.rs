// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Signal Cortex
//!
//! Memory and learning core for a trading-signal agent: four memory tiers
//! (working, episodic, semantic, procedural) behind a memory coordinator, and
//! four learning engines (feedback, reinforcement, performance, pattern)
//! behind a learning coordinator with a background learning loop.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Remember what happened and learn what works

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod telemetry;

pub use application::*;
pub use config::CortexConfig;
pub use domain::*;
pub use infrastructure::*;

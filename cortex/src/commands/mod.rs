// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CLI command implementations

pub mod config;
pub mod simulate;

pub use config::ConfigCommand;
pub use simulate::SimulateArgs;

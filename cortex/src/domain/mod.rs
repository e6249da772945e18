// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Records, events and contracts of the learning core.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits; no I/O lives here

pub mod action_pattern;
pub mod canonical;
pub mod errors;
pub mod events;
pub mod feedback;
pub mod interaction;
pub mod knowledge;
pub mod pattern;
pub mod performance;
pub mod repository;
pub mod similarity;

pub use action_pattern::*;
pub use errors::*;
pub use events::*;
pub use feedback::*;
pub use interaction::*;
pub use knowledge::*;
pub use pattern::*;
pub use performance::*;
pub use repository::*;
pub use similarity::*;

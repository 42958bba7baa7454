// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Control
//!
//! - [`level`]: the three access levels and their arithmetic.
//! - [`graph`]: membership edges and traversals.
//! - [`invariants`]: the "every secret has an administrator" check.
//! - [`authenticated`]: per-identity authorization and batch validation.
//! - [`mutations`]: authorized writes built on the above.

pub mod authenticated;
pub mod graph;
pub mod invariants;
pub mod level;
pub mod mutations;

#[cfg(test)]
pub(crate) mod fixture;

pub use authenticated::AuthenticatedAccess;
pub use graph::{AccessGraph, Direction, Node, Reachable};
pub use invariants::{
    administrators_of, verify_has_administrator, verify_secrets, verify_secrets_after, PendingChanges,
};
pub use level::AccessLevel;
pub use mutations::create_identity;

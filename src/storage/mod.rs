// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in two redb files:
//!
//! ```text
//! $DATA_DIR/
//!   graph.redb   # identities, groups, ACL edges, secrets, attachments,
//!                # classified audit records
//!   audit.redb   # raw audit log, appended outside the graph transaction
//! ```
//!
//! The graph file is only ever written through a [`StoreTxn`] owned by a
//! [`crate::transaction::Transaction`]. The raw log commits every append on
//! its own so that lifecycle markers survive a rollback of the transaction
//! they describe.

pub mod audit;
pub mod database;
pub mod graph_store;

pub use audit::{AuditLog, RawAction, RawAuditEvent};
pub use database::{GraphDatabase, StoreError, StoreResult, StoreTxn};
pub use graph_store::GraphStore;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret Access Core - access control and audit engine for shared secrets
//!
//! Identities, groups and organizations form a directed membership graph.
//! Secrets are attached to groups and every access decision is a traversal of
//! that graph. Every read-write transaction leaves a raw audit trail that is
//! classified into user-facing events after commit.
//!
//! ## Modules
//!
//! - `access` - Membership graph, authorization and invariant checks
//! - `audit` - Classified audit events and the background classifier
//! - `config` - Environment configuration
//! - `storage` - redb-backed graph store and raw audit log
//! - `transaction` - Audited transactions, the transaction pool and idle sweep

pub mod access;
pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod transaction;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Audit
//!
//! Two kinds of records describe what a transaction did:
//!
//! - raw events ([`crate::storage::RawAuditEvent`]), appended while the
//!   transaction runs;
//! - classified records ([`ClassifiedEvent`]), derived from the raw events
//!   after commit by the [`AuditClassifier`], plus the access-change records
//!   the transaction writes itself at commit.

pub mod category;
pub mod classifier;
pub mod event;
pub mod worker;

pub use category::{category_for_operation, Category};
pub use classifier::{classify, AuditClassifier};
pub use event::{ClassifiedEvent, ClassifiedRecord};
pub use worker::{classifier_queue, ClassifierDispatcher, ClassifierQueue, ClassifierWorkers};

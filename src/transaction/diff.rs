// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Before/after visibility diff of one transaction.
//!
//! The first time a transaction touches an identity, the secrets that
//! identity can see are snapshotted. At commit the same identities are
//! queried again and the difference becomes GRANTED_ACCESS_TO and
//! REVOKED_ACCESS_TO records, however many intermediate mutations happened.

use std::collections::{BTreeMap, BTreeSet};

use crate::access::{AccessGraph, AccessLevel};
use crate::audit::ClassifiedRecord;
use crate::error::EngineResult;
use crate::models::{GroupId, IdentityId, SecretId, TransactionId};
use crate::storage::GraphStore;

/// Tracking state: snapshots of the identities touched so far.
#[derive(Debug, Default)]
pub struct AccessDiff {
    before: BTreeMap<IdentityId, BTreeSet<SecretId>>,
}

impl AccessDiff {
    /// Snapshot identities not tracked yet. Already tracked identities keep
    /// their first snapshot.
    pub fn track_identities<S, I>(&mut self, store: &S, identities: I) -> EngineResult<()>
    where
        S: GraphStore + ?Sized,
        I: IntoIterator<Item = IdentityId>,
    {
        let graph = AccessGraph::new(store);
        for identity in identities {
            if self.before.contains_key(&identity) {
                continue;
            }
            let visible = graph.visible_secret_ids(identity)?;
            self.before.insert(identity, visible);
        }
        Ok(())
    }

    /// Track every identity that can currently reach `group`.
    pub fn track_group<S: GraphStore + ?Sized>(&mut self, store: &S, group: GroupId) -> EngineResult<()> {
        let users = AccessGraph::new(store).identities_with_access_to_group(group, AccessLevel::ALL)?;
        self.track_identities(store, users)
    }

    /// Track every identity that can currently see `secret`.
    pub fn track_secret<S: GraphStore + ?Sized>(&mut self, store: &S, secret: SecretId) -> EngineResult<()> {
        let users = AccessGraph::new(store).identities_with_access_to_secret(secret, AccessLevel::ALL)?;
        self.track_identities(store, users)
    }

    pub fn is_tracking(&self, identity: IdentityId) -> bool {
        self.before.contains_key(&identity)
    }

    pub fn tracked_count(&self) -> usize {
        self.before.len()
    }

    /// Re-query every tracked identity and compute what changed.
    pub fn finish<S: GraphStore + ?Sized>(self, store: &S) -> EngineResult<AccessChanges> {
        let graph = AccessGraph::new(store);
        let mut changes = BTreeMap::new();
        for (identity, before) in self.before {
            let after = graph.visible_secret_ids(identity)?;
            let change = AccessChange {
                granted: after.difference(&before).copied().collect(),
                revoked: before.difference(&after).copied().collect(),
            };
            if !change.is_empty() {
                changes.insert(identity, change);
            }
        }
        Ok(AccessChanges { changes })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessChange {
    pub granted: BTreeSet<SecretId>,
    pub revoked: BTreeSet<SecretId>,
}

impl AccessChange {
    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.revoked.is_empty()
    }
}

/// Diffed state: per-identity changes, empty diffs omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessChanges {
    changes: BTreeMap<IdentityId, AccessChange>,
}

impl AccessChanges {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, identity: IdentityId) -> Option<&AccessChange> {
        self.changes.get(&identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityId, &AccessChange)> {
        self.changes.iter()
    }

    /// One record per (identity, secret, direction), attributed to `actor`.
    pub fn into_records(self, actor: IdentityId, transaction_id: &TransactionId) -> Vec<ClassifiedRecord> {
        let mut records = Vec::new();
        for (identity, change) in self.changes {
            for secret in change.granted {
                records.push(ClassifiedRecord::access_change(
                    true,
                    actor,
                    identity,
                    secret,
                    transaction_id.clone(),
                ));
            }
            for secret in change.revoked {
                records.push(ClassifiedRecord::access_change(
                    false,
                    actor,
                    identity,
                    secret,
                    transaction_id.clone(),
                ));
            }
        }
        records
    }
}

/// Outcome of work that must never fail the operation it belongs to.
///
/// The only way to consume it is [`BestEffort::discard`], which logs the
/// error.
#[must_use = "best-effort outcomes must be discarded explicitly"]
#[derive(Debug)]
pub struct BestEffort<T>(EngineResult<T>);

impl<T> BestEffort<T> {
    pub fn new(result: EngineResult<T>) -> Self {
        Self(result)
    }

    pub fn discard(self, what: &str, transaction_id: &TransactionId) -> Option<T> {
        match self.0 {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(txn_id = %transaction_id, error = %e, "{what} failed; continuing");
                None
            }
        }
    }
}

impl<T> From<EngineResult<T>> for BestEffort<T> {
    fn from(result: EngineResult<T>) -> Self {
        Self::new(result)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Classification of raw events into high-level audit records.
//!
//! [`classify`] is pure: it looks at the raw events of one transaction and
//! decides which records to emit. [`AuditClassifier`] reads the raw log,
//! runs it, and writes the records in a transaction of its own.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{category_for_operation, Category, ClassifiedEvent, ClassifiedRecord};
use crate::error::EngineResult;
use crate::models::{GroupId, IdentityId, SecretId, TransactionId};
use crate::state::EngineState;
use crate::storage::{GraphStore, RawAction, RawAuditEvent};
use crate::transaction::{lock_transaction, TxnMode};

/// What one pass over a transaction's raw events collects.
#[derive(Default)]
struct Observed<'e> {
    kinds: BTreeSet<RawAction>,
    groups: BTreeSet<GroupId>,
    secrets: BTreeSet<SecretId>,
    operation_name: Option<&'e str>,
    /// Invite events, one per distinct invitee, in log order.
    targets: Vec<&'e RawAuditEvent>,
    invites: Vec<ClassifiedRecord>,
}

impl<'e> Observed<'e> {
    fn collect(events: &'e [RawAuditEvent]) -> Self {
        let mut observed = Self::default();
        let mut invitees: BTreeSet<IdentityId> = BTreeSet::new();

        for event in events {
            // legacy rows may lack an actor; only lifecycle markers are kept
            if event.actor.is_none() && !event.action.is_transaction_marker() {
                continue;
            }
            observed.kinds.insert(event.action);
            if observed.operation_name.is_none() {
                observed.operation_name = event.operation_name.as_deref().filter(|name| !name.is_empty());
            }
            observed.secrets.extend(event.target_secret);

            if event.action != RawAction::InviteNewUser {
                observed.groups.extend(event.target_group);
                continue;
            }

            // the invitee's new private group is not what the operation is about
            let Some(inviter) = event.actor else {
                continue;
            };
            observed
                .invites
                .push(ClassifiedRecord::from_raw(Category::InviteUser, inviter, event));
            if let Some(invitee) = event.target_identity {
                observed.invites.push(
                    ClassifiedRecord::from_raw(Category::InvitedByUser, invitee, event)
                        .affecting_user(inviter),
                );
                if invitees.insert(invitee) {
                    observed.targets.push(event);
                }
            }
        }
        observed
    }

    fn committed(&self) -> bool {
        self.kinds.contains(&RawAction::TransactionCommit)
            && !self.kinds.iter().any(|kind| kind.is_uncommitted())
    }

    /// Category for transactions that carry no operation name.
    fn inferred_category(&self) -> Option<Category> {
        if self.kinds.contains(&RawAction::CreateIdentity) {
            Some(Category::Signup)
        } else if self.kinds.contains(&RawAction::GetSecretWithCritical) && self.kinds.len() == 2 {
            Some(Category::GetSecretCriticalDataForLogin)
        } else if self.kinds.contains(&RawAction::GetPrivateKey) {
            Some(Category::MitroLogin)
        } else {
            None
        }
    }
}

/// One record attributed to the first event that has an actor.
fn first_with_actor(category: Category, events: &[RawAuditEvent]) -> Option<ClassifiedRecord> {
    events
        .iter()
        .find_map(|event| event.actor.map(|actor| ClassifiedRecord::from_raw(category, actor, event)))
}

/// Classify the raw events of one transaction.
///
/// Returns nothing for a transaction that was rolled back, terminated or
/// never committed.
pub fn classify(transaction_id: &TransactionId, events: &[RawAuditEvent]) -> Vec<ClassifiedRecord> {
    let observed = Observed::collect(events);
    if !observed.committed() {
        debug!(txn_id = %transaction_id, "transaction not committed; nothing to classify");
        return Vec::new();
    }

    let mut records = Vec::new();
    let category = match observed.operation_name {
        Some(name) => {
            let category = category_for_operation(name);
            if category.is_recorded() {
                if observed.targets.is_empty() {
                    records.extend(first_with_actor(category, events));
                } else {
                    for event in &observed.targets {
                        if let Some(actor) = event.actor {
                            records.push(ClassifiedRecord::from_raw(category, actor, event));
                        }
                    }
                }
            }
            Some(category)
        }
        None => {
            let category = observed.inferred_category();
            if let Some(category) = category {
                records.extend(first_with_actor(category, events));
            }
            category
        }
    };

    if let Some(category) = category {
        if category.tracks_group() {
            match observed.groups.len() {
                0 => {}
                1 => {
                    for record in &mut records {
                        record.affected_group = observed.groups.first().copied();
                    }
                }
                n => warn!(txn_id = %transaction_id, groups = n, "more than one affected group; not attributing"),
            }
        }
        if category.tracks_secret() {
            match observed.secrets.len() {
                0 => {}
                1 => {
                    for record in &mut records {
                        record.affected_secret = observed.secrets.first().copied();
                    }
                }
                n => warn!(txn_id = %transaction_id, secrets = n, "more than one affected secret; not attributing"),
            }
        }
    }

    records.extend(observed.invites);
    records
}

/// Writes classified records for committed transactions.
pub struct AuditClassifier<'a> {
    state: &'a EngineState,
}

impl<'a> AuditClassifier<'a> {
    pub fn new(state: &'a EngineState) -> Self {
        Self { state }
    }

    /// Classify one transaction and append its records. Returns how many
    /// were written.
    pub fn process_transaction(&self, transaction_id: &TransactionId) -> EngineResult<usize> {
        self.run(transaction_id, false)
    }

    /// Like [`AuditClassifier::process_transaction`], after deleting the
    /// records a previous run produced. Access-change records written at
    /// commit are kept.
    pub fn reprocess_transaction(&self, transaction_id: &TransactionId) -> EngineResult<usize> {
        self.run(transaction_id, true)
    }

    fn run(&self, transaction_id: &TransactionId, replace: bool) -> EngineResult<usize> {
        let events = self.state.audit_log().events_for_transaction(transaction_id)?;
        let records = classify(transaction_id, &events);

        let shared = self.state.begin(TxnMode::ReadWrite)?;
        let written = {
            let mut txn = lock_transaction(&shared);
            // never classify the classifier's own writes
            txn.disable_audit_logs();
            let store = txn.store()?;
            let write = || -> EngineResult<usize> {
                if replace {
                    let removed = store.retain_classified_events(transaction_id, &|event: &ClassifiedEvent| {
                        event.record.category.is_access_change()
                    })?;
                    debug!(txn_id = %transaction_id, removed, "removed previous classification");
                }
                let count = records.len();
                for record in records {
                    store.append_classified_event(record)?;
                }
                Ok(count)
            };
            write()
        };

        match written {
            Ok(count) => {
                self.state.commit(&shared)?;
                Ok(count)
            }
            Err(e) => {
                if let Err(rollback_error) = self.state.rollback(&shared) {
                    warn!(txn_id = %transaction_id, error = %rollback_error, "rollback after failed classification failed");
                }
                Err(e)
            }
        }
    }
}

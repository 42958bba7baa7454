// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transactions
//!
//! A [`Transaction`] wraps one redb transaction on the graph database and
//! carries everything needed to audit it: the requestor, the client's
//! operation name and source, and the [`AccessDiff`] tracker.
//!
//! ## Lifecycle
//!
//! ```text
//! EngineState::begin ──► Open ──commit──► Committed
//!                          │
//!                          ├──rollback──► RolledBack
//!                          └──terminate─► Terminated   (idle sweep)
//! ```
//!
//! Every exit from `Open` writes a marker to the raw audit log when audit
//! logging is enabled for the transaction. The classifier only looks at
//! transactions with a commit marker and without a rollback or terminate
//! marker.

pub mod diff;
pub mod pool;
pub mod sweeper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::models::{GroupId, IdentityId, SecretId, TransactionId};
use crate::storage::{AuditLog, GraphStore, RawAction, RawAuditEvent, StoreTxn};

pub use diff::{AccessChange, AccessChanges, AccessDiff, BestEffort};
pub use pool::{lock_transaction, SharedTransaction, SweepReport, TransactionPool};
pub use sweeper::IdleSweeper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Open,
    Committed,
    RolledBack,
    Terminated,
}

/// Optional targets of a raw audit event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditTarget {
    pub identity: Option<IdentityId>,
    pub group: Option<GroupId>,
    pub secret: Option<SecretId>,
}

impl AuditTarget {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn identity(identity: IdentityId) -> Self {
        Self {
            identity: Some(identity),
            ..Self::default()
        }
    }

    pub fn group(group: GroupId) -> Self {
        Self {
            group: Some(group),
            ..Self::default()
        }
    }

    pub fn secret(secret: SecretId) -> Self {
        Self {
            secret: Some(secret),
            ..Self::default()
        }
    }

    pub fn and_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

}

/// Whether a transaction writes raw audit events.
///
/// Shared with the pool entry so the idle sweep can tell without locking the
/// transaction.
#[derive(Debug, Clone)]
pub(crate) struct AuditSwitch {
    mode: TxnMode,
    enabled: Arc<AtomicBool>,
}

impl AuditSwitch {
    fn new(mode: TxnMode) -> Self {
        Self {
            mode,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub(crate) fn is_on(&self) -> bool {
        self.mode == TxnMode::ReadWrite && self.enabled.load(Ordering::Acquire)
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }
}

pub struct Transaction {
    id: TransactionId,
    mode: TxnMode,
    store: Option<StoreTxn>,
    audit_log: Arc<AuditLog>,
    requestor: Option<IdentityId>,
    operation_name: Option<String>,
    source_ip: Option<String>,
    device_id: Option<String>,
    audit: AuditSwitch,
    access_diff: AccessDiff,
    status: TxnStatus,
}

impl Transaction {
    pub fn new(id: TransactionId, mode: TxnMode, store: StoreTxn, audit_log: Arc<AuditLog>) -> Self {
        Self {
            id,
            mode,
            store: Some(store),
            audit_log,
            requestor: None,
            operation_name: None,
            source_ip: None,
            device_id: None,
            audit: AuditSwitch::new(mode),
            access_diff: AccessDiff::default(),
            status: TxnStatus::Open,
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn status(&self) -> TxnStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == TxnStatus::Open
    }

    pub fn requestor(&self) -> Option<IdentityId> {
        self.requestor
    }

    pub fn set_requestor(&mut self, requestor: IdentityId) {
        self.requestor = Some(requestor);
    }

    pub fn set_operation_name(&mut self, name: impl Into<String>) {
        self.operation_name = Some(name.into());
    }

    pub fn set_source(&mut self, source_ip: Option<String>, device_id: Option<String>) {
        self.source_ip = source_ip;
        self.device_id = device_id;
    }

    /// Used by the classifier for its own transactions so that they are not
    /// classified again.
    pub fn disable_audit_logs(&mut self) {
        self.audit.disable();
    }

    pub fn should_write_audit_logs(&self) -> bool {
        self.audit.is_on()
    }

    pub(crate) fn audit_switch(&self) -> AuditSwitch {
        self.audit.clone()
    }

    /// Identities whose visible secrets are snapshotted for the access diff.
    pub fn tracked_identities(&self) -> usize {
        self.access_diff.tracked_count()
    }

    pub fn store(&self) -> EngineResult<&StoreTxn> {
        self.store
            .as_ref()
            .ok_or_else(|| EngineError::TransactionClosed(self.id.clone()))
    }

    // =========================================================================
    // Audit
    // =========================================================================

    fn raw_event(&self, action: RawAction, target: AuditTarget) -> RawAuditEvent {
        let mut event = RawAuditEvent::new(self.id.clone(), action)
            .with_actor(self.requestor)
            .with_operation_name(self.operation_name.clone())
            .with_source(self.source_ip.clone(), self.device_id.clone());
        event.target_identity = target.identity;
        event.target_group = target.group;
        event.target_secret = target.secret;
        event
    }

    /// Append a raw event for this transaction, if audit logging is on.
    pub fn add_audit_log(&self, action: RawAction, target: AuditTarget) -> EngineResult<()> {
        if !self.should_write_audit_logs() {
            return Ok(());
        }
        self.audit_log.append(self.raw_event(action, target))?;
        Ok(())
    }

    fn write_marker(&self, action: RawAction) {
        BestEffort::new(self.add_audit_log(action, AuditTarget::none()))
            .discard("writing transaction marker", &self.id);
    }

    /// Snapshot the visible secrets of `identities` before they change.
    pub fn track_identities<I>(&mut self, identities: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = IdentityId>,
    {
        if !self.should_write_audit_logs() {
            return Ok(());
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EngineError::TransactionClosed(self.id.clone()))?;
        self.access_diff.track_identities(store, identities)
    }

    pub fn track_group(&mut self, group: GroupId) -> EngineResult<()> {
        if !self.should_write_audit_logs() {
            return Ok(());
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EngineError::TransactionClosed(self.id.clone()))?;
        self.access_diff.track_group(store, group)
    }

    pub fn track_secret(&mut self, secret: SecretId) -> EngineResult<()> {
        if !self.should_write_audit_logs() {
            return Ok(());
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EngineError::TransactionClosed(self.id.clone()))?;
        self.access_diff.track_secret(store, secret)
    }

    fn write_access_changes(&mut self, store: &StoreTxn) -> EngineResult<usize> {
        let diff = std::mem::take(&mut self.access_diff);
        let changes = diff.finish(store)?;
        if changes.is_empty() {
            return Ok(0);
        }
        let Some(actor) = self.requestor else {
            tracing::warn!(txn_id = %self.id, "access changed without a requestor; not recorded");
            return Ok(0);
        };
        let records = changes.into_records(actor, &self.id);
        let count = records.len();
        for record in records {
            store.append_classified_event(
                record.with_source(self.source_ip.clone(), self.device_id.clone()),
            )?;
        }
        Ok(count)
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Record access changes, write the commit marker and commit.
    ///
    /// Failure to record access changes is logged and does not stop the
    /// commit. If the store commit itself fails a rollback marker follows the
    /// commit marker so the transaction is never classified.
    pub fn commit(&mut self) -> EngineResult<()> {
        let store = self
            .store
            .take()
            .ok_or_else(|| EngineError::TransactionClosed(self.id.clone()))?;

        if self.should_write_audit_logs() {
            let written = BestEffort::new(self.write_access_changes(&store))
                .discard("recording access changes", &self.id);
            if let Some(count) = written.filter(|count| *count > 0) {
                tracing::debug!(txn_id = %self.id, records = count, "recorded access changes");
            }
        }
        self.write_marker(RawAction::TransactionCommit);

        match store.commit() {
            Ok(()) => {
                self.status = TxnStatus::Committed;
                Ok(())
            }
            Err(e) => {
                self.status = TxnStatus::RolledBack;
                self.write_marker(RawAction::TransactionRollback);
                Err(e.into())
            }
        }
    }

    pub fn rollback(&mut self) -> EngineResult<()> {
        self.close(TxnStatus::RolledBack, RawAction::TransactionRollback)
    }

    /// Roll back on behalf of the idle sweep.
    pub fn terminate(&mut self) -> EngineResult<()> {
        self.close(TxnStatus::Terminated, RawAction::TransactionTerminate)
    }

    fn close(&mut self, status: TxnStatus, marker: RawAction) -> EngineResult<()> {
        let store = self
            .store
            .take()
            .ok_or_else(|| EngineError::TransactionClosed(self.id.clone()))?;
        self.status = status;
        self.access_diff = AccessDiff::default();
        self.write_marker(marker);
        store.abort()?;
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("status", &self.status)
            .field("requestor", &self.requestor)
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}

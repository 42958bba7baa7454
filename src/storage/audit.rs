// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Raw audit log.
//!
//! Every low-level action a transaction performs is appended here together
//! with the transaction id. The log lives in its own redb file and each
//! append commits on its own, so rollback and termination markers survive
//! the rollback of the transaction they describe.
//!
//! ## Table Layout
//!
//! - `raw_events`: event id → serialized RawAuditEvent
//! - `raw_events_by_txn`: composite key (txn_id|event_id_be) → ()
//! - `raw_sequences`: sequence name → last issued id

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::database::{make_index_key, make_prefix, make_prefix_end, StoreResult};
use crate::models::{GroupId, IdentityId, SecretId, TransactionId};

const RAW_EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("raw_events");

const RAW_EVENTS_BY_TXN: TableDefinition<&[u8], ()> = TableDefinition::new("raw_events_by_txn");

const RAW_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("raw_sequences");

/// Low-level actions recorded in the raw log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawAction {
    // Secret events
    AddSecret,
    RemoveSecret,
    EditSecret,
    EditSecretContent,
    GetSecretWithCritical,
    GetSecretWithoutCritical,
    ListSecrets,

    // Group events
    AddGroup,
    ModifyGroup,
    GetGroup,
    AddPendingGroupSync,
    GetPendingGroupSync,
    RemovePendingGroupSync,
    CreateOrganization,
    MutateOrganization,

    // Identity events
    CreateIdentity,
    InviteNewUser,
    Login,
    AuthorizeNewDevice,
    TfaSuccess,
    TfaFail,
    EditEncryptedPrivateKey,
    GetPrivateKey,

    // Transaction markers
    TransactionBegin,
    TransactionCommit,
    TransactionRollback,
    TransactionTerminate,
    TransactionIdleAndLocked,
}

impl RawAction {
    /// Markers that mean the transaction's writes were discarded.
    pub fn is_uncommitted(self) -> bool {
        matches!(
            self,
            RawAction::TransactionRollback | RawAction::TransactionTerminate
        )
    }

    /// Lifecycle markers. These may be written without an actor.
    pub fn is_transaction_marker(self) -> bool {
        matches!(
            self,
            RawAction::TransactionBegin
                | RawAction::TransactionCommit
                | RawAction::TransactionRollback
                | RawAction::TransactionTerminate
                | RawAction::TransactionIdleAndLocked
        )
    }
}

/// One entry of the raw log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawAuditEvent {
    /// Assigned on append; increases with append order.
    pub id: u64,
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub action: RawAction,
    pub actor: Option<IdentityId>,
    pub target_identity: Option<IdentityId>,
    pub target_group: Option<GroupId>,
    pub target_secret: Option<SecretId>,
    /// Client-supplied high-level operation name.
    pub operation_name: Option<String>,
    pub source_ip: Option<String>,
    pub device_id: Option<String>,
    pub note: Option<String>,
}

impl RawAuditEvent {
    /// Create an event for `transaction_id`; the id is filled in on append.
    pub fn new(transaction_id: TransactionId, action: RawAction) -> Self {
        Self {
            id: 0,
            transaction_id,
            timestamp: Utc::now(),
            action,
            actor: None,
            target_identity: None,
            target_group: None,
            target_secret: None,
            operation_name: None,
            source_ip: None,
            device_id: None,
            note: None,
        }
    }

    pub fn with_actor(mut self, actor: Option<IdentityId>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_target_identity(mut self, identity: IdentityId) -> Self {
        self.target_identity = Some(identity);
        self
    }

    pub fn with_target_group(mut self, group: GroupId) -> Self {
        self.target_group = Some(group);
        self
    }

    pub fn with_target_secret(mut self, secret: SecretId) -> Self {
        self.target_secret = Some(secret);
        self
    }

    pub fn with_operation_name(mut self, name: Option<String>) -> Self {
        self.operation_name = name;
        self
    }

    pub fn with_source(mut self, source_ip: Option<String>, device_id: Option<String>) -> Self {
        self.source_ip = source_ip;
        self.device_id = device_id;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Append-only raw event log backed by its own redb file.
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    /// Open (or create) the log at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RAW_EVENTS)?;
            let _ = write_txn.open_table(RAW_EVENTS_BY_TXN)?;
            let _ = write_txn.open_table(RAW_SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Append an event, assigning its id. Commits immediately.
    pub fn append(&self, mut event: RawAuditEvent) -> StoreResult<RawAuditEvent> {
        let write_txn = self.db.begin_write()?;
        {
            let mut sequences = write_txn.open_table(RAW_SEQUENCES)?;
            let next = sequences.get("raw_events")?.map(|v| v.value()).unwrap_or(0) + 1;
            sequences.insert("raw_events", next)?;
            event.id = next;
        }
        {
            let json = serde_json::to_vec(&event)?;
            let mut events = write_txn.open_table(RAW_EVENTS)?;
            events.insert(event.id, json.as_slice())?;

            let key = make_index_key(event.transaction_id.as_str(), event.id);
            let mut index = write_txn.open_table(RAW_EVENTS_BY_TXN)?;
            index.insert(key.as_slice(), ())?;
        }
        write_txn.commit()?;
        Ok(event)
    }

    /// All events of one transaction in append order.
    pub fn events_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> StoreResult<Vec<RawAuditEvent>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(RAW_EVENTS_BY_TXN)?;
        let events = read_txn.open_table(RAW_EVENTS)?;

        let prefix = make_prefix(transaction_id.as_str());
        let prefix_end = make_prefix_end(transaction_id.as_str());

        let mut result = Vec::new();
        for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let (key, _) = entry?;
            let Some(id) = super::database::event_id_from_key(key.value()) else {
                continue;
            };
            if let Some(value) = events.get(id)? {
                result.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(result)
    }

    /// Ids of every transaction that logged `action` at least once.
    pub fn transactions_with_action(&self, action: RawAction) -> StoreResult<BTreeSet<TransactionId>> {
        let read_txn = self.db.begin_read()?;
        let events = read_txn.open_table(RAW_EVENTS)?;

        let mut result = BTreeSet::new();
        for entry in events.iter()? {
            let (_, value) = entry?;
            let event: RawAuditEvent = serde_json::from_slice(value.value())?;
            if event.action == action {
                result.insert(event.transaction_id);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> (AuditLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(&dir.path().join("audit.redb")).unwrap();
        (log, dir)
    }

    #[test]
    fn events_are_grouped_by_transaction_in_order() {
        let (log, _dir) = temp_log();
        let a = TransactionId::from("aaaa");
        let b = TransactionId::from("aaaab");

        log.append(RawAuditEvent::new(a.clone(), RawAction::AddGroup).with_actor(Some(IdentityId(1))))
            .unwrap();
        log.append(RawAuditEvent::new(b.clone(), RawAction::Login)).unwrap();
        log.append(RawAuditEvent::new(a.clone(), RawAction::TransactionCommit))
            .unwrap();

        let events = log.events_for_transaction(&a).unwrap();
        let actions: Vec<_> = events.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![RawAction::AddGroup, RawAction::TransactionCommit]);
        assert!(events[0].id < events[1].id);
        assert_eq!(events[0].actor, Some(IdentityId(1)));

        assert_eq!(log.events_for_transaction(&b).unwrap().len(), 1);
    }

    #[test]
    fn transactions_with_action_finds_invites() {
        let (log, _dir) = temp_log();
        log.append(RawAuditEvent::new("t1".into(), RawAction::InviteNewUser))
            .unwrap();
        log.append(RawAuditEvent::new("t2".into(), RawAction::AddSecret))
            .unwrap();
        log.append(RawAuditEvent::new("t3".into(), RawAction::InviteNewUser))
            .unwrap();

        let found = log.transactions_with_action(RawAction::InviteNewUser).unwrap();
        let ids: Vec<_> = found.iter().map(|t| t.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    #[test]
    fn marker_classification() {
        assert!(RawAction::TransactionRollback.is_uncommitted());
        assert!(RawAction::TransactionTerminate.is_uncommitted());
        assert!(!RawAction::TransactionCommit.is_uncommitted());
        assert!(RawAction::TransactionIdleAndLocked.is_transaction_marker());
        assert!(!RawAction::InviteNewUser.is_transaction_marker());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded graph database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `identities`: identity id → serialized Identity
//! - `identity_names`: unique name → identity id
//! - `groups`: group id → serialized Group
//! - `acls`: acl id → serialized Acl
//! - `acls_by_owner`: (owner group, acl id) → ()
//! - `acls_by_member_group`: (member group, acl id) → ()
//! - `acls_by_member_identity`: (member identity, acl id) → ()
//! - `secrets`: secret id → serialized Secret
//! - `attachments`: (secret id, group id) → serialized SecretAttachment
//! - `attachments_by_group`: (group id, secret id) → ()
//! - `classified_events`: event id → serialized ClassifiedEvent
//! - `classified_by_txn`: composite key (txn_id|event_id_be) → ()
//! - `sequences`: sequence name → last issued id
//!
//! Unlike the raw audit log, nothing here commits on its own: every write
//! goes through a [`StoreTxn`] that the caller commits or aborts.

use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

use super::GraphStore;
use crate::access::AccessLevel;
use crate::audit::{ClassifiedEvent, ClassifiedRecord};
use crate::models::{
    Acl, AclId, AclMember, Group, GroupId, Identity, IdentityId, NewAcl, NewGroup, NewIdentity,
    NewSecret, Secret, SecretAttachment, SecretId, TransactionId,
};

// =============================================================================
// Table Definitions
// =============================================================================

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;
type IndexTable = TableDefinition<'static, (u64, u64), ()>;

const IDENTITIES: RecordTable = TableDefinition::new("identities");

const IDENTITY_NAMES: TableDefinition<&str, u64> = TableDefinition::new("identity_names");

const GROUPS: RecordTable = TableDefinition::new("groups");

const ACLS: RecordTable = TableDefinition::new("acls");

const ACLS_BY_OWNER: IndexTable = TableDefinition::new("acls_by_owner");

const ACLS_BY_MEMBER_GROUP: IndexTable = TableDefinition::new("acls_by_member_group");

const ACLS_BY_MEMBER_IDENTITY: IndexTable = TableDefinition::new("acls_by_member_identity");

const SECRETS: RecordTable = TableDefinition::new("secrets");

/// Keyed by (secret, group).
const ATTACHMENTS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("attachments");

/// Keyed by (group, secret).
const ATTACHMENTS_BY_GROUP: IndexTable = TableDefinition::new("attachments_by_group");

const CLASSIFIED_EVENTS: RecordTable = TableDefinition::new("classified_events");

/// Key format: `txn_id|event_id_be`.
const CLASSIFIED_BY_TXN: TableDefinition<&[u8], ()> = TableDefinition::new("classified_by_txn");

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("write attempted in a read-only transaction")]
    ReadOnly,
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key `prefix | event_id_be` for per-transaction indexes.
pub(super) fn make_index_key(prefix: &str, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + 8);
    key.extend_from_slice(prefix.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Build a prefix key for range scanning all entries of a transaction.
pub(super) fn make_prefix(prefix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1);
    key.extend_from_slice(prefix.as_bytes());
    key.push(b'|');
    key
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
pub(super) fn make_prefix_end(prefix: &str) -> Vec<u8> {
    let mut end = make_prefix(prefix);
    end.extend_from_slice(&[0xFF; 9]);
    end
}

/// Extract the trailing event id from a composite key.
pub(super) fn event_id_from_key(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

// =============================================================================
// GraphDatabase
// =============================================================================

/// Embedded ACID graph database.
pub struct GraphDatabase {
    db: Database,
}

impl GraphDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IDENTITIES)?;
            let _ = write_txn.open_table(IDENTITY_NAMES)?;
            let _ = write_txn.open_table(GROUPS)?;
            let _ = write_txn.open_table(ACLS)?;
            let _ = write_txn.open_table(ACLS_BY_OWNER)?;
            let _ = write_txn.open_table(ACLS_BY_MEMBER_GROUP)?;
            let _ = write_txn.open_table(ACLS_BY_MEMBER_IDENTITY)?;
            let _ = write_txn.open_table(SECRETS)?;
            let _ = write_txn.open_table(ATTACHMENTS)?;
            let _ = write_txn.open_table(ATTACHMENTS_BY_GROUP)?;
            let _ = write_txn.open_table(CLASSIFIED_EVENTS)?;
            let _ = write_txn.open_table(CLASSIFIED_BY_TXN)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Start a read-write transaction. Blocks while another one is open.
    pub fn begin_write(&self) -> StoreResult<StoreTxn> {
        Ok(StoreTxn {
            inner: TxnInner::Write(self.db.begin_write()?),
        })
    }

    /// Start a read-only snapshot transaction.
    pub fn begin_read(&self) -> StoreResult<StoreTxn> {
        Ok(StoreTxn {
            inner: TxnInner::Read(self.db.begin_read()?),
        })
    }
}

// =============================================================================
// StoreTxn
// =============================================================================

/// One open redb transaction.
pub struct StoreTxn {
    inner: TxnInner,
}

enum TxnInner {
    Write(WriteTransaction),
    Read(ReadTransaction),
}

/// Open `$def` in whichever kind of transaction `$txn` holds and evaluate
/// `$body` against it.
macro_rules! with_table {
    ($txn:expr, $def:expr, |$table:ident| $body:expr) => {
        match &$txn.inner {
            TxnInner::Write(txn) => {
                let $table = txn.open_table($def)?;
                let out = $body;
                out
            }
            TxnInner::Read(txn) => {
                let $table = txn.open_table($def)?;
                let out = $body;
                out
            }
        }
    };
}

impl StoreTxn {
    pub fn is_read_only(&self) -> bool {
        matches!(self.inner, TxnInner::Read(_))
    }

    /// Make the writes durable. A read transaction is simply released.
    pub fn commit(self) -> StoreResult<()> {
        match self.inner {
            TxnInner::Write(txn) => txn.commit()?,
            TxnInner::Read(_) => {}
        }
        Ok(())
    }

    /// Discard the writes.
    pub fn abort(self) -> StoreResult<()> {
        match self.inner {
            TxnInner::Write(txn) => txn.abort()?,
            TxnInner::Read(_) => {}
        }
        Ok(())
    }

    fn writer(&self) -> StoreResult<&WriteTransaction> {
        match &self.inner {
            TxnInner::Write(txn) => Ok(txn),
            TxnInner::Read(_) => Err(StoreError::ReadOnly),
        }
    }

    fn next_id(&self, sequence: &str) -> StoreResult<u64> {
        let mut sequences = self.writer()?.open_table(SEQUENCES)?;
        let next = sequences.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
        sequences.insert(sequence, next)?;
        Ok(next)
    }

    fn get_record<T: DeserializeOwned>(&self, table: RecordTable, id: u64) -> StoreResult<Option<T>> {
        with_table!(self, table, |records| match records.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        })
    }

    fn put_record<T: Serialize>(&self, table: RecordTable, id: u64, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec(value)?;
        let mut records = self.writer()?.open_table(table)?;
        records.insert(id, json.as_slice())?;
        Ok(())
    }

    fn remove_record(&self, table: RecordTable, id: u64) -> StoreResult<bool> {
        let mut records = self.writer()?.open_table(table)?;
        let removed = records.remove(id)?.is_some();
        Ok(removed)
    }

    /// Second key components of every index entry starting with `prefix`.
    fn index_ids(&self, table: IndexTable, prefix: u64) -> StoreResult<Vec<u64>> {
        with_table!(self, table, |index| {
            let mut ids = Vec::new();
            for entry in index.range((prefix, 0)..=(prefix, u64::MAX))? {
                let (key, _) = entry?;
                ids.push(key.value().1);
            }
            Ok(ids)
        })
    }

    fn link(&self, table: IndexTable, a: u64, b: u64) -> StoreResult<()> {
        let mut index = self.writer()?.open_table(table)?;
        index.insert((a, b), ())?;
        Ok(())
    }

    fn unlink(&self, table: IndexTable, a: u64, b: u64) -> StoreResult<()> {
        let mut index = self.writer()?.open_table(table)?;
        index.remove((a, b))?;
        Ok(())
    }

    fn acls_by_ids(&self, ids: Vec<u64>) -> StoreResult<Vec<Acl>> {
        let mut acls = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(acl) = self.get_record(ACLS, id)? {
                acls.push(acl);
            }
        }
        Ok(acls)
    }

    fn member_index(member: AclMember) -> (IndexTable, u64) {
        match member {
            AclMember::Identity(id) => (ACLS_BY_MEMBER_IDENTITY, id.0),
            AclMember::Group(id) => (ACLS_BY_MEMBER_GROUP, id.0),
        }
    }
}

impl GraphStore for StoreTxn {
    // =========================================================================
    // Identities
    // =========================================================================

    fn identity(&self, id: IdentityId) -> StoreResult<Option<Identity>> {
        self.get_record(IDENTITIES, id.0)
    }

    fn identity_by_name(&self, name: &str) -> StoreResult<Option<Identity>> {
        let id = with_table!(self, IDENTITY_NAMES, |names| names
            .get(name)?
            .map(|v| v.value()));
        match id {
            Some(id) => self.identity(IdentityId(id)),
            None => Ok(None),
        }
    }

    fn insert_identity(&self, identity: NewIdentity) -> StoreResult<Identity> {
        if self.identity_by_name(&identity.name)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "identity name {} is taken",
                identity.name
            )));
        }
        let id = self.next_id("identities")?;
        let identity = Identity {
            id: IdentityId(id),
            name: identity.name,
            encrypted_private_key: identity.encrypted_private_key,
            verified: identity.verified,
        };
        self.put_record(IDENTITIES, id, &identity)?;

        let mut names = self.writer()?.open_table(IDENTITY_NAMES)?;
        names.insert(identity.name.as_str(), id)?;
        Ok(identity)
    }

    fn delete_identity(&self, id: IdentityId) -> StoreResult<bool> {
        let Some(identity) = self.identity(id)? else {
            return Ok(false);
        };
        self.remove_record(IDENTITIES, id.0)?;
        let mut names = self.writer()?.open_table(IDENTITY_NAMES)?;
        names.remove(identity.name.as_str())?;
        Ok(true)
    }

    // =========================================================================
    // Groups
    // =========================================================================

    fn group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        self.get_record(GROUPS, id.0)
    }

    fn insert_group(&self, group: NewGroup) -> StoreResult<Group> {
        let id = self.next_id("groups")?;
        let group = Group {
            id: GroupId(id),
            name: group.name,
            kind: group.kind,
            auto_delete: group.auto_delete,
            public_key: group.public_key,
        };
        self.put_record(GROUPS, id, &group)?;
        Ok(group)
    }

    fn delete_group(&self, id: GroupId) -> StoreResult<bool> {
        self.remove_record(GROUPS, id.0)
    }

    // =========================================================================
    // ACL edges
    // =========================================================================

    fn acl(&self, id: AclId) -> StoreResult<Option<Acl>> {
        self.get_record(ACLS, id.0)
    }

    fn acls_owned_by(&self, group: GroupId) -> StoreResult<Vec<Acl>> {
        let ids = self.index_ids(ACLS_BY_OWNER, group.0)?;
        self.acls_by_ids(ids)
    }

    fn acls_with_member(&self, member: AclMember) -> StoreResult<Vec<Acl>> {
        let (index, key) = Self::member_index(member);
        let ids = self.index_ids(index, key)?;
        self.acls_by_ids(ids)
    }

    fn insert_acl(&self, acl: NewAcl) -> StoreResult<Acl> {
        let id = self.next_id("acls")?;
        let acl = Acl {
            id: AclId(id),
            owner: acl.owner,
            member: acl.member,
            level: acl.level,
            group_key_for_member: acl.group_key_for_member,
        };
        self.put_record(ACLS, id, &acl)?;
        self.link(ACLS_BY_OWNER, acl.owner.0, id)?;
        let (index, key) = Self::member_index(acl.member);
        self.link(index, key, id)?;
        Ok(acl)
    }

    fn update_acl_level(&self, id: AclId, level: AccessLevel) -> StoreResult<Acl> {
        let mut acl: Acl = self
            .acl(id)?
            .ok_or_else(|| StoreError::NotFound(format!("acl {id}")))?;
        acl.level = level;
        self.put_record(ACLS, id.0, &acl)?;
        Ok(acl)
    }

    fn delete_acl(&self, id: AclId) -> StoreResult<bool> {
        let Some(acl) = self.acl(id)? else {
            return Ok(false);
        };
        self.remove_record(ACLS, id.0)?;
        self.unlink(ACLS_BY_OWNER, acl.owner.0, id.0)?;
        let (index, key) = Self::member_index(acl.member);
        self.unlink(index, key, id.0)?;
        Ok(true)
    }

    // =========================================================================
    // Secrets and attachments
    // =========================================================================

    fn secret(&self, id: SecretId) -> StoreResult<Option<Secret>> {
        self.get_record(SECRETS, id.0)
    }

    fn insert_secret(&self, secret: NewSecret) -> StoreResult<Secret> {
        let id = self.next_id("secrets")?;
        let secret = Secret {
            id: SecretId(id),
            client_data: secret.client_data,
            king: secret.king,
        };
        self.put_record(SECRETS, id, &secret)?;
        Ok(secret)
    }

    fn delete_secret(&self, id: SecretId) -> StoreResult<bool> {
        self.remove_record(SECRETS, id.0)
    }

    fn attachments_of_secret(&self, secret: SecretId) -> StoreResult<Vec<SecretAttachment>> {
        with_table!(self, ATTACHMENTS, |attachments| {
            let mut found = Vec::new();
            for entry in attachments.range((secret.0, 0)..=(secret.0, u64::MAX))? {
                let (_, value) = entry?;
                found.push(serde_json::from_slice(value.value())?);
            }
            Ok(found)
        })
    }

    fn attachments_in_group(&self, group: GroupId) -> StoreResult<Vec<SecretAttachment>> {
        let secrets = self.index_ids(ATTACHMENTS_BY_GROUP, group.0)?;
        with_table!(self, ATTACHMENTS, |attachments| {
            let mut found = Vec::with_capacity(secrets.len());
            for secret in &secrets {
                if let Some(value) = attachments.get((*secret, group.0))? {
                    found.push(serde_json::from_slice(value.value())?);
                }
            }
            Ok(found)
        })
    }

    fn put_attachment(&self, attachment: &SecretAttachment) -> StoreResult<()> {
        let json = serde_json::to_vec(attachment)?;
        {
            let mut attachments = self.writer()?.open_table(ATTACHMENTS)?;
            attachments.insert((attachment.secret.0, attachment.group.0), json.as_slice())?;
        }
        self.link(ATTACHMENTS_BY_GROUP, attachment.group.0, attachment.secret.0)
    }

    fn delete_attachment(&self, secret: SecretId, group: GroupId) -> StoreResult<bool> {
        let removed = {
            let mut attachments = self.writer()?.open_table(ATTACHMENTS)?;
            let removed = attachments.remove((secret.0, group.0))?.is_some();
            removed
        };
        self.unlink(ATTACHMENTS_BY_GROUP, group.0, secret.0)?;
        Ok(removed)
    }

    // =========================================================================
    // Classified audit sink
    // =========================================================================

    fn append_classified_event(&self, record: ClassifiedRecord) -> StoreResult<ClassifiedEvent> {
        let id = self.next_id("classified_events")?;
        let key = make_index_key(record.transaction_id.as_str(), id);
        let event = ClassifiedEvent { id, record };
        self.put_record(CLASSIFIED_EVENTS, id, &event)?;

        let mut index = self.writer()?.open_table(CLASSIFIED_BY_TXN)?;
        index.insert(key.as_slice(), ())?;
        Ok(event)
    }

    fn classified_events_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> StoreResult<Vec<ClassifiedEvent>> {
        let prefix = make_prefix(transaction_id.as_str());
        let prefix_end = make_prefix_end(transaction_id.as_str());

        let ids = with_table!(self, CLASSIFIED_BY_TXN, |index| {
            let mut ids = Vec::new();
            for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
                let (key, _) = entry?;
                if let Some(id) = event_id_from_key(key.value()) {
                    ids.push(id);
                }
            }
            ids
        });

        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(event) = self.get_record(CLASSIFIED_EVENTS, id)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn retain_classified_events(
        &self,
        transaction_id: &TransactionId,
        keep: &dyn Fn(&ClassifiedEvent) -> bool,
    ) -> StoreResult<usize> {
        let doomed: Vec<u64> = self
            .classified_events_for_transaction(transaction_id)?
            .into_iter()
            .filter(|event| !keep(event))
            .map(|event| event.id)
            .collect();

        for id in &doomed {
            self.remove_record(CLASSIFIED_EVENTS, *id)?;
            let key = make_index_key(transaction_id.as_str(), *id);
            let mut index = self.writer()?.open_table(CLASSIFIED_BY_TXN)?;
            index.remove(key.as_slice())?;
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Category;
    use crate::models::{GroupKind, NewGroup};

    fn temp_db() -> (GraphDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = GraphDatabase::open(&dir.path().join("graph.redb")).unwrap();
        (db, dir)
    }

    fn new_acl(owner: GroupId, member: AclMember, level: AccessLevel) -> NewAcl {
        NewAcl {
            owner,
            member,
            level,
            group_key_for_member: String::new(),
        }
    }

    #[test]
    fn identity_names_are_unique() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let alice = txn.insert_identity(NewIdentity::new("alice@example.com")).unwrap();
        assert_eq!(
            txn.identity_by_name("alice@example.com").unwrap().unwrap().id,
            alice.id
        );

        let dup = txn.insert_identity(NewIdentity::new("alice@example.com"));
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        assert!(txn.delete_identity(alice.id).unwrap());
        assert!(txn.identity_by_name("alice@example.com").unwrap().is_none());
        txn.commit().unwrap();
    }

    #[test]
    fn acl_indexes_follow_inserts_and_deletes() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let alice = txn.insert_identity(NewIdentity::new("alice@example.com")).unwrap();
        let team = txn.insert_group(NewGroup::named("team")).unwrap();
        let sub = txn.insert_group(NewGroup::named("sub")).unwrap();

        let to_alice = txn
            .insert_acl(new_acl(team.id, AclMember::Identity(alice.id), AccessLevel::Admin))
            .unwrap();
        let to_sub = txn
            .insert_acl(new_acl(team.id, AclMember::Group(sub.id), AccessLevel::Readonly))
            .unwrap();

        let owned = txn.acls_owned_by(team.id).unwrap();
        assert_eq!(owned, vec![to_alice.clone(), to_sub.clone()]);
        assert_eq!(
            txn.acls_with_member(AclMember::Group(sub.id)).unwrap(),
            vec![to_sub.clone()]
        );

        let updated = txn.update_acl_level(to_sub.id, AccessLevel::Admin).unwrap();
        assert_eq!(updated.level, AccessLevel::Admin);

        assert!(txn.delete_acl(to_alice.id).unwrap());
        assert!(txn
            .acls_with_member(AclMember::Identity(alice.id))
            .unwrap()
            .is_empty());
        assert_eq!(txn.acls_owned_by(team.id).unwrap().len(), 1);
        txn.commit().unwrap();
    }

    #[test]
    fn attachments_are_indexed_both_ways() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let g1 = txn.insert_group(NewGroup::named("one")).unwrap();
        let g2 = txn.insert_group(NewGroup::named("two")).unwrap();
        let secret = txn
            .insert_secret(NewSecret {
                client_data: "example.com".to_string(),
                king: None,
            })
            .unwrap();

        for group in [g1.id, g2.id] {
            txn.put_attachment(&SecretAttachment {
                secret: secret.id,
                group,
                encrypted_payload: format!("blob-{group}"),
            })
            .unwrap();
        }

        assert_eq!(txn.attachments_of_secret(secret.id).unwrap().len(), 2);
        let in_g2 = txn.attachments_in_group(g2.id).unwrap();
        assert_eq!(in_g2.len(), 1);
        assert_eq!(in_g2[0].encrypted_payload, "blob-2");

        assert!(txn.delete_attachment(secret.id, g1.id).unwrap());
        assert!(!txn.delete_attachment(secret.id, g1.id).unwrap());
        assert!(txn.attachments_in_group(g1.id).unwrap().is_empty());
        txn.commit().unwrap();
    }

    #[test]
    fn aborted_writes_are_discarded() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let group = txn.insert_group(NewGroup::organization("acme")).unwrap();
        assert_eq!(group.kind, GroupKind::TopLevelOrganization);
        txn.abort().unwrap();

        let read = db.begin_read().unwrap();
        assert!(read.group(group.id).unwrap().is_none());
    }

    #[test]
    fn read_transactions_reject_writes() {
        let (db, _dir) = temp_db();
        let read = db.begin_read().unwrap();
        assert!(read.is_read_only());
        let result = read.insert_group(NewGroup::named("nope"));
        assert!(matches!(result, Err(StoreError::ReadOnly)));
    }

    #[test]
    fn classified_events_are_scoped_to_transactions() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let t1 = TransactionId::from("t1");
        let t2 = TransactionId::from("t2");

        let grant = ClassifiedRecord::access_change(true, IdentityId(1), IdentityId(2), SecretId(3), t1.clone());
        txn.append_classified_event(grant).unwrap();
        let mut other = ClassifiedRecord::access_change(false, IdentityId(1), IdentityId(2), SecretId(3), t1.clone());
        other.category = Category::EditGroup;
        txn.append_classified_event(other).unwrap();
        txn.append_classified_event(ClassifiedRecord::access_change(
            true,
            IdentityId(5),
            IdentityId(6),
            SecretId(7),
            t2.clone(),
        ))
        .unwrap();

        assert_eq!(txn.classified_events_for_transaction(&t1).unwrap().len(), 2);

        let deleted = txn
            .retain_classified_events(&t1, &|event| event.record.category.is_access_change())
            .unwrap();
        assert_eq!(deleted, 1);
        let left = txn.classified_events_for_transaction(&t1).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record.category, Category::GrantedAccessTo);
        assert_eq!(txn.classified_events_for_transaction(&t2).unwrap().len(), 1);
        txn.commit().unwrap();
    }

    #[test]
    fn composite_keys_round_trip_event_ids() {
        let key = make_index_key("abc", 42);
        assert!(key.starts_with(&make_prefix("abc")));
        assert!(key.as_slice() < make_prefix_end("abc").as_slice());
        assert_eq!(event_id_from_key(&key), Some(42));
        assert_eq!(event_id_from_key(b"short"), None);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test helpers shared by the access tests.

use std::sync::Arc;

use super::{mutations, AccessLevel, AuthenticatedAccess};
use crate::models::{AclMember, AclRequest, GroupId, IdentityId, NewGroup, NewIdentity, TransactionId};
use crate::storage::{AuditLog, GraphDatabase, GraphStore};
use crate::transaction::{Transaction, TxnMode};

pub(crate) struct Fixture {
    pub db: GraphDatabase,
    pub log: Arc<AuditLog>,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = GraphDatabase::open(&dir.path().join("graph.redb")).unwrap();
        let log = Arc::new(AuditLog::open(&dir.path().join("audit.redb")).unwrap());
        Self { db, log, _dir: dir }
    }

    pub fn begin(&self) -> Transaction {
        Transaction::new(
            TransactionId::generate(),
            TxnMode::ReadWrite,
            self.db.begin_write().unwrap(),
            self.log.clone(),
        )
    }

    pub fn signup(&self, txn: &mut Transaction, name: &str) -> IdentityId {
        mutations::create_identity(txn, NewIdentity::new(name)).unwrap().0.id
    }

    pub fn organization(&self, txn: &mut Transaction, admin: IdentityId, name: &str, members: &[IdentityId]) -> GroupId {
        AuthenticatedAccess::new(txn, admin)
            .create_organization(name, &[admin], members)
            .unwrap()
            .id
    }

    /// A shared group belonging to `org`, created by one of its admins.
    pub fn org_group(&self, txn: &mut Transaction, admin: IdentityId, org: GroupId, name: &str) -> GroupId {
        AuthenticatedAccess::new(txn, admin)
            .save_new_group_with_acls(
                Some(NewGroup::named(name)),
                vec![Some(AclRequest::group(org, AccessLevel::Admin))],
            )
            .unwrap()
            .id
    }

    /// The private group through which `identity` belongs to `org`.
    pub fn org_private_group(&self, txn: &Transaction, org: GroupId, identity: IdentityId) -> GroupId {
        let store = txn.store().unwrap();
        store
            .acls_with_member(AclMember::Group(org))
            .unwrap()
            .into_iter()
            .map(|acl| acl.owner)
            .find(|group| {
                store.group(*group).unwrap().unwrap().is_private_user_group()
                    && store
                        .acls_owned_by(*group)
                        .unwrap()
                        .iter()
                        .any(|acl| acl.member == AclMember::Identity(identity))
            })
            .unwrap()
    }

    /// The private group created at signup.
    pub fn private_group_of(&self, txn: &Transaction, identity: IdentityId) -> GroupId {
        let store = txn.store().unwrap();
        store
            .acls_with_member(AclMember::Identity(identity))
            .unwrap()
            .into_iter()
            .map(|acl| acl.owner)
            .find(|group| store.group(*group).unwrap().unwrap().is_private_user_group())
            .unwrap()
    }
}

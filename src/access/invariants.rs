// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Checks that keep every secret administered.
//!
//! A secret must always be administered by at least one existing identity
//! reachable through ADMIN edges from one of the groups it is attached to.
//! Mutations that can cut the last such path (removing a member, editing or
//! deleting a group, unsharing) describe what they are about to change as
//! [`PendingChanges`] and call [`verify_secrets_after`] before writing
//! anything, so a rejected mutation leaves the store untouched.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::AccessLevel;
use crate::error::{EngineError, EngineResult};
use crate::models::{Acl, AclId, AclMember, GroupId, IdentityId, SecretId};
use crate::storage::GraphStore;

/// Edge and attachment changes a mutation is about to make, overlaid on the
/// stored graph.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    removed: BTreeSet<AclId>,
    levels: BTreeMap<AclId, AccessLevel>,
    added: Vec<(GroupId, AclMember, AccessLevel)>,
    detached: BTreeSet<(SecretId, GroupId)>,
}

impl PendingChanges {
    pub fn remove_acl(&mut self, acl: &Acl) {
        self.removed.insert(acl.id);
    }

    pub fn set_level(&mut self, acl: &Acl, level: AccessLevel) {
        self.levels.insert(acl.id, level);
    }

    pub fn add_acl(&mut self, owner: GroupId, member: AclMember, level: AccessLevel) {
        self.added.push((owner, member, level));
    }

    pub fn detach(&mut self, secret: SecretId, group: GroupId) {
        self.detached.insert((secret, group));
    }

    /// Members of `group` and their levels once the changes are applied.
    fn members_of<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        group: GroupId,
    ) -> EngineResult<Vec<(AclMember, AccessLevel)>> {
        let mut members: Vec<_> = store
            .acls_owned_by(group)?
            .into_iter()
            .filter(|acl| !self.removed.contains(&acl.id))
            .map(|acl| (acl.member, self.levels.get(&acl.id).copied().unwrap_or(acl.level)))
            .collect();
        members.extend(
            self.added
                .iter()
                .filter(|(owner, _, _)| *owner == group)
                .map(|(_, member, level)| (*member, *level)),
        );
        Ok(members)
    }

    /// Identities reached from `group` through ADMIN edges only.
    fn admin_reach<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        group: GroupId,
    ) -> EngineResult<BTreeSet<IdentityId>> {
        let mut identities = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([group]);
        while let Some(next) = queue.pop_front() {
            if !visited.insert(next) {
                continue;
            }
            for (member, level) in self.members_of(store, next)? {
                if level != AccessLevel::Admin {
                    continue;
                }
                match member {
                    AclMember::Identity(id) => {
                        identities.insert(id);
                    }
                    AclMember::Group(id) => queue.push_back(id),
                }
            }
        }
        Ok(identities)
    }
}

/// Existing identities that administer `group` through ADMIN edges.
pub fn group_administrators<S: GraphStore + ?Sized>(
    store: &S,
    group: GroupId,
) -> EngineResult<BTreeSet<IdentityId>> {
    let mut admins = BTreeSet::new();
    for identity in PendingChanges::default().admin_reach(store, group)? {
        if store.identity(identity)?.is_some() {
            admins.insert(identity);
        }
    }
    Ok(admins)
}

/// Identities administering `secret`, ignoring edges to deleted identities.
pub fn administrators_of<S: GraphStore + ?Sized>(
    store: &S,
    secret: SecretId,
) -> EngineResult<BTreeSet<IdentityId>> {
    administrators_after(store, secret, &PendingChanges::default())
}

/// Identities that would administer `secret` once `changes` are applied.
pub fn administrators_after<S: GraphStore + ?Sized>(
    store: &S,
    secret: SecretId,
    changes: &PendingChanges,
) -> EngineResult<BTreeSet<IdentityId>> {
    let mut admins = BTreeSet::new();
    for attachment in store.attachments_of_secret(secret)? {
        if changes.detached.contains(&(secret, attachment.group)) {
            continue;
        }
        for identity in changes.admin_reach(store, attachment.group)? {
            if store.identity(identity)?.is_some() {
                admins.insert(identity);
            }
        }
    }
    Ok(admins)
}

pub fn verify_has_administrator<S: GraphStore + ?Sized>(
    store: &S,
    secret: SecretId,
) -> EngineResult<()> {
    verify_secrets_after(store, [secret], &PendingChanges::default())
}

/// Verify every secret in `secrets`, stopping at the first failure.
pub fn verify_secrets<S, I>(store: &S, secrets: I) -> EngineResult<()>
where
    S: GraphStore + ?Sized,
    I: IntoIterator<Item = SecretId>,
{
    verify_secrets_after(store, secrets, &PendingChanges::default())
}

/// Verify every secret in `secrets` as it would be once `changes` are
/// applied, stopping at the first failure.
pub fn verify_secrets_after<S, I>(store: &S, secrets: I, changes: &PendingChanges) -> EngineResult<()>
where
    S: GraphStore + ?Sized,
    I: IntoIterator<Item = SecretId>,
{
    for secret in secrets {
        if store.secret(secret)?.is_none() {
            return Err(EngineError::invalid(format!("secret {secret} does not exist")));
        }
        if administrators_after(store, secret, changes)?.is_empty() {
            return Err(EngineError::Invariant(format!("secret {secret} is orphaned")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AclMember, GroupId, NewAcl, NewGroup, NewIdentity, NewSecret, SecretAttachment};
    use crate::storage::{GraphDatabase, StoreTxn};

    /// Callers open their write transaction after binding the database so
    /// that it is dropped first.
    fn temp_db() -> (GraphDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = GraphDatabase::open(&dir.path().join("graph.redb")).unwrap();
        (db, dir)
    }

    fn secret_in(txn: &StoreTxn, group: GroupId) -> SecretId {
        let secret = txn
            .insert_secret(NewSecret {
                client_data: "example.com".to_string(),
                king: None,
            })
            .unwrap()
            .id;
        txn.put_attachment(&SecretAttachment {
            secret,
            group,
            encrypted_payload: String::new(),
        })
        .unwrap();
        secret
    }

    fn edge(txn: &StoreTxn, owner: GroupId, member: AclMember, level: AccessLevel) {
        txn.insert_acl(NewAcl {
            owner,
            member,
            level,
            group_key_for_member: String::new(),
        })
        .unwrap();
    }

    #[test]
    fn secret_in_empty_group_is_orphaned() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let group = txn.insert_group(NewGroup::named("empty")).unwrap().id;
        let secret = secret_in(&txn, group);

        let err = verify_has_administrator(&txn, secret).unwrap_err();
        assert!(matches!(err, EngineError::Invariant(msg) if msg == format!("secret {secret} is orphaned")));
    }

    #[test]
    fn readonly_members_do_not_administer() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let reader = txn.insert_identity(NewIdentity::new("reader@example.com")).unwrap().id;
        let group = txn.insert_group(NewGroup::named("g")).unwrap().id;
        edge(&txn, group, AclMember::Identity(reader), AccessLevel::Readonly);
        let secret = secret_in(&txn, group);

        assert!(verify_has_administrator(&txn, secret).is_err());
    }

    #[test]
    fn admin_through_nested_group_counts() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let admin = txn.insert_identity(NewIdentity::new("admin@example.com")).unwrap().id;
        let outer = txn.insert_group(NewGroup::named("outer")).unwrap().id;
        let inner = txn.insert_group(NewGroup::named("inner")).unwrap().id;
        edge(&txn, outer, AclMember::Group(inner), AccessLevel::Admin);
        edge(&txn, inner, AclMember::Identity(admin), AccessLevel::Admin);
        let secret = secret_in(&txn, outer);

        verify_secrets(&txn, [secret]).unwrap();
        assert_eq!(administrators_of(&txn, secret).unwrap(), BTreeSet::from([admin]));
    }

    #[test]
    fn deleted_admins_are_ignored() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let admin = txn.insert_identity(NewIdentity::new("gone@example.com")).unwrap().id;
        let group = txn.insert_group(NewGroup::named("g")).unwrap().id;
        edge(&txn, group, AclMember::Identity(admin), AccessLevel::Admin);
        let secret = secret_in(&txn, group);
        verify_has_administrator(&txn, secret).unwrap();

        txn.delete_identity(admin).unwrap();
        assert!(matches!(
            verify_has_administrator(&txn, secret),
            Err(EngineError::Invariant(_))
        ));
    }

    #[test]
    fn pending_changes_are_seen_without_writing() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let alice = txn.insert_identity(NewIdentity::new("alice@example.com")).unwrap().id;
        let bob = txn.insert_identity(NewIdentity::new("bob@example.com")).unwrap().id;
        let group = txn.insert_group(NewGroup::named("g")).unwrap().id;
        edge(&txn, group, AclMember::Identity(alice), AccessLevel::Admin);
        edge(&txn, group, AclMember::Identity(bob), AccessLevel::Readonly);
        let secret = secret_in(&txn, group);
        let acls = txn.acls_owned_by(group).unwrap();
        let alice_edge = acls.iter().find(|acl| acl.member == AclMember::Identity(alice)).unwrap();
        let bob_edge = acls.iter().find(|acl| acl.member == AclMember::Identity(bob)).unwrap();

        let mut changes = PendingChanges::default();
        changes.remove_acl(alice_edge);
        assert!(matches!(
            verify_secrets_after(&txn, [secret], &changes),
            Err(EngineError::Invariant(_))
        ));

        changes.set_level(bob_edge, AccessLevel::Admin);
        verify_secrets_after(&txn, [secret], &changes).unwrap();
        assert_eq!(administrators_after(&txn, secret, &changes).unwrap(), BTreeSet::from([bob]));

        let mut detached = PendingChanges::default();
        detached.detach(secret, group);
        assert!(administrators_after(&txn, secret, &detached).unwrap().is_empty());

        // the store itself is untouched
        assert_eq!(administrators_of(&txn, secret).unwrap(), BTreeSet::from([alice]));
        assert_eq!(txn.acls_owned_by(group).unwrap().len(), 2);
    }

    #[test]
    fn added_admin_edges_are_followed() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let admin = txn.insert_identity(NewIdentity::new("admin@example.com")).unwrap().id;
        let outer = txn.insert_group(NewGroup::named("outer")).unwrap().id;
        let inner = txn.insert_group(NewGroup::named("inner")).unwrap().id;
        edge(&txn, inner, AclMember::Identity(admin), AccessLevel::Admin);
        let secret = secret_in(&txn, outer);
        assert!(group_administrators(&txn, outer).unwrap().is_empty());

        let mut changes = PendingChanges::default();
        changes.add_acl(outer, AclMember::Group(inner), AccessLevel::Admin);
        assert_eq!(administrators_after(&txn, secret, &changes).unwrap(), BTreeSet::from([admin]));
    }

    #[test]
    fn missing_secret_is_invalid() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        assert!(matches!(
            verify_has_administrator(&txn, SecretId(404)),
            Err(EngineError::InvalidRequest(_))
        ));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorized mutations.
//!
//! Each mutation authorizes through [`AuthenticatedAccess`], checks the
//! secret invariant against the changes it is about to make, snapshots the
//! identities whose visible secrets it may change, writes, and appends raw
//! audit events. A rejected mutation writes nothing.

use std::collections::BTreeSet;

use super::authenticated::AuthenticatedAccess;
use super::invariants::{self, PendingChanges};
use super::AccessLevel;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AclMember, Group, GroupId, Identity, IdentityId, NewGroup, NewIdentity, NewSecret, Secret,
    SecretAttachment, SecretId,
};
use crate::storage::{GraphStore, RawAction, StoreError};
use crate::transaction::{AuditTarget, Transaction};

/// Create an identity and its private group.
///
/// When the transaction has no requestor yet, the new identity becomes it.
pub fn create_identity(txn: &mut Transaction, identity: NewIdentity) -> EngineResult<(Identity, Group)> {
    let (created, private) = insert_identity_with_private_group(txn, identity)?;
    if txn.requestor().is_none() {
        txn.set_requestor(created.id);
    }
    txn.add_audit_log(RawAction::CreateIdentity, AuditTarget::identity(created.id))?;
    Ok((created, private))
}

fn insert_identity_with_private_group(
    txn: &Transaction,
    identity: NewIdentity,
) -> EngineResult<(Identity, Group)> {
    let store = txn.store()?;
    let created = match store.insert_identity(identity) {
        Ok(created) => created,
        Err(StoreError::Conflict(_)) => return Err(EngineError::invalid("identity already exists")),
        Err(e) => return Err(e.into()),
    };
    let private = store.insert_group(NewGroup::private_user_group())?;
    super::AccessGraph::new(store).add_membership(
        private.id,
        AclMember::Identity(created.id),
        AccessLevel::Admin,
        "",
    )?;
    Ok((created, private))
}

impl AuthenticatedAccess<'_> {
    /// Create an unverified identity on behalf of the requestor.
    pub fn invite_identity(&mut self, name: &str) -> EngineResult<Identity> {
        let (invitee, private) = insert_identity_with_private_group(self.txn, NewIdentity::new(name))?;
        self.txn.add_audit_log(
            RawAction::InviteNewUser,
            AuditTarget::identity(invitee.id).and_group(private.id),
        )?;
        Ok(invitee)
    }

    /// Create a private group holding only the requestor.
    pub fn create_private_group(&mut self) -> EngineResult<Group> {
        let graph = self.graph()?;
        let group = graph.store().insert_group(NewGroup::private_user_group())?;
        graph.add_membership(group.id, AclMember::Identity(self.identity()), AccessLevel::Admin, "")?;
        self.txn
            .add_audit_log(RawAction::AddGroup, AuditTarget::group(group.id))?;
        Ok(group)
    }

    /// Create an organization administered by `admins`, each of `members`
    /// joining through a private group that belongs to it.
    pub fn create_organization(
        &mut self,
        name: &str,
        admins: &[IdentityId],
        members: &[IdentityId],
    ) -> EngineResult<Group> {
        if name.is_empty() {
            return Err(EngineError::invalid("organization name must not be empty"));
        }
        if !admins.contains(&self.identity()) {
            return Err(EngineError::invalid("requestor must administer the group"));
        }
        let everyone: BTreeSet<IdentityId> = admins.iter().chain(members).copied().collect();
        {
            let store = self.store()?;
            for id in &everyone {
                if store.identity(*id)?.is_none() {
                    return Err(EngineError::invalid("some identities do not exist"));
                }
            }
        }

        let graph = self.graph()?;
        let org = graph.store().insert_group(NewGroup::organization(name))?;
        for admin in admins.iter().copied().collect::<BTreeSet<_>>() {
            graph.add_membership(org.id, AclMember::Identity(admin), AccessLevel::Admin, "")?;
        }
        for member in members.iter().copied().collect::<BTreeSet<_>>() {
            let private = graph.store().insert_group(NewGroup::private_user_group())?;
            graph.add_membership(private.id, AclMember::Identity(member), AccessLevel::Admin, "")?;
            graph.add_membership(private.id, AclMember::Group(org.id), AccessLevel::Admin, "")?;
        }
        self.txn
            .add_audit_log(RawAction::CreateOrganization, AuditTarget::group(org.id))?;
        Ok(org)
    }

    /// Create a secret stored in `group`.
    pub fn add_secret(
        &mut self,
        group: GroupId,
        client_data: &str,
        encrypted_payload: &str,
    ) -> EngineResult<Secret> {
        self.get_group_for_add_secret(group)?;
        if invariants::group_administrators(self.store()?, group)?.is_empty() {
            return Err(EngineError::Invariant(format!(
                "secret would be orphaned in group {group}"
            )));
        }
        self.txn.track_group(group)?;

        let store = self.store()?;
        let secret = store.insert_secret(NewSecret {
            client_data: client_data.to_string(),
            king: Some(self.identity()),
        })?;
        store.put_attachment(&SecretAttachment {
            secret: secret.id,
            group,
            encrypted_payload: encrypted_payload.to_string(),
        })?;

        self.txn.add_audit_log(
            RawAction::AddSecret,
            AuditTarget::secret(secret.id).and_group(group),
        )?;
        Ok(secret)
    }

    /// Attach `secret` to `group`, replacing the payload if it is already
    /// there. A secret never spans two organizations.
    pub fn share_secret(
        &mut self,
        secret: SecretId,
        group: GroupId,
        encrypted_payload: &str,
    ) -> EngineResult<()> {
        self.get_secret_for_edit(secret)?;
        self.get_group_for_add_secret(group)?;

        {
            let graph = self.graph()?;
            let mut orgs = BTreeSet::new();
            for attachment in graph.store().attachments_of_secret(secret)? {
                orgs.extend(graph.organization_of_group(attachment.group)?);
            }
            orgs.extend(graph.organization_of_group(group)?);
            if orgs.len() > 1 {
                return Err(EngineError::invalid(
                    "secret cannot be shared across organizations",
                ));
            }
        }

        self.txn.track_group(group)?;
        self.store()?.put_attachment(&SecretAttachment {
            secret,
            group,
            encrypted_payload: encrypted_payload.to_string(),
        })?;
        self.txn.add_audit_log(
            RawAction::EditSecret,
            AuditTarget::secret(secret).and_group(group),
        )?;
        Ok(())
    }

    /// Detach `secret` from `group`. The secret is deleted with its last
    /// attachment.
    pub fn unshare_secret(&mut self, secret: SecretId, group: GroupId) -> EngineResult<()> {
        self.get_secret_for_edit(secret)?;

        let attachments = self.store()?.attachments_of_secret(secret)?;
        if !attachments.iter().any(|attachment| attachment.group == group) {
            return Err(EngineError::invalid(format!(
                "secret {secret} is not shared with group {group}"
            )));
        }
        let last = attachments.len() == 1;
        if !last {
            let mut changes = PendingChanges::default();
            changes.detach(secret, group);
            invariants::verify_secrets_after(self.store()?, [secret], &changes)?;
        }
        self.txn.track_secret(secret)?;

        let store = self.store()?;
        store.delete_attachment(secret, group)?;
        if last {
            store.delete_secret(secret)?;
            self.txn.add_audit_log(
                RawAction::RemoveSecret,
                AuditTarget::secret(secret).and_group(group),
            )?;
            return Ok(());
        }
        self.txn.add_audit_log(
            RawAction::EditSecret,
            AuditTarget::secret(secret).and_group(group),
        )?;
        Ok(())
    }

    /// Delete a group with its edges and attachments.
    ///
    /// Secrets left without attachments are deleted; the rest must keep an
    /// administrator.
    pub fn delete_group(&mut self, group: GroupId) -> EngineResult<()> {
        let record = self.get_group_for_management(group)?;
        if record.is_private_user_group() {
            return Err(EngineError::invalid("private groups cannot be deleted"));
        }

        let store = self.store()?;
        let owned = store.acls_owned_by(group)?;
        let containing = store.acls_with_member(AclMember::Group(group))?;
        let attachments = store.attachments_in_group(group)?;

        let mut changes = PendingChanges::default();
        for acl in owned.iter().chain(&containing) {
            changes.remove_acl(acl);
        }
        let mut doomed = BTreeSet::new();
        let mut checked = BTreeSet::new();
        for attachment in &attachments {
            changes.detach(attachment.secret, group);
            if store.attachments_of_secret(attachment.secret)?.len() == 1 {
                doomed.insert(attachment.secret);
            } else {
                checked.insert(attachment.secret);
            }
        }
        for acl in &containing {
            checked.extend(self.secrets_at_or_above(acl.owner)?);
        }
        invariants::verify_secrets_after(store, checked.difference(&doomed).copied(), &changes)?;

        // owners keep their own users; only members of the group lose access
        self.txn.track_group(group)?;

        let store = self.store()?;
        for acl in owned.iter().chain(&containing) {
            store.delete_acl(acl.id)?;
        }
        for attachment in &attachments {
            store.delete_attachment(attachment.secret, group)?;
            if doomed.contains(&attachment.secret) {
                store.delete_secret(attachment.secret)?;
            }
        }
        store.delete_group(group)?;

        self.txn.add_audit_log(RawAction::ModifyGroup, AuditTarget::group(group))?;
        Ok(())
    }

    /// Remove one member from a group the requestor manages.
    pub fn remove_member(&mut self, group: GroupId, member: AclMember) -> EngineResult<()> {
        let record = self.get_group_for_management(group)?;
        if record.is_private_user_group() {
            return Err(EngineError::invalid("private groups cannot be edited"));
        }
        let acl = self
            .graph()?
            .edge(group, member)?
            .ok_or_else(|| EngineError::invalid(format!("{member} is not a member of group {group}")))?;
        let mut changes = PendingChanges::default();
        changes.remove_acl(&acl);
        invariants::verify_secrets_after(self.store()?, self.secrets_at_or_above(group)?, &changes)?;

        self.txn.track_group(group)?;
        match member {
            AclMember::Identity(id) => self.txn.track_identities([id])?,
            AclMember::Group(id) => self.txn.track_group(id)?,
        }
        self.store()?.delete_acl(acl.id)?;

        let target = match member {
            AclMember::Identity(id) => AuditTarget::identity(id).and_group(group),
            AclMember::Group(_) => AuditTarget::group(group),
        };
        self.txn.add_audit_log(RawAction::ModifyGroup, target)?;
        Ok(())
    }
}

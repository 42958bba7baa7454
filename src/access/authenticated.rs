// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-identity authorization.
//!
//! [`AuthenticatedAccess`] binds one requesting identity to one open
//! transaction. Its `get_*` methods either return the resolved record or a
//! [`EngineError::Permission`]; the ones returning `Option` leave the choice
//! to the caller. Permission messages never say whether the record exists.

use std::collections::BTreeSet;

use super::graph::{AccessGraph, Direction, Node};
use super::invariants::{self, PendingChanges};
use super::AccessLevel;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AclMember, AclRequest, Group, GroupId, IdentityId, NewGroup, Secret, SecretId,
};
use crate::storage::{GraphStore, RawAction, StoreTxn};
use crate::transaction::{AuditTarget, Transaction};

/// A validated membership batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Membership {
    pub member: AclMember,
    pub level: AccessLevel,
    pub group_key_for_member: String,
}

pub struct AuthenticatedAccess<'t> {
    pub(crate) txn: &'t mut Transaction,
    identity: IdentityId,
}

impl<'t> AuthenticatedAccess<'t> {
    /// Bind `identity` to `txn` and make it the transaction's requestor.
    pub fn new(txn: &'t mut Transaction, identity: IdentityId) -> Self {
        txn.set_requestor(identity);
        Self { txn, identity }
    }

    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    pub fn transaction(&self) -> &Transaction {
        self.txn
    }

    pub(crate) fn store(&self) -> EngineResult<&StoreTxn> {
        self.txn.store()
    }

    pub(crate) fn graph(&self) -> EngineResult<AccessGraph<'_, StoreTxn>> {
        Ok(AccessGraph::new(self.txn.store()?))
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    pub fn get_organization_as_admin(&self, org: GroupId) -> EngineResult<Group> {
        let graph = self.graph()?;
        match graph.store().group(org)? {
            Some(group)
                if group.is_top_level_organization()
                    && graph.is_organization_admin(self.identity, org)? =>
            {
                Ok(group)
            }
            _ => Err(EngineError::permission("not org or no access")),
        }
    }

    pub fn get_organization_as_member(&self, org: GroupId) -> EngineResult<Group> {
        let graph = self.graph()?;
        match graph.store().group(org)? {
            Some(group) if group.is_top_level_organization() && self.is_member_of_org(&graph, org)? => {
                Ok(group)
            }
            _ => Err(EngineError::permission("not org or no access")),
        }
    }

    fn is_member_of_org(&self, graph: &AccessGraph<'_, StoreTxn>, org: GroupId) -> EngineResult<bool> {
        Ok(graph.is_organization_admin(self.identity, org)?
            || graph.organizations_of(self.identity)?.contains(&org))
    }

    /// Every organization the identity administers or belongs to.
    pub fn organizations(&self) -> EngineResult<Vec<Group>> {
        let graph = self.graph()?;
        let mut ids = graph.organizations_of(self.identity)?;
        ids.extend(graph.administered_organizations(self.identity)?);

        let mut orgs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = graph.store().group(id)? {
                orgs.push(group);
            }
        }
        Ok(orgs)
    }

    // =========================================================================
    // Groups
    // =========================================================================

    pub fn get_group_or_org(&self, group: GroupId) -> EngineResult<Group> {
        let graph = self.graph()?;
        let Some(record) = graph.store().group(group)? else {
            return Err(EngineError::permission("not in group"));
        };
        if graph.can_reach_group(self.identity, group, AccessLevel::ALL)? {
            return Ok(record);
        }
        if record.is_top_level_organization() {
            if self.is_member_of_org(&graph, group)? {
                return Ok(record);
            }
            return Err(EngineError::permission("not member of org"));
        }
        Err(EngineError::permission("not in group"))
    }

    /// The group if the identity is one of its users, or administers the
    /// organization it belongs to. An organization's own group is only
    /// returned to its users.
    pub fn get_group_as_user_or_org_admin(&self, group: GroupId) -> EngineResult<Option<Group>> {
        let graph = self.graph()?;
        let Some(record) = graph.store().group(group)? else {
            return Ok(None);
        };
        if graph.can_reach_group(self.identity, group, AccessLevel::ALL)? {
            return Ok(Some(record));
        }
        if record.is_top_level_organization() {
            return Ok(None);
        }
        match graph.organization_of_group(group)? {
            Some(org) if graph.is_organization_admin(self.identity, org)? => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// The group if the identity may attach secrets to it.
    ///
    /// Besides its users, members of the group's organization may add to
    /// shared organization groups. Another member's private group is only
    /// open to organization admins.
    pub fn get_group_for_add_secret(&self, group: GroupId) -> EngineResult<Group> {
        match self.get_group_or_org(group) {
            Ok(record) => return Ok(record),
            Err(EngineError::Permission(_)) => {}
            Err(e) => return Err(e),
        }

        let graph = self.graph()?;
        let denied = || EngineError::permission("should not be able to see group");
        let record = graph.store().group(group)?.ok_or_else(denied)?;
        let Some(org) = graph.organization_of_group(group)? else {
            return Err(denied());
        };

        let allowed = if record.is_private_user_group() {
            graph.is_organization_admin(self.identity, org)?
        } else {
            self.is_member_of_org(&graph, org)?
        };
        if allowed {
            Ok(record)
        } else {
            Err(denied())
        }
    }

    /// The group if the identity may change its membership: ADMIN reach as a
    /// user, or admin of the organization it belongs to.
    pub(crate) fn get_group_for_management(&self, group: GroupId) -> EngineResult<Group> {
        let graph = self.graph()?;
        let denied = || EngineError::permission("no access to group");
        let record = graph.store().group(group)?.ok_or_else(denied)?;
        if graph.can_reach_group(self.identity, group, AccessLevel::ADMIN_ONLY)? {
            return Ok(record);
        }
        if self.is_org_admin_of_group(&graph, group)? {
            return Ok(record);
        }
        Err(denied())
    }

    fn is_org_admin_of_group(&self, graph: &AccessGraph<'_, StoreTxn>, group: GroupId) -> EngineResult<bool> {
        match graph.organization_of_group(group)? {
            Some(org) => graph.is_organization_admin(self.identity, org),
            None => Ok(false),
        }
    }

    // =========================================================================
    // Secrets
    // =========================================================================

    pub fn get_secret_as_user(&self, secret: SecretId) -> EngineResult<Option<Secret>> {
        self.get_secret_as_user_with_levels(secret, AccessLevel::ALL)
    }

    /// The secret if one of its groups is reachable through edges in `levels`.
    pub fn get_secret_as_user_with_levels(
        &self,
        secret: SecretId,
        levels: &[AccessLevel],
    ) -> EngineResult<Option<Secret>> {
        let graph = self.graph()?;
        let Some(record) = graph.store().secret(secret)? else {
            return Ok(None);
        };
        let reachable = graph.user_reachable_groups(self.identity, levels)?;
        for attachment in graph.store().attachments_of_secret(secret)? {
            if reachable.contains(&attachment.group) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// The secret if it is attached to an organization the identity
    /// administers, or to a group of one.
    pub fn get_secret_as_org_admin(&self, secret: SecretId) -> EngineResult<Option<Secret>> {
        let graph = self.graph()?;
        let Some(record) = graph.store().secret(secret)? else {
            return Ok(None);
        };
        for attachment in graph.store().attachments_of_secret(secret)? {
            if self.is_org_admin_of_group(&graph, attachment.group)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn get_secret_as_user_or_admin(&self, secret: SecretId) -> EngineResult<Option<Secret>> {
        match self.get_secret_as_user(secret)? {
            Some(record) => Ok(Some(record)),
            None => self.get_secret_as_org_admin(secret),
        }
    }

    /// The secret if the identity may change it or its sharing.
    pub(crate) fn get_secret_for_edit(&self, secret: SecretId) -> EngineResult<Secret> {
        if let Some(record) = self.get_secret_as_user_with_levels(secret, AccessLevel::MODIFY_SECRETS)? {
            return Ok(record);
        }
        self.get_secret_as_org_admin(secret)?
            .ok_or_else(|| EngineError::permission("no access to secret"))
    }

    pub fn highest_access_level(&self, secret: SecretId) -> EngineResult<Option<AccessLevel>> {
        self.graph()?.highest_access_level(self.identity, secret)
    }

    pub fn visible_secrets(&self) -> EngineResult<BTreeSet<SecretId>> {
        self.graph()?.visible_secret_ids(self.identity)
    }

    pub fn list_accessible_paths(&self) -> EngineResult<Vec<Vec<GroupId>>> {
        self.graph()?.list_accessible_paths(self.identity)
    }

    // =========================================================================
    // Membership batches
    // =========================================================================

    /// Check a batch in order: structure, emptiness, member shape,
    /// duplicates, identity existence, group visibility.
    pub(crate) fn validate_acl_batch(&self, acls: Vec<Option<AclRequest>>) -> EngineResult<Vec<Membership>> {
        let requests = acls
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(EngineError::StructuralNull("acl entry"))?;
        if requests.is_empty() {
            return Err(EngineError::invalid("acls must not be empty"));
        }

        let mut batch = Vec::with_capacity(requests.len());
        for request in requests {
            batch.push(Membership {
                member: request.member()?,
                level: request.level,
                group_key_for_member: request.group_key_for_member,
            });
        }

        let mut seen = BTreeSet::new();
        for entry in &batch {
            if !seen.insert(entry.member) {
                return Err(EngineError::invalid(match entry.member {
                    AclMember::Identity(id) => format!("duplicate identity: {id}"),
                    AclMember::Group(id) => format!("duplicate group: {id}"),
                }));
            }
        }

        let store = self.store()?;
        for entry in &batch {
            if let AclMember::Identity(id) = entry.member {
                if store.identity(id)?.is_none() {
                    return Err(EngineError::invalid("some identities do not exist"));
                }
            }
        }
        for entry in &batch {
            if let AclMember::Group(id) = entry.member {
                match self.get_group_or_org(id) {
                    Ok(_) => {}
                    Err(EngineError::Permission(_)) => {
                        return Err(EngineError::invalid("some groups are not accessible"));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(batch)
    }

    /// The requestor administers a group with this batch if it is an ADMIN
    /// member itself, or an ADMIN of a member group listed at ADMIN.
    pub(crate) fn requestor_administers(&self, batch: &[Membership]) -> EngineResult<bool> {
        let graph = self.graph()?;
        for entry in batch.iter().filter(|entry| entry.level == AccessLevel::Admin) {
            match entry.member {
                AclMember::Identity(id) if id == self.identity => return Ok(true),
                AclMember::Identity(_) => {}
                AclMember::Group(group) => {
                    let direct = graph.edge(group, AclMember::Identity(self.identity))?;
                    if direct.is_some_and(|acl| acl.level == AccessLevel::Admin) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Create a group together with its membership.
    ///
    /// The whole batch is validated before anything is written.
    pub fn save_new_group_with_acls(
        &mut self,
        group: Option<NewGroup>,
        acls: Vec<Option<AclRequest>>,
    ) -> EngineResult<Group> {
        let group = group.ok_or(EngineError::StructuralNull("group"))?;
        let batch = self.validate_acl_batch(acls)?;
        if !self.requestor_administers(&batch)? {
            return Err(EngineError::invalid("requestor must administer the group"));
        }
        if group.looks_private() {
            return Err(EngineError::invalid("group name must not be empty"));
        }

        let graph = self.graph()?;
        let created = graph.store().insert_group(group)?;
        for entry in batch {
            graph.add_membership(created.id, entry.member, entry.level, entry.group_key_for_member)?;
        }
        self.txn
            .add_audit_log(RawAction::AddGroup, AuditTarget::group(created.id))?;
        Ok(created)
    }

    /// Replace the membership of an existing group.
    ///
    /// Edges missing from the batch are removed, edges with a new level are
    /// updated and the rest are added. Secrets stored in the group or in any
    /// group above it must keep an administrator. The whole edit is checked
    /// before the first edge is written.
    pub fn edit_group_acls(&mut self, group: GroupId, acls: Vec<Option<AclRequest>>) -> EngineResult<Group> {
        let record = self.get_group_for_management(group)?;
        if record.is_private_user_group() {
            return Err(EngineError::invalid("private groups cannot be edited"));
        }
        let batch = self.validate_acl_batch(acls)?;
        let via_org_admin = self.is_org_admin_of_group(&self.graph()?, group)?;
        if !via_org_admin && !self.requestor_administers(&batch)? {
            return Err(EngineError::invalid("requestor must administer the group"));
        }

        let existing = self.store()?.acls_owned_by(group)?;
        let mut changes = PendingChanges::default();
        for acl in &existing {
            match batch.iter().find(|entry| entry.member == acl.member) {
                None => changes.remove_acl(acl),
                Some(entry) if entry.level != acl.level => changes.set_level(acl, entry.level),
                Some(_) => {}
            }
        }
        {
            let graph = self.graph()?;
            for entry in &batch {
                if existing.iter().any(|acl| acl.member == entry.member) {
                    continue;
                }
                if let AclMember::Group(member) = entry.member {
                    if graph.would_create_cycle(group, member)? {
                        return Err(EngineError::CyclicGroup { owner: group, member });
                    }
                }
                changes.add_acl(group, entry.member, entry.level);
            }
            invariants::verify_secrets_after(graph.store(), self.secrets_at_or_above(group)?, &changes)?;
        }

        self.txn.track_group(group)?;
        for entry in &batch {
            match entry.member {
                AclMember::Identity(id) => self.txn.track_identities([id])?,
                AclMember::Group(id) => self.txn.track_group(id)?,
            }
        }

        let graph = self.graph()?;
        for acl in &existing {
            if !batch.iter().any(|entry| entry.member == acl.member) {
                graph.remove_membership(group, acl.member)?;
            }
        }
        for entry in batch {
            match existing.iter().find(|acl| acl.member == entry.member) {
                Some(acl) if acl.level != entry.level => {
                    graph.set_membership_level(group, entry.member, entry.level)?;
                }
                Some(_) => {}
                None => {
                    graph.add_membership(group, entry.member, entry.level, entry.group_key_for_member)?;
                }
            }
        }

        self.txn
            .add_audit_log(RawAction::ModifyGroup, AuditTarget::group(group))?;
        Ok(record)
    }

    /// Every secret attached to `group` or to a group it is a member of,
    /// transitively.
    pub(crate) fn secrets_at_or_above(&self, group: GroupId) -> EngineResult<BTreeSet<SecretId>> {
        let graph = self.graph()?;
        let mut groups = graph
            .reachable_groups_and_users(Node::Group(group), AccessLevel::ALL, Direction::TowardOwners)?
            .groups;
        groups.insert(group);

        let mut secrets = BTreeSet::new();
        for id in groups {
            secrets.extend(
                graph
                    .store()
                    .attachments_in_group(id)?
                    .into_iter()
                    .map(|attachment| attachment.secret),
            );
        }
        Ok(secrets)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Membership edges and traversals over the access graph.
//!
//! An ACL edge points from an owner group to its member. Traversals come in
//! two directions:
//!
//! - [`Direction::TowardOwners`]: from a node to the groups it is a member
//!   of, transitively. This answers "what can this identity reach".
//! - [`Direction::TowardMembers`]: from a group to its members,
//!   transitively. This answers "who can reach (or administer) this group".
//!
//! User access never passes *through* a top-level organization: an
//! organization group can be reached, but being a member of an organization
//! does not make an identity a user of the groups the organization belongs
//! to. Organization admins act on those groups through the explicit rules in
//! [`super::AuthenticatedAccess`].
//!
//! Every traversal keeps a visited set, so it terminates even if the stored
//! graph contains a cycle.

use std::collections::{BTreeSet, VecDeque};

use super::AccessLevel;
use crate::error::{EngineError, EngineResult};
use crate::models::{Acl, AclMember, GroupId, IdentityId, NewAcl, SecretId};
use crate::storage::GraphStore;

/// Start node of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Identity(IdentityId),
    Group(GroupId),
}

impl From<IdentityId> for Node {
    fn from(id: IdentityId) -> Self {
        Node::Identity(id)
    }
}

impl From<GroupId> for Node {
    fn from(id: GroupId) -> Self {
        Node::Group(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    TowardOwners,
    TowardMembers,
}

/// Whether a traversal may continue past organization groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Traverse,
    StopAtOrganizations,
}

/// Groups and identities found by a traversal, excluding the start node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reachable {
    pub groups: BTreeSet<GroupId>,
    pub identities: BTreeSet<IdentityId>,
}

impl Reachable {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.identities.is_empty()
    }
}

/// Query and mutation logic over one store transaction.
pub struct AccessGraph<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S: GraphStore + ?Sized> AccessGraph<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    // =========================================================================
    // Membership mutation
    // =========================================================================

    /// Add the edge `owner -> member`.
    ///
    /// Fails with `InvalidRequest` if either end does not exist or `member`
    /// already has an edge from `owner`, and with `CyclicGroup` if the edge
    /// would close a loop. Nothing is written on failure.
    pub fn add_membership(
        &self,
        owner: GroupId,
        member: AclMember,
        level: AccessLevel,
        group_key_for_member: impl Into<String>,
    ) -> EngineResult<Acl> {
        if self.store.group(owner)?.is_none() {
            return Err(EngineError::invalid(format!("group {owner} does not exist")));
        }
        let member_exists = match member {
            AclMember::Identity(id) => self.store.identity(id)?.is_some(),
            AclMember::Group(id) => self.store.group(id)?.is_some(),
        };
        if !member_exists {
            return Err(EngineError::invalid(format!("{member} does not exist")));
        }

        if self.edge(owner, member)?.is_some() {
            return Err(EngineError::invalid(duplicate_member(member)));
        }
        if let AclMember::Group(member_group) = member {
            if self.would_create_cycle(owner, member_group)? {
                return Err(EngineError::CyclicGroup {
                    owner,
                    member: member_group,
                });
            }
        }

        Ok(self.store.insert_acl(NewAcl {
            owner,
            member,
            level,
            group_key_for_member: group_key_for_member.into(),
        })?)
    }

    /// Remove the edge `owner -> member`, returning it if it existed.
    ///
    /// Callers check secret invariants against the removal beforehand.
    pub fn remove_membership(&self, owner: GroupId, member: AclMember) -> EngineResult<Option<Acl>> {
        let Some(acl) = self.edge(owner, member)? else {
            return Ok(None);
        };
        self.store.delete_acl(acl.id)?;
        Ok(Some(acl))
    }

    pub fn set_membership_level(
        &self,
        owner: GroupId,
        member: AclMember,
        level: AccessLevel,
    ) -> EngineResult<Acl> {
        let acl = self
            .edge(owner, member)?
            .ok_or_else(|| EngineError::invalid(format!("{member} is not a member of group {owner}")))?;
        if acl.level == level {
            return Ok(acl);
        }
        Ok(self.store.update_acl_level(acl.id, level)?)
    }

    /// The edge `owner -> member`, if any.
    pub fn edge(&self, owner: GroupId, member: AclMember) -> EngineResult<Option<Acl>> {
        Ok(self
            .store
            .acls_owned_by(owner)?
            .into_iter()
            .find(|acl| acl.member == member))
    }

    /// True if adding `owner -> member_group` would close a loop, i.e. if
    /// `owner` is `member_group` or is already contained in it.
    pub fn would_create_cycle(&self, owner: GroupId, member_group: GroupId) -> EngineResult<bool> {
        if owner == member_group {
            return Ok(true);
        }
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([member_group]);
        while let Some(group) = queue.pop_front() {
            if !visited.insert(group) {
                continue;
            }
            for acl in self.store.acls_owned_by(group)? {
                if let AclMember::Group(child) = acl.member {
                    if child == owner {
                        return Ok(true);
                    }
                    queue.push_back(child);
                }
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Reachability
    // =========================================================================

    /// Every group and identity reachable from `start` through edges whose
    /// level is in `levels`.
    pub fn reachable_groups_and_users(
        &self,
        start: Node,
        levels: &[AccessLevel],
        direction: Direction,
    ) -> EngineResult<Reachable> {
        self.walk(start, levels, direction, Boundary::Traverse)
    }

    fn walk(
        &self,
        start: Node,
        levels: &[AccessLevel],
        direction: Direction,
        boundary: Boundary,
    ) -> EngineResult<Reachable> {
        let mut reached = Reachable::default();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();

        // identities have no members; only the owner walk can start there
        let seed = match (start, direction) {
            (Node::Identity(id), Direction::TowardOwners) => {
                self.store.acls_with_member(AclMember::Identity(id))?
            }
            (Node::Identity(_), Direction::TowardMembers) => Vec::new(),
            (Node::Group(id), _) => {
                visited.insert(id);
                self.next_edges(id, direction)?
            }
        };
        queue.push_back(seed);

        while let Some(edges) = queue.pop_front() {
            for acl in edges {
                if !levels.contains(&acl.level) {
                    continue;
                }
                let next = match direction {
                    Direction::TowardOwners => acl.owner,
                    Direction::TowardMembers => match acl.member {
                        AclMember::Identity(id) => {
                            reached.identities.insert(id);
                            continue;
                        }
                        AclMember::Group(id) => id,
                    },
                };
                if !visited.insert(next) {
                    continue;
                }
                reached.groups.insert(next);
                if boundary == Boundary::StopAtOrganizations && self.is_organization(next)? {
                    continue;
                }
                queue.push_back(self.next_edges(next, direction)?);
            }
        }
        Ok(reached)
    }

    fn next_edges(&self, group: GroupId, direction: Direction) -> EngineResult<Vec<Acl>> {
        Ok(match direction {
            Direction::TowardOwners => self.store.acls_with_member(AclMember::Group(group))?,
            Direction::TowardMembers => self.store.acls_owned_by(group)?,
        })
    }

    fn is_organization(&self, group: GroupId) -> EngineResult<bool> {
        Ok(self
            .store
            .group(group)?
            .is_some_and(|g| g.is_top_level_organization()))
    }

    /// Groups `identity` can reach as a user through edges in `levels`.
    pub fn user_reachable_groups(
        &self,
        identity: IdentityId,
        levels: &[AccessLevel],
    ) -> EngineResult<BTreeSet<GroupId>> {
        Ok(self
            .walk(
                Node::Identity(identity),
                levels,
                Direction::TowardOwners,
                Boundary::StopAtOrganizations,
            )?
            .groups)
    }

    pub fn can_reach_group(
        &self,
        identity: IdentityId,
        group: GroupId,
        levels: &[AccessLevel],
    ) -> EngineResult<bool> {
        Ok(self.user_reachable_groups(identity, levels)?.contains(&group))
    }

    /// Identities that can reach `group` as users through edges in `levels`.
    pub fn identities_with_access_to_group(
        &self,
        group: GroupId,
        levels: &[AccessLevel],
    ) -> EngineResult<BTreeSet<IdentityId>> {
        Ok(self
            .walk(
                Node::Group(group),
                levels,
                Direction::TowardMembers,
                Boundary::StopAtOrganizations,
            )?
            .identities)
    }

    pub fn identities_with_access_to_secret(
        &self,
        secret: SecretId,
        levels: &[AccessLevel],
    ) -> EngineResult<BTreeSet<IdentityId>> {
        let mut identities = BTreeSet::new();
        for attachment in self.store.attachments_of_secret(secret)? {
            identities.extend(self.identities_with_access_to_group(attachment.group, levels)?);
        }
        Ok(identities)
    }

    /// Secrets attached to any group `identity` can reach as a user.
    pub fn visible_secret_ids(&self, identity: IdentityId) -> EngineResult<BTreeSet<SecretId>> {
        let mut secrets = BTreeSet::new();
        for group in self.user_reachable_groups(identity, AccessLevel::ALL)? {
            secrets.extend(
                self.store
                    .attachments_in_group(group)?
                    .into_iter()
                    .map(|attachment| attachment.secret),
            );
        }
        Ok(secrets)
    }

    /// Highest level of a direct edge from a group holding `secret` to
    /// `identity`.
    pub fn highest_access_level(
        &self,
        identity: IdentityId,
        secret: SecretId,
    ) -> EngineResult<Option<AccessLevel>> {
        let mut highest: Option<AccessLevel> = None;
        for attachment in self.store.attachments_of_secret(secret)? {
            for acl in self.store.acls_owned_by(attachment.group)? {
                if acl.member != AclMember::Identity(identity) {
                    continue;
                }
                highest = match highest {
                    Some(current) if !acl.level.is_higher(current) => Some(current),
                    _ => Some(acl.level),
                };
            }
        }
        Ok(highest)
    }

    /// Every group reachable from the identity's direct groups by descending
    /// into member groups, each reported once at its shortest path.
    ///
    /// Paths come out in breadth-first order; ties follow edge id order.
    pub fn list_accessible_paths(&self, identity: IdentityId) -> EngineResult<Vec<Vec<GroupId>>> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        for acl in self.store.acls_with_member(AclMember::Identity(identity))? {
            if visited.insert(acl.owner) {
                queue.push_back(vec![acl.owner]);
            }
        }

        let mut paths = Vec::new();
        while let Some(path) = queue.pop_front() {
            let Some(&last) = path.last() else {
                continue;
            };
            for acl in self.store.acls_owned_by(last)? {
                if let AclMember::Group(child) = acl.member {
                    if visited.insert(child) {
                        let mut next = path.clone();
                        next.push(child);
                        queue.push_back(next);
                    }
                }
            }
            paths.push(path);
        }
        Ok(paths)
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    /// Identities with a direct ADMIN edge from `org`.
    pub fn is_organization_admin(&self, identity: IdentityId, org: GroupId) -> EngineResult<bool> {
        if !self.is_organization(org)? {
            return Ok(false);
        }
        Ok(self.edge(org, AclMember::Identity(identity))?.is_some_and(|acl| acl.level == AccessLevel::Admin))
    }

    /// Organizations `identity` administers.
    pub fn administered_organizations(&self, identity: IdentityId) -> EngineResult<BTreeSet<GroupId>> {
        let mut orgs = BTreeSet::new();
        for acl in self.store.acls_with_member(AclMember::Identity(identity))? {
            if acl.level == AccessLevel::Admin && self.is_organization(acl.owner)? {
                orgs.insert(acl.owner);
            }
        }
        Ok(orgs)
    }

    /// Organizations `identity` is an admin or member of.
    pub fn organizations_of(&self, identity: IdentityId) -> EngineResult<BTreeSet<GroupId>> {
        let mut orgs = BTreeSet::new();
        for group in self.user_reachable_groups(identity, AccessLevel::ALL)? {
            if self.is_organization(group)? {
                orgs.insert(group);
                continue;
            }
            for acl in self.store.acls_owned_by(group)? {
                if let AclMember::Group(member) = acl.member {
                    if self.is_organization(member)? {
                        orgs.insert(member);
                    }
                }
            }
        }
        Ok(orgs)
    }

    /// The organization a group belongs to: the group itself if it is one,
    /// else the first organization among its member groups.
    pub fn organization_of_group(&self, group: GroupId) -> EngineResult<Option<GroupId>> {
        if self.is_organization(group)? {
            return Ok(Some(group));
        }
        for acl in self.store.acls_owned_by(group)? {
            if let AclMember::Group(member) = acl.member {
                if self.is_organization(member)? {
                    return Ok(Some(member));
                }
            }
        }
        Ok(None)
    }

    /// `org` and every group that has `org` as a member group.
    pub fn groups_of_organization(&self, org: GroupId) -> EngineResult<BTreeSet<GroupId>> {
        let mut groups = BTreeSet::from([org]);
        groups.extend(
            self.store
                .acls_with_member(AclMember::Group(org))?
                .into_iter()
                .map(|acl| acl.owner),
        );
        Ok(groups)
    }

    /// Direct members of `org` plus everyone who can reach one of its groups.
    pub fn organization_members(&self, org: GroupId) -> EngineResult<BTreeSet<IdentityId>> {
        let mut members = BTreeSet::new();
        for group in self.groups_of_organization(org)? {
            members.extend(self.identities_with_access_to_group(group, AccessLevel::ALL)?);
        }
        Ok(members)
    }
}

fn duplicate_member(member: AclMember) -> String {
    match member {
        AclMember::Identity(id) => format!("duplicate identity: {id}"),
        AclMember::Group(id) => format!("duplicate group: {id}"),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::models::{NewGroup, NewIdentity, NewSecret, SecretAttachment};
    use crate::storage::{GraphDatabase, StoreTxn};

    /// Callers open their write transaction after binding the database so
    /// that it is dropped first.
    fn temp_db() -> (GraphDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = GraphDatabase::open(&dir.path().join("graph.redb")).unwrap();
        (db, dir)
    }

    fn identity(txn: &StoreTxn, name: &str) -> IdentityId {
        txn.insert_identity(NewIdentity::new(name)).unwrap().id
    }

    fn group(txn: &StoreTxn, name: &str) -> GroupId {
        txn.insert_group(NewGroup::named(name)).unwrap().id
    }

    fn add(graph: &AccessGraph<'_, StoreTxn>, owner: GroupId, member: AclMember, level: AccessLevel) {
        graph.add_membership(owner, member, level, "").unwrap();
    }

    #[test]
    fn self_membership_is_a_cycle() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let a = group(&txn, "a");
        let err = graph
            .add_membership(a, AclMember::Group(a), AccessLevel::Admin, "")
            .unwrap_err();
        assert!(matches!(err, EngineError::CyclicGroup { .. }));
    }

    #[test]
    fn closing_a_loop_is_rejected_and_leaves_graph_unchanged() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let (a, b, c) = (group(&txn, "a"), group(&txn, "b"), group(&txn, "c"));
        add(&graph, a, AclMember::Group(b), AccessLevel::Admin);
        add(&graph, b, AclMember::Group(c), AccessLevel::Admin);

        let err = graph
            .add_membership(c, AclMember::Group(a), AccessLevel::Readonly, "")
            .unwrap_err();
        assert!(matches!(err, EngineError::CyclicGroup { owner, member } if owner == c && member == a));
        assert!(txn.acls_owned_by(c).unwrap().is_empty());

        // a diamond is not a cycle
        add(&graph, a, AclMember::Group(c), AccessLevel::Readonly);
    }

    #[test]
    fn duplicate_members_are_rejected() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let a = group(&txn, "a");
        let alice = identity(&txn, "alice@example.com");
        add(&graph, a, AclMember::Identity(alice), AccessLevel::Admin);

        let err = graph
            .add_membership(a, AclMember::Identity(alice), AccessLevel::Readonly, "")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(msg) if msg == format!("duplicate identity: {alice}")));
    }

    #[test]
    fn missing_member_is_rejected() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let a = group(&txn, "a");
        let err = graph
            .add_membership(a, AclMember::Identity(IdentityId(99)), AccessLevel::Admin, "")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn accessible_paths_are_breadth_first_and_deduplicated() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let i = identity(&txn, "i@example.com");
        let (a, b, c, d) = (group(&txn, "a"), group(&txn, "b"), group(&txn, "c"), group(&txn, "d"));
        add(&graph, a, AclMember::Identity(i), AccessLevel::Admin);
        add(&graph, a, AclMember::Group(b), AccessLevel::Admin);
        add(&graph, a, AclMember::Group(d), AccessLevel::Admin);
        add(&graph, b, AclMember::Group(c), AccessLevel::Admin);

        let paths = graph.list_accessible_paths(i).unwrap();
        assert_eq!(paths, vec![vec![a], vec![a, b], vec![a, d], vec![a, b, c]]);

        // a second route to c does not add a second path
        add(&graph, d, AclMember::Group(c), AccessLevel::Admin);
        assert_eq!(graph.list_accessible_paths(i).unwrap().len(), 4);
    }

    #[test]
    fn reachability_respects_levels_and_direction() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let alice = identity(&txn, "alice@example.com");
        let bob = identity(&txn, "bob@example.com");
        let (team, outer) = (group(&txn, "team"), group(&txn, "outer"));
        add(&graph, team, AclMember::Identity(alice), AccessLevel::Admin);
        add(&graph, team, AclMember::Identity(bob), AccessLevel::Readonly);
        add(&graph, outer, AclMember::Group(team), AccessLevel::Admin);

        let up = graph
            .reachable_groups_and_users(Node::Identity(bob), AccessLevel::ALL, Direction::TowardOwners)
            .unwrap();
        assert_eq!(up.groups, BTreeSet::from([team, outer]));

        let bob_admin = graph
            .reachable_groups_and_users(Node::Identity(bob), AccessLevel::ADMIN_ONLY, Direction::TowardOwners)
            .unwrap();
        assert!(bob_admin.is_empty());

        let admins = graph
            .reachable_groups_and_users(Node::Group(outer), AccessLevel::ADMIN_ONLY, Direction::TowardMembers)
            .unwrap();
        assert_eq!(admins.identities, BTreeSet::from([alice]));
        assert_eq!(admins.groups, BTreeSet::from([team]));

        let everyone = graph
            .reachable_groups_and_users(Node::Group(outer), AccessLevel::ALL, Direction::TowardMembers)
            .unwrap();
        assert!(everyone.identities.is_superset(&admins.identities));
        assert!(everyone.groups.is_superset(&admins.groups));
    }

    #[test]
    fn revoking_an_edge_removes_residual_access() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let alice = identity(&txn, "alice@example.com");
        let team = group(&txn, "team");
        add(&graph, team, AclMember::Identity(alice), AccessLevel::Readonly);
        assert!(graph.can_reach_group(alice, team, AccessLevel::ALL).unwrap());

        let removed = graph.remove_membership(team, AclMember::Identity(alice)).unwrap();
        assert!(removed.is_some());
        assert!(!graph.can_reach_group(alice, team, AccessLevel::ALL).unwrap());
        assert!(graph
            .remove_membership(team, AclMember::Identity(alice))
            .unwrap()
            .is_none());
    }

    #[test]
    fn traversal_terminates_on_stored_cycles() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let (a, b) = (group(&txn, "a"), group(&txn, "b"));
        // bypass the cycle check to simulate corrupt data
        for (owner, member) in [(a, b), (b, a)] {
            txn.insert_acl(NewAcl {
                owner,
                member: AclMember::Group(member),
                level: AccessLevel::Admin,
                group_key_for_member: String::new(),
            })
            .unwrap();
        }
        let graph = AccessGraph::new(&txn);
        let reached = graph
            .reachable_groups_and_users(Node::Group(a), AccessLevel::ALL, Direction::TowardMembers)
            .unwrap();
        assert_eq!(reached.groups, BTreeSet::from([b]));
    }

    #[test]
    fn organization_membership_is_derived() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let boss = identity(&txn, "boss@example.com");
        let worker = identity(&txn, "worker@example.com");
        let org = txn.insert_group(NewGroup::organization("acme")).unwrap().id;
        let private = txn.insert_group(NewGroup::private_user_group()).unwrap().id;
        let team = group(&txn, "team");

        add(&graph, org, AclMember::Identity(boss), AccessLevel::Admin);
        add(&graph, private, AclMember::Identity(worker), AccessLevel::Admin);
        add(&graph, private, AclMember::Group(org), AccessLevel::Admin);
        add(&graph, team, AclMember::Group(org), AccessLevel::Admin);

        assert!(graph.is_organization_admin(boss, org).unwrap());
        assert!(!graph.is_organization_admin(worker, org).unwrap());
        assert_eq!(graph.organizations_of(worker).unwrap(), BTreeSet::from([org]));
        assert_eq!(graph.organizations_of(boss).unwrap(), BTreeSet::from([org]));
        assert_eq!(graph.organization_members(org).unwrap(), BTreeSet::from([boss, worker]));
        assert_eq!(graph.organization_of_group(team).unwrap(), Some(org));
        assert_eq!(graph.groups_of_organization(org).unwrap(), BTreeSet::from([org, private, team]));

        // org admins are not users of the org's groups
        assert!(!graph.can_reach_group(boss, team, AccessLevel::ALL).unwrap());
        // the private group does not open the team to its owner
        assert!(!graph.can_reach_group(worker, team, AccessLevel::ALL).unwrap());
    }

    #[test]
    fn visible_secrets_and_highest_level() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let graph = AccessGraph::new(&txn);
        let alice = identity(&txn, "alice@example.com");
        let (one, two) = (group(&txn, "one"), group(&txn, "two"));
        add(&graph, one, AclMember::Identity(alice), AccessLevel::Readonly);
        add(&graph, two, AclMember::Identity(alice), AccessLevel::ModifySecretsButNotMembership);

        let secret = txn
            .insert_secret(NewSecret {
                client_data: String::new(),
                king: None,
            })
            .unwrap()
            .id;
        for group in [one, two] {
            txn.put_attachment(&SecretAttachment {
                secret,
                group,
                encrypted_payload: String::new(),
            })
            .unwrap();
        }

        assert_eq!(graph.visible_secret_ids(alice).unwrap(), BTreeSet::from([secret]));
        assert_eq!(
            graph.highest_access_level(alice, secret).unwrap(),
            Some(AccessLevel::ModifySecretsButNotMembership)
        );
        assert_eq!(graph.highest_access_level(IdentityId(77), secret).unwrap(), None);
    }

    proptest! {
        /// No sequence of accepted insertions produces a cycle, and rejected
        /// insertions leave the edge set untouched.
        #[test]
        fn random_insertions_never_create_cycles(
            edges in proptest::collection::vec((0usize..6, 0usize..6), 1..30)
        ) {
            let (db, _dir) = temp_db();
            let txn = db.begin_write().unwrap();
            let graph = AccessGraph::new(&txn);
            let groups: Vec<GroupId> = (0..6).map(|n| group(&txn, &format!("g{n}"))).collect();

            for (from, to) in edges {
                let (owner, member) = (groups[from], groups[to]);
                let before = txn.acls_owned_by(owner).unwrap().len();
                match graph.add_membership(owner, AclMember::Group(member), AccessLevel::Admin, "") {
                    Ok(_) => {}
                    Err(EngineError::CyclicGroup { .. }) | Err(EngineError::InvalidRequest(_)) => {
                        prop_assert_eq!(txn.acls_owned_by(owner).unwrap().len(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            for group in &groups {
                let below = graph
                    .reachable_groups_and_users(Node::Group(*group), AccessLevel::ALL, Direction::TowardMembers)
                    .unwrap();
                prop_assert!(!below.groups.contains(group));
            }
        }
    }
}

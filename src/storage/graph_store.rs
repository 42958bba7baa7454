// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage contract of the access graph.

use crate::access::AccessLevel;
use crate::audit::{ClassifiedEvent, ClassifiedRecord};
use crate::models::{
    Acl, AclId, AclMember, Group, GroupId, Identity, IdentityId, NewAcl, NewGroup, NewIdentity,
    NewSecret, Secret, SecretAttachment, SecretId, TransactionId,
};

use super::StoreResult;

/// Record store seen through one open store transaction.
///
/// Reads observe the transaction's own earlier writes. Lists come back in id
/// order. Writes on a read-only transaction fail with
/// [`super::StoreError::ReadOnly`].
pub trait GraphStore {
    // -------------------------------------------------------------------------
    // Identities
    // -------------------------------------------------------------------------

    fn identity(&self, id: IdentityId) -> StoreResult<Option<Identity>>;

    fn identity_by_name(&self, name: &str) -> StoreResult<Option<Identity>>;

    /// Fails with `Conflict` when the name is taken.
    fn insert_identity(&self, identity: NewIdentity) -> StoreResult<Identity>;

    /// Removes only the identity row; edges naming it are left dangling.
    fn delete_identity(&self, id: IdentityId) -> StoreResult<bool>;

    // -------------------------------------------------------------------------
    // Groups
    // -------------------------------------------------------------------------

    fn group(&self, id: GroupId) -> StoreResult<Option<Group>>;

    fn insert_group(&self, group: NewGroup) -> StoreResult<Group>;

    fn delete_group(&self, id: GroupId) -> StoreResult<bool>;

    // -------------------------------------------------------------------------
    // ACL edges
    // -------------------------------------------------------------------------

    fn acl(&self, id: AclId) -> StoreResult<Option<Acl>>;

    /// Edges whose owner is `group`.
    fn acls_owned_by(&self, group: GroupId) -> StoreResult<Vec<Acl>>;

    /// Edges whose member is `member`.
    fn acls_with_member(&self, member: AclMember) -> StoreResult<Vec<Acl>>;

    fn insert_acl(&self, acl: NewAcl) -> StoreResult<Acl>;

    fn update_acl_level(&self, id: AclId, level: AccessLevel) -> StoreResult<Acl>;

    fn delete_acl(&self, id: AclId) -> StoreResult<bool>;

    // -------------------------------------------------------------------------
    // Secrets and attachments
    // -------------------------------------------------------------------------

    fn secret(&self, id: SecretId) -> StoreResult<Option<Secret>>;

    fn insert_secret(&self, secret: NewSecret) -> StoreResult<Secret>;

    fn delete_secret(&self, id: SecretId) -> StoreResult<bool>;

    fn attachments_of_secret(&self, secret: SecretId) -> StoreResult<Vec<SecretAttachment>>;

    fn attachments_in_group(&self, group: GroupId) -> StoreResult<Vec<SecretAttachment>>;

    /// Insert or replace the attachment for `(secret, group)`.
    fn put_attachment(&self, attachment: &SecretAttachment) -> StoreResult<()>;

    fn delete_attachment(&self, secret: SecretId, group: GroupId) -> StoreResult<bool>;

    // -------------------------------------------------------------------------
    // Classified audit sink
    // -------------------------------------------------------------------------

    fn append_classified_event(&self, record: ClassifiedRecord) -> StoreResult<ClassifiedEvent>;

    fn classified_events_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> StoreResult<Vec<ClassifiedEvent>>;

    /// Delete the transaction's records for which `keep` is false. Returns
    /// how many were deleted.
    fn retain_classified_events(
        &self,
        transaction_id: &TransactionId,
        keep: &dyn Fn(&ClassifiedEvent) -> bool,
    ) -> StoreResult<usize>;
}

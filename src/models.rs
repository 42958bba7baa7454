// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Records of the access-control graph.
//!
//! Every record is keyed by a numeric id and refers to other records only by
//! id. Traversals go through [`crate::storage::GraphStore`] queries instead of
//! in-memory back-pointers, so a record can be cloned and dropped freely.
//!
//! All payload fields (`encrypted_private_key`, `public_key`,
//! `group_key_for_member`, `encrypted_payload`, `client_data`) are opaque
//! strings. Nothing in this crate interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::access::AccessLevel;
use crate::error::{EngineError, EngineResult};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Id of an [`Identity`].
    IdentityId
);
record_id!(
    /// Id of a [`Group`].
    GroupId
);
record_id!(
    /// Id of a [`Secret`].
    SecretId
);
record_id!(
    /// Id of an [`Acl`] edge.
    AclId
);

// =============================================================================
// Identity
// =============================================================================

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    /// Unique login name (an e-mail address).
    pub name: String,
    pub encrypted_private_key: String,
    pub verified: bool,
}

/// Identity fields supplied on signup or invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub name: String,
    pub encrypted_private_key: String,
    pub verified: bool,
}

impl NewIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encrypted_private_key: String::new(),
            verified: false,
        }
    }
}

// =============================================================================
// Group
// =============================================================================

/// Kind tag of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Ordinary,
    /// Singleton group holding exactly one identity at ADMIN level.
    PrivateUserGroup,
    /// Root of an organization.
    TopLevelOrganization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Empty for anonymous private groups.
    pub name: String,
    pub kind: GroupKind,
    pub auto_delete: bool,
    pub public_key: String,
}

impl Group {
    pub fn is_top_level_organization(&self) -> bool {
        self.kind == GroupKind::TopLevelOrganization
    }

    /// Older rows carry no kind tag; an unnamed group that is not
    /// auto-deleted is a private group. New ordinary groups are always
    /// named, so the rule only ever matches those rows.
    pub fn is_private_user_group(&self) -> bool {
        match self.kind {
            GroupKind::PrivateUserGroup => true,
            GroupKind::TopLevelOrganization => false,
            GroupKind::Ordinary => self.name.is_empty() && !self.auto_delete,
        }
    }
}

/// Group fields supplied when creating a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub kind: GroupKind,
    pub auto_delete: bool,
    pub public_key: String,
}

impl NewGroup {
    /// True if the stored group would read back as a private group without
    /// being created as one.
    pub fn looks_private(&self) -> bool {
        self.kind == GroupKind::Ordinary && self.name.is_empty() && !self.auto_delete
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: GroupKind::Ordinary,
            auto_delete: false,
            public_key: String::new(),
        }
    }

    pub fn private_user_group() -> Self {
        Self {
            kind: GroupKind::PrivateUserGroup,
            ..Self::named("")
        }
    }

    pub fn organization(name: impl Into<String>) -> Self {
        Self {
            kind: GroupKind::TopLevelOrganization,
            ..Self::named(name)
        }
    }
}

// =============================================================================
// ACL edges
// =============================================================================

/// The member side of an ACL edge: exactly one identity or one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AclMember {
    Identity(IdentityId),
    Group(GroupId),
}

impl fmt::Display for AclMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclMember::Identity(id) => write!(f, "identity {id}"),
            AclMember::Group(id) => write!(f, "group {id}"),
        }
    }
}

/// Directed edge `owner -> member`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub id: AclId,
    pub owner: GroupId,
    pub member: AclMember,
    pub level: AccessLevel,
    pub group_key_for_member: String,
}

/// An edge about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAcl {
    pub owner: GroupId,
    pub member: AclMember,
    pub level: AccessLevel,
    pub group_key_for_member: String,
}

/// One entry of a group-membership batch as a client submits it.
///
/// Both member fields are optional because the request shape allows it;
/// [`AclRequest::member`] rejects entries that set neither or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRequest {
    pub member_identity: Option<IdentityId>,
    pub member_group: Option<GroupId>,
    pub level: AccessLevel,
    #[serde(default)]
    pub group_key_for_member: String,
}

impl AclRequest {
    pub fn identity(identity: IdentityId, level: AccessLevel) -> Self {
        Self {
            member_identity: Some(identity),
            member_group: None,
            level,
            group_key_for_member: String::new(),
        }
    }

    pub fn group(group: GroupId, level: AccessLevel) -> Self {
        Self {
            member_identity: None,
            member_group: Some(group),
            level,
            group_key_for_member: String::new(),
        }
    }

    pub fn member(&self) -> EngineResult<AclMember> {
        match (self.member_identity, self.member_group) {
            (Some(identity), None) => Ok(AclMember::Identity(identity)),
            (None, Some(group)) => Ok(AclMember::Group(group)),
            _ => Err(EngineError::InvalidRequest(
                "exactly one of member identity or member group must be set".to_string(),
            )),
        }
    }
}

// =============================================================================
// Secrets
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub id: SecretId,
    /// Opaque metadata visible to the server (e.g. the site hostname).
    pub client_data: String,
    /// Identity that last wrote the secret.
    pub king: Option<IdentityId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecret {
    pub client_data: String,
    pub king: Option<IdentityId>,
}

/// A secret shared into a group, with the payload encrypted for that group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretAttachment {
    pub secret: SecretId,
    pub group: GroupId,
    pub encrypted_payload: String,
}

// =============================================================================
// Transactions
// =============================================================================

/// Identifier shared by every raw and classified audit record written by one
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_ordinary_group_counts_as_private() {
        let group = Group {
            id: GroupId(1),
            name: String::new(),
            kind: GroupKind::Ordinary,
            auto_delete: false,
            public_key: String::new(),
        };
        assert!(group.is_private_user_group());

        let auto = Group {
            auto_delete: true,
            ..group.clone()
        };
        assert!(!auto.is_private_user_group());

        let org = Group {
            kind: GroupKind::TopLevelOrganization,
            ..group
        };
        assert!(!org.is_private_user_group());
        assert!(org.is_top_level_organization());
    }

    #[test]
    fn acl_request_requires_exactly_one_member() {
        let ok = AclRequest::identity(IdentityId(3), AccessLevel::Admin);
        assert_eq!(ok.member().unwrap(), AclMember::Identity(IdentityId(3)));

        let both = AclRequest {
            member_group: Some(GroupId(4)),
            ..ok.clone()
        };
        assert!(matches!(both.member(), Err(EngineError::InvalidRequest(_))));

        let neither = AclRequest {
            member_identity: None,
            ..ok
        };
        assert!(matches!(neither.member(), Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn acl_member_serializes_with_tag() {
        let json = serde_json::to_string(&AclMember::Group(GroupId(9))).unwrap();
        assert_eq!(json, r#"{"type":"group","id":9}"#);
    }

    #[test]
    fn generated_transaction_ids_are_distinct() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}

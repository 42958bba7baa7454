// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access levels carried by ACL edges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Access level of an ACL edge.
///
/// ## Hierarchy
///
/// - `Admin` - may change membership and secrets
/// - `ModifySecretsButNotMembership` - may add and edit secrets only
/// - `Readonly` - may read secrets
///
/// Variants are declared lowest first so the derived `Ord` matches the
/// hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Readonly,
    ModifySecretsButNotMembership,
    Admin,
}

impl AccessLevel {
    /// Every level; traversals with this set follow all edges.
    pub const ALL: &'static [AccessLevel] = &[
        AccessLevel::Admin,
        AccessLevel::ModifySecretsButNotMembership,
        AccessLevel::Readonly,
    ];

    pub const ADMIN_ONLY: &'static [AccessLevel] = &[AccessLevel::Admin];

    /// Levels that may change the secrets of a group.
    pub const MODIFY_SECRETS: &'static [AccessLevel] = &[
        AccessLevel::Admin,
        AccessLevel::ModifySecretsButNotMembership,
    ];

    /// Strictly higher than `other`.
    pub fn is_higher(self, other: AccessLevel) -> bool {
        self > other
    }

    /// Like [`AccessLevel::is_higher`] for a level that may be unset.
    ///
    /// Comparing against an unset level is a caller bug.
    pub fn checked_is_higher(self, other: Option<AccessLevel>) -> EngineResult<bool> {
        other
            .map(|other| self.is_higher(other))
            .ok_or(EngineError::StructuralNull("access level"))
    }

    pub fn can_edit_secret(self) -> bool {
        matches!(
            self,
            AccessLevel::Admin | AccessLevel::ModifySecretsButNotMembership
        )
    }

    pub fn can_modify_membership(self) -> bool {
        self == AccessLevel::Admin
    }

    /// Parse a level from its wire name (case-insensitive).
    pub fn parse(s: &str) -> Option<AccessLevel> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Some(AccessLevel::Admin),
            "MODIFY_SECRETS_BUT_NOT_MEMBERSHIP" => Some(AccessLevel::ModifySecretsButNotMembership),
            "READONLY" => Some(AccessLevel::Readonly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Admin => "ADMIN",
            AccessLevel::ModifySecretsButNotMembership => "MODIFY_SECRETS_BUT_NOT_MEMBERSHIP",
            AccessLevel::Readonly => "READONLY",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! High-level audit categories and the operation-name table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a classified audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    MitroAutoLogin,
    GetSecretNonCriticalData,
    GetSecretCriticalDataForLogin,
    GetSecretCriticalDataForEdit,
    EditPassword,
    EditSecret,
    CreateGroup,
    EditGroup,
    DeleteGroup,
    CreateSecret,
    DeleteSecret,
    EditSecretAcl,
    InviteUser,
    InvitedByUser,
    Signup,
    NewDevice,
    OrgApplySync,
    OrgViewSync,
    OrgMutate,
    Noop,
    Unknown,
    MitroLogin,
    GrantedAccessTo,
    RevokedAccessTo,
    DeleteIdentity,
}

/// Client operation names and the category each one produces.
const OPERATION_CATEGORIES: &[(&str, Category)] = &[
    ("VERIFY_DEVICE", Category::NewDevice),
    ("addGroup", Category::CreateGroup),
    ("addSecret", Category::CreateSecret),
    ("addSite", Category::CreateSecret),
    ("applyPendingGroups", Category::OrgApplySync),
    ("checkTwoFactor", Category::Unknown),
    ("deleteSecret", Category::DeleteSecret),
    ("getAuditLog", Category::Noop),
    ("getGroup", Category::Noop),
    ("getPendingGroups", Category::OrgViewSync),
    ("mutateGroup", Category::EditGroup),
    ("mutateOrganization", Category::OrgMutate),
    ("mutatePrivateKeyPassword", Category::EditPassword),
    ("mutateSecret", Category::EditSecret),
    ("mutateSite", Category::EditSecret),
    ("editSitePassword", Category::EditSecret),
    ("removeGroup", Category::DeleteGroup),
    ("shareSite", Category::EditSecretAcl),
    ("shareSiteAndOptionallySetOrg", Category::EditSecretAcl),
];

/// Look up the category of a client operation name. Unmapped names give
/// `Unknown`.
pub fn category_for_operation(name: &str) -> Category {
    OPERATION_CATEGORIES
        .iter()
        .find(|(operation, _)| *operation == name)
        .map(|(_, category)| *category)
        .unwrap_or(Category::Unknown)
}

impl Category {
    /// `Noop` and `Unknown` never produce records.
    pub fn is_recorded(self) -> bool {
        !matches!(self, Category::Noop | Category::Unknown)
    }

    /// Categories that name the single group the transaction touched.
    pub fn tracks_group(self) -> bool {
        matches!(
            self,
            Category::CreateGroup | Category::DeleteGroup | Category::EditGroup
        )
    }

    /// Categories that name the single secret the transaction touched.
    pub fn tracks_secret(self) -> bool {
        matches!(
            self,
            Category::CreateSecret
                | Category::DeleteSecret
                | Category::EditSecret
                | Category::EditSecretAcl
                | Category::GetSecretCriticalDataForLogin
        )
    }

    /// Written at commit time by the access diff rather than by the classifier.
    pub fn is_access_change(self) -> bool {
        matches!(self, Category::GrantedAccessTo | Category::RevokedAccessTo)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // serde's rename gives the canonical name
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_operations_map_to_categories() {
        assert_eq!(category_for_operation("addGroup"), Category::CreateGroup);
        assert_eq!(category_for_operation("shareSite"), Category::EditSecretAcl);
        assert_eq!(category_for_operation("VERIFY_DEVICE"), Category::NewDevice);
        assert_eq!(category_for_operation("editSitePassword"), Category::EditSecret);
    }

    #[test]
    fn unmapped_and_noop_operations_are_not_recorded() {
        assert_eq!(category_for_operation("AddGroup"), Category::Unknown);
        assert_eq!(category_for_operation("frobnicate"), Category::Unknown);
        assert!(!category_for_operation("getGroup").is_recorded());
        assert!(!category_for_operation("checkTwoFactor").is_recorded());
        assert!(category_for_operation("removeGroup").is_recorded());
    }

    #[test]
    fn tracking_sets() {
        assert!(Category::EditGroup.tracks_group());
        assert!(!Category::EditGroup.tracks_secret());
        assert!(Category::GetSecretCriticalDataForLogin.tracks_secret());
        assert!(!Category::Signup.tracks_group());
        assert!(!Category::Signup.tracks_secret());
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(Category::InvitedByUser.to_string(), "INVITED_BY_USER");
        assert_eq!(Category::GrantedAccessTo.to_string(), "GRANTED_ACCESS_TO");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy of the engine.

use crate::models::{GroupId, TransactionId};
use crate::storage::StoreError;

/// Every failure an engine operation can report.
///
/// `Permission`, `InvalidRequest` and `CyclicGroup` are user-facing.
/// `StructuralNull` and `Store` are internal and surface to users only as a
/// generic message (see [`EngineError::user_message`]).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Authorization denied. Messages never reveal whether the resource exists.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Malformed mutation batch; names the violated rule.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("adding group {member} to group {owner} would create a cycle")]
    CyclicGroup { owner: GroupId, member: GroupId },

    /// A mutation left the graph in a state that must not be committed.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A required reference was missing. Always a programming error.
    #[error("missing required {0}")]
    StructuralNull(&'static str),

    #[error("transaction {0} is closed")]
    TransactionClosed(TransactionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn permission(reason: impl Into<String>) -> Self {
        EngineError::Permission(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        EngineError::InvalidRequest(reason.into())
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Permission(_) => "permission_denied",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::CyclicGroup { .. } => "cyclic_group",
            EngineError::Invariant(_) => "invariant_violated",
            EngineError::StructuralNull(_) => "internal_error",
            EngineError::TransactionClosed(_) => "transaction_closed",
            EngineError::Store(_) => "internal_error",
        }
    }

    pub fn is_user_facing(&self) -> bool {
        !matches!(self, EngineError::StructuralNull(_) | EngineError::Store(_))
    }

    /// Message safe to hand to the requesting user.
    pub fn user_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            "internal error".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_sanitized() {
        let err = EngineError::StructuralNull("group");
        assert!(!err.is_user_facing());
        assert_eq!(err.user_message(), "internal error");
        assert_eq!(err.error_code(), "internal_error");

        let store = EngineError::from(StoreError::NotFound("acl 4".to_string()));
        assert_eq!(store.user_message(), "internal error");
    }

    #[test]
    fn user_errors_keep_their_reason() {
        let err = EngineError::invalid("duplicate identity: 7");
        assert!(err.is_user_facing());
        assert_eq!(err.user_message(), "invalid request: duplicate identity: 7");

        let cyclic = EngineError::CyclicGroup {
            owner: GroupId(1),
            member: GroupId(2),
        };
        assert_eq!(cyclic.error_code(), "cyclic_group");
        assert!(cyclic.user_message().contains("cycle"));
    }
}

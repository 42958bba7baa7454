// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Classified (high-level) audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Category;
use crate::models::{GroupId, IdentityId, SecretId, TransactionId};
use crate::storage::RawAuditEvent;

/// A classified record before it is given an id by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub category: Category,
    pub actor: IdentityId,
    pub affected_user: Option<IdentityId>,
    pub affected_group: Option<GroupId>,
    pub affected_secret: Option<SecretId>,
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub source_ip: Option<String>,
    pub device_id: Option<String>,
}

impl ClassifiedRecord {
    /// Record derived from one raw event, attributed to `actor`.
    ///
    /// `affected_user` starts as the raw event's target identity.
    pub fn from_raw(category: Category, actor: IdentityId, event: &RawAuditEvent) -> Self {
        Self {
            category,
            actor,
            affected_user: event.target_identity,
            affected_group: None,
            affected_secret: None,
            transaction_id: event.transaction_id.clone(),
            timestamp: event.timestamp,
            source_ip: event.source_ip.clone(),
            device_id: event.device_id.clone(),
        }
    }

    /// A GRANTED_ACCESS_TO or REVOKED_ACCESS_TO record written at commit.
    pub fn access_change(
        granted: bool,
        actor: IdentityId,
        affected_user: IdentityId,
        secret: SecretId,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            category: if granted {
                Category::GrantedAccessTo
            } else {
                Category::RevokedAccessTo
            },
            actor,
            affected_user: Some(affected_user),
            affected_group: None,
            affected_secret: Some(secret),
            transaction_id,
            timestamp: Utc::now(),
            source_ip: None,
            device_id: None,
        }
    }

    pub fn affecting_user(mut self, user: IdentityId) -> Self {
        self.affected_user = Some(user);
        self
    }

    pub fn with_source(mut self, source_ip: Option<String>, device_id: Option<String>) -> Self {
        self.source_ip = source_ip;
        self.device_id = device_id;
        self
    }
}

/// A classified record as stored in the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub id: u64,
    #[serde(flatten)]
    pub record: ClassifiedRecord,
}

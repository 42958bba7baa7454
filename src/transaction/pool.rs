// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pool of open transactions keyed by transaction id.
//!
//! Handlers look their transaction up on every request, which refreshes its
//! access time. [`TransactionPool::abort_expired`] reclaims transactions that
//! were left open, skipping any that a handler currently holds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::{AuditSwitch, Transaction};
use crate::models::TransactionId;
use crate::storage::{AuditLog, RawAction, RawAuditEvent};

pub type SharedTransaction = Arc<Mutex<Transaction>>;

/// Lock a shared transaction, recovering it if a previous holder panicked.
pub fn lock_transaction(txn: &SharedTransaction) -> MutexGuard<'_, Transaction> {
    txn.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PoolEntry {
    txn: SharedTransaction,
    audit: AuditSwitch,
    last_access: Instant,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub terminated: Vec<TransactionId>,
    pub skipped_locked: Vec<TransactionId>,
    pub failed: Vec<TransactionId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.terminated.is_empty() && self.skipped_locked.is_empty() && self.failed.is_empty()
    }
}

pub struct TransactionPool {
    entries: Mutex<HashMap<TransactionId, PoolEntry>>,
    idle_timeout: Duration,
    audit_log: Arc<AuditLog>,
}

impl TransactionPool {
    pub fn new(idle_timeout: Duration, audit_log: Arc<AuditLog>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_timeout,
            audit_log,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TransactionId, PoolEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, txn: Transaction) -> SharedTransaction {
        let id = txn.id().clone();
        let audit = txn.audit_switch();
        let shared = Arc::new(Mutex::new(txn));
        self.entries().insert(
            id,
            PoolEntry {
                txn: shared.clone(),
                audit,
                last_access: Instant::now(),
            },
        );
        shared
    }

    /// Look a transaction up and mark it as used.
    pub fn get(&self, id: &TransactionId) -> Option<SharedTransaction> {
        let mut entries = self.entries();
        let entry = entries.get_mut(id)?;
        entry.last_access = Instant::now();
        Some(entry.txn.clone())
    }

    pub fn remove(&self, id: &TransactionId) -> Option<SharedTransaction> {
        self.entries().remove(id).map(|entry| entry.txn)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminate every transaction idle for longer than the idle timeout at
    /// `now`.
    ///
    /// A transaction that is locked by its owner is left alone; audited ones
    /// get an IDLE_AND_LOCKED marker. Failures are logged per
    /// transaction and never stop the sweep.
    pub fn abort_expired(&self, now: Instant) -> SweepReport {
        let expired: Vec<(TransactionId, SharedTransaction, AuditSwitch, Duration)> = self
            .entries()
            .iter()
            .filter_map(|(id, entry)| {
                let idle = now.saturating_duration_since(entry.last_access);
                (idle > self.idle_timeout).then(|| (id.clone(), entry.txn.clone(), entry.audit.clone(), idle))
            })
            .collect();

        let mut report = SweepReport::default();
        for (id, shared, audit, idle) in expired {
            match shared.try_lock() {
                Ok(mut txn) => {
                    self.terminate(&id, &mut txn, &mut report);
                }
                Err(TryLockError::WouldBlock) => {
                    warn!(txn_id = %id, idle_secs = idle.as_secs(), "idle transaction is locked; skipping");
                    if audit.is_on() {
                        let marker = RawAuditEvent::new(id.clone(), RawAction::TransactionIdleAndLocked)
                            .with_note(format!("idle for {}s", idle.as_secs()));
                        if let Err(e) = self.audit_log.append(marker) {
                            warn!(txn_id = %id, error = %e, "failed to log idle-and-locked marker");
                        }
                    }
                    report.skipped_locked.push(id);
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    error!(txn_id = %id, "idle transaction lock is poisoned; terminating");
                    let mut txn = poisoned.into_inner();
                    self.terminate(&id, &mut txn, &mut report);
                }
            }
        }

        if !report.is_empty() {
            info!(
                terminated = report.terminated.len(),
                skipped_locked = report.skipped_locked.len(),
                failed = report.failed.len(),
                "idle transaction sweep finished"
            );
        }
        report
    }

    fn terminate(&self, id: &TransactionId, txn: &mut Transaction, report: &mut SweepReport) {
        let result = if txn.is_open() { txn.terminate() } else { Ok(()) };
        self.entries().remove(id);
        match result {
            Ok(()) => report.terminated.push(id.clone()),
            Err(e) => {
                error!(txn_id = %id, error = %e, "failed to terminate idle transaction");
                report.failed.push(id.clone());
            }
        }
    }
}

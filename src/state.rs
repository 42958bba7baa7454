// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared engine state handed to every request handler and background task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::audit::ClassifierDispatcher;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::TransactionId;
use crate::storage::{AuditLog, GraphDatabase, StoreError};
use crate::transaction::{lock_transaction, SharedTransaction, Transaction, TransactionPool, TxnMode};

#[derive(Clone)]
pub struct EngineState {
    // pooled transactions must drop before the database they borrow from
    pool: Arc<TransactionPool>,
    graph: Arc<GraphDatabase>,
    audit_log: Arc<AuditLog>,
    classifier: Option<ClassifierDispatcher>,
}

impl EngineState {
    pub fn new(graph: GraphDatabase, audit_log: AuditLog, idle_timeout: Duration) -> Self {
        let audit_log = Arc::new(audit_log);
        Self {
            graph: Arc::new(graph),
            pool: Arc::new(TransactionPool::new(idle_timeout, audit_log.clone())),
            audit_log,
            classifier: None,
        }
    }

    /// Open (or create) both databases under the configured data directory.
    pub fn open(config: &EngineConfig) -> EngineResult<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(StoreError::from)?;
        let graph = GraphDatabase::open(&config.graph_path())?;
        let audit_log = AuditLog::open(&config.audit_path())?;
        info!(data_dir = %config.data_dir.display(), "Opened engine databases");
        Ok(Self::new(graph, audit_log, config.idle_timeout))
    }

    /// Classify every committed read-write transaction in the background.
    pub fn with_classifier(mut self, dispatcher: ClassifierDispatcher) -> Self {
        self.classifier = Some(dispatcher);
        self
    }

    pub fn graph(&self) -> &GraphDatabase {
        &self.graph
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    /// Start a transaction and register it in the pool.
    ///
    /// Read-write transactions serialize on the graph database: this blocks
    /// until any other open write transaction completes.
    pub fn begin(&self, mode: TxnMode) -> EngineResult<SharedTransaction> {
        let store = match mode {
            TxnMode::ReadWrite => self.graph.begin_write()?,
            TxnMode::ReadOnly => self.graph.begin_read()?,
        };
        let txn = Transaction::new(TransactionId::generate(), mode, store, self.audit_log.clone());
        debug!(txn_id = %txn.id(), ?mode, "Began transaction");
        Ok(self.pool.insert(txn))
    }

    /// Look up an open transaction, refreshing its idle timer.
    pub fn transaction(&self, id: &TransactionId) -> EngineResult<SharedTransaction> {
        self.pool
            .get(id)
            .ok_or_else(|| EngineError::TransactionClosed(id.clone()))
    }

    /// Commit and unregister a transaction, then queue it for classification.
    pub fn commit(&self, shared: &SharedTransaction) -> EngineResult<()> {
        let mut txn = lock_transaction(shared);
        let result = txn.commit();
        self.pool.remove(txn.id());
        result?;

        if txn.should_write_audit_logs() {
            if let Some(classifier) = &self.classifier {
                classifier.dispatch(txn.id().clone());
            }
        }
        Ok(())
    }

    pub fn rollback(&self, shared: &SharedTransaction) -> EngineResult<()> {
        let mut txn = lock_transaction(shared);
        let result = txn.rollback();
        self.pool.remove(txn.id());
        result
    }
}

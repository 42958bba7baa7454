// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Classifier Workers
//!
//! Committed transaction ids are queued on a bounded channel and classified
//! by a small fixed set of background tasks.
//!
//! ```text
//! EngineState::commit ──try_send──► mpsc queue ──► worker 0..N ──spawn_blocking──► AuditClassifier
//! ```
//!
//! Dispatch never blocks the committing caller: when the queue is full or
//! closed the job is dropped with a warning and can be recovered later with
//! `reprocess`. A job that has started always runs to completion; the
//! shutdown token only stops workers from taking new ones.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::AuditClassifier;
use crate::models::TransactionId;
use crate::state::EngineState;

/// Default number of worker tasks.
pub const DEFAULT_WORKERS: usize = 1;

/// Default capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Sending half of the job queue, held by [`EngineState`].
#[derive(Debug, Clone)]
pub struct ClassifierDispatcher {
    sender: mpsc::Sender<TransactionId>,
}

impl ClassifierDispatcher {
    /// Queue a transaction for classification. Returns false if the job was
    /// dropped.
    pub fn dispatch(&self, transaction_id: TransactionId) -> bool {
        match self.sender.try_send(transaction_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(id)) => {
                warn!(txn_id = %id, "Classifier queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(id)) => {
                warn!(txn_id = %id, "Classifier queue closed, dropping job");
                false
            }
        }
    }
}

/// Receiving half of the job queue.
pub struct ClassifierQueue {
    receiver: mpsc::Receiver<TransactionId>,
}

impl ClassifierQueue {
    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<TransactionId> {
        self.receiver.try_recv().ok()
    }
}

/// Create a job queue holding at most `capacity` pending ids.
pub fn classifier_queue(capacity: usize) -> (ClassifierDispatcher, ClassifierQueue) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ClassifierDispatcher { sender }, ClassifierQueue { receiver })
}

pub struct ClassifierWorkers {
    queue: Arc<Mutex<mpsc::Receiver<TransactionId>>>,
    state: EngineState,
    workers: usize,
}

impl ClassifierWorkers {
    pub fn new(queue: ClassifierQueue, state: EngineState) -> Self {
        Self {
            queue: Arc::new(Mutex::new(queue.receiver)),
            state,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run the workers until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(workers.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(workers = self.workers, "Classifier workers starting");

        let mut handles = Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            handles.push(tokio::spawn(worker_loop(
                index,
                self.queue.clone(),
                self.state.clone(),
                shutdown.clone(),
            )));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Classifier worker panicked");
            }
        }

        info!("Classifier workers stopped");
    }
}

async fn worker_loop(
    index: usize,
    queue: Arc<Mutex<mpsc::Receiver<TransactionId>>>,
    state: EngineState,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            id = async { queue.lock().await.recv().await } => id,
        };
        let Some(transaction_id) = next else {
            debug!(worker = index, "Classifier worker shutting down");
            return;
        };

        let job_state = state.clone();
        let job_id = transaction_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            AuditClassifier::new(&job_state).process_transaction(&job_id)
        })
        .await;

        match outcome {
            Ok(Ok(count)) => {
                debug!(worker = index, txn_id = %transaction_id, records = count, "Classified transaction");
            }
            Ok(Err(e)) => {
                error!(worker = index, txn_id = %transaction_id, error = %e, "Failed to classify transaction");
            }
            Err(e) => {
                error!(worker = index, txn_id = %transaction_id, error = %e, "Classifier job panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::access::create_identity;
    use crate::audit::Category;
    use crate::models::NewIdentity;
    use crate::state::tests::temp_state;
    use crate::storage::GraphStore;
    use crate::transaction::{lock_transaction, TxnMode};

    #[test]
    fn dispatch_drops_jobs_when_full() {
        let (dispatcher, queue) = classifier_queue(1);
        assert!(dispatcher.dispatch(TransactionId::from("a")));
        assert!(!dispatcher.dispatch(TransactionId::from("b")));

        drop(queue);
        assert!(!dispatcher.dispatch(TransactionId::from("c")));
    }

    #[tokio::test]
    async fn committed_transactions_are_classified_in_background() {
        let (state, _dir) = temp_state();
        let (dispatcher, queue) = classifier_queue(16);
        let state = state.with_classifier(dispatcher);

        let shared = state.begin(TxnMode::ReadWrite).unwrap();
        let id = {
            let mut txn = lock_transaction(&shared);
            create_identity(&mut txn, NewIdentity::new("alice@example.com")).unwrap();
            txn.id().clone()
        };
        state.commit(&shared).unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ClassifierWorkers::new(queue, state.clone()).run(shutdown.clone()));

        let mut records = Vec::new();
        for _ in 0..100 {
            records = state
                .graph()
                .begin_read()
                .unwrap()
                .classified_events_for_transaction(&id)
                .unwrap();
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record.category, Category::Signup);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

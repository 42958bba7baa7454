// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Idle Transaction Sweeper
//!
//! Background task that reclaims transactions a caller opened and then
//! abandoned. Every `poll_interval` (default 60 s) it runs
//! [`TransactionPool::abort_expired`] on the blocking thread pool, since
//! terminating a transaction writes to both databases.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the classifier workers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::TransactionPool;

/// Default interval between sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct IdleSweeper {
    pool: Arc<TransactionPool>,
    poll_interval: Duration,
}

impl IdleSweeper {
    pub fn new(pool: Arc<TransactionPool>) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            idle_timeout_secs = self.pool.idle_timeout().as_secs(),
            "Idle transaction sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Idle transaction sweeper shutting down");
                    return;
                }
            }

            self.sweep_step().await;
        }
    }

    async fn sweep_step(&self) {
        let pool = self.pool.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || pool.abort_expired(Instant::now())).await {
            error!(error = %e, "Idle transaction sweep panicked");
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::BTreeSet;
use std::process::ExitCode;

use secret_access_core::audit::{classifier_queue, AuditClassifier, ClassifierWorkers};
use secret_access_core::config::{EngineConfig, LogFormat};
use secret_access_core::models::TransactionId;
use secret_access_core::state::EngineState;
use secret_access_core::storage::RawAction;
use secret_access_core::transaction::IdleSweeper;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    let state = match EngineState::open(&config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to open engine state");
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.split_first() {
        Some((command, ids)) if command == "reprocess" => reprocess(state, ids).await,
        Some((command, _)) => {
            error!(command = %command, "Unknown command (expected `reprocess [txn-id...]`)");
            ExitCode::FAILURE
        }
        None => serve(state, &config).await,
    }
}

async fn serve(state: EngineState, config: &EngineConfig) -> ExitCode {
    let (dispatcher, queue) = classifier_queue(config.classifier_queue_capacity);
    let state = state.with_classifier(dispatcher);
    let shutdown = CancellationToken::new();

    let sweeper = IdleSweeper::new(state.pool().clone()).with_poll_interval(config.idle_poll_interval);
    let sweeper = tokio::spawn(sweeper.run(shutdown.clone()));

    let workers = ClassifierWorkers::new(queue, state.clone()).with_workers(config.classifier_workers);
    let workers = tokio::spawn(workers.run(shutdown.clone()));

    info!(
        data_dir = %config.data_dir.display(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Secret access engine running"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
    shutdown.cancel();

    for (name, handle) in [("idle sweeper", sweeper), ("classifier workers", workers)] {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "Background task panicked");
        }
    }
    ExitCode::SUCCESS
}

/// Re-run classification for the given transactions, or for every
/// transaction that invited a user when none are given.
async fn reprocess(state: EngineState, ids: &[String]) -> ExitCode {
    let targets: BTreeSet<TransactionId> = if ids.is_empty() {
        match state.audit_log().transactions_with_action(RawAction::InviteNewUser) {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to list invite transactions");
                return ExitCode::FAILURE;
            }
        }
    } else {
        ids.iter().map(|id| TransactionId::from(id.as_str())).collect()
    };

    info!(count = targets.len(), "Reprocessing transactions");
    let outcome = tokio::task::spawn_blocking(move || {
        let classifier = AuditClassifier::new(&state);
        let mut failures = 0usize;
        for id in &targets {
            match classifier.reprocess_transaction(id) {
                Ok(count) => info!(txn_id = %id, records = count, "Reprocessed transaction"),
                Err(e) => {
                    failures += 1;
                    warn!(txn_id = %id, error = %e, "Failed to reprocess transaction");
                }
            }
        }
        failures
    })
    .await;

    match outcome {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            error!(failures, "Some transactions could not be reprocessed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Reprocessing task panicked");
            ExitCode::FAILURE
        }
    }
}

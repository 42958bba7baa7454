// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the engine. Configuration is loaded from the environment at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `graph.redb` and `audit.redb` | `./data` |
//! | `IDLE_TXN_TIMEOUT_SECS` | Idle time after which an open transaction is terminated | `120` |
//! | `IDLE_TXN_POLL_SECS` | Interval between idle sweeps | `60` |
//! | `CLASSIFIER_WORKERS` | Number of audit classifier tasks | `1` |
//! | `CLASSIFIER_QUEUE_CAPACITY` | Pending classification jobs before new ones are dropped | `1024` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use crate::audit::worker::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::transaction::sweeper::DEFAULT_POLL_INTERVAL;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the idle transaction timeout, in seconds.
pub const IDLE_TXN_TIMEOUT_ENV: &str = "IDLE_TXN_TIMEOUT_SECS";

/// Environment variable name for the idle sweep interval, in seconds.
pub const IDLE_TXN_POLL_ENV: &str = "IDLE_TXN_POLL_SECS";

pub const CLASSIFIER_WORKERS_ENV: &str = "CLASSIFIER_WORKERS";

pub const CLASSIFIER_QUEUE_CAPACITY_ENV: &str = "CLASSIFIER_QUEUE_CAPACITY";

/// Environment variable name for the logging format.
///
/// Set to `json` for structured output; anything else selects the
/// human-readable formatter.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "./data";

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

const GRAPH_FILE: &str = "graph.redb";
const AUDIT_FILE: &str = "audit.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub idle_timeout: Duration,
    pub idle_poll_interval: Duration,
    pub classifier_workers: usize,
    pub classifier_queue_capacity: usize,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle_poll_interval: DEFAULT_POLL_INTERVAL,
            classifier_workers: DEFAULT_WORKERS,
            classifier_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let idle_timeout = match parse_positive(&lookup, IDLE_TXN_TIMEOUT_ENV)? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.idle_timeout,
        };
        let idle_poll_interval = match parse_positive(&lookup, IDLE_TXN_POLL_ENV)? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.idle_poll_interval,
        };
        let classifier_workers = parse_positive(&lookup, CLASSIFIER_WORKERS_ENV)?
            .map(|n| n as usize)
            .unwrap_or(defaults.classifier_workers);
        let classifier_queue_capacity = parse_positive(&lookup, CLASSIFIER_QUEUE_CAPACITY_ENV)?
            .map(|n| n as usize)
            .unwrap_or(defaults.classifier_queue_capacity);

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref() {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            data_dir,
            idle_timeout,
            idle_poll_interval,
            classifier_workers,
            classifier_queue_capacity,
            log_format,
        })
    }

    pub fn graph_path(&self) -> PathBuf {
        self.data_dir.join(GRAPH_FILE)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_FILE)
    }
}

fn parse_positive<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.clone(),
    })?;
    if value == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.idle_poll_interval, Duration::from_secs(60));
        assert_eq!(config.classifier_workers, 1);
        assert_eq!(config.classifier_queue_capacity, 1024);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.graph_path(), PathBuf::from("./data/graph.redb"));
        assert_eq!(config.audit_path(), PathBuf::from("./data/audit.redb"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("DATA_DIR", "/var/lib/secrets"),
            ("IDLE_TXN_TIMEOUT_SECS", "30"),
            ("IDLE_TXN_POLL_SECS", " 5 "),
            ("CLASSIFIER_WORKERS", "4"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/secrets"));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_poll_interval, Duration::from_secs(5));
        assert_eq!(config.classifier_workers, 4);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = config_from(&[("IDLE_TXN_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { name: "IDLE_TXN_TIMEOUT_SECS", .. }));

        let err = config_from(&[("CLASSIFIER_WORKERS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Zero { name: "CLASSIFIER_WORKERS" }));
    }
}
